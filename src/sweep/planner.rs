//! Sweep planning
//!
//! Decides from an account snapshot whether anything can be swept, and
//! how much. Pure: no I/O, no clock, no state.

use serde::Deserialize;
use std::fmt;
use std::time::Duration;

use crate::ledger::AccountState;
use crate::wallet::{format_xrp, xrp_to_drops};

/// Base network fee for a simple payment
pub const BASE_FEE_DROPS: u64 = 10;

/// Sweep safety constants, immutable after load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct PolicyConfig {
    /// Balance the ledger requires the account to keep
    #[serde(default = "default_reserve_drops")]
    pub reserve_drops: u64,

    /// Headroom for the sweep's own fee, which is paid from this buffer
    #[serde(default = "default_fee_buffer_drops")]
    pub fee_buffer_drops: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_reserve_drops() -> u64 {
    xrp_to_drops(10)
}

fn default_fee_buffer_drops() -> u64 {
    20
}

fn default_poll_interval_ms() -> u64 {
    2_000
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            reserve_drops: default_reserve_drops(),
            fee_buffer_drops: default_fee_buffer_drops(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PolicyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Lowest balance that leaves nothing to sweep
    pub fn floor(&self) -> u64 {
        self.reserve_drops.saturating_add(self.fee_buffer_drops)
    }
}

/// Why nothing is swept this round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitReason {
    /// Account not activated yet
    AccountNotFound,
    /// Balance does not exceed reserve plus fee buffer
    BelowFloor { balance: u64, floor: u64 },
}

impl fmt::Display for WaitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitReason::AccountNotFound => write!(f, "account not activated yet"),
            WaitReason::BelowFloor { balance, floor } => write!(
                f,
                "balance {} XRP locked by reserve ({} XRP floor)",
                format_xrp(*balance),
                format_xrp(*floor)
            ),
        }
    }
}

/// Outcome of planning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepDecision {
    /// Nothing to send
    Wait(WaitReason),
    /// Send `amount` drops; always positive
    Sweep { amount: u64 },
}

impl SweepDecision {
    pub fn amount(&self) -> Option<u64> {
        match self {
            SweepDecision::Sweep { amount } => Some(*amount),
            SweepDecision::Wait(_) => None,
        }
    }
}

/// Plan a sweep: `max(balance - reserve - fee_buffer, 0)`, zero meaning wait
pub fn plan(state: &AccountState, policy: &PolicyConfig) -> SweepDecision {
    let balance = match state {
        AccountState::NotFound => return SweepDecision::Wait(WaitReason::AccountNotFound),
        AccountState::Funded { balance, .. } => *balance,
    };

    let sendable = balance
        .saturating_sub(policy.reserve_drops)
        .saturating_sub(policy.fee_buffer_drops);

    if sendable == 0 {
        SweepDecision::Wait(WaitReason::BelowFloor {
            balance,
            floor: policy.floor(),
        })
    } else {
        SweepDecision::Sweep { amount: sendable }
    }
}
