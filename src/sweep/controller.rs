//! Sweep control loop
//!
//! ```text
//! Polling → Deciding → Submitting → AwaitingFinality → Done
//!    ↑         │            │               │
//!    └─────────┴────────────┴───────────────┘  (wait / transient failure)
//! ```
//!
//! Exactly one transaction is in flight at a time, and a new account poll
//! never starts until the previous transaction is known to be confirmed,
//! failed or expired. Every suspension point observes the shutdown token.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, RetryConfig};
use crate::error::{Error, Result};
use crate::ledger::engine_result::is_permanent_failure;
use crate::ledger::{AccountState, FinalityStatus, LedgerClient, SignedTransaction, TxHash};
use crate::wallet::{format_xrp, Address, Keypair};

use super::clock::{Clock, TokioClock};
use super::planner::{plan, PolicyConfig, SweepDecision, WaitReason};
use super::transaction::TransactionBuilder;

/// Transaction handed to the network whose outcome is not yet known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InFlight {
    pub hash: TxHash,
    pub amount: u64,
    pub last_ledger_sequence: u32,
}

/// Controller state
#[derive(Debug, Clone, PartialEq)]
pub enum SweepState {
    Polling,
    Deciding(AccountState),
    Submitting { amount: u64, account: AccountState },
    AwaitingFinality(InFlight),
    Done(SweepReceipt),
}

/// Proof of a confirmed sweep
#[derive(Debug, Clone, PartialEq)]
pub struct SweepReceipt {
    pub hash: TxHash,
    pub amount: u64,
    pub destination: Address,
    pub ledger_index: u32,
    /// Transactions submitted during the run, including the confirmed one
    pub submissions: u32,
    pub completed_at: DateTime<Utc>,
}

/// One-shot look at what a sweep would do right now
#[derive(Debug, Clone)]
pub struct Preview {
    pub account: AccountState,
    pub decision: SweepDecision,
    pub transaction: Option<SignedTransaction>,
}

/// Delay between retries of failed ledger calls
///
/// Unbounded in count, bounded in delay.
struct RetryPolicy {
    backoff: ExponentialBackoff,
    max_delay: Duration,
}

impl RetryPolicy {
    fn new(config: &RetryConfig) -> Self {
        let mut backoff = ExponentialBackoff {
            initial_interval: config.initial_delay(),
            max_interval: config.max_delay(),
            multiplier: config.multiplier,
            randomization_factor: 0.0,
            max_elapsed_time: None,
            ..Default::default()
        };
        backoff.reset();

        Self {
            backoff,
            max_delay: config.max_delay(),
        }
    }

    fn next_delay(&mut self) -> Duration {
        self.backoff.next_backoff().unwrap_or(self.max_delay)
    }

    fn reset(&mut self) {
        self.backoff.reset();
    }
}

/// Error for a shutdown observed while `in_flight` may still land
fn interruption(in_flight: Option<&InFlight>) -> Error {
    match in_flight {
        Some(tx) => Error::UnknownOutcome {
            hash: tx.hash.to_string(),
        },
        None => Error::Interrupted,
    }
}

/// Run `call` unless shutdown wins first
///
/// The outer result carries shutdown, the inner one the call's own result.
async fn guarded<T, F>(
    shutdown: &CancellationToken,
    in_flight: Option<&InFlight>,
    call: F,
) -> Result<Result<T>>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(interruption(in_flight)),
        result = call => Ok(result),
    }
}

/// Monitors the sweep account and forwards its spendable balance
pub struct SweepController<L, C = TokioClock> {
    ledger: L,
    clock: C,
    keypair: Keypair,
    destination: Address,
    policy: PolicyConfig,
    builder: TransactionBuilder,
    retry: RetryPolicy,
    finality_poll: Duration,
    last_wait: Option<WaitReason>,
    submissions: u32,
}

impl<L: LedgerClient> SweepController<L, TokioClock> {
    /// Create a controller; it takes sole ownership of the keypair
    pub fn new(ledger: L, keypair: Keypair, destination: Address, config: &Config) -> Self {
        Self {
            ledger,
            clock: TokioClock,
            keypair,
            destination,
            policy: config.policy,
            builder: TransactionBuilder::new(
                config.policy.fee_buffer_drops,
                config.finality.ledger_offset,
                config.sweep.destination_tag,
            ),
            retry: RetryPolicy::new(&config.retry),
            finality_poll: config.finality.poll_interval(),
            last_wait: None,
            submissions: 0,
        }
    }
}

impl<L: LedgerClient, C: Clock> SweepController<L, C> {
    /// Replace the timer
    pub fn with_clock<C2: Clock>(self, clock: C2) -> SweepController<L, C2> {
        SweepController {
            ledger: self.ledger,
            clock,
            keypair: self.keypair,
            destination: self.destination,
            policy: self.policy,
            builder: self.builder,
            retry: self.retry,
            finality_poll: self.finality_poll,
            last_wait: self.last_wait,
            submissions: self.submissions,
        }
    }

    /// Address of the sweep account
    pub fn address(&self) -> Address {
        self.keypair.address()
    }

    pub fn destination(&self) -> Address {
        self.destination
    }

    /// Fetch state once and plan, building the transaction without sending it
    pub async fn preview(&self) -> Result<Preview> {
        let account = self.ledger.account_state(&self.keypair.address()).await?;
        let decision = plan(&account, &self.policy);
        let transaction = match decision {
            SweepDecision::Sweep { amount } => Some(self.builder.build_sweep(
                &self.keypair,
                &self.destination,
                amount,
                &account,
            )?),
            SweepDecision::Wait(_) => None,
        };

        Ok(Preview {
            account,
            decision,
            transaction,
        })
    }

    /// Run until one sweep is confirmed
    ///
    /// Consumes the controller, so the keypair is dropped on every exit
    /// path. Returns `Error::Interrupted` if shut down with nothing in
    /// flight and `Error::UnknownOutcome` if a submitted transaction's
    /// fate is unknown at shutdown.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<SweepReceipt> {
        info!(
            "Monitoring {} (sweeping to {}, reserve {} XRP, fee buffer {} drops)",
            self.keypair.address(),
            self.destination,
            format_xrp(self.policy.reserve_drops),
            self.policy.fee_buffer_drops
        );

        let mut state = SweepState::Polling;
        loop {
            state = self.advance(state, &shutdown).await?;
            if let SweepState::Done(receipt) = state {
                info!(
                    "Sweep complete: {} XRP to {} in ledger {} (hash: {})",
                    format_xrp(receipt.amount),
                    receipt.destination,
                    receipt.ledger_index,
                    receipt.hash
                );
                return Ok(receipt);
            }
        }
    }

    /// Perform one state transition
    pub async fn advance(
        &mut self,
        state: SweepState,
        shutdown: &CancellationToken,
    ) -> Result<SweepState> {
        match state {
            SweepState::Polling => self.poll(shutdown).await,
            SweepState::Deciding(account) => self.decide(account, shutdown).await,
            SweepState::Submitting { amount, account } => {
                self.submit(amount, &account, shutdown).await
            }
            SweepState::AwaitingFinality(tx) => self.await_finality(tx, shutdown).await,
            SweepState::Done(receipt) => Ok(SweepState::Done(receipt)),
        }
    }

    async fn pause(
        &self,
        duration: Duration,
        shutdown: &CancellationToken,
        in_flight: Option<&InFlight>,
    ) -> Result<()> {
        guarded(shutdown, in_flight, async {
            self.clock.sleep(duration).await;
            Ok(())
        })
        .await?
    }

    async fn poll(&mut self, shutdown: &CancellationToken) -> Result<SweepState> {
        let address = self.keypair.address();
        match guarded(shutdown, None, self.ledger.account_state(&address)).await? {
            Ok(account) => {
                self.retry.reset();
                Ok(SweepState::Deciding(account))
            }
            Err(e) if e.is_retryable() => {
                let delay = self.retry.next_delay();
                warn!("Temporary error polling {}: {} (retry in {:?})", address, e, delay);
                self.pause(delay, shutdown, None).await?;
                Ok(SweepState::Polling)
            }
            Err(e) => {
                error!("Fatal error polling {}: {}", address, e);
                Err(e)
            }
        }
    }

    async fn decide(
        &mut self,
        account: AccountState,
        shutdown: &CancellationToken,
    ) -> Result<SweepState> {
        match plan(&account, &self.policy) {
            SweepDecision::Wait(reason) => {
                // Only announce changes; the same reason repeats every poll
                if self.last_wait != Some(reason) {
                    info!("Waiting: {}", reason);
                    self.last_wait = Some(reason);
                } else {
                    debug!("Waiting: {}", reason);
                }
                self.pause(self.policy.poll_interval(), shutdown, None).await?;
                Ok(SweepState::Polling)
            }
            SweepDecision::Sweep { amount } => {
                self.last_wait = None;
                info!("Sweeping {} XRP to {}", format_xrp(amount), self.destination);
                Ok(SweepState::Submitting { amount, account })
            }
        }
    }

    async fn submit(
        &mut self,
        amount: u64,
        account: &AccountState,
        shutdown: &CancellationToken,
    ) -> Result<SweepState> {
        // Nothing has been sent yet, so stopping here leaves no ambiguity
        if shutdown.is_cancelled() {
            return Err(Error::Interrupted);
        }

        // Construction failures are misconfiguration: never retried
        let signed = self
            .builder
            .build_sweep(&self.keypair, &self.destination, amount, account)?;

        let tx = InFlight {
            hash: signed.hash(),
            amount,
            last_ledger_sequence: signed.last_ledger_sequence(),
        };
        self.submissions += 1;

        match guarded(shutdown, Some(&tx), self.ledger.submit_payment(&signed)).await? {
            Ok(submission) => {
                info!(
                    "Submitted {} ({}: {}), valid through ledger {}",
                    tx.hash, submission.engine_result, submission.message, tx.last_ledger_sequence
                );
                Ok(SweepState::AwaitingFinality(tx))
            }
            Err(Error::TransientRejection { code, message }) => {
                let delay = self.retry.next_delay();
                warn!(
                    "Submission of {} rejected ({}: {}), re-planning in {:?}",
                    tx.hash, code, message, delay
                );
                self.pause(delay, shutdown, None).await?;
                Ok(SweepState::Polling)
            }
            Err(e) if e.is_retryable() => {
                // The request may have reached the network; track it rather
                // than risk a second payment
                warn!("Submit outcome unknown for {}: {}", tx.hash, e);
                Ok(SweepState::AwaitingFinality(tx))
            }
            Err(e) => {
                error!("Submission of {} failed: {}", tx.hash, e);
                Err(e)
            }
        }
    }

    async fn await_finality(
        &mut self,
        tx: InFlight,
        shutdown: &CancellationToken,
    ) -> Result<SweepState> {
        let status = guarded(
            shutdown,
            Some(&tx),
            self.ledger.finality(&tx.hash, tx.last_ledger_sequence),
        )
        .await?;

        if status.is_ok() {
            self.retry.reset();
        }

        match status {
            Ok(FinalityStatus::Pending) => {
                debug!("{} not yet validated", tx.hash);
                self.pause(self.finality_poll, shutdown, Some(&tx)).await?;
                Ok(SweepState::AwaitingFinality(tx))
            }
            Ok(FinalityStatus::Confirmed { ledger_index }) => Ok(SweepState::Done(SweepReceipt {
                hash: tx.hash,
                amount: tx.amount,
                destination: self.destination,
                ledger_index,
                submissions: self.submissions,
                completed_at: Utc::now(),
            })),
            Ok(FinalityStatus::Failed { code, ledger_index }) if is_permanent_failure(&code) => {
                error!("{} failed in ledger {}: {}", tx.hash, ledger_index, code);
                Err(Error::PermanentRejection {
                    code,
                    message: format!("validated in ledger {}", ledger_index),
                })
            }
            Ok(FinalityStatus::Failed { code, ledger_index }) => {
                warn!(
                    "{} failed in ledger {} ({}), re-planning from fresh state",
                    tx.hash, ledger_index, code
                );
                Ok(SweepState::Polling)
            }
            Ok(FinalityStatus::Expired { validated_ledger }) => {
                warn!(
                    "{} expired (ledger {} passed {}), re-planning from fresh state",
                    tx.hash, validated_ledger, tx.last_ledger_sequence
                );
                Ok(SweepState::Polling)
            }
            Err(e) if e.is_retryable() => {
                let delay = self.retry.next_delay();
                warn!("Temporary error checking {}: {} (retry in {:?})", tx.hash, e, delay);
                self.pause(delay, shutdown, Some(&tx)).await?;
                Ok(SweepState::AwaitingFinality(tx))
            }
            Err(e) => Err(e),
        }
    }
}
