//! Balance sweeping
//!
//! # Architecture
//!
//! ```text
//! LedgerClient ──→ planner::plan ──→ TransactionBuilder ──→ LedgerClient
//!       ↑                                                       │
//!       └──────────────── SweepController (one in flight) ──────┘
//! ```
//!
//! The planner is pure. All I/O, retries and cancellation live in the
//! controller.

pub mod clock;
pub mod controller;
pub mod planner;
pub mod transaction;

pub use clock::{Clock, TokioClock};
pub use controller::{InFlight, Preview, SweepController, SweepReceipt, SweepState};
pub use planner::{plan, PolicyConfig, SweepDecision, WaitReason, BASE_FEE_DROPS};
pub use transaction::TransactionBuilder;
