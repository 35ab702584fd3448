//! Confirmation-gated forwarding
//!
//! # Architecture
//!
//! ```text
//! TransactionSource ──▶ IncomingPaymentListener ──▶ ConfirmationTracker
//!                              │                          │ (depth reached)
//!                              ▼                          ▼
//!                        ForwardTask ◀──────────── ConfirmationSignal
//!                              │
//!                  FaultBarrier(ForwardingPolicy → Wallet::send_payment)
//! ```
//!
//! `ForwardingService` owns the subscription and the shutdown path.

pub mod barrier;
pub mod listener;
pub mod policy;
pub mod service;
pub mod types;
pub mod waiter;

pub use barrier::FaultBarrier;
pub use listener::IncomingPaymentListener;
pub use policy::{compute_forward_amount, ForwardingPolicy, REFERENCE_MIN_FEE_LAMPORTS};
pub use service::ForwardingService;
pub use types::{ForwardRequest, ForwardState, ForwardStats, ForwardStatsSnapshot, ForwarderSettings};
pub use waiter::{ConfirmationSignal, ConfirmationTracker, WaitOutcome};
