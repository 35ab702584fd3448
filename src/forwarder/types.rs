//! Forwarder types

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

/// Immutable forwarding settings, fixed at service construction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwarderSettings {
    /// Where every received payment is forwarded
    pub destination: Pubkey,
    /// Confirmations required before forwarding (0 = act on receipt)
    pub confirmation_depth: u64,
    /// Fee deducted from every forward, in lamports
    pub fee_lamports: u64,
}

/// Lifecycle of one incoming transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForwardState {
    Observed,
    AwaitingConfirmation,
    Forwarded,
    Failed,
}

impl ForwardState {
    /// Whether the forwarder is done with this transaction
    pub fn is_terminal(&self) -> bool {
        matches!(self, ForwardState::Forwarded | ForwardState::Failed)
    }
}

impl std::fmt::Display for ForwardState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ForwardState::Observed => write!(f, "OBSERVED"),
            ForwardState::AwaitingConfirmation => write!(f, "AWAITING_CONFIRMATION"),
            ForwardState::Forwarded => write!(f, "FORWARDED"),
            ForwardState::Failed => write!(f, "FAILED"),
        }
    }
}

/// A validated forward, ready to be submitted to the wallet
///
/// Only constructed through `ForwardingPolicy::build_request`, which guarantees
/// `net_lamports == gross_lamports - fee_lamports` and `net_lamports > 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForwardRequest {
    source_signature: Signature,
    gross_lamports: u64,
    fee_lamports: u64,
    net_lamports: u64,
    destination: Pubkey,
}

impl ForwardRequest {
    pub(super) fn new(
        source_signature: Signature,
        gross_lamports: u64,
        fee_lamports: u64,
        net_lamports: u64,
        destination: Pubkey,
    ) -> Self {
        Self {
            source_signature,
            gross_lamports,
            fee_lamports,
            net_lamports,
            destination,
        }
    }

    /// Incoming transaction being forwarded
    pub fn source_signature(&self) -> &Signature {
        &self.source_signature
    }

    /// Lamports credited by the incoming transaction
    pub fn gross_lamports(&self) -> u64 {
        self.gross_lamports
    }

    /// Fee kept back
    pub fn fee_lamports(&self) -> u64 {
        self.fee_lamports
    }

    /// Lamports sent onwards
    pub fn net_lamports(&self) -> u64 {
        self.net_lamports
    }

    pub fn destination(&self) -> &Pubkey {
        &self.destination
    }
}

/// Running totals, shared by all forward tasks
#[derive(Debug, Default)]
pub struct ForwardStats {
    forwarded: AtomicU64,
    failed: AtomicU64,
    forwarded_lamports: AtomicU64,
    fee_lamports: AtomicU64,
}

impl ForwardStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_forward(&self, request: &ForwardRequest) {
        self.forwarded.fetch_add(1, Ordering::Relaxed);
        self.forwarded_lamports
            .fetch_add(request.net_lamports, Ordering::Relaxed);
        self.fee_lamports
            .fetch_add(request.fee_lamports, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ForwardStatsSnapshot {
        ForwardStatsSnapshot {
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            forwarded_lamports: self.forwarded_lamports.load(Ordering::Relaxed),
            fee_lamports: self.fee_lamports.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`ForwardStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForwardStatsSnapshot {
    pub forwarded: u64,
    pub failed: u64,
    pub forwarded_lamports: u64,
    pub fee_lamports: u64,
}
