//! Forwarding amount policy
//!
//! The fee is a fixed configured amount (the network's base fee for a single
//! signature by default), not estimated from size or congestion.

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;

use super::types::ForwardRequest;
use crate::error::{Error, Result};

/// Base fee of a transaction carrying one signature
pub const REFERENCE_MIN_FEE_LAMPORTS: u64 = 5_000;

/// Compute the amount to forward
pub fn compute_forward_amount(gross_lamports: u64, fee_lamports: u64) -> Result<u64> {
    if gross_lamports <= fee_lamports {
        return Err(Error::InsufficientFunds {
            gross: gross_lamports,
            fee: fee_lamports,
        });
    }
    Ok(gross_lamports - fee_lamports)
}

/// Fixed-fee forwarding policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForwardingPolicy {
    fee_lamports: u64,
}

impl ForwardingPolicy {
    pub fn new(fee_lamports: u64) -> Self {
        Self { fee_lamports }
    }

    pub fn fee_lamports(&self) -> u64 {
        self.fee_lamports
    }

    /// Net amount for a received gross amount
    pub fn compute(&self, gross_lamports: u64) -> Result<u64> {
        compute_forward_amount(gross_lamports, self.fee_lamports)
    }

    /// Build a validated forward request
    pub fn build_request(
        &self,
        source_signature: Signature,
        gross_lamports: u64,
        destination: Pubkey,
    ) -> Result<ForwardRequest> {
        let net_lamports = self.compute(gross_lamports)?;
        Ok(ForwardRequest::new(
            source_signature,
            gross_lamports,
            self.fee_lamports,
            net_lamports,
            destination,
        ))
    }
}

impl Default for ForwardingPolicy {
    fn default() -> Self {
        Self::new(REFERENCE_MIN_FEE_LAMPORTS)
    }
}
