//! Dry-run wallet: logs forwards instead of sending them

use std::sync::Arc;

use async_trait::async_trait;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use tracing::info;

use super::{ObservedTransaction, SendResult, Wallet};
use crate::error::Result;

pub struct DryRunWallet {
    inner: Arc<dyn Wallet>,
}

impl DryRunWallet {
    pub fn new(inner: Arc<dyn Wallet>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Wallet for DryRunWallet {
    fn receive_address(&self) -> Pubkey {
        self.inner.receive_address()
    }

    fn value_received(&self, tx: &ObservedTransaction) -> u64 {
        self.inner.value_received(tx)
    }

    async fn send_payment(&self, destination: &Pubkey, lamports: u64) -> Result<SendResult> {
        info!(
            "DRY-RUN: Would send {} lamports from {} to {}",
            lamports,
            self.inner.receive_address(),
            destination
        );
        Ok(SendResult {
            signature: Signature::default(),
            destination: *destination,
            lamports,
            sent_at: chrono::Utc::now(),
        })
    }
}
