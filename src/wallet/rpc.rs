//! RPC-backed wallet
//!
//! Sends plain system transfers signed by the local keypair and answers the
//! bootstrap readiness check.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;
use solana_sdk::system_instruction;
use solana_sdk::transaction::Transaction;
use tracing::{debug, info, warn};

use super::{SendResult, Wallet};
use crate::error::{Error, Result};

/// Wallet backed by a JSON-RPC node and a local keypair
pub struct RpcWallet {
    client: Arc<RpcClient>,
    keypair: Keypair,
}

impl RpcWallet {
    pub fn new(client: Arc<RpcClient>, keypair: Keypair) -> Self {
        Self { client, keypair }
    }

    pub fn client(&self) -> Arc<RpcClient> {
        self.client.clone()
    }

    /// Block until the node answers health and slot queries
    ///
    /// Retries with exponential backoff for at most `timeout`; returns the
    /// current slot.
    pub async fn wait_until_ready(&self, timeout: Duration) -> Result<u64> {
        info!("Waiting for RPC node at {}...", self.client.url());

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(250),
            max_interval: Duration::from_secs(5),
            max_elapsed_time: Some(timeout),
            ..Default::default()
        };

        let slot = retry(backoff, || {
            let client = self.client.clone();
            async move {
                let check = async {
                    client.get_health().await?;
                    Ok::<u64, Error>(client.get_slot().await?)
                };
                match check.await {
                    Ok(slot) => Ok(slot),
                    Err(e) if e.is_retryable() => {
                        warn!("RPC node not ready: {}", e);
                        Err(backoff::Error::transient(e))
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
        .map_err(|e| {
            Error::RpcConnection(format!(
                "{} not ready after {:?}: {}",
                self.client.url(),
                timeout,
                e
            ))
        })?;

        info!("RPC node ready at slot {}", slot);
        Ok(slot)
    }

    /// Current balance of the wallet in lamports
    pub async fn balance(&self) -> Result<u64> {
        self.client
            .get_balance(&self.keypair.pubkey())
            .await
            .map_err(|e| Error::Rpc(format!("Failed to get balance: {}", e)))
    }
}

#[async_trait]
impl Wallet for RpcWallet {
    fn receive_address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    async fn send_payment(&self, destination: &Pubkey, lamports: u64) -> Result<SendResult> {
        let from = self.keypair.pubkey();
        debug!(
            "Executing transfer: {} lamports from {} to {}",
            lamports, from, destination
        );

        let instruction = system_instruction::transfer(&from, destination, lamports);

        let blockhash = self
            .client
            .get_latest_blockhash()
            .await
            .map_err(|e| Error::TransactionBuild(format!("Failed to get blockhash: {}", e)))?;

        let transaction = Transaction::new_signed_with_payer(
            &[instruction],
            Some(&from),
            &[&self.keypair],
            blockhash,
        );

        let signature = self
            .client
            .send_and_confirm_transaction(&transaction)
            .await
            .map_err(|e| Error::TransactionSend(format!("Transfer failed: {}", e)))?;

        info!(
            "Transfer complete: {} lamports to {} (sig: {})",
            lamports, destination, signature
        );

        Ok(SendResult {
            signature,
            destination: *destination,
            lamports,
            sent_at: chrono::Utc::now(),
        })
    }
}
