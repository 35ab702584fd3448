//! Address watcher
//!
//! The chain side of the event loop. A single task polls the node:
//! - new signatures touching the wallet address are fetched and dispatched
//!   as [`ObservedTransaction`]s
//! - statuses of signatures with pending confirmation waits are fed to the
//!   [`ConfirmationTracker`]
//!
//! The first poll only records the newest signature, so history from before
//! startup is never forwarded.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_config::RpcTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::option_serializer::OptionSerializer;
use solana_transaction_status::{
    EncodedConfirmedTransactionWithStatusMeta, TransactionStatus, UiTransactionEncoding,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{Confirmations, EventDispatcher, ObservedTransaction};
use crate::error::{Error, Result};
use crate::forwarder::ConfirmationTracker;

/// Max signatures per `getSignaturesForAddress` page
const SIGNATURE_PAGE_LIMIT: usize = 1_000;

/// Max signatures per `getSignatureStatuses` request
const STATUS_BATCH_LIMIT: usize = 256;

pub struct AddressWatcher {
    client: Arc<RpcClient>,
    address: Pubkey,
    dispatcher: Arc<EventDispatcher>,
    tracker: Arc<ConfirmationTracker>,
    poll_interval: Duration,
    commitment: CommitmentConfig,
    page_limit: usize,
    cursor: Option<Signature>,
    primed: bool,
}

impl AddressWatcher {
    pub fn new(
        client: Arc<RpcClient>,
        address: Pubkey,
        dispatcher: Arc<EventDispatcher>,
        tracker: Arc<ConfirmationTracker>,
        poll_interval: Duration,
        commitment: CommitmentConfig,
    ) -> Self {
        Self {
            client,
            address,
            dispatcher,
            tracker,
            poll_interval,
            commitment,
            page_limit: SIGNATURE_PAGE_LIMIT,
            cursor: None,
            primed: false,
        }
    }

    /// Run the poll loop until `cancel` fires
    pub fn spawn(mut self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                "Watching {} every {:?}",
                self.address, self.poll_interval
            );
            let mut ticker = tokio::time::interval(self.poll_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("Address watcher shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.poll_incoming().await {
                            warn!("Polling new transactions failed: {}", e);
                        }
                        if let Err(e) = self.poll_confirmations().await {
                            warn!("Polling confirmations failed: {}", e);
                        }
                    }
                }
            }
        })
    }

    /// Dispatch transactions that appeared since the last poll
    ///
    /// The cursor only moves past a signature once it has been dispatched (or
    /// failed on chain). A fetch failure stops the pass; the next poll lists
    /// everything after the cursor again, so no receive is lost.
    async fn poll_incoming(&mut self) -> Result<usize> {
        if !self.primed {
            let newest = self.fetch_signatures_page(None, None, 1).await?;
            self.cursor = newest.first().map(|(signature, _)| *signature);
            self.primed = true;
            debug!("Watcher cursor initialised at {:?}", self.cursor);
            return Ok(0);
        }

        let mut fresh = Vec::new();
        let mut before = None;
        loop {
            let page = self
                .fetch_signatures_page(before, self.cursor, self.page_limit)
                .await?;
            let page_len = page.len();
            before = page.last().map(|(signature, _)| *signature);
            fresh.extend(page);
            if page_len < self.page_limit {
                break;
            }
        }

        let mut dispatched = 0;
        // Oldest first
        for (signature, failed) in fresh.into_iter().rev() {
            if failed {
                debug!("Skipping failed transaction {}", signature);
            } else {
                match self.fetch_transaction(&signature).await {
                    Ok(tx) => {
                        self.dispatcher.dispatch(tx);
                        dispatched += 1;
                    }
                    Err(e) => {
                        warn!(
                            "Failed to fetch transaction {}, retrying on next poll: {}",
                            signature, e
                        );
                        break;
                    }
                }
            }
            self.cursor = Some(signature);
        }
        Ok(dispatched)
    }

    /// Feed the status of every awaited signature into the tracker
    ///
    /// Searches full history so a wait outliving the node's status cache
    /// still completes.
    async fn poll_confirmations(&self) -> Result<()> {
        let pending = self.tracker.pending_signatures();
        for batch in pending.chunks(STATUS_BATCH_LIMIT) {
            let statuses = self
                .client
                .get_signature_statuses_with_history(batch)
                .await?
                .value;
            for (signature, status) in batch.iter().zip(statuses) {
                self.tracker
                    .observe(signature, confirmations_from_status(status.as_ref()));
            }
        }
        Ok(())
    }

    /// Newest-first `(signature, failed)` pairs
    async fn fetch_signatures_page(
        &self,
        before: Option<Signature>,
        until: Option<Signature>,
        limit: usize,
    ) -> Result<Vec<(Signature, bool)>> {
        let config = GetConfirmedSignaturesForAddress2Config {
            before,
            until,
            limit: Some(limit),
            commitment: Some(self.commitment),
        };
        let entries = self
            .client
            .get_signatures_for_address_with_config(&self.address, config)
            .await?;

        entries
            .into_iter()
            .map(|entry| {
                let signature = Signature::from_str(&entry.signature)
                    .map_err(|e| Error::Rpc(format!("Bad signature {}: {}", entry.signature, e)))?;
                Ok((signature, entry.err.is_some()))
            })
            .collect()
    }

    async fn fetch_transaction(&self, signature: &Signature) -> Result<ObservedTransaction> {
        let config = RpcTransactionConfig {
            encoding: Some(UiTransactionEncoding::Base64),
            commitment: Some(self.commitment),
            max_supported_transaction_version: Some(0),
        };
        let encoded = self
            .client
            .get_transaction_with_config(signature, config)
            .await?;
        observed_from_encoded(*signature, &encoded).ok_or_else(|| {
            Error::Rpc(format!(
                "Transaction {} has no status metadata or cannot be decoded",
                signature
            ))
        })
    }
}

/// Map a node status to the tracker's confirmation state
pub fn confirmations_from_status(status: Option<&TransactionStatus>) -> Confirmations {
    match status {
        None => Confirmations::Unseen,
        Some(status) if status.err.is_some() => Confirmations::Unseen,
        Some(status) => match status.confirmations {
            Some(count) => Confirmations::Count(count as u64),
            // Rooted transactions no longer report a count
            None => Confirmations::Finalized,
        },
    }
}

fn observed_from_encoded(
    signature: Signature,
    encoded: &EncodedConfirmedTransactionWithStatusMeta,
) -> Option<ObservedTransaction> {
    let meta = encoded.transaction.meta.as_ref()?;
    let transaction = encoded.transaction.transaction.decode()?;

    let mut account_keys = transaction.message.static_account_keys().to_vec();
    if let OptionSerializer::Some(loaded) = &meta.loaded_addresses {
        for key in loaded.writable.iter().chain(loaded.readonly.iter()) {
            account_keys.push(Pubkey::from_str(key).ok()?);
        }
    }

    Some(ObservedTransaction {
        signature,
        slot: encoded.slot,
        account_keys,
        pre_balances: meta.pre_balances.clone(),
        post_balances: meta.post_balances.clone(),
    })
}
