//! In-process ledger used when no signing relay is configured.

use super::{Confirmation, Ledger, TransactionStatus, TransferDetails};
use crate::claim::Currency;
use crate::did::Did;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha512};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// What a simulated transaction did.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LedgerOperation {
    /// Memo anchoring.
    Memo {
        /// Memo text.
        memo: String,
    },
    /// Value transfer.
    Transfer {
        /// Recipient.
        to: Did,
        /// Amount.
        amount: f64,
        /// Currency.
        currency: Currency,
        /// Attached memo.
        memo: String,
    },
}

/// One transaction in the simulated log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LedgerEntry {
    /// Base58 signature.
    pub signature: String,
    /// Slot it landed in.
    pub slot: u64,
    /// When it landed.
    pub block_time: DateTime<Utc>,
    /// The operation.
    pub operation: LedgerOperation,
}

/// Ledger that records transactions in memory and confirms them immediately.
#[derive(Default)]
pub struct SimulatedLedger {
    log: Mutex<Vec<LedgerEntry>>,
    failing: AtomicBool,
}

impl SimulatedLedger {
    /// Create an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent submissions fail, to exercise outage handling.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Snapshot of all transactions.
    #[must_use]
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.log.lock().clone()
    }

    /// Number of transactions recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.log.lock().len()
    }

    /// Whether nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.lock().is_empty()
    }

    fn record(&self, operation: LedgerOperation) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            warn!("Simulated ledger rejecting submission");
            return Err(Error::Network("ledger unavailable".to_string()));
        }

        let mut log = self.log.lock();
        let slot = log.len() as u64 + 1;
        let payload = serde_json::to_vec(&operation)?;
        let mut hasher = Sha512::new();
        hasher.update(slot.to_le_bytes());
        hasher.update(&payload);
        let signature = bs58::encode(hasher.finalize()).into_string();

        debug!("Simulated transaction {signature} at slot {slot}");
        log.push(LedgerEntry {
            signature: signature.clone(),
            slot,
            block_time: Utc::now(),
            operation,
        });
        Ok(signature)
    }
}

#[async_trait]
impl Ledger for SimulatedLedger {
    async fn submit_memo(&self, memo: &str) -> Result<String> {
        self.record(LedgerOperation::Memo {
            memo: memo.to_string(),
        })
    }

    async fn transfer(
        &self,
        to: &Did,
        amount: f64,
        currency: Currency,
        memo: &str,
    ) -> Result<String> {
        if !amount.is_finite() || amount <= 0.0 {
            return Err(Error::validation("amount", "must be positive"));
        }
        let signature = self.record(LedgerOperation::Transfer {
            to: to.clone(),
            amount,
            currency,
            memo: memo.to_string(),
        })?;
        info!("Transferred {amount:.2} {currency} to {to} ({signature})");
        Ok(signature)
    }

    async fn transaction_status(&self, signature: &str) -> Result<Option<TransactionStatus>> {
        Ok(self
            .log
            .lock()
            .iter()
            .find(|e| e.signature == signature)
            .map(|e| TransactionStatus {
                signature: e.signature.clone(),
                slot: e.slot,
                confirmation: Some(Confirmation::Finalized),
                err: None,
            }))
    }

    async fn transfer_details(&self, signature: &str) -> Result<Option<TransferDetails>> {
        Ok(self
            .log
            .lock()
            .iter()
            .find(|e| e.signature == signature)
            .and_then(|e| match &e.operation {
                LedgerOperation::Transfer {
                    to,
                    amount,
                    currency,
                    memo,
                } => Some(TransferDetails {
                    signature: e.signature.clone(),
                    to: to.clone(),
                    amount: *amount,
                    currency: *currency,
                    memo: memo.clone(),
                    block_time: e.block_time,
                }),
                LedgerOperation::Memo { .. } => None,
            }))
    }
}
