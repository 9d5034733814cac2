//! Ledger collaborators.
//!
//! The oracle anchors record hashes and pays claims through a [`Ledger`]. The
//! bundled [`SimulatedLedger`] keeps an in-process transaction log with
//! Solana-shaped signatures. [`SolanaRpcClient`] talks JSON-RPC to a real
//! cluster for read-only queries such as transaction confirmation and balances.

mod rpc;
mod simulated;

pub use rpc::{RpcConfig, SolanaRpcClient};
pub use simulated::{LedgerEntry, LedgerOperation, SimulatedLedger};

use crate::claim::Currency;
use crate::did::Did;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Commitment level reached by a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confirmation {
    /// Seen by the leader.
    Processed,
    /// Voted on by a supermajority.
    Confirmed,
    /// Rooted.
    Finalized,
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionStatus {
    /// Transaction signature.
    pub signature: String,
    /// Slot the transaction landed in.
    pub slot: u64,
    /// Commitment reached, if known.
    pub confirmation: Option<Confirmation>,
    /// Execution error, if the transaction failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub err: Option<String>,
}

impl TransactionStatus {
    /// Whether the transaction succeeded and reached at least `confirmed`.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.err.is_none()
            && matches!(
                self.confirmation,
                Some(Confirmation::Confirmed | Confirmation::Finalized)
            )
    }
}

/// A value transfer as recorded on chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferDetails {
    /// Transaction signature.
    pub signature: String,
    /// Recipient.
    pub to: Did,
    /// Amount transferred.
    pub amount: f64,
    /// Currency transferred.
    pub currency: Currency,
    /// Attached memo.
    pub memo: String,
    /// When the transaction landed.
    pub block_time: DateTime<Utc>,
}

/// Write access to the chain plus transaction lookup.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Anchor `memo` on chain and return the transaction signature.
    async fn submit_memo(&self, memo: &str) -> Result<String>;

    /// Pay `amount` of `currency` to the key behind `to`.
    async fn transfer(&self, to: &Did, amount: f64, currency: Currency, memo: &str)
        -> Result<String>;

    /// Look up a transaction by signature. `Ok(None)` if unknown.
    async fn transaction_status(&self, signature: &str) -> Result<Option<TransactionStatus>>;

    /// Transfer carried by a transaction. `Ok(None)` if the signature is
    /// unknown or the transaction is not a transfer.
    async fn transfer_details(&self, signature: &str) -> Result<Option<TransferDetails>>;
}
