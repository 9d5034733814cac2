//! Payment-gated sessions.
//!
//! A client that wants a session first receives the [`PaymentRequirements`],
//! pays, and presents the payment transaction signature as proof. Once the
//! ledger reports the transaction as a confirmed transfer meeting those
//! requirements, the gate issues a bearer token that unlocks gated routes
//! until it expires. Each proof buys one session, and proofs older than one
//! session lifetime are refused so spent proofs can be forgotten after that.
//!
//! Tokens live in an LRU cache, so under pressure the least recently used
//! sessions are dropped first.

use crate::claim::Currency;
use crate::did::Did;
use crate::error::{Error, Result};
use crate::ledger::{Ledger, TransferDetails};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Header carrying the payment proof.
pub const PAYMENT_HEADER: &str = "X-PAYMENT";

/// Default number of live sessions kept.
const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Session pricing and lifetime.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Price of one session.
    pub price: f64,
    /// Currency of `price`.
    pub currency: Currency,
    /// Who must be paid.
    pub recipient: Did,
    /// Session lifetime.
    pub ttl: Duration,
    /// Maximum live sessions.
    pub cache_capacity: usize,
}

/// What a client must pay to open a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// Amount due.
    pub price: f64,
    /// Currency.
    pub currency: Currency,
    /// Recipient DID.
    #[serde(rename = "recipientDID")]
    pub recipient: Did,
    /// Header to send the proof in.
    pub header: String,
    /// Session lifetime in seconds.
    pub session_ttl_secs: i64,
}

/// A bearer credential for gated routes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionToken {
    /// Opaque token value.
    pub token: String,
    /// Payment transaction that bought the session.
    pub payment_transaction: String,
    /// Issue time.
    pub issued_at: DateTime<Utc>,
    /// Expiry time.
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    /// Whether the token is still valid at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Extract the transaction signature from an `X-PAYMENT` header value.
///
/// Accepts either a bare signature or base64 JSON carrying a `signature` or
/// `transaction` field.
#[must_use]
pub fn parse_payment_header(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(decoded) = B64.decode(value) {
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&decoded) {
            return ["signature", "transaction"]
                .iter()
                .find_map(|k| json.get(*k).and_then(|v| v.as_str()))
                .map(str::to_string);
        }
    }
    Some(value.to_string())
}

/// Issues and checks payment-backed session tokens.
pub struct PaymentGate {
    config: SessionConfig,
    ledger: Arc<dyn Ledger>,
    sessions: Mutex<LruCache<String, SessionToken>>,
    spent_proofs: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl PaymentGate {
    /// Create a gate verifying proofs against `ledger`.
    #[must_use]
    pub fn new(config: SessionConfig, ledger: Arc<dyn Ledger>) -> Self {
        let cap = NonZeroUsize::new(config.cache_capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        info!(
            "Payment gate: {:.2} {} to {} for {}s sessions",
            config.price,
            config.currency,
            config.recipient,
            config.ttl.num_seconds()
        );
        Self {
            config,
            ledger,
            sessions: Mutex::new(LruCache::new(cap)),
            spent_proofs: Mutex::new(HashMap::new()),
        }
    }

    /// Terms a client must meet.
    #[must_use]
    pub fn requirements(&self) -> PaymentRequirements {
        PaymentRequirements {
            price: self.config.price,
            currency: self.config.currency,
            recipient: self.config.recipient.clone(),
            header: PAYMENT_HEADER.to_string(),
            session_ttl_secs: self.config.ttl.num_seconds(),
        }
    }

    /// Redeem a payment proof for a session.
    ///
    /// The proof must be a confirmed transfer of at least the session price,
    /// in the session currency, to the configured recipient, made no longer
    /// than one session lifetime ago.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PaymentRequired`] if the proof is empty, already spent,
    /// unknown to the ledger, not confirmed, stale, or not a qualifying
    /// transfer, and propagates ledger failures.
    pub async fn issue(&self, proof: &str, now: DateTime<Utc>) -> Result<SessionToken> {
        let proof = proof.trim();
        if proof.is_empty() {
            return Err(Error::PaymentRequired("empty payment proof".to_string()));
        }
        self.prune_spent(now);
        if self.spent_proofs.lock().contains_key(proof) {
            warn!("Payment proof {proof} presented twice");
            return Err(Error::PaymentRequired(
                "payment proof already used".to_string(),
            ));
        }

        let status = self
            .ledger
            .transaction_status(proof)
            .await?
            .ok_or_else(|| Error::PaymentRequired("payment transaction not found".to_string()))?;
        if !status.is_confirmed() {
            debug!("Payment {proof} not confirmed yet: {status:?}");
            return Err(Error::PaymentRequired(
                "payment transaction not confirmed".to_string(),
            ));
        }
        let transfer = self
            .ledger
            .transfer_details(proof)
            .await?
            .ok_or_else(|| Error::PaymentRequired("payment proof is not a transfer".to_string()))?;
        self.check_transfer(&transfer, now)?;

        let expires_at = now
            .checked_add_signed(self.config.ttl)
            .ok_or_else(|| Error::Session("session expiry out of range".to_string()))?;

        // The map is the source of truth; a concurrent redemption loses here.
        {
            let mut spent = self.spent_proofs.lock();
            if spent.contains_key(proof) {
                return Err(Error::PaymentRequired(
                    "payment proof already used".to_string(),
                ));
            }
            spent.insert(proof.to_string(), transfer.block_time);
        }

        let mut raw = [0u8; 32];
        OsRng.fill_bytes(&mut raw);
        let session = SessionToken {
            token: hex::encode(raw),
            payment_transaction: proof.to_string(),
            issued_at: now,
            expires_at,
        };
        self.sessions
            .lock()
            .put(session.token.clone(), session.clone());
        info!("Session issued for payment {proof}, expires {}", session.expires_at);
        Ok(session)
    }

    fn check_transfer(&self, transfer: &TransferDetails, now: DateTime<Utc>) -> Result<()> {
        let refuse = |reason: String| {
            warn!("Payment {} refused: {reason}", transfer.signature);
            Err(Error::PaymentRequired(reason))
        };
        if transfer.to != self.config.recipient {
            return refuse(format!("payment must be sent to {}", self.config.recipient));
        }
        if transfer.currency != self.config.currency {
            return refuse(format!("payment must be in {}", self.config.currency));
        }
        if transfer.amount.is_nan() || transfer.amount < self.config.price {
            return refuse(format!(
                "payment of {:.2} is below the session price of {:.2}",
                transfer.amount, self.config.price
            ));
        }
        if now.signed_duration_since(transfer.block_time) > self.config.ttl {
            return refuse("payment is older than one session lifetime".to_string());
        }
        Ok(())
    }

    /// Forget spent proofs too old to be redeemed again anyway.
    fn prune_spent(&self, now: DateTime<Utc>) {
        let ttl = self.config.ttl;
        self.spent_proofs
            .lock()
            .retain(|_, block_time| now.signed_duration_since(*block_time) <= ttl);
    }

    /// Check a bearer token.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Session`] if the token is unknown or expired. Expired
    /// tokens are evicted.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<SessionToken> {
        let mut sessions = self.sessions.lock();
        let Some(session) = sessions.get(token).cloned() else {
            return Err(Error::Session("unknown session token".to_string()));
        };
        if !session.is_valid_at(now) {
            sessions.pop(token);
            debug!("Session for {} expired", session.payment_transaction);
            return Err(Error::Session("session token expired".to_string()));
        }
        Ok(session)
    }

    /// Number of cached sessions, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no sessions are cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}
