//! Signed oracle decisions.

use crate::claim::ClaimStatus;
use crate::crypto::{sign_message, verify_did_signature};
use crate::did::Did;
use crate::error::Result;
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};

/// An oracle's signed statement about a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attestation {
    /// Claim the decision is about.
    pub claim_id: String,
    /// Status the oracle moved the claim to.
    pub decision: ClaimStatus,
    /// Approved payout, absent for rejections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<f64>,
    /// When the decision was made.
    pub issued_at: DateTime<Utc>,
    /// Oracle identity.
    #[serde(rename = "oracleDID")]
    pub oracle_did: Did,
    /// Base58 Ed25519 signature over [`Attestation::message`].
    pub signature: String,
}

impl Attestation {
    /// Sign a decision with the oracle key behind `oracle_did`.
    #[must_use]
    pub fn sign(
        key: &SigningKey,
        oracle_did: Did,
        claim_id: impl Into<String>,
        decision: ClaimStatus,
        amount: Option<f64>,
        issued_at: DateTime<Utc>,
    ) -> Self {
        let mut attestation = Self {
            claim_id: claim_id.into(),
            decision,
            amount,
            issued_at,
            oracle_did,
            signature: String::new(),
        };
        attestation.signature = sign_message(key, &attestation.message());
        attestation
    }

    /// Bytes covered by the signature.
    #[must_use]
    pub fn message(&self) -> Vec<u8> {
        format!(
            "primal-health:attestation:{}:{}:{:.2}:{}",
            self.claim_id,
            self.decision,
            self.amount.unwrap_or(0.0),
            self.issued_at.timestamp_millis()
        )
        .into_bytes()
    }

    /// Check the signature against the oracle DID.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the signature does not verify.
    pub fn verify(&self) -> Result<()> {
        verify_did_signature(&self.oracle_did, &self.message(), &self.signature)
    }
}
