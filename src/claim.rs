//! Insurance claims and their status lifecycle.
//!
//! ```text
//! pending ──verify──▶ verified ──pay──▶ paid
//!    │                   │
//!    └──────reject───────┴──▶ rejected
//! ```
//!
//! `paid` and `rejected` are terminal.

use crate::did::Did;
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    /// Submitted, awaiting verification.
    #[default]
    Pending,
    /// Verified as payable.
    Verified,
    /// Paid out.
    Paid,
    /// Rejected by the oracle or the provider.
    Rejected,
}

impl ClaimStatus {
    /// Whether no further transition is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Rejected)
    }

    /// Whether moving from `self` to `next` is allowed.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Verified)
                | (Self::Verified, Self::Paid)
                | (Self::Pending | Self::Verified, Self::Rejected)
        )
    }
}

impl fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Verified => f.write_str("verified"),
            Self::Paid => f.write_str("paid"),
            Self::Rejected => f.write_str("rejected"),
        }
    }
}

/// Currency a claim is denominated in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    /// Native SOL.
    #[default]
    Sol,
    /// USD Coin.
    Usdc,
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sol => f.write_str("SOL"),
            Self::Usdc => f.write_str("USDC"),
        }
    }
}

/// A patient's request for a payout tied to a health record hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsuranceClaim {
    /// Unique claim identifier.
    pub claim_id: String,
    /// Claiming patient.
    #[serde(rename = "patientDID")]
    pub patient_did: Did,
    /// Provider expected to verify and pay.
    #[serde(rename = "insuranceProviderDID")]
    pub insurance_provider_did: Did,
    /// Hex SHA-256 of the minimal health record.
    pub health_data_hash: String,
    /// Encrypted minimal health record (base64).
    pub encrypted_health_data: String,
    /// Amount requested by the patient.
    pub claim_amount: f64,
    /// Currency of `claim_amount`.
    pub currency: Currency,
    /// Current status.
    pub status: ClaimStatus,
    /// Submission time.
    pub timestamp: DateTime<Utc>,
    /// Base58 Ed25519 signature by the patient over [`Self::signing_message`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patient_signature: Option<String>,
    /// When the oracle verified the claim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_timestamp: Option<DateTime<Utc>>,
    /// Payout computed by the oracle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_amount: Option<f64>,
    /// Ledger signature of the payout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_transaction_id: Option<String>,
    /// Why the claim was rejected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl InsuranceClaim {
    /// Bytes the patient signs when filing the claim.
    ///
    /// The claim id is not included so it can be assigned by the server.
    #[must_use]
    pub fn signing_message(&self) -> Vec<u8> {
        signing_message(
            &self.patient_did,
            &self.insurance_provider_did,
            &self.health_data_hash,
            self.claim_amount,
            self.currency,
        )
    }

    /// Move to `next`, enforcing the lifecycle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] if the move is not allowed.
    pub fn transition(&mut self, next: ClaimStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark verified at `at` with the computed payout.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is not pending.
    pub fn mark_verified(&mut self, amount: f64, at: DateTime<Utc>) -> Result<()> {
        self.transition(ClaimStatus::Verified)?;
        self.verification_timestamp = Some(at);
        self.payment_amount = Some(amount);
        Ok(())
    }

    /// Mark paid with the ledger transaction reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is not verified.
    pub fn mark_paid(&mut self, transaction_id: String) -> Result<()> {
        self.transition(ClaimStatus::Paid)?;
        self.payment_transaction_id = Some(transaction_id);
        Ok(())
    }

    /// Mark rejected with a reason.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim is already terminal.
    pub fn mark_rejected(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(ClaimStatus::Rejected)?;
        self.rejection_reason = Some(reason.into());
        Ok(())
    }
}

/// The message a patient signs for a claim with these terms.
#[must_use]
pub fn signing_message(
    patient: &Did,
    provider: &Did,
    health_data_hash: &str,
    amount: f64,
    currency: Currency,
) -> Vec<u8> {
    format!("primal-health:claim:{patient}:{provider}:{health_data_hash}:{amount:.2}:{currency}")
        .into_bytes()
}

/// A provider-only operation on a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderAction {
    /// Set the claim to `verified` or `rejected`.
    SetStatus,
    /// Pay a verified claim.
    Pay,
}

impl ProviderAction {
    /// Wire name used in the signed message.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SetStatus => "status",
            Self::Pay => "pay",
        }
    }
}

/// The message a provider signs to authorize `action` on a claim, moving it to
/// `status`.
#[must_use]
pub fn provider_signing_message(claim_id: &str, action: ProviderAction, status: ClaimStatus) -> Vec<u8> {
    format!("primal-health:provider:{claim_id}:{}:{status}", action.as_str()).into_bytes()
}
