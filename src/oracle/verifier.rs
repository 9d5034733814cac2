//! Claim oracle: record intake, claim filing, verification and payout.

use super::attestation::Attestation;
use super::coverage::{payment_amount, CoverageTable, Eligibility};
use crate::claim::{provider_signing_message, ClaimStatus, InsuranceClaim, ProviderAction};
use crate::crypto::{verify_did_signature, RecordCipher};
use crate::did::{Did, Network, Role};
use crate::error::{Error, Result};
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::ledger::{Ledger, TransactionStatus};
use crate::record::{HealthRecord, MinimalHealthRecord};
use crate::store::{ClaimFilter, Store};
use crate::validation::{validate_claim, validate_health_record};
use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rejection reason when the signature, ciphertext or hash do not check out.
pub const REASON_UNVERIFIABLE: &str = "Claim data could not be verified";

/// Rejection reason used when a provider rejects without giving one.
pub const REASON_PROVIDER_REJECTED: &str = "Rejected by insurance provider";

/// Oracle settings.
#[derive(Debug, Clone)]
pub struct OracleConfig {
    /// Cluster the oracle DID lives on.
    pub network: Network,
    /// Coverage rules.
    pub coverage: CoverageTable,
    /// Upper bound on a single payout.
    pub max_payout: f64,
    /// Anchor record hashes on the ledger when records are submitted.
    pub anchor_records: bool,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            network: Network::default(),
            coverage: CoverageTable::default(),
            max_payout: 10_000.0,
            anchor_records: true,
        }
    }
}

/// A stored record plus the ledger anchor of its hash, if any.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedRecord {
    /// The stored record.
    #[serde(flatten)]
    pub record: HealthRecord,
    /// Memo transaction anchoring `record.data_hash`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub anchor_transaction: Option<String>,
}

/// Claim inputs derived from a stored record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedClaimData {
    /// Source record.
    pub record_id: String,
    /// The minimal record that was sealed.
    pub minimal_record: MinimalHealthRecord,
    /// Hex SHA-256 of the minimal record.
    pub health_data_hash: String,
    /// Base64 ciphertext of the minimal record.
    pub encrypted_health_data: String,
}

/// Result of a verification run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOutcome {
    /// Claim after verification and payout.
    pub claim: InsuranceClaim,
    /// Signed decision.
    pub attestation: Attestation,
}

/// Claim counts by status and the total paid out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimAnalytics {
    /// All claims.
    pub total: usize,
    /// Awaiting verification.
    pub pending: usize,
    /// Verified, not yet paid.
    pub verified: usize,
    /// Paid out.
    pub paid: usize,
    /// Rejected.
    pub rejected: usize,
    /// Sum of payouts.
    pub total_paid: f64,
}

enum Assessment {
    Approve(f64),
    Reject(&'static str),
}

/// Serializes payouts per claim so one claim is never transferred twice.
struct PayoutGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    claim_id: String,
}

impl<'a> PayoutGuard<'a> {
    fn acquire(in_flight: &'a Mutex<HashSet<String>>, claim_id: &str) -> Option<Self> {
        if in_flight.lock().insert(claim_id.to_string()) {
            Some(Self {
                in_flight,
                claim_id: claim_id.to_string(),
            })
        } else {
            None
        }
    }
}

impl Drop for PayoutGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.lock().remove(&self.claim_id);
    }
}

/// The claim oracle.
pub struct ClaimOracle {
    store: Store,
    ledger: Arc<dyn Ledger>,
    signing_key: SigningKey,
    did: Did,
    config: OracleConfig,
    events: ServiceEventsSender,
    payouts: Mutex<HashSet<String>>,
    intake: Mutex<()>,
}

impl ClaimOracle {
    /// Create an oracle signing with `signing_key`.
    #[must_use]
    pub fn new(
        store: Store,
        ledger: Arc<dyn Ledger>,
        signing_key: SigningKey,
        config: OracleConfig,
        events: ServiceEventsSender,
    ) -> Self {
        let did = Did::from_public_key(config.network, &signing_key.verifying_key());
        info!(
            "Claim oracle {did} ready ({} covered diseases, max payout {:.2})",
            config.coverage.len(),
            config.max_payout
        );
        Self {
            store,
            ledger,
            signing_key,
            did,
            config,
            events,
            payouts: Mutex::new(HashSet::new()),
            intake: Mutex::new(()),
        }
    }

    /// The oracle's DID.
    #[must_use]
    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Coverage rules in force.
    #[must_use]
    pub fn coverage(&self) -> &CoverageTable {
        &self.config.coverage
    }

    /// The ledger collaborator.
    #[must_use]
    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    fn emit(&self, event: ServiceEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Validate and store a diagnostic record, anchoring its hash if enabled.
    ///
    /// An anchoring failure is logged and the record is still stored.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed body.
    pub async fn submit_record(&self, body: &Value, now: DateTime<Utc>) -> Result<SubmittedRecord> {
        let draft = validate_health_record(body, now)?;
        let record = draft.into_record(format!("rec-{}", uuid::Uuid::new_v4()))?;
        self.store.records.insert(record.clone())?;
        info!(
            "Record {} stored for {} ({})",
            record.record_id, record.patient_did, record.disease
        );
        self.emit(ServiceEvent::RecordSubmitted {
            record_id: record.record_id.clone(),
        });

        let anchor_transaction = if self.config.anchor_records {
            let memo = format!("primal-health:record:{}", record.data_hash);
            match self.ledger.submit_memo(&memo).await {
                Ok(signature) => {
                    debug!("Record {} anchored in {signature}", record.record_id);
                    Some(signature)
                }
                Err(e) => {
                    warn!("Failed to anchor record {}: {e}", record.record_id);
                    None
                }
            }
        } else {
            None
        };

        Ok(SubmittedRecord {
            record,
            anchor_transaction,
        })
    }

    /// Records owned by `patient`.
    #[must_use]
    pub fn list_records(&self, patient: &Did) -> Vec<HealthRecord> {
        self.store.records.list_by_patient(patient)
    }

    /// Seal the minimal form of a stored record for a claim.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown record, or a validation error for
    /// empty key material.
    pub fn prepare_claim_data(&self, record_id: &str, key_material: &[u8]) -> Result<PreparedClaimData> {
        let cipher = RecordCipher::from_key_material(key_material)?;
        let record = self
            .store
            .records
            .get(record_id)
            .ok_or_else(|| Error::not_found("record", record_id))?;
        let minimal = record.minimal();
        Ok(PreparedClaimData {
            record_id: record.record_id,
            health_data_hash: minimal.content_hash()?,
            encrypted_health_data: cipher.encrypt_record(&minimal)?,
            minimal_record: minimal,
        })
    }

    /// Validate and file a claim in `pending`.
    ///
    /// A record backs at most one live claim: filing against a health data
    /// hash that already has a pending, verified or paid claim fails.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed body, a taken claim id or a
    /// health data hash already claimed.
    pub fn submit_claim(&self, body: &Value, now: DateTime<Utc>) -> Result<InsuranceClaim> {
        let draft = validate_claim(body)?;
        if draft.patient_did == draft.insurance_provider_did {
            return Err(Error::validation(
                "insuranceProviderDID",
                "must differ from patientDID",
            ));
        }

        // Check and append as one step so two filings cannot share a record.
        let _intake = self.intake.lock();
        let already_claimed = self
            .store
            .claims
            .list(&ClaimFilter::by_patient(draft.patient_did.clone()))
            .iter()
            .any(|c| c.health_data_hash == draft.health_data_hash && c.status != ClaimStatus::Rejected);
        if already_claimed {
            warn!(
                "{} filed a second claim against health data {}",
                draft.patient_did, draft.health_data_hash
            );
            return Err(Error::validation(
                "healthDataHash",
                "already backs an open or settled claim",
            ));
        }

        let claim = InsuranceClaim {
            claim_id: draft
                .claim_id
                .unwrap_or_else(|| format!("CLM-{}", uuid::Uuid::new_v4().simple())),
            patient_did: draft.patient_did,
            insurance_provider_did: draft.insurance_provider_did,
            health_data_hash: draft.health_data_hash,
            encrypted_health_data: draft.encrypted_health_data,
            claim_amount: draft.claim_amount,
            currency: draft.currency,
            status: ClaimStatus::Pending,
            timestamp: now,
            patient_signature: draft.patient_signature,
            verification_timestamp: None,
            payment_amount: None,
            payment_transaction_id: None,
            rejection_reason: None,
        };
        self.store.claims.append(claim.clone())?;
        info!(
            "Claim {} filed by {} for {:.2} {}",
            claim.claim_id, claim.patient_did, claim.claim_amount, claim.currency
        );
        self.emit(ServiceEvent::ClaimSubmitted {
            claim_id: claim.claim_id.clone(),
        });
        Ok(claim)
    }

    /// Look up a claim.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id.
    pub fn get_claim(&self, claim_id: &str) -> Result<InsuranceClaim> {
        self.store
            .claims
            .get(claim_id)
            .ok_or_else(|| Error::not_found("claim", claim_id))
    }

    /// Claims passing `filter`.
    #[must_use]
    pub fn list_claims(&self, filter: &ClaimFilter) -> Vec<InsuranceClaim> {
        self.store.claims.list(filter)
    }

    /// Check signature, ciphertext and coverage, then decide.
    fn assess(&self, claim: &InsuranceClaim, cipher: &RecordCipher, now: DateTime<Utc>) -> Assessment {
        let Some(signature) = claim.patient_signature.as_deref() else {
            warn!("Claim {} carries no patient signature", claim.claim_id);
            return Assessment::Reject(REASON_UNVERIFIABLE);
        };
        if let Err(e) = verify_did_signature(&claim.patient_did, &claim.signing_message(), signature) {
            warn!("Claim {} signature rejected: {e}", claim.claim_id);
            return Assessment::Reject(REASON_UNVERIFIABLE);
        }

        let minimal = match cipher.decrypt_record(&claim.encrypted_health_data) {
            Ok(m) => m,
            Err(e) => {
                warn!("Claim {} health data unreadable: {e}", claim.claim_id);
                return Assessment::Reject(REASON_UNVERIFIABLE);
            }
        };
        match minimal.content_hash() {
            Ok(hash) if hash == claim.health_data_hash && minimal.patient_did == claim.patient_did => {}
            Ok(_) => {
                warn!("Claim {} health data does not match its hash", claim.claim_id);
                return Assessment::Reject(REASON_UNVERIFIABLE);
            }
            Err(e) => {
                warn!("Claim {} health data could not be hashed: {e}", claim.claim_id);
                return Assessment::Reject(REASON_UNVERIFIABLE);
            }
        }

        let on_record = self
            .store
            .records
            .list_by_patient(&claim.patient_did)
            .iter()
            .any(|r| r.data_hash == claim.health_data_hash);
        if !on_record {
            warn!(
                "Claim {} health data matches no stored record of {}",
                claim.claim_id, claim.patient_did
            );
            return Assessment::Reject(REASON_UNVERIFIABLE);
        }
        let settled_elsewhere = self
            .store
            .claims
            .list(&ClaimFilter::by_patient(claim.patient_did.clone()))
            .iter()
            .any(|c| {
                c.claim_id != claim.claim_id
                    && c.health_data_hash == claim.health_data_hash
                    && matches!(c.status, ClaimStatus::Verified | ClaimStatus::Paid)
            });
        if settled_elsewhere {
            warn!(
                "Claim {} reuses health data already approved in another claim",
                claim.claim_id
            );
            return Assessment::Reject(REASON_UNVERIFIABLE);
        }

        match self.config.coverage.assess(&minimal) {
            Eligibility::Eligible { base_amount } => {
                let mut amount = payment_amount(base_amount, minimal.age_at(now));
                if amount > self.config.max_payout {
                    warn!(
                        "Claim {} payout {amount:.2} capped at {:.2}",
                        claim.claim_id, self.config.max_payout
                    );
                    amount = self.config.max_payout;
                }
                Assessment::Approve(amount)
            }
            other => Assessment::Reject(other.rejection_reason().unwrap_or(REASON_UNVERIFIABLE)),
        }
    }

    /// Verify a pending claim with the key that sealed its health data, and
    /// pay it out when approved.
    ///
    /// A rejection is a successful outcome. If the payout fails the claim
    /// stays `verified` and the ledger error is returned.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown claim, an invalid-transition error if
    /// the claim is not pending, a validation error for empty key material, or
    /// a network error if the payout fails.
    pub async fn verify_claim(
        &self,
        claim_id: &str,
        key_material: &[u8],
        now: DateTime<Utc>,
    ) -> Result<VerificationOutcome> {
        let cipher = RecordCipher::from_key_material(key_material)?;
        let claim = self.get_claim(claim_id)?;
        if claim.status != ClaimStatus::Pending {
            return Err(Error::InvalidTransition {
                from: claim.status.to_string(),
                to: ClaimStatus::Verified.to_string(),
            });
        }

        match self.assess(&claim, &cipher, now) {
            Assessment::Reject(reason) => {
                let claim = self
                    .store
                    .claims
                    .update(claim_id, &mut |c| c.mark_rejected(reason))?
                    .ok_or_else(|| Error::not_found("claim", claim_id))?;
                info!("Claim {claim_id} rejected: {reason}");
                self.emit(ServiceEvent::ClaimRejected {
                    claim_id: claim_id.to_string(),
                    reason: reason.to_string(),
                });
                let attestation = self.attest(&claim, None, now);
                Ok(VerificationOutcome { claim, attestation })
            }
            Assessment::Approve(amount) => {
                self.store
                    .claims
                    .update(claim_id, &mut |c| c.mark_verified(amount, now))?
                    .ok_or_else(|| Error::not_found("claim", claim_id))?;
                info!("Claim {claim_id} verified for {amount:.2}");
                self.emit(ServiceEvent::ClaimVerified {
                    claim_id: claim_id.to_string(),
                    amount,
                });
                let claim = self.pay_out(claim_id).await?;
                let attestation = self.attest(&claim, Some(amount), now);
                Ok(VerificationOutcome { claim, attestation })
            }
        }
    }

    fn attest(&self, claim: &InsuranceClaim, amount: Option<f64>, now: DateTime<Utc>) -> Attestation {
        Attestation::sign(
            &self.signing_key,
            self.did.clone(),
            claim.claim_id.clone(),
            claim.status,
            amount,
            now,
        )
    }

    /// Transfer the approved amount of a verified claim and mark it paid.
    async fn pay_out(&self, claim_id: &str) -> Result<InsuranceClaim> {
        let Some(_guard) = PayoutGuard::acquire(&self.payouts, claim_id) else {
            return Err(Error::InvalidTransition {
                from: ClaimStatus::Verified.to_string(),
                to: ClaimStatus::Paid.to_string(),
            });
        };

        // Re-read under the guard; another payout may have finished first.
        let claim = self.get_claim(claim_id)?;
        if claim.status != ClaimStatus::Verified {
            return Err(Error::InvalidTransition {
                from: claim.status.to_string(),
                to: ClaimStatus::Paid.to_string(),
            });
        }
        let amount = claim.payment_amount.unwrap_or(claim.claim_amount);
        let memo = format!("primal-health:claim:{claim_id}");

        let signature = match self
            .ledger
            .transfer(&claim.patient_did, amount, claim.currency, &memo)
            .await
        {
            Ok(signature) => signature,
            Err(e) => {
                warn!("Payout for claim {claim_id} failed, claim stays verified: {e}");
                self.emit(ServiceEvent::Error {
                    message: format!("payout for claim {claim_id} failed: {e}"),
                });
                return Err(match e {
                    Error::Network(msg) => Error::Network(msg),
                    other => Error::Network(other.to_string()),
                });
            }
        };

        let paid = self
            .store
            .claims
            .update(claim_id, &mut |c| c.mark_paid(signature.clone()))?
            .ok_or_else(|| Error::not_found("claim", claim_id))?;
        info!("Claim {claim_id} paid {amount:.2} {} in {signature}", paid.currency);
        self.emit(ServiceEvent::ClaimPaid {
            claim_id: claim_id.to_string(),
            transaction_id: signature,
        });
        Ok(paid)
    }

    /// Check that `provider` is the claim's registered provider and signed
    /// [`provider_signing_message`] for `action` and `status`.
    fn authorize_provider(
        &self,
        claim: &InsuranceClaim,
        provider: &Did,
        signature: Option<&str>,
        action: ProviderAction,
        status: ClaimStatus,
    ) -> Result<()> {
        let claim_id = &claim.claim_id;
        if &claim.insurance_provider_did != provider {
            warn!("{provider} attempted to act on claim {claim_id} it does not own");
            return Err(Error::Unauthorized(format!(
                "only the claim's provider may act on claim {claim_id}"
            )));
        }
        let registered = self
            .store
            .identities
            .get(provider)
            .is_some_and(|identity| identity.role == Role::Provider);
        if !registered {
            warn!("{provider} is not a registered provider");
            return Err(Error::Unauthorized(format!(
                "{provider} is not a registered provider"
            )));
        }
        let Some(signature) = signature else {
            warn!("Unsigned {} request for claim {claim_id}", action.as_str());
            return Err(Error::Unauthorized(
                "providerSignature is required".to_string(),
            ));
        };
        let message = provider_signing_message(claim_id, action, status);
        verify_did_signature(provider, &message, signature).map_err(|e| {
            warn!("Provider signature for claim {claim_id} rejected: {e}");
            Error::Unauthorized(format!("provider signature rejected for claim {claim_id}"))
        })
    }

    /// Pay a verified claim on behalf of its provider.
    ///
    /// `signature` is the provider's base58 signature over
    /// [`provider_signing_message`] with [`ProviderAction::Pay`] and `paid`.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown claim, unauthorized if `provider` is
    /// not the claim's registered provider or the signature is missing or
    /// wrong, an invalid-transition error if the claim is not verified, or a
    /// network error if the transfer fails.
    pub async fn process_payment(
        &self,
        claim_id: &str,
        provider: &Did,
        signature: Option<&str>,
    ) -> Result<InsuranceClaim> {
        let claim = self.get_claim(claim_id)?;
        self.authorize_provider(&claim, provider, signature, ProviderAction::Pay, ClaimStatus::Paid)?;
        self.pay_out(claim_id).await
    }

    /// Set a claim to `verified` or `rejected` on behalf of its provider.
    ///
    /// `signature` is the provider's base58 signature over
    /// [`provider_signing_message`] with [`ProviderAction::SetStatus`] and the
    /// target status. A provider-verified claim is approved for its requested
    /// amount, capped by the payout bound. The status cannot change while a
    /// payout for the claim is in flight.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown claim, unauthorized if `provider` is
    /// not the claim's registered provider or the signature is missing or
    /// wrong, a validation error for a target status other than `verified` or
    /// `rejected`, or an invalid-transition error if the move is not allowed or
    /// a payout is in flight.
    pub fn update_status(
        &self,
        claim_id: &str,
        provider: &Did,
        signature: Option<&str>,
        status: ClaimStatus,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<InsuranceClaim> {
        let claim = self.get_claim(claim_id)?;
        self.authorize_provider(&claim, provider, signature, ProviderAction::SetStatus, status)?;

        let Some(_guard) = PayoutGuard::acquire(&self.payouts, claim_id) else {
            warn!("Status change for claim {claim_id} refused, payout in flight");
            return Err(Error::InvalidTransition {
                from: claim.status.to_string(),
                to: status.to_string(),
            });
        };

        match status {
            ClaimStatus::Verified => {
                let amount = claim.claim_amount.min(self.config.max_payout);
                let updated = self
                    .store
                    .claims
                    .update(claim_id, &mut |c| c.mark_verified(amount, now))?
                    .ok_or_else(|| Error::not_found("claim", claim_id))?;
                info!("Claim {claim_id} verified by provider for {amount:.2}");
                self.emit(ServiceEvent::ClaimVerified {
                    claim_id: claim_id.to_string(),
                    amount,
                });
                Ok(updated)
            }
            ClaimStatus::Rejected => {
                let reason = reason
                    .filter(|r| !r.trim().is_empty())
                    .unwrap_or_else(|| REASON_PROVIDER_REJECTED.to_string());
                let updated = self
                    .store
                    .claims
                    .update(claim_id, &mut |c| c.mark_rejected(reason.clone()))?
                    .ok_or_else(|| Error::not_found("claim", claim_id))?;
                info!("Claim {claim_id} rejected by provider: {reason}");
                self.emit(ServiceEvent::ClaimRejected {
                    claim_id: claim_id.to_string(),
                    reason,
                });
                Ok(updated)
            }
            other => Err(Error::validation(
                "status",
                format!("cannot set status to {other}; use verified or rejected"),
            )),
        }
    }

    /// Claim counts and the total paid.
    #[must_use]
    pub fn analytics(&self) -> ClaimAnalytics {
        self.store
            .claims
            .list(&ClaimFilter::default())
            .iter()
            .fold(ClaimAnalytics::default(), |mut acc, claim| {
                acc.total += 1;
                match claim.status {
                    ClaimStatus::Pending => acc.pending += 1,
                    ClaimStatus::Verified => acc.verified += 1,
                    ClaimStatus::Paid => {
                        acc.paid += 1;
                        acc.total_paid += claim.payment_amount.unwrap_or(claim.claim_amount);
                    }
                    ClaimStatus::Rejected => acc.rejected += 1,
                }
                acc
            })
    }

    /// Status of a ledger transaction.
    ///
    /// # Errors
    ///
    /// Propagates ledger failures.
    pub async fn transaction_status(&self, signature: &str) -> Result<Option<TransactionStatus>> {
        self.ledger.transaction_status(signature).await
    }
}
