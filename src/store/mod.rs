//! Repository abstractions over claims, records, consents, privacy settings and
//! identities.
//!
//! Services receive repositories as trait objects so the backend can be
//! swapped. Every `update` runs its mutator against a copy under the backend's
//! write lock and only commits when the mutator succeeds, so a failed mutation
//! leaves the stored value untouched and concurrent updates cannot be lost.

mod memory;

pub use memory::MemoryStore;

use crate::claim::{ClaimStatus, InsuranceClaim};
use crate::consent::{PatientConsent, PrivacySettings};
use crate::did::{Did, Identity};
use crate::error::Result;
use crate::record::HealthRecord;
use std::sync::Arc;

/// Predicate for listing claims. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct ClaimFilter {
    /// Only claims by this patient.
    pub patient_did: Option<Did>,
    /// Only the claim with this id.
    pub claim_id: Option<String>,
    /// Only claims assigned to this provider.
    pub provider_did: Option<Did>,
    /// Only claims in this status.
    pub status: Option<ClaimStatus>,
}

impl ClaimFilter {
    /// Filter by patient.
    #[must_use]
    pub fn by_patient(did: Did) -> Self {
        Self {
            patient_did: Some(did),
            ..Self::default()
        }
    }

    /// Whether `claim` passes the filter.
    #[must_use]
    pub fn matches(&self, claim: &InsuranceClaim) -> bool {
        self.patient_did
            .as_ref()
            .map_or(true, |d| &claim.patient_did == d)
            && self
                .claim_id
                .as_ref()
                .map_or(true, |id| &claim.claim_id == id)
            && self
                .provider_did
                .as_ref()
                .map_or(true, |d| &claim.insurance_provider_did == d)
            && self.status.map_or(true, |s| claim.status == s)
    }
}

/// Mutator applied by `update` operations.
pub type Mutator<'a, T> = &'a mut dyn FnMut(&mut T) -> Result<()>;

/// Storage for insurance claims.
pub trait ClaimRepository: Send + Sync {
    /// Store a new claim.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the claim id is already taken.
    fn append(&self, claim: InsuranceClaim) -> Result<()>;

    /// Look up a claim by id.
    fn get(&self, claim_id: &str) -> Option<InsuranceClaim>;

    /// All claims passing `filter`, in submission order.
    fn list(&self, filter: &ClaimFilter) -> Vec<InsuranceClaim>;

    /// Apply `mutator` to the first claim with `claim_id`.
    ///
    /// Returns `Ok(None)` if no such claim exists.
    ///
    /// # Errors
    ///
    /// Propagates the mutator's error; the stored claim is left unchanged.
    fn update(
        &self,
        claim_id: &str,
        mutator: Mutator<'_, InsuranceClaim>,
    ) -> Result<Option<InsuranceClaim>>;
}

/// Storage for diagnostic records.
pub trait RecordRepository: Send + Sync {
    /// Store a new record.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the record id is already taken.
    fn insert(&self, record: HealthRecord) -> Result<()>;

    /// Look up a record by id.
    fn get(&self, record_id: &str) -> Option<HealthRecord>;

    /// All records owned by `patient`, in submission order.
    fn list_by_patient(&self, patient: &Did) -> Vec<HealthRecord>;

    /// Keep only the records for which `keep` returns true. Returns the number
    /// removed.
    fn retain(&self, keep: &mut dyn FnMut(&HealthRecord) -> bool) -> usize;
}

/// Storage for consent grants.
pub trait ConsentRepository: Send + Sync {
    /// Store a new consent.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the consent id is already taken.
    fn insert(&self, consent: PatientConsent) -> Result<()>;

    /// Look up a consent by id.
    fn get(&self, consent_id: &str) -> Option<PatientConsent>;

    /// All consents granted by `patient`.
    fn list_by_patient(&self, patient: &Did) -> Vec<PatientConsent>;

    /// Apply `mutator` to the consent with `consent_id`.
    ///
    /// # Errors
    ///
    /// Propagates the mutator's error; the stored consent is left unchanged.
    fn update(
        &self,
        consent_id: &str,
        mutator: Mutator<'_, PatientConsent>,
    ) -> Result<Option<PatientConsent>>;
}

/// Storage for per-patient privacy settings.
pub trait SettingsRepository: Send + Sync {
    /// Settings for `patient`, if any were ever created.
    fn get(&self, patient: &Did) -> Option<PrivacySettings>;

    /// Settings for `patient`, created with defaults on first access.
    fn get_or_create(&self, patient: &Did) -> PrivacySettings;

    /// Apply `mutator` to the settings for `patient`, creating defaults first
    /// if needed.
    ///
    /// # Errors
    ///
    /// Propagates the mutator's error; the stored settings are left unchanged.
    fn update(
        &self,
        patient: &Did,
        mutator: Mutator<'_, PrivacySettings>,
    ) -> Result<PrivacySettings>;
}

/// Storage for registered identities.
pub trait IdentityRepository: Send + Sync {
    /// Register `identity`. Registering the same DID again with the same role
    /// returns the existing identity.
    ///
    /// # Errors
    ///
    /// Returns an authorization error if the DID is registered with another
    /// role.
    fn register(&self, identity: Identity) -> Result<Identity>;

    /// Look up an identity.
    fn get(&self, did: &Did) -> Option<Identity>;
}

/// Bundle of repositories handed to services.
#[derive(Clone)]
pub struct Store {
    /// Claims.
    pub claims: Arc<dyn ClaimRepository>,
    /// Health records.
    pub records: Arc<dyn RecordRepository>,
    /// Consents.
    pub consents: Arc<dyn ConsentRepository>,
    /// Privacy settings.
    pub settings: Arc<dyn SettingsRepository>,
    /// Identities.
    pub identities: Arc<dyn IdentityRepository>,
}

impl Store {
    /// A store whose repositories all live in one in-memory backend.
    #[must_use]
    pub fn in_memory() -> Self {
        let backend = Arc::new(MemoryStore::new());
        Self {
            claims: backend.clone(),
            records: backend.clone(),
            consents: backend.clone(),
            settings: backend.clone(),
            identities: backend,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::in_memory()
    }
}
