//! In-memory repository backend.

use super::{
    ClaimFilter, ClaimRepository, ConsentRepository, IdentityRepository, Mutator,
    RecordRepository, SettingsRepository,
};
use crate::claim::InsuranceClaim;
use crate::consent::{PatientConsent, PrivacySettings};
use crate::did::{Did, Identity};
use crate::error::{Error, Result};
use crate::record::HealthRecord;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Process-lifetime storage guarded by reader-writer locks.
#[derive(Default)]
pub struct MemoryStore {
    claims: RwLock<Vec<InsuranceClaim>>,
    records: RwLock<Vec<HealthRecord>>,
    consents: RwLock<Vec<PatientConsent>>,
    settings: RwLock<HashMap<Did, PrivacySettings>>,
    identities: RwLock<HashMap<Did, Identity>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Run `mutator` on a copy of `slot` and commit only on success.
fn apply<T: Clone>(slot: &mut T, mutator: Mutator<'_, T>) -> Result<T> {
    let mut working = slot.clone();
    mutator(&mut working)?;
    *slot = working.clone();
    Ok(working)
}

impl ClaimRepository for MemoryStore {
    fn append(&self, claim: InsuranceClaim) -> Result<()> {
        let mut claims = self.claims.write();
        if claims.iter().any(|c| c.claim_id == claim.claim_id) {
            return Err(Error::validation("claimId", "already exists"));
        }
        debug!("Appending claim {}", claim.claim_id);
        claims.push(claim);
        Ok(())
    }

    fn get(&self, claim_id: &str) -> Option<InsuranceClaim> {
        self.claims
            .read()
            .iter()
            .find(|c| c.claim_id == claim_id)
            .cloned()
    }

    fn list(&self, filter: &ClaimFilter) -> Vec<InsuranceClaim> {
        self.claims
            .read()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect()
    }

    fn update(
        &self,
        claim_id: &str,
        mutator: Mutator<'_, InsuranceClaim>,
    ) -> Result<Option<InsuranceClaim>> {
        let mut claims = self.claims.write();
        match claims.iter_mut().find(|c| c.claim_id == claim_id) {
            Some(slot) => apply(slot, mutator).map(Some),
            None => {
                debug!("Update on unknown claim {claim_id} ignored");
                Ok(None)
            }
        }
    }
}

impl RecordRepository for MemoryStore {
    fn insert(&self, record: HealthRecord) -> Result<()> {
        let mut records = self.records.write();
        if records.iter().any(|r| r.record_id == record.record_id) {
            return Err(Error::validation("recordId", "already exists"));
        }
        records.push(record);
        Ok(())
    }

    fn get(&self, record_id: &str) -> Option<HealthRecord> {
        self.records
            .read()
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned()
    }

    fn list_by_patient(&self, patient: &Did) -> Vec<HealthRecord> {
        self.records
            .read()
            .iter()
            .filter(|r| &r.patient_did == patient)
            .cloned()
            .collect()
    }

    fn retain(&self, keep: &mut dyn FnMut(&HealthRecord) -> bool) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|r| keep(r));
        before - records.len()
    }
}

impl ConsentRepository for MemoryStore {
    fn insert(&self, consent: PatientConsent) -> Result<()> {
        let mut consents = self.consents.write();
        if consents.iter().any(|c| c.consent_id == consent.consent_id) {
            return Err(Error::validation("consentId", "already exists"));
        }
        consents.push(consent);
        Ok(())
    }

    fn get(&self, consent_id: &str) -> Option<PatientConsent> {
        self.consents
            .read()
            .iter()
            .find(|c| c.consent_id == consent_id)
            .cloned()
    }

    fn list_by_patient(&self, patient: &Did) -> Vec<PatientConsent> {
        self.consents
            .read()
            .iter()
            .filter(|c| &c.patient_did == patient)
            .cloned()
            .collect()
    }

    fn update(
        &self,
        consent_id: &str,
        mutator: Mutator<'_, PatientConsent>,
    ) -> Result<Option<PatientConsent>> {
        let mut consents = self.consents.write();
        match consents.iter_mut().find(|c| c.consent_id == consent_id) {
            Some(slot) => apply(slot, mutator).map(Some),
            None => Ok(None),
        }
    }
}

impl SettingsRepository for MemoryStore {
    fn get(&self, patient: &Did) -> Option<PrivacySettings> {
        self.settings.read().get(patient).cloned()
    }

    fn get_or_create(&self, patient: &Did) -> PrivacySettings {
        if let Some(existing) = self.settings.read().get(patient) {
            return existing.clone();
        }
        self.settings
            .write()
            .entry(patient.clone())
            .or_insert_with(|| PrivacySettings::defaults_for(patient.clone()))
            .clone()
    }

    fn update(
        &self,
        patient: &Did,
        mutator: Mutator<'_, PrivacySettings>,
    ) -> Result<PrivacySettings> {
        let mut settings = self.settings.write();
        let slot = settings
            .entry(patient.clone())
            .or_insert_with(|| PrivacySettings::defaults_for(patient.clone()));
        apply(slot, mutator)
    }
}

impl IdentityRepository for MemoryStore {
    fn register(&self, identity: Identity) -> Result<Identity> {
        let mut identities = self.identities.write();
        if let Some(existing) = identities.get(&identity.did) {
            if existing.role != identity.role {
                return Err(Error::Unauthorized(format!(
                    "{} is already registered as a {}",
                    identity.did, existing.role
                )));
            }
            return Ok(existing.clone());
        }
        identities.insert(identity.did.clone(), identity.clone());
        Ok(identity)
    }

    fn get(&self, did: &Did) -> Option<Identity> {
        self.identities.read().get(did).cloned()
    }
}
