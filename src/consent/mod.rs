//! Patient consent and privacy settings.
//!
//! A consent lets a set of providers see a set of record fields during a time
//! window. Sharing is permitted only while the consent is unrevoked, inside
//! its window, and lists both the provider and the field.

mod privacy;
mod retention;

pub use privacy::{PrivacySettings, PrivacySettingsUpdate};
pub use retention::{purge_expired_records, RetentionSweeper};

use crate::did::Did;
use crate::error::{Error, Result};
use crate::event::{ServiceEvent, ServiceEventsSender};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info};

/// Record fields a consent can cover.
pub const SHAREABLE_FIELDS: &[&str] = &[
    "diagnosticResult",
    "disease",
    "result",
    "testType",
    "labName",
    "confidence",
    "notes",
    "timestamp",
];

/// Field shared when a grant does not name any.
pub const DEFAULT_SHARED_FIELD: &str = "diagnosticResult";

/// A consent grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientConsent {
    /// Unique consent id.
    pub consent_id: String,
    /// Granting patient.
    #[serde(rename = "patientDID")]
    pub patient_did: Did,
    /// Field names the consent covers.
    pub consented_data: BTreeSet<String>,
    /// Providers allowed to see the fields.
    #[serde(rename = "authorizedProviderDIDs")]
    pub authorized_providers: BTreeSet<Did>,
    /// Start of the window.
    pub valid_from: DateTime<Utc>,
    /// End of the window.
    pub valid_until: DateTime<Utc>,
    /// Set once revoked.
    pub revoked: bool,
}

impl PatientConsent {
    /// Whether the consent is in force at `now`.
    #[must_use]
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.revoked && self.valid_from <= now && now < self.valid_until
    }

    /// Whether `provider` may see `field` at `now`.
    #[must_use]
    pub fn permits(&self, provider: &Did, field: &str, now: DateTime<Utc>) -> bool {
        self.is_active(now)
            && self.authorized_providers.contains(provider)
            && self.consented_data.contains(field)
    }
}

/// Request to grant a consent. Absent fields take configured defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentGrant {
    /// Granting patient.
    #[serde(rename = "patientDID")]
    pub patient_did: String,
    /// Fields to share.
    #[serde(default)]
    pub consented_data: Option<Vec<String>>,
    /// Providers to share with.
    #[serde(default, rename = "authorizedProviderDIDs")]
    pub authorized_providers: Option<Vec<String>>,
    /// Window start; now if absent.
    #[serde(default)]
    pub valid_from: Option<DateTime<Utc>>,
    /// Window end; `valid_from` plus the default validity if absent.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Changes to an existing consent. Absent fields are left alone.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentUpdate {
    /// Replacement field set.
    #[serde(default)]
    pub consented_data: Option<Vec<String>>,
    /// Replacement provider set.
    #[serde(default, rename = "authorizedProviderDIDs")]
    pub authorized_providers: Option<Vec<String>>,
    /// New window end.
    #[serde(default)]
    pub valid_until: Option<DateTime<Utc>>,
}

/// Longest default consent window, in days.
pub const MAX_VALIDITY_DAYS: i64 = 36_500;

/// Consent and privacy operations over the repositories.
#[derive(Clone)]
pub struct ConsentManager {
    store: Store,
    default_provider: Did,
    default_validity: Duration,
    events: Option<ServiceEventsSender>,
}

impl ConsentManager {
    /// Create a manager granting to `default_provider` for `default_validity_days`
    /// when requests leave those out. The window is clamped to
    /// `1..=MAX_VALIDITY_DAYS`.
    #[must_use]
    pub fn new(store: Store, default_provider: Did, default_validity_days: i64) -> Self {
        Self {
            store,
            default_provider,
            default_validity: Duration::days(default_validity_days.clamp(1, MAX_VALIDITY_DAYS)),
            events: None,
        }
    }

    /// Publish grants and revocations on `events`.
    #[must_use]
    pub fn with_events(mut self, events: ServiceEventsSender) -> Self {
        self.events = Some(events);
        self
    }

    fn emit(&self, event: ServiceEvent) {
        if let Some(ref events) = self.events {
            let _ = events.send(event);
        }
    }

    /// Grant a consent.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a bad DID, unknown field or empty window.
    pub fn grant(&self, request: ConsentGrant, now: DateTime<Utc>) -> Result<PatientConsent> {
        let patient_did = crate::validation::validate_did("patientDID", &request.patient_did)?;

        let consented_data = match request.consented_data {
            Some(fields) => parse_fields(fields)?,
            None => BTreeSet::from([DEFAULT_SHARED_FIELD.to_string()]),
        };
        let authorized_providers = match request.authorized_providers {
            Some(providers) => parse_providers(providers)?,
            None => BTreeSet::from([self.default_provider.clone()]),
        };

        let valid_from = request.valid_from.unwrap_or(now);
        let valid_until = match request.valid_until {
            Some(until) => until,
            None => valid_from
                .checked_add_signed(self.default_validity)
                .ok_or_else(|| Error::validation("validFrom", "is too far in the future"))?,
        };
        if valid_until <= valid_from {
            return Err(Error::validation("validUntil", "must be after validFrom"));
        }

        let consent = PatientConsent {
            consent_id: format!("consent-{}", uuid::Uuid::new_v4()),
            patient_did,
            consented_data,
            authorized_providers,
            valid_from,
            valid_until,
            revoked: false,
        };
        self.store.consents.insert(consent.clone())?;
        info!(
            "Consent {} granted by {}",
            consent.consent_id, consent.patient_did
        );
        self.emit(ServiceEvent::ConsentGranted {
            consent_id: consent.consent_id.clone(),
        });
        Ok(consent)
    }

    /// Revoke a consent. Returns `false` if the id is unknown.
    ///
    /// # Errors
    ///
    /// Only propagates repository failures.
    pub fn revoke(&self, consent_id: &str) -> Result<bool> {
        let updated = self.store.consents.update(consent_id, &mut |c| {
            c.revoked = true;
            Ok(())
        })?;
        match updated {
            Some(_) => {
                info!("Consent {consent_id} revoked");
                self.emit(ServiceEvent::ConsentRevoked {
                    consent_id: consent_id.to_string(),
                });
                Ok(true)
            }
            None => {
                debug!("Revoke of unknown consent {consent_id}");
                Ok(false)
            }
        }
    }

    /// Consents granted by `patient` that are in force at `now`.
    #[must_use]
    pub fn list_active(&self, patient: &Did, now: DateTime<Utc>) -> Vec<PatientConsent> {
        self.store
            .consents
            .list_by_patient(patient)
            .into_iter()
            .filter(|c| c.is_active(now))
            .collect()
    }

    /// Change the fields, providers or window end of an unrevoked consent.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id and a validation error for a
    /// revoked consent or bad input.
    pub fn update(&self, consent_id: &str, update: ConsentUpdate) -> Result<PatientConsent> {
        let fields = update.consented_data.map(parse_fields).transpose()?;
        let providers = update
            .authorized_providers
            .map(parse_providers)
            .transpose()?;

        self.store
            .consents
            .update(consent_id, &mut |c| {
                if c.revoked {
                    return Err(Error::validation("consentId", "consent is revoked"));
                }
                if let Some(ref f) = fields {
                    c.consented_data = f.clone();
                }
                if let Some(ref p) = providers {
                    c.authorized_providers = p.clone();
                }
                if let Some(until) = update.valid_until {
                    if until <= c.valid_from {
                        return Err(Error::validation("validUntil", "must be after validFrom"));
                    }
                    c.valid_until = until;
                }
                Ok(())
            })?
            .ok_or_else(|| Error::not_found("consent", consent_id))
    }

    /// Whether any of `patient`'s consents lets `provider` see `field` at `now`.
    #[must_use]
    pub fn can_share(&self, patient: &Did, provider: &Did, field: &str, now: DateTime<Utc>) -> bool {
        self.store
            .consents
            .list_by_patient(patient)
            .iter()
            .any(|c| c.permits(provider, field, now))
    }

    /// Privacy settings for `patient`, created with defaults on first access.
    #[must_use]
    pub fn privacy_settings(&self, patient: &Did) -> PrivacySettings {
        self.store.settings.get_or_create(patient)
    }

    /// Merge `update` into `patient`'s settings.
    ///
    /// # Errors
    ///
    /// Only propagates repository failures.
    pub fn update_privacy_settings(
        &self,
        patient: &Did,
        update: &PrivacySettingsUpdate,
        now: DateTime<Utc>,
    ) -> Result<PrivacySettings> {
        let settings = self.store.settings.update(patient, &mut |s| {
            s.apply(update, now);
            Ok(())
        })?;
        info!("Privacy settings updated for {patient}");
        Ok(settings)
    }
}

fn parse_fields(fields: Vec<String>) -> Result<BTreeSet<String>> {
    if fields.is_empty() {
        return Err(Error::validation("consentedData", "must not be empty"));
    }
    for field in &fields {
        if !SHAREABLE_FIELDS.contains(&field.as_str()) {
            return Err(Error::validation(
                "consentedData",
                format!("unknown field '{field}'"),
            ));
        }
    }
    Ok(fields.into_iter().collect())
}

fn parse_providers(providers: Vec<String>) -> Result<BTreeSet<Did>> {
    if providers.is_empty() {
        return Err(Error::validation("authorizedProviderDIDs", "must not be empty"));
    }
    providers
        .iter()
        .map(|p| crate::validation::validate_did("authorizedProviderDIDs", p))
        .collect()
}
