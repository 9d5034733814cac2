//! Per-patient privacy settings.

use crate::did::Did;
use crate::record::RetentionPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Retention and sharing defaults for one patient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivacySettings {
    /// Owning patient.
    #[serde(rename = "patientDID")]
    pub patient_did: Did,
    /// How long records are kept.
    pub data_retention: RetentionPolicy,
    /// Delete records automatically once retention lapses.
    pub auto_delete: bool,
    /// Require an explicit consent before any sharing.
    pub require_explicit_consent: bool,
    /// Strip identifying metadata before external storage.
    pub anonymize_data: bool,
    /// Keep an audit trail of access.
    pub audit_logging: bool,
    /// Last modification.
    pub updated_at: DateTime<Utc>,
}

impl PrivacySettings {
    /// Default settings for a patient that never configured any.
    #[must_use]
    pub fn defaults_for(patient_did: Did) -> Self {
        Self {
            patient_did,
            data_retention: RetentionPolicy::Standard,
            auto_delete: false,
            require_explicit_consent: true,
            anonymize_data: true,
            audit_logging: true,
            updated_at: Utc::now(),
        }
    }

    /// Merge `update` into these settings and stamp the time.
    pub fn apply(&mut self, update: &PrivacySettingsUpdate, at: DateTime<Utc>) {
        if let Some(v) = update.data_retention {
            self.data_retention = v;
        }
        if let Some(v) = update.auto_delete {
            self.auto_delete = v;
        }
        if let Some(v) = update.require_explicit_consent {
            self.require_explicit_consent = v;
        }
        if let Some(v) = update.anonymize_data {
            self.anonymize_data = v;
        }
        if let Some(v) = update.audit_logging {
            self.audit_logging = v;
        }
        self.updated_at = at;
    }
}

/// Partial update of [`PrivacySettings`]. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PrivacySettingsUpdate {
    /// New retention policy.
    #[serde(default)]
    pub data_retention: Option<RetentionPolicy>,
    /// New auto-delete flag.
    #[serde(default)]
    pub auto_delete: Option<bool>,
    /// New explicit-consent flag.
    #[serde(default)]
    pub require_explicit_consent: Option<bool>,
    /// New anonymize flag.
    #[serde(default)]
    pub anonymize_data: Option<bool>,
    /// New audit flag.
    #[serde(default)]
    pub audit_logging: Option<bool>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn patient() -> Did {
        Did::parse("did:solana:devnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").expect("valid")
    }

    #[test]
    fn test_defaults() {
        let s = PrivacySettings::defaults_for(patient());
        assert_eq!(s.data_retention, RetentionPolicy::Standard);
        assert!(!s.auto_delete);
        assert!(s.require_explicit_consent);
        assert!(s.anonymize_data);
        assert!(s.audit_logging);
    }

    #[test]
    fn test_merge_only_touches_given_fields() {
        let mut s = PrivacySettings::defaults_for(patient());
        let at = s.updated_at + Duration::seconds(5);
        s.apply(
            &PrivacySettingsUpdate {
                data_retention: Some(RetentionPolicy::Minimal),
                auto_delete: Some(true),
                ..PrivacySettingsUpdate::default()
            },
            at,
        );
        assert_eq!(s.data_retention, RetentionPolicy::Minimal);
        assert!(s.auto_delete);
        assert!(s.anonymize_data);
        assert_eq!(s.updated_at, at);
    }

    #[test]
    fn test_update_rejects_unknown_fields() {
        let parsed: Result<PrivacySettingsUpdate, _> =
            serde_json::from_str(r#"{"autoDelete": true, "shareWithEveryone": true}"#);
        assert!(parsed.is_err());
    }
}
