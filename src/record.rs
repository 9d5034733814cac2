//! Health diagnostic records.

use crate::did::Did;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Outcome of a diagnostic test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestResult {
    /// Condition detected.
    Positive,
    /// Condition not detected.
    Negative,
    /// Test could not decide.
    Inconclusive,
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => f.write_str("positive"),
            Self::Negative => f.write_str("negative"),
            Self::Inconclusive => f.write_str("inconclusive"),
        }
    }
}

/// How long a record is kept before it becomes eligible for deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// 30 days.
    Minimal,
    /// 90 days.
    #[default]
    Standard,
    /// 365 days.
    Extended,
}

impl RetentionPolicy {
    /// Retention period in days.
    #[must_use]
    pub const fn days(&self) -> i64 {
        match self {
            Self::Minimal => 30,
            Self::Standard => 90,
            Self::Extended => 365,
        }
    }

    /// Retention period as a duration.
    #[must_use]
    pub fn period(&self) -> Duration {
        Duration::days(self.days())
    }

    /// Whichever of `self` and `other` keeps data for less time.
    #[must_use]
    pub const fn stricter(self, other: Self) -> Self {
        if other.days() < self.days() {
            other
        } else {
            self
        }
    }
}

/// A stored diagnostic record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthRecord {
    /// Server-assigned identifier.
    pub record_id: String,
    /// When the test was taken.
    pub timestamp: DateTime<Utc>,
    /// Disease or condition tested for.
    pub disease: String,
    /// Test outcome.
    pub result: TestResult,
    /// Owning patient.
    #[serde(rename = "patientDID")]
    pub patient_did: Did,
    /// Kind of test (PCR, antigen, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<String>,
    /// Lab that produced the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lab_name: Option<String>,
    /// Confidence in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Retention policy chosen at submission.
    #[serde(default)]
    pub retention: RetentionPolicy,
    /// Whether the patient agreed to share the record.
    #[serde(default)]
    pub sharing_consent: bool,
    /// Hex SHA-256 of the minimal record.
    pub data_hash: String,
}

impl HealthRecord {
    /// Strip metadata, keeping only what a claim needs.
    #[must_use]
    pub fn minimal(&self) -> MinimalHealthRecord {
        MinimalHealthRecord {
            disease: self.disease.clone(),
            result: self.result,
            timestamp: self.timestamp,
            patient_did: self.patient_did.clone(),
        }
    }

    /// Whether the record has outlived its retention period at `now`.
    #[must_use]
    pub fn is_expired(&self, retention: RetentionPolicy, now: DateTime<Utc>) -> bool {
        now - self.timestamp >= retention.period()
    }
}

/// The metadata-free view of a record that is hashed, encrypted and attached to
/// claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MinimalHealthRecord {
    /// Disease tested for.
    pub disease: String,
    /// Test outcome.
    pub result: TestResult,
    /// When the test was taken.
    pub timestamp: DateTime<Utc>,
    /// Owning patient.
    #[serde(rename = "patientDID")]
    pub patient_did: Did,
}

impl MinimalHealthRecord {
    /// Canonical JSON bytes. Field order is fixed by the struct definition.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn canonical_bytes(&self) -> crate::Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Lowercase hex SHA-256 of the canonical bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn content_hash(&self) -> crate::Result<String> {
        let bytes = self.canonical_bytes()?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Age of the test at `now`.
    #[must_use]
    pub fn age_at(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }
}
