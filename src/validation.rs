//! Schema checks on submitted records and claims.
//!
//! Validators take raw JSON and return either a typed draft or an
//! [`Error::Validation`] naming the offending field. They have no side effects;
//! identifiers and hashes are assigned when a draft is stored.

use crate::claim::Currency;
use crate::did::Did;
use crate::error::{Error, Result};
use crate::record::{HealthRecord, RetentionPolicy, TestResult};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::{Map, Value};

/// Maximum disease name length.
pub const MAX_DISEASE_LENGTH: usize = 100;

/// Maximum notes length.
pub const MAX_NOTES_LENGTH: usize = 1000;

/// Maximum length for short free-text fields (test type, lab name).
pub const MAX_LABEL_LENGTH: usize = 100;

/// Maximum client-supplied claim id length.
pub const MAX_CLAIM_ID_LENGTH: usize = 64;

/// Largest claim amount accepted.
pub const MAX_CLAIM_AMOUNT: f64 = 1_000_000_000.0;

/// Allowed clock skew for record timestamps.
const MAX_FUTURE_SKEW_MINUTES: i64 = 5;

/// A validated record submission, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct HealthRecordDraft {
    /// When the test was taken.
    pub timestamp: DateTime<Utc>,
    /// Disease tested for, trimmed.
    pub disease: String,
    /// Test outcome.
    pub result: TestResult,
    /// Owning patient.
    pub patient_did: Did,
    /// Kind of test.
    pub test_type: Option<String>,
    /// Lab name.
    pub lab_name: Option<String>,
    /// Confidence in `[0, 1]`.
    pub confidence: Option<f64>,
    /// Notes.
    pub notes: Option<String>,
    /// Retention policy.
    pub retention: RetentionPolicy,
    /// Sharing consent flag.
    pub sharing_consent: bool,
}

impl HealthRecordDraft {
    /// Finalize into a stored record with `record_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if hashing the minimal record fails.
    pub fn into_record(self, record_id: String) -> Result<HealthRecord> {
        let mut record = HealthRecord {
            record_id,
            timestamp: self.timestamp,
            disease: self.disease,
            result: self.result,
            patient_did: self.patient_did,
            test_type: self.test_type,
            lab_name: self.lab_name,
            confidence: self.confidence,
            notes: self.notes,
            retention: self.retention,
            sharing_consent: self.sharing_consent,
            data_hash: String::new(),
        };
        record.data_hash = record.minimal().content_hash()?;
        Ok(record)
    }
}

/// A validated claim submission, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct ClaimDraft {
    /// Client-chosen claim id, if any.
    pub claim_id: Option<String>,
    /// Claiming patient.
    pub patient_did: Did,
    /// Provider to verify and pay.
    pub insurance_provider_did: Did,
    /// Hex SHA-256 of the minimal record.
    pub health_data_hash: String,
    /// Encrypted minimal record.
    pub encrypted_health_data: String,
    /// Requested amount.
    pub claim_amount: f64,
    /// Currency.
    pub currency: Currency,
    /// Patient signature, base58.
    pub patient_signature: Option<String>,
}

/// Validate a DID-valued field.
///
/// # Errors
///
/// Returns a validation error naming `field` if the value is not a DID.
pub fn validate_did(field: &str, value: &str) -> Result<Did> {
    Did::parse(value).map_err(|_| {
        Error::validation(field, "must match did:solana:<network>:<base58-pubkey>")
    })
}

/// Validate a health record submission.
///
/// # Errors
///
/// Returns a validation error naming the first offending field.
pub fn validate_health_record(value: &Value, now: DateTime<Utc>) -> Result<HealthRecordDraft> {
    let obj = as_object(value)?;

    let disease = required_str(obj, "disease")?.trim().to_string();
    if disease.is_empty() {
        return Err(Error::validation("disease", "must not be empty"));
    }
    if disease.chars().count() > MAX_DISEASE_LENGTH {
        return Err(Error::validation(
            "disease",
            format!("must be at most {MAX_DISEASE_LENGTH} characters"),
        ));
    }

    let result = match required_str(obj, "result")? {
        "positive" => TestResult::Positive,
        "negative" => TestResult::Negative,
        "inconclusive" => TestResult::Inconclusive,
        _ => {
            return Err(Error::validation(
                "result",
                "must be one of positive, negative, inconclusive",
            ))
        }
    };

    let patient_did = validate_did("patientDID", required_str(obj, "patientDID")?)?;

    let timestamp = match obj.get("timestamp") {
        None | Some(Value::Null) => now,
        Some(v) => parse_timestamp(v)?,
    };
    if timestamp > now + Duration::minutes(MAX_FUTURE_SKEW_MINUTES) {
        return Err(Error::validation("timestamp", "must not be in the future"));
    }

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => None,
        Some(v) => {
            let c = v
                .as_f64()
                .ok_or_else(|| Error::validation("confidence", "must be a number"))?;
            if !(0.0..=1.0).contains(&c) {
                return Err(Error::validation("confidence", "must be between 0 and 1"));
            }
            Some(c)
        }
    };

    let retention = match optional_str(obj, "retention")? {
        None => RetentionPolicy::default(),
        Some("minimal") => RetentionPolicy::Minimal,
        Some("standard") => RetentionPolicy::Standard,
        Some("extended") => RetentionPolicy::Extended,
        Some(_) => {
            return Err(Error::validation(
                "retention",
                "must be one of minimal, standard, extended",
            ))
        }
    };

    let sharing_consent = match obj.get("sharingConsent") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => return Err(Error::validation("sharingConsent", "must be a boolean")),
    };

    Ok(HealthRecordDraft {
        timestamp,
        disease,
        result,
        patient_did,
        test_type: bounded_str(obj, "testType", MAX_LABEL_LENGTH)?,
        lab_name: bounded_str(obj, "labName", MAX_LABEL_LENGTH)?,
        confidence,
        notes: bounded_str(obj, "notes", MAX_NOTES_LENGTH)?,
        retention,
        sharing_consent,
    })
}

/// Validate a claim submission.
///
/// # Errors
///
/// Returns a validation error naming the first offending field.
pub fn validate_claim(value: &Value) -> Result<ClaimDraft> {
    let obj = as_object(value)?;

    let claim_id = match optional_str(obj, "claimId")? {
        None => None,
        Some(id) => {
            if id.is_empty() || id.len() > MAX_CLAIM_ID_LENGTH {
                return Err(Error::validation(
                    "claimId",
                    format!("must be 1 to {MAX_CLAIM_ID_LENGTH} characters"),
                ));
            }
            if !id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
            {
                return Err(Error::validation(
                    "claimId",
                    "may contain only letters, digits, '-' and '_'",
                ));
            }
            Some(id.to_string())
        }
    };

    let patient_did = validate_did("patientDID", required_str(obj, "patientDID")?)?;
    let insurance_provider_did = validate_did(
        "insuranceProviderDID",
        required_str(obj, "insuranceProviderDID")?,
    )?;

    let health_data_hash = required_str(obj, "healthDataHash")?.to_ascii_lowercase();
    if health_data_hash.len() != 64 || !health_data_hash.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Error::validation(
            "healthDataHash",
            "must be 64 hex characters",
        ));
    }

    let encrypted_health_data = required_str(obj, "encryptedHealthData")?.to_string();
    if encrypted_health_data.is_empty() || B64.decode(&encrypted_health_data).is_err() {
        return Err(Error::validation(
            "encryptedHealthData",
            "must be non-empty base64",
        ));
    }

    let claim_amount = obj
        .get("claimAmount")
        .ok_or_else(|| Error::validation("claimAmount", "is required"))?
        .as_f64()
        .ok_or_else(|| Error::validation("claimAmount", "must be a number"))?;
    if !claim_amount.is_finite() || claim_amount <= 0.0 || claim_amount > MAX_CLAIM_AMOUNT {
        return Err(Error::validation(
            "claimAmount",
            "must be greater than 0 and at most 1000000000",
        ));
    }

    let currency = match optional_str(obj, "currency")? {
        None | Some("SOL") => Currency::Sol,
        Some("USDC") => Currency::Usdc,
        Some(_) => return Err(Error::validation("currency", "must be SOL or USDC")),
    };

    let patient_signature = optional_str(obj, "patientSignature")?.map(str::to_string);

    Ok(ClaimDraft {
        claim_id,
        patient_did,
        insurance_provider_did,
        health_data_hash,
        encrypted_health_data,
        claim_amount,
        currency,
        patient_signature,
    })
}

fn as_object(value: &Value) -> Result<&Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::validation("body", "must be a JSON object"))
}

fn required_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<&'a str> {
    match obj.get(field) {
        None | Some(Value::Null) => Err(Error::validation(field, "is required")),
        Some(Value::String(s)) => Ok(s),
        Some(_) => Err(Error::validation(field, "must be a string")),
    }
}

fn optional_str<'a>(obj: &'a Map<String, Value>, field: &str) -> Result<Option<&'a str>> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(Error::validation(field, "must be a string")),
    }
}

fn bounded_str(obj: &Map<String, Value>, field: &str, max: usize) -> Result<Option<String>> {
    match optional_str(obj, field)? {
        None => Ok(None),
        Some(s) if s.chars().count() > max => Err(Error::validation(
            field,
            format!("must be at most {max} characters"),
        )),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => Ok(Some(s.trim().to_string())),
    }
}

fn parse_timestamp(value: &Value) -> Result<DateTime<Utc>> {
    match value {
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| Error::validation("timestamp", "must be an RFC 3339 date-time")),
        Value::Number(n) => n
            .as_i64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
            .ok_or_else(|| Error::validation("timestamp", "must be epoch milliseconds")),
        _ => Err(Error::validation("timestamp", "must be a string or number")),
    }
}
