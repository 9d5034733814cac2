//! Consent routes.

use super::records::PatientQuery;
use super::{parse_body, ApiError, ApiResult, AppState};
use crate::consent::{ConsentGrant, ConsentUpdate, PatientConsent, DEFAULT_SHARED_FIELD};
use crate::validation::validate_did;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
pub(super) struct CheckQuery {
    #[serde(rename = "patientDID")]
    patient_did: String,
    #[serde(rename = "providerDID")]
    provider_did: String,
    #[serde(default)]
    field: Option<String>,
}

pub(super) async fn grant(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<PatientConsent>)> {
    let request: ConsentGrant = parse_body(&body)?;
    let consent = state.consents.grant(request, Utc::now())?;
    Ok((StatusCode::CREATED, Json(consent)))
}

pub(super) async fn list_active(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Json<Vec<PatientConsent>>> {
    let raw = query
        .patient_did
        .ok_or_else(|| ApiError::bad_request("patientDID query parameter is required"))?;
    let patient = validate_did("patientDID", &raw)?;
    Ok(Json(state.consents.list_active(&patient, Utc::now())))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<PatientConsent>> {
    let request: ConsentUpdate = parse_body(&body)?;
    Ok(Json(state.consents.update(&consent_id, request)?))
}

pub(super) async fn revoke(
    State(state): State<AppState>,
    Path(consent_id): Path<String>,
) -> ApiResult<Json<Value>> {
    if state.consents.revoke(&consent_id)? {
        Ok(Json(json!({ "consentId": consent_id, "revoked": true })))
    } else {
        Err(ApiError::not_found(format!("consent not found: {consent_id}"))
            .with_extra(json!({ "consentId": consent_id, "revoked": false })))
    }
}

pub(super) async fn check(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
) -> ApiResult<Json<Value>> {
    let patient = validate_did("patientDID", &query.patient_did)?;
    let provider = validate_did("providerDID", &query.provider_did)?;
    let field = query
        .field
        .unwrap_or_else(|| DEFAULT_SHARED_FIELD.to_string());
    let allowed = state
        .consents
        .can_share(&patient, &provider, &field, Utc::now());
    Ok(Json(json!({
        "patientDID": patient,
        "providerDID": provider,
        "field": field,
        "allowed": allowed,
    })))
}
