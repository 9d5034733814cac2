//! Claim routes.

use super::{parse_body, parse_json, ApiError, ApiResult, AppState};
use crate::claim::{ClaimStatus, InsuranceClaim};
use crate::oracle::VerificationOutcome;
use crate::store::ClaimFilter;
use crate::validation::validate_did;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct ClaimQuery {
    #[serde(rename = "patientDID")]
    patient_did: Option<String>,
    #[serde(rename = "claimId")]
    claim_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VerifyRequest {
    encryption_key: String,
}

#[derive(Debug, Deserialize)]
struct ProviderRequest {
    #[serde(rename = "providerDID")]
    provider_did: String,
    #[serde(rename = "providerSignature", default)]
    provider_signature: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StatusRequest {
    #[serde(rename = "providerDID")]
    provider_did: String,
    #[serde(rename = "providerSignature", default)]
    provider_signature: Option<String>,
    status: ClaimStatus,
    #[serde(default)]
    reason: Option<String>,
}

pub(super) async fn submit(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<InsuranceClaim>)> {
    let value = parse_json(&body)?;
    let claim = state.oracle.submit_claim(&value, Utc::now())?;
    Ok((StatusCode::CREATED, Json(claim)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    Query(query): Query<ClaimQuery>,
) -> ApiResult<Json<Vec<InsuranceClaim>>> {
    if query.patient_did.is_none() && query.claim_id.is_none() {
        return Err(ApiError::bad_request(
            "patientDID or claimId query parameter is required",
        ));
    }
    let filter = ClaimFilter {
        patient_did: query
            .patient_did
            .as_deref()
            .map(|d| validate_did("patientDID", d))
            .transpose()?,
        claim_id: query.claim_id,
        ..ClaimFilter::default()
    };
    Ok(Json(state.oracle.list_claims(&filter)))
}

pub(super) async fn status(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
) -> ApiResult<Json<InsuranceClaim>> {
    Ok(Json(state.oracle.get_claim(&claim_id)?))
}

pub(super) async fn update_status(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<InsuranceClaim>> {
    let request: StatusRequest = parse_body(&body)?;
    let provider = validate_did("providerDID", &request.provider_did)?;
    let claim = state.oracle.update_status(
        &claim_id,
        &provider,
        request.provider_signature.as_deref(),
        request.status,
        request.reason,
        Utc::now(),
    )?;
    Ok(Json(claim))
}

pub(super) async fn verify(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<VerificationOutcome>> {
    let request: VerifyRequest = parse_body(&body)?;
    let outcome = state
        .oracle
        .verify_claim(&claim_id, request.encryption_key.as_bytes(), Utc::now())
        .await?;
    Ok(Json(outcome))
}

pub(super) async fn pay(
    State(state): State<AppState>,
    Path(claim_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<InsuranceClaim>> {
    let request: ProviderRequest = parse_body(&body)?;
    let provider = validate_did("providerDID", &request.provider_did)?;
    let claim = state
        .oracle
        .process_payment(&claim_id, &provider, request.provider_signature.as_deref())
        .await?;
    Ok(Json(claim))
}
