//! Record routes.

use super::{parse_body, parse_json, ApiError, ApiResult, AppState};
use crate::oracle::{PreparedClaimData, SubmittedRecord};
use crate::record::HealthRecord;
use crate::validation::validate_did;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub(super) struct PatientQuery {
    #[serde(rename = "patientDID")]
    pub(super) patient_did: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PrepareRequest {
    encryption_key: String,
}

pub(super) async fn submit(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmittedRecord>)> {
    let value = parse_json(&body)?;
    let submitted = state.oracle.submit_record(&value, Utc::now()).await?;
    Ok((StatusCode::CREATED, Json(submitted)))
}

pub(super) async fn list(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> ApiResult<Json<Vec<HealthRecord>>> {
    let raw = query
        .patient_did
        .ok_or_else(|| ApiError::bad_request("patientDID query parameter is required"))?;
    let patient = validate_did("patientDID", &raw)?;
    Ok(Json(state.oracle.list_records(&patient)))
}

pub(super) async fn prepare(
    State(state): State<AppState>,
    Path(record_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<PreparedClaimData>> {
    let request: PrepareRequest = parse_body(&body)?;
    let prepared = state
        .oracle
        .prepare_claim_data(&record_id, request.encryption_key.as_bytes())?;
    Ok(Json(prepared))
}
