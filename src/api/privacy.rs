//! Privacy settings routes.

use super::{parse_body, ApiResult, AppState};
use crate::consent::{PrivacySettings, PrivacySettingsUpdate};
use crate::validation::validate_did;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::Json;
use chrono::Utc;

pub(super) async fn get_settings(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> ApiResult<Json<PrivacySettings>> {
    let patient = validate_did("did", &did)?;
    Ok(Json(state.consents.privacy_settings(&patient)))
}

pub(super) async fn update_settings(
    State(state): State<AppState>,
    Path(did): Path<String>,
    body: Bytes,
) -> ApiResult<Json<PrivacySettings>> {
    let patient = validate_did("did", &did)?;
    let update: PrivacySettingsUpdate = parse_body(&body)?;
    let settings = state
        .consents
        .update_privacy_settings(&patient, &update, Utc::now())?;
    Ok(Json(settings))
}
