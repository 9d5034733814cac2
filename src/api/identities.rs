//! Identity routes.

use super::{parse_body, ApiError, ApiResult, AppState};
use crate::did::{Identity, Role};
use crate::error::Error;
use crate::validation::{validate_did, MAX_LABEL_LENGTH};
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    did: String,
    role: Role,
    #[serde(default)]
    name: Option<String>,
}

pub(super) async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<Identity>)> {
    let request: RegisterRequest = parse_body(&body)?;
    let did = validate_did("did", &request.did)?;

    let identity = match request.role {
        Role::Patient => Identity::patient(did),
        Role::Provider => {
            let name = request
                .name
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .ok_or_else(|| Error::validation("name", "is required for providers"))?;
            if name.chars().count() > MAX_LABEL_LENGTH {
                return Err(Error::validation(
                    "name",
                    format!("must be at most {MAX_LABEL_LENGTH} characters"),
                )
                .into());
            }
            Identity::provider(did, name)
        }
    };

    let registered = state.store.identities.register(identity)?;
    info!("Identity {} registered as {}", registered.did, registered.role);
    Ok((StatusCode::CREATED, Json(registered)))
}

pub(super) async fn lookup(
    State(state): State<AppState>,
    Path(did): Path<String>,
) -> ApiResult<Json<Identity>> {
    let did = validate_did("did", &did)?;
    state
        .store
        .identities
        .get(&did)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("identity not found: {did}")))
}
