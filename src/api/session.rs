//! Payment-gated session, analytics and transaction lookup routes.

use super::{bearer_token, ApiError, ApiResult, AppState};
use crate::error::Error;
use crate::ledger::TransactionStatus;
use crate::oracle::ClaimAnalytics;
use crate::session::{parse_payment_header, SessionToken, PAYMENT_HEADER};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde_json::json;
use tracing::debug;

/// 402 carrying what the client must pay.
fn payment_required(state: &AppState, message: String) -> ApiError {
    ApiError::from(Error::PaymentRequired(message))
        .with_extra(json!({ "paymentRequirements": state.gate.requirements() }))
}

pub(super) async fn open(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<SessionToken>)> {
    let Some(proof) = headers
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_payment_header)
    else {
        return Err(payment_required(
            &state,
            format!("send a payment proof in the {PAYMENT_HEADER} header"),
        ));
    };

    match state.gate.issue(&proof, Utc::now()).await {
        Ok(session) => Ok((StatusCode::CREATED, Json(session))),
        Err(Error::PaymentRequired(msg)) => Err(payment_required(&state, msg)),
        Err(e) => Err(e.into()),
    }
}

pub(super) async fn claim_analytics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ClaimAnalytics>> {
    let token = bearer_token(&headers)
        .ok_or_else(|| ApiError::unauthorized("missing bearer session token"))?;
    state.gate.validate(token, Utc::now())?;
    Ok(Json(state.oracle.analytics()))
}

pub(super) async fn transaction(
    State(state): State<AppState>,
    Path(signature): Path<String>,
) -> ApiResult<Json<TransactionStatus>> {
    if let Some(status) = state.oracle.transaction_status(&signature).await? {
        return Ok(Json(status));
    }
    if let Some(ref rpc) = state.rpc {
        debug!("Transaction {signature} unknown locally, asking {}", rpc.endpoint());
        if let Some(status) = rpc.signature_status(&signature).await? {
            return Ok(Json(status));
        }
    }
    Err(ApiError::not_found(format!(
        "transaction not found: {signature}"
    )))
}
