//! HTTP JSON API.
//!
//! Every request runs to completion on its own task; handlers call straight
//! into the oracle, consent manager and payment gate. Bodies are parsed here
//! rather than by axum's `Json` extractor so malformed JSON gets the same
//! `{ "error": ... }` shape and status as any other validation failure.

mod claims;
mod consents;
mod error;
mod identities;
mod privacy;
mod records;
mod session;

pub use error::{ApiError, ApiResult};

use crate::consent::ConsentManager;
use crate::ledger::SolanaRpcClient;
use crate::oracle::ClaimOracle;
use crate::session::PaymentGate;
use crate::store::Store;
use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Claim oracle.
    pub oracle: Arc<ClaimOracle>,
    /// Consent and privacy operations.
    pub consents: ConsentManager,
    /// Repositories.
    pub store: Store,
    /// Session issuer.
    pub gate: Arc<PaymentGate>,
    /// Cluster RPC, when enabled.
    pub rpc: Option<SolanaRpcClient>,
    /// Request body limit in bytes.
    pub max_body_bytes: usize,
}

/// Build the router.
pub fn router(state: AppState) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/api/identities", post(identities::register))
        .route("/api/identities/:did", get(identities::lookup))
        .route("/api/records", post(records::submit).get(records::list))
        .route("/api/records/:id/prepare", post(records::prepare))
        .route("/api/claims", post(claims::submit).get(claims::list))
        .route("/api/claims/:id", get(claims::status))
        .route("/api/claims/:id/status", post(claims::update_status))
        .route("/api/claims/:id/verify", post(claims::verify))
        .route("/api/claims/:id/pay", post(claims::pay))
        .route("/api/consents", post(consents::grant).get(consents::list_active))
        .route("/api/consents/check", get(consents::check))
        .route("/api/consents/:id", axum::routing::put(consents::update))
        .route("/api/consents/:id/revoke", post(consents::revoke))
        .route(
            "/api/privacy/:did",
            get(privacy::get_settings).put(privacy::update_settings),
        )
        .route("/api/session", post(session::open))
        .route("/api/analytics/claims", get(session::claim_analytics))
        .route("/api/transactions/:signature", get(session::transaction))
        .layer(RequestBodyLimitLayer::new(limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind the HTTP listener.
///
/// # Errors
///
/// Returns an error if the address cannot be bound.
pub async fn bind_listener(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

/// Serve `state` on `listener` until `shutdown` resolves.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(axum::extract::State(state): axum::extract::State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "oracleDID": state.oracle.did(),
    }))
}

/// Parse a request body as JSON.
pub(crate) fn parse_json(body: &[u8]) -> ApiResult<Value> {
    if body.is_empty() {
        return Err(ApiError::bad_request("request body must be a JSON object"));
    }
    serde_json::from_slice(body).map_err(|e| ApiError::bad_request(format!("malformed JSON: {e}")))
}

/// Parse a request body into `T`.
pub(crate) fn parse_body<T: DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_value(parse_json(body)?)
        .map_err(|e| ApiError::bad_request(format!("invalid request: {e}")))
}

/// The token of an `Authorization: Bearer` header.
pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
