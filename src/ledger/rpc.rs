//! Solana JSON-RPC client for read-only chain queries.

use super::{Confirmation, TransactionStatus};
use crate::did::{Did, Network};
use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for the RPC client.
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// JSON-RPC endpoint.
    pub endpoint: String,
    /// Bound on a whole call, from connecting to the decoded response.
    pub timeout: Duration,
}

impl RpcConfig {
    /// Public endpoint for `network` with a 30 second timeout.
    #[must_use]
    pub fn for_network(network: Network) -> Self {
        Self {
            endpoint: network.default_rpc_url().to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// JSON-RPC 2.0 envelope.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct WithContext<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignatureStatus {
    slot: u64,
    err: Option<Value>,
    confirmation_status: Option<Confirmation>,
}

/// Thin JSON-RPC client over reqwest.
#[derive(Clone)]
pub struct SolanaRpcClient {
    http: reqwest::Client,
    config: RpcConfig,
}

impl SolanaRpcClient {
    /// Create a client.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: RpcConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("primal-health/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, config })
    }

    /// The configured endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });
        debug!("RPC {method} -> {}", self.config.endpoint);

        // The deadline covers the body as well as the headers.
        let envelope: RpcResponse<T> =
            match tokio::time::timeout(self.config.timeout, self.exchange(method, &body)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("RPC {method} timed out after {:?}", self.config.timeout);
                    return Err(Error::Network(format!("RPC {method} timed out")));
                }
            };

        if let Some(err) = envelope.error {
            return Err(Error::Network(format!(
                "RPC {method} error {}: {}",
                err.code, err.message
            )));
        }
        envelope
            .result
            .ok_or_else(|| Error::Network(format!("RPC {method} returned no result")))
    }

    async fn exchange<T: DeserializeOwned>(&self, method: &str, body: &Value) -> Result<RpcResponse<T>> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                warn!("RPC {method} failed: {e}");
                Error::Network(format!("RPC {method} failed: {e}"))
            })?;
        response
            .json()
            .await
            .map_err(|e| Error::Network(format!("RPC {method} returned invalid JSON: {e}")))
    }

    /// `getHealth`: `Ok(())` when the node reports healthy.
    ///
    /// # Errors
    ///
    /// Returns a network error if the node is unhealthy or unreachable.
    pub async fn health(&self) -> Result<()> {
        let status: String = self.call("getHealth", json!([])).await?;
        if status == "ok" {
            Ok(())
        } else {
            Err(Error::Network(format!("node unhealthy: {status}")))
        }
    }

    /// `getSignatureStatuses` for one signature, searching history.
    ///
    /// # Errors
    ///
    /// Returns a network error if the call fails.
    pub async fn signature_status(&self, signature: &str) -> Result<Option<TransactionStatus>> {
        let result: WithContext<Vec<Option<SignatureStatus>>> = self
            .call(
                "getSignatureStatuses",
                json!([[signature], {"searchTransactionHistory": true}]),
            )
            .await?;
        Ok(result.value.into_iter().next().flatten().map(|s| TransactionStatus {
            signature: signature.to_string(),
            slot: s.slot,
            confirmation: s.confirmation_status,
            err: s.err.map(|e| e.to_string()),
        }))
    }

    /// `getBalance` in lamports for the key behind `did`.
    ///
    /// # Errors
    ///
    /// Returns a network error if the call fails.
    pub async fn balance(&self, did: &Did) -> Result<u64> {
        let result: WithContext<u64> = self
            .call("getBalance", json!([did.public_key_base58()]))
            .await?;
        Ok(result.value)
    }
}
