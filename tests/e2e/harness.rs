//! Test harness that runs a service instance for E2E tests.

use primal_health::claim::{
    provider_signing_message, signing_message, ClaimStatus, Currency, ProviderAction,
};
use primal_health::crypto::{generate_signing_key, sign_message};
use primal_health::did::{Did, Network};
use primal_health::server::ShutdownHandle;
use primal_health::{ServerBuilder, ServerConfig, ServiceEvent, ServiceEventsChannel};
use primal_health::{Ledger, SimulatedLedger};
use ed25519_dalek::SigningKey;
use reqwest::StatusCode;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::info;

/// Error type for test harness operations.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// Service error
    #[error("Service error: {0}")]
    Service(#[from] primal_health::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server task did not stop in time
    #[error("Server did not shut down within {0:?}")]
    ShutdownTimeout(Duration),
}

/// Result type for harness operations.
pub type Result<T> = std::result::Result<T, HarnessError>;

/// A keypair and its devnet DID.
pub struct TestIdentity {
    /// Signing key.
    pub key: SigningKey,
    /// DID derived from the key.
    pub did: Did,
}

impl TestIdentity {
    /// Generate a fresh identity.
    #[must_use]
    pub fn generate() -> Self {
        let key = generate_signing_key();
        let did = Did::from_public_key(Network::Devnet, &key.verifying_key());
        Self { key, did }
    }

    /// Sign claim terms the way a patient wallet would.
    #[must_use]
    pub fn sign_claim(
        &self,
        provider: &Did,
        health_data_hash: &str,
        amount: f64,
        currency: Currency,
    ) -> String {
        let message = signing_message(&self.did, provider, health_data_hash, amount, currency);
        sign_message(&self.key, &message)
    }

    /// Sign a provider action on a claim.
    #[must_use]
    pub fn sign_provider_action(
        &self,
        claim_id: &str,
        action: ProviderAction,
        status: ClaimStatus,
    ) -> String {
        sign_message(&self.key, &provider_signing_message(claim_id, action, status))
    }
}

/// A running service plus an HTTP client pointed at it.
pub struct TestHarness {
    addr: SocketAddr,
    client: reqwest::Client,
    ledger: Arc<SimulatedLedger>,
    oracle_did: Did,
    events: ServiceEventsChannel,
    shutdown: ShutdownHandle,
    task: JoinHandle<primal_health::Result<()>>,
    _root: TempDir,
}

impl TestHarness {
    /// Start a service with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails to start.
    pub async fn setup() -> Result<Self> {
        Self::setup_with_config(|_| {}).await
    }

    /// Start a service after applying `configure` to the default config.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails to start.
    pub async fn setup_with_config(configure: impl FnOnce(&mut ServerConfig)) -> Result<Self> {
        let root = tempfile::tempdir()?;
        let mut config = ServerConfig {
            root_dir: root.path().to_path_buf(),
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..ServerConfig::default()
        };
        configure(&mut config);

        let ledger = Arc::new(SimulatedLedger::new());
        let mut server = ServerBuilder::new(config)
            .with_ledger(Arc::clone(&ledger) as Arc<dyn Ledger>)
            .with_signal_handling(false)
            .build()
            .await?;

        let addr = server.local_addr();
        let oracle_did = server.oracle_did().clone();
        let events = server.subscribe_events();
        let shutdown = server.shutdown_handle();
        let task = tokio::spawn(async move { server.run().await });
        info!("Test service listening on {addr}");

        Ok(Self {
            addr,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?,
            ledger,
            oracle_did,
            events,
            shutdown,
            task,
            _root: root,
        })
    }

    /// Absolute URL for `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// The HTTP client.
    #[must_use]
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    /// The simulated ledger backing the service.
    #[must_use]
    pub fn ledger(&self) -> &SimulatedLedger {
        &self.ledger
    }

    /// The oracle's DID.
    #[must_use]
    pub fn oracle_did(&self) -> &Did {
        &self.oracle_did
    }

    /// GET `path`, returning status and JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn get(&self, path: &str) -> Result<(StatusCode, Value)> {
        let response = self.client.get(self.url(path)).send().await?;
        Self::decode(response).await
    }

    /// POST `body` to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn post(&self, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    /// PUT `body` to `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn put(&self, path: &str, body: &Value) -> Result<(StatusCode, Value)> {
        let response = self.client.put(self.url(path)).json(body).send().await?;
        Self::decode(response).await
    }

    /// Send a prepared request.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails.
    pub async fn send(&self, request: reqwest::RequestBuilder) -> Result<(StatusCode, Value)> {
        Self::decode(request.send().await?).await
    }

    async fn decode(response: reqwest::Response) -> Result<(StatusCode, Value)> {
        let status = response.status();
        let bytes = response.bytes().await?;
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        Ok((status, body))
    }

    /// Events emitted so far that have not been read yet.
    pub fn drain_events(&mut self) -> Vec<ServiceEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Stop the service and wait for it to exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the service fails or does not stop in time.
    pub async fn teardown(self) -> Result<()> {
        let limit = Duration::from_secs(5);
        self.shutdown.shutdown();
        match tokio::time::timeout(limit, self.task).await {
            Ok(Ok(result)) => Ok(result?),
            Ok(Err(join)) => Err(HarnessError::Io(std::io::Error::other(join.to_string()))),
            Err(_) => Err(HarnessError::ShutdownTimeout(limit)),
        }
    }
}
