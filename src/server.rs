//! Service assembly and lifecycle.

use crate::api::{self, AppState};
use crate::config::ServerConfig;
use crate::consent::{ConsentManager, RetentionSweeper};
use crate::crypto::{generate_signing_key, load_keypair, save_keypair};
use crate::did::Did;
use crate::error::{Error, Result};
use crate::event::{create_event_channel, ServiceEvent, ServiceEventsChannel, ServiceEventsSender};
use crate::ledger::{Ledger, SimulatedLedger, SolanaRpcClient};
use crate::oracle::ClaimOracle;
use crate::session::PaymentGate;
use crate::store::Store;
use ed25519_dalek::SigningKey;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Load the oracle keypair at `path`, generating and saving one if absent.
///
/// # Errors
///
/// Returns an error if an existing file is unreadable or a new one cannot be
/// written.
pub fn load_or_create_oracle_key(path: &Path) -> Result<SigningKey> {
    if path.exists() {
        debug!("Loading oracle key from {}", path.display());
        return load_keypair(path);
    }
    let key = generate_signing_key();
    save_keypair(path, &key)?;
    info!("Generated new oracle key at {}", path.display());
    Ok(key)
}

/// Builder for constructing the service.
pub struct ServerBuilder {
    config: ServerConfig,
    signing_key: Option<SigningKey>,
    ledger: Option<Arc<dyn Ledger>>,
    store: Option<Store>,
    handle_signals: bool,
}

impl ServerBuilder {
    /// Create a new builder with the given configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            signing_key: None,
            ledger: None,
            store: None,
            handle_signals: true,
        }
    }

    /// Use `key` as the oracle key instead of the configured keypair file.
    #[must_use]
    pub fn with_signing_key(mut self, key: SigningKey) -> Self {
        self.signing_key = Some(key);
        self
    }

    /// Use `ledger` instead of the in-process simulated ledger.
    #[must_use]
    pub fn with_ledger(mut self, ledger: Arc<dyn Ledger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Use `store` instead of a fresh in-memory store.
    #[must_use]
    pub fn with_store(mut self, store: Store) -> Self {
        self.store = Some(store);
        self
    }

    /// Whether `run` should also stop on Ctrl-C.
    #[must_use]
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Assemble the service and bind its listener.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the oracle key cannot
    /// be loaded, or the listen address cannot be bound.
    pub async fn build(self) -> Result<RunningServer> {
        info!("Building primal-health with config: {:?}", self.config);
        self.config.validate()?;

        let signing_key = match self.signing_key {
            Some(key) => key,
            None => {
                std::fs::create_dir_all(&self.config.root_dir)?;
                load_or_create_oracle_key(&self.config.oracle_key_path())?
            }
        };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (events_tx, events_rx) = create_event_channel();

        let store = self.store.unwrap_or_default();
        let ledger: Arc<dyn Ledger> = match self.ledger {
            Some(ledger) => ledger,
            None => Arc::new(SimulatedLedger::new()),
        };

        let oracle = Arc::new(ClaimOracle::new(
            store.clone(),
            Arc::clone(&ledger),
            signing_key,
            self.config.oracle_config(),
            events_tx.clone(),
        ));
        let consents = ConsentManager::new(
            store.clone(),
            self.config.consent_default_provider()?,
            self.config.consent.default_validity_days,
        )
        .with_events(events_tx.clone());
        let gate = Arc::new(PaymentGate::new(
            self.config.session_config(oracle.did())?,
            ledger,
        ));
        let rpc = self
            .config
            .rpc_config()
            .map(SolanaRpcClient::new)
            .transpose()?;
        if let Some(ref client) = rpc {
            info!("Solana RPC enabled at {}", client.endpoint());
        }

        let listener = api::bind_listener(self.config.listen).await?;
        let local_addr = listener.local_addr()?;

        let state = AppState {
            oracle,
            consents,
            store,
            gate,
            rpc,
            max_body_bytes: self.config.max_body_bytes,
        };

        Ok(RunningServer {
            config: self.config,
            state,
            listener: Some(listener),
            local_addr,
            shutdown_tx: Arc::new(shutdown_tx),
            shutdown_rx,
            events_tx,
            events_rx: Some(events_rx),
            handle_signals: self.handle_signals,
        })
    }
}

/// Requests shutdown of a [`RunningServer`] from another task.
#[derive(Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Request shutdown.
    pub fn shutdown(&self) {
        let _ = self.0.send(true);
    }
}

/// An assembled service with a bound listener.
pub struct RunningServer {
    config: ServerConfig,
    state: AppState,
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    shutdown_tx: Arc<watch::Sender<bool>>,
    shutdown_rx: watch::Receiver<bool>,
    events_tx: ServiceEventsSender,
    events_rx: Option<ServiceEventsChannel>,
    handle_signals: bool,
}

impl RunningServer {
    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The oracle's DID.
    #[must_use]
    pub fn oracle_did(&self) -> &Did {
        self.state.oracle.did()
    }

    /// Handler state, for in-process access to the services.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// The configuration the server was built with.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Get a receiver for service events.
    ///
    /// Note: Can only be called once. Subsequent calls return None.
    pub fn events(&mut self) -> Option<ServiceEventsChannel> {
        self.events_rx.take()
    }

    /// Subscribe to service events.
    #[must_use]
    pub fn subscribe_events(&self) -> ServiceEventsChannel {
        self.events_tx.subscribe()
    }

    /// A handle that can stop the server from another task.
    #[must_use]
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown_tx))
    }

    /// Serve requests until shutdown is requested.
    ///
    /// # Errors
    ///
    /// Returns an error if the server was already run or the HTTP server
    /// fails.
    pub async fn run(&mut self) -> Result<()> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| Error::Config("server already ran".to_string()))?;

        info!(
            "primal-health listening on {} (oracle {})",
            self.local_addr,
            self.state.oracle.did()
        );
        let _ = self.events_tx.send(ServiceEvent::Started {
            address: self.local_addr.to_string(),
        });

        if let Some(interval) = self.config.sweep_interval() {
            let sweeper = RetentionSweeper::new(self.state.store.clone(), interval);
            tokio::spawn(sweeper.run(self.events_tx.clone(), self.shutdown_rx.clone()));
        }

        let mut shutdown_rx = self.shutdown_rx.clone();
        let shutdown_tx = Arc::clone(&self.shutdown_tx);
        let handle_signals = self.handle_signals;
        let shutdown = async move {
            tokio::select! {
                () = wait_for_shutdown(&mut shutdown_rx) => {
                    info!("Shutdown signal received");
                }
                () = ctrl_c(handle_signals) => {
                    info!("Ctrl-C received, initiating shutdown");
                    let _ = shutdown_tx.send(true);
                }
            }
        };

        let result = api::serve(listener, self.state.clone(), shutdown).await;
        // Stop background tasks even if the server failed.
        self.shutdown();

        let _ = self.events_tx.send(ServiceEvent::ShuttingDown);
        match result {
            Ok(()) => {
                info!("primal-health shutdown complete");
                Ok(())
            }
            Err(e) => {
                warn!("HTTP server failed: {e}");
                let _ = self.events_tx.send(ServiceEvent::Error {
                    message: format!("HTTP server failed: {e}"),
                });
                Err(e.into())
            }
        }
    }

    /// Request the server to shut down.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }
}

async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            return;
        }
    }
}

async fn ctrl_c(enabled: bool) {
    if enabled && tokio::signal::ctrl_c().await.is_ok() {
        return;
    }
    std::future::pending::<()>().await;
}
