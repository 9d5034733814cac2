//! Configuration for primal-health.

use crate::claim::Currency;
use crate::consent::MAX_VALIDITY_DAYS;
use crate::did::{Did, Network};
use crate::error::{Error, Result};
use crate::ledger::RpcConfig;
use crate::oracle::{CoverageTable, OracleConfig};
use crate::session::SessionConfig;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Provider that consents default to when a grant names none.
pub const DEFAULT_CONSENT_PROVIDER: &str =
    "did:solana:devnet:4Nd1mBQtrMJVYVfKf2PJy9NZUZdTAsp7D4xWLs4gDB4T";

/// Longest allowed analytics session, one year.
pub const MAX_SESSION_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// Service configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Root directory for service data (oracle key, logs).
    #[serde(default = "default_root_dir")]
    pub root_dir: PathBuf,

    /// HTTP listen address.
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Solana cluster DIDs and RPC default to.
    #[serde(default)]
    pub network: Network,

    /// Log level.
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Largest accepted request body in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Oracle configuration.
    #[serde(default)]
    pub oracle: OracleSection,

    /// Coverage table keyed by disease.
    #[serde(default)]
    pub coverage: CoverageTable,

    /// Consent defaults.
    #[serde(default)]
    pub consent: ConsentSection,

    /// Retention sweeping.
    #[serde(default)]
    pub retention: RetentionSection,

    /// Session pricing.
    #[serde(default)]
    pub payment: PaymentSection,

    /// Solana RPC.
    #[serde(default)]
    pub rpc: RpcSection,
}

/// Oracle configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleSection {
    /// Keypair file; `<root_dir>/oracle-keypair.json` if unset.
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// Upper bound on a single payout.
    #[serde(default = "default_max_payout")]
    pub max_payout: f64,

    /// Anchor record hashes on the ledger.
    #[serde(default = "default_true")]
    pub anchor_records: bool,
}

/// Consent defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentSection {
    /// Provider DID used when a grant names none.
    #[serde(default = "default_consent_provider")]
    pub default_provider: String,

    /// Validity window in days when a grant gives no end.
    #[serde(default = "default_validity_days")]
    pub default_validity_days: i64,
}

/// Retention sweeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionSection {
    /// Run the sweeper.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Sweep interval in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Session pricing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSection {
    /// Price of one session.
    #[serde(default = "default_session_price")]
    pub price: f64,

    /// Currency of `price`.
    #[serde(default = "default_session_currency")]
    pub currency: Currency,

    /// Recipient DID; the oracle DID if unset.
    #[serde(default)]
    pub recipient: Option<String>,

    /// Session lifetime in seconds.
    #[serde(default = "default_session_ttl")]
    pub session_ttl_secs: u64,

    /// Maximum live sessions.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

/// Solana RPC.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSection {
    /// Query the cluster for transaction status.
    #[serde(default)]
    pub enabled: bool,

    /// Endpoint; the network's public endpoint if unset.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Request timeout in seconds.
    #[serde(default = "default_rpc_timeout")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            listen: default_listen(),
            network: Network::default(),
            log_level: default_log_level(),
            max_body_bytes: default_max_body_bytes(),
            oracle: OracleSection::default(),
            coverage: CoverageTable::default(),
            consent: ConsentSection::default(),
            retention: RetentionSection::default(),
            payment: PaymentSection::default(),
            rpc: RpcSection::default(),
        }
    }
}

impl Default for OracleSection {
    fn default() -> Self {
        Self {
            key_file: None,
            max_payout: default_max_payout(),
            anchor_records: true,
        }
    }
}

impl Default for ConsentSection {
    fn default() -> Self {
        Self {
            default_provider: default_consent_provider(),
            default_validity_days: default_validity_days(),
        }
    }
}

impl Default for RetentionSection {
    fn default() -> Self {
        Self {
            enabled: true,
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for PaymentSection {
    fn default() -> Self {
        Self {
            price: default_session_price(),
            currency: default_session_currency(),
            recipient: None,
            session_ttl_secs: default_session_ttl(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

impl Default for RpcSection {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            timeout_secs: default_rpc_timeout(),
        }
    }
}

fn default_root_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "primal-health")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".primal-health"))
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

fn default_log_level() -> String {
    "info".to_string()
}

const fn default_max_body_bytes() -> usize {
    1024 * 1024
}

const fn default_max_payout() -> f64 {
    10_000.0
}

const fn default_true() -> bool {
    true
}

fn default_consent_provider() -> String {
    DEFAULT_CONSENT_PROVIDER.to_string()
}

const fn default_validity_days() -> i64 {
    365
}

const fn default_sweep_interval() -> u64 {
    3600 // 1 hour
}

const fn default_session_price() -> f64 {
    0.01
}

const fn default_session_currency() -> Currency {
    Currency::Usdc
}

const fn default_session_ttl() -> u64 {
    3600
}

const fn default_cache_capacity() -> usize {
    10_000
}

const fn default_rpc_timeout() -> u64 {
    30
}

impl ServerConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Save configuration to a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check values that serde cannot.
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the first bad value.
    pub fn validate(&self) -> Result<()> {
        self.consent_default_provider()?;
        self.payment_recipient()?;
        if !(1..=MAX_VALIDITY_DAYS).contains(&self.consent.default_validity_days) {
            return Err(Error::Config(format!(
                "consent.default_validity_days must be between 1 and {MAX_VALIDITY_DAYS}"
            )));
        }
        if !(self.oracle.max_payout.is_finite() && self.oracle.max_payout > 0.0) {
            return Err(Error::Config("oracle.max_payout must be positive".to_string()));
        }
        if !(self.payment.price.is_finite() && self.payment.price >= 0.0) {
            return Err(Error::Config("payment.price must not be negative".to_string()));
        }
        if !(1..=MAX_SESSION_TTL_SECS).contains(&self.payment.session_ttl_secs) {
            return Err(Error::Config(format!(
                "payment.session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
            )));
        }
        if self.retention.enabled && self.retention.sweep_interval_secs == 0 {
            return Err(Error::Config(
                "retention.sweep_interval_secs must be positive".to_string(),
            ));
        }
        if let Some((disease, rule)) = self
            .coverage
            .iter()
            .find(|(_, r)| !(r.base_amount.is_finite() && r.base_amount >= 0.0))
        {
            return Err(Error::Config(format!(
                "coverage for {disease} has invalid base_amount {}",
                rule.base_amount
            )));
        }
        Ok(())
    }

    /// Path of the oracle keypair file.
    #[must_use]
    pub fn oracle_key_path(&self) -> PathBuf {
        self.oracle
            .key_file
            .clone()
            .unwrap_or_else(|| self.root_dir.join("oracle-keypair.json"))
    }

    /// Default consent provider.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the DID is malformed.
    pub fn consent_default_provider(&self) -> Result<Did> {
        Did::parse(&self.consent.default_provider).map_err(|_| {
            Error::Config(format!(
                "consent.default_provider is not a DID: {}",
                self.consent.default_provider
            ))
        })
    }

    /// Configured session payment recipient, if any.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the DID is malformed.
    pub fn payment_recipient(&self) -> Result<Option<Did>> {
        self.payment
            .recipient
            .as_deref()
            .map(|r| {
                Did::parse(r)
                    .map_err(|_| Error::Config(format!("payment.recipient is not a DID: {r}")))
            })
            .transpose()
    }

    /// Oracle settings.
    #[must_use]
    pub fn oracle_config(&self) -> OracleConfig {
        OracleConfig {
            network: self.network,
            coverage: self.coverage.clone(),
            max_payout: self.oracle.max_payout,
            anchor_records: self.oracle.anchor_records,
        }
    }

    /// Session settings, paying `fallback_recipient` when none is configured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the recipient DID is malformed.
    pub fn session_config(&self, fallback_recipient: &Did) -> Result<SessionConfig> {
        if self.payment.session_ttl_secs > MAX_SESSION_TTL_SECS {
            return Err(Error::Config("payment.session_ttl_secs is too large".to_string()));
        }
        let ttl_secs = i64::try_from(self.payment.session_ttl_secs)
            .map_err(|_| Error::Config("payment.session_ttl_secs is too large".to_string()))?;
        Ok(SessionConfig {
            price: self.payment.price,
            currency: self.payment.currency,
            recipient: self
                .payment_recipient()?
                .unwrap_or_else(|| fallback_recipient.clone()),
            ttl: chrono::Duration::seconds(ttl_secs),
            cache_capacity: self.payment.cache_capacity,
        })
    }

    /// RPC client settings, if RPC is enabled.
    #[must_use]
    pub fn rpc_config(&self) -> Option<RpcConfig> {
        self.rpc.enabled.then(|| {
            let mut config = RpcConfig::for_network(self.network);
            if let Some(ref endpoint) = self.rpc.endpoint {
                config.endpoint.clone_from(endpoint);
            }
            config.timeout = Duration::from_secs(self.rpc.timeout_secs);
            config
        })
    }

    /// Retention sweep interval, if sweeping is enabled.
    #[must_use]
    pub fn sweep_interval(&self) -> Option<Duration> {
        self.retention
            .enabled
            .then(|| Duration::from_secs(self.retention.sweep_interval_secs))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 8080);
        assert_eq!(config.network, Network::Devnet);
        assert_eq!(config.consent.default_validity_days, 365);
        assert_eq!(config.coverage.len(), 6);
        assert!(config.rpc_config().is_none());
        config.validate().expect("defaults are valid");
        assert_eq!(
            config.consent_default_provider().expect("did").as_str(),
            DEFAULT_CONSENT_PROVIDER
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: ServerConfig = toml::from_str("").expect("parse");
        assert_eq!(config.log_level, "info");
        assert!((config.oracle.max_payout - 10_000.0).abs() < f64::EPSILON);
        assert_eq!(config.payment.currency, Currency::Usdc);
    }

    #[test]
    fn test_partial_file() {
        let config: ServerConfig = toml::from_str(
            r#"
            listen = "0.0.0.0:9000"
            network = "testnet"

            [coverage."COVID-19"]
            requires_positive = true
            base_amount = 750.0

            [rpc]
            enabled = true
            timeout_secs = 5
            "#,
        )
        .expect("parse");
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.network, Network::Testnet);
        assert_eq!(config.coverage.len(), 1);
        let rpc = config.rpc_config().expect("enabled");
        assert_eq!(rpc.endpoint, "https://api.testnet.solana.com");
        assert_eq!(rpc.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_roundtrip_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let mut config = ServerConfig::default();
        config.payment.recipient =
            Some("did:solana:devnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".to_string());
        config.retention.sweep_interval_secs = 60;
        config.to_file(&path).expect("write");

        let loaded = ServerConfig::from_file(&path).expect("read");
        assert_eq!(loaded.payment.recipient, config.payment.recipient);
        assert_eq!(loaded.retention.sweep_interval_secs, 60);
        assert_eq!(loaded.coverage, config.coverage);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.consent.default_provider = "did:web:example.com".to_string();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let mut config = ServerConfig::default();
        config.oracle.max_payout = 0.0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.payment.recipient = Some("nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_bounds_windows() {
        let oracle =
            Did::parse("did:solana:devnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").expect("did");

        let mut config = ServerConfig::default();
        config.consent.default_validity_days = i64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        config.consent.default_validity_days = MAX_VALIDITY_DAYS;
        config.validate().expect("upper bound is allowed");

        let mut config = ServerConfig::default();
        config.payment.session_ttl_secs = u64::MAX;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
        assert!(matches!(config.session_config(&oracle), Err(Error::Config(_))));
        config.payment.session_ttl_secs = MAX_SESSION_TTL_SECS;
        config.validate().expect("upper bound is allowed");
        let session = config.session_config(&oracle).expect("session");
        assert_eq!(session.ttl.num_days(), 365);
    }

    #[test]
    fn test_session_recipient_falls_back() {
        let config = ServerConfig::default();
        let oracle =
            Did::parse("did:solana:devnet:9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin").expect("did");
        let session = config.session_config(&oracle).expect("session");
        assert_eq!(session.recipient, oracle);
        assert_eq!(session.ttl.num_seconds(), 3600);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(matches!(
            ServerConfig::from_file(&dir.path().join("absent.toml")),
            Err(Error::Io(_))
        ));
    }
}
