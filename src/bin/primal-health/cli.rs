//! Command-line interface definition.

use clap::{Parser, ValueEnum};
use primal_health::config::ServerConfig;
use primal_health::did::Network;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Health record, insurance claim and oracle service.
#[derive(Parser, Debug)]
#[command(name = "primal-health")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Root directory for service data.
    #[arg(long, env = "PRIMAL_HEALTH_ROOT_DIR")]
    pub root_dir: Option<PathBuf>,

    /// HTTP listen address.
    #[arg(long, short, env = "PRIMAL_HEALTH_LISTEN")]
    pub listen: Option<SocketAddr>,

    /// Solana cluster DIDs and payouts are anchored to.
    #[arg(long, value_enum, env = "PRIMAL_HEALTH_NETWORK")]
    pub network: Option<CliNetwork>,

    /// Path to the oracle keypair file.
    #[arg(long, env = "PRIMAL_HEALTH_ORACLE_KEY")]
    pub oracle_key: Option<PathBuf>,

    /// Query the cluster's JSON-RPC endpoint for unknown transactions.
    #[arg(long, env = "PRIMAL_HEALTH_RPC_ENDPOINT")]
    pub rpc_endpoint: Option<String>,

    /// Log level.
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,

    /// Log output format.
    #[arg(long, value_enum, default_value = "text", env = "PRIMAL_HEALTH_LOG_FORMAT")]
    pub log_format: LogFormat,

    /// Path to configuration file.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

/// Network CLI enum.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliNetwork {
    /// Mainnet beta.
    Mainnet,
    /// Devnet.
    Devnet,
    /// Testnet.
    Testnet,
    /// Local validator.
    Localnet,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

impl Cli {
    /// Convert CLI arguments into a `ServerConfig`.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file is specified but cannot be loaded.
    pub fn into_config(self) -> color_eyre::Result<ServerConfig> {
        // Start with default config or load from file
        let mut config = if let Some(ref path) = self.config {
            ServerConfig::from_file(path)?
        } else {
            ServerConfig::default()
        };

        // Override with CLI arguments
        if let Some(root_dir) = self.root_dir {
            config.root_dir = root_dir;
        }
        if let Some(listen) = self.listen {
            config.listen = listen;
        }
        if let Some(network) = self.network {
            config.network = network.into();
        }
        if let Some(key_file) = self.oracle_key {
            config.oracle.key_file = Some(key_file);
        }
        if let Some(endpoint) = self.rpc_endpoint {
            config.rpc.enabled = true;
            config.rpc.endpoint = Some(endpoint);
        }
        if let Some(log_level) = self.log_level {
            config.log_level = log_level;
        }

        Ok(config)
    }
}

impl From<CliNetwork> for Network {
    fn from(n: CliNetwork) -> Self {
        match n {
            CliNetwork::Mainnet => Self::MainnetBeta,
            CliNetwork::Devnet => Self::Devnet,
            CliNetwork::Testnet => Self::Testnet,
            CliNetwork::Localnet => Self::Localnet,
        }
    }
}
