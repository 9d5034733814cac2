//! Decentralized identifiers for patients and insurance providers.
//!
//! A DID has the fixed shape `did:solana:<network>:<base58-pubkey>` where the
//! public key is an Ed25519 key, the same key type Solana wallets use. The key
//! embedded in a patient's DID is what the oracle checks claim signatures
//! against.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use ed25519_dalek::VerifyingKey;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// DID method prefix.
pub const DID_PREFIX: &str = "did:solana:";

#[allow(clippy::expect_used)]
static DID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^did:solana:(mainnet|mainnet-beta|devnet|testnet|localnet):[1-9A-HJ-NP-Za-km-z]{32,44}$",
    )
    .expect("DID pattern compiles")
});

/// Solana cluster a DID is anchored to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Network {
    /// Mainnet beta cluster.
    #[serde(alias = "mainnet")]
    MainnetBeta,
    /// Devnet cluster.
    #[default]
    Devnet,
    /// Testnet cluster.
    Testnet,
    /// Local validator.
    Localnet,
}

impl Network {
    /// Segment used inside a DID.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "mainnet-beta",
            Self::Devnet => "devnet",
            Self::Testnet => "testnet",
            Self::Localnet => "localnet",
        }
    }

    /// Public JSON-RPC endpoint for the cluster.
    #[must_use]
    pub const fn default_rpc_url(&self) -> &'static str {
        match self {
            Self::MainnetBeta => "https://api.mainnet-beta.solana.com",
            Self::Devnet => "https://api.devnet.solana.com",
            Self::Testnet => "https://api.testnet.solana.com",
            Self::Localnet => "http://127.0.0.1:8899",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "mainnet" | "mainnet-beta" => Ok(Self::MainnetBeta),
            "devnet" => Ok(Self::Devnet),
            "testnet" => Ok(Self::Testnet),
            "localnet" => Ok(Self::Localnet),
            other => Err(Error::validation(
                "network",
                format!("unknown network '{other}'"),
            )),
        }
    }
}

/// Returns true if `s` has the shape of a Solana DID.
#[must_use]
pub fn is_valid_did(s: &str) -> bool {
    DID_PATTERN.is_match(s)
}

/// A validated `did:solana:` identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    /// Parse and validate a DID string.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the string does not match the DID pattern.
    ///
    /// The `mainnet` alias is rewritten to `mainnet-beta`, so both spellings
    /// name the same identity.
    pub fn parse(s: &str) -> Result<Self> {
        if is_valid_did(s) {
            let normalized = match s.strip_prefix("did:solana:mainnet:") {
                Some(key) => format!("{DID_PREFIX}{}:{key}", Network::MainnetBeta),
                None => s.to_string(),
            };
            Ok(Self(normalized))
        } else {
            Err(Error::validation(
                "did",
                "must match did:solana:<network>:<base58-pubkey>",
            ))
        }
    }

    /// Derive the DID for an Ed25519 public key on `network`.
    #[must_use]
    pub fn from_public_key(network: Network, key: &VerifyingKey) -> Self {
        let encoded = bs58::encode(key.as_bytes()).into_string();
        Self(format!("{DID_PREFIX}{network}:{encoded}"))
    }

    /// The cluster segment.
    #[must_use]
    pub fn network(&self) -> Network {
        self.segments()
            .0
            .parse()
            .unwrap_or_default()
    }

    /// The base58 public key segment.
    #[must_use]
    pub fn public_key_base58(&self) -> &str {
        self.segments().1
    }

    /// Decode the embedded Ed25519 public key.
    ///
    /// # Errors
    ///
    /// Returns a crypto error if the segment is not a 32-byte Ed25519 point.
    pub fn verifying_key(&self) -> Result<VerifyingKey> {
        let bytes = bs58::decode(self.public_key_base58())
            .into_vec()
            .map_err(|e| Error::Crypto(format!("invalid base58 public key: {e}")))?;
        let array: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::Crypto("public key must be 32 bytes".to_string()))?;
        VerifyingKey::from_bytes(&array)
            .map_err(|e| Error::Crypto(format!("invalid Ed25519 public key: {e}")))
    }

    /// The DID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn segments(&self) -> (&str, &str) {
        let rest = self.0.strip_prefix(DID_PREFIX).unwrap_or(&self.0);
        rest.rsplit_once(':').unwrap_or((rest, ""))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Did {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Did {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

/// Role an identity plays in the claim workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Submits records and claims.
    Patient,
    /// Insurance provider that verifies and pays claims.
    Provider,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Patient => f.write_str("patient"),
            Self::Provider => f.write_str("provider"),
        }
    }
}

/// A registered identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// The identity's DID.
    pub did: Did,
    /// Patient or provider.
    pub role: Role,
    /// Display name, required for providers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Registration time.
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// Create a patient identity.
    #[must_use]
    pub fn patient(did: Did) -> Self {
        Self {
            did,
            role: Role::Patient,
            name: None,
            created_at: Utc::now(),
        }
    }

    /// Create a provider identity.
    #[must_use]
    pub fn provider(did: Did, name: impl Into<String>) -> Self {
        Self {
            did,
            role: Role::Provider,
            name: Some(name.into()),
            created_at: Utc::now(),
        }
    }
}
