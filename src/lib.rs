//! # primal-health
//!
//! Health record and insurance claim service with an oracle that verifies
//! claims and settles payouts on Solana.
//!
//! ## Overview
//!
//! - Patients submit diagnostic records; each is hashed, validated and
//!   optionally anchored on the ledger as a memo.
//! - A minimal copy of a record is encrypted under a patient key and bound to
//!   an insurance claim signed with the patient's Ed25519 key.
//! - The claim oracle decrypts the minimal record, checks it against the
//!   claim, applies the coverage table and pays approved claims out.
//! - Patients grant, update and revoke field-level consents and control
//!   privacy settings, including record retention.
//! - Analytics sit behind a payment-gated session.
//!
//! ## Example
//!
//! ```rust,ignore
//! use primal_health::{ServerBuilder, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> primal_health::Result<()> {
//!     let config = ServerConfig::default();
//!     let mut server = ServerBuilder::new(config).build().await?;
//!     server.run().await
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod api;
pub mod claim;
pub mod config;
pub mod consent;
pub mod crypto;
pub mod did;
pub mod error;
pub mod event;
pub mod ledger;
pub mod oracle;
pub mod record;
pub mod server;
pub mod session;
pub mod store;
pub mod validation;

pub use claim::{ClaimStatus, Currency, InsuranceClaim};
pub use config::ServerConfig;
pub use consent::{ConsentManager, PatientConsent, PrivacySettings};
pub use did::{Did, Identity, Network, Role};
pub use error::{Error, Result};
pub use event::{ServiceEvent, ServiceEventsChannel};
pub use ledger::{Ledger, SimulatedLedger};
pub use oracle::{ClaimOracle, CoverageTable};
pub use record::{HealthRecord, MinimalHealthRecord, TestResult};
pub use server::{RunningServer, ServerBuilder, ShutdownHandle};
pub use session::PaymentGate;
pub use store::Store;
