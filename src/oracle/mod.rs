//! Claim verification oracle.
//!
//! The oracle decides whether a pending claim is payable and pays it:
//! 1. Check the patient's Ed25519 signature over the claim terms
//! 2. Decrypt the minimal health record and compare it with the claimed hash
//! 3. Look the disease up in the coverage table and compute the payout
//! 4. Transfer the payout through the ledger
//!
//! # Architecture
//!
//! ```text
//! verify(claim_id, key)
//!        │
//!        ▼
//! ┌─────────────────────┐
//! │ Signature + hash    │──── fail ───▶ rejected (generic reason)
//! └─────────┬───────────┘
//!           │
//!           ▼
//! ┌─────────────────────┐
//! │ Coverage lookup     │──── miss ───▶ rejected (not covered / not qualifying)
//! └─────────┬───────────┘
//!           │
//!           ▼
//!       verified
//!           │
//!    ┌──────┴──────┐
//!    │             │
//!  PAID      LEDGER ERROR
//!    │             │
//!    ▼             ▼
//!  paid      stays verified
//! ```
//!
//! Every decision is returned with an [`Attestation`] signed by the oracle key.

mod attestation;
mod coverage;
mod verifier;

pub use attestation::Attestation;
pub use coverage::{
    payment_amount, round2, CoverageRule, CoverageTable, Eligibility, REASON_NOT_COVERED,
    REASON_NOT_QUALIFYING, RECENT_TEST_MULTIPLIER, RECENT_TEST_WINDOW_DAYS,
};
pub use verifier::{
    ClaimAnalytics, ClaimOracle, OracleConfig, PreparedClaimData, SubmittedRecord,
    VerificationOutcome, REASON_PROVIDER_REJECTED, REASON_UNVERIFIABLE,
};
