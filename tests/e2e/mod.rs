//! End-to-end tests driving the HTTP service over a real socket.
//!
//! Each test starts its own server on `127.0.0.1:0` backed by the simulated
//! ledger and talks to it with `reqwest`.

mod claim_flow;
mod consent_flow;
mod harness;
mod session_flow;

pub use harness::{HarnessError, TestHarness, TestIdentity};
