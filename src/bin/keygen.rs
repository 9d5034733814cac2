//! Ed25519 oracle keypair generator for primal-health.
//!
//! Writes a Solana-format keypair file (a JSON array of 64 bytes) and prints
//! the DID the oracle will sign attestations as.
//!
//! Usage:
//!   primal-health-keygen [output-file] [network]

use color_eyre::eyre::{bail, eyre};
use primal_health::crypto::{generate_signing_key, save_keypair};
use primal_health::did::{Did, Network};
use std::env;
use std::path::PathBuf;

fn parse_network(name: &str) -> color_eyre::Result<Network> {
    match name {
        "mainnet" | "mainnet-beta" => Ok(Network::MainnetBeta),
        "devnet" => Ok(Network::Devnet),
        "testnet" => Ok(Network::Testnet),
        "localnet" => Ok(Network::Localnet),
        other => Err(eyre!("unknown network: {other}")),
    }
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let mut args = env::args().skip(1);
    let output = args
        .next()
        .map_or_else(|| PathBuf::from("oracle-keypair.json"), PathBuf::from);
    let network = args
        .next()
        .map_or(Ok(Network::default()), |n| parse_network(&n))?;

    if output.exists() {
        bail!("refusing to overwrite existing key file {}", output.display());
    }

    let key = generate_signing_key();
    save_keypair(&output, &key)?;
    let did = Did::from_public_key(network, &key.verifying_key());

    println!("Keypair saved to: {}", output.display());
    println!("  WARNING: Keep this file secure! It signs oracle attestations and payouts.");
    println!("DID: {did}");
    println!("Public key: {}", did.public_key_base58());
    Ok(())
}
