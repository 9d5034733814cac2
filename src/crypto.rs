//! Record encryption and claim signatures.
//!
//! Minimal health records are sealed with AES-256-GCM-SIV under a key derived
//! from caller-supplied key material via HKDF-SHA256. The encoded form is
//! `base64(nonce || ciphertext)`. Signatures are Ed25519, base58-encoded the
//! way Solana wallets present them.

use crate::did::Did;
use crate::error::{Error, Result};
use crate::record::MinimalHealthRecord;
use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::path::Path;

/// HKDF salt for record keys.
const KEY_SALT: &[u8] = b"primal-health-record-v1";

/// HKDF info for the AES-256-GCM-SIV key.
const KEY_INFO: &[u8] = b"aes-256-gcm-siv";

/// Nonce size for AES-GCM-SIV.
const NONCE_SIZE: usize = 12;

/// Seals and opens minimal health records.
pub struct RecordCipher {
    cipher: Aes256GcmSiv,
}

impl RecordCipher {
    /// Derive a cipher from arbitrary key material.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material is empty or key derivation fails.
    pub fn from_key_material(material: &[u8]) -> Result<Self> {
        if material.is_empty() {
            return Err(Error::validation("encryptionKey", "must not be empty"));
        }

        let hk = Hkdf::<Sha256>::new(Some(KEY_SALT), material);
        let mut key = [0u8; 32];
        hk.expand(KEY_INFO, &mut key)
            .map_err(|e| Error::Crypto(format!("key derivation failed: {e}")))?;

        let cipher = Aes256GcmSiv::new_from_slice(&key)
            .map_err(|e| Error::Crypto(format!("invalid key length: {e}")))?;
        Ok(Self { cipher })
    }

    /// Encrypt `plaintext` and return the base64 encoding.
    ///
    /// # Errors
    ///
    /// Returns an error if encryption fails.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| Error::Crypto(format!("encryption failed: {e}")))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(B64.encode(out))
    }

    /// Decrypt a base64 `nonce || ciphertext` payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload is malformed or authentication fails.
    pub fn decrypt(&self, encoded: &str) -> Result<Vec<u8>> {
        let data = B64
            .decode(encoded)
            .map_err(|e| Error::Crypto(format!("invalid base64: {e}")))?;
        if data.len() <= NONCE_SIZE {
            return Err(Error::Crypto("ciphertext too short".to_string()));
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_SIZE);
        self.cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|e| Error::Crypto(format!("decryption failed: {e}")))
    }

    /// Encrypt a minimal record's canonical JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn encrypt_record(&self, record: &MinimalHealthRecord) -> Result<String> {
        self.encrypt(&record.canonical_bytes()?)
    }

    /// Decrypt and parse a minimal record.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption or parsing fails.
    pub fn decrypt_record(&self, encoded: &str) -> Result<MinimalHealthRecord> {
        let plaintext = self.decrypt(encoded)?;
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

/// Sign `message` and return the base58 signature.
#[must_use]
pub fn sign_message(key: &SigningKey, message: &[u8]) -> String {
    bs58::encode(key.sign(message).to_bytes()).into_string()
}

/// Verify a base58 signature by the key embedded in `did`.
///
/// # Errors
///
/// Returns a crypto error if the DID key or signature cannot be decoded, or if
/// the signature does not verify.
pub fn verify_did_signature(did: &Did, message: &[u8], signature_b58: &str) -> Result<()> {
    let key = did.verifying_key()?;
    let bytes = bs58::decode(signature_b58)
        .into_vec()
        .map_err(|e| Error::Crypto(format!("invalid base58 signature: {e}")))?;
    let array: [u8; 64] = bytes
        .try_into()
        .map_err(|_| Error::Crypto("signature must be 64 bytes".to_string()))?;
    let signature = Signature::from_bytes(&array);
    key.verify(message, &signature)
        .map_err(|_| Error::Crypto("signature verification failed".to_string()))
}

/// Generate a fresh Ed25519 signing key.
#[must_use]
pub fn generate_signing_key() -> SigningKey {
    SigningKey::generate(&mut OsRng)
}

/// Read a keypair file: a JSON array of 64 bytes, secret then public, as
/// written by Solana tooling.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is malformed, or its public
/// half does not match the secret half.
pub fn load_keypair(path: &Path) -> Result<SigningKey> {
    let content = std::fs::read_to_string(path)?;
    let bytes: Vec<u8> = serde_json::from_str(&content)?;
    let keypair: [u8; 64] = bytes
        .try_into()
        .map_err(|_| Error::Crypto(format!("{} must hold 64 bytes", path.display())))?;
    SigningKey::from_keypair_bytes(&keypair)
        .map_err(|e| Error::Crypto(format!("invalid keypair in {}: {e}", path.display())))
}

/// Write `key` as a keypair file, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn save_keypair(path: &Path, key: &SigningKey) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string(&key.to_keypair_bytes().to_vec())?;
    std::fs::write(path, content)?;
    Ok(())
}
