//! Secret codec using AES-256-GCM
//!
//! This module provides encryption and decryption for credential bundles and
//! provider data stored in the database, using AES-256-GCM with additional
//! authenticated data (AAD) for context binding. Bundles are serialized to
//! canonical JSON before encryption; any corruption, truncation, or
//! foreign-key ciphertext fails with [`CryptoError::InvalidSecret`] rather
//! than being treated as missing data.

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

const VERSION_ENCRYPTED: u8 = 0x01;
const VERSION_FIELD_LEN: usize = 1;
const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const MIN_ENCRYPTED_LEN: usize = VERSION_FIELD_LEN + NONCE_LEN + TAG_LEN;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("invalid secret: ciphertext is corrupted or was produced under a different key")]
    InvalidSecret,
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("secret serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Secure wrapper for the process-wide symmetric key with zeroization
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey(Vec<u8>);

impl SecretKey {
    /// Create a new secret key from bytes
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(SecretKey(bytes))
    }

    /// Get the key as bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Encrypt bytes using AES-256-GCM
pub fn encrypt_bytes(
    key: &SecretKey,
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut ciphertext = cipher
        .encrypt(
            &nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // Prepend version byte and nonce to ciphertext
    let mut result = Vec::with_capacity(VERSION_FIELD_LEN + NONCE_LEN + ciphertext.len());
    result.push(VERSION_ENCRYPTED);
    result.extend_from_slice(&nonce);
    result.append(&mut ciphertext);

    Ok(result)
}

/// Decrypt bytes using AES-256-GCM
///
/// Fails with [`CryptoError::InvalidSecret`] on empty, truncated,
/// non-versioned, tampered, or foreign-key ciphertext.
pub fn decrypt_bytes(
    key: &SecretKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.len() < MIN_ENCRYPTED_LEN || ciphertext[0] != VERSION_ENCRYPTED {
        return Err(CryptoError::InvalidSecret);
    }

    let nonce = Nonce::from_slice(&ciphertext[VERSION_FIELD_LEN..VERSION_FIELD_LEN + NONCE_LEN]);
    let tag_and_ct = &ciphertext[VERSION_FIELD_LEN + NONCE_LEN..];

    let cipher_key = Key::<Aes256Gcm>::from_slice(key.as_bytes());
    let cipher = Aes256Gcm::new(cipher_key);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: tag_and_ct,
                aad,
            },
        )
        .map_err(|_| CryptoError::InvalidSecret)
}

/// Serialize a structure to canonical JSON and encrypt it
pub fn encrypt_json<T: Serialize>(
    key: &SecretKey,
    aad: &[u8],
    value: &T,
) -> Result<Vec<u8>, CryptoError> {
    let plaintext = serde_json::to_vec(value)?;
    encrypt_bytes(key, aad, &plaintext)
}

/// Decrypt ciphertext and deserialize the contained JSON structure
pub fn decrypt_json<T: DeserializeOwned>(
    key: &SecretKey,
    aad: &[u8],
    ciphertext: &[u8],
) -> Result<T, CryptoError> {
    let plaintext = decrypt_bytes(key, aad, ciphertext)?;
    Ok(serde_json::from_slice(&plaintext)?)
}

/// AAD binding ciphertext to its owning integration row.
///
/// A credential bundle copied onto a row with a different tenant, provider,
/// or remote account fails decryption.
pub fn integration_aad(tenant_id: &uuid::Uuid, provider_name: &str, remote_id: &str) -> Vec<u8> {
    format!("{}|{}|{}", tenant_id, provider_name, remote_id).into_bytes()
}
