//! Cryptographic primitives for vaultsync.
//!
//! This module provides:
//! - Argon2id derivation of the vault key (passphrase + account salt)
//! - Argon2id derivation of the account key (password + username)
//! - XChaCha20-Poly1305 payload encryption with 192-bit nonces
//! - Wrapping of the vault passphrase under the account key
//!
//! # Security Notes
//!
//! - XChaCha20 uses 192-bit nonces (24 bytes), safe for random generation
//! - Argon2 parameters are fixed per deployment: every device must derive the
//!   same key from the same inputs
//! - Every decryption failure maps to [`CryptoError::AuthenticationFailed`];
//!   callers cannot tell a wrong key from a tampered payload

use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Nonce size for XChaCha20-Poly1305 (192 bits = 24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Key size for XChaCha20-Poly1305 (256 bits = 32 bytes).
pub const KEY_SIZE: usize = 32;

/// Random bytes in a freshly generated account salt.
pub const SALT_BYTES: usize = 16;

/// Domain prefix of the deterministic account key salt.
const ACCOUNT_SALT_PREFIX: &str = "vaultsync-account-key-v1:";

/// Crypto errors.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Wrong key, tampered or truncated ciphertext, or a corrupt blob.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Key derivation failed (bad parameters, salt too short).
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// The OS random source failed.
    #[error("random source unavailable: {0}")]
    Randomness(String),
}

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Argon2Params {
    memory_mib: u32,
    iterations: u32,
    parallelism: u32,
}

impl Argon2Params {
    /// Deployment default: 19 MiB, 2 iterations, 1 lane.
    pub const DEFAULT: Self = Self {
        memory_mib: 19,
        iterations: 2,
        parallelism: 1,
    };

    /// Custom parameters.
    pub fn new(memory_mib: u32, iterations: u32, parallelism: u32) -> Self {
        Self {
            memory_mib,
            iterations,
            parallelism,
        }
    }

    /// Cheapest valid parameters, for tests.
    pub fn insecure_fast() -> Self {
        Self::new(1, 1, 1)
    }

    /// Get memory in MiB.
    pub fn memory_mib(&self) -> u32 {
        self.memory_mib
    }

    /// Get iteration count.
    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    fn to_argon2_params(self) -> Result<Params, CryptoError> {
        Params::new(
            self.memory_mib.saturating_mul(1024),
            self.iterations,
            self.parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))
    }
}

impl Default for Argon2Params {
    fn default() -> Self {
        Self::DEFAULT
    }
}

fn argon2id(secret: &[u8], salt: &[u8], params: Argon2Params) -> Result<[u8; KEY_SIZE], CryptoError> {
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        params.to_argon2_params()?,
    );
    let mut output = [0u8; KEY_SIZE];
    argon2
        .hash_password_into(secret, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;
    Ok(output)
}

fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Randomness(e.to_string()))?;
    Ok(bytes)
}

/// `nonce || ciphertext`.
fn seal(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let nonce_bytes: [u8; NONCE_SIZE] = random_bytes()?;
    let cipher = XChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;
    let ciphertext = cipher
        .encrypt(XNonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|_| CryptoError::EncryptionFailed("aead encrypt failed".into()))?;

    let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

fn open(key: &[u8; KEY_SIZE], payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if payload.len() < NONCE_SIZE {
        return Err(CryptoError::AuthenticationFailed);
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
    let cipher =
        XChaCha20Poly1305::new_from_slice(key).map_err(|_| CryptoError::AuthenticationFailed)?;
    cipher
        .decrypt(XNonce::from_slice(nonce), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)
}

/// Generate a new account salt: lowercase hex of 16 random bytes.
pub fn generate_salt() -> Result<String, CryptoError> {
    let bytes: [u8; SALT_BYTES] = random_bytes()?;
    Ok(hex::encode(bytes))
}

/// Key that encrypts file payloads.
///
/// Derived from the vault passphrase and the account-wide salt. The salt
/// string's bytes are the Argon2 salt.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct VaultKey([u8; KEY_SIZE]);

impl VaultKey {
    /// Derive from passphrase and salt. CPU-heavy; call from a blocking task.
    pub fn derive(passphrase: &str, salt: &str, params: Argon2Params) -> Result<Self, CryptoError> {
        argon2id(passphrase.as_bytes(), salt.as_bytes(), params).map(Self)
    }

    /// Encrypt a payload. Output is `nonce || ciphertext`.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        seal(&self.0, plaintext)
    }

    /// Decrypt a payload produced by [`VaultKey::encrypt`].
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
        open(&self.0, payload)
    }
}

// Don't leak keys in debug output
impl std::fmt::Debug for VaultKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "VaultKey([REDACTED])")
    }
}

/// Key that wraps the vault passphrase for cross-device recovery.
///
/// Derived from the account password and username, so any device that can
/// log in can recover the passphrase without the server seeing it.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct AccountKey([u8; KEY_SIZE]);

impl AccountKey {
    /// Derive from password and username. CPU-heavy; call from a blocking task.
    pub fn derive(password: &str, username: &str, params: Argon2Params) -> Result<Self, CryptoError> {
        let salt = Zeroizing::new(format!("{ACCOUNT_SALT_PREFIX}{username}"));
        argon2id(password.as_bytes(), salt.as_bytes(), params).map(Self)
    }

    /// Encrypt the passphrase into a base64 blob.
    pub fn wrap_passphrase(&self, passphrase: &str) -> Result<String, CryptoError> {
        seal(&self.0, passphrase.as_bytes()).map(|sealed| STANDARD.encode(sealed))
    }

    /// Recover the passphrase from a blob. Malformed base64, bad UTF-8 and
    /// failed authentication are all [`CryptoError::AuthenticationFailed`].
    pub fn unwrap_passphrase(&self, blob: &str) -> Result<String, CryptoError> {
        let sealed = STANDARD
            .decode(blob.trim())
            .map_err(|_| CryptoError::AuthenticationFailed)?;
        let plaintext = open(&self.0, &sealed)?;
        String::from_utf8(plaintext).map_err(|e| {
            let mut bytes = e.into_bytes();
            bytes.zeroize();
            CryptoError::AuthenticationFailed
        })
    }
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccountKey([REDACTED])")
    }
}
