//! Key manager: encryption context, vault key cache, rotation.

use std::fmt;
use std::sync::Arc;

use zeroize::Zeroizing;

use crate::crypto::{generate_salt, AccountKey, Argon2Params, CryptoError, VaultKey};

/// The passphrase and salt that together determine the vault key.
///
/// Encryption is active only when both are present.
#[derive(Clone, Default)]
pub struct EncryptionContext {
    passphrase: Option<Zeroizing<String>>,
    salt: Option<String>,
}

impl EncryptionContext {
    /// Build from optional parts.
    pub fn new(passphrase: Option<String>, salt: Option<String>) -> Self {
        Self {
            passphrase: passphrase.filter(|p| !p.is_empty()).map(Zeroizing::new),
            salt: salt.filter(|s| !s.is_empty()),
        }
    }

    /// The passphrase, if set.
    pub fn passphrase(&self) -> Option<&str> {
        self.passphrase.as_deref().map(String::as_str)
    }

    /// The salt, if known.
    pub fn salt(&self) -> Option<&str> {
        self.salt.as_deref()
    }

    /// Both passphrase and salt present.
    pub fn is_active(&self) -> bool {
        self.passphrase.is_some() && self.salt.is_some()
    }
}

impl fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("salt", &self.salt)
            .finish()
    }
}

struct CachedKey {
    passphrase: Zeroizing<String>,
    salt: String,
    key: Arc<VaultKey>,
}

/// Owns the [`EncryptionContext`] and caches the derived vault key.
///
/// The cache is keyed by the exact `(passphrase, salt)` pair; changing
/// either one forces a fresh derivation.
pub struct KeyManager {
    params: Argon2Params,
    context: EncryptionContext,
    cached: Option<CachedKey>,
    derivations: u64,
}

impl KeyManager {
    /// Create a manager with no passphrase and no salt.
    pub fn new(params: Argon2Params) -> Self {
        Self::with_context(params, EncryptionContext::default())
    }

    /// Create a manager from persisted state.
    pub fn with_context(params: Argon2Params, context: EncryptionContext) -> Self {
        Self {
            params,
            context,
            cached: None,
            derivations: 0,
        }
    }

    /// Current context.
    pub fn context(&self) -> &EncryptionContext {
        &self.context
    }

    /// Whether payloads are encrypted.
    pub fn is_active(&self) -> bool {
        self.context.is_active()
    }

    /// Argon2 parameters used for every derivation.
    pub fn params(&self) -> Argon2Params {
        self.params
    }

    /// How many vault keys have been derived (cache misses).
    pub fn derivations(&self) -> u64 {
        self.derivations
    }

    /// Replace the passphrase. `None` disables encryption.
    pub fn set_passphrase(&mut self, passphrase: Option<String>) {
        self.context = EncryptionContext::new(passphrase, self.context.salt.clone());
        self.clear_cache();
    }

    /// Adopt the server's authoritative salt. Returns true if it differed.
    pub fn adopt_salt(&mut self, salt: &str) -> bool {
        if self.context.salt() == Some(salt) {
            return false;
        }
        self.context.salt = Some(salt.to_string());
        self.clear_cache();
        true
    }

    /// Return the local salt, generating one if missing.
    pub fn ensure_salt(&mut self) -> Result<String, CryptoError> {
        if let Some(salt) = self.context.salt() {
            return Ok(salt.to_string());
        }
        let salt = generate_salt()?;
        self.context.salt = Some(salt.clone());
        Ok(salt)
    }

    /// Replace the whole context and drop the cached key.
    pub fn install(&mut self, context: EncryptionContext) {
        self.context = context;
        self.clear_cache();
    }

    /// Forget the cached vault key.
    pub fn clear_cache(&mut self) {
        self.cached = None;
    }

    /// The vault key for the current context, or `None` when encryption is
    /// inactive. Derivation runs on the blocking pool.
    pub async fn vault_key(&mut self) -> Result<Option<Arc<VaultKey>>, CryptoError> {
        let (Some(passphrase), Some(salt)) = (self.context.passphrase.clone(), self.context.salt.clone())
        else {
            return Ok(None);
        };

        if let Some(cached) = &self.cached {
            if *cached.passphrase == *passphrase && cached.salt == salt {
                return Ok(Some(Arc::clone(&cached.key)));
            }
        }

        let params = self.params;
        let derive_passphrase = passphrase.clone();
        let derive_salt = salt.clone();
        let key = tokio::task::spawn_blocking(move || {
            VaultKey::derive(&derive_passphrase, &derive_salt, params)
        })
        .await
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))??;

        let key = Arc::new(key);
        self.derivations += 1;
        tracing::debug!("Derived vault key (derivation #{})", self.derivations);
        self.cached = Some(CachedKey {
            passphrase,
            salt,
            key: Arc::clone(&key),
        });
        Ok(Some(key))
    }
}

impl fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyManager")
            .field("context", &self.context)
            .field("cached", &self.cached.is_some())
            .finish()
    }
}

/// Derive the account key on the blocking pool.
pub async fn derive_account_key(
    password: &str,
    username: &str,
    params: Argon2Params,
) -> Result<AccountKey, CryptoError> {
    let password = Zeroizing::new(password.to_string());
    let username = username.to_string();
    tokio::task::spawn_blocking(move || AccountKey::derive(&password, &username, params))
        .await
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?
}
