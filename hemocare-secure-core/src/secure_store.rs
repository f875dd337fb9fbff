//! Encrypted key/value wrapper over the device store.
//!
//! Reads degrade to "never set" on any corruption; writes never fall back to
//! plaintext.

use crate::crypto::envelope::{ENCRYPTION_FAILED, EnvelopeCipher};
use crate::errors::Result;
use hemocare_secure_spec::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Salt shared by every value in the store.
pub const DEFAULT_SALT: &str = "default-salt";

/// Outcome of a strict read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    /// Present but unreadable: tampered, keyed elsewhere, or of another shape.
    Corrupted,
}

impl<T> Lookup<T> {
    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(value) => Some(value),
            Lookup::NotFound | Lookup::Corrupted => None,
        }
    }

    pub fn is_corrupted(&self) -> bool {
        matches!(self, Lookup::Corrupted)
    }
}

pub struct SecureStore<S> {
    store: S,
    cipher: Arc<EnvelopeCipher>,
    salt: String,
}

impl<S> SecureStore<S>
where
    S: KeyValueStore,
{
    pub fn new(store: S, cipher: Arc<EnvelopeCipher>) -> Self {
        Self {
            store,
            cipher,
            salt: DEFAULT_SALT.to_string(),
        }
    }

    /// Override the namespace salt.
    pub fn with_salt(mut self, salt: impl Into<String>) -> Self {
        self.salt = salt.into();
        self
    }

    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Borrow the underlying device store.
    pub fn inner(&self) -> &S {
        &self.store
    }

    /// Encrypts and writes `value`. Returns whether anything was written.
    ///
    /// Null values are skipped, as are values that fail to encrypt.
    pub fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> bool {
        let value = match serde_json::to_value(value) {
            Ok(Value::Null) => return false,
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "secure store value is not serializable");
                return false;
            }
        };

        let envelope = self.cipher.encrypt(&value, &self.salt);
        if envelope == ENCRYPTION_FAILED {
            warn!(key, "secure store write suppressed after encryption failure");
            return false;
        }

        match self.store.set(key, &envelope) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "secure store write failed");
                false
            }
        }
    }

    /// Reads and decrypts `key`, returning `default` when absent or unreadable.
    pub fn get<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.lookup(key).found().unwrap_or(default)
    }

    pub fn get_or_default<T: DeserializeOwned + Default>(&self, key: &str) -> T {
        self.get(key, T::default())
    }

    /// Reads `key`, telling absence and corruption apart.
    pub fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let raw = match self.store.get(key) {
            Ok(Some(raw)) if !raw.is_empty() => raw,
            Ok(_) => return Lookup::NotFound,
            Err(err) => {
                warn!(key, error = %err, "secure store read failed");
                return Lookup::NotFound;
            }
        };

        let value: Value = match self.cipher.try_decrypt(&raw, &self.salt) {
            Ok(value) => value,
            Err(err) => {
                debug!(key, error = %err, "secure store value could not be opened");
                return Lookup::Corrupted;
            }
        };
        if value.is_null() {
            return Lookup::NotFound;
        }

        match serde_json::from_value(value) {
            Ok(value) => Lookup::Found(value),
            Err(err) => {
                debug!(key, error = %err, "secure store value has an unexpected shape");
                Lookup::Corrupted
            }
        }
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.store.remove(key)
    }

    /// Clears the whole underlying store, not only encrypted keys.
    pub fn clear(&self) -> Result<()> {
        self.store.clear()
    }
}
