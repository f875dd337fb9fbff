use crate::crypto::key::{KeyDeriver, SymmetricKey};
use crate::crypto::key_cache::KeyCache;
use crate::errors::{DecryptError, DecryptResult, Error, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{Engine, engine::general_purpose::STANDARD};
use rand::RngCore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::{Mutex, PoisonError};
use tracing::{debug, warn};

/// 96-bit AES-GCM nonce.
pub const NONCE_SIZE: usize = 12;
/// AES-GCM authentication tag length.
pub const TAG_SIZE: usize = 16;
/// Returned by [`EnvelopeCipher::encrypt`] when sealing failed. Never persist it.
pub const ENCRYPTION_FAILED: &str = "";

/// Seals JSON-serializable values as `base64(nonce || ciphertext || tag)`.
pub struct EnvelopeCipher {
    deriver: KeyDeriver,
    keys: Mutex<KeyCache>,
}

impl EnvelopeCipher {
    pub fn new(deriver: KeyDeriver, cache: KeyCache) -> Self {
        Self {
            deriver,
            keys: Mutex::new(cache),
        }
    }

    /// Cipher over the build secret with default cache parameters.
    pub fn from_build_secret() -> Result<Self> {
        Ok(Self::new(
            KeyDeriver::from_build_secret()?,
            KeyCache::new(
                crate::crypto::key_cache::DEFAULT_CACHE_CAPACITY,
                crate::crypto::key_cache::DEFAULT_TTL,
            ),
        ))
    }

    pub fn deriver(&self) -> &KeyDeriver {
        &self.deriver
    }

    /// Encrypts `value`, returning [`ENCRYPTION_FAILED`] on any internal error.
    pub fn encrypt<T: Serialize + ?Sized>(&self, value: &T, salt: &str) -> String {
        match self.try_encrypt(value, salt) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "envelope encryption failed");
                ENCRYPTION_FAILED.to_string()
            }
        }
    }

    /// Decrypts an envelope, collapsing every failure to `None`.
    pub fn decrypt<T: DeserializeOwned>(&self, envelope: &str, salt: &str) -> Option<T> {
        match self.try_decrypt(envelope, salt) {
            Ok(value) => Some(value),
            Err(err) => {
                debug!(error = %err, "envelope decryption failed");
                None
            }
        }
    }

    pub fn try_encrypt<T: Serialize + ?Sized>(&self, value: &T, salt: &str) -> Result<String> {
        let plaintext =
            serde_json::to_vec(value).map_err(|err| Error::Serialization(err.to_string()))?;
        self.seal(&plaintext, salt)
    }

    pub fn try_decrypt<T: DeserializeOwned>(&self, envelope: &str, salt: &str) -> DecryptResult<T> {
        let plaintext = self.open(envelope, salt)?;
        serde_json::from_slice(&plaintext).map_err(|err| DecryptError::Payload(err.to_string()))
    }

    /// Seals raw bytes under the key for `salt` with a fresh random nonce.
    pub fn seal(&self, plaintext: &[u8], salt: &str) -> Result<String> {
        let key = self.key_for(salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| Error::Encryption("invalid AES key".into()))?;

        let mut nonce = [0u8; NONCE_SIZE];
        rand::rng().fill_bytes(&mut nonce);

        let sealed = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::Encryption("failed to encrypt payload".into()))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(STANDARD.encode(out))
    }

    /// Opens an envelope produced by [`EnvelopeCipher::seal`].
    pub fn open(&self, envelope: &str, salt: &str) -> DecryptResult<Vec<u8>> {
        let data = STANDARD
            .decode(envelope.trim())
            .map_err(|err| DecryptError::Encoding(err.to_string()))?;
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(DecryptError::Truncated { len: data.len() });
        }
        let (nonce, sealed) = data.split_at(NONCE_SIZE);

        let key = self.key_for(salt);
        let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
            .map_err(|_| DecryptError::KeyDerivation("invalid AES key".into()))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| DecryptError::MacMismatch)
    }

    fn key_for(&self, salt: &str) -> SymmetricKey {
        let mut keys = self.keys.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(key) = keys.get(salt) {
            return key;
        }
        let key = self.deriver.derive(salt);
        keys.insert(salt, key.clone());
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::MIN_PBKDF2_ITERATIONS;
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use std::time::Duration;

    fn cipher() -> &'static EnvelopeCipher {
        static CIPHER: OnceLock<EnvelopeCipher> = OnceLock::new();
        CIPHER.get_or_init(|| {
            EnvelopeCipher::new(
                KeyDeriver::new("test-secret", MIN_PBKDF2_ITERATIONS).unwrap(),
                KeyCache::new(8, Duration::from_secs(300)),
            )
        })
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let value = json!({
            "name": "Arjun",
            "factor": "VIII",
            "doses": [250, 500],
            "inhibitor": false,
            "notes": null
        });
        let envelope = cipher().encrypt(&value, "default-salt");
        assert!(!envelope.is_empty());
        let recovered: Value = cipher().decrypt(&envelope, "default-salt").unwrap();
        assert_eq!(recovered, value);
    }

    #[test]
    fn scalar_values_roundtrip() {
        for value in [json!(42), json!("text"), json!(true), json!(null), json!([])] {
            let envelope = cipher().encrypt(&value, "s");
            assert_eq!(cipher().decrypt::<Value>(&envelope, "s"), Some(value));
        }
    }

    #[test]
    fn envelope_layout_is_nonce_ciphertext_tag() {
        let plaintext = br#"{"a":1}"#;
        let envelope = cipher().seal(plaintext, "layout").unwrap();
        let raw = STANDARD.decode(envelope).unwrap();
        assert_eq!(raw.len(), NONCE_SIZE + plaintext.len() + TAG_SIZE);
    }

    #[test]
    fn each_encryption_uses_a_fresh_nonce() {
        let a = cipher().encrypt(&json!("same"), "s");
        let b = cipher().encrypt(&json!("same"), "s");
        assert_ne!(a, b);
        let nonce_a = &STANDARD.decode(&a).unwrap()[..NONCE_SIZE];
        let nonce_b = &STANDARD.decode(&b).unwrap()[..NONCE_SIZE];
        assert_ne!(nonce_a, nonce_b);
    }

    #[test]
    fn wrong_salt_is_rejected() {
        let envelope = cipher().encrypt(&json!({"k": "v"}), "A");
        assert_eq!(cipher().decrypt::<Value>(&envelope, "B"), None);
        assert_eq!(
            cipher().try_decrypt::<Value>(&envelope, "B").unwrap_err(),
            DecryptError::MacMismatch
        );
    }

    #[test]
    fn any_flipped_byte_is_rejected() {
        let envelope = cipher().seal(br#"{"bleed":"knee"}"#, "tamper").unwrap();
        let raw = STANDARD.decode(&envelope).unwrap();
        for index in 0..raw.len() {
            let mut tampered = raw.clone();
            tampered[index] ^= 0x01;
            let tampered = STANDARD.encode(tampered);
            assert_eq!(
                cipher().open(&tampered, "tamper").unwrap_err(),
                DecryptError::MacMismatch,
                "byte {index} mutation was accepted"
            );
        }
    }

    #[test]
    fn malformed_envelopes_are_rejected() {
        assert!(matches!(
            cipher().try_decrypt::<Value>("not base64!!", "s"),
            Err(DecryptError::Encoding(_))
        ));
        assert!(matches!(
            cipher().try_decrypt::<Value>(&STANDARD.encode([0u8; 20]), "s"),
            Err(DecryptError::Truncated { len: 20 })
        ));
        assert_eq!(cipher().decrypt::<Value>("", "s"), None);
    }

    #[test]
    fn non_json_plaintext_is_a_payload_error() {
        let envelope = cipher().seal(b"\xff\xfe not json", "s").unwrap();
        assert!(matches!(
            cipher().try_decrypt::<Value>(&envelope, "s"),
            Err(DecryptError::Payload(_))
        ));
    }

    #[test]
    fn unserializable_value_yields_sentinel() {
        let mut map = HashMap::new();
        map.insert((1, 2), "tuple keys are not JSON");
        assert_eq!(cipher().encrypt(&map, "s"), ENCRYPTION_FAILED);
        assert!(matches!(
            cipher().try_encrypt(&map, "s"),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn typed_roundtrip() {
        #[derive(Debug, PartialEq, serde::Serialize, serde::Deserialize)]
        struct Profile {
            name: String,
            severity: String,
        }
        let profile = Profile {
            name: "Meera".into(),
            severity: "moderate".into(),
        };
        let envelope = cipher().encrypt(&profile, "profile");
        assert_eq!(cipher().decrypt::<Profile>(&envelope, "profile"), Some(profile));
    }
}
