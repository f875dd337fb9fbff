//! Symmetric key derivation from the application secret.
//!
//! The secret is fixed per build, so a salt always maps to the same key. This
//! hides stored values from casual inspection of the device store; it is not
//! a defence against an attacker who can run code on the device.

use crate::errors::{Error, Result};
use ring::pbkdf2;
use std::fmt;
use std::num::NonZeroU32;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// Lowest accepted PBKDF2 iteration count.
pub const MIN_PBKDF2_ITERATIONS: u32 = 100_000;

/// Secret compiled into the binary. Set `HEMOCARE_APP_SECRET` at build time
/// to replace the development value.
pub const BUILD_APP_SECRET: &str = match option_env!("HEMOCARE_APP_SECRET") {
    Some(secret) => secret,
    None => "HEMOCARE_SECURE_2026_HIPAA_V1",
};

/// Derived 256-bit key (zeroized on drop).
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_SIZE],
}

impl SymmetricKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey(..)")
    }
}

/// PBKDF2-HMAC-SHA256 over the application secret.
pub struct KeyDeriver {
    secret: Zeroizing<Vec<u8>>,
    iterations: NonZeroU32,
}

impl KeyDeriver {
    /// Builds a deriver; iteration counts below [`MIN_PBKDF2_ITERATIONS`] are
    /// raised to the minimum.
    pub fn new(secret: impl AsRef<[u8]>, iterations: u32) -> Result<Self> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(Error::KeyDerivation("application secret is empty".into()));
        }
        let iterations = NonZeroU32::new(iterations.max(MIN_PBKDF2_ITERATIONS))
            .ok_or_else(|| Error::KeyDerivation("iteration count must be non-zero".into()))?;
        Ok(Self {
            secret: Zeroizing::new(secret.to_vec()),
            iterations,
        })
    }

    /// Deriver over the secret baked into this build.
    pub fn from_build_secret() -> Result<Self> {
        Self::new(BUILD_APP_SECRET, MIN_PBKDF2_ITERATIONS)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations.get()
    }

    /// Derives the key for `salt`. Pure: same salt, same key.
    pub fn derive(&self, salt: &str) -> SymmetricKey {
        let mut bytes = [0u8; KEY_SIZE];
        pbkdf2::derive(
            pbkdf2::PBKDF2_HMAC_SHA256,
            self.iterations,
            salt.as_bytes(),
            &self.secret,
            &mut bytes,
        );
        SymmetricKey { bytes }
    }
}

impl fmt::Debug for KeyDeriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDeriver")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}
