use crate::cooldown::DEFAULT_COOLDOWN;
use crate::crypto::key::{BUILD_APP_SECRET, MIN_PBKDF2_ITERATIONS};
use crate::crypto::key_cache::DEFAULT_CACHE_CAPACITY;
use crate::errors::{Error, Result};
use crate::secure_store::DEFAULT_SALT;
use hemocare_secure_spec::{
    DEFAULT_DAILY_LIMIT, DEFAULT_LOW_CREDIT_THRESHOLD, DEFAULT_MONTHLY_LIMIT, UsageLimits,
};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

pub const DEFAULT_USAGE_KEY: &str = "hemocare_chat_usage";

/// Runtime settings for [`SecureCore`](crate::SecureCore).
#[derive(Clone)]
pub struct GuardConfig {
    pub app_secret: Zeroizing<String>,
    pub default_salt: String,
    pub pbkdf2_iterations: u32,
    pub key_cache_capacity: usize,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    pub low_credit_threshold: u32,
    pub cooldown: Duration,
    pub usage_storage_key: String,
    /// Root for a [`FileStore`](crate::backend::FileStore); in-memory when unset.
    pub store_dir: Option<PathBuf>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            app_secret: Zeroizing::new(BUILD_APP_SECRET.to_string()),
            default_salt: DEFAULT_SALT.to_string(),
            pbkdf2_iterations: MIN_PBKDF2_ITERATIONS,
            key_cache_capacity: DEFAULT_CACHE_CAPACITY,
            daily_limit: DEFAULT_DAILY_LIMIT,
            monthly_limit: DEFAULT_MONTHLY_LIMIT,
            low_credit_threshold: DEFAULT_LOW_CREDIT_THRESHOLD,
            cooldown: DEFAULT_COOLDOWN,
            usage_storage_key: DEFAULT_USAGE_KEY.to_string(),
            store_dir: None,
        }
    }
}

impl GuardConfig {
    /// Defaults overridden by environment variables.
    ///
    /// * `HEMOCARE_APP_SECRET` replaces the build-time secret.
    /// * `HEMOCARE_STORE_SALT` sets the secure store salt.
    /// * `HEMOCARE_PBKDF2_ITERATIONS` raises the iteration count.
    /// * `HEMOCARE_KEY_CACHE_CAPACITY` bounds the derived-key cache.
    /// * `HEMOCARE_DAILY_LIMIT` / `HEMOCARE_MONTHLY_LIMIT` set local caps.
    /// * `HEMOCARE_LOW_CREDIT_THRESHOLD` sets the low-credit warning level.
    /// * `HEMOCARE_COOLDOWN_SECS` sets the spacing between messages.
    /// * `HEMOCARE_USAGE_KEY` names the local usage record.
    /// * `HEMOCARE_STORE_DIR` persists the device store under a directory.
    ///
    /// Blank or unparsable values are ignored.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secret) = env_string("HEMOCARE_APP_SECRET") {
            config.app_secret = Zeroizing::new(secret);
        }
        if let Some(salt) = env_string("HEMOCARE_STORE_SALT") {
            config.default_salt = salt;
        }
        if let Some(iterations) = env_parse("HEMOCARE_PBKDF2_ITERATIONS") {
            config.pbkdf2_iterations = iterations;
        }
        if let Some(capacity) = env_parse::<usize>("HEMOCARE_KEY_CACHE_CAPACITY") {
            config.key_cache_capacity = capacity.max(1);
        }
        if let Some(limit) = env_parse("HEMOCARE_DAILY_LIMIT") {
            config.daily_limit = limit;
        }
        if let Some(limit) = env_parse("HEMOCARE_MONTHLY_LIMIT") {
            config.monthly_limit = limit;
        }
        if let Some(threshold) = env_parse("HEMOCARE_LOW_CREDIT_THRESHOLD") {
            config.low_credit_threshold = threshold;
        }
        if let Some(seconds) = env_parse("HEMOCARE_COOLDOWN_SECS") {
            config.cooldown = Duration::from_secs(seconds);
        }
        if let Some(key) = env_string("HEMOCARE_USAGE_KEY") {
            config.usage_storage_key = key;
        }
        if let Some(dir) = env_string("HEMOCARE_STORE_DIR") {
            config.store_dir = Some(PathBuf::from(dir));
        }

        config
    }

    pub fn app_secret(mut self, secret: impl Into<String>) -> Self {
        self.app_secret = Zeroizing::new(secret.into());
        self
    }

    pub fn default_salt(mut self, salt: impl Into<String>) -> Self {
        self.default_salt = salt.into();
        self
    }

    /// Values below the minimum are raised to it when the key is derived.
    pub fn pbkdf2_iterations(mut self, iterations: u32) -> Self {
        self.pbkdf2_iterations = iterations;
        self
    }

    pub fn key_cache_capacity(mut self, capacity: usize) -> Self {
        self.key_cache_capacity = capacity.max(1);
        self
    }

    pub fn limits(mut self, limits: UsageLimits) -> Self {
        self.daily_limit = limits.daily;
        self.monthly_limit = limits.monthly;
        self
    }

    pub fn low_credit_threshold(mut self, threshold: u32) -> Self {
        self.low_credit_threshold = threshold;
        self
    }

    pub fn cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn usage_storage_key(mut self, key: impl Into<String>) -> Self {
        self.usage_storage_key = key.into();
        self
    }

    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    pub fn usage_limits(&self) -> UsageLimits {
        UsageLimits {
            daily: self.daily_limit,
            monthly: self.monthly_limit,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.app_secret.is_empty() {
            return Err(Error::InvalidConfig("app secret must not be empty".into()));
        }
        if self.default_salt.is_empty() {
            return Err(Error::InvalidConfig("store salt must not be empty".into()));
        }
        if self.daily_limit == 0 || self.monthly_limit == 0 {
            return Err(Error::InvalidConfig(
                "daily and monthly limits must be positive".into(),
            ));
        }
        if self.usage_storage_key.trim().is_empty() {
            return Err(Error::InvalidConfig("usage storage key must not be empty".into()));
        }
        Ok(())
    }
}

impl fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardConfig")
            .field("app_secret", &"<redacted>")
            .field("default_salt", &self.default_salt)
            .field("pbkdf2_iterations", &self.pbkdf2_iterations)
            .field("key_cache_capacity", &self.key_cache_capacity)
            .field("daily_limit", &self.daily_limit)
            .field("monthly_limit", &self.monthly_limit)
            .field("low_credit_threshold", &self.low_credit_threshold)
            .field("cooldown", &self.cooldown)
            .field("usage_storage_key", &self.usage_storage_key)
            .field("store_dir", &self.store_dir)
            .finish()
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Option<T> {
    env_string(name).and_then(|value| value.trim().parse().ok())
}
