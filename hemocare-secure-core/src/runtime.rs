//! Wiring for the secure store, quota tracker and cooldown.

use crate::backend::MemoryStore;
use crate::clock::{Clock, SystemClock};
use crate::config::GuardConfig;
use crate::cooldown::CooldownGate;
use crate::crypto::envelope::EnvelopeCipher;
use crate::crypto::key::KeyDeriver;
use crate::crypto::key_cache::{DEFAULT_TTL, KeyCache};
use crate::errors::Result;
use crate::gate::MessageGate;
use crate::quota::{LocalUsageCounter, QuotaTracker};
use crate::secure_store::SecureStore;
use hemocare_secure_spec::{DynKeyValueStore, RemoteUsage};
use std::sync::Arc;
use tracing::info;

/// Builder for [`SecureCore`].
#[derive(Default)]
pub struct CoreBuilder {
    config: Option<GuardConfig>,
    store: Option<DynKeyValueStore>,
    remote: Option<Arc<dyn RemoteUsage>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreBuilder {
    /// Builder seeded with [`GuardConfig::from_env`].
    pub fn from_env() -> Self {
        Self::default().config(GuardConfig::from_env())
    }

    pub fn config(mut self, config: GuardConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Device store shared by encrypted values and the local usage record.
    pub fn store(mut self, store: DynKeyValueStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn RemoteUsage>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn build(self) -> Result<SecureCore> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let store = match self.store {
            Some(store) => store,
            None => default_store(&config),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        let deriver = KeyDeriver::new(config.app_secret.as_bytes(), config.pbkdf2_iterations)?;
        let cipher = Arc::new(EnvelopeCipher::new(
            deriver,
            KeyCache::new(config.key_cache_capacity, DEFAULT_TTL),
        ));
        let secure = SecureStore::new(Arc::clone(&store), cipher.clone())
            .with_salt(config.default_salt.clone());

        let local = LocalUsageCounter::new(
            store,
            config.usage_storage_key.clone(),
            config.usage_limits(),
            config.low_credit_threshold,
            Arc::clone(&clock),
        );
        let tracker = Arc::new(QuotaTracker::new(
            self.remote,
            local,
            config.low_credit_threshold,
        ));
        let cooldown = Arc::new(CooldownGate::new(config.cooldown, clock));

        info!(
            remote = tracker.has_remote(),
            daily_limit = config.daily_limit,
            monthly_limit = config.monthly_limit,
            "hemocare secure core ready"
        );

        Ok(SecureCore {
            config,
            cipher,
            secure,
            tracker,
            cooldown,
        })
    }
}

#[cfg(feature = "file")]
fn default_store(config: &GuardConfig) -> DynKeyValueStore {
    match &config.store_dir {
        Some(dir) => Arc::new(crate::backend::FileStore::new(dir)),
        None => Arc::new(MemoryStore::new()),
    }
}

#[cfg(not(feature = "file"))]
fn default_store(_config: &GuardConfig) -> DynKeyValueStore {
    Arc::new(MemoryStore::new())
}

/// Encrypted device storage plus message admission, sharing one device store.
pub struct SecureCore {
    config: GuardConfig,
    cipher: Arc<EnvelopeCipher>,
    secure: SecureStore<DynKeyValueStore>,
    tracker: Arc<QuotaTracker>,
    cooldown: Arc<CooldownGate>,
}

impl SecureCore {
    pub fn builder() -> CoreBuilder {
        CoreBuilder::default()
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn cipher(&self) -> &EnvelopeCipher {
        &self.cipher
    }

    pub fn store(&self) -> &SecureStore<DynKeyValueStore> {
        &self.secure
    }

    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// A gate sharing this core's tracker and cooldown.
    pub fn message_gate(&self) -> MessageGate {
        MessageGate::new(Arc::clone(&self.tracker), Arc::clone(&self.cooldown))
    }
}
