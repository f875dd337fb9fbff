//! Encrypted device storage and adaptive message quotas for HemoCare.

pub mod backend;
pub mod clock;
pub mod config;
pub mod cooldown;
pub mod crypto;
pub mod errors;
pub mod gate;
pub mod quota;
pub mod runtime;
pub mod secure_store;
pub mod telemetry;

#[cfg(feature = "file")]
pub use backend::FileStore;
pub use backend::MemoryStore;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::GuardConfig;
pub use cooldown::CooldownGate;
pub use crypto::envelope::EnvelopeCipher;
pub use crypto::key::{KeyDeriver, SymmetricKey};
pub use crypto::key_cache::KeyCache;
pub use errors::{DecryptError, DecryptResult, Error, Result, UsageError, UsageResult};
pub use gate::{Admission, MessageGate, SendOutcome};
pub use quota::{
    LocalUsageCounter, QuotaRecord, QuotaTracker, UsageAuthority, UsageCheck,
    is_emergency_message,
};
pub use runtime::{CoreBuilder, SecureCore};
pub use secure_store::{Lookup, SecureStore};

pub use hemocare_secure_spec::{
    DynKeyValueStore, KeyValueStore, QuotaState, RemoteUsage, RemoteUsageReport, UsageCounts,
    UsageLimits, UsageSnapshot,
};
