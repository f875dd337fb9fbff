//! Contracts shared by the secure store, the usage quota engine, and the
//! remote usage client.

pub mod error;
pub mod store;
pub mod usage;

pub use error::{DecryptError, DecryptResult, Error, Result, UsageError, UsageResult};
pub use store::{DynKeyValueStore, KeyValueStore};
pub use usage::{
    DEFAULT_DAILY_LIMIT, DEFAULT_LOW_CREDIT_THRESHOLD, DEFAULT_MONTHLY_LIMIT, QuotaState,
    RemoteUsage, RemoteUsageReport, UsageCounts, UsageLimits, UsageSnapshot,
};

pub mod prelude {
    pub use crate::{
        DecryptError, Error, KeyValueStore, QuotaState, RemoteUsage, Result, UsageError,
        UsageSnapshot,
    };
}
