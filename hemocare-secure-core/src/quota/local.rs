use crate::clock::{Clock, month_start};
use crate::errors::{Error, Result};
use hemocare_secure_spec::{DynKeyValueStore, UsageCounts, UsageLimits, UsageSnapshot};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use time::Date;
use tracing::{debug, warn};

/// Per-identity counter state held in the device store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaRecord {
    pub daily_count: u32,
    pub monthly_count: u32,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    /// Calendar day the daily counter belongs to.
    pub last_daily_reset: Date,
    /// First day of the month the monthly counter belongs to.
    pub last_monthly_reset: Date,
}

impl QuotaRecord {
    pub fn fresh(today: Date, limits: UsageLimits) -> Self {
        Self {
            daily_count: 0,
            monthly_count: 0,
            daily_limit: limits.daily,
            monthly_limit: limits.monthly,
            last_daily_reset: today,
            last_monthly_reset: month_start(today),
        }
    }

    /// Zeroes whichever counters belong to an earlier day or month.
    /// Returns whether anything changed.
    pub fn roll_over(&mut self, today: Date) -> bool {
        let mut changed = false;
        if self.last_daily_reset != today {
            self.daily_count = 0;
            self.last_daily_reset = today;
            changed = true;
        }
        let month = month_start(today);
        if self.last_monthly_reset != month {
            self.monthly_count = 0;
            self.last_monthly_reset = month;
            changed = true;
        }
        changed
    }

    pub fn counts(&self) -> UsageCounts {
        UsageCounts {
            daily: self.daily_count,
            monthly: self.monthly_count,
        }
    }

    pub fn limits(&self) -> UsageLimits {
        UsageLimits {
            daily: self.daily_limit,
            monthly: self.monthly_limit,
        }
    }
}

/// Device-local fallback counter.
///
/// One record per authenticated identity (`<key>:<id>`) plus one for the
/// anonymous device (`<key>`). Unreadable records count as fresh.
pub struct LocalUsageCounter {
    store: DynKeyValueStore,
    storage_key: String,
    limits: UsageLimits,
    low_threshold: u32,
    clock: Arc<dyn Clock>,
    write_lock: Mutex<()>,
}

impl LocalUsageCounter {
    pub fn new(
        store: DynKeyValueStore,
        storage_key: impl Into<String>,
        limits: UsageLimits,
        low_threshold: u32,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            storage_key: storage_key.into(),
            limits,
            low_threshold,
            clock,
            write_lock: Mutex::new(()),
        }
    }

    pub fn limits(&self) -> UsageLimits {
        self.limits
    }

    /// Current usage for `identity`, rolling counters over first.
    pub fn check(&self, identity: Option<&str>) -> UsageSnapshot {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let key = self.key_for(identity);
        let today = self.clock.today();
        let counts = match self.load(&key) {
            Some(mut record) => {
                if record.roll_over(today) {
                    debug!(key = %key, "local usage counters rolled over");
                    if let Err(err) = self.save(&key, &record) {
                        warn!(key = %key, error = %err, "failed to persist rolled-over usage");
                    }
                }
                record.counts()
            }
            None => UsageCounts::default(),
        };
        UsageSnapshot::evaluate(counts, self.limits, self.low_threshold)
    }

    /// Counts one message against `identity`. Returns whether it was persisted.
    pub fn record(&self, identity: Option<&str>) -> bool {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let key = self.key_for(identity);
        let today = self.clock.today();
        let mut record = self
            .load(&key)
            .unwrap_or_else(|| QuotaRecord::fresh(today, self.limits));
        record.roll_over(today);
        record.daily_count = record.daily_count.saturating_add(1);
        record.monthly_count = record.monthly_count.saturating_add(1);

        match self.save(&key, &record) {
            Ok(()) => true,
            Err(err) => {
                warn!(key = %key, error = %err, "failed to persist local usage");
                false
            }
        }
    }

    /// Stored record for `identity`, without rollover.
    pub fn record_for(&self, identity: Option<&str>) -> Option<QuotaRecord> {
        self.load(&self.key_for(identity))
    }

    /// Overwrites the stored record for `identity`.
    pub fn store_record(&self, identity: Option<&str>, record: &QuotaRecord) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.save(&self.key_for(identity), record)
    }

    fn key_for(&self, identity: Option<&str>) -> String {
        match identity {
            Some(id) => format!("{}:{id}", self.storage_key),
            None => self.storage_key.clone(),
        }
    }

    fn load(&self, key: &str) -> Option<QuotaRecord> {
        let raw = match self.store.get(key) {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(key, error = %err, "failed to read local usage");
                return None;
            }
        };
        match serde_json::from_str::<QuotaRecord>(&raw) {
            Ok(mut record) => {
                record.daily_limit = self.limits.daily;
                record.monthly_limit = self.limits.monthly;
                Some(record)
            }
            Err(err) => {
                debug!(key, error = %err, "discarding unreadable local usage record");
                None
            }
        }
    }

    fn save(&self, key: &str, record: &QuotaRecord) -> Result<()> {
        let raw =
            serde_json::to_string(record).map_err(|err| Error::Serialization(err.to_string()))?;
        self.store.set(key, &raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::clock::ManualClock;
    use hemocare_secure_spec::KeyValueStore;
    use time::Duration;
    use time::macros::{date, datetime};

    fn counter() -> (LocalUsageCounter, Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        let clock = ManualClock::new(datetime!(2026-10-18 09:30 UTC));
        let counter = LocalUsageCounter::new(
            store.clone(),
            "hemocare_chat_usage",
            UsageLimits::default(),
            5,
            Arc::new(clock.clone()),
        );
        (counter, store, clock)
    }

    #[test]
    fn empty_store_reports_fresh_usage_without_writing() {
        let (counter, store, _) = counter();
        let usage = counter.check(None);
        assert_eq!(usage.daily_count, 0);
        assert!(usage.can_send);
        assert!(store.is_empty());
    }

    #[test]
    fn record_increments_both_counters() {
        let (counter, _, _) = counter();
        assert!(counter.record(None));
        assert!(counter.record(None));
        let usage = counter.check(None);
        assert_eq!(usage.daily_count, 2);
        assert_eq!(usage.monthly_count, 2);
    }

    #[test]
    fn record_is_stored_as_calendar_markers() {
        let (counter, store, _) = counter();
        counter.record(None);
        let raw = store.get("hemocare_chat_usage").unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["lastDailyReset"], "2026-10-18");
        assert_eq!(json["lastMonthlyReset"], "2026-10-01");
        assert_eq!(json["dailyCount"], 1);
    }

    #[test]
    fn daily_rollover_keeps_monthly_count() {
        let (counter, _, clock) = counter();
        for _ in 0..15 {
            counter.record(None);
        }
        assert!(!counter.check(None).can_send);

        clock.advance(Duration::days(1));
        let usage = counter.check(None);
        assert_eq!(usage.daily_count, 0);
        assert_eq!(usage.monthly_count, 15);
        assert!(usage.can_send);
    }

    #[test]
    fn monthly_rollover_zeroes_monthly_count() {
        let (counter, _, clock) = counter();
        counter.record(None);
        clock.set(datetime!(2026-11-01 00:00 UTC));
        let usage = counter.check(None);
        assert_eq!(usage.daily_count, 0);
        assert_eq!(usage.monthly_count, 0);
        let record = counter.record_for(None).unwrap();
        assert_eq!(record.last_monthly_reset, date!(2026 - 11 - 01));
    }

    #[test]
    fn identities_are_counted_separately() {
        let (counter, store, _) = counter();
        counter.record(Some("user-1"));
        counter.record(Some("user-1"));
        counter.record(None);
        assert_eq!(counter.check(Some("user-1")).daily_count, 2);
        assert_eq!(counter.check(Some("user-2")).daily_count, 0);
        assert_eq!(counter.check(None).daily_count, 1);
        assert!(store.get("hemocare_chat_usage:user-1").unwrap().is_some());
    }

    #[test]
    fn unreadable_record_counts_as_fresh() {
        let (counter, store, _) = counter();
        store.set("hemocare_chat_usage", "{not json").unwrap();
        assert_eq!(counter.check(None).daily_count, 0);
        assert!(counter.record(None));
        assert_eq!(counter.check(None).daily_count, 1);
    }
}
