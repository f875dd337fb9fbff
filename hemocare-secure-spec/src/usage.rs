use crate::error::UsageResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub const DEFAULT_DAILY_LIMIT: u32 = 15;
pub const DEFAULT_MONTHLY_LIMIT: u32 = 200;
pub const DEFAULT_LOW_CREDIT_THRESHOLD: u32 = 5;

/// Message caps for one identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageLimits {
    pub daily: u32,
    pub monthly: u32,
}

impl Default for UsageLimits {
    fn default() -> Self {
        Self {
            daily: DEFAULT_DAILY_LIMIT,
            monthly: DEFAULT_MONTHLY_LIMIT,
        }
    }
}

/// Messages already sent in the current day and month.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounts {
    pub daily: u32,
    pub monthly: u32,
}

/// Counters and limits as reported by the remote authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteUsageReport {
    pub counts: UsageCounts,
    pub limits: UsageLimits,
}

/// Admission class of a usage snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaState {
    /// Nothing sent since the last reset.
    Fresh,
    /// Below both caps.
    Available,
    /// Below both caps, but close to the daily cap. Advisory only.
    LowRemaining,
    /// At or over either cap.
    Exhausted,
}

/// Result of a usage check, as surfaced to the chat UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub daily_count: u32,
    pub monthly_count: u32,
    pub daily_limit: u32,
    pub monthly_limit: u32,
    pub can_send: bool,
    pub is_low_credits: bool,
}

impl UsageSnapshot {
    /// Evaluates counts against limits.
    ///
    /// `low_threshold` is the number of remaining daily messages at or below
    /// which the snapshot is flagged as low.
    pub fn evaluate(counts: UsageCounts, limits: UsageLimits, low_threshold: u32) -> Self {
        let daily_remaining = limits.daily.saturating_sub(counts.daily);
        let monthly_remaining = limits.monthly.saturating_sub(counts.monthly);
        let can_send = daily_remaining > 0 && monthly_remaining > 0;
        Self {
            daily_count: counts.daily,
            monthly_count: counts.monthly,
            daily_limit: limits.daily,
            monthly_limit: limits.monthly,
            can_send,
            is_low_credits: can_send && daily_remaining <= low_threshold,
        }
    }

    pub fn daily_remaining(&self) -> u32 {
        self.daily_limit.saturating_sub(self.daily_count)
    }

    pub fn monthly_remaining(&self) -> u32 {
        self.monthly_limit.saturating_sub(self.monthly_count)
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

    pub fn state(&self) -> QuotaState {
        if !self.can_send {
            QuotaState::Exhausted
        } else if self.daily_count == 0 && self.monthly_count == 0 {
            QuotaState::Fresh
        } else if self.is_low_credits {
            QuotaState::LowRemaining
        } else {
            QuotaState::Available
        }
    }
}

/// Server-side authoritative message counter.
///
/// Only usable while the caller holds an authenticated session. Every
/// failure, including a missing session, sends the quota engine to its
/// local fallback.
#[async_trait]
pub trait RemoteUsage: Send + Sync {
    /// Identifier of the authenticated user, if a session is present.
    async fn current_identity(&self) -> UsageResult<Option<String>>;

    async fn get_chat_usage(&self) -> UsageResult<RemoteUsageReport>;

    /// Atomically increments the server-side counters.
    async fn record_chat_message(&self) -> UsageResult<()>;
}
