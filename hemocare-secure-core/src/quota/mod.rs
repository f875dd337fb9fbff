//! Adaptive message quota.
//!
//! Usage is answered by exactly one authority per call: the remote counter
//! when a session is present and reachable, otherwise the device-local
//! fallback. The two are never reconciled.

pub mod emergency;
pub mod local;

pub use emergency::{EMERGENCY_KEYWORDS, is_emergency_message};
pub use local::{LocalUsageCounter, QuotaRecord};

use hemocare_secure_spec::{RemoteUsage, UsageSnapshot};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which counter answered a usage call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "authority", rename_all = "snake_case")]
pub enum UsageAuthority {
    Remote { identity: String },
    /// Device-local counter, keyed by identity when one is known.
    LocalFallback { identity: Option<String> },
}

impl UsageAuthority {
    pub fn is_remote(&self) -> bool {
        matches!(self, UsageAuthority::Remote { .. })
    }
}

/// Usage together with the authority that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UsageCheck {
    pub usage: UsageSnapshot,
    pub authority: UsageAuthority,
}

enum Route {
    Remote(Arc<dyn RemoteUsage>, String),
    Local(Option<String>),
}

pub struct QuotaTracker {
    remote: Option<Arc<dyn RemoteUsage>>,
    local: LocalUsageCounter,
    low_threshold: u32,
}

impl QuotaTracker {
    pub fn new(
        remote: Option<Arc<dyn RemoteUsage>>,
        local: LocalUsageCounter,
        low_threshold: u32,
    ) -> Self {
        Self {
            remote,
            local,
            low_threshold,
        }
    }

    /// Tracker that never consults a remote counter.
    pub fn local_only(local: LocalUsageCounter, low_threshold: u32) -> Self {
        Self::new(None, local, low_threshold)
    }

    pub fn has_remote(&self) -> bool {
        self.remote.is_some()
    }

    pub fn local(&self) -> &LocalUsageCounter {
        &self.local
    }

    pub fn low_threshold(&self) -> u32 {
        self.low_threshold
    }

    /// Current usage. Never fails; remote errors fall back to local state.
    pub async fn check_usage(&self) -> UsageSnapshot {
        self.check_usage_detailed().await.usage
    }

    pub async fn check_usage_detailed(&self) -> UsageCheck {
        match self.route().await {
            Route::Remote(remote, identity) => match remote.get_chat_usage().await {
                Ok(report) => UsageCheck {
                    usage: UsageSnapshot::evaluate(
                        report.counts,
                        report.limits,
                        self.low_threshold,
                    ),
                    authority: UsageAuthority::Remote { identity },
                },
                Err(err) => {
                    warn!(
                        kind = err.kind(),
                        error = %err,
                        "remote usage check failed; using local counter"
                    );
                    self.check_local(Some(identity))
                }
            },
            Route::Local(identity) => self.check_local(identity),
        }
    }

    /// Counts one sent message. Returns whether the count was persisted.
    pub async fn record_message(&self) -> bool {
        self.record_message_detailed().await.1
    }

    pub async fn record_message_detailed(&self) -> (UsageAuthority, bool) {
        match self.route().await {
            Route::Remote(remote, identity) => match remote.record_chat_message().await {
                Ok(()) => (UsageAuthority::Remote { identity }, true),
                Err(err) => {
                    warn!(
                        kind = err.kind(),
                        error = %err,
                        "remote usage record failed; using local counter"
                    );
                    let recorded = self.local.record(Some(&identity));
                    (
                        UsageAuthority::LocalFallback {
                            identity: Some(identity),
                        },
                        recorded,
                    )
                }
            },
            Route::Local(identity) => {
                let recorded = self.local.record(identity.as_deref());
                (UsageAuthority::LocalFallback { identity }, recorded)
            }
        }
    }

    pub fn is_emergency_message(&self, text: &str) -> bool {
        is_emergency_message(text)
    }

    fn check_local(&self, identity: Option<String>) -> UsageCheck {
        UsageCheck {
            usage: self.local.check(identity.as_deref()),
            authority: UsageAuthority::LocalFallback { identity },
        }
    }

    async fn route(&self) -> Route {
        let Some(remote) = &self.remote else {
            return Route::Local(None);
        };
        match remote.current_identity().await {
            Ok(Some(identity)) => Route::Remote(Arc::clone(remote), identity),
            Ok(None) => {
                debug!("no authenticated session; using local counter");
                Route::Local(None)
            }
            Err(err) => {
                warn!(
                    kind = err.kind(),
                    error = %err,
                    "session lookup failed; using local counter"
                );
                Route::Local(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;
    use crate::clock::ManualClock;
    use async_trait::async_trait;
    use hemocare_secure_spec::{
        RemoteUsageReport, UsageCounts, UsageError, UsageLimits, UsageResult,
    };
    use std::sync::atomic::{AtomicU32, Ordering};
    use time::macros::datetime;

    #[derive(Default)]
    struct FakeRemote {
        identity: Option<String>,
        failing: bool,
        recorded: AtomicU32,
    }

    #[async_trait]
    impl RemoteUsage for FakeRemote {
        async fn current_identity(&self) -> UsageResult<Option<String>> {
            Ok(self.identity.clone())
        }

        async fn get_chat_usage(&self) -> UsageResult<RemoteUsageReport> {
            if self.failing {
                return Err(UsageError::Transport("connection refused".into()));
            }
            Ok(RemoteUsageReport {
                counts: UsageCounts {
                    daily: 3 + self.recorded.load(Ordering::SeqCst),
                    monthly: 40,
                },
                limits: UsageLimits {
                    daily: 20,
                    monthly: 300,
                },
            })
        }

        async fn record_chat_message(&self) -> UsageResult<()> {
            if self.failing {
                return Err(UsageError::Backend {
                    status: 503,
                    message: "unavailable".into(),
                });
            }
            self.recorded.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn local() -> LocalUsageCounter {
        LocalUsageCounter::new(
            Arc::new(MemoryStore::new()),
            "hemocare_chat_usage",
            UsageLimits::default(),
            5,
            Arc::new(ManualClock::new(datetime!(2026-10-18 12:00 UTC))),
        )
    }

    #[tokio::test]
    async fn without_remote_local_counter_answers() {
        let tracker = QuotaTracker::local_only(local(), 5);
        let check = tracker.check_usage_detailed().await;
        assert_eq!(check.authority, UsageAuthority::LocalFallback { identity: None });
        assert_eq!(check.usage.daily_limit, 15);
        assert!(tracker.record_message().await);
        assert_eq!(tracker.check_usage().await.daily_count, 1);
    }

    #[tokio::test]
    async fn signed_in_user_uses_remote_limits() {
        let remote = Arc::new(FakeRemote {
            identity: Some("user-7".into()),
            ..FakeRemote::default()
        });
        let tracker = QuotaTracker::new(Some(remote.clone()), local(), 5);
        let check = tracker.check_usage_detailed().await;
        assert!(check.authority.is_remote());
        assert_eq!(check.usage.daily_count, 3);
        assert_eq!(check.usage.daily_limit, 20);
        assert_eq!(check.usage.monthly_limit, 300);

        let (authority, recorded) = tracker.record_message_detailed().await;
        assert!(authority.is_remote());
        assert!(recorded);
        assert_eq!(remote.recorded.load(Ordering::SeqCst), 1);
        assert!(tracker.local().record_for(Some("user-7")).is_none());
    }

    #[tokio::test]
    async fn anonymous_session_uses_local_counter() {
        let remote = Arc::new(FakeRemote::default());
        let tracker = QuotaTracker::new(Some(remote), local(), 5);
        let check = tracker.check_usage_detailed().await;
        assert_eq!(check.authority, UsageAuthority::LocalFallback { identity: None });
        assert_eq!(check.usage.daily_limit, 15);
    }

    #[tokio::test]
    async fn remote_failure_falls_back_to_identity_local_record() {
        let remote = Arc::new(FakeRemote {
            identity: Some("user-9".into()),
            failing: true,
            ..FakeRemote::default()
        });
        let tracker = QuotaTracker::new(Some(remote), local(), 5);

        let (authority, recorded) = tracker.record_message_detailed().await;
        assert_eq!(
            authority,
            UsageAuthority::LocalFallback {
                identity: Some("user-9".into())
            }
        );
        assert!(recorded);

        let check = tracker.check_usage_detailed().await;
        assert!(!check.authority.is_remote());
        assert_eq!(check.usage.daily_count, 1);
        assert_eq!(tracker.local().check(None).daily_count, 0);
    }
}
