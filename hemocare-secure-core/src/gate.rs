//! Admission control for outbound chat messages.

use crate::cooldown::CooldownGate;
use crate::quota::QuotaTracker;
use hemocare_secure_spec::UsageSnapshot;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info};

/// Verdict for a single outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "admission", rename_all = "snake_case")]
pub enum Admission {
    /// Send it. Emergency messages skip the quota lookup, so `usage` is
    /// only populated for ordinary messages.
    Allowed {
        emergency: bool,
        usage: Option<UsageSnapshot>,
    },
    CoolingDown { remaining_secs: u64 },
    QuotaExhausted { usage: UsageSnapshot },
    /// Nothing but whitespace.
    EmptyMessage,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }
}

#[derive(Debug)]
pub enum SendOutcome<T> {
    Sent {
        response: T,
        emergency: bool,
        /// Whether the message was counted against the quota.
        recorded: bool,
    },
    Denied(Admission),
}

#[derive(Clone)]
pub struct MessageGate {
    tracker: Arc<QuotaTracker>,
    cooldown: Arc<CooldownGate>,
}

impl MessageGate {
    pub fn new(tracker: Arc<QuotaTracker>, cooldown: Arc<CooldownGate>) -> Self {
        Self { tracker, cooldown }
    }

    pub fn tracker(&self) -> &QuotaTracker {
        &self.tracker
    }

    pub fn cooldown(&self) -> &CooldownGate {
        &self.cooldown
    }

    /// Decides whether `text` may be sent now.
    ///
    /// The cooldown applies to every message. Emergencies bypass only the
    /// quota.
    pub async fn admit(&self, text: &str) -> Admission {
        if text.trim().is_empty() {
            return Admission::EmptyMessage;
        }
        if self.cooldown.is_on_cooldown() {
            let remaining_secs = self.cooldown.cooldown_remaining_secs();
            debug!(remaining_secs, "message held by cooldown");
            return Admission::CoolingDown { remaining_secs };
        }
        if self.tracker.is_emergency_message(text) {
            info!("emergency message admitted without quota check");
            return Admission::Allowed {
                emergency: true,
                usage: None,
            };
        }

        let usage = self.tracker.check_usage().await;
        if usage.can_send {
            Admission::Allowed {
                emergency: false,
                usage: Some(usage),
            }
        } else {
            info!(
                daily = usage.daily_count,
                monthly = usage.monthly_count,
                "message refused: quota exhausted"
            );
            Admission::QuotaExhausted { usage }
        }
    }

    /// Admits `text`, runs `call` and books the result.
    ///
    /// The cooldown starts once `call` returns, whatever its outcome. Usage
    /// is recorded only when `call` succeeds; emergency messages count too.
    pub async fn send<F, Fut, T, E>(&self, text: &str, call: F) -> Result<SendOutcome<T>, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let emergency = match self.admit(text).await {
            Admission::Allowed { emergency, .. } => emergency,
            denied => return Ok(SendOutcome::Denied(denied)),
        };

        let result = call(text.trim().to_string()).await;
        self.cooldown.mark_sent();
        let response = result?;

        let recorded = self.tracker.record_message().await;
        Ok(SendOutcome::Sent {
            response,
            emergency,
            recorded,
        })
    }
}
