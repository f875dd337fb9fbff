use hemocare_secure_spec::{RemoteUsageReport, UsageCounts, UsageLimits};
use serde::Deserialize;

/// One row of the `get_chat_usage` RPC result.
#[derive(Debug, Clone, Deserialize)]
pub struct UsageRow {
    pub daily_messages: u32,
    pub monthly_messages: u32,
    pub daily_limit: u32,
    pub monthly_limit: u32,
}

impl From<UsageRow> for RemoteUsageReport {
    fn from(row: UsageRow) -> Self {
        RemoteUsageReport {
            counts: UsageCounts {
                daily: row.daily_messages,
                monthly: row.monthly_messages,
            },
            limits: UsageLimits {
                daily: row.daily_limit,
                monthly: row.monthly_limit,
            },
        }
    }
}

/// Table-returning RPCs answer with an array; scalar ones with an object.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum UsageRows {
    Many(Vec<UsageRow>),
    One(UsageRow),
}

impl UsageRows {
    /// First row, or zero usage under the default limits when there is none.
    pub fn into_report(self) -> RemoteUsageReport {
        let row = match self {
            UsageRows::Many(rows) => rows.into_iter().next(),
            UsageRows::One(row) => Some(row),
        };
        row.map(RemoteUsageReport::from)
            .unwrap_or_else(|| RemoteUsageReport {
                counts: UsageCounts::default(),
                limits: UsageLimits::default(),
            })
    }
}

/// Error body returned by the REST gateway.
#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

impl ErrorResponse {
    pub fn describe(self) -> Option<String> {
        let text = self.message.or(self.error)?;
        Some(match self.code {
            Some(code) => format!("{text} ({code})"),
            None => text,
        })
    }
}
