use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-run summary appended to an account's rolling history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountHistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub date: NaiveDate,
    pub desktop_points: i64,
    pub mobile_points: i64,
    pub total_points: i64,
    pub completed: u32,
    pub failed: u32,
    pub errors: Vec<String>,
    pub duration_ms: u64,
    pub success: bool,
}

/// Aggregated outcome of one orchestrator run across all accounts,
/// written to `reports/YYYY-MM-DD/summary_<runid>.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub date: Option<NaiveDate>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub accounts_total: usize,
    pub accounts_succeeded: usize,
    pub accounts_failed: usize,
    pub total_points: i64,
    pub incidents: usize,
    pub entries: Vec<RunSummaryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummaryEntry {
    /// Masked email.
    pub account: String,
    pub points: i64,
    pub completed: u32,
    pub failed: u32,
    pub success: bool,
    pub duration_ms: u64,
}
