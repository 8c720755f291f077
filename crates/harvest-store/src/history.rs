//! Rolling per-account run history. One JSON file per account, pruned to
//! a 90-day window on every append; feeds the dashboard stats endpoints.

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

use harvest_types::AccountHistoryEntry;

use crate::error::{Result, StoreError};
use crate::{account_file_name, atomic_write};

const WINDOW_DAYS: i64 = 90;

pub struct HistoryStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayTotals {
    pub date: NaiveDate,
    pub total_points: i64,
    pub runs: usize,
    pub successes: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountStats {
    pub account: String,
    pub runs: usize,
    pub successes: usize,
    pub total_points: i64,
    pub average_points: f64,
    pub best_day: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct GlobalStats {
    pub accounts: usize,
    pub runs: usize,
    pub successes: usize,
    pub total_points: i64,
}

impl HistoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir, locks: Mutex::new(HashMap::new()) })
    }

    pub async fn append(&self, email: &str, entry: AccountHistoryEntry) -> Result<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(email.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
        };
        let _guard = lock.lock().await;

        let mut entries = self.read(email)?;
        entries.push(entry);

        let cutoff = chrono::Local::now().date_naive() - Duration::days(WINDOW_DAYS);
        entries.retain(|e| e.date >= cutoff);

        let path = self.path_for(email);
        let text = serde_json::to_string_pretty(&entries)?;
        atomic_write(&path, &text).map_err(|e| StoreError::io(&path, e))
    }

    pub fn read(&self, email: &str) -> Result<Vec<AccountHistoryEntry>> {
        let path = self.path_for(email);
        match std::fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(err) => Err(StoreError::io(&path, err)),
        }
    }

    /// All accounts that have history on disk, by stored file name.
    pub fn known_accounts(&self) -> Result<Vec<String>> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|e| {
                let name = e.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(|s| s.to_string())
            })
            .collect();
        names.sort();
        Ok(names)
    }

    pub fn account_stats(&self, email: &str) -> Result<AccountStats> {
        let entries = self.read(email)?;
        let runs = entries.len();
        let successes = entries.iter().filter(|e| e.success).count();
        let total_points: i64 = entries.iter().map(|e| e.total_points).sum();
        let best_day = entries
            .iter()
            .max_by_key(|e| e.total_points)
            .map(|e| e.date);
        Ok(AccountStats {
            account: harvest_types::account::mask_email(email),
            runs,
            successes,
            total_points,
            average_points: if runs > 0 { total_points as f64 / runs as f64 } else { 0.0 },
            best_day,
        })
    }

    /// Per-day totals across all accounts over the last `days` days.
    pub fn daily_totals(&self, days: i64) -> Result<Vec<DayTotals>> {
        let cutoff = chrono::Local::now().date_naive() - Duration::days(days.max(0));
        let mut by_day: HashMap<NaiveDate, DayTotals> = HashMap::new();

        for account in self.known_accounts()? {
            for entry in self.read(&account)? {
                if entry.date < cutoff {
                    continue;
                }
                let slot = by_day.entry(entry.date).or_insert(DayTotals {
                    date: entry.date,
                    total_points: 0,
                    runs: 0,
                    successes: 0,
                });
                slot.total_points += entry.total_points;
                slot.runs += 1;
                if entry.success {
                    slot.successes += 1;
                }
            }
        }
        let mut days: Vec<DayTotals> = by_day.into_values().collect();
        days.sort_by_key(|d| d.date);
        Ok(days)
    }

    pub fn global_stats(&self) -> Result<GlobalStats> {
        let mut stats = GlobalStats::default();
        for account in self.known_accounts()? {
            let entries = self.read(&account)?;
            if entries.is_empty() {
                continue;
            }
            stats.accounts += 1;
            stats.runs += entries.len();
            stats.successes += entries.iter().filter(|e| e.success).count();
            stats.total_points += entries.iter().map(|e| e.total_points).sum::<i64>();
        }
        Ok(stats)
    }

    fn path_for(&self, email: &str) -> PathBuf {
        self.dir.join(format!("{}.json", account_file_name(email)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn entry(date: NaiveDate, points: i64, success: bool) -> AccountHistoryEntry {
        AccountHistoryEntry {
            timestamp: Utc::now(),
            date,
            desktop_points: points / 2,
            mobile_points: points - points / 2,
            total_points: points,
            completed: 5,
            failed: 0,
            errors: Vec::new(),
            duration_ms: 120_000,
            success,
        }
    }

    #[tokio::test]
    async fn append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        let today = chrono::Local::now().date_naive();
        store.append("a@x", entry(today, 250, true)).await.unwrap();
        let entries = store.read("a@x").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].total_points, 250);
    }

    #[tokio::test]
    async fn window_prunes_old_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        let today = chrono::Local::now().date_naive();
        let ancient = today - Duration::days(120);
        store.append("a@x", entry(ancient, 100, true)).await.unwrap();
        store.append("a@x", entry(today, 200, true)).await.unwrap();
        let entries = store.read("a@x").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].date, today);
    }

    #[tokio::test]
    async fn daily_totals_aggregate_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        let today = chrono::Local::now().date_naive();
        store.append("a@x", entry(today, 100, true)).await.unwrap();
        store.append("b@y", entry(today, 150, false)).await.unwrap();
        let totals = store.daily_totals(7).unwrap();
        assert_eq!(totals.len(), 1);
        assert_eq!(totals[0].total_points, 250);
        assert_eq!(totals[0].runs, 2);
        assert_eq!(totals[0].successes, 1);
    }

    #[tokio::test]
    async fn account_stats_compute_averages() {
        let dir = tempfile::tempdir().unwrap();
        let store = HistoryStore::new(dir.path()).unwrap();
        let today = chrono::Local::now().date_naive();
        store.append("a@x", entry(today, 100, true)).await.unwrap();
        store.append("a@x", entry(today, 300, true)).await.unwrap();
        let stats = store.account_stats("a@x").unwrap();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.total_points, 400);
        assert!((stats.average_points - 200.0).abs() < f64::EPSILON);
    }
}
