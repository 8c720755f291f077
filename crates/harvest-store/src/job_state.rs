//! Durable record of completed work units, one file per account. This is
//! what makes runs resumable: the pipeline consults it before each unit
//! and writes through it on confirmed completion.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use harvest_types::WorkUnitId;

use crate::error::{Result, StoreError};
use crate::{account_file_name, atomic_write};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkUnitRecord {
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub points: i64,
    #[serde(default)]
    pub attempts: u32,
}

impl WorkUnitRecord {
    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

type DayMap = HashMap<String, WorkUnitRecord>;
type FileMap = HashMap<String, DayMap>;

/// Per-account job state with a per-account mutex so concurrent flows for
/// the same account never interleave read-modify-write cycles. Cross-key
/// access takes no shared lock.
pub struct JobStateStore {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl JobStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self { dir, locks: Mutex::new(HashMap::new()) })
    }

    /// Completed unit ids for `(account, date)`. Outside a run this is a
    /// best-effort snapshot.
    pub async fn get(&self, email: &str, date: NaiveDate) -> Result<HashSet<WorkUnitId>> {
        let map = self.read_file(email)?;
        let key = date.to_string();
        Ok(map
            .get(&key)
            .map(|day| {
                day.iter()
                    .filter(|(_, rec)| rec.is_complete())
                    .map(|(id, _)| WorkUnitId::activity(id))
                    .collect()
            })
            .unwrap_or_default())
    }

    pub async fn is_complete(&self, email: &str, date: NaiveDate, id: &WorkUnitId) -> Result<bool> {
        let map = self.read_file(email)?;
        Ok(map
            .get(&date.to_string())
            .and_then(|day| day.get(id.as_str()))
            .map(|rec| rec.is_complete())
            .unwrap_or(false))
    }

    /// Mark a unit complete. First write wins: re-marking an already
    /// completed unit changes nothing.
    pub async fn mark(
        &self,
        email: &str,
        date: NaiveDate,
        id: &WorkUnitId,
        points: i64,
    ) -> Result<()> {
        let lock = self.lock_for(email).await;
        let _guard = lock.lock().await;

        let mut map = self.read_file(email)?;
        let day = map.entry(date.to_string()).or_default();
        match day.get(id.as_str()) {
            Some(rec) if rec.is_complete() => {
                debug!(unit = %id, "already marked complete, keeping first record");
                return Ok(());
            }
            Some(rec) => {
                let attempts = rec.attempts;
                day.insert(
                    id.as_str().to_string(),
                    WorkUnitRecord {
                        completed_at: Some(Utc::now()),
                        points,
                        attempts: attempts.max(1),
                    },
                );
            }
            None => {
                day.insert(
                    id.as_str().to_string(),
                    WorkUnitRecord { completed_at: Some(Utc::now()), points, attempts: 1 },
                );
            }
        }
        self.write_file(email, &map)
    }

    /// Record an unconfirmed attempt: `attempts` increments, the unit
    /// stays incomplete and will be retried on the next pass.
    pub async fn attempt(&self, email: &str, date: NaiveDate, id: &WorkUnitId) -> Result<u32> {
        let lock = self.lock_for(email).await;
        let _guard = lock.lock().await;

        let mut map = self.read_file(email)?;
        let day = map.entry(date.to_string()).or_default();
        let rec = day
            .entry(id.as_str().to_string())
            .or_insert(WorkUnitRecord { completed_at: None, points: 0, attempts: 0 });
        if rec.is_complete() {
            return Ok(rec.attempts);
        }
        rec.attempts += 1;
        let attempts = rec.attempts;
        self.write_file(email, &map)?;
        Ok(attempts)
    }

    /// Drop everything recorded for `(account, date)`.
    pub async fn reset(&self, email: &str, date: NaiveDate) -> Result<()> {
        let lock = self.lock_for(email).await;
        let _guard = lock.lock().await;

        let mut map = self.read_file(email)?;
        if map.remove(&date.to_string()).is_some() {
            self.write_file(email, &map)?;
        }
        Ok(())
    }

    /// Drop today's records for every account file in the directory.
    pub async fn reset_all_today(&self) -> Result<usize> {
        let today = chrono::Local::now().date_naive().to_string();
        let mut cleared = 0;
        let entries = std::fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let mut map = match self.read_path(&path) {
                Ok(map) => map,
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable state file");
                    continue;
                }
            };
            if map.remove(&today).is_some() {
                let text = serde_json::to_string_pretty(&map)?;
                atomic_write(&path, &text).map_err(|e| StoreError::io(&path, e))?;
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Full snapshot for the dashboard.
    pub fn snapshot(&self, email: &str) -> Result<HashMap<String, HashMap<String, WorkUnitRecord>>> {
        self.read_file(email)
    }

    async fn lock_for(&self, email: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(email.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Drop per-account locks for accounts no longer active, bounding the
    /// map by the live account set.
    pub async fn retain_locks(&self, active: &HashSet<String>) {
        let mut locks = self.locks.lock().await;
        locks.retain(|email, _| active.contains(email));
    }

    fn path_for(&self, email: &str) -> PathBuf {
        self.dir.join(format!("{}.json", account_file_name(email)))
    }

    fn read_file(&self, email: &str) -> Result<FileMap> {
        self.read_path(&self.path_for(email))
    }

    fn read_path(&self, path: &Path) -> Result<FileMap> {
        match std::fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text).map_err(|source| StoreError::Corrupt {
                path: path.display().to_string(),
                source,
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(FileMap::new()),
            Err(err) => Err(StoreError::io(path, err)),
        }
    }

    fn write_file(&self, email: &str, map: &FileMap) -> Result<()> {
        let path = self.path_for(email);
        let text = serde_json::to_string_pretty(map)?;
        atomic_write(&path, &text).map_err(|e| StoreError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_types::Persona;

    fn store() -> (tempfile::TempDir, JobStateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = JobStateStore::new(dir.path().join("state")).unwrap();
        (dir, store)
    }

    fn today() -> NaiveDate {
        chrono::Local::now().date_naive()
    }

    #[tokio::test]
    async fn mark_then_get_round_trips() {
        let (_dir, store) = store();
        let id = WorkUnitId::search(Persona::Desktop);
        store.mark("a@x", today(), &id, 150).await.unwrap();
        assert!(store.is_complete("a@x", today(), &id).await.unwrap());
        assert!(store.get("a@x", today()).await.unwrap().contains(&id));
    }

    #[tokio::test]
    async fn first_write_wins() {
        let (_dir, store) = store();
        let id = WorkUnitId::daily_checkin();
        store.mark("a@x", today(), &id, 10).await.unwrap();
        store.mark("a@x", today(), &id, 999).await.unwrap();
        let snap = store.snapshot("a@x").unwrap();
        let rec = &snap[&today().to_string()][id.as_str()];
        assert_eq!(rec.points, 10);
    }

    #[tokio::test]
    async fn durable_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = WorkUnitId::search(Persona::Mobile);
        {
            let store = JobStateStore::new(dir.path().join("state")).unwrap();
            store.mark("a@x", today(), &id, 100).await.unwrap();
        }
        let store = JobStateStore::new(dir.path().join("state")).unwrap();
        assert!(store.is_complete("a@x", today(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn attempt_does_not_complete() {
        let (_dir, store) = store();
        let id = WorkUnitId::activity("offer-1");
        assert_eq!(store.attempt("a@x", today(), &id).await.unwrap(), 1);
        assert_eq!(store.attempt("a@x", today(), &id).await.unwrap(), 2);
        assert!(!store.is_complete("a@x", today(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn reset_clears_one_day_only() {
        let (_dir, store) = store();
        let id = WorkUnitId::daily_checkin();
        let yesterday = today().pred_opt().unwrap();
        store.mark("a@x", yesterday, &id, 10).await.unwrap();
        store.mark("a@x", today(), &id, 10).await.unwrap();
        store.reset("a@x", today()).await.unwrap();
        assert!(!store.is_complete("a@x", today(), &id).await.unwrap());
        assert!(store.is_complete("a@x", yesterday, &id).await.unwrap());
    }

    #[tokio::test]
    async fn reset_all_today_touches_every_account() {
        let (_dir, store) = store();
        let id = WorkUnitId::daily_checkin();
        store.mark("a@x", today(), &id, 10).await.unwrap();
        store.mark("b@y", today(), &id, 10).await.unwrap();
        assert_eq!(store.reset_all_today().await.unwrap(), 2);
        assert!(!store.is_complete("a@x", today(), &id).await.unwrap());
        assert!(!store.is_complete("b@y", today(), &id).await.unwrap());
    }

    #[tokio::test]
    async fn accounts_do_not_collide() {
        let (_dir, store) = store();
        let id = WorkUnitId::search(Persona::Desktop);
        store.mark("a@x", today(), &id, 10).await.unwrap();
        assert!(!store.is_complete("b@y", today(), &id).await.unwrap());
    }
}
