//! On-disk run reports: `reports/YYYY-MM-DD/summary_<runid>.json`.

use std::path::{Path, PathBuf};

use harvest_types::RunSummary;

use crate::error::{Result, StoreError};
use crate::atomic_write;

pub struct ReportWriter {
    base: PathBuf,
}

impl ReportWriter {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    pub fn write_summary(&self, summary: &RunSummary) -> Result<PathBuf> {
        let date = summary
            .date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let dir = self.base.join(date.to_string());
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;

        let path = dir.join(format!("summary_{}.json", summary.run_id));
        let text = serde_json::to_string_pretty(summary)?;
        atomic_write(&path, &text).map_err(|e| StoreError::io(&path, e))?;
        Ok(path)
    }

    /// Summaries for one day, newest first.
    pub fn read_day(&self, date: chrono::NaiveDate) -> Result<Vec<RunSummary>> {
        let dir = self.base.join(date.to_string());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StoreError::io(&dir, err)),
        };

        let mut summaries = Vec::new();
        for entry in entries.flatten() {
            if let Some(summary) = self.read_file(&entry.path())? {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(summaries)
    }

    fn read_file(&self, path: &Path) -> Result<Option<RunSummary>> {
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            return Ok(None);
        }
        let text = std::fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
        match serde_json::from_str(&text) {
            Ok(summary) => Ok(Some(summary)),
            Err(source) => Err(StoreError::Corrupt { path: path.display().to_string(), source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_under_dated_directory() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports"));
        let summary = RunSummary {
            run_id: "ab12cd34".into(),
            date: Some(chrono::Local::now().date_naive()),
            accounts_total: 2,
            ..Default::default()
        };
        let path = writer.write_summary(&summary).unwrap();
        assert!(path.to_string_lossy().contains("summary_ab12cd34.json"));

        let read = writer.read_day(summary.date.unwrap()).unwrap();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].accounts_total, 2);
    }

    #[test]
    fn missing_day_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::new(dir.path().join("reports"));
        let date = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        assert!(writer.read_day(date).unwrap().is_empty());
    }
}
