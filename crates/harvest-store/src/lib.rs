pub mod error;
pub mod history;
pub mod job_state;
pub mod reports;

pub use error::{Result, StoreError};
pub use history::HistoryStore;
pub use job_state::{JobStateStore, WorkUnitRecord};
pub use reports::ReportWriter;

use std::path::{Path, PathBuf};

/// Filesystem-safe name for an account email.
pub(crate) fn account_file_name(email: &str) -> String {
    email
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
}

/// Write `content` to `path` atomically (temp file + rename).
pub(crate) fn atomic_write(path: &Path, content: &str) -> std::io::Result<()> {
    let tmp: PathBuf = path.with_extension("tmp");
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)
}
