use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::incident::{BanDetectionResult, SecurityIncident};

pub type Result<T> = std::result::Result<T, FlowError>;

/// Failure taxonomy captured at the pipeline boundary. Local recovery is
/// attempted only for `TransientBrowser` (context rebuild) and mobile
/// search retries; everything else is recorded and the run continues or
/// halts per variant.
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("browser target closed or navigation failed: {0}")]
    TransientBrowser(String),

    #[error("login needs re-observation: {0}")]
    LoginRecoverable(String),

    #[error("login failed terminally: {0}")]
    LoginFatal(String),

    #[error("activity handler failed: {0}")]
    Activity(String),

    #[error("security incident: {}", .0.kind)]
    Security(SecurityIncident),

    #[error("ban verdict: {} ({})", .0.severity, .0.reason)]
    Ban(BanDetectionResult),

    #[error("store error: {0}")]
    Store(String),

    #[error("http error: {0}")]
    Http(String),

    #[error("work unit timed out after {0} seconds")]
    UnitTimeout(u64),

    #[error("cancelled")]
    Cancelled,
}

impl FlowError {
    /// Stable 12-hex-char identifier for aggregating recurrences of the
    /// same underlying failure across runs and machines.
    pub fn error_id(&self) -> String {
        error_id(&self.to_string())
    }

    pub fn is_security(&self) -> bool {
        matches!(self, FlowError::Security(_))
    }
}

static TIMESTAMP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(\.\d+)?(Z|[+-]\d{2}:?\d{2})?")
        .unwrap()
});
static HEX_ADDR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"0x[0-9a-fA-F]+").unwrap());
static PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:[A-Za-z]:)?(?:[/\\][\w.\- ]+){2,}").unwrap());
static LINE_NO_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d+(:\d+)?\b").unwrap());

/// Normalise error text (drop timestamps, filesystem paths, line numbers
/// and hex addresses), then return the first 12 hex chars of its SHA-256.
pub fn error_id(text: &str) -> String {
    let mut normalised = TIMESTAMP_RE.replace_all(text, "<ts>").into_owned();
    normalised = HEX_ADDR_RE.replace_all(&normalised, "<addr>").into_owned();
    normalised = PATH_RE.replace_all(&normalised, "<path>").into_owned();
    normalised = LINE_NO_RE.replace_all(&normalised, "").into_owned();
    let normalised = normalised.split_whitespace().collect::<Vec<_>>().join(" ");

    let digest = Sha256::digest(normalised.as_bytes());
    hex::encode(&digest[..6])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_id_is_twelve_hex_chars() {
        let id = error_id("navigation timeout");
        assert_eq!(id.len(), 12);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn error_id_stable_under_timestamp_and_path_variation() {
        let a = error_id(
            "2025-01-03T10:22:01Z timeout at /home/alice/harvest/src/run.rs:42 addr 0xdeadbeef",
        );
        let b = error_id(
            "2025-06-17 23:59:59.123+02:00 timeout at /srv/deploy/harvest/src/run.rs:911 addr 0x1f00",
        );
        assert_eq!(a, b);
    }

    #[test]
    fn error_id_differs_for_different_failures() {
        assert_ne!(error_id("navigation timeout"), error_id("element not found"));
    }

    #[test]
    fn flow_error_ids_match_display_text() {
        let e = FlowError::TransientBrowser("target closed".into());
        assert_eq!(e.error_id(), error_id(&e.to_string()));
    }
}
