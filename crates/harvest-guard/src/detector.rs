use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use harvest_types::{BanDetectionResult, BanSeverity, IncidentKind, SecurityIncident};

use crate::patterns::{CONSOLE_PATTERN, TEXT_PATTERNS, URL_PATTERNS};

/// Everything one assessment may look at. Omitted signals are simply not
/// evaluated.
#[derive(Debug, Clone, Default)]
pub struct Signals<'a> {
    pub url: Option<&'a str>,
    pub page_text: Option<&'a str>,
    /// Navigation status plus response headers.
    pub http: Option<(u16, &'a [(String, String)])>,
    /// Status of a rewards API call.
    pub api_status: Option<u16>,
    pub console: &'a [String],
}

pub struct BanDetector {
    enabled: bool,
    escalation_threshold: u32,
    accounts_path: Option<PathBuf>,
    warnings: Mutex<HashMap<String, u32>>,
    disabled: Mutex<HashSet<String>>,
}

impl BanDetector {
    pub fn new(enabled: bool, escalation_threshold: u32, accounts_path: Option<PathBuf>) -> Self {
        Self {
            enabled,
            escalation_threshold: escalation_threshold.max(1),
            accounts_path,
            warnings: Mutex::new(HashMap::new()),
            disabled: Mutex::new(HashSet::new()),
        }
    }

    /// Fuse the provided signals into one verdict for `email`. Worst
    /// severity wins; a clean result resets the account's consecutive
    /// warning counter, while the threshold's worth of warnings in a row
    /// escalates to a soft ban.
    pub async fn assess(&self, email: &str, signals: Signals<'_>) -> BanDetectionResult {
        if !self.enabled {
            return BanDetectionResult::clear();
        }

        let mut severity = BanSeverity::None;
        let mut reason = String::new();
        let mut details: Vec<String> = Vec::new();

        fn bump(
            sev: BanSeverity,
            label: &str,
            detail: String,
            severity: &mut BanSeverity,
            reason: &mut String,
            details: &mut Vec<String>,
        ) {
            details.push(detail);
            if sev > *severity {
                *severity = sev;
                *reason = label.to_string();
            }
        }

        if let Some(url) = signals.url {
            for (label, regex) in URL_PATTERNS {
                if regex.is_match(url) {
                    bump(BanSeverity::SoftBan, label, format!("url matched {label}"), &mut severity, &mut reason, &mut details);
                    break;
                }
            }
        }

        if let Some(text) = signals.page_text {
            for pattern in TEXT_PATTERNS {
                if pattern.regex.is_match(text) {
                    bump(pattern.severity, pattern.label, format!("page text matched {}", pattern.label), &mut severity, &mut reason, &mut details);
                }
            }
        }

        if let Some((status, headers)) = signals.http {
            match status {
                403 => bump(BanSeverity::HardBan, "http-403", "navigation returned 403".into(), &mut severity, &mut reason, &mut details),
                429 | 451 => bump(BanSeverity::Warning, "http-throttle", format!("navigation returned {status}"), &mut severity, &mut reason, &mut details),
                _ => {}
            }
            for (name, value) in headers {
                let name = name.to_ascii_lowercase();
                if name == "retry-after" {
                    bump(BanSeverity::Warning, "retry-after", format!("retry-after: {value}"), &mut severity, &mut reason, &mut details);
                } else if name == "x-rate-limit-remaining" && value.trim() == "0" {
                    bump(BanSeverity::Warning, "rate-limit-exhausted", "x-rate-limit-remaining: 0".into(), &mut severity, &mut reason, &mut details);
                }
            }
        }

        if let Some(status) = signals.api_status {
            match status {
                403 => bump(BanSeverity::HardBan, "api-403", "rewards api returned 403".into(), &mut severity, &mut reason, &mut details),
                429 | 451 => bump(BanSeverity::Warning, "api-throttle", format!("rewards api returned {status}"), &mut severity, &mut reason, &mut details),
                _ => {}
            }
        }

        for line in signals.console {
            if CONSOLE_PATTERN.is_match(line) {
                bump(BanSeverity::Warning, "console-signal", format!("console: {line}"), &mut severity, &mut reason, &mut details);
            }
        }

        // Consecutive-warning escalation.
        let mut warnings = self.warnings.lock().await;
        match severity {
            BanSeverity::Warning => {
                let count = warnings.entry(email.to_string()).or_insert(0);
                *count += 1;
                debug!(account = %mask(email), count = *count, "warning recorded");
                if *count >= self.escalation_threshold {
                    severity = BanSeverity::SoftBan;
                    details.push(format!("{count} consecutive warnings", count = *count));
                    reason = "warning-escalation".to_string();
                    *count = 0;
                }
            }
            BanSeverity::None => {
                warnings.remove(email);
            }
            _ => {}
        }
        drop(warnings);

        BanDetectionResult {
            detected: severity > BanSeverity::None,
            severity,
            reason,
            details,
            recoverable: severity < BanSeverity::HardBan,
        }
    }

    /// Apply a hard-ban verdict: disable the account in the accounts file
    /// and hand back the incident to emit. Both happen at most once per
    /// account per process.
    pub async fn enforce_hard_ban(
        &self,
        email: &str,
        verdict: &BanDetectionResult,
    ) -> Option<SecurityIncident> {
        if verdict.severity != BanSeverity::HardBan {
            return None;
        }
        {
            let mut disabled = self.disabled.lock().await;
            if !disabled.insert(email.to_string()) {
                return None;
            }
        }

        if let Some(path) = &self.accounts_path {
            match harvest_config::disable_account(path, email, &verdict.reason) {
                Ok(()) => warn!(account = %mask(email), reason = %verdict.reason, "account disabled"),
                Err(err) => error!(%err, "failed to rewrite accounts file for hard ban"),
            }
        }

        let mut incident = SecurityIncident::new(IncidentKind::AccountSuspended, mask(email))
            .detail(format!("hard ban: {}", verdict.reason))
            .next_step("the account was disabled; investigate before re-enabling");
        for line in &verdict.details {
            incident = incident.detail(line.clone());
        }
        Some(incident)
    }
}

fn mask(email: &str) -> String {
    harvest_types::account::mask_email(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> BanDetector {
        BanDetector::new(true, 3, None)
    }

    #[tokio::test]
    async fn clean_signals_are_clear() {
        let verdict = detector()
            .assess(
                "a@x",
                Signals {
                    url: Some("https://rewards.bing.com/"),
                    page_text: Some("Welcome back"),
                    http: Some((200, &[])),
                    ..Default::default()
                },
            )
            .await;
        assert!(!verdict.detected);
        assert_eq!(verdict.severity, BanSeverity::None);
    }

    #[tokio::test]
    async fn suspended_url_is_soft_ban() {
        let verdict = detector()
            .assess("a@x", Signals { url: Some("https://x/account/suspended"), ..Default::default() })
            .await;
        assert_eq!(verdict.severity, BanSeverity::SoftBan);
        assert!(verdict.recoverable);
    }

    #[tokio::test]
    async fn hard_ban_phrase_beats_warning_phrase() {
        let text = "Your session has expired. This account has been suspended.";
        let verdict = detector()
            .assess("a@x", Signals { page_text: Some(text), ..Default::default() })
            .await;
        assert_eq!(verdict.severity, BanSeverity::HardBan);
        assert_eq!(verdict.reason, "account-suspended");
        assert!(!verdict.recoverable);
    }

    #[tokio::test]
    async fn http_403_is_hard_ban() {
        let verdict = detector()
            .assess("a@x", Signals { http: Some((403, &[])), ..Default::default() })
            .await;
        assert_eq!(verdict.severity, BanSeverity::HardBan);
    }

    #[tokio::test]
    async fn rate_limit_headers_warn() {
        let headers = vec![("Retry-After".to_string(), "120".to_string())];
        let verdict = detector()
            .assess("a@x", Signals { http: Some((200, &headers)), ..Default::default() })
            .await;
        assert_eq!(verdict.severity, BanSeverity::Warning);
    }

    #[tokio::test]
    async fn api_403_is_hard_ban() {
        let verdict = detector()
            .assess("a@x", Signals { api_status: Some(403), ..Default::default() })
            .await;
        assert_eq!(verdict.severity, BanSeverity::HardBan);
        assert_eq!(verdict.reason, "api-403");
    }

    #[tokio::test]
    async fn warnings_escalate_at_exactly_three() {
        let detector = detector();
        let warn_signals = || Signals { api_status: Some(429), ..Default::default() };

        let first = detector.assess("a@x", warn_signals()).await;
        assert_eq!(first.severity, BanSeverity::Warning);
        let second = detector.assess("a@x", warn_signals()).await;
        assert_eq!(second.severity, BanSeverity::Warning);
        let third = detector.assess("a@x", warn_signals()).await;
        assert_eq!(third.severity, BanSeverity::SoftBan);
        assert_eq!(third.reason, "warning-escalation");
    }

    #[tokio::test]
    async fn clean_check_resets_consecutive_warnings() {
        let detector = detector();
        let warn_signals = || Signals { api_status: Some(429), ..Default::default() };

        detector.assess("a@x", warn_signals()).await;
        detector.assess("a@x", warn_signals()).await;
        detector.assess("a@x", Signals::default()).await;
        let after_reset = detector.assess("a@x", warn_signals()).await;
        assert_eq!(after_reset.severity, BanSeverity::Warning);
    }

    #[tokio::test]
    async fn warning_counters_are_per_account() {
        let detector = detector();
        let warn_signals = || Signals { api_status: Some(429), ..Default::default() };
        detector.assess("a@x", warn_signals()).await;
        detector.assess("a@x", warn_signals()).await;
        let other = detector.assess("b@y", warn_signals()).await;
        assert_eq!(other.severity, BanSeverity::Warning);
    }

    #[tokio::test]
    async fn disabled_detector_sees_nothing() {
        let detector = BanDetector::new(false, 3, None);
        let verdict = detector
            .assess("a@x", Signals { api_status: Some(403), ..Default::default() })
            .await;
        assert!(!verdict.detected);
    }

    #[tokio::test]
    async fn hard_ban_enforced_exactly_once() {
        use std::io::Write;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"[{"email": "a@x.com", "password": "p"}]"#).unwrap();

        let detector = BanDetector::new(true, 3, Some(file.path().to_path_buf()));
        let verdict = detector
            .assess("a@x.com", Signals { api_status: Some(403), ..Default::default() })
            .await;

        let first = detector.enforce_hard_ban("a@x.com", &verdict).await;
        assert!(first.is_some());
        assert_eq!(first.unwrap().kind, IncidentKind::AccountSuspended);

        let second = detector.enforce_hard_ban("a@x.com", &verdict).await;
        assert!(second.is_none());

        let content = std::fs::read_to_string(file.path()).unwrap();
        assert!(content.contains("// BANNED"));
        assert!(content.contains("\"enabled\": false"));
    }

    #[tokio::test]
    async fn soft_ban_is_not_enforced() {
        let detector = detector();
        let verdict = detector
            .assess("a@x", Signals { url: Some("https://x/blocked"), ..Default::default() })
            .await;
        assert!(detector.enforce_hard_ban("a@x", &verdict).await.is_none());
    }
}
