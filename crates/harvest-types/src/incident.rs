use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity ladder for ban/risk verdicts. The ordering is load-bearing:
/// fusion keeps the worst severity seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BanSeverity {
    None,
    Warning,
    SoftBan,
    HardBan,
}

impl fmt::Display for BanSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BanSeverity::None => "none",
            BanSeverity::Warning => "warning",
            BanSeverity::SoftBan => "soft-ban",
            BanSeverity::HardBan => "hard-ban",
        };
        f.write_str(s)
    }
}

/// Fused verdict from the ban/risk detector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanDetectionResult {
    pub detected: bool,
    pub severity: BanSeverity,
    pub reason: String,
    pub details: Vec<String>,
    pub recoverable: bool,
}

impl BanDetectionResult {
    pub fn clear() -> Self {
        Self {
            detected: false,
            severity: BanSeverity::None,
            reason: String::new(),
            details: Vec::new(),
            recoverable: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IncidentKind {
    RecoveryMismatch,
    SignInBlocked,
    AccountSuspended,
    CompromisedDetected,
    ManualTwoFactor,
    BanWarning,
}

impl IncidentKind {
    /// Whether this incident halts all automation process-wide.
    pub fn engages_standby(&self) -> bool {
        matches!(
            self,
            IncidentKind::RecoveryMismatch
                | IncidentKind::SignInBlocked
                | IncidentKind::AccountSuspended
                | IncidentKind::CompromisedDetected
        )
    }
}

impl fmt::Display for IncidentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IncidentKind::RecoveryMismatch => "recovery-mismatch",
            IncidentKind::SignInBlocked => "sign-in-blocked",
            IncidentKind::AccountSuspended => "account-suspended",
            IncidentKind::CompromisedDetected => "compromised-detected",
            IncidentKind::ManualTwoFactor => "manual-2fa",
            IncidentKind::BanWarning => "ban-warning",
        };
        f.write_str(s)
    }
}

/// A security event severe enough to surface to the operator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityIncident {
    pub kind: IncidentKind,
    /// Masked account email; raw addresses never leave the process.
    pub account: String,
    pub details: Vec<String>,
    /// Suggested operator next steps.
    pub next: Vec<String>,
    pub docs_url: Option<String>,
}

impl SecurityIncident {
    pub fn new(kind: IncidentKind, masked_account: impl Into<String>) -> Self {
        Self {
            kind,
            account: masked_account.into(),
            details: Vec::new(),
            next: Vec::new(),
            docs_url: None,
        }
    }

    pub fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }

    pub fn next_step(mut self, line: impl Into<String>) -> Self {
        self.next.push(line.into());
        self
    }

    pub fn docs(mut self, url: impl Into<String>) -> Self {
        self.docs_url = Some(url.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_ordering_is_total() {
        assert!(BanSeverity::None < BanSeverity::Warning);
        assert!(BanSeverity::Warning < BanSeverity::SoftBan);
        assert!(BanSeverity::SoftBan < BanSeverity::HardBan);
        assert_eq!(
            BanSeverity::Warning.max(BanSeverity::HardBan),
            BanSeverity::HardBan
        );
    }

    #[test]
    fn standby_kinds() {
        assert!(IncidentKind::RecoveryMismatch.engages_standby());
        assert!(IncidentKind::SignInBlocked.engages_standby());
        assert!(IncidentKind::AccountSuspended.engages_standby());
        assert!(IncidentKind::CompromisedDetected.engages_standby());
        assert!(!IncidentKind::ManualTwoFactor.engages_standby());
        assert!(!IncidentKind::BanWarning.engages_standby());
    }

    #[test]
    fn severity_serializes_kebab_case() {
        assert_eq!(serde_json::to_string(&BanSeverity::SoftBan).unwrap(), "\"soft-ban\"");
    }
}
