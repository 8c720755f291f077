//! Labelled signal patterns. Labels travel into verdicts, incidents and
//! the ban comment written to the accounts file, so they are short and
//! stable.

use once_cell::sync::Lazy;
use regex::Regex;

use harvest_types::BanSeverity;

pub struct TextPattern {
    pub label: &'static str,
    pub severity: BanSeverity,
    pub regex: &'static Lazy<Regex>,
}

macro_rules! pattern {
    ($name:ident, $re:expr) => {
        pub static $name: Lazy<Regex> = Lazy::new(|| Regex::new($re).unwrap());
    };
}

pattern!(URL_SUSPENDED, r"(?i)suspended");
pattern!(URL_BLOCKED, r"(?i)blocked");
pattern!(URL_ERROR_UNUSUAL, r"(?i)error.*unusual");
pattern!(URL_SECURITY_VERIFY, r"(?i)security.*verify");
pattern!(URL_ACCOUNT_ISSUE, r"(?i)account.*issue");

pattern!(TEXT_ORDER_BLOCKED, r"(?i)(your )?order (has been|was) blocked");
pattern!(TEXT_ACCOUNT_SUSPENDED, r"(?i)account (has been|is) suspended");
pattern!(TEXT_ACCESS_DENIED, r"(?i)access denied");
pattern!(TEXT_UNUSUAL_ACTIVITY, r"(?i)unusual activity");
pattern!(TEXT_VERIFICATION_REQUIRED, r"(?i)verif(y|ication) (is )?required");
pattern!(TEXT_SECURITY_CHALLENGE, r"(?i)security challenge");
pattern!(TEXT_RATE_LIMITED, r"(?i)(rate.?limit|too many requests)");
pattern!(TEXT_CAPTCHA, r"(?i)(captcha|prove you.?re? (not a robot|human))");
pattern!(TEXT_SESSION_EXPIRED, r"(?i)session (has )?expired");

pub static URL_PATTERNS: &[(&str, &Lazy<Regex>)] = &[
    ("url-suspended", &URL_SUSPENDED),
    ("url-blocked", &URL_BLOCKED),
    ("url-error-unusual", &URL_ERROR_UNUSUAL),
    ("url-security-verify", &URL_SECURITY_VERIFY),
    ("url-account-issue", &URL_ACCOUNT_ISSUE),
];

pub static TEXT_PATTERNS: &[TextPattern] = &[
    TextPattern { label: "order-blocked", severity: BanSeverity::HardBan, regex: &TEXT_ORDER_BLOCKED },
    TextPattern { label: "account-suspended", severity: BanSeverity::HardBan, regex: &TEXT_ACCOUNT_SUSPENDED },
    TextPattern { label: "access-denied", severity: BanSeverity::HardBan, regex: &TEXT_ACCESS_DENIED },
    TextPattern { label: "unusual-activity", severity: BanSeverity::SoftBan, regex: &TEXT_UNUSUAL_ACTIVITY },
    TextPattern { label: "verification-required", severity: BanSeverity::Warning, regex: &TEXT_VERIFICATION_REQUIRED },
    TextPattern { label: "security-challenge", severity: BanSeverity::Warning, regex: &TEXT_SECURITY_CHALLENGE },
    TextPattern { label: "rate-limited", severity: BanSeverity::Warning, regex: &TEXT_RATE_LIMITED },
    TextPattern { label: "captcha-required", severity: BanSeverity::Warning, regex: &TEXT_CAPTCHA },
    TextPattern { label: "session-expired", severity: BanSeverity::Warning, regex: &TEXT_SESSION_EXPIRED },
];

/// Console lines worth flagging; same phrases sites log before they act.
pub static CONSOLE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(suspended|blocked|unusual.activity|access.denied)").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_patterns_match_expected_shapes() {
        assert!(URL_SUSPENDED.is_match("https://x/Account/Suspended"));
        assert!(URL_ERROR_UNUSUAL.is_match("https://x/error?code=unusual_traffic"));
        assert!(URL_SECURITY_VERIFY.is_match("https://x/security/challenge/verify"));
        assert!(!URL_ACCOUNT_ISSUE.is_match("https://x/rewards/dashboard"));
    }

    #[test]
    fn hard_ban_phrases() {
        assert!(TEXT_ORDER_BLOCKED.is_match("Your order has been blocked."));
        assert!(TEXT_ACCOUNT_SUSPENDED.is_match("This account has been suspended"));
        assert!(TEXT_ACCESS_DENIED.is_match("Access Denied"));
    }

    #[test]
    fn warning_phrases() {
        assert!(TEXT_RATE_LIMITED.is_match("Too many requests, slow down"));
        assert!(TEXT_CAPTCHA.is_match("please solve this CAPTCHA"));
        assert!(TEXT_CAPTCHA.is_match("prove you're not a robot"));
        assert!(TEXT_SESSION_EXPIRED.is_match("Your session has expired"));
    }
}
