//! Recovery-email consistency check. A login page showing a masked
//! recovery address the operator does not recognise is the strongest
//! early signal of a hijacked account, so a mismatch is critical and
//! halts everything. Text read from the page is compared in memory only
//! and never persisted.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info, warn};

use harvest_browser::Page;
use harvest_types::{Account, IncidentKind, SecurityIncident};

use crate::error::Result;

/// Selectors that are known to carry the masked proof address.
const PROOF_SELECTORS: &[&str] = &[
    "#iProofEmail",
    "[data-testid=proofEmail]",
    ".table-row .text-block-body",
    "#idDiv_SAOTCS_Proofs .text-caption",
];

static MASKED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([A-Za-z0-9]{1,2})\*+@([A-Za-z0-9][A-Za-z0-9.-]*\.[A-Za-z]{2,})").unwrap()
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryCheck {
    /// Page shows no masked address; nothing to compare.
    NothingVisible,
    /// Masked address agrees with a configured address.
    Match { mode: MatchMode },
    /// Masked address agrees with neither the recovery email nor the
    /// account email. Critical.
    Mismatch(Box<SecurityIncident>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Two visible characters, both compared.
    Strict,
    /// One visible character; only the first character is compared.
    Lenient,
}

/// Extract masked candidates from the canonical selectors, falling back
/// to a full-document scan, and compare against the account.
pub async fn check(page: &dyn Page, account: &Account) -> Result<RecoveryCheck> {
    let mut candidates: Vec<String> = Vec::new();

    for selector in PROOF_SELECTORS {
        if let Some(text) = page.inner_text(selector).await? {
            candidates.push(text);
        }
    }
    if candidates.is_empty() {
        candidates.push(page.text().await?);
    }

    for text in &candidates {
        if let Some(caps) = MASKED_RE.captures(text) {
            let prefix = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            let domain = caps.get(2).map(|m| m.as_str()).unwrap_or_default();
            return Ok(compare(prefix, domain, account));
        }
    }
    Ok(RecoveryCheck::NothingVisible)
}

fn compare(visible_prefix: &str, domain: &str, account: &Account) -> RecoveryCheck {
    let mode = if visible_prefix.len() >= 2 { MatchMode::Strict } else { MatchMode::Lenient };

    let known: Vec<&str> = account
        .recovery_email
        .as_deref()
        .into_iter()
        .chain(std::iter::once(account.email.as_str()))
        .collect();

    for address in &known {
        if matches(visible_prefix, domain, address, mode) {
            match mode {
                MatchMode::Strict => info!(mode = "strict", "recovery address matched"),
                MatchMode::Lenient => {
                    info!(mode = "lenient", "recovery address matched on first character only")
                }
            }
            return RecoveryCheck::Match { mode };
        }
    }

    warn!(
        masked = format!("{visible_prefix}***@{domain}"),
        "recovery address on page matches no configured address"
    );
    let incident = SecurityIncident::new(IncidentKind::RecoveryMismatch, account.masked_email())
        .detail(format!("page shows recovery address {visible_prefix}***@{domain}"))
        .detail("configured recovery address does not agree".to_string())
        .next_step("verify account ownership and recovery settings by hand")
        .next_step("automation stays in standby until restart")
        .docs("https://github.com/harvest-rs/harvest/wiki/recovery-mismatch");
    RecoveryCheck::Mismatch(Box::new(incident))
}

fn matches(visible_prefix: &str, domain: &str, address: &str, mode: MatchMode) -> bool {
    let Some((local, addr_domain)) = address.split_once('@') else {
        return false;
    };
    if !addr_domain.eq_ignore_ascii_case(domain) {
        return false;
    }
    let local = local.to_lowercase();
    let prefix = visible_prefix.to_lowercase();
    match mode {
        MatchMode::Strict => local.starts_with(&prefix),
        MatchMode::Lenient => {
            debug!("single visible character, comparing first character only");
            local.chars().next() == prefix.chars().next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(recovery: Option<&str>) -> Account {
        Account {
            email: "primary@main.tld".into(),
            password: "pw".into(),
            totp: None,
            proxy: None,
            recovery_email: recovery.map(|s| s.to_string()),
            phone_number: None,
            enabled: true,
        }
    }

    #[test]
    fn strict_match_on_two_chars() {
        let result = compare("bo", "domain.tld", &account(Some("bob@domain.tld")));
        assert_eq!(result, RecoveryCheck::Match { mode: MatchMode::Strict });
    }

    #[test]
    fn strict_mismatch_on_wrong_prefix() {
        let result = compare("ka", "domain.tld", &account(Some("bob@domain.tld")));
        assert!(matches!(result, RecoveryCheck::Mismatch(_)));
    }

    #[test]
    fn lenient_match_on_one_char() {
        let result = compare("b", "domain.tld", &account(Some("bob@domain.tld")));
        assert_eq!(result, RecoveryCheck::Match { mode: MatchMode::Lenient });
    }

    #[test]
    fn domain_must_match_exactly() {
        let result = compare("bo", "other.tld", &account(Some("bob@domain.tld")));
        assert!(matches!(result, RecoveryCheck::Mismatch(_)));
    }

    #[test]
    fn primary_email_also_counts() {
        let result = compare("pr", "main.tld", &account(None));
        assert_eq!(result, RecoveryCheck::Match { mode: MatchMode::Strict });
    }

    #[test]
    fn mismatch_incident_is_critical_kind() {
        let RecoveryCheck::Mismatch(incident) =
            compare("k", "domain.tld", &account(Some("bob@domain.tld")))
        else {
            panic!("expected mismatch");
        };
        assert_eq!(incident.kind, IncidentKind::RecoveryMismatch);
        assert!(incident.kind.engages_standby());
        assert!(incident.docs_url.is_some());
    }

    #[test]
    fn masked_regex_extracts_prefix_and_domain() {
        let caps = MASKED_RE.captures("We'll send a code to k******@domain.tld.").unwrap();
        assert_eq!(&caps[1], "k");
        assert_eq!(&caps[2], "domain.tld");

        let caps = MASKED_RE.captures("proof: bo****@mail.example.org").unwrap();
        assert_eq!(&caps[1], "bo");
        assert_eq!(&caps[2], "mail.example.org");
    }
}
