use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::account::Account;

/// Which device class a browser session impersonates. Switching persona
/// always implies a fresh browser context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    Desktop,
    Mobile,
}

impl Persona {
    pub fn as_str(&self) -> &'static str {
        match self {
            Persona::Desktop => "desktop",
            Persona::Mobile => "mobile",
        }
    }
}

impl fmt::Display for Persona {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable, deterministic identifier for the smallest resumable piece of
/// daily work. The job-state store keys completion records by these.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkUnitId(String);

impl WorkUnitId {
    pub fn search(persona: Persona) -> Self {
        WorkUnitId(format!("search:{}", persona))
    }

    pub fn activity(offer_id: &str) -> Self {
        WorkUnitId(offer_id.to_string())
    }

    pub fn daily_checkin() -> Self {
        WorkUnitId("daily_checkin".to_string())
    }

    pub fn read_to_earn(article_index: usize) -> Self {
        WorkUnitId(format!("r2e:{}", article_index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkUnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Login progress as observed from the page. Initial state is `Unknown`;
/// `LoggedIn`, `Blocked` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoginState {
    Unknown,
    InitialLoad,
    EmailPage,
    EmailSubmitted,
    PasswordPage,
    PasswordSubmitted,
    TwoFactorRequired,
    TwoFactorSubmitted,
    PasskeyPrompt,
    RecoveryCheck,
    LoggedIn,
    Blocked,
    Error,
}

impl LoginState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LoginState::LoggedIn | LoginState::Blocked | LoginState::Error)
    }
}

/// Ephemeral context for one flow (one persona pass over one account).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub account: Account,
    pub persona: Persona,
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub date: NaiveDate,
}

impl RunContext {
    pub fn new(account: Account, persona: Persona, run_id: String) -> Self {
        let started_at = Utc::now();
        let date = chrono::Local::now().date_naive();
        Self { account, persona, run_id, started_at, date }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn work_unit_ids_are_stable() {
        assert_eq!(WorkUnitId::search(Persona::Desktop).as_str(), "search:desktop");
        assert_eq!(WorkUnitId::search(Persona::Mobile).as_str(), "search:mobile");
        assert_eq!(WorkUnitId::daily_checkin().as_str(), "daily_checkin");
        assert_eq!(WorkUnitId::read_to_earn(3).as_str(), "r2e:3");
        assert_eq!(WorkUnitId::activity("offer-9").as_str(), "offer-9");
    }

    #[test]
    fn terminal_states() {
        assert!(LoginState::LoggedIn.is_terminal());
        assert!(LoginState::Blocked.is_terminal());
        assert!(LoginState::Error.is_terminal());
        assert!(!LoginState::PasswordPage.is_terminal());
    }
}
