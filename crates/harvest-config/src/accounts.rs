use serde::Deserialize;
use std::path::Path;
use tracing::{debug, warn};

use harvest_types::Account;

use crate::error::{ConfigError, Result};
use crate::jsonc;

/// Account files come in two shapes: a bare array, or `{"accounts": [...]}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum AccountsFile {
    Wrapped { accounts: Vec<Account> },
    Bare(Vec<Account>),
}

/// Load the account list, tolerant of comments and trailing commas.
/// Disabled accounts are kept in the returned list; callers filter on
/// `enabled` so the dashboard can still show them.
pub fn load_accounts(path: &Path) -> Result<Vec<Account>> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let parsed: AccountsFile = jsonc::parse(&text)?;
    let accounts = match parsed {
        AccountsFile::Wrapped { accounts } => accounts,
        AccountsFile::Bare(accounts) => accounts,
    };

    for account in &accounts {
        if account.email.is_empty() {
            return Err(ConfigError::MissingField("email".into()));
        }
        if account.password.is_empty() {
            return Err(ConfigError::MissingField(format!(
                "password for {}",
                account.masked_email()
            )));
        }
        if !account.enabled {
            warn!(account = %account.masked_email(), "account is disabled, skipping this run");
        }
    }
    debug!(count = accounts.len(), "accounts loaded");
    Ok(accounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_bare_array() {
        let f = write_temp(r#"[{"email": "a@x", "password": "p"}]"#);
        let accounts = load_accounts(f.path()).unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(accounts[0].enabled);
    }

    #[test]
    fn loads_wrapped_object_with_comments() {
        let f = write_temp(
            r#"{
                // main account
                "accounts": [
                    {"email": "a@x", "password": "p", "recoveryEmail": "r@y",},
                ]
            }"#,
        );
        let accounts = load_accounts(f.path()).unwrap();
        assert_eq!(accounts[0].recovery_email.as_deref(), Some("r@y"));
    }

    #[test]
    fn missing_password_is_an_error() {
        let f = write_temp(r#"[{"email": "a@x", "password": ""}]"#);
        assert!(load_accounts(f.path()).is_err());
    }
}
