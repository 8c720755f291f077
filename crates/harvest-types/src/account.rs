use serde::{Deserialize, Serialize};

/// One configured rewards account. Loaded from the accounts file and owned
/// by the orchestrator for the duration of a run; only the config loader
/// and the account disabler ever mutate it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<Proxy>,
    #[serde(default, rename = "recoveryEmail", skip_serializing_if = "Option::is_none")]
    pub recovery_email: Option<String>,
    #[serde(default, rename = "phoneNumber", skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl Account {
    /// `ab***@domain.tld` form used anywhere an email leaves the process.
    pub fn masked_email(&self) -> String {
        mask_email(&self.email)
    }
}

pub fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let visible: String = local.chars().take(2).collect();
            format!("{}***@{}", visible, domain)
        }
        None => "***".to_string(),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    pub scheme: String,
    pub host: String,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl Proxy {
    /// Full proxy URL including credentials, for handing to the driver.
    pub fn url(&self) -> String {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => {
                format!("{}://{}:{}@{}:{}", self.scheme, user, pass, self.host, self.port)
            }
            _ => format!("{}://{}:{}", self.scheme, self.host, self.port),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masks_email_to_two_chars() {
        let acct = Account {
            email: "alice@example.com".into(),
            password: "pw".into(),
            totp: None,
            proxy: None,
            recovery_email: None,
            phone_number: None,
            enabled: true,
        };
        assert_eq!(acct.masked_email(), "al***@example.com");
    }

    #[test]
    fn masks_malformed_email() {
        assert_eq!(mask_email("not-an-email"), "***");
    }

    #[test]
    fn proxy_url_includes_credentials() {
        let proxy = Proxy {
            scheme: "http".into(),
            host: "10.0.0.1".into(),
            port: 8080,
            username: Some("u".into()),
            password: Some("p".into()),
        };
        assert_eq!(proxy.url(), "http://u:p@10.0.0.1:8080");
    }
}
