//! Page classification. After every action the machine re-observes the
//! page and asks this module where it ended up; first match wins and the
//! rule order is the contract.

use once_cell::sync::Lazy;
use regex::Regex;

use harvest_types::LoginState;

pub const REWARDS_HOST: &str = "rewards.bing.com";
pub const LOGIN_HOST: &str = "login.live.com";

/// Any of these visible means the rewards portal rendered for a signed-in
/// user.
pub const PORTAL_PRESENCE_SELECTORS: &[&str] = &[
    "mee-rewards-user-status-banner",
    "#rewards-dashboard",
    "[data-bi-id='rewards-user-status']",
];

pub const EMAIL_INPUT: &str = "input[type=email]";
pub const PASSWORD_INPUT: &str = "input[type=password]";
pub const OTP_INPUT: &str = "input[name=otc]";
pub const SUBMIT_BUTTON: &str = "#idSIButton9";
pub const KMSI_CHECKBOX: &str = "#kmsiCheckboxField";

static PASSKEY_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(passkey|windows hello|sign in faster|face, fingerprint|fingerprint, face|biometric)")
        .unwrap()
});

static BLOCKED_TITLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(can.t sign you in|account has been locked|account is locked|you've been blocked|sign-in is blocked|too many attempts)")
        .unwrap()
});

static OAUTH_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)/oauth20_(authorize|desktop)").unwrap());

/// What the machine could see on the page when it looked.
#[derive(Debug, Clone, Default)]
pub struct Observation {
    pub url: String,
    pub title: String,
    pub portal_present: bool,
    pub email_visible: bool,
    pub password_visible: bool,
    pub otp_visible: bool,
}

fn host_of(url: &str) -> &str {
    let rest = url.splitn(2, "//").nth(1).unwrap_or(url);
    rest.split(['/', '?', '#']).next().unwrap_or(rest)
}

/// Blocked-phrase label for incident reporting, when one matched.
pub fn blocked_phrase(title: &str) -> Option<String> {
    BLOCKED_TITLE.find(title).map(|m| m.as_str().to_lowercase())
}

pub fn is_passkey_title(title: &str) -> bool {
    PASSKEY_TITLE.is_match(title)
}

pub fn classify(obs: &Observation) -> LoginState {
    let host = host_of(&obs.url);

    // 1. Signed-in rewards portal.
    if host.ends_with(REWARDS_HOST) && obs.portal_present {
        return LoginState::LoggedIn;
    }

    // 2. Login portal prompts.
    if host.ends_with(LOGIN_HOST) {
        if obs.email_visible {
            return LoginState::EmailPage;
        }
        if obs.password_visible {
            return LoginState::PasswordPage;
        }
        if obs.otp_visible {
            return LoginState::TwoFactorRequired;
        }
        if PASSKEY_TITLE.is_match(&obs.title) {
            return LoginState::PasskeyPrompt;
        }
        if BLOCKED_TITLE.is_match(&obs.title) {
            return LoginState::Blocked;
        }
    }

    // 3. OAuth hop in the mobile token flow.
    if OAUTH_URL.is_match(&obs.url) {
        return LoginState::EmailSubmitted;
    }

    LoginState::Unknown
}
