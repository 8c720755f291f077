//! The login driver: observe, classify, act, repeat, until a terminal
//! state or the transition bound. No fixed long sleeps anywhere; every
//! wait is a smart wait on a condition.

use once_cell::sync::Lazy;
use regex::Regex;
use std::time::Duration;
use tracing::{debug, info, warn};

use harvest_browser::{smart_wait, Page};
use harvest_rand::SecureRng;
use harvest_types::{Account, IncidentKind, LoginState, SecurityIncident};

use crate::classify::{
    self, classify, Observation, EMAIL_INPUT, KMSI_CHECKBOX, OTP_INPUT, PASSWORD_INPUT,
    PORTAL_PRESENCE_SELECTORS, SUBMIT_BUTTON,
};
use crate::error::{LoginError, Result};
use crate::passkey;
use crate::recovery::{self, RecoveryCheck};
use crate::totp;

/// Property: the machine reaches a terminal state within this many
/// transitions or fails with a fatal error.
pub const MAX_TRANSITIONS: u32 = 25;

const EMAIL_KEYSTROKE_MS: f64 = 90.0;

static COMPROMISED_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(account (has been|was) compromised|someone else (might be|is) using|unusual sign.?in activity)")
        .unwrap()
});

#[derive(Debug)]
pub struct LoginReport {
    pub state: LoginState,
    pub transitions: u32,
    pub incidents: Vec<SecurityIncident>,
}

impl LoginReport {
    pub fn compromised(&self) -> bool {
        self.incidents.iter().any(|i| i.kind == IncidentKind::CompromisedDetected)
    }
}

pub struct LoginMachine<'a> {
    account: &'a Account,
    rng: SecureRng,
    wait_initial: Duration,
    wait_extended: Duration,
}

impl<'a> LoginMachine<'a> {
    pub fn new(account: &'a Account) -> Self {
        Self {
            account,
            rng: SecureRng::new(),
            wait_initial: Duration::from_millis(1200),
            wait_extended: Duration::from_secs(4),
        }
    }

    /// Override the smart-wait windows (tests shrink them).
    pub fn with_waits(mut self, initial: Duration, extended: Duration) -> Self {
        self.wait_initial = initial;
        self.wait_extended = extended;
        self
    }

    /// Drive the page to `LoggedIn` or fail with a typed error. The
    /// caller owns context rebuild on target-closed.
    pub async fn run(&self, page: &dyn Page) -> Result<LoginReport> {
        let mut incidents: Vec<SecurityIncident> = Vec::new();

        for transition in 1..=MAX_TRANSITIONS {
            let obs = self.observe(page).await?;
            let state = classify(&obs);
            debug!(%transition, ?state, url = %obs.url, "login observation");

            match state {
                LoginState::LoggedIn => {
                    info!(transitions = transition, "login complete");
                    return Ok(LoginReport { state, transitions: transition, incidents });
                }
                LoginState::EmailPage => self.submit_email(page).await?,
                LoginState::PasswordPage => self.submit_password(page).await?,
                LoginState::TwoFactorRequired => self.submit_totp(page).await?,
                LoginState::PasskeyPrompt => {
                    let outcome = passkey::dismiss(page).await?;
                    debug!(reason = outcome.reason(), "passkey dismissal");
                    passkey::dismiss_qr_dialog(page).await?;
                }
                LoginState::Blocked => {
                    let phrase = classify::blocked_phrase(&obs.title)
                        .unwrap_or_else(|| "sign-in blocked".to_string());
                    let incident =
                        SecurityIncident::new(IncidentKind::SignInBlocked, self.account.masked_email())
                            .detail(format!("login page title matched: {phrase}"))
                            .next_step("sign in by hand to clear the block");
                    warn!(%phrase, "sign-in blocked");
                    return Err(LoginError::Security(Box::new(incident)));
                }
                LoginState::EmailSubmitted => {
                    // OAuth hop in the token flow; let the redirect land.
                    smart_wait(page, SUBMIT_BUTTON, self.wait_initial, self.wait_extended)
                        .await?;
                }
                _ => {
                    if let Some(incident) = self.scan_interstitial(page, &mut incidents).await? {
                        return Err(LoginError::Security(Box::new(incident)));
                    }
                }
            }
        }

        Err(LoginError::Fatal(format!(
            "no terminal login state within {MAX_TRANSITIONS} transitions"
        )))
    }

    async fn observe(&self, page: &dyn Page) -> Result<Observation> {
        let mut portal_present = false;
        for selector in PORTAL_PRESENCE_SELECTORS {
            if page.is_visible(selector).await? {
                portal_present = true;
                break;
            }
        }
        Ok(Observation {
            url: page.current_url().await?,
            title: page.title().await?,
            portal_present,
            email_visible: page.is_visible(EMAIL_INPUT).await?,
            password_visible: page.is_visible(PASSWORD_INPUT).await?,
            otp_visible: page.is_visible(OTP_INPUT).await?,
        })
    }

    async fn submit_email(&self, page: &dyn Page) -> Result<()> {
        let delays = self.keystroke_delays(&self.account.email, EMAIL_KEYSTROKE_MS);
        page.type_text(EMAIL_INPUT, &self.account.email, &delays).await?;
        self.submit(page).await
    }

    async fn submit_password(&self, page: &dyn Page) -> Result<()> {
        // Familiar muscle memory: passwords go in about twice as fast.
        let delays = self.keystroke_delays(&self.account.password, EMAIL_KEYSTROKE_MS / 2.0);
        page.type_text(PASSWORD_INPUT, &self.account.password, &delays).await?;
        self.submit(page).await
    }

    async fn submit_totp(&self, page: &dyn Page) -> Result<()> {
        let Some(seed) = self.account.totp.as_deref() else {
            warn!("two-factor required but no totp seed configured");
            return Err(LoginError::Fatal("manual-2fa".to_string()));
        };
        let code = totp::current_code(seed)?;
        // Codes are read off another screen and copied fast.
        let delays = self.keystroke_delays(&code, EMAIL_KEYSTROKE_MS / 3.0);
        page.type_text(OTP_INPUT, &code, &delays).await?;
        self.submit(page).await
    }

    async fn submit(&self, page: &dyn Page) -> Result<()> {
        if page.is_visible(SUBMIT_BUTTON).await? {
            page.click(SUBMIT_BUTTON).await?;
        } else {
            page.press_key("Enter").await?;
        }
        Ok(())
    }

    /// Unknown state: handle KMSI, scan for compromise phrases and masked
    /// recovery addresses, otherwise wait for the portal to render.
    async fn scan_interstitial(
        &self,
        page: &dyn Page,
        incidents: &mut Vec<SecurityIncident>,
    ) -> Result<Option<SecurityIncident>> {
        if page.is_visible(KMSI_CHECKBOX).await? && page.is_visible(SUBMIT_BUTTON).await? {
            debug!("keep-me-signed-in prompt, accepting");
            page.click(SUBMIT_BUTTON).await?;
            return Ok(None);
        }

        let text = page.text().await?;
        if COMPROMISED_TEXT.is_match(&text) {
            let incident = SecurityIncident::new(
                IncidentKind::CompromisedDetected,
                self.account.masked_email(),
            )
            .detail("login flow shows a compromise interstitial")
            .next_step("review account security before any further automation");
            incidents.push(incident.clone());
            return Ok(Some(incident));
        }

        match recovery::check(page, self.account).await? {
            RecoveryCheck::Mismatch(incident) => return Ok(Some(*incident)),
            RecoveryCheck::Match { .. } | RecoveryCheck::NothingVisible => {}
        }

        smart_wait(
            page,
            PORTAL_PRESENCE_SELECTORS[0],
            self.wait_initial,
            self.wait_extended,
        )
        .await?;
        Ok(None)
    }

    fn keystroke_delays(&self, text: &str, base_ms: f64) -> Vec<Duration> {
        text.chars().map(|_| self.rng.typing_delay(base_ms)).collect()
    }
}
