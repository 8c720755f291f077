//! Passkey / Windows Hello prompt dismissal. The prompts vary by rollout
//! ring, so dismissal is a ladder of increasingly blunt attempts, and the
//! whole thing fails open: an unmatched prompt is logged and the machine
//! keeps observing rather than wedging the login.

use once_cell::sync::Lazy;
use regex::Regex;
use tokio::time::{sleep, Duration};
use tracing::{debug, info};

use harvest_browser::Page;

use crate::classify::is_passkey_title;
use crate::error::Result;

const SECONDARY_BUTTON: &str = "[data-testid=secondaryButton]";
const BIOMETRIC_VIDEO: &str = "video[aria-label*=biometric], #biometricVideo";
const QR_DIALOG: &str = "div[role=dialog]";

const TEXT_MATCH_SELECTORS: &[&str] = &[
    "//button[contains(., 'Skip for now')]",
    "//button[contains(., 'Not now')]",
    "//button[contains(., 'Other ways to sign in')]",
];

const HELLO_SELECTORS: &[&str] = &["#idBtn_Back", "#iCancel"];
const CLOSE_SELECTORS: &[&str] = &["button[aria-label=Close]", ".dialog-close"];

const MAX_POLLS: usize = 5;
const POLL_GAP: Duration = Duration::from_millis(400);

static SKIP_TEXT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(skip|not now|later|cancel|no thanks|other ways)").unwrap()
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    Dismissed(&'static str),
    NoPrompt,
}

impl Dismissal {
    pub fn reason(&self) -> &'static str {
        match self {
            Dismissal::Dismissed(reason) => reason,
            Dismissal::NoPrompt => "no-prompt",
        }
    }
}

/// Run the dismissal ladder. Each rung is attempted once per poll
/// iteration, in order; the first successful click wins.
pub async fn dismiss(page: &dyn Page) -> Result<Dismissal> {
    for attempt in 0..MAX_POLLS {
        // 1. Secondary button whose label reads like a skip.
        if page.is_visible(SECONDARY_BUTTON).await? {
            let label = page.inner_text(SECONDARY_BUTTON).await?.unwrap_or_default();
            if SKIP_TEXT.is_match(&label) {
                page.click(SECONDARY_BUTTON).await?;
                info!(label = %label.trim(), "passkey prompt dismissed");
                return Ok(Dismissal::Dismissed("secondary button text"));
            }
        }

        // 2. Biometric video playing → the secondary button is the out.
        if page.is_visible(BIOMETRIC_VIDEO).await? && page.is_visible(SECONDARY_BUTTON).await? {
            page.click(SECONDARY_BUTTON).await?;
            return Ok(Dismissal::Dismissed("biometric video heuristic"));
        }

        // 3. Passkey-looking title → secondary button even without a label.
        if is_passkey_title(&page.title().await?) && page.is_visible(SECONDARY_BUTTON).await? {
            page.click(SECONDARY_BUTTON).await?;
            return Ok(Dismissal::Dismissed("title heuristic"));
        }

        // 4. Text-matched buttons.
        for selector in TEXT_MATCH_SELECTORS {
            if page.is_visible(selector).await? {
                page.click(selector).await?;
                return Ok(Dismissal::Dismissed("button text match"));
            }
        }

        // 5. Windows-Hello-specific controls.
        for selector in HELLO_SELECTORS {
            if page.is_visible(selector).await? {
                page.click(selector).await?;
                return Ok(Dismissal::Dismissed("windows hello selector"));
            }
        }

        // 6. A plain close button.
        for selector in CLOSE_SELECTORS {
            if page.is_visible(selector).await? {
                page.click(selector).await?;
                return Ok(Dismissal::Dismissed("close button"));
            }
        }

        debug!(attempt, "no dismissable passkey control yet");
        sleep(POLL_GAP).await;
    }

    info!("no-prompt");
    Ok(Dismissal::NoPrompt)
}

/// QR-code passkey dialog: Escape first, then back/cancel buttons, then
/// DOM-level removal of the dialog node.
pub async fn dismiss_qr_dialog(page: &dyn Page) -> Result<Dismissal> {
    if !page.is_visible(QR_DIALOG).await? {
        return Ok(Dismissal::NoPrompt);
    }

    page.press_key("Escape").await?;
    sleep(Duration::from_millis(300)).await;
    if !page.is_visible(QR_DIALOG).await? {
        return Ok(Dismissal::Dismissed("escape key"));
    }

    for selector in HELLO_SELECTORS {
        if page.is_visible(selector).await? {
            page.click(selector).await?;
            sleep(Duration::from_millis(300)).await;
            if !page.is_visible(QR_DIALOG).await? {
                return Ok(Dismissal::Dismissed("back button"));
            }
        }
    }

    if page.remove_element(QR_DIALOG).await? {
        return Ok(Dismissal::Dismissed("dom removal"));
    }
    Ok(Dismissal::NoPrompt)
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_browser::scripted::{PageStateBuilder, ScriptedDriver};
    use harvest_browser::{BrowserDriver, ContextSpec, Fingerprint};
    use harvest_rand::SecureRng;
    use harvest_types::Persona;
    use std::sync::Arc;

    async fn page_for(states: Vec<harvest_browser::scripted::PageState>) -> Arc<dyn Page> {
        let driver = ScriptedDriver::with_pages(states);
        let ctx = driver
            .launch(ContextSpec {
                profile_dir: "/tmp/p".into(),
                fingerprint: Fingerprint::generate(
                    Persona::Desktop,
                    126,
                    "UTC",
                    "en-US",
                    &SecureRng::new(),
                ),
                proxy: None,
            })
            .await
            .unwrap();
        ctx.new_page().await.unwrap()
    }

    #[tokio::test]
    async fn secondary_button_with_skip_label_wins() {
        let states = vec![PageStateBuilder::new("https://login.live.com/x")
            .title("Sign in faster with a passkey")
            .visible(SECONDARY_BUTTON)
            .inner_text(SECONDARY_BUTTON, "Skip for now")
            .build()];
        let page = page_for(states).await;
        let outcome = dismiss(page.as_ref()).await.unwrap();
        assert_eq!(outcome, Dismissal::Dismissed("secondary button text"));
    }

    #[tokio::test]
    async fn title_heuristic_when_label_is_odd() {
        let states = vec![PageStateBuilder::new("https://login.live.com/x")
            .title("Use Windows Hello to sign in")
            .visible(SECONDARY_BUTTON)
            .inner_text(SECONDARY_BUTTON, "→")
            .build()];
        let page = page_for(states).await;
        let outcome = dismiss(page.as_ref()).await.unwrap();
        assert_eq!(outcome, Dismissal::Dismissed("title heuristic"));
    }

    #[tokio::test]
    async fn fails_open_when_nothing_matches() {
        let states =
            vec![PageStateBuilder::new("https://login.live.com/x").title("Loading").build()];
        let page = page_for(states).await;
        let outcome = dismiss(page.as_ref()).await.unwrap();
        assert_eq!(outcome, Dismissal::NoPrompt);
        assert_eq!(outcome.reason(), "no-prompt");
    }

    #[tokio::test]
    async fn qr_dialog_falls_back_to_dom_removal() {
        // Dialog survives Escape and has no back button; removal works.
        let states = vec![PageStateBuilder::new("https://login.live.com/x")
            .visible(QR_DIALOG)
            .on(format!("remove:{QR_DIALOG}"), 1)
            .build(),
            PageStateBuilder::new("https://login.live.com/x").build()];
        let page = page_for(states).await;
        let outcome = dismiss_qr_dialog(page.as_ref()).await.unwrap();
        assert_eq!(outcome, Dismissal::Dismissed("dom removal"));
    }

    #[tokio::test]
    async fn qr_dialog_prefers_escape() {
        let states = vec![
            PageStateBuilder::new("https://login.live.com/x")
                .visible(QR_DIALOG)
                .on("press:Escape", 1)
                .build(),
            PageStateBuilder::new("https://login.live.com/x").build(),
        ];
        let page = page_for(states).await;
        let outcome = dismiss_qr_dialog(page.as_ref()).await.unwrap();
        assert_eq!(outcome, Dismissal::Dismissed("escape key"));
    }
}
