//! Zero-cost reward redemption. Gated on the account having a phone
//! number (checkout requires one on file). Success detection is lenient:
//! when no explicit confirmation can be found, the redemption is counted
//! with a warning so the operator can review the order history.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use harvest_browser::{smart_wait_default, Page, SessionGuard};
use harvest_rand::{MousePathOpts, Point};
use harvest_types::Account;

use crate::error::Result;
use crate::ActivityCtx;

const CATALOG_URL: &str = "https://rewards.bing.com/redeem";
const REDEEM_BUTTON: &str = "#redeem-pdp-btn";
const CONFIRM_BUTTON: &str = "#redeem-checkout-confirm";
const TURNSTILE_FRAME: &str = "iframe[src*='challenges.cloudflare.com']";
const SUCCESS_ELEMENT: &str = ".redeem-order-success";
const TURNSTILE_TIMEOUT: Duration = Duration::from_secs(60);

/// Anchor cards whose price element reads exactly "0 points", class-based
/// so it survives locale changes.
const ZERO_PRICE_SCRIPT: &str = r#"(() =>
  Array.from(document.querySelectorAll("a[href*='/redeem/']"))
    .filter(card => {
      const price = card.querySelector("[class*='price']");
      return price && /^\s*0\s*points?\s*$/i.test(price.textContent || '');
    })
    .map(card => card.href)
)()"#;

#[derive(Debug, Clone)]
pub struct RedeemOutcome {
    pub url: String,
    pub redeemed: bool,
    pub verified: bool,
}

/// Enumerate and redeem every free reward visible in the catalog.
pub async fn run(
    ctx: &ActivityCtx<'_>,
    session: &SessionGuard,
    account: &Account,
) -> Result<Vec<RedeemOutcome>> {
    if account.phone_number.is_none() {
        debug!("no phone number on file, skipping free rewards");
        return Ok(Vec::new());
    }

    let catalog = session.new_page().await?;
    let result = enumerate_and_redeem(ctx, session, catalog.as_ref()).await;
    let _ = catalog.close().await;
    result
}

async fn enumerate_and_redeem(
    ctx: &ActivityCtx<'_>,
    session: &SessionGuard,
    catalog: &dyn Page,
) -> Result<Vec<RedeemOutcome>> {
    catalog.goto(CATALOG_URL).await?;
    let value = catalog.evaluate(ZERO_PRICE_SCRIPT).await?;
    let urls: Vec<String> = serde_json::from_value(value).unwrap_or_default();
    info!(count = urls.len(), "zero-cost rewards found");

    let mut outcomes = Vec::with_capacity(urls.len());
    for url in urls {
        let page = session.new_page().await?;
        let outcome = redeem_one(ctx, page.as_ref(), &url).await;
        let _ = page.close().await;
        outcomes.push(outcome?);
    }
    Ok(outcomes)
}

async fn redeem_one(ctx: &ActivityCtx<'_>, page: &dyn Page, url: &str) -> Result<RedeemOutcome> {
    page.goto(url).await?;

    if !smart_wait_default(page, REDEEM_BUTTON).await? {
        warn!(%url, "no redeem control on detail page");
        return Ok(RedeemOutcome { url: url.to_string(), redeemed: false, verified: false });
    }
    page.click(REDEEM_BUTTON).await?;

    wait_out_turnstile(ctx, page).await?;

    if smart_wait_default(page, CONFIRM_BUTTON).await? {
        page.click(CONFIRM_BUTTON).await?;
    }
    tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;

    let landing = page.current_url().await?.to_lowercase();
    let verified = landing.contains("orderconfirmation")
        || landing.contains("success")
        || landing.contains("confirmed")
        || page.is_visible(SUCCESS_ELEMENT).await?;

    if verified {
        info!(%url, "free reward redeemed");
    } else {
        // No explicit failure either; count it but flag for review.
        warn!(%url, outcome = "unverified", "no success indicator after checkout");
    }
    Ok(RedeemOutcome { url: url.to_string(), redeemed: true, verified })
}

/// A Turnstile widget may gate the checkout. Wait for it to clear itself
/// (it runs its own checks), staying busy the way a person would.
async fn wait_out_turnstile(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<()> {
    if !page.is_visible(TURNSTILE_FRAME).await? {
        return Ok(());
    }
    debug!("turnstile widget present, waiting it out");
    let deadline = Instant::now() + TURNSTILE_TIMEOUT;
    let mut cursor = Point::new(400.0, 300.0);

    while Instant::now() < deadline {
        if !page.is_visible(TURNSTILE_FRAME).await? {
            return Ok(());
        }
        // Idle-looking input: a drift of the pointer, an occasional scroll.
        let target = Point::new(ctx.rng.float_in(200.0, 900.0), ctx.rng.float_in(150.0, 600.0));
        for step in ctx.rng.mouse_path(cursor, target, MousePathOpts::default()) {
            page.mouse_move(step.point.x, step.point.y).await?;
            tokio::time::sleep(Duration::from_millis(step.duration_ms.min(25))).await;
        }
        cursor = target;
        if ctx.rng.chance(0.3) {
            for segment in ctx.rng.scroll_path(ctx.rng.int_in(-200, 200)) {
                page.scroll(segment).await?;
            }
        }
        tokio::time::sleep(ctx.rng.dwell(Duration::from_millis(400), Duration::from_millis(1200))).await;
    }
    warn!("turnstile did not clear within a minute");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{account, delay, session_with_tabs};
    use harvest_browser::scripted::PageStateBuilder;
    use harvest_rand::SecureRng;
    use serde_json::json;

    #[tokio::test]
    async fn no_phone_number_skips_entirely() {
        let (_driver, session) = session_with_tabs(vec![]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };
        let mut acct = account();
        acct.phone_number = None;

        let outcomes = run(&ctx, &session, &acct).await.unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn redeems_zero_cost_card_and_verifies_by_url() {
        let detail = "https://rewards.bing.com/redeem/gift-100";
        // Tab 1: catalog listing one zero-cost card.
        let catalog = vec![PageStateBuilder::new(CATALOG_URL)
            .eval(ZERO_PRICE_SCRIPT, json!([detail]))
            .build()];
        // Tab 2: detail page → confirm → confirmation URL.
        let detail_tab = vec![
            PageStateBuilder::new(detail)
                .visible(REDEEM_BUTTON)
                .on(format!("click:{REDEEM_BUTTON}"), 1)
                .build(),
            PageStateBuilder::new("https://rewards.bing.com/redeem/checkout")
                .visible(CONFIRM_BUTTON)
                .on(format!("click:{CONFIRM_BUTTON}"), 2)
                .build(),
            PageStateBuilder::new("https://rewards.bing.com/redeem/orderconfirmation?id=1")
                .build(),
        ];
        let (_driver, session) = session_with_tabs(vec![catalog, detail_tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let outcomes = run(&ctx, &session, &account()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].redeemed);
        assert!(outcomes[0].verified);
    }

    #[tokio::test]
    async fn unverified_checkout_counts_with_flag() {
        let detail = "https://rewards.bing.com/redeem/gift-200";
        let catalog = vec![PageStateBuilder::new(CATALOG_URL)
            .eval(ZERO_PRICE_SCRIPT, json!([detail]))
            .build()];
        let detail_tab = vec![
            PageStateBuilder::new(detail)
                .visible(REDEEM_BUTTON)
                .on(format!("click:{REDEEM_BUTTON}"), 1)
                .build(),
            // Checkout never lands anywhere recognisable.
            PageStateBuilder::new("https://rewards.bing.com/redeem/checkout").build(),
        ];
        let (_driver, session) = session_with_tabs(vec![catalog, detail_tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let outcomes = run(&ctx, &session, &account()).await.unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].redeemed);
        assert!(!outcomes[0].verified);
    }
}
