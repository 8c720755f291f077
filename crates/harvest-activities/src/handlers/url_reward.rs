//! URL reward: loading the destination grants the points; a short
//! humanised stay and out.

use harvest_types::ActivityKind;

use harvest_browser::Page;

use crate::error::Result;
use crate::{ActivityCtx, ActivityOutcome};

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
    if ctx.rng.chance(0.3) {
        for segment in ctx.rng.scroll_path(ctx.rng.int_in(150, 500)) {
            page.scroll(segment).await?;
        }
    }
    Ok(ActivityOutcome::done(ActivityKind::UrlReward))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{delay, session_with_tabs};
    use harvest_browser::scripted::PageStateBuilder;
    use harvest_rand::SecureRng;
    use harvest_types::Activity;

    #[tokio::test]
    async fn visit_completes_and_tab_closes() {
        let url = "https://www.bing.com/some/article";
        let tab = vec![PageStateBuilder::new(url).build()];
        let (driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "urlreward".into(),
            destination_url: url.into(),
            offer_id: "url-1".into(),
            ..Default::default()
        };
        let outcome = crate::run_activity(&ctx, &activity).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.kind, ActivityKind::UrlReward);

        let pages = driver.last_context().unwrap().pages();
        assert!(pages[1].current_url().await.is_err(), "tab must be closed");
    }
}
