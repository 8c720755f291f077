//! Poll: two opinions, no wrong answer. Pick one at random, let the vote
//! settle, done.

use tracing::debug;

use harvest_browser::{smart_wait_default, Page};
use harvest_types::ActivityKind;

use crate::error::Result;
use crate::{ActivityCtx, ActivityOutcome};

const OPTIONS: [&str; 2] = ["#btoption0", "#btoption1"];

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    if !smart_wait_default(page, OPTIONS[0]).await? {
        return Ok(ActivityOutcome::skipped(ActivityKind::Poll, "poll options never rendered"));
    }

    let choice = if ctx.rng.chance(0.5) { OPTIONS[0] } else { OPTIONS[1] };
    debug!(%choice, "voting");
    page.click(choice).await?;

    tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
    Ok(ActivityOutcome::done(ActivityKind::Poll))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{delay, session_with_tabs};
    use harvest_browser::scripted::PageStateBuilder;
    use harvest_rand::SecureRng;
    use harvest_types::Activity;

    #[tokio::test]
    async fn votes_on_one_of_two_options() {
        let tab = vec![PageStateBuilder::new("https://rewards.bing.com/quiz?PollScenarioId=9")
            .visible("#btoption0")
            .visible("#btoption1")
            .build()];
        let (driver, session) = session_with_tabs(vec![tab]).await;
        let rng = SecureRng::new();
        let delay = delay();
        let ctx = ActivityCtx { session: &session, rng: &rng, delay: &delay };

        let activity = Activity {
            promotion_type: "quiz".into(),
            point_progress_max: 10,
            destination_url: "https://rewards.bing.com/quiz?PollScenarioId=9".into(),
            offer_id: "poll-1".into(),
            ..Default::default()
        };

        let outcome = crate::run_activity(&ctx, &activity).await.unwrap();
        assert!(outcome.completed);
        assert_eq!(outcome.kind, ActivityKind::Poll);

        let ctx_pages = driver.last_context().unwrap().pages();
        let tab_actions = ctx_pages[1].actions();
        assert!(tab_actions.iter().any(|a| a == "click:#btoption0" || a == "click:#btoption1"));
        // Tab closed by the dispatcher.
        assert!(ctx_pages[1].is_visible("#btoption0").await.is_err());
    }
}
