//! Lightning-round ("ABC") quiz: a short run of questions where any
//! choice advances. Click through until the completion mark shows up or
//! the bound is reached.

use tracing::debug;

use harvest_browser::{smart_wait_default, Page};
use harvest_types::ActivityKind;

use crate::error::Result;
use crate::handlers::quiz_state::option_selector;
use crate::{ActivityCtx, ActivityOutcome};

const MAX_QUESTIONS: usize = 10;
const NEXT_BUTTON: &str = "#nextQuestionbtn";
const COMPLETE_ICON: &str = "#quizCompleteContainer";

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    for round in 0..MAX_QUESTIONS {
        if page.is_visible(COMPLETE_ICON).await? {
            debug!(round, "abc quiz complete");
            return Ok(ActivityOutcome::done(ActivityKind::Abc));
        }

        if !smart_wait_default(page, &option_selector(0)).await? {
            return Ok(ActivityOutcome::skipped(ActivityKind::Abc, "options never rendered"));
        }

        // Any visible option will do.
        let mut visible: Vec<String> = Vec::new();
        for index in 0..3 {
            let selector = option_selector(index);
            if page.is_visible(&selector).await? {
                visible.push(selector);
            }
        }
        let Some(choice) = ctx.rng.pick(&visible) else {
            return Ok(ActivityOutcome::skipped(ActivityKind::Abc, "no clickable options"));
        };
        page.click(choice).await?;
        tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;

        if smart_wait_default(page, NEXT_BUTTON).await? {
            page.click(NEXT_BUTTON).await?;
        }
    }

    // Bound reached; report what the page shows.
    let completed = page.is_visible(COMPLETE_ICON).await?;
    Ok(ActivityOutcome {
        kind: ActivityKind::Abc,
        completed,
        note: (!completed).then(|| "question bound reached".to_string()),
    })
}
