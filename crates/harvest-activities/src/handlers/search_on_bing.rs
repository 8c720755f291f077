//! Search-on-bing promotion: the destination is a prepared search; the
//! visit plus a human-length stay earns the points.

use harvest_browser::{smart_wait_default, Page};
use harvest_types::ActivityKind;

use crate::error::Result;
use crate::{ActivityCtx, ActivityOutcome};

const RESULTS_SELECTOR: &str = "#b_results";

pub async fn run(ctx: &ActivityCtx<'_>, page: &dyn Page) -> Result<ActivityOutcome> {
    smart_wait_default(page, RESULTS_SELECTOR).await?;

    // Read a little, like anyone landing on a results page.
    tokio::time::sleep(ctx.rng.dwell(ctx.delay.min, ctx.delay.max)).await;
    if ctx.rng.chance(0.5) {
        for segment in ctx.rng.scroll_path(ctx.rng.int_in(200, 600)) {
            page.scroll(segment).await?;
        }
    }
    Ok(ActivityOutcome::done(ActivityKind::SearchOnBing))
}
