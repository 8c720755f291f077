//! Activity dispatch. Classification is a pure function on the activity
//! record (`Activity::kind()`); this crate maps each kind to its handler.
//! Every handler runs in its own tab and the dispatcher closes that tab
//! on every exit path.

pub mod api;
pub mod error;
pub mod handlers;

pub use api::{CheckInOutcome, ReadToEarnOutcome, RewardsApiClient};
pub use error::{ActivityError, Result};

use tracing::{debug, warn};

use harvest_browser::{Page, SessionGuard};
use harvest_config::DelayWindow;
use harvest_rand::SecureRng;
use harvest_types::{Activity, ActivityKind};

pub struct ActivityCtx<'a> {
    pub session: &'a SessionGuard,
    pub rng: &'a SecureRng,
    pub delay: &'a DelayWindow,
}

#[derive(Debug, Clone)]
pub struct ActivityOutcome {
    pub kind: ActivityKind,
    pub completed: bool,
    pub note: Option<String>,
}

impl ActivityOutcome {
    fn done(kind: ActivityKind) -> Self {
        Self { kind, completed: true, note: None }
    }

    fn skipped(kind: ActivityKind, note: impl Into<String>) -> Self {
        Self { kind, completed: false, note: Some(note.into()) }
    }
}

/// Run one activity in a fresh tab. The tab is closed whether the
/// handler succeeds, fails, or the activity is unsupported.
pub async fn run_activity(ctx: &ActivityCtx<'_>, activity: &Activity) -> Result<ActivityOutcome> {
    let kind = activity.kind();
    if kind == ActivityKind::Unsupported {
        debug!(name = %activity.name, promo = %activity.promotion_type, "unsupported activity");
        return Ok(ActivityOutcome::skipped(kind, "unsupported promotion type"));
    }

    let page = ctx.session.new_page().await?;
    let result = dispatch(ctx, page.as_ref(), activity, kind).await;
    if let Err(close_err) = page.close().await {
        warn!(%close_err, "activity tab close failed");
    }
    result
}

async fn dispatch(
    ctx: &ActivityCtx<'_>,
    page: &dyn Page,
    activity: &Activity,
    kind: ActivityKind,
) -> Result<ActivityOutcome> {
    page.goto(&activity.destination_url).await?;

    match kind {
        ActivityKind::Poll => handlers::poll::run(ctx, page).await,
        ActivityKind::Abc => handlers::abc::run(ctx, page).await,
        ActivityKind::ThisOrThat => handlers::this_or_that::run(ctx, page).await,
        ActivityKind::Quiz => handlers::quiz::run(ctx, page).await,
        ActivityKind::SearchOnBing => handlers::search_on_bing::run(ctx, page).await,
        ActivityKind::UrlReward => handlers::url_reward::run(ctx, page).await,
        ActivityKind::Unsupported => unreachable!("filtered before dispatch"),
    }
}
