//! The search execution loop: issue queries like a person at the search
//! box, watch the point counter move, stop when the bucket fills or
//! visibly stops filling.

use async_trait::async_trait;
use tracing::{debug, info, warn};
use url::Url;

use harvest_browser::{smart_wait_default, Page};
use harvest_config::SearchSettings;
use harvest_rand::SecureRng;

use crate::{Result, SearchError};

/// Dashboard refetch cadence, in queries.
const REFETCH_EVERY: u32 = 5;
/// Queries without observed progress before the session counts as stalled.
const STALL_WINDOW: u32 = 8;
const RESULTS_SELECTOR: &str = "#b_results";

/// How the runner observes point progress; the pipeline implements this
/// by refetching the dashboard.
#[async_trait]
pub trait ProgressProbe: Send + Sync {
    async fn remaining(&self) -> std::result::Result<i64, String>;
}

#[derive(Debug, Clone, Default)]
pub struct SearchOutcome {
    pub completed: bool,
    pub stalled: bool,
    pub queries_issued: u32,
    pub final_remaining: i64,
}

pub struct SearchRunner<'a> {
    settings: &'a SearchSettings,
    endpoint: String,
    rng: SecureRng,
}

impl<'a> SearchRunner<'a> {
    pub fn new(settings: &'a SearchSettings) -> Self {
        Self {
            settings,
            endpoint: "https://www.bing.com/search".to_string(),
            rng: SecureRng::new(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Run queries until the bucket is full, the session budget is spent,
    /// the query list runs dry, or progress stalls.
    pub async fn run(
        &self,
        page: &dyn Page,
        queries: &[String],
        probe: &dyn ProgressProbe,
    ) -> Result<SearchOutcome> {
        let mut remaining = probe.remaining().await.map_err(SearchError::Probe)?;
        let mut outcome = SearchOutcome { final_remaining: remaining.max(0), ..Default::default() };

        if remaining <= 0 {
            outcome.completed = true;
            debug!("search bucket already full");
            return Ok(outcome);
        }

        let mut since_progress: u32 = 0;
        let mut last_remaining = remaining;

        for query in queries {
            if outcome.queries_issued as usize >= self.settings.per_session_max {
                warn!(max = self.settings.per_session_max, "per-session query budget spent");
                break;
            }

            self.issue(page, query).await?;
            outcome.queries_issued += 1;
            since_progress += 1;

            let delay = &self.settings.search_delay;
            tokio::time::sleep(self.rng.dwell(delay.min, delay.max)).await;

            if outcome.queries_issued % REFETCH_EVERY == 0 {
                remaining = probe.remaining().await.map_err(SearchError::Probe)?;
                debug!(remaining, issued = outcome.queries_issued, "progress refetched");
                if remaining < last_remaining {
                    since_progress = 0;
                    last_remaining = remaining;
                }
                if remaining <= 0 {
                    outcome.completed = true;
                    break;
                }
                if since_progress >= STALL_WINDOW {
                    warn!(
                        issued = outcome.queries_issued,
                        remaining, "search progress stalled"
                    );
                    outcome.stalled = true;
                    break;
                }
            }
        }

        if !outcome.completed {
            remaining = probe.remaining().await.map_err(SearchError::Probe)?;
            outcome.completed = remaining <= 0;
        }
        outcome.final_remaining = remaining.max(0);
        info!(
            completed = outcome.completed,
            stalled = outcome.stalled,
            queries = outcome.queries_issued,
            "search session finished"
        );
        Ok(outcome)
    }

    async fn issue(&self, page: &dyn Page, query: &str) -> Result<()> {
        let url = Url::parse_with_params(&self.endpoint, &[("q", query), ("form", "QBLH")])
            .map_err(|e| SearchError::Probe(format!("bad search endpoint: {e}")))?;
        page.goto(url.as_str()).await?;
        smart_wait_default(page, RESULTS_SELECTOR).await?;

        // Reading behaviour: a short scroll through results, sometimes.
        if self.rng.chance(0.4) {
            for segment in self.rng.scroll_path(self.rng.int_in(300, 900)) {
                page.scroll(segment).await?;
            }
        }
        Ok(())
    }
}
