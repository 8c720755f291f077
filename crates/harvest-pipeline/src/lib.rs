//! The per-account pipeline: desktop flow, then mobile flow, with skip
//! logic against the job-state store and guaranteed browser release. The
//! orchestrator never reaches into a running pipeline; it speaks through
//! the cancellation token and reads the returned summary.

pub mod dashboard;
mod flows;
pub mod oauth;

pub use flows::{run_account, AccountRunResult};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use harvest_activities::RewardsApiClient;
use harvest_browser::SessionFactory;
use harvest_config::Config;
use harvest_guard::BanDetector;
use harvest_search::QueryPool;
use harvest_store::{HistoryStore, JobStateStore};
use harvest_types::SecurityIncident;

/// Cooperative cancellation observed at work-unit boundaries. The unit in
/// flight finishes (or hits its own timeout); nothing new starts.
#[derive(Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Everything a pipeline run needs, owned by the orchestrator and shared
/// across accounts. No back-references: handlers receive this context and
/// nothing else.
pub struct PipelineDeps {
    pub factory: Arc<SessionFactory>,
    pub job_state: Arc<JobStateStore>,
    pub history: Arc<HistoryStore>,
    pub detector: Arc<BanDetector>,
    pub api: Arc<RewardsApiClient>,
    pub queries: Arc<QueryPool>,
    pub config: Arc<Config>,
    pub cancel: CancelToken,
    pub incidents: mpsc::UnboundedSender<SecurityIncident>,
    /// Orchestrator run this pipeline invocation belongs to.
    pub run_id: String,
    pub home_url: String,
    /// Country code sent with rewards API claims.
    pub geo: String,
    /// Login smart-wait windows; tests shrink these.
    pub login_waits: (Duration, Duration),
}

impl PipelineDeps {
    pub fn emit(&self, incident: SecurityIncident) {
        let _ = self.incidents.send(incident);
    }
}
