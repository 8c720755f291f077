//! The worker pool. Fans account pipelines across a bounded set of
//! workers, runs the configured number of passes, and owns the two
//! process-wide flags: `stop_requested` (operator) and `global_standby`
//! (critical security incident, cleared only by restart).

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, RwLock, Semaphore};
use tracing::{error, info, warn};

use harvest_activities::RewardsApiClient;
use harvest_browser::{BrowserDriver, SessionFactory};
use harvest_config::{load_accounts, Config};
use harvest_guard::BanDetector;
use harvest_pipeline::{run_account, AccountRunResult, CancelToken, PipelineDeps};
use harvest_rand::SecureRng;
use harvest_search::QueryPool;
use harvest_store::{HistoryStore, JobStateStore, ReportWriter};
use harvest_types::{Account, RunSummary, RunSummaryEntry, SecurityIncident};

use crate::metrics::Metrics;
use crate::notify::Notifier;

const HOME_URL: &str = "https://rewards.bing.com/";
const TIMEZONE: &str = "America/New_York";
const LOCALE: &str = "en-US";
const GEO: &str = "us";

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum AccountStatus {
    Idle,
    Running,
    Completed { points: i64 },
    Error { message: String },
}

pub struct Orchestrator {
    config: Arc<Config>,
    accounts_path: PathBuf,
    pub job_state: Arc<JobStateStore>,
    pub history: Arc<HistoryStore>,
    pub reports: ReportWriter,
    factory: Arc<SessionFactory>,
    detector: Arc<BanDetector>,
    api: Arc<RewardsApiClient>,
    queries: Arc<QueryPool>,
    notifier: Arc<Notifier>,
    pub metrics: Metrics,
    global_standby: Arc<AtomicBool>,
    stop_requested: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    statuses: Arc<RwLock<HashMap<String, AccountStatus>>>,
    current_cancel: Mutex<Option<CancelToken>>,
    rng: SecureRng,
}

impl Orchestrator {
    pub fn new(
        config: Arc<Config>,
        accounts_path: PathBuf,
        data_dir: PathBuf,
        driver: Arc<dyn BrowserDriver>,
        notifier: Arc<Notifier>,
    ) -> anyhow::Result<Self> {
        let factory = SessionFactory::new(
            driver,
            data_dir.join("profiles"),
            HOME_URL,
            TIMEZONE,
            LOCALE,
        );
        let detector = BanDetector::new(
            config.ban_detection.enabled,
            config.ban_detection.escalation_threshold,
            Some(accounts_path.clone()),
        );

        Ok(Self {
            config,
            accounts_path,
            job_state: Arc::new(JobStateStore::new(data_dir.join("state"))?),
            history: Arc::new(HistoryStore::new(data_dir.join("history"))?),
            reports: ReportWriter::new(data_dir.join("reports")),
            factory: Arc::new(factory),
            detector: Arc::new(detector),
            api: Arc::new(RewardsApiClient::default()),
            queries: Arc::new(QueryPool::default()),
            notifier,
            metrics: Metrics::new(),
            global_standby: Arc::new(AtomicBool::new(false)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            running: Arc::new(AtomicBool::new(false)),
            statuses: Arc::new(RwLock::new(HashMap::new())),
            current_cancel: Mutex::new(None),
            rng: SecureRng::new(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn is_standby(&self) -> bool {
        self.global_standby.load(Ordering::SeqCst)
    }

    /// Operator stop: the flag is observed at work-unit boundaries, so
    /// in-flight units finish before workers exit.
    pub async fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(cancel) = self.current_cancel.lock().await.as_ref() {
            cancel.cancel();
        }
        info!("stop requested; workers will exit at the next unit boundary");
    }

    pub async fn statuses(&self) -> HashMap<String, AccountStatus> {
        self.statuses.read().await.clone()
    }

    pub fn accounts(&self) -> anyhow::Result<Vec<Account>> {
        Ok(load_accounts(&self.accounts_path)?)
    }

    /// Run every enabled account through the configured passes.
    pub async fn run_all(&self) -> anyhow::Result<RunSummary> {
        let accounts: Vec<Account> =
            self.accounts()?.into_iter().filter(|a| a.enabled).collect();
        self.run_accounts(accounts).await
    }

    /// Run one account (dashboard `run-single`).
    pub async fn run_single(&self, email: &str) -> anyhow::Result<RunSummary> {
        let account = self
            .accounts()?
            .into_iter()
            .find(|a| a.email == email && a.enabled)
            .ok_or_else(|| anyhow::anyhow!("no enabled account with that address"))?;
        self.run_accounts(vec![account]).await
    }

    async fn run_accounts(&self, accounts: Vec<Account>) -> anyhow::Result<RunSummary> {
        if self.global_standby.load(Ordering::SeqCst) {
            anyhow::bail!("global standby engaged; restart required");
        }
        if self.running.swap(true, Ordering::SeqCst) {
            anyhow::bail!("a run is already in progress");
        }
        self.stop_requested.store(false, Ordering::SeqCst);

        let run_id = self.rng.token();
        let started_at = chrono::Utc::now();
        let date = chrono::Local::now().date_naive();
        info!(%run_id, accounts = accounts.len(), "run starting");
        self.metrics.runs_started.inc();

        {
            let mut statuses = self.statuses.write().await;
            statuses.clear();
            for account in &accounts {
                statuses.insert(account.masked_email(), AccountStatus::Idle);
            }
        }
        let active: std::collections::HashSet<String> =
            accounts.iter().map(|a| a.email.clone()).collect();
        self.job_state.retain_locks(&active).await;

        let cancel = CancelToken::new();
        *self.current_cancel.lock().await = Some(cancel.clone());

        let (incident_tx, incident_rx) = mpsc::unbounded_channel();
        let incident_pump = self.spawn_incident_pump(incident_rx, cancel.clone());

        let deps = Arc::new(PipelineDeps {
            factory: Arc::clone(&self.factory),
            job_state: Arc::clone(&self.job_state),
            history: Arc::clone(&self.history),
            detector: Arc::clone(&self.detector),
            api: Arc::clone(&self.api),
            queries: Arc::clone(&self.queries),
            config: Arc::clone(&self.config),
            cancel: cancel.clone(),
            incidents: incident_tx,
            run_id: run_id.clone(),
            home_url: HOME_URL.to_string(),
            geo: GEO.to_string(),
            login_waits: (Duration::from_millis(1200), Duration::from_secs(4)),
        });

        let mut merged: HashMap<String, RunSummaryEntry> = HashMap::new();
        let mut incidents_seen = 0usize;

        let passes = self.config.execution.passes;
        for pass in 1..=passes {
            if self.should_halt(&cancel) {
                break;
            }
            info!(pass, passes, "pass starting");
            let results = self.run_pass(&deps, &accounts).await;
            for result in results {
                incidents_seen += usize::from(result.halted);
                merge_entry(&mut merged, &result);
            }
            if pass < passes && !self.should_halt(&cancel) {
                tokio::time::sleep(self.config.execution.inter_pass_delay).await;
            }
        }

        // The pump ends once the deps (and with them the sender) drop.
        drop(deps);
        let _ = incident_pump.await;

        let entries: Vec<RunSummaryEntry> = merged.into_values().collect();
        let summary = RunSummary {
            run_id,
            date: Some(date),
            started_at: Some(started_at),
            finished_at: Some(chrono::Utc::now()),
            accounts_total: accounts.len(),
            accounts_succeeded: entries.iter().filter(|e| e.success).count(),
            accounts_failed: entries.iter().filter(|e| !e.success).count(),
            total_points: entries.iter().map(|e| e.points).sum(),
            incidents: incidents_seen,
            entries,
        };

        if let Err(err) = self.reports.write_summary(&summary) {
            warn!(%err, "report write failed");
        }
        self.notifier.run_summary(&summary).await;
        self.metrics.runs_completed.inc();

        *self.current_cancel.lock().await = None;
        self.running.store(false, Ordering::SeqCst);
        info!(
            run_id = %summary.run_id,
            points = summary.total_points,
            failed = summary.accounts_failed,
            "run finished"
        );
        Ok(summary)
    }

    async fn run_pass(
        &self,
        deps: &Arc<PipelineDeps>,
        accounts: &[Account],
    ) -> Vec<AccountRunResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.clusters.max(1)));
        let mut handles = Vec::with_capacity(accounts.len());

        for account in accounts {
            let permit_source = Arc::clone(&semaphore);
            let deps = Arc::clone(deps);
            let account = account.clone();
            let statuses = Arc::clone(&self.statuses);
            let metrics = self.metrics.clone();
            let standby = Arc::clone(&self.global_standby);
            let stop = Arc::clone(&self.stop_requested);

            handles.push(tokio::spawn(async move {
                let Ok(_permit) = permit_source.acquire().await else {
                    return None;
                };
                // Checked after the permit: a standby or stop raised by an
                // earlier account must keep queued accounts from starting.
                if standby.load(Ordering::SeqCst)
                    || stop.load(Ordering::SeqCst)
                    || deps.cancel.is_cancelled()
                {
                    return None;
                }

                let masked = account.masked_email();
                statuses.write().await.insert(masked.clone(), AccountStatus::Running);
                metrics.accounts_running.inc();
                let timer = std::time::Instant::now();

                let result = run_account(&deps, &account).await;

                metrics.accounts_running.dec();
                metrics.accounts_processed.inc();
                metrics.flow_duration.observe(timer.elapsed().as_secs_f64());
                metrics.points_earned.inc_by(result.total_points().max(0) as u64);
                metrics.activities_completed.inc_by(result.completed as u64);
                metrics.activities_failed.inc_by(result.failed as u64);
                if result.disabled {
                    metrics.accounts_disabled.inc();
                }
                if !result.success {
                    metrics.accounts_failed.inc();
                }

                let status = if result.success {
                    AccountStatus::Completed { points: result.total_points() }
                } else {
                    AccountStatus::Error {
                        message: result
                            .errors
                            .last()
                            .cloned()
                            .unwrap_or_else(|| "run did not complete".to_string()),
                    }
                };
                statuses.write().await.insert(masked, status);
                Some(result)
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            match handle.await {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(err) => error!(%err, "account worker panicked"),
            }
        }
        results
    }

    fn spawn_incident_pump(
        &self,
        mut rx: mpsc::UnboundedReceiver<SecurityIncident>,
        cancel: CancelToken,
    ) -> tokio::task::JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        let standby = Arc::clone(&self.global_standby);
        let metrics = self.metrics.clone();
        tokio::spawn(async move {
            while let Some(incident) = rx.recv().await {
                metrics.incidents.inc();
                warn!(kind = %incident.kind, account = %incident.account, "security incident");
                if let Some(docs) = &incident.docs_url {
                    warn!(docs = %docs, "operator action required");
                }
                if incident.kind.engages_standby() {
                    standby.store(true, Ordering::SeqCst);
                    cancel.cancel();
                    warn!("global standby engaged; no further tasks will start");
                }
                notifier.incident(&incident).await;
            }
        })
    }

    fn should_halt(&self, cancel: &CancelToken) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
            || self.global_standby.load(Ordering::SeqCst)
            || cancel.is_cancelled()
    }
}

fn merge_entry(merged: &mut HashMap<String, RunSummaryEntry>, result: &AccountRunResult) {
    let entry = merged.entry(result.account.clone()).or_insert_with(|| RunSummaryEntry {
        account: result.account.clone(),
        points: 0,
        completed: 0,
        failed: 0,
        success: true,
        duration_ms: 0,
    });
    entry.points += result.total_points();
    entry.completed += result.completed;
    entry.failed += result.failed;
    entry.success = entry.success && result.success;
    entry.duration_ms += result.duration_ms;
}
