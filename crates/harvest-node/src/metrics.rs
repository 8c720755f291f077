use prometheus::{
    Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Registry>,

    pub runs_started: IntCounter,
    pub runs_completed: IntCounter,

    pub accounts_processed: IntCounter,
    pub accounts_failed: IntCounter,
    pub accounts_disabled: IntCounter,

    pub points_earned: IntCounter,
    pub searches_completed: IntCounter,
    pub activities_completed: IntCounter,
    pub activities_failed: IntCounter,

    pub logins_succeeded: IntCounter,
    pub logins_failed: IntCounter,

    pub bans_detected: IntCounterVec,
    pub incidents: IntCounter,

    pub accounts_running: IntGauge,
    pub flow_duration: Histogram,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let runs_started =
            IntCounter::new("harvest_runs_started_total", "Orchestrator runs started").unwrap();
        let runs_completed =
            IntCounter::new("harvest_runs_completed_total", "Orchestrator runs completed").unwrap();
        let accounts_processed =
            IntCounter::new("harvest_accounts_processed_total", "Account flows finished").unwrap();
        let accounts_failed =
            IntCounter::new("harvest_accounts_failed_total", "Account flows with errors").unwrap();
        let accounts_disabled =
            IntCounter::new("harvest_accounts_disabled_total", "Accounts disabled by hard ban")
                .unwrap();
        let points_earned =
            IntCounter::new("harvest_points_earned_total", "Points earned across accounts")
                .unwrap();
        let searches_completed =
            IntCounter::new("harvest_searches_completed_total", "Search buckets drained").unwrap();
        let activities_completed =
            IntCounter::new("harvest_activities_completed_total", "Activities completed").unwrap();
        let activities_failed =
            IntCounter::new("harvest_activities_failed_total", "Activities failed").unwrap();
        let logins_succeeded =
            IntCounter::new("harvest_logins_succeeded_total", "Successful logins").unwrap();
        let logins_failed =
            IntCounter::new("harvest_logins_failed_total", "Failed logins").unwrap();
        let bans_detected = IntCounterVec::new(
            Opts::new("harvest_bans_detected_total", "Ban verdicts by severity"),
            &["severity"],
        )
        .unwrap();
        let incidents =
            IntCounter::new("harvest_security_incidents_total", "Security incidents emitted")
                .unwrap();
        let accounts_running =
            IntGauge::new("harvest_accounts_running", "Account flows currently running").unwrap();
        let flow_duration = Histogram::with_opts(
            HistogramOpts::new("harvest_flow_duration_seconds", "Per-account run duration")
                .buckets(vec![30.0, 60.0, 120.0, 300.0, 600.0, 1200.0, 2400.0]),
        )
        .unwrap();

        for collector in [
            Box::new(runs_started.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(runs_completed.clone()),
            Box::new(accounts_processed.clone()),
            Box::new(accounts_failed.clone()),
            Box::new(accounts_disabled.clone()),
            Box::new(points_earned.clone()),
            Box::new(searches_completed.clone()),
            Box::new(activities_completed.clone()),
            Box::new(activities_failed.clone()),
            Box::new(logins_succeeded.clone()),
            Box::new(logins_failed.clone()),
            Box::new(bans_detected.clone()),
            Box::new(incidents.clone()),
            Box::new(accounts_running.clone()),
            Box::new(flow_duration.clone()),
        ] {
            registry.register(collector).unwrap();
        }

        Self {
            registry,
            runs_started,
            runs_completed,
            accounts_processed,
            accounts_failed,
            accounts_disabled,
            points_earned,
            searches_completed,
            activities_completed,
            activities_failed,
            logins_succeeded,
            logins_failed,
            bans_detected,
            incidents,
            accounts_running,
            flow_duration,
        }
    }

    pub fn gather(&self) -> String {
        let encoder = TextEncoder::new();
        encoder
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_show_up_in_exposition() {
        let metrics = Metrics::new();
        metrics.points_earned.inc_by(250);
        metrics.bans_detected.with_label_values(&["soft-ban"]).inc();
        let text = metrics.gather();
        assert!(text.contains("harvest_points_earned_total 250"));
        assert!(text.contains("harvest_bans_detected_total{severity=\"soft-ban\"} 1"));
    }
}
