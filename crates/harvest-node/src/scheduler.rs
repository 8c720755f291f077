//! Wall-clock scheduler. Fires the orchestrator at configured local
//! times with jitter, rolls the vacation die, and survives every failure
//! by logging it.

use chrono::{DateTime, Local, NaiveTime, TimeDelta};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use harvest_config::{config::parse_hhmm, ScheduleConfig};
use harvest_rand::SecureRng;

use crate::orchestrator::Orchestrator;

pub struct Scheduler {
    config: ScheduleConfig,
    orchestrator: Arc<Orchestrator>,
    rng: SecureRng,
}

impl Scheduler {
    pub fn new(config: ScheduleConfig, orchestrator: Arc<Orchestrator>) -> Self {
        Self { config, orchestrator, rng: SecureRng::new() }
    }

    pub async fn run(self) {
        if self.config.times.is_empty() {
            info!("no schedule configured; runs are manual only");
            return;
        }

        loop {
            let Some(next) = next_fire(Local::now(), &self.config.times) else {
                warn!("schedule has no parseable times; scheduler stopping");
                return;
            };
            let wait = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
            info!(next = %next.format("%Y-%m-%d %H:%M"), "next scheduled run");
            tokio::time::sleep(wait).await;

            let jitter_minutes = self.rng.int_in(0, self.config.jitter_minutes as i64);
            if jitter_minutes > 0 {
                info!(jitter_minutes, "applying start jitter");
                tokio::time::sleep(Duration::from_secs(jitter_minutes as u64 * 60)).await;
            }

            if self.rng.chance(self.config.vacation_probability) {
                info!("vacation day rolled, skipping this run");
                continue;
            }

            if let Err(err) = self.orchestrator.run_all().await {
                error!(%err, "scheduled run failed");
            }
        }
    }
}

/// Earliest configured `HH:MM` strictly after `now`, today or tomorrow.
pub fn next_fire(now: DateTime<Local>, times: &[String]) -> Option<DateTime<Local>> {
    let mut candidates: Vec<DateTime<Local>> = Vec::new();
    for raw in times {
        let Some((hour, minute)) = parse_hhmm(raw) else {
            warn!(time = %raw, "unparseable schedule entry");
            continue;
        };
        let at = NaiveTime::from_hms_opt(hour, minute, 0)?;
        let today = now.date_naive().and_time(at);
        for offset in [0i64, 1] {
            let candidate = today + TimeDelta::days(offset);
            if let Some(local) = candidate.and_local_timezone(Local).single() {
                if local > now {
                    candidates.push(local);
                    break;
                }
            }
        }
    }
    candidates.into_iter().min()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 3, 10, h, m, 0).unwrap()
    }

    #[test]
    fn picks_next_time_today() {
        let next = next_fire(at(8, 0), &["06:00".into(), "12:30".into()]).unwrap();
        assert_eq!(next, at(12, 30));
    }

    #[test]
    fn rolls_over_to_tomorrow() {
        let next = next_fire(at(23, 0), &["06:00".into(), "12:30".into()]).unwrap();
        assert_eq!(next, at(6, 0) + TimeDelta::days(1));
    }

    #[test]
    fn skips_unparseable_entries() {
        let next = next_fire(at(8, 0), &["nonsense".into(), "09:15".into()]).unwrap();
        assert_eq!(next, at(9, 15));
    }

    #[test]
    fn all_unparseable_is_none() {
        assert!(next_fire(at(8, 0), &["x".into()]).is_none());
        assert!(next_fire(at(8, 0), &[]).is_none());
    }
}
