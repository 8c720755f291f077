use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{ConfigError, Result};
use crate::jsonc;

/// Top-level runtime configuration. The external merger upgrades older
/// files; this type only consumes the merged result. Unknown keys are
/// rejected so typos never silently disable a worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Max accounts running in parallel.
    pub clusters: usize,
    pub parallel: ParallelConfig,
    /// Proceed even when nothing is earnable.
    pub run_on_zero_points: bool,
    pub workers: WorkersConfig,
    pub search_settings: SearchSettings,
    pub humanization: HumanizationConfig,
    pub execution: ExecutionConfig,
    pub ban_detection: BanDetectionConfig,
    pub schedule: ScheduleConfig,
    pub dashboard: DashboardConfig,
    pub notifications: NotificationConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            clusters: 1,
            parallel: ParallelConfig::default(),
            run_on_zero_points: false,
            workers: WorkersConfig::default(),
            search_settings: SearchSettings::default(),
            humanization: HumanizationConfig::default(),
            execution: ExecutionConfig::default(),
            ban_detection: BanDetectionConfig::default(),
            schedule: ScheduleConfig::default(),
            dashboard: DashboardConfig::default(),
            notifications: NotificationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ParallelConfig {
    pub desktop: bool,
    pub mobile: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        // Sequential desktop → mobile unless explicitly enabled.
        Self { desktop: false, mobile: false }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct WorkersConfig {
    pub do_daily_set: bool,
    pub do_more_promotions: bool,
    pub do_punch_cards: bool,
    pub do_desktop_search: bool,
    pub do_mobile_search: bool,
    pub do_read_to_earn: bool,
    pub do_daily_check_in: bool,
    pub do_free_rewards: bool,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            do_daily_set: true,
            do_more_promotions: true,
            do_punch_cards: true,
            do_desktop_search: true,
            do_mobile_search: true,
            do_read_to_earn: false,
            do_daily_check_in: false,
            do_free_rewards: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SearchSettings {
    pub retry_mobile_search_amount: u32,
    pub search_delay: DelayWindow,
    /// Upper bound on queries issued in one session.
    pub per_session_max: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            retry_mobile_search_amount: 2,
            search_delay: DelayWindow {
                min: Duration::from_secs(3),
                max: Duration::from_secs(6),
            },
            per_session_max: 40,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DelayWindow {
    #[serde(with = "duration_str")]
    pub min: Duration,
    #[serde(with = "duration_str")]
    pub max: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HumanizationConfig {
    pub enabled: bool,
    pub mouse_overshoot_prob: f64,
    pub tremor_intensity: f64,
    pub typing_variance: f64,
}

impl Default for HumanizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            mouse_overshoot_prob: 0.3,
            tremor_intensity: 1.5,
            typing_variance: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExecutionConfig {
    pub passes: u32,
    #[serde(with = "duration_str")]
    pub inter_pass_delay: Duration,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self { passes: 1, inter_pass_delay: Duration::from_secs(600) }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BanDetectionConfig {
    pub enabled: bool,
    /// Consecutive warnings before escalation to soft-ban.
    pub escalation_threshold: u32,
}

impl Default for BanDetectionConfig {
    fn default() -> Self {
        Self { enabled: true, escalation_threshold: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ScheduleConfig {
    /// Local wall-clock fire times, `HH:MM`. Empty list = manual runs only.
    pub times: Vec<String>,
    pub jitter_minutes: u32,
    /// Chance of skipping a scheduled day entirely.
    pub vacation_probability: f64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self { times: Vec::new(), jitter_minutes: 15, vacation_probability: 0.05 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self { enabled: true, host: "127.0.0.1".to_string(), port: 8585 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
    pub push_url: Option<String>,
    #[serde(with = "duration_str")]
    pub timeout: Duration,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { webhook_url: None, push_url: None, timeout: Duration::from_secs(5) }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&text)
    }

    pub fn from_str(text: &str) -> Result<Self> {
        let config: Config = jsonc::parse(text).map_err(classify_parse_error)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Cross-field constraints serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.clusters < 1 {
            return Err(ConfigError::InvalidValue {
                field: "clusters".into(),
                reason: "must be ≥ 1".into(),
            });
        }
        if self.execution.passes < 1 {
            return Err(ConfigError::InvalidValue {
                field: "execution.passes".into(),
                reason: "must be ≥ 1".into(),
            });
        }
        if self.search_settings.search_delay.min > self.search_settings.search_delay.max {
            return Err(ConfigError::InvalidValue {
                field: "search_settings.search_delay".into(),
                reason: "min exceeds max".into(),
            });
        }
        if !(0.0..=1.0).contains(&self.schedule.vacation_probability) {
            return Err(ConfigError::InvalidValue {
                field: "schedule.vacation_probability".into(),
                reason: "must be within [0, 1]".into(),
            });
        }
        for t in &self.schedule.times {
            parse_hhmm(t).ok_or_else(|| ConfigError::InvalidValue {
                field: "schedule.times".into(),
                reason: format!("'{t}' is not HH:MM"),
            })?;
        }
        Ok(())
    }
}

/// `"HH:MM"` → (hour, minute).
pub fn parse_hhmm(s: &str) -> Option<(u32, u32)> {
    let (h, m) = s.split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    (h < 24 && m < 60).then_some((h, m))
}

fn classify_parse_error(err: ConfigError) -> ConfigError {
    if let ConfigError::Parse(ref inner) = err {
        let text = inner.to_string();
        if let Some(rest) = text.strip_prefix("unknown field `") {
            if let Some(field) = rest.split('`').next() {
                return ConfigError::UnknownKey(field.to_string());
            }
        }
        if let Some(rest) = text.strip_prefix("missing field `") {
            if let Some(field) = rest.split('`').next() {
                return ConfigError::MissingField(field.to_string());
            }
        }
    }
    err
}

/// Durations as `"500ms"`, `"3s"`, `"2m"`, `"1h"` in config files.
pub mod duration_str {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        let ms = d.as_millis();
        if ms % 1000 == 0 {
            s.serialize_str(&format!("{}s", ms / 1000))
        } else {
            s.serialize_str(&format!("{}ms", ms))
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| de::Error::custom(format!("cannot parse duration '{raw}'")))
    }

    pub fn parse(raw: &str) -> Option<Duration> {
        let raw = raw.trim();
        let split = raw.find(|c: char| !c.is_ascii_digit() && c != '.')?;
        let (num, unit) = raw.split_at(split);
        let value: f64 = num.parse().ok()?;
        let ms = match unit.trim() {
            "ms" => value,
            "s" => value * 1000.0,
            "m" => value * 60_000.0,
            "h" => value * 3_600_000.0,
            _ => return None,
        };
        (ms >= 0.0).then(|| Duration::from_millis(ms as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn parses_commented_config() {
        let src = r#"{
            // two accounts at a time
            "clusters": 2,
            "search_settings": {
                "retry_mobile_search_amount": 1,
                "search_delay": {"min": "3s", "max": "6s"},
                "per_session_max": 35,
            },
        }"#;
        let config = Config::from_str(src).unwrap();
        assert_eq!(config.clusters, 2);
        assert_eq!(config.search_settings.search_delay.min, Duration::from_secs(3));
        assert_eq!(config.search_settings.per_session_max, 35);
    }

    #[test]
    fn unknown_key_is_rejected_with_its_name() {
        let err = Config::from_str(r#"{"clusterz": 2}"#).unwrap_err();
        match err {
            ConfigError::UnknownKey(key) => assert_eq!(key, "clusterz"),
            other => panic!("expected UnknownKey, got {other:?}"),
        }
    }

    #[test]
    fn bad_duration_is_rejected() {
        let src = r#"{"search_settings": {"search_delay": {"min": "soon", "max": "6s"}}}"#;
        assert!(Config::from_str(src).is_err());
    }

    #[test]
    fn min_over_max_delay_is_rejected() {
        let src = r#"{"search_settings": {"search_delay": {"min": "9s", "max": "6s"}}}"#;
        assert!(matches!(
            Config::from_str(src).unwrap_err(),
            ConfigError::InvalidValue { .. }
        ));
    }

    #[test]
    fn round_trip_preserves_recognised_keys() {
        let src = r#"{
            "clusters": 3,
            "run_on_zero_points": true,
            "workers": {"do_free_rewards": true, "do_daily_set": false,
                        "do_more_promotions": true, "do_punch_cards": true,
                        "do_desktop_search": true, "do_mobile_search": false,
                        "do_read_to_earn": true, "do_daily_check_in": true},
            "execution": {"passes": 2, "inter_pass_delay": "90s"},
            "schedule": {"times": ["06:30", "18:05"], "jitter_minutes": 10,
                         "vacation_probability": 0.1}
        }"#;
        let config = Config::from_str(src).unwrap();
        let reparsed = Config::from_str(&config.to_json().unwrap()).unwrap();
        assert_eq!(reparsed.clusters, 3);
        assert!(reparsed.run_on_zero_points);
        assert!(reparsed.workers.do_free_rewards);
        assert!(!reparsed.workers.do_daily_set);
        assert_eq!(reparsed.execution.passes, 2);
        assert_eq!(reparsed.execution.inter_pass_delay, Duration::from_secs(90));
        assert_eq!(reparsed.schedule.times, vec!["06:30", "18:05"]);
        assert_eq!(reparsed.schedule.jitter_minutes, 10);
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("06:30"), Some((6, 30)));
        assert_eq!(parse_hhmm("23:59"), Some((23, 59)));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("6.30"), None);
    }

    #[test]
    fn duration_parse_units() {
        use super::duration_str::parse;
        assert_eq!(parse("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse("3s"), Some(Duration::from_secs(3)));
        assert_eq!(parse("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse("3 s"), Some(Duration::from_secs(3)));
        assert_eq!(parse("fast"), None);
    }
}
