use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::activity::Activity;

/// Snapshot of the rewards dashboard, scraped once per flow after login.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DashboardData {
    #[serde(default, rename = "userStatus")]
    pub user_status: UserStatus,
    #[serde(default)]
    pub counters: Counters,
    #[serde(default, rename = "morePromotions")]
    pub more_promotions: Vec<Activity>,
    /// Daily set promotions keyed by `YYYY-MM-DD`.
    #[serde(default, rename = "dailySetPromotions")]
    pub daily_set: HashMap<String, Vec<Activity>>,
    #[serde(default, rename = "punchCards")]
    pub punch_cards: Vec<PunchCard>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserStatus {
    #[serde(default, rename = "availablePoints")]
    pub available_points: i64,
    #[serde(default, rename = "lifetimePoints")]
    pub lifetime_points: i64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Counters {
    #[serde(default, rename = "pcSearch")]
    pub pc_search: Vec<PointProgress>,
    #[serde(default, rename = "mobileSearch")]
    pub mobile_search: Vec<PointProgress>,
    #[serde(default, rename = "dailyPoint")]
    pub daily_point: Vec<PointProgress>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PointProgress {
    #[serde(default, rename = "pointProgress")]
    pub point_progress: i64,
    #[serde(default, rename = "pointProgressMax")]
    pub point_progress_max: i64,
}

impl PointProgress {
    pub fn remaining(&self) -> i64 {
        (self.point_progress_max - self.point_progress).max(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PunchCard {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "parentPromotion")]
    pub parent: Option<Promotion>,
    #[serde(default, rename = "childPromotions")]
    pub children: Vec<Activity>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Promotion {
    #[serde(default)]
    pub name: String,
    #[serde(default, rename = "destinationUrl")]
    pub destination_url: String,
    #[serde(default)]
    pub complete: bool,
}

impl DashboardData {
    /// Search counter for the given persona, if the dashboard reported one.
    pub fn search_counter(&self, mobile: bool) -> Option<&PointProgress> {
        if mobile {
            self.counters.mobile_search.first()
        } else {
            self.counters.pc_search.first()
        }
    }

    /// Points still earnable through a browser on the given persona:
    /// the search bucket plus incomplete promotions (desktop only).
    pub fn browser_earnable(&self, mobile: bool) -> i64 {
        let search: i64 = self.search_counter(mobile).map(|c| c.remaining()).unwrap_or(0);
        if mobile {
            return search;
        }
        let promos: i64 = self
            .daily_set
            .values()
            .flatten()
            .chain(self.more_promotions.iter())
            .filter(|a| !a.complete)
            .map(|a| (a.point_progress_max - a.point_progress).max(0))
            .sum();
        search + promos
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dashboard_json_with_unknown_fields() {
        let raw = serde_json::json!({
            "userStatus": {"availablePoints": 1200, "levelInfo": {"activeLevel": "Level2"}},
            "counters": {
                "pcSearch": [{"pointProgress": 30, "pointProgressMax": 150}],
                "mobileSearch": [{"pointProgress": 0, "pointProgressMax": 100}]
            },
            "morePromotions": [],
            "dailySetPromotions": {}
        });
        let data: DashboardData = serde_json::from_value(raw).unwrap();
        assert_eq!(data.user_status.available_points, 1200);
        assert_eq!(data.search_counter(false).unwrap().remaining(), 120);
        assert_eq!(data.search_counter(true).unwrap().remaining(), 100);
    }

    #[test]
    fn browser_earnable_sums_search_and_promotions() {
        let mut data = DashboardData::default();
        data.counters.pc_search = vec![PointProgress { point_progress: 50, point_progress_max: 150 }];
        data.more_promotions = vec![
            Activity { point_progress: 0, point_progress_max: 10, complete: false, ..Default::default() },
            Activity { point_progress: 10, point_progress_max: 10, complete: true, ..Default::default() },
        ];
        assert_eq!(data.browser_earnable(false), 110);
    }
}
