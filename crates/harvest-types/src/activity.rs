use serde::{Deserialize, Serialize};
use std::fmt;

/// One promotional item from the dashboard (daily set, more-promotions,
/// or punch-card child).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Activity {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, rename = "promotionType")]
    pub promotion_type: String,
    #[serde(default, rename = "destinationUrl")]
    pub destination_url: String,
    #[serde(default, rename = "pointProgress")]
    pub point_progress: i64,
    #[serde(default, rename = "pointProgressMax")]
    pub point_progress_max: i64,
    #[serde(default)]
    pub complete: bool,
    #[serde(default, rename = "offerId")]
    pub offer_id: String,
}

impl Activity {
    pub fn remaining_points(&self) -> i64 {
        (self.point_progress_max - self.point_progress).max(0)
    }

    /// Classify by `(promotion_type, point_progress_max, url, name)`.
    /// First match wins; the order here is the contract.
    pub fn kind(&self) -> ActivityKind {
        let promo = self.promotion_type.to_ascii_lowercase();
        let url = self.destination_url.to_ascii_lowercase();
        let name = self.name.to_ascii_lowercase();
        match promo.as_str() {
            "quiz" if self.point_progress_max == 10 && url.contains("pollscenarioid") => {
                ActivityKind::Poll
            }
            "quiz" if self.point_progress_max == 10 => ActivityKind::Abc,
            "quiz" if self.point_progress_max == 50 => ActivityKind::ThisOrThat,
            "quiz" => ActivityKind::Quiz,
            "urlreward" if name.contains("exploreonbing") => ActivityKind::SearchOnBing,
            "urlreward" => ActivityKind::UrlReward,
            _ => ActivityKind::Unsupported,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActivityKind {
    Poll,
    Abc,
    ThisOrThat,
    Quiz,
    SearchOnBing,
    UrlReward,
    Unsupported,
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActivityKind::Poll => "poll",
            ActivityKind::Abc => "abc",
            ActivityKind::ThisOrThat => "thisOrThat",
            ActivityKind::Quiz => "quiz",
            ActivityKind::SearchOnBing => "searchOnBing",
            ActivityKind::UrlReward => "urlReward",
            ActivityKind::Unsupported => "unsupported",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(max: i64, url: &str) -> Activity {
        Activity {
            promotion_type: "quiz".into(),
            point_progress_max: max,
            destination_url: url.into(),
            ..Default::default()
        }
    }

    #[test]
    fn classifies_poll_before_abc() {
        let a = quiz(10, "https://rewards.example/quiz?PollScenarioId=42");
        assert_eq!(a.kind(), ActivityKind::Poll);
        let b = quiz(10, "https://rewards.example/quiz");
        assert_eq!(b.kind(), ActivityKind::Abc);
    }

    #[test]
    fn classifies_this_or_that_and_quiz() {
        assert_eq!(quiz(50, "x").kind(), ActivityKind::ThisOrThat);
        assert_eq!(quiz(30, "x").kind(), ActivityKind::Quiz);
    }

    #[test]
    fn classifies_url_rewards() {
        let bing = Activity {
            promotion_type: "urlreward".into(),
            name: "ExploreOnBing_2024".into(),
            ..Default::default()
        };
        assert_eq!(bing.kind(), ActivityKind::SearchOnBing);

        let plain = Activity { promotion_type: "urlreward".into(), ..Default::default() };
        assert_eq!(plain.kind(), ActivityKind::UrlReward);
    }

    #[test]
    fn unknown_promotion_type_is_unsupported() {
        let a = Activity { promotion_type: "welcometour".into(), ..Default::default() };
        assert_eq!(a.kind(), ActivityKind::Unsupported);
    }
}
