//! Direct rewards-API calls for the activities that never need a page:
//! the daily check-in and read-to-earn claims. Both treat an unchanged
//! post-claim balance as the "already done today" terminal condition.

use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use harvest_config::DelayWindow;
use harvest_rand::SecureRng;

use crate::error::{ActivityError, Result};

const DEFAULT_BASE: &str = "https://prod.rewardsplatform.microsoft.com";
const CHECKIN_OFFER: &str = "Gamification_Sapphire_DailyCheckIn";
const READ_OFFER: &str = "ENUS_readarticle3_30points";
/// Articles claimable per session.
const READ_ARTICLE_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(default)]
    response: ApiResponse,
}

#[derive(Debug, Default, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    balance: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckInOutcome {
    Claimed { points: i64 },
    AlreadyDone,
}

#[derive(Debug, Clone, Default)]
pub struct ReadToEarnOutcome {
    pub articles_claimed: u32,
    pub points: i64,
    pub already_done: bool,
}

pub struct RewardsApiClient {
    client: reqwest::Client,
    base: String,
    rng: SecureRng,
}

impl Default for RewardsApiClient {
    fn default() -> Self {
        Self::new(DEFAULT_BASE)
    }
}

impl RewardsApiClient {
    pub fn new(base: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self { client, base: base.into(), rng: SecureRng::new() }
    }

    pub async fn balance(&self, token: &str) -> Result<i64> {
        let url = format!("{}/dapi/me?channel=SAAndroid", self.base);
        let envelope: ApiEnvelope = self.get(&url, token).await?;
        Ok(envelope.response.balance)
    }

    /// Daily check-in. One claim per local day; the API signals "already
    /// claimed" by leaving the balance alone.
    pub async fn daily_check_in(&self, token: &str, geo: &str) -> Result<CheckInOutcome> {
        let before = self.balance(token).await?;
        let payload = checkin_payload(geo, &self.rng.token());
        let after = self.post_activity(token, &payload).await?;

        if after > before {
            info!(points = after - before, "daily check-in claimed");
            Ok(CheckInOutcome::Claimed { points: after - before })
        } else {
            debug!("daily check-in already claimed today");
            Ok(CheckInOutcome::AlreadyDone)
        }
    }

    /// Claim read-to-earn articles until the bound, the daily cap, or an
    /// unchanged balance.
    pub async fn read_to_earn(
        &self,
        token: &str,
        geo: &str,
        delay: &DelayWindow,
    ) -> Result<ReadToEarnOutcome> {
        let mut outcome = ReadToEarnOutcome::default();
        let mut balance = self.balance(token).await?;

        for article in 0..READ_ARTICLE_LIMIT {
            let payload = read_payload(geo, &self.rng.token());
            let after = self.post_activity(token, &payload).await?;

            if after <= balance {
                outcome.already_done = article == 0;
                debug!(articles = outcome.articles_claimed, "read-to-earn cap reached");
                break;
            }
            outcome.articles_claimed += 1;
            outcome.points += after - balance;
            balance = after;

            tokio::time::sleep(self.rng.dwell(delay.min, delay.max)).await;
        }
        info!(
            articles = outcome.articles_claimed,
            points = outcome.points,
            "read-to-earn finished"
        );
        Ok(outcome)
    }

    async fn post_activity(&self, token: &str, payload: &serde_json::Value) -> Result<i64> {
        let url = format!("{}/dapi/me/activities", self.base);
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ActivityError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        let envelope: ApiEnvelope = response.json().await?;
        Ok(envelope.response.balance)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: &str, token: &str) -> Result<T> {
        let response = self.client.get(url).bearer_auth(token).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ActivityError::Api {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }
        Ok(response.json().await?)
    }
}

fn checkin_payload(geo: &str, id: &str) -> serde_json::Value {
    json!({
        "amount": 1,
        "country": geo,
        "id": id,
        "type": 101,
        "attributes": { "offerid": CHECKIN_OFFER }
    })
}

fn read_payload(geo: &str, id: &str) -> serde_json::Value {
    json!({
        "amount": 1,
        "country": geo,
        "id": id,
        "type": 101,
        "attributes": { "offerid": READ_OFFER }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkin_payload_carries_offer_and_geo() {
        let payload = checkin_payload("de", "abc123");
        assert_eq!(payload["attributes"]["offerid"], CHECKIN_OFFER);
        assert_eq!(payload["country"], "de");
        assert_eq!(payload["id"], "abc123");
        assert_eq!(payload["type"], 101);
    }

    #[test]
    fn read_payload_uses_read_offer() {
        let payload = read_payload("us", "xyz");
        assert_eq!(payload["attributes"]["offerid"], READ_OFFER);
    }

    #[test]
    fn envelope_parses_balance() {
        let envelope: ApiEnvelope =
            serde_json::from_str(r#"{"response": {"balance": 1234, "extra": true}}"#).unwrap();
        assert_eq!(envelope.response.balance, 1234);
    }

    #[test]
    fn envelope_tolerates_missing_response() {
        let envelope: ApiEnvelope = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(envelope.response.balance, 0);
    }

    #[tokio::test]
    async fn unreachable_api_is_an_http_error() {
        let client = RewardsApiClient::new("http://127.0.0.1:1");
        let err = client.balance("token").await.unwrap_err();
        assert!(matches!(err, ActivityError::Http(_)));
    }
}
