//! Trending-topic sourcing with an hourly cache per locale. The trends
//! endpoint prefixes its JSON with a `)]}'` guard line that has to be
//! cut before parsing.

use serde::Deserialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const CACHE_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct TrendsEnvelope {
    #[serde(rename = "default")]
    default: TrendsDays,
}

#[derive(Debug, Deserialize)]
struct TrendsDays {
    #[serde(rename = "trendingSearchesDays", default)]
    days: Vec<TrendsDay>,
}

#[derive(Debug, Deserialize)]
struct TrendsDay {
    #[serde(rename = "trendingSearches", default)]
    searches: Vec<TrendingSearch>,
}

#[derive(Debug, Deserialize)]
struct TrendingSearch {
    title: TrendTitle,
    #[serde(rename = "relatedQueries", default)]
    related: Vec<TrendTitle>,
}

#[derive(Debug, Deserialize)]
struct TrendTitle {
    query: String,
}

pub struct TrendsClient {
    client: reqwest::Client,
    endpoint: String,
    cache: Mutex<HashMap<String, (Instant, Vec<String>)>>,
}

impl Default for TrendsClient {
    fn default() -> Self {
        Self::new("https://trends.google.com/trends/api/dailytrends")
    }
}

impl TrendsClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, endpoint: endpoint.into(), cache: Mutex::new(HashMap::new()) }
    }

    /// Trending queries for a locale like `de-DE`. Empty on failure; the
    /// query pool falls back to its lexicon.
    pub async fn fetch(&self, locale: &str) -> Vec<String> {
        let geo = locale.split('-').nth(1).unwrap_or("US").to_uppercase();

        {
            let cache = self.cache.lock().await;
            if let Some((at, entries)) = cache.get(&geo) {
                if at.elapsed() < CACHE_TTL {
                    return entries.clone();
                }
            }
        }

        let queries = match self.fetch_remote(&geo, locale).await {
            Ok(queries) => queries,
            Err(err) => {
                warn!(%err, %geo, "trends fetch failed");
                // Serve a stale entry when one exists.
                let cache = self.cache.lock().await;
                return cache.get(&geo).map(|(_, e)| e.clone()).unwrap_or_default();
            }
        };

        debug!(count = queries.len(), %geo, "trends refreshed");
        self.cache.lock().await.insert(geo, (Instant::now(), queries.clone()));
        queries
    }

    async fn fetch_remote(&self, geo: &str, locale: &str) -> std::result::Result<Vec<String>, String> {
        let url = format!("{}?hl={}&geo={}&ns=15", self.endpoint, locale, geo);
        let body = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .text()
            .await
            .map_err(|e| e.to_string())?;

        parse_trends_body(&body).ok_or_else(|| "unparseable trends payload".to_string())
    }
}

/// Strip the anti-hijacking prefix and pull out every query string.
pub(crate) fn parse_trends_body(body: &str) -> Option<Vec<String>> {
    let start = body.find('{')?;
    let envelope: TrendsEnvelope = serde_json::from_str(&body[start..]).ok()?;

    let mut queries = Vec::new();
    for day in &envelope.default.days {
        for search in &day.searches {
            queries.push(search.title.query.clone());
            for related in &search.related {
                queries.push(related.query.clone());
            }
        }
    }
    Some(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#")]}',
{"default":{"trendingSearchesDays":[{"trendingSearches":[
  {"title":{"query":"solar eclipse"},"relatedQueries":[{"query":"solar eclipse timing"}]},
  {"title":{"query":"transfer news"},"relatedQueries":[]}
]}]}}"#;

    #[test]
    fn parses_guarded_payload() {
        let queries = parse_trends_body(SAMPLE).unwrap();
        assert_eq!(queries, vec!["solar eclipse", "solar eclipse timing", "transfer news"]);
    }

    #[test]
    fn garbage_payload_is_none() {
        assert!(parse_trends_body("<!doctype html>").is_none());
    }

    #[tokio::test]
    async fn unreachable_endpoint_returns_empty() {
        let client = TrendsClient::new("http://127.0.0.1:1/trends");
        assert!(client.fetch("en-US").await.is_empty());
    }
}
