//! Latest stable Edge major version, fetched with caching and a static
//! fallback. The fingerprint must name a version that actually exists in
//! the wild; a years-stale hardcoded number is a fingerprint of its own.

use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

const ENDPOINT: &str = "https://edgeupdates.microsoft.com/api/products?view=enterprise";
const STATIC_FALLBACK: u32 = 126;
const TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Deserialize)]
struct Product {
    #[serde(rename = "Product")]
    product: String,
    #[serde(rename = "Releases", default)]
    releases: Vec<Release>,
}

#[derive(Debug, Deserialize)]
struct Release {
    #[serde(rename = "ProductVersion", default)]
    product_version: String,
}

struct CacheState {
    value: Option<u32>,
    fetched_at: Option<Instant>,
}

/// Single-flight, time-bounded cache. Concurrent callers during a fetch
/// wait on the same mutex and then reuse the fresh entry; on fetch
/// failure a stale entry is served before the static fallback.
pub struct EdgeVersionCache {
    client: reqwest::Client,
    endpoint: String,
    state: Mutex<CacheState>,
}

impl Default for EdgeVersionCache {
    fn default() -> Self {
        Self::new(ENDPOINT)
    }
}

impl EdgeVersionCache {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
            state: Mutex::new(CacheState { value: None, fetched_at: None }),
        }
    }

    /// Current stable major version. Never fails; degrades to a stale
    /// entry, then to the static fallback.
    pub async fn get(&self) -> u32 {
        let mut state = self.state.lock().await;
        if let (Some(value), Some(at)) = (state.value, state.fetched_at) {
            if at.elapsed() < TTL {
                return value;
            }
        }

        match self.fetch().await {
            Ok(version) => {
                debug!(version, "refreshed stable edge version");
                state.value = Some(version);
                state.fetched_at = Some(Instant::now());
                version
            }
            Err(err) => {
                let fallback = state.value.unwrap_or(STATIC_FALLBACK);
                warn!(%err, fallback, "edge version fetch failed, serving fallback");
                // Push the retry out a full TTL so a dead endpoint is not
                // hammered once per session.
                state.fetched_at = Some(Instant::now());
                state.value = Some(fallback);
                fallback
            }
        }
    }

    async fn fetch(&self) -> std::result::Result<u32, String> {
        let products: Vec<Product> = self
            .client
            .get(&self.endpoint)
            .send()
            .await
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?
            .json()
            .await
            .map_err(|e| e.to_string())?;

        products
            .iter()
            .find(|p| p.product == "Stable")
            .and_then(|p| p.releases.first())
            .and_then(|r| r.product_version.split('.').next())
            .and_then(|major| major.parse().ok())
            .ok_or_else(|| "no stable release in response".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_endpoint_serves_static_fallback() {
        let cache = EdgeVersionCache::new("http://127.0.0.1:1/api");
        assert_eq!(cache.get().await, STATIC_FALLBACK);
    }

    #[tokio::test]
    async fn failure_result_is_cached_for_ttl() {
        let cache = EdgeVersionCache::new("http://127.0.0.1:1/api");
        let first = cache.get().await;
        // Second call must not hit the network again within the TTL; it
        // would otherwise block for the full connect timeout.
        let started = Instant::now();
        let second = cache.get().await;
        assert_eq!(first, second);
        assert!(started.elapsed() < Duration::from_millis(200));
    }
}
