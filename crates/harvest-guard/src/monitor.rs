//! Per-session monitors the pipeline feeds as it navigates: HTML
//! responses, load events (throttled), console output, and an explicit
//! comprehensive check.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use harvest_browser::{NavigationInfo, Page};
use harvest_types::BanDetectionResult;

use crate::detector::{BanDetector, Signals};

const LOAD_CHECK_GAP: Duration = Duration::from_secs(5);

pub struct SessionMonitor {
    detector: Arc<BanDetector>,
    email: String,
    last_load_check: Mutex<Option<Instant>>,
}

impl SessionMonitor {
    pub fn new(detector: Arc<BanDetector>, email: impl Into<String>) -> Self {
        Self { detector, email: email.into(), last_load_check: Mutex::new(None) }
    }

    /// Response monitor: status, rate-limit headers and landing URL of a
    /// navigation (HTML documents only; subresources are not reported).
    pub async fn on_response(&self, nav: &NavigationInfo) -> BanDetectionResult {
        self.detector
            .assess(
                &self.email,
                Signals {
                    url: Some(&nav.url),
                    http: Some((nav.status, &nav.headers)),
                    ..Default::default()
                },
            )
            .await
    }

    /// Load monitor: page text scan, throttled to once per five seconds
    /// no matter how often the page fires load events.
    pub async fn on_load(&self, page: &dyn Page) -> Option<BanDetectionResult> {
        {
            let mut last = self.last_load_check.lock().await;
            if let Some(prev) = *last {
                if prev.elapsed() < LOAD_CHECK_GAP {
                    debug!("load check throttled");
                    return None;
                }
            }
            *last = Some(Instant::now());
        }

        let text = page.text().await.ok()?;
        Some(
            self.detector
                .assess(&self.email, Signals { page_text: Some(&text), ..Default::default() })
                .await,
        )
    }

    /// API-response monitor.
    pub async fn on_api_status(&self, status: u16) -> BanDetectionResult {
        self.detector
            .assess(&self.email, Signals { api_status: Some(status), ..Default::default() })
            .await
    }

    /// Everything at once: URL, text and any console output since the
    /// last drain. Invoked by the pipeline between work units.
    pub async fn comprehensive_check(&self, page: &dyn Page) -> BanDetectionResult {
        let url = page.current_url().await.unwrap_or_default();
        let text = page.text().await.unwrap_or_default();
        let console = page.drain_console().await.unwrap_or_default();
        self.detector
            .assess(
                &self.email,
                Signals {
                    url: Some(&url),
                    page_text: Some(&text),
                    console: &console,
                    ..Default::default()
                },
            )
            .await
    }
}
