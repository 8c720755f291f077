//! Global request pacing. Real browsers do not fire dozens of subresource
//! requests with zero inter-arrival time; a small global gap with jitter
//! smears the burst. Critical resources are never delayed.

use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use harvest_rand::SecureRng;

use crate::headers::RequestKind;

const MIN_GAP: Duration = Duration::from_millis(10);
const MAX_JITTER_MS: i64 = 5;

pub struct Throttle {
    last_release: Mutex<Option<Instant>>,
    rng: SecureRng,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new()
    }
}

impl Throttle {
    pub fn new() -> Self {
        Self { last_release: Mutex::new(None), rng: SecureRng::new() }
    }

    /// Wait until this request may proceed. Returns immediately for
    /// critical kinds and pass-through kinds.
    pub async fn acquire(&self, kind: RequestKind) {
        if kind.is_critical() || kind.is_passthrough() {
            return;
        }

        let wait = {
            let mut last = self.last_release.lock().await;
            let now = Instant::now();
            let gap = MIN_GAP + Duration::from_millis(self.rng.int_in(0, MAX_JITTER_MS) as u64);
            let release_at = match *last {
                Some(prev) if prev + gap > now => prev + gap,
                _ => now,
            };
            *last = Some(release_at);
            release_at.saturating_duration_since(now)
        };

        if !wait.is_zero() {
            sleep(wait).await;
        }
    }
}
