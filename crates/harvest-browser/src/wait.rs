//! Smart waits: a short poll extended once. Fixed long sleeps are
//! forbidden anywhere a condition can be observed instead.

use std::time::Duration;
use tokio::time::{sleep, Instant};

use crate::driver::Page;
use crate::error::Result;

const POLL_SHORT: Duration = Duration::from_millis(100);
const POLL_LONG: Duration = Duration::from_millis(250);

/// Poll for `selector` within `initial`; if it has not appeared, extend
/// once by `extended`. Returns whether the element became visible.
pub async fn smart_wait(
    page: &dyn Page,
    selector: &str,
    initial: Duration,
    extended: Duration,
) -> Result<bool> {
    if poll(page, selector, initial, POLL_SHORT).await? {
        return Ok(true);
    }
    poll(page, selector, extended, POLL_LONG).await
}

/// Smart wait with the defaults used across login and activities:
/// ~1.5 s initial window, ~4 s extension.
pub async fn smart_wait_default(page: &dyn Page, selector: &str) -> Result<bool> {
    smart_wait(page, selector, Duration::from_millis(1500), Duration::from_secs(4)).await
}

async fn poll(
    page: &dyn Page,
    selector: &str,
    window: Duration,
    interval: Duration,
) -> Result<bool> {
    let deadline = Instant::now() + window;
    loop {
        if page.is_visible(selector).await? {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        sleep(interval).await;
    }
}

/// Poll an arbitrary condition with the same short-then-extended shape.
pub async fn smart_wait_for<F, Fut>(
    mut probe: F,
    initial: Duration,
    extended: Duration,
) -> Result<bool>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    for (window, interval) in [(initial, POLL_SHORT), (extended, POLL_LONG)] {
        let deadline = Instant::now() + window;
        loop {
            if probe().await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                break;
            }
            sleep(interval).await;
        }
    }
    Ok(false)
}
