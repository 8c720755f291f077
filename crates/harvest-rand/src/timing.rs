use crate::SecureRng;
use std::time::Duration;

const TYPING_VARIANCE: f64 = 0.4;
const THINKING_PAUSE_PROB: f64 = 0.05;
const SKEW_PROB: f64 = 0.15;

/// Per-character keystroke delay: Gaussian around `base_ms` with 0.4
/// variance, a 5% chance of a 200–800 ms thinking pause, and a 15%
/// chance of a 1.2–1.8× slow keystroke.
pub(crate) fn typing_delay(rng: &SecureRng, base_ms: f64) -> Duration {
    let mut ms = rng.gaussian(base_ms, base_ms * TYPING_VARIANCE).max(base_ms * 0.2);

    if rng.chance(SKEW_PROB) {
        ms *= rng.float_in(1.2, 1.8);
    }
    if rng.chance(THINKING_PAUSE_PROB) {
        ms += rng.float_in(200.0, 800.0);
    }

    Duration::from_millis(ms as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_delay_never_collapses_to_zero() {
        let rng = SecureRng::new();
        for _ in 0..1000 {
            assert!(typing_delay(&rng, 80.0) >= Duration::from_millis(16));
        }
    }

    #[test]
    fn typing_delay_occasionally_pauses() {
        let rng = SecureRng::new();
        let long = (0..2000)
            .filter(|_| typing_delay(&rng, 80.0) > Duration::from_millis(250))
            .count();
        assert!(long > 0, "expected at least one thinking pause in 2000 keystrokes");
    }
}
