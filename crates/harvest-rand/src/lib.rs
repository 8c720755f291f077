//! Randomness for everything the automation does in front of a detector.
//!
//! All entropy comes from the operating system (`OsRng`). PRNG sequences
//! seeded from the clock are statistically distinguishable from human
//! input, which is exactly the signal this crate exists to avoid.

mod motion;
mod timing;

pub use motion::{MousePathOpts, PathPoint, Point};

use rand::rngs::OsRng;
use rand::seq::SliceRandom;
use rand::Rng;
use std::time::Duration;

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const TOKEN_LEN: usize = 8;

/// Cryptographic RNG plus the distribution helpers used by typing, mouse
/// movement and dwell timing. Cheap to construct; carries no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SecureRng;

impl SecureRng {
    pub fn new() -> Self {
        SecureRng
    }

    /// Uniform float in `[0, 1)`.
    pub fn uniform_float(&self) -> f64 {
        OsRng.gen::<f64>()
    }

    /// Uniform integer in `[a, b]` (inclusive).
    pub fn int_in(&self, a: i64, b: i64) -> i64 {
        if a >= b {
            return a;
        }
        OsRng.gen_range(a..=b)
    }

    /// Uniform float in `[a, b)`.
    pub fn float_in(&self, a: f64, b: f64) -> f64 {
        if a >= b {
            return a;
        }
        OsRng.gen_range(a..b)
    }

    /// True with probability `p`.
    pub fn chance(&self, p: f64) -> bool {
        self.uniform_float() < p
    }

    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut OsRng)
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        items.shuffle(&mut OsRng);
    }

    /// Short opaque token, base-36, ≥ 32 bits of entropy (8 chars ≈ 41 bits).
    pub fn token(&self) -> String {
        (0..TOKEN_LEN)
            .map(|_| {
                let idx = OsRng.gen_range(0..TOKEN_ALPHABET.len());
                TOKEN_ALPHABET[idx] as char
            })
            .collect()
    }

    /// Normal sample via Box–Muller.
    pub fn gaussian(&self, mean: f64, stddev: f64) -> f64 {
        let u1: f64 = self.float_in(f64::MIN_POSITIVE, 1.0);
        let u2: f64 = self.uniform_float();
        let mag = (-2.0 * u1.ln()).sqrt();
        mean + stddev * mag * (2.0 * std::f64::consts::PI * u2).cos()
    }

    /// Gaussian around `base` with an `outlier_prob` chance of a long tail
    /// at `base × uniform(1.5, 3.0)`. Clamped positive.
    pub fn human_variance(&self, base: f64, variance_fraction: f64, outlier_prob: f64) -> f64 {
        if self.chance(outlier_prob) {
            return base * self.float_in(1.5, 3.0);
        }
        self.gaussian(base, base * variance_fraction).max(base * 0.1)
    }

    /// Per-character typing delay. See `timing` for the distribution.
    pub fn typing_delay(&self, base_ms: f64) -> Duration {
        timing::typing_delay(self, base_ms)
    }

    /// A human-shaped dwell between two actions, uniform across the
    /// configured window with Gaussian shaping.
    pub fn dwell(&self, min: Duration, max: Duration) -> Duration {
        let min_ms = min.as_millis() as f64;
        let max_ms = max.as_millis() as f64;
        let mean = (min_ms + max_ms) / 2.0;
        let spread = (max_ms - min_ms).max(1.0) / 4.0;
        let ms = self.gaussian(mean, spread).clamp(min_ms, max_ms);
        Duration::from_millis(ms as u64)
    }

    /// Mouse movement from `start` to `end` as a jittered cubic Bézier.
    pub fn mouse_path(&self, start: Point, end: Point, opts: MousePathOpts) -> Vec<PathPoint> {
        motion::mouse_path(self, start, end, opts)
    }

    /// Scroll `delta` split into front-loaded, decaying inertia segments.
    pub fn scroll_path(&self, delta: i64) -> Vec<i64> {
        motion::scroll_path(self, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_float_in_unit_interval() {
        let rng = SecureRng::new();
        for _ in 0..1000 {
            let v = rng.uniform_float();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn int_in_is_inclusive_and_degenerate_safe() {
        let rng = SecureRng::new();
        for _ in 0..200 {
            let v = rng.int_in(3, 5);
            assert!((3..=5).contains(&v));
        }
        assert_eq!(rng.int_in(7, 7), 7);
        assert_eq!(rng.int_in(9, 2), 9);
    }

    #[test]
    fn token_is_base36_and_long_enough() {
        let rng = SecureRng::new();
        let t = rng.token();
        assert_eq!(t.len(), 8);
        assert!(t.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        // Two draws colliding would mean something is very wrong.
        assert_ne!(t, rng.token());
    }

    #[test]
    fn gaussian_centres_on_mean() {
        let rng = SecureRng::new();
        let n = 5000;
        let sum: f64 = (0..n).map(|_| rng.gaussian(100.0, 10.0)).sum();
        let mean = sum / n as f64;
        assert!((mean - 100.0).abs() < 2.0, "sample mean {mean} too far from 100");
    }

    #[test]
    fn human_variance_stays_positive() {
        let rng = SecureRng::new();
        for _ in 0..1000 {
            assert!(rng.human_variance(50.0, 0.4, 0.05) > 0.0);
        }
    }

    #[test]
    fn dwell_respects_window() {
        let rng = SecureRng::new();
        let min = Duration::from_millis(300);
        let max = Duration::from_millis(900);
        for _ in 0..200 {
            let d = rng.dwell(min, max);
            assert!(d >= min && d <= max);
        }
    }
}
