use crate::SecureRng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    fn distance(&self, other: &Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }
}

/// One sampled point of a mouse movement, with the time to spend getting
/// there and an optional pause on arrival.
#[derive(Debug, Clone, Copy)]
pub struct PathPoint {
    pub point: Point,
    pub duration_ms: u64,
    pub pause_ms: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct MousePathOpts {
    /// Chance of overshooting the target and correcting, applied only to
    /// movements longer than `overshoot_min_px`.
    pub overshoot_prob: f64,
    pub overshoot_min_px: f64,
    /// Per-point positional jitter in pixels.
    pub jitter_px: f64,
    /// Chance of a mid-movement micro-pause.
    pub micro_pause_prob: f64,
}

impl Default for MousePathOpts {
    fn default() -> Self {
        Self {
            overshoot_prob: 0.3,
            overshoot_min_px: 50.0,
            jitter_px: 1.5,
            micro_pause_prob: 0.05,
        }
    }
}

fn ease_in_out(t: f64) -> f64 {
    if t < 0.5 {
        2.0 * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
    }
}

fn cubic_bezier(p0: Point, p1: Point, p2: Point, p3: Point, t: f64) -> Point {
    let u = 1.0 - t;
    let x = u.powi(3) * p0.x
        + 3.0 * u.powi(2) * t * p1.x
        + 3.0 * u * t.powi(2) * p2.x
        + t.powi(3) * p3.x;
    let y = u.powi(3) * p0.y
        + 3.0 * u.powi(2) * t * p1.y
        + 3.0 * u * t.powi(2) * p2.y
        + t.powi(3) * p3.y;
    Point::new(x, y)
}

fn curve(rng: &SecureRng, start: Point, end: Point, opts: &MousePathOpts, steps: usize) -> Vec<PathPoint> {
    let distance = start.distance(&end);
    let spread = (distance * 0.3).max(10.0);

    // Control points off the straight line make the curve look drawn by a wrist.
    let c1 = Point::new(
        start.x + (end.x - start.x) * rng.float_in(0.2, 0.4) + rng.float_in(-spread, spread),
        start.y + (end.y - start.y) * rng.float_in(0.2, 0.4) + rng.float_in(-spread, spread),
    );
    let c2 = Point::new(
        start.x + (end.x - start.x) * rng.float_in(0.6, 0.8) + rng.float_in(-spread, spread),
        start.y + (end.y - start.y) * rng.float_in(0.6, 0.8) + rng.float_in(-spread, spread),
    );

    let total_ms = (distance.sqrt() * rng.float_in(9.0, 14.0)).clamp(60.0, 900.0);
    let mut points = Vec::with_capacity(steps);
    let mut last_t = 0.0;

    for i in 1..=steps {
        let linear = i as f64 / steps as f64;
        let t = ease_in_out(linear);
        let mut p = cubic_bezier(start, c1, c2, end, t);
        if i < steps {
            p.x += rng.float_in(-opts.jitter_px, opts.jitter_px);
            p.y += rng.float_in(-opts.jitter_px, opts.jitter_px);
        }
        let segment_ms = ((t - last_t) * total_ms).max(1.0) as u64;
        last_t = t;

        let pause_ms = if i < steps && rng.chance(opts.micro_pause_prob) {
            rng.int_in(30, 120) as u64
        } else {
            0
        };

        points.push(PathPoint { point: p, duration_ms: segment_ms, pause_ms });
    }
    points
}

/// Cubic-Bézier mouse path with randomised control points, ease-in-out
/// pacing, per-point jitter, optional overshoot-and-correct, and rare
/// micro-pauses.
pub(crate) fn mouse_path(
    rng: &SecureRng,
    start: Point,
    end: Point,
    opts: MousePathOpts,
) -> Vec<PathPoint> {
    let distance = start.distance(&end);
    let steps = ((distance / 12.0).ceil() as usize).clamp(8, 60);

    let overshoots = distance > opts.overshoot_min_px && rng.chance(opts.overshoot_prob);
    if !overshoots {
        return curve(rng, start, end, &opts, steps);
    }

    // Shoot past the target along the travel direction, then settle back.
    let dx = end.x - start.x;
    let dy = end.y - start.y;
    let over = rng.float_in(0.04, 0.12);
    let miss = Point::new(end.x + dx * over, end.y + dy * over);

    let mut path = curve(rng, start, miss, &opts, steps);
    let correction_steps = (steps / 4).max(4);
    path.extend(curve(rng, miss, end, &opts, correction_steps));
    path
}

/// Scroll split into inertia segments: large at first, decaying toward
/// the end, summing exactly to `delta`.
pub(crate) fn scroll_path(rng: &SecureRng, delta: i64) -> Vec<i64> {
    if delta == 0 {
        return Vec::new();
    }
    let sign = delta.signum();
    let mut remaining = delta.abs();
    let mut segments = Vec::new();
    let mut step = (remaining as f64 * rng.float_in(0.3, 0.45)).max(1.0);

    while remaining > 0 {
        let chunk = (step as i64).clamp(1, remaining);
        segments.push(chunk * sign);
        remaining -= chunk;
        step = (step * rng.float_in(0.55, 0.75)).max(1.0);
    }
    segments
}
