//! Human-looking pointer paths: a cubic Bézier with a small random bow,
//! traversed with smoothstep easing.

use rand::Rng;
use screenloop_core::Point;

/// Shorter moves jump straight to the target.
const DIRECT_MOVE_PX: f64 = 5.0;

/// Waypoints from `from` (exclusive) to `to` (inclusive). The last point is
/// always exactly `to`.
pub fn human_path<R: Rng + ?Sized>(
    from: Point,
    to: Point,
    duration_ms: u64,
    rng: &mut R,
) -> Vec<Point> {
    let (x0, y0) = (from.x as f64, from.y as f64);
    let (x3, y3) = (to.x as f64, to.y as f64);
    let (dx, dy) = (x3 - x0, y3 - y0);
    let dist = dx.hypot(dy);
    if dist < DIRECT_MOVE_PX {
        return vec![to];
    }

    // The bow shrinks relative to distance on long moves.
    let bow = (20.0 / dist).min(0.1);
    let px = -dy * bow * rng.gen_range(-1.0..=1.0);
    let py = dx * bow * rng.gen_range(-1.0..=1.0);

    let (x1, y1) = (x0 + dx * 0.33 + px, y0 + dy * 0.33 + py);
    let (x2, y2) = (x0 + dx * 0.67 + px * 0.5, y0 + dy * 0.67 + py * 0.5);

    let steps = (duration_ms / 10).max(10) as usize;
    let mut path: Vec<Point> = Vec::with_capacity(steps + 1);
    for i in 1..=steps {
        let t = i as f64 / steps as f64;
        let e = t * t * (3.0 - 2.0 * t);
        let p = Point::new(
            cubic(e, x0, x1, x2, x3).round() as i32,
            cubic(e, y0, y1, y2, y3).round() as i32,
        );
        if path.last() != Some(&p) {
            path.push(p);
        }
    }
    if path.last() != Some(&to) {
        path.push(to);
    }
    path
}

fn cubic(t: f64, p0: f64, p1: f64, p2: f64, p3: f64) -> f64 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}
