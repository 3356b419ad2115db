//! Junction handling: fusing two holes across the wall between them.
//!
//! When several holes sit inside one outline, the strokes meet at a
//! junction. The wall separating the two closest holes is itself a stroke;
//! removing it leaves one larger hole, and the process repeats.

use kurbo::Point;

use crate::geom::{nearest_on_segment, resample_by_step, signed_area};

use super::correspond::{Correspondence, LineFit};

/// The wall between holes `first` and `second` and the hole left after it.
#[derive(Debug, Clone)]
pub struct HoleWeld {
    pub first: usize,
    pub second: usize,
    /// Pairs across the wall, side A on the first hole.
    pub wall: Correspondence,
    /// Both holes joined around the removed wall.
    pub merged: Vec<Point>,
}

/// Nearest point of the closed ring to `p`.
#[derive(Debug, Clone, Copy)]
struct RingHit {
    /// Position along the ring: segment index plus the fraction along it.
    param: f64,
    segment: usize,
    point: Point,
    distance: f64,
}

fn nearest_on_ring(p: Point, ring: &[Point]) -> RingHit {
    let n = ring.len();
    let mut best = RingHit {
        param: 0.0,
        segment: 0,
        point: ring[0],
        distance: f64::INFINITY,
    };
    for j in 0..n {
        let (a, b) = (ring[j], ring[(j + 1) % n]);
        let q = nearest_on_segment(p, a, b);
        let d = p.distance(q);
        if d < best.distance {
            let len = a.distance(b);
            let t = if len > 1e-12 { a.distance(q) / len } else { 0.0 };
            best = RingHit {
                param: j as f64 + t,
                segment: j,
                point: q,
                distance: d,
            };
        }
    }
    best
}

/// Find the two closest holes and fuse them along their border.
///
/// Returns `None` when no pair of holes is separated by a wall thin enough
/// to be a stroke (half-width at most `delta_threshold`).
pub fn weld_closest_holes(holes: &[Vec<Point>], delta_threshold: f64, step: f64) -> Option<HoleWeld> {
    let sampled: Vec<Vec<Point>> = holes.iter().map(|h| resample_by_step(h, step, true)).collect();

    let mut closest: Option<(usize, usize, usize, f64)> = None;
    for i in 0..sampled.len() {
        for j in (i + 1)..sampled.len() {
            for (k, &p) in sampled[i].iter().enumerate() {
                let d = nearest_on_ring(p, &holes[j]).distance;
                if closest.map_or(true, |c| d < c.3) {
                    closest = Some((i, j, k, d));
                }
            }
        }
    }
    let (first, second, seed, min_dist) = closest?;
    if min_dist / 2.0 > delta_threshold {
        return None;
    }

    let h1 = &sampled[first];
    let mut h2 = holes[second].clone();
    if signed_area(&h2).signum() != signed_area(h1).signum() {
        h2.reverse();
    }
    let n = h1.len();
    let limit = (2.0 * delta_threshold).min(1.5 * min_dist.max(step));
    let near: Vec<RingHit> = h1.iter().map(|&p| nearest_on_ring(p, &h2)).collect();

    // Grow the border run around the closest sample.
    let mut back = 0;
    while back < n - 1 && near[(seed + n - back - 1) % n].distance <= limit {
        back += 1;
    }
    let mut fwd = 0;
    while back + fwd < n - 1 && near[(seed + fwd + 1) % n].distance <= limit {
        fwd += 1;
    }
    if back + fwd + 1 >= n - 1 {
        return None;
    }
    let a0 = (seed + n - back) % n;
    let a1 = (seed + fwd) % n;

    let fits: Vec<LineFit> = (0..=back + fwd)
        .map(|k| {
            let idx = (a0 + k) % n;
            let hit = near[idx];
            LineFit {
                deviation: hit.distance / 2.0,
                index_a: idx,
                index_b: hit.segment,
                point_a: h1[idx],
                point_b: hit.point,
            }
        })
        .collect();

    // The first hole from the run's end round to its start, then the
    // second hole from opposite the run's start round to opposite its end.
    let m = h2.len();
    let (s0, s1) = (near[a0].param, near[a1].param);
    let mut span = s1 - s0;
    if span <= 0.0 {
        span += m as f64;
    }
    let mut merged: Vec<Point> = (0..=n - back - fwd).map(|k| h1[(a1 + k) % n]).collect();
    merged.push(near[a0].point);
    let base = s0.floor();
    for v in 1..=m {
        let at = base + v as f64 - s0;
        if at > 1e-9 && at < span - 1e-9 {
            merged.push(h2[(base as usize + v) % m]);
        }
    }
    merged.push(near[a1].point);
    merged.dedup_by(|a, b| a.distance(*b) < 1e-9);

    Some(HoleWeld {
        first,
        second,
        wall: Correspondence { fits, cyclic: false },
        merged,
    })
}
