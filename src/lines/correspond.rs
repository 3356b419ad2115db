//! Pointwise correspondence between the two sides of a traced stroke.
//!
//! Both sides are sampled by arc length. Every rotational offset is tried;
//! the one with the smallest mean half-distance wins, near-ties going to the
//! offset whose split points sit most symmetrically between bends. Each pair
//! is then snapped to the nearest point of side B inside a bounded window.

use kurbo::{Point, Vec2};

use crate::geom::{self, angle_between, nearest_on_segment, resample, resample_by_step, signed_area};

/// Samples searched on either side when snapping a pair to side B.
pub const REFINE_WINDOW: usize = 20;

/// Relative slack under which two offsets count as tied.
const TIE_TOLERANCE: f64 = 1e-3;

/// Turning angle (radians) above which a sample is a bend.
const BEND_ANGLE: f64 = 0.6;

/// Samples on either side used to measure the turning angle.
const BEND_STENCIL: usize = 3;

/// How far (in samples) a split point looks for bends.
const BEND_NEIGHBOURHOOD: usize = 8;

/// Largest |cos| between side A's tangent and a snapped pair.
const MAX_SNAP_COS: f64 = 0.3;

/// One pair of corresponding boundary points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineFit {
    /// Half the distance between the two points.
    pub deviation: f64,
    pub index_a: usize,
    pub index_b: usize,
    pub point_a: Point,
    pub point_b: Point,
}

impl LineFit {
    pub fn midpoint(&self) -> Point {
        self.point_a.midpoint(self.point_b)
    }
}

/// Ordered pairs between two sides. `cyclic` pairs wrap around (a ring).
#[derive(Debug, Clone)]
pub struct Correspondence {
    pub fits: Vec<LineFit>,
    pub cyclic: bool,
}

impl Correspondence {
    pub fn len(&self) -> usize {
        self.fits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fits.is_empty()
    }

    pub fn deviations(&self) -> Vec<f64> {
        self.fits.iter().map(|f| f.deviation).collect()
    }

    pub fn mean_variance(&self) -> (f64, f64) {
        geom::mean_variance(&self.deviations())
    }

    pub fn centerline(&self) -> Vec<Point> {
        self.fits.iter().map(LineFit::midpoint).collect()
    }

    /// Cumulative centerline arc length at every pair.
    pub fn arc_lengths(&self) -> Vec<f64> {
        let mid = self.centerline();
        let mut acc = 0.0;
        let mut out = Vec::with_capacity(mid.len());
        for (i, p) in mid.iter().enumerate() {
            if i > 0 {
                acc += mid[i - 1].distance(*p);
            }
            out.push(acc);
        }
        out
    }

    /// The pairs rotated so that pair `start` comes first; no longer cyclic.
    pub fn rotated(&self, start: usize) -> Correspondence {
        let n = self.fits.len();
        let fits = (0..n).map(|i| self.fits[(start + i) % n]).collect();
        Correspondence { fits, cyclic: false }
    }

    /// Closed boundary of the pairs `range`: side A forward, side B back.
    pub fn sub_loop(&self, start: usize, end: usize) -> Vec<Point> {
        let slice = &self.fits[start..=end];
        slice
            .iter()
            .map(|f| f.point_a)
            .chain(slice.iter().rev().map(|f| f.point_b))
            .collect()
    }
}

/// Split a single loop into two sides and pair them.
pub fn split_loop(ring: &[Point], step: f64) -> Option<Correspondence> {
    let samples = resample_by_step(ring, step, true);
    let n = samples.len();
    if n < 4 {
        return None;
    }
    let h = n / 2;
    let count = h.max(n - h) + 1;
    let sides = |k: usize| -> (Vec<Point>, Vec<Point>) {
        let a: Vec<Point> = (0..=h).map(|i| samples[(k + i) % n]).collect();
        let b: Vec<Point> = (0..=n - h).map(|i| samples[(k + n - i) % n]).collect();
        (resample(&a, count, false), resample(&b, count, false))
    };

    let means: Vec<f64> = (0..n)
        .map(|k| {
            let (a, b) = sides(k);
            mean_half_distance(a.iter().copied().zip(b.iter().copied()))
        })
        .collect();
    let bends = bend_indices(&samples);
    let best = pick_offset(&means, |k| bend_asymmetry(&bends, k, n) + bend_asymmetry(&bends, (k + h) % n, n))?;

    let (a, b) = sides(best);
    let fits = (0..count)
        .map(|i| {
            let lo = i.saturating_sub(REFINE_WINDOW);
            let hi = (i + REFINE_WINDOW).min(count - 1);
            let tangent = a[(i + 1).min(count - 1)] - a[i.saturating_sub(1)];
            snap(a[i], i, tangent, (i, b[i]), &b, lo..hi, false)
        })
        .collect();
    Some(Correspondence { fits, cyclic: false })
}

/// Pair an outer ring with the single hole inside it.
pub fn pair_rings(outer: &[Point], inner: &[Point], step: f64) -> Option<Correspondence> {
    let a = resample_by_step(outer, step, true);
    let n = a.len();
    if n < 3 || inner.len() < 3 {
        return None;
    }
    let mut inner = inner.to_vec();
    if signed_area(&inner).signum() != signed_area(outer).signum() {
        inner.reverse();
    }
    let b = resample(&inner, n, true);

    let means: Vec<f64> = (0..n)
        .map(|k| mean_half_distance((0..n).map(|i| (a[i], b[(i + k) % n]))))
        .collect();
    let bends = bend_indices(&b);
    let best = pick_offset(&means, |k| bend_asymmetry(&bends, k, n))?;

    let window = REFINE_WINDOW.min(n / 2);
    let fits = (0..n)
        .map(|i| {
            let centre = i + best + n;
            let tangent = a[(i + 1) % n] - a[(i + n - 1) % n];
            let partner = (centre % n, b[centre % n]);
            snap(a[i], i, tangent, partner, &b, centre - window..centre + window, true)
        })
        .collect();
    Some(Correspondence { fits, cyclic: true })
}

fn mean_half_distance(pairs: impl Iterator<Item = (Point, Point)>) -> f64 {
    let (sum, count) = pairs.fold((0.0, 0usize), |(s, c), (p, q)| (s + p.distance(q) / 2.0, c + 1));
    if count == 0 {
        f64::INFINITY
    } else {
        sum / count as f64
    }
}

/// Lowest mean; near-ties decided by the smallest `tie_break` score.
fn pick_offset(means: &[f64], tie_break: impl Fn(usize) -> f64) -> Option<usize> {
    let min = means.iter().copied().fold(f64::INFINITY, f64::min);
    if !min.is_finite() {
        return None;
    }
    let limit = min * (1.0 + TIE_TOLERANCE) + 1e-9;
    (0..means.len())
        .filter(|&k| means[k] <= limit)
        .min_by(|&x, &y| tie_break(x).total_cmp(&tie_break(y)).then(x.cmp(&y)))
}

/// Snap `p` (pair `i`) to the nearest point of `side` over the segments
/// starting in `window` (indices taken modulo the side length when cyclic).
///
/// A snap that leans along the tangent of side A rather than across it
/// would pull the pair towards a cap; the index partner is kept instead.
fn snap(
    p: Point,
    i: usize,
    tangent: Vec2,
    partner: (usize, Point),
    side: &[Point],
    window: std::ops::Range<usize>,
    cyclic: bool,
) -> LineFit {
    let n = side.len();
    let mut best = (f64::INFINITY, partner.0, partner.1);
    for j in window.clone().chain(std::iter::once(window.end)) {
        let (j0, j1) = if cyclic {
            (j % n, (j + 1) % n)
        } else if j + 1 < n {
            (j, j + 1)
        } else {
            (n - 1, n - 1)
        };
        let q = nearest_on_segment(p, side[j0], side[j1]);
        let d = p.distance(q);
        if d < best.0 {
            best = (d, j0, q);
        }
    }

    let across = best.2 - p;
    let leaning = tangent.hypot() > 1e-12
        && across.hypot() > 1e-12
        && (tangent.dot(across) / (tangent.hypot() * across.hypot())).abs() > MAX_SNAP_COS;
    let (index_b, point_b) = if leaning { partner } else { (best.1, best.2) };
    LineFit {
        deviation: p.distance(point_b) / 2.0,
        index_a: i,
        index_b,
        point_a: p,
        point_b,
    }
}

/// Samples where the outline turns sharply.
fn bend_indices(samples: &[Point]) -> Vec<usize> {
    let n = samples.len();
    if n <= 2 * BEND_STENCIL {
        return Vec::new();
    }
    (0..n)
        .filter(|&i| {
            let before = samples[i] - samples[(i + n - BEND_STENCIL) % n];
            let after = samples[(i + BEND_STENCIL) % n] - samples[i];
            angle_between(before, after) > BEND_ANGLE
        })
        .collect()
}

/// How unevenly the nearest bends sit before and after sample `k`.
fn bend_asymmetry(bends: &[usize], k: usize, n: usize) -> f64 {
    let before = bends
        .iter()
        .map(|&b| (k + n - b) % n)
        .filter(|&d| d <= BEND_NEIGHBOURHOOD)
        .min()
        .unwrap_or(BEND_NEIGHBOURHOOD);
    let after = bends
        .iter()
        .map(|&b| (b + n - k) % n)
        .filter(|&d| d <= BEND_NEIGHBOURHOOD)
        .min()
        .unwrap_or(BEND_NEIGHBOURHOOD);
    before.abs_diff(after) as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + w, y),
            Point::new(x + w, y + h),
            Point::new(x, y + h),
        ]
    }

    #[test]
    fn thin_rectangle_splits_along_its_length() {
        let corr = split_loop(&rect(0.0, 0.0, 40.0, 4.0), 1.0).unwrap();
        let deviations = corr.deviations();
        assert!((geom::median(&deviations) - 2.0).abs() < 0.1);
        let centre = corr.centerline();
        let xs: Vec<f64> = centre.iter().map(|p| p.x).collect();
        let span = xs.iter().copied().fold(f64::MIN, f64::max) - xs.iter().copied().fold(f64::MAX, f64::min);
        assert!((span - 40.0).abs() < 2.5);
        assert!(centre.iter().all(|p| (p.y - 2.0).abs() < 1.0));
    }

    #[test]
    fn ring_pairs_are_half_the_wall_apart() {
        let outer = rect(0.0, 0.0, 30.0, 30.0);
        let mut inner = rect(4.0, 4.0, 22.0, 22.0);
        inner.reverse();
        let corr = pair_rings(&outer, &inner, 1.0).unwrap();
        assert!(corr.cyclic);
        assert!((geom::median(&corr.deviations()) - 2.0).abs() < 0.1);
        let (mean, _) = corr.mean_variance();
        assert!(mean < 2.5);
    }

    #[test]
    fn sub_loop_walks_a_then_b_back() {
        let corr = split_loop(&rect(0.0, 0.0, 20.0, 4.0), 1.0).unwrap();
        let ring = corr.sub_loop(3, 6);
        assert_eq!(ring.len(), 8);
        assert_eq!(ring[0], corr.fits[3].point_a);
        assert_eq!(ring[7], corr.fits[3].point_b);
    }

    #[test]
    fn tied_offsets_prefer_symmetric_bends() {
        let means = vec![1.0, 1.0, 2.0];
        assert_eq!(pick_offset(&means, |k| if k == 1 { 0.0 } else { 1.0 }), Some(1));
        assert_eq!(pick_offset(&[], |_| 0.0), None);
    }
}
