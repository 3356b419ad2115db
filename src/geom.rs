//! Shared geometry utilities on point rings and polylines.

use kurbo::{Point, Vec2};

/// Signed area of a closed ring via the shoelace formula.
///
/// In image coordinates (y down) a positive area runs clockwise on screen.
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    (0..n)
        .map(|i| {
            let j = (i + 1) % n;
            points[i].x * points[j].y - points[j].x * points[i].y
        })
        .sum::<f64>()
        / 2.0
}

/// Ray-casting point-in-polygon test.
pub fn point_in_polygon(point: Point, polygon: &[Point]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = n - 1;
    for i in 0..n {
        let pi = polygon[i];
        let pj = polygon[j];
        if ((pi.y > point.y) != (pj.y > point.y))
            && (point.x < (pj.x - pi.x) * (point.y - pi.y) / (pj.y - pi.y) + pi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Whether `point` lies on one of the ring's edges (within `tolerance`).
pub fn on_ring_boundary(point: Point, ring: &[Point], tolerance: f64) -> bool {
    let n = ring.len();
    (0..n).any(|i| point_segment_distance(point, ring[i], ring[(i + 1) % n]) <= tolerance)
}

/// Distance from `p` to the segment `a`-`b`.
pub fn point_segment_distance(p: Point, a: Point, b: Point) -> f64 {
    p.distance(nearest_on_segment(p, a, b))
}

/// Closest point to `p` on the segment `a`-`b`.
pub fn nearest_on_segment(p: Point, a: Point, b: Point) -> Point {
    let ab = b - a;
    let len_sq = ab.hypot2();
    if len_sq < 1e-12 {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    a + ab * t
}

/// Smallest signed difference `b - a` between two angles, in (-pi, pi].
pub fn angle_diff(a: f64, b: f64) -> f64 {
    let mut d = (b - a) % std::f64::consts::TAU;
    if d > std::f64::consts::PI {
        d -= std::f64::consts::TAU;
    } else if d <= -std::f64::consts::PI {
        d += std::f64::consts::TAU;
    }
    d
}

/// Unsigned angle between two vectors, in radians [0, pi].
pub fn angle_between(a: Vec2, b: Vec2) -> f64 {
    a.cross(b).atan2(a.dot(b)).abs()
}

/// Total length of a polyline; `closed` adds the edge back to the start.
pub fn polyline_length(points: &[Point], closed: bool) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }
    let open: f64 = points.windows(2).map(|w| w[0].distance(w[1])).sum();
    if closed {
        open + points[points.len() - 1].distance(points[0])
    } else {
        open
    }
}

/// Resample a polyline into `count` points evenly spaced by arc length.
///
/// Closed rings are sampled around the full perimeter without repeating the
/// first point; open polylines keep both endpoints.
pub fn resample(points: &[Point], count: usize, closed: bool) -> Vec<Point> {
    if points.is_empty() || count == 0 {
        return Vec::new();
    }
    let total = polyline_length(points, closed);
    if points.len() == 1 || total < 1e-12 {
        return vec![points[0]; count];
    }

    let mut ring: Vec<Point> = points.to_vec();
    if closed {
        ring.push(points[0]);
    }
    let spacing = if closed {
        total / count as f64
    } else if count > 1 {
        total / (count - 1) as f64
    } else {
        total
    };

    let mut out = Vec::with_capacity(count);
    let mut seg = 0usize;
    let mut seg_start = 0.0;
    for k in 0..count {
        let target = spacing * k as f64;
        while seg + 1 < ring.len() - 1 && seg_start + ring[seg].distance(ring[seg + 1]) < target {
            seg_start += ring[seg].distance(ring[seg + 1]);
            seg += 1;
        }
        let a = ring[seg];
        let b = ring[seg + 1];
        let len = a.distance(b);
        let t = if len < 1e-12 {
            0.0
        } else {
            ((target - seg_start) / len).clamp(0.0, 1.0)
        };
        out.push(a.lerp(b, t));
    }
    out
}

/// Resample a ring so consecutive samples are about `step` apart.
pub fn resample_by_step(points: &[Point], step: f64, closed: bool) -> Vec<Point> {
    let total = polyline_length(points, closed);
    let count = ((total / step.max(1e-6)).round() as usize).max(if closed { 3 } else { 2 });
    resample(points, count, closed)
}

/// Median of a slice of finite values (0 for an empty slice).
pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Mean and population variance.
pub fn mean_variance(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f64) -> Vec<Point> {
        vec![
            Point::new(0.0, 0.0),
            Point::new(size, 0.0),
            Point::new(size, size),
            Point::new(0.0, size),
        ]
    }

    #[test]
    fn clockwise_on_screen_is_positive() {
        assert_eq!(signed_area(&square(2.0)), 4.0);
        let mut ccw = square(2.0);
        ccw.reverse();
        assert_eq!(signed_area(&ccw), -4.0);
    }

    #[test]
    fn resampled_square_lands_on_integer_steps() {
        let samples = resample_by_step(&square(4.0), 1.0, true);
        assert_eq!(samples.len(), 16);
        assert_eq!(samples[4], Point::new(4.0, 0.0));
        assert_eq!(samples[10], Point::new(2.0, 4.0));
    }

    #[test]
    fn angle_diff_wraps() {
        let d = angle_diff(3.1, -3.1);
        assert!(d > 0.0 && d < 0.1);
    }
}
