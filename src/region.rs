//! 2D area capability type backed by `geo` polygons.
//!
//! Clipping itself is delegated to `geo`'s boolean operations; this type
//! only adapts it to traced paths and pixel blocks.

use geo::{Area, BooleanOps, BoundingRect, Contains, Coord, LineString, MultiPolygon, Polygon};
use kurbo::{Point, Rect};

use crate::geom;
use crate::path::{TracePath, WindingRule};

/// Relative area slack when classifying a rectangle against a region.
const AREA_EPSILON: f64 = 1e-6;

/// Curve flattening tolerance when a path becomes a region.
const FLATTEN_TOLERANCE: f64 = 1e-3;

/// An area in the plane: possibly disjoint, possibly with holes.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    shape: MultiPolygon<f64>,
}

impl Default for Region {
    fn default() -> Self {
        Self::empty()
    }
}

impl Region {
    pub fn empty() -> Self {
        Self {
            shape: MultiPolygon::new(Vec::new()),
        }
    }

    pub fn from_rect(rect: Rect) -> Self {
        let r = geo::Rect::new(
            Coord { x: rect.x0, y: rect.y0 },
            Coord { x: rect.x1, y: rect.y1 },
        );
        Self {
            shape: MultiPolygon::new(vec![r.to_polygon()]),
        }
    }

    /// A simple polygon through `points` (closed implicitly).
    pub fn from_polygon(points: &[Point]) -> Self {
        if points.len() < 3 {
            return Self::empty();
        }
        Self {
            shape: MultiPolygon::new(vec![ring_polygon(points)]),
        }
    }

    /// The area a path encloses under its own winding rule.
    ///
    /// Even-odd paths toggle every loop; non-zero paths add loops winding
    /// like the net area and cut out loops winding against it.
    pub fn from_path(path: &TracePath) -> Self {
        let mut loops = path.loops(FLATTEN_TOLERANCE);
        let net = loops.iter().map(|l| geom::signed_area(l)).sum::<f64>().signum();
        // Containers before the loops nested in them.
        loops.sort_by(|a, b| geom::signed_area(b).abs().total_cmp(&geom::signed_area(a).abs()));
        let mut region = Region::empty();
        for ring in loops.iter().filter(|l| l.len() >= 3) {
            let piece = Region::from_polygon(ring);
            region = match path.winding {
                WindingRule::EvenOdd => region.xor(&piece),
                WindingRule::NonZero => {
                    if geom::signed_area(ring).signum() == net {
                        region.union(&piece)
                    } else {
                        region.subtract(&piece)
                    }
                }
            };
        }
        region
    }

    pub fn union(&self, other: &Region) -> Region {
        Region {
            shape: self.shape.union(&other.shape),
        }
    }

    pub fn intersect(&self, other: &Region) -> Region {
        Region {
            shape: self.shape.intersection(&other.shape),
        }
    }

    pub fn subtract(&self, other: &Region) -> Region {
        Region {
            shape: self.shape.difference(&other.shape),
        }
    }

    pub fn xor(&self, other: &Region) -> Region {
        Region {
            shape: self.shape.xor(&other.shape),
        }
    }

    pub fn area(&self) -> f64 {
        self.shape.unsigned_area()
    }

    pub fn is_empty(&self) -> bool {
        self.area() <= AREA_EPSILON
    }

    pub fn contains_point(&self, p: Point) -> bool {
        self.shape.contains(&geo::Point::new(p.x, p.y))
    }

    /// Whether `rect` lies entirely inside the region.
    pub fn contains_rect(&self, rect: Rect) -> bool {
        let clipped = self.intersect(&Region::from_rect(rect)).area();
        clipped >= rect.area() * (1.0 - AREA_EPSILON)
    }

    /// Whether `rect` overlaps the region with non-zero area.
    pub fn intersects_rect(&self, rect: Rect) -> bool {
        self.intersect(&Region::from_rect(rect)).area() > rect.area() * AREA_EPSILON
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.shape
            .bounding_rect()
            .map(|r| Rect::new(r.min().x, r.min().y, r.max().x, r.max().y))
    }

    /// True when the region is one simple polygon without holes.
    pub fn is_singular(&self) -> bool {
        self.shape.0.len() == 1 && self.shape.0[0].interiors().is_empty()
    }

    /// Boundary as one even-odd path (exteriors and holes as loops).
    pub fn to_path(&self) -> TracePath {
        let mut segments = Vec::new();
        for polygon in &self.shape.0 {
            for ring in std::iter::once(polygon.exterior()).chain(polygon.interiors()) {
                let pts: Vec<Point> = ring.coords().map(|c| Point::new(c.x, c.y)).collect();
                let loop_path = TracePath::from_polyline(trim_closing(&pts), true);
                segments.extend_from_slice(loop_path.segments());
            }
        }
        let mut path = TracePath::new().with_style(WindingRule::EvenOdd, true, 1.0);
        // Every ring starts with a move, so the segment list is well formed.
        if path.set_segments(segments).is_err() {
            return TracePath::new();
        }
        path
    }
}

fn ring_polygon(points: &[Point]) -> Polygon<f64> {
    let coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    Polygon::new(LineString::from(coords), vec![])
}

fn trim_closing(points: &[Point]) -> &[Point] {
    match points {
        [first, .., last] if first == last => &points[..points.len() - 1],
        _ => points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rect_classification() {
        let region = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(region.contains_rect(Rect::new(2.0, 2.0, 4.0, 4.0)));
        assert!(!region.contains_rect(Rect::new(8.0, 8.0, 12.0, 12.0)));
        assert!(region.intersects_rect(Rect::new(8.0, 8.0, 12.0, 12.0)));
        assert!(!region.intersects_rect(Rect::new(20.0, 20.0, 24.0, 24.0)));
        assert!(region.contains_point(Point::new(5.0, 5.0)));
        assert!(!region.contains_point(Point::new(15.0, 5.0)));
    }

    #[test]
    fn subtract_makes_a_hole() {
        let outer = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0));
        let hole = Region::from_rect(Rect::new(3.0, 3.0, 6.0, 6.0));
        let donut = outer.subtract(&hole);
        assert!((donut.area() - 91.0).abs() < 1e-6);
        assert!(!donut.is_singular());
        assert!(outer.is_singular());
        assert_eq!(donut.bounds(), Some(Rect::new(0.0, 0.0, 10.0, 10.0)));
        assert!(!donut.contains_point(Point::new(4.5, 4.5)));
    }

    #[test]
    fn even_odd_path_region_matches_area() {
        let donut = Region::from_rect(Rect::new(0.0, 0.0, 10.0, 10.0))
            .subtract(&Region::from_rect(Rect::new(3.0, 3.0, 6.0, 6.0)));
        let path = donut.to_path();
        assert!(path.has_sub_paths());
        let back = Region::from_path(&path);
        assert!((back.area() - 91.0).abs() < 1e-6);
    }
}
