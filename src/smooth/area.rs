//! Exact even-odd area of a closed ring.
//!
//! The ring formed by a stair-step run and a candidate walked back to the
//! start encloses exactly the regions between the two. The polygon is
//! resolved by `geo`'s even-odd overlay, so every lobe of a crossing ring
//! counts once.

use geo::{Area, BooleanOps, Coord, LineString, MultiPolygon, Polygon};
use kurbo::Point;

/// Even-odd area enclosed by `ring` (closed implicitly). Degenerate rings
/// have no area.
pub fn even_odd_area(ring: &[Point]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let coords: Vec<Coord<f64>> = ring.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    let polygon = Polygon::new(LineString::from(coords), vec![]);
    // The overlay counts crossings itself; a union with nothing resolves them.
    polygon.union(&MultiPolygon::new(Vec::new())).unsigned_area()
}
