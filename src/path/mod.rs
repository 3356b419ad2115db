//! Path model: an owned segment sequence plus fill attributes.
//!
//! Segments are kurbo `PathEl`s. Start points are derived from the previous
//! segment; the only cached value is the winding direction, reset by every
//! mutating call.

mod segment;

use std::ops::Range;
use std::sync::OnceLock;

use kurbo::{BezPath, CubicBez, ParamCurveArclen, PathEl, Point, QuadBez, Rect};

use crate::error::TraceError;
use crate::geom;

pub use segment::{flatten_segment, Join, SegmentExt};

/// Extent given to a degenerate bounds axis so that straight axis-aligned
/// lines never report a zero-area box.
pub const DEGENERATE_EXTENT: f64 = 1.0;

/// Accuracy used when measuring curve arc lengths.
const ARCLEN_ACCURACY: f64 = 1e-3;

/// Fill rule used to decide interior for self-overlapping paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WindingRule {
    #[default]
    NonZero,
    EvenOdd,
}

/// Winding direction on screen (image coordinates, y down).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Clockwise,
    CounterClockwise,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Clockwise => Direction::CounterClockwise,
            Direction::CounterClockwise => Direction::Clockwise,
        }
    }
}

/// A traced vector path.
#[derive(Debug, Clone)]
pub struct TracePath {
    segments: Vec<PathEl>,
    pub winding: WindingRule,
    pub filled: bool,
    /// Stroke width, meaningful only when the path is not filled.
    pub line_width: f64,
    direction: OnceLock<Option<Direction>>,
}

impl Default for TracePath {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for TracePath {
    fn eq(&self, other: &Self) -> bool {
        self.segments == other.segments
            && self.winding == other.winding
            && self.filled == other.filled
            && self.line_width == other.line_width
    }
}

impl TracePath {
    /// An empty filled path with the non-zero rule.
    pub fn new() -> Self {
        Self {
            segments: Vec::new(),
            winding: WindingRule::NonZero,
            filled: true,
            line_width: 1.0,
            direction: OnceLock::new(),
        }
    }

    /// An empty path carrying the same fill attributes as `self`.
    pub fn styled_like(&self) -> Self {
        Self {
            segments: Vec::new(),
            winding: self.winding,
            filled: self.filled,
            line_width: self.line_width,
            direction: OnceLock::new(),
        }
    }

    /// Build from raw segments, checking that the first one is a move.
    pub fn from_segments(segments: Vec<PathEl>) -> Result<Self, TraceError> {
        if let Some(first) = segments.first() {
            if !matches!(first, PathEl::MoveTo(_)) {
                return Err(TraceError::invariant(format!(
                    "path starts with {first:?} instead of a move"
                )));
            }
        }
        let mut path = Self::new();
        path.segments = segments;
        Ok(path)
    }

    /// A polyline through `points`, closed with a `ClosePath` when asked.
    pub fn from_polyline(points: &[Point], closed: bool) -> Self {
        let mut path = Self::new();
        if let Some((&first, rest)) = points.split_first() {
            path.segments.push(PathEl::MoveTo(first));
            path.segments.extend(rest.iter().map(|&p| PathEl::LineTo(p)));
            if closed {
                path.segments.push(PathEl::ClosePath);
            }
        }
        path
    }

    pub fn from_bezpath(bez: &BezPath) -> Result<Self, TraceError> {
        Self::from_segments(bez.elements().to_vec())
    }

    pub fn to_bezpath(&self) -> BezPath {
        BezPath::from_vec(self.segments.clone())
    }

    pub fn with_style(mut self, winding: WindingRule, filled: bool, line_width: f64) -> Self {
        self.winding = winding;
        self.filled = filled;
        self.line_width = line_width;
        self
    }

    pub fn segments(&self) -> &[PathEl] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment. A drawing segment or close needs a preceding move.
    pub fn push(&mut self, el: PathEl) -> Result<(), TraceError> {
        if self.segments.is_empty() && !matches!(el, PathEl::MoveTo(_)) {
            return Err(TraceError::invariant(format!("{el:?} pushed before any move")));
        }
        self.segments.push(el);
        self.invalidate();
        Ok(())
    }

    pub fn move_to(&mut self, p: Point) {
        self.segments.push(PathEl::MoveTo(p));
        self.invalidate();
    }

    pub fn line_to(&mut self, p: Point) -> Result<(), TraceError> {
        self.push(PathEl::LineTo(p))
    }

    pub fn curve_to(&mut self, a: Point, b: Point, p: Point) -> Result<(), TraceError> {
        self.push(PathEl::CurveTo(a, b, p))
    }

    pub fn close(&mut self) -> Result<(), TraceError> {
        self.push(PathEl::ClosePath)
    }

    /// Drop every segment from index `len` on.
    pub fn truncate(&mut self, len: usize) {
        self.segments.truncate(len);
        self.invalidate();
    }

    /// Replace the segments in `range` by `replacement`.
    pub fn splice(&mut self, range: Range<usize>, replacement: Vec<PathEl>) -> Result<(), TraceError> {
        if range.end > self.segments.len() || range.start > range.end {
            return Err(TraceError::invariant(format!(
                "splice range {range:?} outside path of {} segments",
                self.segments.len()
            )));
        }
        self.segments.splice(range, replacement);
        if let Some(first) = self.segments.first() {
            if !matches!(first, PathEl::MoveTo(_)) {
                return Err(TraceError::invariant("splice removed the leading move"));
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Replace the whole segment list, keeping the fill attributes.
    pub fn set_segments(&mut self, segments: Vec<PathEl>) -> Result<(), TraceError> {
        let checked = Self::from_segments(segments)?;
        self.segments = checked.segments;
        self.invalidate();
        Ok(())
    }

    fn invalidate(&mut self) {
        self.direction = OnceLock::new();
    }

    pub fn first_point(&self) -> Result<Point, TraceError> {
        self.segments
            .first()
            .and_then(SegmentExt::end_point)
            .ok_or_else(|| TraceError::invariant("first point of an empty path"))
    }

    pub fn last_point(&self) -> Result<Point, TraceError> {
        if self.segments.is_empty() {
            return Err(TraceError::invariant("last point of an empty path"));
        }
        self.end_point(self.segments.len() - 1)
            .ok_or_else(|| TraceError::invariant("path has no end point"))
    }

    /// End point of segment `i`; a close ends at its loop start.
    pub fn end_point(&self, i: usize) -> Option<Point> {
        match self.segments.get(i)? {
            PathEl::ClosePath => self.loop_start(i),
            el => el.end_point(),
        }
    }

    /// Start point of segment `i`: the previous segment's end.
    pub fn start_point(&self, i: usize) -> Option<Point> {
        if i == 0 || i >= self.segments.len() {
            return None;
        }
        self.end_point(i - 1)
    }

    /// The move that opened the sub-path containing segment `i`.
    fn loop_start(&self, i: usize) -> Option<Point> {
        self.segments[..=i].iter().rev().find_map(|el| match el {
            PathEl::MoveTo(p) => Some(*p),
            _ => None,
        })
    }

    /// End points of all segments in one pass (closes resolved).
    pub fn segment_ends(&self) -> Vec<Point> {
        let mut ends = Vec::with_capacity(self.segments.len());
        let mut start = Point::ZERO;
        for el in &self.segments {
            let p = match *el {
                PathEl::MoveTo(p) => {
                    start = p;
                    p
                }
                PathEl::ClosePath => start,
                ref other => other.end_point().unwrap_or(start),
            };
            ends.push(p);
        }
        ends
    }

    /// Angle of the start→end vector of segment `i`.
    pub fn gradient(&self, i: usize) -> Option<f64> {
        let start = self.start_point(i)?;
        let end = self.end_point(i)?;
        let d = end - start;
        Some(d.y.atan2(d.x))
    }

    /// Length of segment `i`; moves have none, a close runs back to its loop start.
    pub fn segment_length(&self, i: usize) -> f64 {
        let (Some(start), Some(el)) = (self.start_point(i), self.segments.get(i)) else {
            return 0.0;
        };
        match *el {
            PathEl::MoveTo(_) => 0.0,
            PathEl::LineTo(p) => start.distance(p),
            PathEl::QuadTo(a, p) => QuadBez::new(start, a, p).arclen(ARCLEN_ACCURACY),
            PathEl::CurveTo(a, b, p) => CubicBez::new(start, a, b, p).arclen(ARCLEN_ACCURACY),
            PathEl::ClosePath => self.end_point(i).map_or(0.0, |p| start.distance(p)),
        }
    }

    /// Estimated path length, counting closes as lines back to the loop start.
    pub fn length(&self) -> f64 {
        (0..self.segments.len()).map(|i| self.segment_length(i)).sum()
    }

    /// Approximate bounding box over segment end points only. Degenerate
    /// axes are widened to `DEGENERATE_EXTENT`.
    pub fn bounds(&self) -> Option<Rect> {
        let mut points = self.segments.iter().filter_map(SegmentExt::end_point);
        let first = points.next()?;
        let mut rect = Rect::from_points(first, first);
        for p in points {
            rect = rect.union_pt(p);
        }
        if rect.width() < DEGENERATE_EXTENT * 1e-3 {
            let cx = rect.center().x;
            rect.x0 = cx - DEGENERATE_EXTENT / 2.0;
            rect.x1 = cx + DEGENERATE_EXTENT / 2.0;
        }
        if rect.height() < DEGENERATE_EXTENT * 1e-3 {
            let cy = rect.center().y;
            rect.y0 = cy - DEGENERATE_EXTENT / 2.0;
            rect.y1 = cy + DEGENERATE_EXTENT / 2.0;
        }
        Some(rect)
    }

    /// Area of the approximate bounding box (0 for an empty path).
    pub fn bounds_area(&self) -> f64 {
        self.bounds().map_or(0.0, |r| r.area())
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.segments.last(), Some(PathEl::ClosePath))
    }

    /// True when a close precedes the final segment.
    pub fn has_sub_paths(&self) -> bool {
        let n = self.segments.len();
        n > 1 && self.segments[..n - 1].iter().any(|el| matches!(el, PathEl::ClosePath))
    }

    /// Index ranges of every sub-path (a move up to, and including, its
    /// close when there is one).
    pub fn sub_path_ranges(&self) -> Vec<Range<usize>> {
        let mut ranges = Vec::new();
        let mut start: Option<usize> = None;
        for (i, el) in self.segments.iter().enumerate() {
            match el {
                PathEl::MoveTo(_) => {
                    if let Some(s) = start {
                        ranges.push(s..i);
                    }
                    start = Some(i);
                }
                PathEl::ClosePath => {
                    if let Some(s) = start.take() {
                        ranges.push(s..i + 1);
                    }
                }
                _ => {
                    if start.is_none() {
                        // Drawing after a close continues from the loop start.
                        start = Some(i);
                    }
                }
            }
        }
        if let Some(s) = start {
            ranges.push(s..self.segments.len());
        }
        ranges
    }

    /// Copy of the segments in `range` as a standalone path.
    pub fn extract(&self, range: Range<usize>) -> Result<TracePath, TraceError> {
        let mut segments = Vec::with_capacity(range.len() + 1);
        if let Some(el) = self.segments.get(range.start) {
            if !matches!(el, PathEl::MoveTo(_)) {
                let start = self
                    .start_point(range.start)
                    .ok_or_else(|| TraceError::invariant("sub-path without start"))?;
                segments.push(PathEl::MoveTo(start));
            }
        }
        segments.extend_from_slice(&self.segments[range]);
        let mut path = self.styled_like();
        path.set_segments(segments)?;
        Ok(path)
    }

    /// On-curve vertices of each sub-path, curves flattened to `tolerance`.
    /// A trailing vertex equal to the loop start is dropped for closed loops.
    pub fn polylines(&self, tolerance: f64) -> Vec<(Vec<Point>, bool)> {
        let mut out = Vec::new();
        let mut current: Vec<Point> = Vec::new();
        for i in 0..self.segments.len() {
            match self.segments[i] {
                PathEl::MoveTo(p) => {
                    if current.len() > 1 {
                        out.push((std::mem::take(&mut current), false));
                    }
                    current.clear();
                    current.push(p);
                }
                PathEl::LineTo(p) => current.push(p),
                PathEl::QuadTo(..) | PathEl::CurveTo(..) => {
                    let start = self.start_point(i).unwrap_or(Point::ZERO);
                    flatten_segment(start, self.segments[i], tolerance, &mut current);
                }
                PathEl::ClosePath => {
                    let start = current.first().copied();
                    if current.len() > 1 && current.first() == current.last() {
                        current.pop();
                    }
                    if !current.is_empty() {
                        out.push((std::mem::take(&mut current), true));
                    }
                    // Drawing after a close continues from the loop start.
                    current.extend(start);
                }
            }
        }
        if current.len() > 1 {
            out.push((current, false));
        }
        out
    }

    /// Closed rings only.
    pub fn loops(&self, tolerance: f64) -> Vec<Vec<Point>> {
        self.polylines(tolerance)
            .into_iter()
            .filter(|(_, closed)| *closed)
            .map(|(points, _)| points)
            .collect()
    }

    /// Sum of the shoelace areas of all sub-paths (on-curve points only).
    pub fn signed_area(&self) -> f64 {
        self.polylines(0.25).iter().map(|(points, _)| geom::signed_area(points)).sum()
    }

    /// Cached winding direction; `None` for zero-area paths.
    pub fn direction(&self) -> Option<Direction> {
        *self.direction.get_or_init(|| {
            let area = self.signed_area();
            if area > 0.0 {
                Some(Direction::Clockwise)
            } else if area < 0.0 {
                Some(Direction::CounterClockwise)
            } else {
                None
            }
        })
    }

    /// Append `other` after this path, joining its leading move per `join`.
    pub fn append(&mut self, other: &TracePath, join: Join) -> Result<(), TraceError> {
        let Some((first, rest)) = other.segments.split_first() else {
            return Ok(());
        };
        let PathEl::MoveTo(p) = *first else {
            return Err(TraceError::invariant("appended path does not start with a move"));
        };
        if self.segments.is_empty() {
            self.segments = other.segments.clone();
            self.invalidate();
            return Ok(());
        }
        match join {
            Join::Move => self.segments.push(PathEl::MoveTo(p)),
            Join::Line => self.segments.push(PathEl::LineTo(p)),
            Join::Collapse => {}
        }
        self.segments.extend_from_slice(rest);
        self.invalidate();
        Ok(())
    }

    /// Put `other` in front of this path; this path's leading move is
    /// joined per `join`.
    pub fn prepend(&mut self, other: &TracePath, join: Join) -> Result<(), TraceError> {
        let mut combined = other.clone();
        combined.append(self, join)?;
        self.segments = combined.segments;
        self.invalidate();
        Ok(())
    }

    /// The same geometry traversed backwards (sub-path order reversed too).
    pub fn reversed(&self) -> TracePath {
        let mut out = self.styled_like();
        for range in self.sub_path_ranges().into_iter().rev() {
            reverse_sub_path(&self.segments[range.clone()], self.start_point(range.start), &mut out.segments);
        }
        out
    }
}

#[derive(Clone, Copy)]
enum Seg {
    Line,
    Curve(Point, Point),
    Quad(Point),
}

/// Reverse one sub-path into `output`.
fn reverse_sub_path(segments: &[PathEl], implicit_start: Option<Point>, output: &mut Vec<PathEl>) {
    let mut first = implicit_start.unwrap_or(Point::ZERO);
    let mut tail: Vec<(Point, Seg)> = Vec::new();
    let mut closed = false;

    for el in segments {
        match *el {
            PathEl::MoveTo(p) => first = p,
            PathEl::LineTo(p) => tail.push((p, Seg::Line)),
            PathEl::CurveTo(a, b, p) => tail.push((p, Seg::Curve(a, b))),
            PathEl::QuadTo(a, p) => tail.push((p, Seg::Quad(a))),
            PathEl::ClosePath => closed = true,
        }
    }

    let Some(&(last, _)) = tail.last() else {
        output.push(PathEl::MoveTo(first));
        if closed {
            output.push(PathEl::ClosePath);
        }
        return;
    };

    output.push(PathEl::MoveTo(last));
    for i in (0..tail.len()).rev() {
        let target = if i == 0 { first } else { tail[i - 1].0 };
        output.push(match tail[i].1 {
            Seg::Line => PathEl::LineTo(target),
            Seg::Curve(a, b) => PathEl::CurveTo(b, a, target),
            Seg::Quad(a) => PathEl::QuadTo(a, target),
        });
    }
    if closed {
        output.push(PathEl::ClosePath);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(x: f64, y: f64, w: f64, h: f64) -> TracePath {
        TracePath::from_polyline(
            &[
                Point::new(x, y),
                Point::new(x + w, y),
                Point::new(x + w, y + h),
                Point::new(x, y + h),
            ],
            true,
        )
    }

    #[test]
    fn close_counts_as_line_back() {
        let path = rect(0.0, 0.0, 4.0, 2.0);
        assert!((path.length() - 12.0).abs() < 1e-9);
        assert_eq!(path.end_point(4), Some(Point::new(0.0, 0.0)));
        assert_eq!(path.start_point(1), Some(Point::new(0.0, 0.0)));
        assert_eq!(path.start_point(0), None);
    }

    #[test]
    fn line_before_move_is_invariant_violation() {
        let mut path = TracePath::new();
        assert!(matches!(path.push(PathEl::LineTo(Point::ZERO)), Err(TraceError::Invariant(_))));
        assert!(matches!(path.first_point(), Err(TraceError::Invariant(_))));
        assert!(TracePath::from_segments(vec![PathEl::ClosePath]).is_err());
    }

    #[test]
    fn degenerate_bounds_are_inflated() {
        let line = TracePath::from_polyline(&[Point::new(0.0, 3.0), Point::new(10.0, 3.0)], false);
        let b = line.bounds().unwrap();
        assert_eq!(b.width(), 10.0);
        assert_eq!(b.height(), DEGENERATE_EXTENT);
    }

    #[test]
    fn sub_paths_detected() {
        let mut path = rect(0.0, 0.0, 10.0, 10.0);
        assert!(!path.has_sub_paths());
        path.append(&rect(2.0, 2.0, 3.0, 3.0).reversed(), Join::Move).unwrap();
        assert!(path.has_sub_paths());
        assert_eq!(path.sub_path_ranges(), vec![0..5, 5..10]);
        assert_eq!(path.loops(0.25).len(), 2);
        assert!((path.signed_area() - (100.0 - 9.0)).abs() < 1e-9);
    }

    #[test]
    fn reversal_flips_direction_and_keeps_vertices() {
        let path = rect(0.0, 0.0, 4.0, 2.0);
        assert_eq!(path.direction(), Some(Direction::Clockwise));
        let rev = path.reversed();
        assert_eq!(rev.direction(), Some(Direction::CounterClockwise));
        assert_eq!(rev.first_point().unwrap(), Point::new(0.0, 2.0));
        assert_eq!(rev.reversed(), path);
    }

    #[test]
    fn join_modes() {
        let a = TracePath::from_polyline(&[Point::new(0.0, 0.0), Point::new(5.0, 0.0)], false);
        let b = TracePath::from_polyline(&[Point::new(6.0, 0.0), Point::new(9.0, 0.0)], false);

        let mut moved = a.clone();
        moved.append(&b, Join::Move).unwrap();
        assert_eq!(moved.len(), 4);
        assert!(matches!(moved.segments()[2], PathEl::MoveTo(_)));

        let mut lined = a.clone();
        lined.append(&b, Join::Line).unwrap();
        assert_eq!(lined.segments()[2], PathEl::LineTo(Point::new(6.0, 0.0)));

        let mut collapsed = a.clone();
        collapsed.append(&b, Join::Collapse).unwrap();
        assert_eq!(collapsed.len(), 3);
        assert_eq!(collapsed.start_point(2), Some(Point::new(5.0, 0.0)));

        let mut front = b.clone();
        front.prepend(&a, Join::Line).unwrap();
        assert_eq!(front, lined);
    }

    #[test]
    fn direction_cache_resets_on_mutation() {
        let mut path = rect(0.0, 0.0, 4.0, 4.0);
        assert_eq!(path.direction(), Some(Direction::Clockwise));
        let rev = path.reversed();
        path.set_segments(rev.segments().to_vec()).unwrap();
        assert_eq!(path.direction(), Some(Direction::CounterClockwise));
    }

    #[test]
    fn curves_flatten_within_tolerance() {
        use kurbo::ParamCurveNearest;

        let mut path = TracePath::new();
        path.move_to(Point::new(0.0, 0.0));
        let arc = CubicBez::new((0.0, 0.0), (0.0, 5.5), (4.5, 10.0), (10.0, 10.0));
        path.curve_to(arc.p1, arc.p2, arc.p3).unwrap();
        path.close().unwrap();

        let coarse = path.loops(0.25);
        let fine = path.loops(0.001);
        assert!(fine[0].len() > coarse[0].len());
        assert_eq!(*fine[0].last().unwrap(), Point::new(10.0, 10.0));
        for &p in &fine[0] {
            let nearest = arc.nearest(p, 1e-9);
            assert!(nearest.distance_sq.sqrt() < 0.01);
        }
    }
}
