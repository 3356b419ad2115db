//! Segment helpers over kurbo's closed `PathEl` union.

use kurbo::{PathEl, Point};

/// How a spliced path is joined to the one it is appended to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Join {
    /// Keep the leading move: the result has two sub-paths.
    Move,
    /// Replace the leading move by a line to the same point.
    Line,
    /// Drop the leading move; the next segment starts at the previous end.
    Collapse,
}

/// Endpoint access on path elements.
///
/// A segment never stores its start point: it is the previous segment's end,
/// or the loop start after a close.
pub trait SegmentExt {
    /// The explicit end point. `ClosePath` has none of its own.
    fn end_point(&self) -> Option<Point>;

    /// The same segment kind ending at `p` (control points kept).
    fn with_end(&self, p: Point) -> PathEl;

    /// Whether the segment draws (line, quad or cubic).
    fn is_drawing(&self) -> bool;

    fn is_line(&self) -> bool;
}

impl SegmentExt for PathEl {
    fn end_point(&self) -> Option<Point> {
        match *self {
            PathEl::MoveTo(p) | PathEl::LineTo(p) | PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => {
                Some(p)
            }
            PathEl::ClosePath => None,
        }
    }

    fn with_end(&self, p: Point) -> PathEl {
        match *self {
            PathEl::MoveTo(_) => PathEl::MoveTo(p),
            PathEl::LineTo(_) => PathEl::LineTo(p),
            PathEl::QuadTo(a, _) => PathEl::QuadTo(a, p),
            PathEl::CurveTo(a, b, _) => PathEl::CurveTo(a, b, p),
            PathEl::ClosePath => PathEl::ClosePath,
        }
    }

    fn is_drawing(&self) -> bool {
        matches!(self, PathEl::LineTo(_) | PathEl::QuadTo(..) | PathEl::CurveTo(..))
    }

    fn is_line(&self) -> bool {
        matches!(self, PathEl::LineTo(_))
    }
}

/// Push the vertices of a drawing segment that starts at `start`, curves
/// flattened to `tolerance`. `start` itself is not pushed.
pub fn flatten_segment(start: Point, el: PathEl, tolerance: f64, out: &mut Vec<Point>) {
    match el {
        PathEl::LineTo(p) => out.push(p),
        PathEl::QuadTo(..) | PathEl::CurveTo(..) => {
            kurbo::flatten([PathEl::MoveTo(start), el], tolerance, |flat| {
                if let PathEl::LineTo(p) = flat {
                    out.push(p);
                }
            });
        }
        PathEl::MoveTo(_) | PathEl::ClosePath => {}
    }
}
