//! Stair-step run detection.
//!
//! Pixel boundaries approximate slopes and arcs with short horizontal and
//! vertical steps. A run is a maximal sequence of short line segments whose
//! horizontal and vertical step directions reverse at most twice.

use std::ops::Range;

use kurbo::{PathEl, Point};

use crate::path::TracePath;

/// Largest number of direction reversals inside one run.
pub const MAX_BENDS: usize = 2;

/// Step components below this count as zero.
const STEP_EPSILON: f64 = 1e-9;

/// One stair-step run inside a path.
#[derive(Debug, Clone, PartialEq)]
pub struct StairRun {
    /// Index of the run's first segment in the path.
    pub first: usize,
    /// Start of the first segment, then the end of every segment.
    pub points: Vec<Point>,
    /// Indices into `points` where a step reverses direction.
    pub bends: Vec<usize>,
}

impl StairRun {
    /// Path segments covered by the run points `start..=end`.
    pub fn segment_range(&self, start: usize, end: usize) -> Range<usize> {
        self.first + start..self.first + end
    }

    pub fn last_index(&self) -> usize {
        self.points.len() - 1
    }

    /// Bend indices strictly between `start` and `end`.
    pub fn bends_between(&self, start: usize, end: usize) -> Vec<usize> {
        self.bends.iter().copied().filter(|&b| b > start && b < end).collect()
    }
}

fn sign(v: f64) -> i8 {
    if v > STEP_EPSILON {
        1
    } else if v < -STEP_EPSILON {
        -1
    } else {
        0
    }
}

#[derive(Debug)]
struct Builder {
    run: StairRun,
    sx: i8,
    sy: i8,
}

impl Builder {
    fn start(first: usize, from: Point) -> Self {
        Self {
            run: StairRun {
                first,
                points: vec![from],
                bends: Vec::new(),
            },
            sx: 0,
            sy: 0,
        }
    }

    /// Add a step; `false` when it would exceed the bend budget.
    fn push(&mut self, to: Point) -> bool {
        let from = self.run.points[self.run.points.len() - 1];
        let (sx, sy) = (sign(to.x - from.x), sign(to.y - from.y));
        let reverses = (sx != 0 && self.sx != 0 && sx != self.sx) || (sy != 0 && self.sy != 0 && sy != self.sy);
        if reverses {
            if self.run.bends.len() == MAX_BENDS {
                return false;
            }
            self.run.bends.push(self.run.points.len() - 1);
        }
        if sx != 0 {
            self.sx = sx;
        }
        if sy != 0 {
            self.sy = sy;
        }
        self.run.points.push(to);
        true
    }

    fn finish(self, out: &mut Vec<StairRun>) {
        if self.run.points.len() >= 3 {
            out.push(self.run);
        }
    }
}

/// All stair-step runs of `path` made of lines shorter than `threshold`.
pub fn find_runs(path: &TracePath, threshold: f64) -> Vec<StairRun> {
    let mut runs = Vec::new();
    let mut current: Option<Builder> = None;
    for (i, el) in path.segments().iter().enumerate() {
        let step = match (*el, path.start_point(i)) {
            (PathEl::LineTo(p), Some(from)) if from.distance(p) < threshold && from.distance(p) > STEP_EPSILON => {
                Some((from, p))
            }
            _ => None,
        };
        let Some((from, to)) = step else {
            if let Some(builder) = current.take() {
                builder.finish(&mut runs);
            }
            continue;
        };
        let builder = current.get_or_insert_with(|| Builder::start(i, from));
        if !builder.push(to) {
            if let Some(full) = current.take() {
                full.finish(&mut runs);
            }
            let mut fresh = Builder::start(i, from);
            fresh.push(to);
            current = Some(fresh);
        }
    }
    if let Some(builder) = current {
        builder.finish(&mut runs);
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    fn polyline(points: &[(f64, f64)]) -> TracePath {
        let pts: Vec<Point> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        TracePath::from_polyline(&pts, false)
    }

    #[test]
    fn staircase_is_one_run() {
        let path = polyline(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (2.0, 1.0), (2.0, 2.0), (3.0, 2.0)]);
        let runs = find_runs(&path, 3.0);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].first, 1);
        assert_eq!(runs[0].points.len(), 6);
        assert!(runs[0].bends.is_empty());
        assert_eq!(runs[0].segment_range(0, 5), 1..6);
    }

    #[test]
    fn long_lines_break_runs() {
        let path = polyline(&[(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (10.0, 1.0), (11.0, 1.0), (11.0, 2.0), (12.0, 2.0)]);
        let runs = find_runs(&path, 3.0);
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[1].first, 4);
        assert_eq!(runs[1].points[0], Point::new(10.0, 1.0));
    }

    #[test]
    fn third_reversal_starts_a_new_run() {
        // Up, down, up, down along a zigzag.
        let path = polyline(&[
            (0.0, 0.0),
            (1.0, -1.0),
            (2.0, 0.0),
            (3.0, -1.0),
            (4.0, 0.0),
            (5.0, -1.0),
        ]);
        let runs = find_runs(&path, 3.0);
        assert_eq!(runs[0].bends, vec![1, 2]);
        assert_eq!(runs[0].points.len(), 4);
        assert_eq!(runs[1].first, 4);
        assert_eq!(runs.len(), 2);
    }

    #[test]
    fn bends_between_is_exclusive() {
        let run = StairRun {
            first: 0,
            points: vec![Point::ZERO; 8],
            bends: vec![2, 5],
        };
        assert_eq!(run.bends_between(2, 7), vec![5]);
        assert_eq!(run.bends_between(0, 7), vec![2, 5]);
    }
}
