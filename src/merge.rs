//! Proximity-based path welding.
//!
//! Open paths are joined end to end when their nearest endpoints are close.
//! Unfilled loops winding against each other are fused along a shared
//! border. The list is rescanned after every weld until nothing changes.

use kurbo::{PathEl, Point};
use log::debug;

use crate::config::MergeParams;
use crate::error::TraceError;
use crate::path::{Join, SegmentExt, TracePath};
use crate::pipeline::PipelineRun;

const FLATTEN_TOLERANCE: f64 = 0.25;

/// Which endpoints of paths A and B meet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Weld {
    /// A.end → B.start
    EndStart,
    /// B.end → A.start
    StartEnd,
    /// A.end → B.end, B reversed
    EndEnd,
    /// A.start → B.start, B reversed in front
    StartStart,
}

/// Weld paths until no pair qualifies. The path count never grows.
pub fn merge_paths(mut paths: Vec<TracePath>, params: &MergeParams, run: &PipelineRun) -> Result<Vec<TracePath>, TraceError> {
    let threshold = params.delta_threshold;
    let start_count = paths.len();
    let mut merges = 0usize;

    'rescan: loop {
        for i in 0..paths.len() {
            run.checkpoint()?;
            for j in (i + 1)..paths.len() {
                if let Some(merged) = merge_pair(&paths[i], &paths[j], threshold)? {
                    paths[i] = merged;
                    paths.remove(j);
                    merges += 1;
                    run.report(merges, start_count.saturating_sub(1).max(1));
                    continue 'rescan;
                }
            }
        }
        break;
    }

    debug!("merge: {merges} welds, {start_count} -> {} paths", paths.len());
    Ok(paths)
}

/// The welded path, if `a` and `b` qualify.
pub fn merge_pair(a: &TracePath, b: &TracePath, threshold: f64) -> Result<Option<TracePath>, TraceError> {
    if a.is_empty() || b.is_empty() {
        return Ok(None);
    }
    match (a.is_closed(), b.is_closed()) {
        (false, false) => weld_open(a, b, threshold),
        (true, true) => weld_loops(a, b, threshold),
        _ => Ok(None),
    }
}

fn weld_open(a: &TracePath, b: &TracePath, threshold: f64) -> Result<Option<TracePath>, TraceError> {
    let (a0, a1) = (a.first_point()?, a.last_point()?);
    let (b0, b1) = (b.first_point()?, b.last_point()?);
    let candidates = [
        (a1.distance(b0), Weld::EndStart),
        (a0.distance(b1), Weld::StartEnd),
        (a1.distance(b1), Weld::EndEnd),
        (a0.distance(b0), Weld::StartStart),
    ];
    let Some(&(_, weld)) = candidates
        .iter()
        .filter(|(d, _)| *d < threshold)
        .min_by(|x, y| x.0.total_cmp(&y.0))
    else {
        return Ok(None);
    };

    let (head, tail) = match weld {
        Weld::EndStart => (a.clone(), b.clone()),
        Weld::StartEnd => (b.clone(), a.clone()),
        Weld::EndEnd => (a.clone(), b.reversed()),
        Weld::StartStart => (b.reversed(), a.clone()),
    };
    let joint = head.len();
    let mut merged = head;
    merged.append(&tail, Join::Collapse)?;

    // The segment bridging the gap is always a line.
    if let Some(el) = merged.segments().get(joint).copied() {
        if !el.is_line() {
            if let Some(p) = el.end_point() {
                merged.splice(joint..joint + 1, vec![PathEl::LineTo(p)])?;
            }
        }
    }
    debug!("merge: welded open paths ({weld:?})");
    Ok(Some(merged.with_style(a.winding, a.filled, a.line_width)))
}

/// A run of vertex pairs `A[i + k] ≈ B[j + k]` for `k` in `0..=len`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Border {
    i: usize,
    j: usize,
    len: usize,
}

fn weld_loops(a: &TracePath, b: &TracePath, threshold: f64) -> Result<Option<TracePath>, TraceError> {
    if a.filled || b.filled || a.has_sub_paths() || b.has_sub_paths() {
        return Ok(None);
    }
    match (a.direction(), b.direction()) {
        (Some(da), Some(db)) if da == db.opposite() => {}
        _ => return Ok(None),
    }
    let (Some(ra), Some(rb)) = (
        a.loops(FLATTEN_TOLERANCE).into_iter().next(),
        b.loops(FLATTEN_TOLERANCE).into_iter().next(),
    ) else {
        return Ok(None);
    };
    let Some(border) = find_border(&ra, &rb, threshold) else {
        return Ok(None);
    };

    // A from the border's trailing end around to its leading end, then B
    // backwards between the two ends.
    let (na, nb) = (ra.len(), rb.len());
    let mut ring: Vec<Point> = (0..=na - border.len)
        .map(|k| ra[(border.i + border.len + k) % na])
        .collect();
    ring.extend((1..nb - border.len).map(|k| rb[(border.j + nb - k) % nb]));

    debug!("merge: fused loops along a {}-edge border", border.len);
    let merged = TracePath::from_polyline(&ring, true);
    Ok(Some(merged.with_style(a.winding, false, a.line_width)))
}

/// Longest matching border; ties keep the first found.
fn find_border(ra: &[Point], rb: &[Point], threshold: f64) -> Option<Border> {
    let (na, nb) = (ra.len(), rb.len());
    let max_len = na.min(nb).checked_sub(2)?;
    let close = |i: usize, j: usize| ra[i % na].distance(rb[j % nb]) < threshold;

    let mut best: Option<Border> = None;
    for i in 0..na {
        for j in 0..nb {
            // Only start at the leading end of a run.
            if !close(i, j) || close(i + na - 1, j + nb - 1) {
                continue;
            }
            let mut len = 0;
            while len < max_len && close(i + len + 1, j + len + 1) {
                len += 1;
            }
            if len >= 1 && best.map_or(true, |b| len > b.len) {
                best = Some(Border { i, j, len });
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

    fn open(points: &[(f64, f64)]) -> TracePath {
        let pts: Vec<Point> = points.iter().map(|&(x, y)| Point::new(x, y)).collect();
        TracePath::from_polyline(&pts, false).with_style(Default::default(), false, 2.0)
    }

    fn stroke_rect(x: f64, w: f64, h: f64) -> TracePath {
        TracePath::from_polyline(
            &[
                Point::new(x, 0.0),
                Point::new(x + w, 0.0),
                Point::new(x + w, h),
                Point::new(x, h),
            ],
            true,
        )
        .with_style(Default::default(), false, 1.0)
    }

    #[test]
    fn nearby_ends_weld_with_a_line() {
        let a = open(&[(0.0, 0.0), (5.0, 2.0), (10.0, 0.0)]);
        let b = open(&[(11.4, 0.0), (15.0, 3.0), (20.0, 0.0)]);
        let run = PipelineRun::detached(Stage::Merge);
        let out = merge_paths(vec![a.clone(), b.clone()], &MergeParams::default(), &run).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), a.len() + b.len() - 1);
        assert_eq!(out[0].segments()[3], PathEl::LineTo(Point::new(15.0, 3.0)));
        assert_eq!(out[0].line_width, 2.0);
    }

    #[test]
    fn reversed_candidate_is_used() {
        let a = open(&[(0.0, 0.0), (10.0, 0.0)]);
        let b = open(&[(20.0, 0.0), (11.0, 0.0)]);
        let merged = merge_pair(&a, &b, 2.0).unwrap().unwrap();
        assert_eq!(merged.first_point().unwrap(), Point::new(0.0, 0.0));
        assert_eq!(merged.last_point().unwrap(), Point::new(20.0, 0.0));
    }

    #[test]
    fn far_or_mixed_pairs_stay_apart() {
        let a = open(&[(0.0, 0.0), (10.0, 0.0)]);
        let b = open(&[(13.0, 0.0), (20.0, 0.0)]);
        assert!(merge_pair(&a, &b, 2.0).unwrap().is_none());
        assert!(merge_pair(&a, &stroke_rect(10.5, 5.0, 5.0), 2.0).unwrap().is_none());
    }

    #[test]
    fn opposite_loops_fuse_along_shared_wall() {
        let a = stroke_rect(0.0, 10.0, 10.0);
        let b = stroke_rect(10.0, 10.0, 10.0).reversed();
        let merged = merge_pair(&a, &b, 1.0).unwrap().unwrap();
        assert!(merged.is_closed());
        assert!(!merged.filled);
        assert_eq!(merged.loops(0.25)[0].len(), 6);
        assert!((merged.signed_area() - 200.0).abs() < 1e-9);
    }

    #[test]
    fn same_direction_loops_never_fuse() {
        let a = stroke_rect(0.0, 10.0, 10.0);
        let b = stroke_rect(10.0, 10.0, 10.0);
        assert!(merge_pair(&a, &b, 1.0).unwrap().is_none());
    }

    #[test]
    fn second_merge_run_changes_nothing() {
        let paths = vec![
            open(&[(0.0, 0.0), (10.0, 0.0)]),
            open(&[(11.0, 0.0), (20.0, 0.0)]),
            open(&[(21.0, 0.5), (30.0, 0.0)]),
            open(&[(50.0, 50.0), (60.0, 60.0)]),
        ];
        let run = PipelineRun::detached(Stage::Merge);
        let once = merge_paths(paths, &MergeParams::default(), &run).unwrap();
        let twice = merge_paths(once.clone(), &MergeParams::default(), &run).unwrap();
        assert_eq!(once.len(), 2);
        assert_eq!(twice.len(), once.len());
    }
}
