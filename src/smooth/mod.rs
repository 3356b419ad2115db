//! Stair-step smoothing.
//!
//! Runs of tiny axis-aligned steps left over from pixel boundaries are
//! replaced by a chord, a polyline through the bends or a fitted cubic,
//! whichever scores best while staying within the area deviation budget.

pub mod area;
pub mod deviation;
pub mod simplex;
pub mod stairs;

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info};
use rayon::prelude::*;

use crate::config::SmoothParams;
use crate::error::TraceError;
use crate::path::TracePath;
use crate::pipeline::PipelineRun;

pub use deviation::{DeviationResult, FitShape};
use deviation::Evaluator;
use stairs::{find_runs, StairRun};

/// Smooth every path. Returns the new paths and every accepted replacement.
pub fn smooth_paths(
    paths: &[TracePath],
    params: &SmoothParams,
    run: &PipelineRun,
) -> Result<(Vec<TracePath>, Vec<DeviationResult>), TraceError> {
    let total = paths.len();
    let done = AtomicUsize::new(0);
    let smoothed: Vec<(TracePath, Vec<DeviationResult>)> = paths
        .par_iter()
        .map(|path| {
            run.checkpoint()?;
            let result = smooth_path_with_report(path, params, run)?;
            run.report(done.fetch_add(1, Ordering::Relaxed) + 1, total);
            Ok(result)
        })
        .collect::<Result<_, TraceError>>()?;

    let (paths, reports): (Vec<TracePath>, Vec<Vec<DeviationResult>>) = smoothed.into_iter().unzip();
    let deviations: Vec<DeviationResult> = reports.into_iter().flatten().collect();
    let curves = deviations.iter().filter(|d| d.shape.is_curve()).count();
    info!(
        "smooth: {} replacements ({curves} curves) across {} paths",
        deviations.len(),
        paths.len()
    );
    run.preview(&paths);
    Ok((paths, deviations))
}

pub fn smooth_path(path: &TracePath, params: &SmoothParams, run: &PipelineRun) -> Result<TracePath, TraceError> {
    Ok(smooth_path_with_report(path, params, run)?.0)
}

/// Smooth one path, also returning the accepted replacements.
pub fn smooth_path_with_report(
    path: &TracePath,
    params: &SmoothParams,
    run: &PipelineRun,
) -> Result<(TracePath, Vec<DeviationResult>), TraceError> {
    let mut fits = Vec::new();
    for stair in find_runs(path, params.tiny_step_threshold) {
        run.checkpoint()?;
        fits.extend(smooth_run(&stair, params, run)?);
    }
    if fits.is_empty() {
        return Ok((path.clone(), fits));
    }

    let mut segments = Vec::with_capacity(path.len());
    let mut pending = fits.iter().peekable();
    let mut i = 0;
    while i < path.len() {
        if let Some(fit) = pending.next_if(|f| f.range.start == i) {
            segments.extend(fit.shape.segments());
            i = fit.range.end;
        } else {
            segments.push(path.segments()[i]);
            i += 1;
        }
    }
    debug!("smooth: {} -> {} segments", path.len(), segments.len());
    let mut smoothed = path.styled_like();
    smoothed.set_segments(segments)?;
    Ok((smoothed, fits))
}

/// Greedy left-to-right replacement inside one run.
fn smooth_run(stair: &StairRun, params: &SmoothParams, run: &PipelineRun) -> Result<Vec<DeviationResult>, TraceError> {
    let mut eval = Evaluator::new(stair, params, run);
    let last = stair.last_index();
    let mut fits = Vec::new();
    let mut start = 0;
    while start + 2 <= last {
        match search_end(&mut eval, start, last, params)? {
            Some(fit) => {
                start += fit.points - 1;
                fits.push(fit);
            }
            None => start += 1,
        }
    }
    Ok(fits)
}

/// Preferred replacement starting at `start`.
///
/// The ends at the full, three-quarter, half and quarter marks are tried
/// first; the range between the longest accepted mark and the next one up
/// is then scanned backwards.
fn search_end(
    eval: &mut Evaluator,
    start: usize,
    last: usize,
    params: &SmoothParams,
) -> Result<Option<DeviationResult>, TraceError> {
    let span = last - start;
    let mut marks: Vec<usize> = (1..=4)
        .rev()
        .map(|k| start + span * k / 4)
        .filter(|&e| e >= start + 2)
        .collect();
    marks.dedup();

    let mut best: Option<DeviationResult> = None;
    let consider = |fit: DeviationResult, best: &mut Option<DeviationResult>| {
        if best.as_ref().map_or(true, |b| fit.beats(b, params)) {
            *best = Some(fit);
        }
    };

    let (mut low, mut high) = (start + 1, last + 1);
    for (k, &end) in marks.iter().enumerate() {
        if let Some(fit) = eval.best(start, end)? {
            consider(fit, &mut best);
            low = end;
            high = if k == 0 { end } else { marks[k - 1] };
            break;
        }
        high = end;
    }
    for end in (low + 1..high).rev() {
        if end < start + 2 {
            break;
        }
        if let Some(fit) = eval.best(start, end)? {
            consider(fit, &mut best);
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;
    use kurbo::{PathEl, Point};

    /// Closed outline of a right triangle whose hypotenuse is a staircase.
    fn stepped_triangle(n: usize) -> TracePath {
        let mut points = vec![Point::new(0.0, 0.0)];
        for i in 0..n {
            points.push(Point::new(i as f64 + 1.0, i as f64));
            points.push(Point::new(i as f64 + 1.0, i as f64 + 1.0));
        }
        points.push(Point::new(0.0, n as f64));
        TracePath::from_polyline(&points, true)
    }

    #[test]
    fn staircase_becomes_a_chord() {
        let path = stepped_triangle(12);
        let params = SmoothParams {
            fit_curves: false,
            ..SmoothParams::default()
        };
        let run = PipelineRun::detached(Stage::Smooth);
        let (out, fits) = smooth_path_with_report(&path, &params, &run).unwrap();
        assert_eq!(fits.len(), 1);
        assert_eq!(fits[0].range, 1..25);
        assert_eq!(out.segments()[1], PathEl::LineTo(Point::new(12.0, 12.0)));
        assert_eq!(out.len(), 4);
        assert!(out.is_closed());
    }

    #[test]
    fn accepted_fits_respect_the_budget() {
        let path = stepped_triangle(20);
        let params = SmoothParams::default();
        let run = PipelineRun::detached(Stage::Smooth);
        let (paths, fits) = smooth_paths(&[path], &params, &run).unwrap();
        assert_eq!(paths.len(), 1);
        assert!(!fits.is_empty());
        assert!(fits.iter().all(|f| f.deviation <= params.max_deviation));
    }

    #[test]
    fn paths_without_steps_are_untouched() {
        let square = TracePath::from_polyline(
            &[
                Point::new(0.0, 0.0),
                Point::new(10.0, 0.0),
                Point::new(10.0, 10.0),
                Point::new(0.0, 10.0),
            ],
            true,
        );
        let run = PipelineRun::detached(Stage::Smooth);
        let (out, fits) = smooth_path_with_report(&square, &SmoothParams::default(), &run).unwrap();
        assert!(fits.is_empty());
        assert_eq!(out, square);
    }

    #[test]
    fn cancelled_smoothing_fails() {
        let run = PipelineRun::detached(Stage::Smooth);
        run.cancel_token().cancel();
        let result = smooth_paths(&[stepped_triangle(5)], &SmoothParams::default(), &run);
        assert!(matches!(result, Err(TraceError::Cancelled)));
    }
}
