//! Collinear-run collapsing.
//!
//! Consecutive lines whose directions differ by less than the gradient
//! epsilon become one line; lines too short to carry a direction are
//! dropped. Curves, moves and closes are never merged across.

use std::sync::atomic::{AtomicUsize, Ordering};

use kurbo::{PathEl, Point};
use log::debug;
use rayon::prelude::*;

use crate::config::OptimizeParams;
use crate::error::TraceError;
use crate::geom::angle_diff;
use crate::path::TracePath;
use crate::pipeline::PipelineRun;

/// Lines with a squared length below this are dropped.
pub const MIN_SEGMENT_LENGTH_SQ: f64 = 1e-8;

/// Optimize every path in place.
pub fn optimize_paths(
    paths: &mut [TracePath],
    params: &OptimizeParams,
    run: &PipelineRun,
) -> Result<(), TraceError> {
    let total = paths.len();
    let done = AtomicUsize::new(0);
    paths.par_iter_mut().try_for_each(|path| {
        run.checkpoint()?;
        optimize_path(path, params.gradient_epsilon)?;
        run.report(done.fetch_add(1, Ordering::Relaxed) + 1, total);
        Ok(())
    })
}

/// Collapse one path until a pass removes nothing.
pub fn optimize_path(path: &mut TracePath, gradient_epsilon: f64) -> Result<(), TraceError> {
    let before = path.len();
    let mut segments = path.segments().to_vec();
    loop {
        let next = collapse_pass(&segments, gradient_epsilon);
        let shrunk = next.len() < segments.len();
        segments = next;
        if !shrunk {
            break;
        }
    }
    if segments.len() != before {
        debug!("optimize: {before} -> {} segments", segments.len());
        path.set_segments(segments)?;
    }
    Ok(())
}

fn collapse_pass(segments: &[PathEl], gradient_epsilon: f64) -> Vec<PathEl> {
    let mut output: Vec<PathEl> = Vec::with_capacity(segments.len());
    let mut current = Point::ZERO;
    let mut loop_start = Point::ZERO;
    // Start of the last emitted line, while the last element is a line.
    let mut anchor: Option<Point> = None;

    for el in segments {
        match *el {
            PathEl::MoveTo(p) => {
                output.push(*el);
                current = p;
                loop_start = p;
                anchor = None;
            }
            PathEl::LineTo(p) => {
                if (p - current).hypot2() < MIN_SEGMENT_LENGTH_SQ {
                    continue;
                }
                if let (Some(a), Some(last @ PathEl::LineTo(_))) = (anchor, output.last_mut()) {
                    let prev = (current - a).atan2();
                    let next = (p - current).atan2();
                    if angle_diff(prev, next).abs() < gradient_epsilon {
                        *last = PathEl::LineTo(p);
                        current = p;
                        continue;
                    }
                }
                anchor = Some(current);
                output.push(*el);
                current = p;
            }
            PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => {
                output.push(*el);
                current = p;
                anchor = None;
            }
            PathEl::ClosePath => {
                output.push(*el);
                current = loop_start;
                anchor = None;
            }
        }
    }
    output
}
