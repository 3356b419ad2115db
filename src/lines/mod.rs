//! Thick-trace to centerline recovery.
//!
//! A filled shape that is really the two-sided outline of a drawn stroke is
//! replaced by its centerline with a measured width. Shapes are handled from
//! an explicit work queue:
//!
//! 1. A single loop is split into two sides and paired point by point
//! 2. A loop with one hole pairs the outer ring with the hole
//! 3. A loop with several holes first dissolves the walls between holes
//!
//! Where the sides drift apart (spikes, bulges) the offending part is cut
//! out as a smaller shape and queued again, down to a fixed depth.

pub mod correspond;
pub mod spikes;
pub mod weld;

use std::collections::VecDeque;

use geo::{Coord, LineString, Simplify};
use kurbo::Point;
use log::{debug, info};

use crate::config::LineParams;
use crate::error::TraceError;
use crate::geom::{median, polyline_length, signed_area};
use crate::path::{Join, TracePath, WindingRule};
use crate::pipeline::PipelineRun;
use crate::split::LoopForest;

use correspond::{pair_rings, split_loop, Correspondence};
use spikes::{best_pair, find_spikes, merge_close};
use weld::weld_closest_holes;

/// Sub-loops with less area than this are dropped as slivers.
const MIN_SHAPE_AREA: f64 = 1.0;

/// Share of pairs that must lie within the deviation threshold before a
/// rejected trace is cut at its spikes instead of kept as a region.
const MIN_LINE_FRACTION: f64 = 0.5;

/// One filled shape waiting in the work queue.
#[derive(Debug, Clone)]
struct Shape {
    outer: Vec<Point>,
    holes: Vec<Vec<Point>>,
    depth: usize,
}

impl Shape {
    fn to_region(&self) -> Result<TracePath, TraceError> {
        let mut path = TracePath::from_polyline(&self.outer, true);
        for hole in &self.holes {
            path.append(&TracePath::from_polyline(hole, true), Join::Move)?;
        }
        Ok(path.with_style(WindingRule::EvenOdd, true, 1.0))
    }
}

struct Detector<'a, 'r> {
    params: &'a LineParams,
    run: &'a PipelineRun<'r>,
    queue: VecDeque<Shape>,
    strokes: Vec<TracePath>,
    regions: Vec<TracePath>,
}

/// Replace thick traces by centerline strokes.
pub fn detect_lines(paths: &[TracePath], params: &LineParams, run: &PipelineRun) -> Result<Vec<TracePath>, TraceError> {
    let mut output = Vec::with_capacity(paths.len());
    let mut recovered = 0usize;
    for (k, path) in paths.iter().enumerate() {
        run.checkpoint()?;
        let result = detect_path(path, params, run)?;
        recovered += result.iter().filter(|p| !p.filled).count();
        output.extend(result);
        run.report(k + 1, paths.len());
        run.preview(&output);
    }
    info!("detect-lines: {} paths -> {} ({recovered} strokes)", paths.len(), output.len());
    Ok(output)
}

/// Centerline strokes (plus leftover filled regions) for one path, or the
/// path itself when no stroke could be recovered.
pub fn detect_path(path: &TracePath, params: &LineParams, run: &PipelineRun) -> Result<Vec<TracePath>, TraceError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    if !path.is_closed() {
        return Ok(open_stroke(path, params).into_iter().collect());
    }
    if !path.filled {
        return Ok(vec![path.clone()]);
    }

    let forest = LoopForest::build(path, None, run)?;
    let mut detector = Detector {
        params,
        run,
        queue: VecDeque::new(),
        strokes: Vec::new(),
        regions: Vec::new(),
    };
    for i in 0..forest.len() {
        if forest.level(i) % 2 == 1 {
            continue;
        }
        detector.queue.push_back(Shape {
            outer: forest.loops[i].ring.clone(),
            holes: forest
                .direct_interiors(i)
                .into_iter()
                .map(|j| forest.loops[j].ring.clone())
                .collect(),
            depth: 0,
        });
    }
    for range in &forest.open {
        detector.strokes.extend(open_stroke(&path.extract(range.clone())?, params));
    }

    detector.drain()?;
    if detector.strokes.is_empty() {
        debug!("detect-lines: no stroke found, keeping the shape");
        return Ok(vec![path.clone()]);
    }
    let mut out = detector.strokes;
    out.extend(detector.regions);
    Ok(out)
}

/// Open paths keep their geometry; only stubs are dropped and widths set.
fn open_stroke(path: &TracePath, params: &LineParams) -> Option<TracePath> {
    if path.length() < params.min_stub_length {
        return None;
    }
    let width = stroke_width(path.line_width, params);
    let winding = path.winding;
    Some(path.clone().with_style(winding, false, width))
}

/// Final stroke width from a measured one. Strokes are measured as twice the
/// median pair deviation: the pairs near an open end close in on the cap and
/// would pull a mean below the width of the body.
fn stroke_width(measured: f64, params: &LineParams) -> f64 {
    if let Some(width) = params.fixed_width {
        width
    } else if params.round_relative {
        (measured - 1e-6).ceil().max(1.0)
    } else {
        measured
    }
}

/// Ramer-Douglas-Peucker on a centerline.
fn simplify_centerline(points: &[Point], epsilon: f64, closed: bool) -> Vec<Point> {
    let mut coords: Vec<Coord<f64>> = points.iter().map(|p| Coord { x: p.x, y: p.y }).collect();
    if closed {
        coords.extend(coords.first().copied());
    }
    let simplified = LineString::from(coords).simplify(&epsilon);
    let mut out: Vec<Point> = simplified.coords().map(|c| Point::new(c.x, c.y)).collect();
    if closed && out.len() > 1 && out.first() == out.last() {
        out.pop();
    }
    out
}

impl Detector<'_, '_> {
    fn drain(&mut self) -> Result<(), TraceError> {
        while let Some(shape) = self.queue.pop_front() {
            self.run.checkpoint()?;
            if shape.depth > self.params.max_depth {
                debug!("detect-lines: depth limit reached, keeping a region");
                self.regions.push(shape.to_region()?);
                continue;
            }
            match shape.holes.len() {
                0 => self.lineify_loop(shape)?,
                1 => self.lineify_ring(shape)?,
                _ => self.lineify_junction(shape)?,
            }
        }
        Ok(())
    }

    fn lineify_loop(&mut self, shape: Shape) -> Result<(), TraceError> {
        match split_loop(&shape.outer, self.params.sample_step) {
            Some(corr) => self.resolve(corr, &shape),
            None => self.keep_region(&shape),
        }
    }

    fn lineify_ring(&mut self, shape: Shape) -> Result<(), TraceError> {
        match pair_rings(&shape.outer, &shape.holes[0], self.params.sample_step) {
            Some(corr) => self.resolve(corr, &shape),
            None => self.keep_region(&shape),
        }
    }

    fn keep_region(&mut self, shape: &Shape) -> Result<(), TraceError> {
        self.regions.push(shape.to_region()?);
        Ok(())
    }

    fn lineify_junction(&mut self, shape: Shape) -> Result<(), TraceError> {
        let mut holes = shape.holes.clone();
        while holes.len() > 1 {
            self.run.checkpoint()?;
            let Some(weld) = weld_closest_holes(&holes, self.params.delta_threshold, self.params.sample_step) else {
                break;
            };
            debug!("detect-lines: dissolving wall between holes {} and {}", weld.first, weld.second);
            self.push_stroke(&weld.wall);
            holes.remove(weld.second);
            holes[weld.first] = weld.merged;
        }
        let rest = Shape { holes, ..shape };
        if rest.holes.len() == 1 {
            self.lineify_ring(rest)
        } else {
            self.keep_region(&rest)
        }
    }

    /// Mean half-width within the threshold and, when checked, an even width.
    fn accepts(&self, corr: &Correspondence) -> bool {
        let (mean, variance) = corr.mean_variance();
        mean <= self.params.delta_threshold
            && !(self.params.check_intersections && variance > self.params.variance_threshold)
    }

    /// Accept the pairs as one stroke, or cut the trace at its spikes.
    fn resolve(&mut self, corr: Correspondence, shape: &Shape) -> Result<(), TraceError> {
        if self.accepts(&corr) {
            self.push_stroke(&corr);
            return Ok(());
        }
        let threshold = self.params.delta_threshold;
        let dev = corr.deviations();
        let within = dev.iter().filter(|&&d| d <= threshold).count();
        if (within as f64) < MIN_LINE_FRACTION * dev.len() as f64 {
            return self.keep_region(shape);
        }
        let corr = if corr.cyclic {
            let n = corr.len();
            match (0..n).find(|&i| dev[i] > threshold && dev[(i + n - 1) % n] <= threshold) {
                Some(start) => corr.rotated(start),
                None => return self.keep_region(shape),
            }
        } else {
            corr
        };

        let spikes = merge_close(find_spikes(&corr, threshold), &corr, self.params.return_point_distance);
        if spikes.is_empty() {
            return self.keep_region(shape);
        }
        let depth = shape.depth + 1;
        let last = corr.len() - 1;

        if spikes.len() <= 2 {
            let mut cursor = 0;
            for spike in &spikes {
                let (s, e) = (*spike.range.start(), *spike.range.end());
                if s > cursor + 1 {
                    self.push_stroke(&slice(&corr, cursor, s - 1));
                }
                self.queue_sub_loop(&corr, s.saturating_sub(1), (e + 1).min(last), depth);
                cursor = e + 1;
            }
            if cursor < last {
                self.push_stroke(&slice(&corr, cursor, last));
            }
            return Ok(());
        }

        if let Some((p, q)) = best_pair(&spikes, &corr, &self.params.spike_weights) {
            let (s, e) = (*spikes[p].range.start(), *spikes[q].range.end());
            debug!("detect-lines: {} spikes, re-processing pairs {s}..={e}", spikes.len());
            self.queue_sub_loop(&corr, s, e, depth);
            if s >= 2 {
                self.queue_sub_loop(&corr, 0, s, depth);
            }
            if e + 2 <= last {
                self.queue_sub_loop(&corr, e, last, depth);
            }
        }
        Ok(())
    }

    fn queue_sub_loop(&mut self, corr: &Correspondence, start: usize, end: usize, depth: usize) {
        if end <= start {
            return;
        }
        let ring = corr.sub_loop(start, end);
        if signed_area(&ring).abs() < MIN_SHAPE_AREA {
            return;
        }
        self.queue.push_back(Shape {
            outer: ring,
            holes: Vec::new(),
            depth,
        });
    }

    fn push_stroke(&mut self, corr: &Correspondence) {
        let centerline = simplify_centerline(&corr.centerline(), self.params.centerline_epsilon, corr.cyclic);
        let length = polyline_length(&centerline, corr.cyclic);
        if centerline.len() < 2 || length < self.params.min_stub_length {
            debug!("detect-lines: dropping {length:.1} px stub");
            return;
        }
        let width = stroke_width(2.0 * median(&corr.deviations()), self.params);
        self.strokes
            .push(TracePath::from_polyline(&centerline, corr.cyclic).with_style(WindingRule::NonZero, false, width));
    }
}

fn slice(corr: &Correspondence, start: usize, end: usize) -> Correspondence {
    Correspondence {
        fits: corr.fits[start..=end].to_vec(),
        cyclic: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Stage;

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
    fn thin_bar_becomes_one_stroke() {
        let run = PipelineRun::detached(Stage::DetectLines);
        let out = detect_path(&rect(10.0, 10.0, 60.0, 4.0), &LineParams::default(), &run).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].filled);
        assert!((out[0].length() - 60.0).abs() < 2.0);
        assert!((out[0].line_width - 4.0).abs() < 0.2);
    }

    #[test]
    fn fixed_and_rounded_widths() {
        let run = PipelineRun::detached(Stage::DetectLines);
        let fixed = LineParams {
            fixed_width: Some(2.5),
            ..LineParams::default()
        };
        let out = detect_path(&rect(0.0, 0.0, 50.0, 3.0), &fixed, &run).unwrap();
        assert_eq!(out[0].line_width, 2.5);

        let rounded = LineParams {
            round_relative: true,
            ..LineParams::default()
        };
        let out = detect_path(&rect(0.0, 0.0, 50.0, 3.0), &rounded, &run).unwrap();
        assert_eq!(out[0].line_width, 3.0);
    }

    #[test]
    fn square_ring_becomes_a_closed_stroke() {
        let mut path = rect(0.0, 0.0, 40.0, 40.0);
        path.append(&rect(4.0, 4.0, 32.0, 32.0).reversed(), Join::Move).unwrap();
        let run = PipelineRun::detached(Stage::DetectLines);
        let out = detect_path(&path, &LineParams::default(), &run).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_closed());
        assert!(!out[0].filled);
        assert!((out[0].line_width - 4.0).abs() < 0.2);
        assert!((out[0].length() - 144.0).abs() < 8.0);
    }

    #[test]
    fn fat_blob_is_kept() {
        let run = PipelineRun::detached(Stage::DetectLines);
        let blob = rect(0.0, 0.0, 30.0, 30.0);
        let out = detect_path(&blob, &LineParams::default(), &run).unwrap();
        assert_eq!(out, vec![blob]);
    }

    #[test]
    fn short_open_paths_are_stubs() {
        let run = PipelineRun::detached(Stage::DetectLines);
        let stub = TracePath::from_polyline(&[Point::new(0.0, 0.0), Point::new(2.0, 0.0)], false);
        assert!(detect_path(&stub, &LineParams::default(), &run).unwrap().is_empty());
        let line = TracePath::from_polyline(&[Point::new(0.0, 0.0), Point::new(20.0, 0.0)], false);
        let out = detect_path(&line, &LineParams::default(), &run).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].filled);
    }

    #[test]
    fn two_holes_make_a_junction() {
        let mut path = rect(0.0, 0.0, 40.0, 20.0);
        path.append(&rect(4.0, 4.0, 14.0, 12.0).reversed(), Join::Move).unwrap();
        path.append(&rect(22.0, 4.0, 14.0, 12.0).reversed(), Join::Move).unwrap();
        let run = PipelineRun::detached(Stage::DetectLines);
        let out = detect_path(&path, &LineParams::default(), &run).unwrap();
        let strokes: Vec<&TracePath> = out.iter().filter(|p| !p.filled).collect();
        assert!(strokes.len() >= 2);
        assert!(strokes.iter().all(|p| p.line_width >= 3.0 && p.line_width <= 5.0));
    }

    #[test]
    fn tapering_wedge_stays_filled() {
        let run = PipelineRun::detached(Stage::DetectLines);
        let wedge = TracePath::from_polyline(
            &[Point::new(0.0, 10.0), Point::new(60.0, 6.25), Point::new(60.0, 13.75)],
            true,
        );
        // Narrow on average, but the width varies too much along the trace.
        let out = detect_path(&wedge, &LineParams::default(), &run).unwrap();
        assert_eq!(out, vec![wedge.clone()]);

        let unchecked = LineParams {
            check_intersections: false,
            ..LineParams::default()
        };
        let out = detect_path(&wedge, &unchecked, &run).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].filled);
    }

    /// A straight two-sided trace along y = 0 with the given half-widths.
    fn trace(deviations: &[f64]) -> Correspondence {
        let fits = deviations
            .iter()
            .enumerate()
            .map(|(i, &d)| correspond::LineFit {
                deviation: d,
                index_a: i,
                index_b: i,
                point_a: Point::new(i as f64, -d),
                point_b: Point::new(i as f64, d),
            })
            .collect();
        Correspondence { fits, cyclic: false }
    }

    fn detector<'a, 'r>(params: &'a LineParams, run: &'a PipelineRun<'r>) -> Detector<'a, 'r> {
        Detector {
            params,
            run,
            queue: VecDeque::new(),
            strokes: Vec::new(),
            regions: Vec::new(),
        }
    }

    fn bar_shape(depth: usize) -> Shape {
        Shape {
            outer: vec![
                Point::new(0.0, 0.0),
                Point::new(60.0, 0.0),
                Point::new(60.0, 4.0),
                Point::new(0.0, 4.0),
            ],
            holes: Vec::new(),
            depth,
        }
    }

    #[test]
    fn many_spikes_requeue_the_best_pair_first() {
        let mut d = vec![1.0; 41];
        for i in [2, 10, 30, 38] {
            d[i] = 6.0;
        }
        let corr = trace(&d);
        let params = LineParams::default();
        let run = PipelineRun::detached(Stage::DetectLines);
        let mut det = detector(&params, &run);
        det.resolve(corr.clone(), &bar_shape(0)).unwrap();

        assert!(det.strokes.is_empty());
        assert!(det.regions.is_empty());
        let queued: Vec<&Vec<Point>> = det.queue.iter().map(|s| &s.outer).collect();
        assert_eq!(
            queued,
            vec![&corr.sub_loop(2, 38), &corr.sub_loop(0, 2), &corr.sub_loop(38, 40)]
        );
        assert!(det.queue.iter().all(|s| s.depth == 1));
    }

    #[test]
    fn shapes_past_the_depth_limit_are_regions() {
        let params = LineParams {
            max_depth: 0,
            ..LineParams::default()
        };
        let run = PipelineRun::detached(Stage::DetectLines);

        let mut det = detector(&params, &run);
        det.queue.push_back(bar_shape(1));
        det.drain().unwrap();
        assert!(det.strokes.is_empty());
        assert_eq!(det.regions.len(), 1);
        assert!(det.regions[0].filled);

        let mut det = detector(&params, &run);
        det.queue.push_back(bar_shape(0));
        det.drain().unwrap();
        assert_eq!(det.strokes.len(), 1);
        assert!(det.regions.is_empty());
    }

    #[test]
    fn bulge_without_depth_budget_keeps_its_middle() {
        let bulge = TracePath::from_polyline(
            &[
                Point::new(0.0, 0.0),
                Point::new(24.0, 0.0),
                Point::new(24.0, -4.0),
                Point::new(36.0, -4.0),
                Point::new(36.0, 0.0),
                Point::new(60.0, 0.0),
                Point::new(60.0, 4.0),
                Point::new(36.0, 4.0),
                Point::new(36.0, 8.0),
                Point::new(24.0, 8.0),
                Point::new(24.0, 4.0),
                Point::new(0.0, 4.0),
            ],
            true,
        );
        let params = LineParams {
            max_depth: 0,
            ..LineParams::default()
        };
        let run = PipelineRun::detached(Stage::DetectLines);
        let out = detect_path(&bulge, &params, &run).unwrap();
        let (regions, strokes): (Vec<&TracePath>, Vec<&TracePath>) = out.iter().partition(|p| p.filled);
        assert_eq!(regions.len(), 1);
        assert!(!strokes.is_empty());
        assert!(strokes.iter().all(|p| p.line_width >= 3.0 && p.line_width <= 5.0));
    }

    #[test]
    fn centerline_simplification_keeps_corners() {
        let pts: Vec<Point> = (0..=10)
            .map(|i| Point::new(i as f64, 0.0))
            .chain((1..=10).map(|i| Point::new(10.0, i as f64)))
            .collect();
        let simplified = simplify_centerline(&pts, 0.5, false);
        assert_eq!(
            simplified,
            vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(10.0, 10.0)]
        );
    }
}
