//! Candidate replacements for a stair-step slice and their area deviation.
//!
//! The deviation δ of a candidate is the area enclosed between the slice and
//! the candidate, divided by the number of slice points.

use std::ops::Range;

use kurbo::{CubicBez, Line, ParamCurve, ParamCurveArclen, ParamCurveExtrema, PathEl, Point, Vec2};

use crate::config::SmoothParams;
use crate::error::TraceError;
use crate::geom::{angle_between, polyline_length};
use crate::path::flatten_segment;
use crate::pipeline::PipelineRun;

use super::area::even_odd_area;
use super::simplex;
use super::stairs::StairRun;

/// Accuracy used for curve arc lengths.
const ARCLEN_ACCURACY: f64 = 1e-3;

/// Curve parameters this close to either end are not interior extrema.
const EXTREMUM_MARGIN: f64 = 1e-6;

/// Geometry replacing a slice of a run.
#[derive(Debug, Clone, PartialEq)]
pub enum FitShape {
    Line(Line),
    /// Chords through the bends; includes both ends.
    Polyline(Vec<Point>),
    Cubic(CubicBez),
}

impl FitShape {
    pub fn is_curve(&self) -> bool {
        matches!(self, FitShape::Cubic(_))
    }

    pub fn length(&self) -> f64 {
        match self {
            FitShape::Line(line) => line.length(),
            FitShape::Polyline(points) => polyline_length(points, false),
            FitShape::Cubic(cubic) => cubic.arclen(ARCLEN_ACCURACY),
        }
    }

    /// Segments drawing the shape from its start point.
    pub fn segments(&self) -> Vec<PathEl> {
        match self {
            FitShape::Line(line) => vec![PathEl::LineTo(line.p1)],
            FitShape::Polyline(points) => points.iter().skip(1).map(|&p| PathEl::LineTo(p)).collect(),
            FitShape::Cubic(c) => vec![PathEl::CurveTo(c.p1, c.p2, c.p3)],
        }
    }

    /// Vertices from the shape's start to its end, curves flattened the
    /// way a path flattens them.
    fn outline(&self, tolerance: f64) -> Vec<Point> {
        let mut at = self.start();
        let mut points = vec![at];
        for el in self.segments() {
            flatten_segment(at, el, tolerance, &mut points);
            at = points.last().copied().unwrap_or(at);
        }
        points
    }

    fn start(&self) -> Point {
        match self {
            FitShape::Line(line) => line.p0,
            FitShape::Polyline(points) => points.first().copied().unwrap_or(Point::ZERO),
            FitShape::Cubic(c) => c.p0,
        }
    }
}

/// One scored candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviationResult {
    pub shape: FitShape,
    /// Path segments the candidate replaces.
    pub range: Range<usize>,
    /// Number of run points covered.
    pub points: usize,
    pub length: f64,
    /// Enclosed area per covered point.
    pub deviation: f64,
    /// Angle between the start and end tangents (curves only).
    pub turning: f64,
    pub flat: bool,
    /// Largest distance from a curve extremum to the nearest bend, if the
    /// curve has interior extrema.
    pub stationary: Option<f64>,
}

impl DeviationResult {
    fn stationary_ok(&self, params: &SmoothParams) -> bool {
        self.stationary.map_or(true, |d| d <= params.stationary_threshold)
    }

    /// Whether `self` should replace `best` as the preferred candidate.
    pub fn beats(&self, best: &DeviationResult, params: &SmoothParams) -> bool {
        match (self.shape.is_curve(), best.shape.is_curve()) {
            (true, false) => {
                !self.flat
                    && self.stationary_ok(params)
                    && self.deviation <= best.deviation + params.curve_threshold_diff
            }
            (false, true) => {
                best.flat
                    || !best.stationary_ok(params)
                    || best.deviation > self.deviation + params.curve_threshold_diff
            }
            _ => {
                if self.length > best.length
                    && self.length >= params.length_threshold
                    && self.deviation <= best.deviation + params.threshold_diff
                {
                    return true;
                }
                if best.length > self.length
                    && best.length >= params.length_threshold
                    && best.deviation <= self.deviation + params.threshold_diff
                {
                    return false;
                }
                self.deviation < best.deviation
            }
        }
    }
}

/// Memo of the preferred accepted candidate per (start, end) pair.
#[derive(Debug)]
pub struct DeviationTable {
    n: usize,
    cells: Vec<Option<Option<DeviationResult>>>,
}

impl DeviationTable {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            cells: vec![None; n * n],
        }
    }

    pub fn get(&self, start: usize, end: usize) -> Option<&Option<DeviationResult>> {
        self.cells.get(start * self.n + end).and_then(Option::as_ref)
    }

    pub fn insert(&mut self, start: usize, end: usize, value: Option<DeviationResult>) {
        if let Some(cell) = self.cells.get_mut(start * self.n + end) {
            *cell = Some(value);
        }
    }
}

/// Scores candidates over the slices of one run.
pub struct Evaluator<'a, 'r> {
    stair: &'a StairRun,
    params: &'a SmoothParams,
    run: &'a PipelineRun<'r>,
    table: DeviationTable,
}

impl<'a, 'r> Evaluator<'a, 'r> {
    pub fn new(stair: &'a StairRun, params: &'a SmoothParams, run: &'a PipelineRun<'r>) -> Self {
        Self {
            stair,
            params,
            run,
            table: DeviationTable::new(stair.points.len()),
        }
    }

    /// Preferred accepted candidate for the slice `start..=end`.
    pub fn best(&mut self, start: usize, end: usize) -> Result<Option<DeviationResult>, TraceError> {
        if let Some(cached) = self.table.get(start, end) {
            return Ok(cached.clone());
        }
        let mut candidates = vec![self.line(start, end)];
        if let Some(bent) = self.bent(start, end) {
            candidates.push(bent);
        }
        if self.params.fit_curves && end - start + 1 >= self.params.min_bezier_samples {
            candidates.push(self.curve(start, end)?);
        }

        let mut best: Option<DeviationResult> = None;
        for candidate in candidates {
            if candidate.deviation > self.params.max_deviation {
                continue;
            }
            if best.as_ref().map_or(true, |b| candidate.beats(b, self.params)) {
                best = Some(candidate);
            }
        }
        self.table.insert(start, end, best.clone());
        Ok(best)
    }

    fn slice(&self, start: usize, end: usize) -> &[Point] {
        &self.stair.points[start..=end]
    }

    fn deviation(&self, start: usize, end: usize, shape: &FitShape) -> f64 {
        let slice = self.slice(start, end);
        let mut ring = slice.to_vec();
        // Back along the candidate; its end is the slice end.
        ring.extend(shape.outline(self.params.area_tolerance).into_iter().rev().skip(1));
        even_odd_area(&ring) / slice.len() as f64
    }

    fn result(&self, start: usize, end: usize, shape: FitShape) -> DeviationResult {
        let deviation = self.deviation(start, end, &shape);
        let (turning, stationary) = match &shape {
            FitShape::Cubic(c) => (
                tangent_turn(c),
                stationary_deviation(c, &self.bend_points(start, end)),
            ),
            _ => (0.0, None),
        };
        DeviationResult {
            range: self.stair.segment_range(start, end),
            points: end - start + 1,
            length: shape.length(),
            deviation,
            turning,
            flat: shape.is_curve() && turning < self.params.bezier_gradient_threshold,
            stationary,
            shape,
        }
    }

    fn bend_points(&self, start: usize, end: usize) -> Vec<Point> {
        self.stair
            .bends_between(start, end)
            .into_iter()
            .map(|b| self.stair.points[b])
            .collect()
    }

    fn line(&self, start: usize, end: usize) -> DeviationResult {
        let line = Line::new(self.stair.points[start], self.stair.points[end]);
        self.result(start, end, FitShape::Line(line))
    }

    fn bent(&self, start: usize, end: usize) -> Option<DeviationResult> {
        let bends = self.bend_points(start, end);
        if bends.is_empty() {
            return None;
        }
        let mut points = vec![self.stair.points[start]];
        points.extend(bends);
        points.push(self.stair.points[end]);
        Some(self.result(start, end, FitShape::Polyline(points)))
    }

    fn curve(&self, start: usize, end: usize) -> Result<DeviationResult, TraceError> {
        let slice = self.slice(start, end);
        let (p0, p3) = (slice[0], slice[slice.len() - 1]);
        let vertices = initial_vertices(slice);
        let minimum = simplex::minimize(
            vertices,
            |v| {
                let cubic = CubicBez::new(p0, Point::new(v[0], v[1]), Point::new(v[2], v[3]), p3);
                self.deviation(start, end, &FitShape::Cubic(cubic))
            },
            self.params.max_iterations,
            self.params.simplex_epsilon,
            self.run,
        )?;
        let v = minimum.point;
        let cubic = CubicBez::new(p0, Point::new(v[0], v[1]), Point::new(v[2], v[3]), p3);
        Ok(self.result(start, end, FitShape::Cubic(cubic)))
    }
}

fn unit_or(v: Vec2, fallback: Vec2) -> Vec2 {
    let len = v.hypot();
    if len > 1e-12 {
        v / len
    } else {
        fallback
    }
}

/// Intersection of the lines `p + s·d` and `q + t·e`.
fn intersect(p: Point, d: Vec2, q: Point, e: Vec2) -> Option<Point> {
    let denom = d.cross(e);
    if denom.abs() < 1e-9 {
        return None;
    }
    let s = (q - p).cross(e) / denom;
    Some(p + d * s)
}

/// Five starting control-point sets: the tangent seed, a degenerate
/// midpoint, the tangent intersection, a stretched seed and the chord.
fn initial_vertices(slice: &[Point]) -> Vec<[f64; 4]> {
    let m = slice.len() - 1;
    let (p0, p3) = (slice[0], slice[m]);
    let chord = p3 - p0;
    let span = chord.hypot();
    let along = unit_or(chord, Vec2::new(1.0, 0.0));
    let d0 = unit_or(slice[m / 3] - p0, along);
    let d1 = unit_or(p3 - slice[(2 * m) / 3], along);
    let mid = slice[m / 2];

    let pack = |a: Point, b: Point| [a.x, a.y, b.x, b.y];
    let seed = pack(p0 + d0 * (span / 3.0), p3 - d1 * (span / 3.0));
    let degenerate = pack(mid, mid);
    let apex = intersect(p0, d0, p3, -d1)
        .filter(|x| x.distance(mid) < span)
        .unwrap_or(mid);
    let elevated = pack(p0 + (apex - p0) * (2.0 / 3.0), p3 + (apex - p3) * (2.0 / 3.0));
    let stretched = pack(p0 + d0 * (span / 2.0), p3 - d1 * (span / 2.0));
    let straight = pack(p0 + chord / 3.0, p0 + chord * (2.0 / 3.0));
    vec![seed, degenerate, elevated, stretched, straight]
}

fn tangent_turn(c: &CubicBez) -> f64 {
    let chord = c.p3 - c.p0;
    let start = if (c.p1 - c.p0).hypot() > 1e-12 { c.p1 - c.p0 } else { c.p2 - c.p0 };
    let end = if (c.p3 - c.p2).hypot() > 1e-12 { c.p3 - c.p2 } else { c.p3 - c.p1 };
    angle_between(unit_or(start, chord), unit_or(end, chord))
}

/// Largest distance from an interior curve extremum to the nearest bend.
fn stationary_deviation(c: &CubicBez, bends: &[Point]) -> Option<f64> {
    let extrema: Vec<Point> = c
        .extrema()
        .into_iter()
        .filter(|&t| t > EXTREMUM_MARGIN && t < 1.0 - EXTREMUM_MARGIN)
        .map(|t| c.eval(t))
        .collect();
    if extrema.is_empty() {
        return None;
    }
    let worst = extrema
        .iter()
        .map(|e| bends.iter().map(|b| e.distance(*b)).fold(f64::INFINITY, f64::min))
        .fold(0.0, f64::max);
    Some(worst)
}
