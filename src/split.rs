//! Loop containment forest and sub-path split policies.
//!
//! Every closed loop of a path is tested against every other loop. Nesting
//! depth decides hole semantics: loops inside an even number of others are
//! solid, the rest are holes of their direct container.

use std::cell::OnceCell;
use std::collections::BTreeSet;
use std::ops::Range;

use kurbo::Point;
use log::debug;

use crate::config::{SplitParams, SplitPolicy};
use crate::error::TraceError;
use crate::geom::{on_ring_boundary, point_in_polygon};
use crate::path::{Join, TracePath, WindingRule};
use crate::pipeline::PipelineRun;

/// Curve flattening tolerance for containment tests.
const FLATTEN_TOLERANCE: f64 = 0.25;

/// Distance under which a probe point counts as lying on a ring.
const BOUNDARY_TOLERANCE: f64 = 1e-9;

/// One closed loop of a parent path.
#[derive(Debug, Clone)]
pub struct SubPath {
    /// Segment range in the parent, ending at its close.
    pub range: Range<usize>,
    /// Flattened vertices (no closing duplicate).
    pub ring: Vec<Point>,
    /// Loops found inside this one.
    pub interior: BTreeSet<usize>,
    /// Loops this one was found inside of.
    pub exterior: BTreeSet<usize>,
    level: OnceCell<usize>,
}

impl SubPath {
    fn new(range: Range<usize>, ring: Vec<Point>) -> Self {
        Self {
            range,
            ring,
            interior: BTreeSet::new(),
            exterior: BTreeSet::new(),
            level: OnceCell::new(),
        }
    }

    /// Nesting depth: the number of loops containing this one.
    pub fn level(&self) -> usize {
        *self.level.get_or_init(|| self.exterior.len())
    }

    pub fn is_container(&self) -> bool {
        !self.interior.is_empty()
    }
}

/// Containment analysis of the loops of one path.
#[derive(Debug, Clone)]
pub struct LoopForest {
    pub loops: Vec<SubPath>,
    /// Sub-paths that are not closed; they take no part in containment.
    pub open: Vec<Range<usize>>,
}

/// Which small loops to drop while building a forest.
#[derive(Debug, Clone, Copy)]
pub struct LoopFilter {
    pub min_vertices: usize,
    pub min_area: f64,
}

impl LoopForest {
    /// Split `path` at every close and record loop containment.
    pub fn build(path: &TracePath, filter: Option<LoopFilter>, run: &PipelineRun) -> Result<Self, TraceError> {
        let mut loops = Vec::new();
        let mut open = Vec::new();
        for range in path.sub_path_ranges() {
            let piece = path.extract(range.clone())?;
            if !piece.is_closed() {
                open.push(range);
                continue;
            }
            let Some(ring) = piece.loops(FLATTEN_TOLERANCE).into_iter().next() else {
                continue;
            };
            if let Some(f) = filter {
                if ring.len() < f.min_vertices && piece.bounds_area() < f.min_area {
                    debug!("split: dropping {}-vertex loop", ring.len());
                    continue;
                }
            }
            loops.push(SubPath::new(range, ring));
        }

        let n = loops.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let Some(probe) = probe_point(&loops[j].ring, &loops[i].ring) else {
                    continue;
                };
                if !point_in_polygon(probe, &loops[i].ring) {
                    continue;
                }
                // Never record a cycle.
                if loops[i].interior.contains(&j) || loops[j].interior.contains(&i) {
                    continue;
                }
                loops[i].interior.insert(j);
                loops[j].exterior.insert(i);
            }
            run.checkpoint()?;
        }
        Ok(Self { loops, open })
    }

    pub fn len(&self) -> usize {
        self.loops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loops.is_empty()
    }

    pub fn level(&self, i: usize) -> usize {
        self.loops[i].level()
    }

    /// Loops directly inside loop `i` (one level deeper).
    pub fn direct_interiors(&self, i: usize) -> Vec<usize> {
        let level = self.level(i);
        self.loops[i]
            .interior
            .iter()
            .copied()
            .filter(|&j| self.level(j) == level + 1)
            .collect()
    }

    /// Outermost loops.
    pub fn roots(&self) -> Vec<usize> {
        (0..self.loops.len()).filter(|&i| self.level(i) == 0).collect()
    }

    /// Loop `i` as a standalone path with the parent's style.
    pub fn loop_path(&self, parent: &TracePath, i: usize) -> Result<TracePath, TraceError> {
        parent.extract(self.loops[i].range.clone())
    }

    /// Loop `i` followed by the `holes`, as one even-odd filled path.
    pub fn compound(&self, parent: &TracePath, i: usize, holes: &[usize]) -> Result<TracePath, TraceError> {
        let mut path = self.loop_path(parent, i)?;
        for &h in holes {
            path.append(&self.loop_path(parent, h)?, Join::Move)?;
        }
        let width = path.line_width;
        Ok(path.with_style(WindingRule::EvenOdd, true, width))
    }
}

/// First vertex of `ring` that does not lie on `other`'s boundary.
fn probe_point(ring: &[Point], other: &[Point]) -> Option<Point> {
    ring.iter()
        .copied()
        .find(|&p| !on_ring_boundary(p, other, BOUNDARY_TOLERANCE))
}

/// Regroup the loops of every filled path according to the split policy.
pub fn split_paths(paths: &[TracePath], params: &SplitParams, run: &PipelineRun) -> Result<Vec<TracePath>, TraceError> {
    let filter = LoopFilter {
        min_vertices: params.min_vertices,
        min_area: params.min_area,
    };
    let mut output = Vec::new();
    for (k, path) in paths.iter().enumerate() {
        run.checkpoint()?;
        if !path.filled {
            output.push(path.clone());
            continue;
        }
        let forest = LoopForest::build(path, Some(filter), run)?;
        for range in &forest.open {
            output.push(path.extract(range.clone())?);
        }
        output.extend(apply_policy(path, &forest, params)?);
        run.report(k + 1, paths.len());
        run.preview(&output);
    }
    debug!("split: {} paths -> {}", paths.len(), output.len());
    Ok(output)
}

fn apply_policy(path: &TracePath, forest: &LoopForest, params: &SplitParams) -> Result<Vec<TracePath>, TraceError> {
    let mut output = Vec::new();
    match params.policy {
        SplitPolicy::SplitAll => {
            for i in 0..forest.len() {
                let piece = forest.loop_path(path, i)?;
                let winding = piece.winding;
                output.push(piece.with_style(winding, false, params.line_width));
            }
        }
        SplitPolicy::EvenInteriorSplit => {
            for i in 0..forest.len() {
                if forest.level(i) % 2 == 1 {
                    continue;
                }
                output.push(forest.compound(path, i, &forest.direct_interiors(i))?);
            }
        }
        SplitPolicy::ExteriorOnly => {
            for i in forest.roots() {
                let sub = &forest.loops[i];
                if sub.is_container() {
                    let all: Vec<usize> = sub.interior.iter().copied().collect();
                    output.push(forest.compound(path, i, &all)?);
                } else {
                    output.push(forest.loop_path(path, i)?);
                }
            }
        }
    }
    Ok(output)
}
