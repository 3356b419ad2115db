use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;

/// All tracing parameters in one struct, grouped per stage.
/// Designed to be serializable (for saving presets) and
/// adjustable at runtime (for editor sliders).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    pub scan: ScanParams,
    pub optimize: OptimizeParams,
    pub split: SplitParams,
    pub merge: MergeParams,
    pub lines: LineParams,
    pub smooth: SmoothParams,
    pub tiny: TinyParams,
}

impl TracingConfig {
    /// Parse a (possibly partial) JSON preset. Missing fields keep their defaults.
    pub fn from_json_str(data: &str) -> Result<Self, TraceError> {
        serde_json::from_str(data).map_err(|e| TraceError::Config(e.to_string()))
    }

    pub fn from_json_file(path: &Path) -> Result<Self, TraceError> {
        let data = fs::read_to_string(path)
            .map_err(|e| TraceError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_json_str(&data)
            .map_err(|e| TraceError::Config(format!("failed to parse {}: {e}", path.display())))
    }
}

/// Region scan parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanParams {
    /// Foreground colour as RGBA.
    pub foreground: [u8; 4],
    /// Normalized colour distance tolerance in [0, 1].
    pub fuzz: f64,
    /// Sample block width in pixels.
    pub block_width: u32,
    /// Sample block height in pixels.
    pub block_height: u32,
}

impl Default for ScanParams {
    fn default() -> Self {
        Self {
            foreground: [0, 0, 0, 255],
            fuzz: 0.2,
            block_width: 16,
            block_height: 16,
        }
    }
}

/// Collinear-run collapsing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeParams {
    /// Maximum gradient change (radians) for two lines to be merged.
    pub gradient_epsilon: f64,
}

impl Default for OptimizeParams {
    fn default() -> Self {
        Self {
            gradient_epsilon: 0.01,
        }
    }
}

/// How loops found inside one path are regrouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SplitPolicy {
    /// Every loop becomes an independent unfilled path.
    SplitAll,
    /// Even-level loops carry their direct interiors as even-odd holes.
    #[default]
    EvenInteriorSplit,
    /// Outermost loops carry everything they contain.
    ExteriorOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitParams {
    pub policy: SplitPolicy,
    /// Loops with fewer vertices than this *and* less bounds area than
    /// `min_area` are discarded.
    pub min_vertices: usize,
    pub min_area: f64,
    /// Line width assigned to loops emitted as unfilled paths.
    pub line_width: f64,
}

impl Default for SplitParams {
    fn default() -> Self {
        Self {
            policy: SplitPolicy::default(),
            min_vertices: 5,
            min_area: 1.5,
            line_width: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeParams {
    /// Maximum endpoint / border distance for two paths to be welded.
    pub delta_threshold: f64,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            delta_threshold: 2.0,
        }
    }
}

/// Weights of the spike-pairing score. Their relative scaling is empirical.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpikeWeights {
    /// Distance of the pair's midway point from the middle of the trace.
    pub midway: f64,
    /// Difference in inclination of the two spike chords.
    pub inclination: f64,
    /// Average spike length relative to the trace length.
    pub length: f64,
    /// Average before/after turning-angle deviation.
    pub angle: f64,
    /// Numerator of the inverse inter-spike distance term.
    pub distance: f64,
}

impl Default for SpikeWeights {
    fn default() -> Self {
        Self {
            midway: 1.0,
            inclination: 0.5,
            length: 0.5,
            angle: 0.5,
            distance: 2.0,
        }
    }
}

/// Thick-trace to centerline recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineParams {
    /// Maximum half-width (pixels) of a trace that still counts as a stroke.
    pub delta_threshold: f64,
    /// Maximum variance of the pair deviations of an accepted stroke.
    pub variance_threshold: f64,
    /// Enforce `variance_threshold` when accepting a stroke.
    pub check_intersections: bool,
    /// Spikes closer than this along the boundary are merged.
    pub return_point_distance: f64,
    /// Recovered strokes shorter than this are dropped as noise.
    pub min_stub_length: f64,
    /// Round recovered widths up to whole pixels.
    pub round_relative: bool,
    /// Use this width for every stroke instead of the measured one.
    pub fixed_width: Option<f64>,
    /// Arc-length sampling step for boundary correspondence.
    pub sample_step: f64,
    /// Ramer-Douglas-Peucker tolerance applied to recovered centerlines.
    pub centerline_epsilon: f64,
    /// Re-processing depth after which a sub-shape is kept as a region.
    pub max_depth: usize,
    pub spike_weights: SpikeWeights,
}

impl Default for LineParams {
    fn default() -> Self {
        Self {
            delta_threshold: 4.0,
            variance_threshold: 1.0,
            check_intersections: true,
            return_point_distance: 6.0,
            min_stub_length: 3.0,
            round_relative: false,
            fixed_width: None,
            sample_step: 1.0,
            centerline_epsilon: 0.75,
            max_depth: 6,
            spike_weights: SpikeWeights::default(),
        }
    }
}

/// Stair-step smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothParams {
    /// Line segments shorter than this are stair-step candidates.
    pub tiny_step_threshold: f64,
    /// Accepted candidates have area deviation per point at most this.
    pub max_deviation: f64,
    pub fit_curves: bool,
    /// Minimum run points before a cubic is attempted.
    pub min_bezier_samples: usize,
    /// Curves whose tangents diverge less than this (radians) are too flat.
    pub bezier_gradient_threshold: f64,
    /// Candidates at least this long may beat a slightly better short fit.
    pub length_threshold: f64,
    pub threshold_diff: f64,
    /// Slack granted to a curve against the best line.
    pub curve_threshold_diff: f64,
    /// Maximum distance between polyline extrema and curve extrema.
    pub stationary_threshold: f64,
    pub max_iterations: usize,
    pub simplex_epsilon: f64,
    /// Curve flattening tolerance used for symmetric-difference areas.
    pub area_tolerance: f64,
}

impl Default for SmoothParams {
    fn default() -> Self {
        Self {
            tiny_step_threshold: 3.0,
            max_deviation: 0.6,
            fit_curves: true,
            min_bezier_samples: 5,
            bezier_gradient_threshold: 0.15,
            length_threshold: 6.0,
            threshold_diff: 0.1,
            curve_threshold_diff: 0.1,
            stationary_threshold: 1.5,
            max_iterations: 200,
            simplex_epsilon: 1e-4,
            area_tolerance: 1e-3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TinyParams {
    /// Paths with a smaller approximate bounds area are removed.
    pub area_threshold: f64,
}

impl Default for TinyParams {
    fn default() -> Self {
        Self {
            area_threshold: 5.0,
        }
    }
}
