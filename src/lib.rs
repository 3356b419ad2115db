//! stroketrace: raster regions → clean vector paths.
//!
//! Scans the pixels of an image that match a foreground colour into a
//! filled outline, then refines it stage by stage: collinear lines are
//! collapsed, nested loops regrouped, thick traces of drawn strokes turned
//! into centerlines with a width, nearby pieces welded, stair steps
//! smoothed into lines and cubic curves, and specks removed.
//!
//! # Example
//!
//! ```no_run
//! use stroketrace::{load_image, NullHost, PipelineRunner, RasterView, Stage, TracingConfig};
//! use std::path::Path;
//!
//! let image = load_image(Path::new("drawing.png"))?;
//! let mut runner = PipelineRunner::new(TracingConfig::default())
//!     .with_raster(RasterView::from_image(&image)?);
//! runner.run(Stage::Scan, true, &NullHost)?;
//! for path in runner.paths() {
//!     println!("{}", path.to_bezpath().to_svg());
//! }
//! # Ok::<(), stroketrace::TraceError>(())
//! ```

#![forbid(unsafe_code)]

mod geom;

pub mod config;
pub mod error;
pub mod lines;
pub mod merge;
pub mod optimize;
pub mod path;
pub mod pipeline;
pub mod raster;
pub mod region;
pub mod scan;
pub mod smooth;
pub mod split;
pub mod tiny;

// Re-export kurbo so downstream users get the same version used by
// `TracePath` segments.
pub use kurbo;

pub use config::{
    LineParams, MergeParams, OptimizeParams, ScanParams, SmoothParams, SpikeWeights, SplitParams, SplitPolicy,
    TinyParams, TracingConfig,
};
pub use error::TraceError;
pub use path::{Direction, Join, TracePath, WindingRule};
pub use pipeline::{CancelToken, Host, NullHost, PipelineRun, PipelineRunner, Stage, StageHandle, StageRecord};
pub use raster::{load_image, ChannelLayout, ColorMatcher, RasterView};
pub use region::Region;
pub use smooth::{DeviationResult, FitShape};
