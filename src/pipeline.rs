//! Stage sequencing, cooperative cancellation, progress and host callbacks.
//!
//! At most one stage runs at a time. A stage works on its own copy of the
//! path list; the runner swaps the list only when the stage succeeds, so a
//! cancelled or failed stage leaves the previous list untouched.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::TracingConfig;
use crate::error::TraceError;
use crate::path::TracePath;
use crate::raster::RasterView;
use crate::region::Region;
use crate::smooth::DeviationResult;
use crate::{lines, merge, optimize, scan, smooth, split, tiny};

/// Pipeline stages in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Scan,
    Optimize,
    Split,
    DetectLines,
    Merge,
    Smooth,
    RemoveTiny,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::Scan,
        Stage::Optimize,
        Stage::Split,
        Stage::DetectLines,
        Stage::Merge,
        Stage::Smooth,
        Stage::RemoveTiny,
    ];

    /// The stage chained after this one.
    pub fn next(self) -> Option<Stage> {
        let i = Stage::ALL.iter().position(|&s| s == self)?;
        Stage::ALL.get(i + 1).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Scan => "scan",
            Stage::Optimize => "optimize",
            Stage::Split => "split",
            Stage::DetectLines => "detect-lines",
            Stage::Merge => "merge",
            Stage::Smooth => "smooth",
            Stage::RemoveTiny => "remove-tiny",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Stage {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| TraceError::Config(format!("unknown stage '{s}'")))
    }
}

/// Shared cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// `Err(Cancelled)` once cancellation was requested.
    pub fn check(&self) -> Result<(), TraceError> {
        if self.is_cancelled() {
            Err(TraceError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// One completed stage, handed to the host as an undo boundary.
#[derive(Debug, Clone)]
pub struct StageRecord {
    pub stage: Stage,
    pub previous: Vec<TracePath>,
    pub current: Vec<TracePath>,
    /// Replacements accepted by the smoother (empty for other stages).
    pub deviations: Vec<DeviationResult>,
    pub elapsed: Duration,
}

/// Callbacks into the host application.
///
/// Every method may be called from the worker thread.
pub trait Host: Send + Sync {
    fn progress(&self, _stage: Stage, _percent: u8) {}

    fn message(&self, _text: &str) {}

    /// Partial results for live preview. The path list is not committed yet.
    fn preview(&self, _stage: Stage, _paths: &[TracePath]) {}

    fn commit(&self, record: StageRecord);

    fn finished(&self, stage: Stage, success: bool);
}

/// A host that ignores everything.
#[derive(Debug, Default)]
pub struct NullHost;

impl Host for NullHost {
    fn commit(&self, _record: StageRecord) {}

    fn finished(&self, _stage: Stage, _success: bool) {}
}

static NULL_HOST: NullHost = NullHost;

/// Per-stage state handed down into every stage function.
pub struct PipelineRun<'a> {
    stage: Stage,
    cancel: CancelToken,
    host: &'a dyn Host,
    progress: AtomicU8,
    started: Instant,
}

impl<'a> PipelineRun<'a> {
    pub fn new(stage: Stage, cancel: CancelToken, host: &'a dyn Host) -> Self {
        Self {
            stage,
            cancel,
            host,
            progress: AtomicU8::new(0),
            started: Instant::now(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Cancellation point.
    pub fn checkpoint(&self) -> Result<(), TraceError> {
        self.cancel.check()
    }

    /// Report `done` of `total` units. Progress never goes backwards.
    pub fn report(&self, done: usize, total: usize) {
        let percent = if total == 0 {
            100
        } else {
            ((done.min(total) * 100) / total) as u8
        };
        let before = self.progress.fetch_max(percent, Ordering::SeqCst);
        if percent > before {
            self.host.progress(self.stage, percent);
        }
    }

    pub fn progress(&self) -> u8 {
        self.progress.load(Ordering::SeqCst)
    }

    pub fn message(&self, text: &str) {
        debug!("{}: {}", self.stage, text);
        self.host.message(text);
    }

    pub fn preview(&self, paths: &[TracePath]) {
        self.host.preview(self.stage, paths);
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}

impl PipelineRun<'static> {
    /// A run without host or outside cancellation, for calling stage
    /// functions directly.
    pub fn detached(stage: Stage) -> Self {
        Self::new(stage, CancelToken::new(), &NULL_HOST)
    }
}

/// Owns the path list and runs stages against it.
pub struct PipelineRunner {
    config: TracingConfig,
    paths: Vec<TracePath>,
    raster: Option<RasterView>,
    region: Option<Region>,
    cancel: CancelToken,
}

impl PipelineRunner {
    pub fn new(config: TracingConfig) -> Self {
        Self {
            config,
            paths: Vec::new(),
            raster: None,
            region: None,
            cancel: CancelToken::new(),
        }
    }

    pub fn with_raster(mut self, raster: RasterView) -> Self {
        self.raster = Some(raster);
        self
    }

    /// Restrict scanning to `region`.
    pub fn with_region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_paths(mut self, paths: Vec<TracePath>) -> Self {
        self.paths = paths;
        self
    }

    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut TracingConfig {
        &mut self.config
    }

    pub fn paths(&self) -> &[TracePath] {
        &self.paths
    }

    pub fn into_paths(self) -> Vec<TracePath> {
        self.paths
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn scan(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::Scan, cont, host)
    }

    pub fn optimize(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::Optimize, cont, host)
    }

    pub fn split(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::Split, cont, host)
    }

    pub fn detect_lines(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::DetectLines, cont, host)
    }

    pub fn merge(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::Merge, cont, host)
    }

    pub fn smooth(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::Smooth, cont, host)
    }

    pub fn remove_tiny(&mut self, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        self.run(Stage::RemoveTiny, cont, host)
    }

    /// Run `stage`, then every following stage when `cont` is set.
    ///
    /// The first failing stage stops the chain; its error is returned after
    /// the host has been told.
    pub fn run(&mut self, stage: Stage, cont: bool, host: &dyn Host) -> Result<(), TraceError> {
        let mut current = Some(stage);
        while let Some(stage) = current {
            self.run_one(stage, host)?;
            current = if cont { stage.next() } else { None };
        }
        Ok(())
    }

    fn run_one(&mut self, stage: Stage, host: &dyn Host) -> Result<(), TraceError> {
        self.cancel.check().inspect_err(|_| host.finished(stage, false))?;
        let run = PipelineRun::new(stage, self.cancel.clone(), host);
        debug!("{stage}: starting on {} paths", self.paths.len());

        match self.execute(&run) {
            Ok((current, deviations)) => {
                run.report(1, 1);
                let elapsed = run.elapsed();
                info!(
                    "{stage}: {} -> {} paths in {}ms",
                    self.paths.len(),
                    current.len(),
                    elapsed.as_millis()
                );
                let previous = std::mem::replace(&mut self.paths, current.clone());
                host.commit(StageRecord {
                    stage,
                    previous,
                    current,
                    deviations,
                    elapsed,
                });
                host.finished(stage, true);
                Ok(())
            }
            Err(err) => {
                match &err {
                    TraceError::Cancelled => info!("{stage}: cancelled, path list restored"),
                    other => warn!("{stage}: failed: {other}"),
                }
                host.finished(stage, false);
                Err(err)
            }
        }
    }

    fn execute(&self, run: &PipelineRun) -> Result<(Vec<TracePath>, Vec<DeviationResult>), TraceError> {
        let config = &self.config;
        let paths = match run.stage() {
            Stage::Scan => {
                let raster = self
                    .raster
                    .as_ref()
                    .ok_or_else(|| TraceError::invariant("scan started without a raster"))?;
                scan::scan_region(raster, &config.scan, self.region.as_ref(), run)?
            }
            Stage::Optimize => {
                let mut paths = self.paths.clone();
                optimize::optimize_paths(&mut paths, &config.optimize, run)?;
                paths
            }
            Stage::Split => split::split_paths(&self.paths, &config.split, run)?,
            Stage::DetectLines => lines::detect_lines(&self.paths, &config.lines, run)?,
            Stage::Merge => merge::merge_paths(self.paths.clone(), &config.merge, run)?,
            Stage::Smooth => return smooth::smooth_paths(&self.paths, &config.smooth, run),
            Stage::RemoveTiny => tiny::remove_tiny(self.paths.clone(), &config.tiny),
        };
        Ok((paths, Vec::new()))
    }

    /// Move the runner onto a worker thread and run `stage` there.
    pub fn spawn<H>(mut self, stage: Stage, cont: bool, host: Arc<H>) -> StageHandle
    where
        H: Host + 'static,
    {
        self.cancel.reset();
        let cancel = self.cancel.clone();
        let handle = thread::spawn(move || {
            let result = self.run(stage, cont, host.as_ref());
            (self, result)
        });
        StageHandle { cancel, handle }
    }
}

/// A stage running on a worker thread.
pub struct StageHandle {
    cancel: CancelToken,
    handle: JoinHandle<(PipelineRunner, Result<(), TraceError>)>,
}

impl StageHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the worker and take the runner back.
    pub fn join(self) -> Result<(PipelineRunner, Result<(), TraceError>), TraceError> {
        self.handle
            .join()
            .map_err(|_| TraceError::invariant("pipeline worker panicked"))
    }
}
