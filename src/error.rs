use thiserror::Error;

/// Errors that can occur while running a tracing stage.
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum TraceError {
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    #[error("unsupported raster pixel encoding: {0}")]
    UnsupportedRasterFormat(String),

    #[error("stage cancelled")]
    Cancelled,

    /// A path operation broke a structural invariant (empty path, drawing
    /// segment before any move). Always a programming fault.
    #[error("path invariant violated: {0}")]
    Invariant(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl TraceError {
    pub(crate) fn invariant(msg: impl Into<String>) -> Self {
        TraceError::Invariant(msg.into())
    }
}
