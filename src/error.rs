//! Error types for motion loading, indexing, and splicing.
//!
//! Only failures that stop processing of a clip (or a query) surface here.
//! Degenerate geometry during heading extraction and undersized blend
//! windows are recovered locally and never reach the caller as errors.

use thiserror::Error;

/// Main error type for motion matching operations.
#[derive(Error, Debug)]
pub enum MotionError {
    /// Malformed BVH hierarchy (missing OFFSET/CHANNELS, unbalanced braces).
    #[error("Malformed hierarchy at line {line}: {context}")]
    Structural { context: String, line: usize },

    /// Channel layout violates the configured validation policy.
    #[error("Channel layout invalid: {0}")]
    ChannelMismatch(String),

    /// A motion row carries fewer values than the hierarchy requires.
    #[error("Frame {frame} is short: need {needed} channel values, got {got}")]
    FrameDataShortfall {
        frame: usize,
        needed: usize,
        got: usize,
    },

    /// Two clips with different sample rates cannot be spliced.
    #[error("Frame times do not match: {left} vs {right}")]
    FrameTimeMismatch { left: f64, right: f64 },

    /// Nearest-neighbor query against a corpus with zero entries.
    #[error("Motion index is empty")]
    EmptyIndex,

    /// A numeric field in the BVH text failed to parse.
    #[error("Parse error at line {line}: {context}")]
    Parse { context: String, line: usize },

    /// Configuration validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Underlying file I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any load failure tagged with the file it came from.
    #[error("{path}: {source}")]
    File {
        path: String,
        #[source]
        source: Box<MotionError>,
    },
}

/// Result type alias for motion matching operations.
pub type Result<T> = std::result::Result<T, MotionError>;

impl MotionError {
    /// Create a structural hierarchy error.
    #[must_use]
    pub fn structural(context: impl Into<String>, line: usize) -> Self {
        Self::Structural {
            context: context.into(),
            line,
        }
    }

    /// Create a channel layout error.
    #[must_use]
    pub fn channel_mismatch(msg: impl Into<String>) -> Self {
        Self::ChannelMismatch(msg.into())
    }

    /// Create a frame shortfall error.
    #[must_use]
    pub const fn frame_shortfall(frame: usize, needed: usize, got: usize) -> Self {
        Self::FrameDataShortfall { frame, needed, got }
    }

    /// Create a parse error with line context.
    #[must_use]
    pub fn parse(context: impl Into<String>, line: usize) -> Self {
        Self::Parse {
            context: context.into(),
            line,
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Tag an error with the file it was encountered in.
    #[must_use]
    pub fn in_file(path: impl AsRef<std::path::Path>, source: Self) -> Self {
        Self::File {
            path: path.as_ref().display().to_string(),
            source: Box::new(source),
        }
    }
}
