//! Error types for clip assembly.

use thiserror::Error;

/// Result type for assembler operations.
pub type Result<T> = std::result::Result<T, AssemblyError>;

/// Errors that can abort an assembly run.
///
/// Every variant is fatal for the current `assemble()` call. Partial segment
/// lists are never returned alongside an error.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// The source pool is smaller than the configured minimum.
    #[error("Source pool too small: {available} clips, need at least {required}")]
    InsufficientPool { available: usize, required: usize },

    /// Overshoot correction would leave the last segment with no length.
    #[error(
        "Truncating last segment of {source_identifier} by {excess:.3}s leaves {duration:.3}s"
    )]
    DegenerateSegment {
        source_identifier: String,
        /// Duration the segment would have after truncation.
        duration: f64,
        excess: f64,
    },

    /// The retry policy ran out before the minimum total was reached.
    #[error("Assembly gave up after {passes} passes at {accumulated:.3}s")]
    AssemblyTimeout { passes: u32, accumulated: f64 },

    /// The trim/write primitive failed for a segment.
    #[error("Failed to write segment from {source_identifier}")]
    SegmentWrite {
        source_identifier: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },

    /// A clip cannot fit a random start before the end margin.
    #[error(
        "Clip {identifier} is {total_duration:.3}s, needs more than the {start_margin:.3}s start margin"
    )]
    ClipTooShort {
        identifier: String,
        total_duration: f64,
        start_margin: f64,
    },

    /// Configuration values are inconsistent.
    #[error("Invalid assembler config: {message}")]
    InvalidConfig { message: String },

    /// The caller cancelled the run.
    #[error("Assembly cancelled after {passes} passes")]
    Cancelled { passes: u32 },
}

impl AssemblyError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn segment_write(source_identifier: impl Into<String>, err: anyhow::Error) -> Self {
        Self::SegmentWrite {
            source_identifier: source_identifier.into(),
            source: err.into(),
        }
    }
}
