//! Error types.
//!
//! Construction problems are reported as [`BinnerError`], failures of the
//! parallel segment operators as [`SegmentError`]. [`HistogramError`] is the
//! umbrella type returned by [`Histogram3D`](crate::Histogram3D) operations.

use std::time::Duration;

use crate::config::ConfigError;

// =============================================================================
// BinnerError
// =============================================================================

/// Invalid parameters passed to a binner constructor.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BinnerError {
    #[error("number of bins must be at least 1, got {0}")]
    InvalidBinCount(usize),

    #[error("axis interval must satisfy min < max, got [{min}, {max})")]
    EmptyInterval { min: f64, max: f64 },

    #[error("axis bounds must be finite, got [{min}, {max})")]
    NonFiniteInterval { min: f64, max: f64 },

    #[error("logarithmic axis minimum must be positive, got {0}")]
    NonPositiveMin(f64),

    #[error("logarithmic first step must be positive, got {0}")]
    NonPositiveStep(f64),

    #[error("axis would need more than {limit} bins")]
    TooManyBins { limit: usize },

    #[error("scale factor must be positive and finite, got {0}")]
    InvalidScale(f64),

    #[error("direction vector must be finite and non-zero, got {0:?}")]
    InvalidDirection([f64; 3]),

    #[error("binner directions are coplanar, dual basis is undefined")]
    DegenerateBasis,

    #[error("bin range [{first}, {last}] is not inside 0..{n_bins}")]
    InvalidSubRange {
        first: usize,
        last: usize,
        n_bins: usize,
    },
}

// =============================================================================
// SegmentError
// =============================================================================

/// Failure of one segment operator. Any segment failure fails the whole batch.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SegmentError {
    #[error("segment {segment} did not finish before the deadline")]
    TimedOut { segment: usize },

    #[error("segment {segment} panicked: {message}")]
    Panicked { segment: usize, message: String },

    #[error("segment {segment} returned an invalid result: {reason}")]
    InvalidResult { segment: usize, reason: String },

    #[error("segment batch took {elapsed:?}, exceeding the {timeout:?} limit")]
    BatchTimedOut { elapsed: Duration, timeout: Duration },
}

// =============================================================================
// HistogramError
// =============================================================================

/// Errors returned by histogram construction and operations.
#[derive(Debug, thiserror::Error)]
pub enum HistogramError {
    #[error(transparent)]
    Binner(#[from] BinnerError),

    #[error(transparent)]
    Segment(#[from] SegmentError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{axis} index {index} is out of range 0..{len}")]
    IndexOutOfRange {
        axis: &'static str,
        index: usize,
        len: usize,
    },

    #[error("output buffer has shape {got:?}, expected {expected:?}")]
    BufferShape {
        expected: (usize, usize),
        got: (usize, usize),
    },
}

/// Result alias for histogram operations.
pub type Result<T, E = HistogramError> = std::result::Result<T, E>;
