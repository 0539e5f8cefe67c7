//! evhist: parallel 3D event histogramming.
//!
//! Bins large streams of weighted 3D points into a dense volume whose axes may
//! point in arbitrary, even non-orthogonal, directions, and reconstructs
//! representative point sets from the result.
//!
//! # Key Types
//!
//! - [`UniformBinner`] / [`LogBinner`] / [`AxisBinner`] - Scalar axis binning
//! - [`ProjectionBinner`] - An axis binner applied along a 3D direction
//! - [`Histogram3D`] - The volume, with segment-parallel bulk operations
//! - [`HistogramConfig`] - Threads, segments and timeout
//! - [`EventSource`] / [`EventList`] - Event input and output
//!
//! # Oblique axes
//!
//! A histogram is described by three edge binners. Events are binned by the
//! [`dual_binners`] of those edges, which recover each point's coefficients
//! along the edge directions. Cell centers and event lists use the edges.

// Re-export approx traits for users who want to compare binners
pub use approx;

pub mod binning;
pub mod config;
pub mod error;
pub mod event;
pub mod histogram;
pub mod testing;
pub mod utils;

// =============================================================================
// Convenience Re-exports
// =============================================================================

pub use binning::{
    AxisBinner, BinnerKind, EventBinner, LogBinner, ProjectionBinner, UniformBinner, bin_center,
    dual_binners,
};
pub use config::{ConfigError, HistogramConfig};
pub use error::{BinnerError, HistogramError, Result, SegmentError};
pub use event::{Event, EventList, EventListError, EventSource, Extent, flatten_event_lists};
pub use histogram::{Histogram3D, HistogramStats, SegmentRunner, Weighting};
pub use utils::Parallelism;
