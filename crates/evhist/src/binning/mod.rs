//! Binners: scalar axes and their projections into 3D.
//!
//! - [`axis`] - [`UniformBinner`], [`LogBinner`] and the [`AxisBinner`] union
//! - [`projection`] - [`ProjectionBinner`], [`dual_binners`], [`bin_center`]

pub mod axis;
pub mod projection;

pub use axis::{
    AxisBinner, BinnerKind, EventBinner, LOG_EPSILON, LogBinner, MAX_LOG_BINS, UniformBinner,
};
pub use projection::{ProjectionBinner, bin_center, dual_binners};
