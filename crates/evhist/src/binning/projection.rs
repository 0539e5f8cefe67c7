//! Binning of 3D points along a direction.
//!
//! A [`ProjectionBinner`] pairs an [`AxisBinner`] with a unit direction: a point
//! is binned by the axis binner applied to its dot product with the direction.
//!
//! Three projection binners describe the edges of parallelepiped bins. When the
//! edge directions are oblique, projecting onto them does not recover the
//! per-axis coefficients of a point; [`dual_binners`] derives the reciprocal
//! binners that do.

use approx::AbsDiffEq;
use glam::DVec3;

use super::axis::{AxisBinner, EventBinner};
use crate::error::BinnerError;

/// Cross products shorter than this mark a degenerate basis.
const DEGENERATE_TOLERANCE: f64 = 1e-12;

// =============================================================================
// ProjectionBinner
// =============================================================================

/// A one-dimensional binner applied along a fixed unit direction.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProjectionBinner {
    binner: AxisBinner,
    direction: DVec3,
}

impl ProjectionBinner {
    /// Wrap `binner` with `direction`, normalized to unit length.
    ///
    /// # Errors
    ///
    /// Fails with [`BinnerError::InvalidDirection`] if the direction has zero
    /// length or non-finite components.
    pub fn new(binner: impl Into<AxisBinner>, direction: DVec3) -> Result<Self, BinnerError> {
        let length = direction.length();
        if !direction.is_finite() || length == 0.0 {
            return Err(BinnerError::InvalidDirection(direction.to_array()));
        }
        Ok(Self {
            binner: binner.into(),
            direction: direction / length,
        })
    }

    /// The wrapped scalar binner.
    #[inline]
    pub fn binner(&self) -> &AxisBinner {
        &self.binner
    }

    /// Unit direction of this binner.
    #[inline]
    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    #[inline]
    pub fn n_bins(&self) -> usize {
        self.binner.n_bins()
    }

    /// Scalar position of `point` along the direction.
    #[inline]
    pub fn project(&self, point: DVec3) -> f64 {
        self.direction.dot(point)
    }

    /// Bin index of `point`, with the sentinel semantics of [`EventBinner::index`].
    #[inline]
    pub fn index(&self, point: DVec3) -> i64 {
        self.binner.index(self.project(point))
    }

    /// Bin index of `point` if it lies inside `[0, n_bins)`.
    #[inline]
    pub fn checked_index(&self, point: DVec3) -> Option<usize> {
        self.binner.checked_index(self.project(point))
    }

    #[inline]
    pub fn min_vec(&self, i: usize) -> DVec3 {
        self.direction * self.binner.min_val(i)
    }

    #[inline]
    pub fn center_vec(&self, i: usize) -> DVec3 {
        self.direction * self.binner.center_val(i)
    }

    #[inline]
    pub fn max_vec(&self, i: usize) -> DVec3 {
        self.direction * self.binner.max_val(i)
    }

    /// Direction scaled by the axis value at a continuous bin coordinate.
    #[inline]
    pub fn vec_at(&self, fractional_index: f64) -> DVec3 {
        self.direction * self.binner.value_at(fractional_index)
    }

    /// Write the center vector of bin `i` into `out`.
    #[inline]
    pub fn center_point(&self, i: usize, out: &mut [f64; 3]) {
        *out = self.center_vec(i).to_array();
    }

    /// Bins `first..=last` along the same direction.
    pub fn sub_binner(&self, first: usize, last: usize) -> Result<Self, BinnerError> {
        Ok(Self {
            binner: self.binner.sub_binner(first, last)?,
            direction: self.direction,
        })
    }
}

impl AbsDiffEq for ProjectionBinner {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        1e-9
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.binner.abs_diff_eq(&other.binner, epsilon)
            && self.direction.abs_diff_eq(other.direction, epsilon)
    }
}

// =============================================================================
// Dual Basis
// =============================================================================

/// Derive the binners that decompose a point into edge-axis coefficients.
///
/// For edge directions `d0, d1, d2` the dual direction of axis `k` is the unit
/// normal of the plane spanned by the other two, oriented so that it makes an
/// acute angle with `d_k`. A point `c * d_k` (plus any mix of the other two
/// directions) projects onto it at `c * (d_k* . d_k)`, so the dual axis is the
/// edge axis rescaled by that factor. Bin counts and spacing kind carry over.
///
/// For mutually orthogonal edges the result equals the input.
///
/// # Errors
///
/// Fails with [`BinnerError::DegenerateBasis`] if the directions are coplanar.
pub fn dual_binners(edges: [&ProjectionBinner; 3]) -> Result<[ProjectionBinner; 3], BinnerError> {
    let d = edges.map(|b| b.direction);

    let dual_of = |k: usize, normal: DVec3| -> Result<ProjectionBinner, BinnerError> {
        if normal.length() < DEGENERATE_TOLERANCE {
            return Err(BinnerError::DegenerateBasis);
        }
        let mut direction = normal.normalize();
        let mut factor = direction.dot(d[k]);
        if factor.abs() < DEGENERATE_TOLERANCE {
            return Err(BinnerError::DegenerateBasis);
        }
        if factor < 0.0 {
            direction = -direction;
            factor = -factor;
        }
        Ok(ProjectionBinner {
            binner: edges[k].binner.scaled(factor)?,
            direction,
        })
    };

    Ok([
        dual_of(0, d[1].cross(d[2]))?,
        dual_of(1, d[2].cross(d[0]))?,
        dual_of(2, d[0].cross(d[1]))?,
    ])
}

/// Center of the parallelepiped bin `[ix, iy, iz]` spanned by `edges`.
#[inline]
pub fn bin_center(indices: [usize; 3], edges: &[ProjectionBinner; 3]) -> DVec3 {
    edges[0].center_vec(indices[0])
        + edges[1].center_vec(indices[1])
        + edges[2].center_vec(indices[2])
}

// =============================================================================
// Tests
// =============================================================================
