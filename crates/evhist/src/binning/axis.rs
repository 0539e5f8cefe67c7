//! One-dimensional binners.
//!
//! - [`EventBinner`] - Shared contract for mapping a scalar to a bin and back
//! - [`UniformBinner`] - Equal-width bins
//! - [`LogBinner`] - Bins whose widths grow geometrically
//! - [`AxisBinner`] - Tagged union over both variants
//!
//! # Boundary consistency
//!
//! Bin boundaries are defined by [`EventBinner::min_val`]. The closed-form
//! index computation can land one bin off when a value sits exactly on a
//! boundary, so both variants finish with a one-step repair against the
//! neighbouring boundaries. As a result `index(min_val(i)) == i` holds exactly
//! for every bin.

use approx::AbsDiffEq;

use crate::error::BinnerError;

/// Correction factor applied inside the logarithm of [`LogBinner::index`].
///
/// Nudges values that sit on a boundary (up to rounding) into the bin that
/// boundary opens.
pub const LOG_EPSILON: f64 = 1.0 + 1.0e-15;

/// Largest bin count a [`LogBinner`] may derive from its parameters.
pub const MAX_LOG_BINS: usize = u32::MAX as usize;

// =============================================================================
// EventBinner
// =============================================================================

/// Maps scalar values to bin indices over `[axis_min, axis_max)`.
pub trait EventBinner {
    /// Lower bound of the first bin.
    fn axis_min(&self) -> f64;

    /// Upper bound of the last bin.
    fn axis_max(&self) -> f64;

    /// Number of bins.
    fn n_bins(&self) -> usize;

    /// Bin index of `value`.
    ///
    /// Returns `-1` for values below [`axis_min`](Self::axis_min) (and NaN).
    /// Values at or above [`axis_max`](Self::axis_max) are *not* clamped: the
    /// same formula is applied and the result may be `>= n_bins()`. Use
    /// [`checked_index`](Self::checked_index) before indexing storage.
    fn index(&self, value: f64) -> i64;

    /// Lower boundary of bin `i`.
    fn min_val(&self, i: usize) -> f64;

    /// Upper boundary of bin `i` (the lower boundary of bin `i + 1`).
    fn max_val(&self, i: usize) -> f64 {
        self.min_val(i + 1)
    }

    /// Representative value of bin `i`, halfway between its boundaries.
    fn center_val(&self, i: usize) -> f64 {
        0.5 * (self.min_val(i) + self.max_val(i))
    }

    /// Axis value at a continuous bin coordinate.
    ///
    /// `value_at(i as f64) == min_val(i)`; fractional coordinates interpolate
    /// in the binner's own spacing.
    fn value_at(&self, fractional_index: f64) -> f64;

    /// Bin index of `value` if it falls inside `[0, n_bins)`.
    #[inline]
    fn checked_index(&self, value: f64) -> Option<usize> {
        let index = self.index(value);
        (index >= 0 && (index as usize) < self.n_bins()).then_some(index as usize)
    }
}

/// Step a closed-form index by at most one so it agrees with `boundary`.
///
/// Only indices near the axis (`0..=n_bins`) are repaired; far-away values
/// keep the raw formula result.
#[inline]
fn repair_index(value: f64, index: i64, n_bins: usize, boundary: impl Fn(i64) -> f64) -> i64 {
    if index < 0 || index > n_bins as i64 {
        return index;
    }
    if index > 0 && value < boundary(index) {
        index - 1
    } else if value >= boundary(index + 1) {
        index + 1
    } else {
        index
    }
}

fn check_interval(min: f64, max: f64) -> Result<(), BinnerError> {
    if !min.is_finite() || !max.is_finite() {
        return Err(BinnerError::NonFiniteInterval { min, max });
    }
    if min >= max {
        return Err(BinnerError::EmptyInterval { min, max });
    }
    Ok(())
}

fn check_sub_range(first: usize, last: usize, n_bins: usize) -> Result<(), BinnerError> {
    if first > last || last >= n_bins {
        return Err(BinnerError::InvalidSubRange {
            first,
            last,
            n_bins,
        });
    }
    Ok(())
}

fn check_scale(factor: f64) -> Result<(), BinnerError> {
    if !(factor.is_finite() && factor > 0.0) {
        return Err(BinnerError::InvalidScale(factor));
    }
    Ok(())
}

// =============================================================================
// UniformBinner
// =============================================================================

/// Equal-width bins over `[min, max)`.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UniformBinner {
    min: f64,
    max: f64,
    n_bins: usize,
    width: f64,
}

impl UniformBinner {
    /// Split `[min, max)` into `n_bins` equal bins.
    ///
    /// # Errors
    ///
    /// Fails if `n_bins < 1`, either bound is non-finite, or `min >= max`.
    pub fn new(min: f64, max: f64, n_bins: usize) -> Result<Self, BinnerError> {
        if n_bins < 1 {
            return Err(BinnerError::InvalidBinCount(n_bins));
        }
        check_interval(min, max)?;
        Ok(Self {
            min,
            max,
            n_bins,
            width: (max - min) / n_bins as f64,
        })
    }

    /// Width of every bin.
    #[inline]
    pub fn width(&self) -> f64 {
        self.width
    }

    #[inline]
    fn boundary(&self, k: i64) -> f64 {
        if k == self.n_bins as i64 {
            self.max
        } else {
            self.min + k as f64 * self.width
        }
    }

    /// Bins `first..=last` as a new binner.
    pub fn sub_binner(&self, first: usize, last: usize) -> Result<Self, BinnerError> {
        check_sub_range(first, last, self.n_bins)?;
        Self::new(self.min_val(first), self.max_val(last), last - first + 1)
    }

    /// Same bin count over `[factor * min, factor * max)`.
    pub fn scaled(&self, factor: f64) -> Result<Self, BinnerError> {
        check_scale(factor)?;
        Self::new(factor * self.min, factor * self.max, self.n_bins)
    }
}

impl EventBinner for UniformBinner {
    #[inline]
    fn axis_min(&self) -> f64 {
        self.min
    }

    #[inline]
    fn axis_max(&self) -> f64 {
        self.max
    }

    #[inline]
    fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    fn index(&self, value: f64) -> i64 {
        if value.is_nan() || value < self.min {
            return -1;
        }
        let raw = ((value - self.min) / self.width).floor() as i64;
        repair_index(value, raw, self.n_bins, |k| self.boundary(k))
    }

    #[inline]
    fn min_val(&self, i: usize) -> f64 {
        self.boundary(i as i64)
    }

    #[inline]
    fn center_val(&self, i: usize) -> f64 {
        self.min + (i as f64 + 0.5) * self.width
    }

    #[inline]
    fn value_at(&self, fractional_index: f64) -> f64 {
        self.min + fractional_index * self.width
    }
}

// =============================================================================
// LogBinner
// =============================================================================

/// Bins whose boundaries form a geometric progression.
///
/// The first bin spans `[min, min + first_step)`; each following bin is wider
/// by the ratio `r = 1 + first_step / min`. The requested upper bound is
/// rounded up to the first boundary at or above it.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LogBinner {
    min: f64,
    max: f64,
    first_step: f64,
    ln_ratio: f64,
    n_bins: usize,
}

impl LogBinner {
    /// Create a logarithmic binner starting at `min` with first bin width
    /// `first_step`, covering at least `[min, max)`.
    ///
    /// # Errors
    ///
    /// Fails if `min <= 0`, `first_step <= 0`, a bound is non-finite,
    /// `min >= max`, or `first_step` is so small relative to `min` that more
    /// than [`MAX_LOG_BINS`] bins would be needed.
    pub fn new(min: f64, max: f64, first_step: f64) -> Result<Self, BinnerError> {
        check_interval(min, max)?;
        if min <= 0.0 {
            return Err(BinnerError::NonPositiveMin(min));
        }
        if !(first_step > 0.0) || !first_step.is_finite() {
            return Err(BinnerError::NonPositiveStep(first_step));
        }

        let ln_ratio = (first_step / min).ln_1p();
        let boundary = |k: usize| min * (k as f64 * ln_ratio).exp();
        // A boundary within rounding of `max` counts as reaching it.
        let covers = |b: f64| b >= max * (1.0 - 1e-12);

        let too_many = BinnerError::TooManyBins {
            limit: MAX_LOG_BINS,
        };
        let estimate = ((max / min).ln() / ln_ratio).ceil().max(1.0);
        if !estimate.is_finite() || estimate > MAX_LOG_BINS as f64 {
            return Err(too_many);
        }

        let mut n_bins = estimate as usize;
        while n_bins > 1 && covers(boundary(n_bins - 1)) {
            n_bins -= 1;
        }
        while !covers(boundary(n_bins)) {
            if n_bins >= MAX_LOG_BINS {
                return Err(too_many);
            }
            n_bins += 1;
        }

        Ok(Self::from_parts(min, first_step, ln_ratio, n_bins))
    }

    fn from_parts(min: f64, first_step: f64, ln_ratio: f64, n_bins: usize) -> Self {
        let max = min * (n_bins as f64 * ln_ratio).exp();
        Self {
            min,
            max,
            first_step,
            ln_ratio,
            n_bins,
        }
    }

    /// Growth ratio between consecutive bin widths.
    #[inline]
    pub fn ratio(&self) -> f64 {
        1.0 + self.first_step / self.min
    }

    /// Width of the first bin.
    #[inline]
    pub fn first_step(&self) -> f64 {
        self.first_step
    }

    #[inline]
    fn boundary(&self, k: i64) -> f64 {
        if k == 0 {
            self.min
        } else {
            self.min * (k as f64 * self.ln_ratio).exp()
        }
    }

    /// Bins `first..=last` as a new binner with the same ratio.
    pub fn sub_binner(&self, first: usize, last: usize) -> Result<Self, BinnerError> {
        check_sub_range(first, last, self.n_bins)?;
        let min = self.min_val(first);
        Ok(Self::from_parts(
            min,
            self.max_val(first) - min,
            self.ln_ratio,
            last - first + 1,
        ))
    }

    /// Same ratio and bin count, starting at `factor * min`.
    pub fn scaled(&self, factor: f64) -> Result<Self, BinnerError> {
        check_scale(factor)?;
        Ok(Self::from_parts(
            factor * self.min,
            factor * self.first_step,
            self.ln_ratio,
            self.n_bins,
        ))
    }
}

impl EventBinner for LogBinner {
    #[inline]
    fn axis_min(&self) -> f64 {
        self.min
    }

    #[inline]
    fn axis_max(&self) -> f64 {
        self.max
    }

    #[inline]
    fn n_bins(&self) -> usize {
        self.n_bins
    }

    #[inline]
    fn index(&self, value: f64) -> i64 {
        if value.is_nan() || value < self.min {
            return -1;
        }
        let raw = ((LOG_EPSILON * value / self.min).ln() / self.ln_ratio).floor() as i64;
        repair_index(value, raw, self.n_bins, |k| self.boundary(k))
    }

    #[inline]
    fn min_val(&self, i: usize) -> f64 {
        self.boundary(i as i64)
    }

    #[inline]
    fn value_at(&self, fractional_index: f64) -> f64 {
        self.min * (fractional_index * self.ln_ratio).exp()
    }
}

// =============================================================================
// AxisBinner
// =============================================================================

/// Which spacing an [`AxisBinner`] uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinnerKind {
    Uniform,
    Log,
}

/// A one-dimensional binner of either spacing.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AxisBinner {
    Uniform(UniformBinner),
    Log(LogBinner),
}

impl AxisBinner {
    /// Shorthand for [`UniformBinner::new`].
    pub fn uniform(min: f64, max: f64, n_bins: usize) -> Result<Self, BinnerError> {
        UniformBinner::new(min, max, n_bins).map(Self::Uniform)
    }

    /// Shorthand for [`LogBinner::new`].
    pub fn log(min: f64, max: f64, first_step: f64) -> Result<Self, BinnerError> {
        LogBinner::new(min, max, first_step).map(Self::Log)
    }

    #[inline]
    pub fn kind(&self) -> BinnerKind {
        match self {
            Self::Uniform(_) => BinnerKind::Uniform,
            Self::Log(_) => BinnerKind::Log,
        }
    }

    /// Bins `first..=last` as a new binner of the same kind.
    pub fn sub_binner(&self, first: usize, last: usize) -> Result<Self, BinnerError> {
        match self {
            Self::Uniform(b) => b.sub_binner(first, last).map(Self::Uniform),
            Self::Log(b) => b.sub_binner(first, last).map(Self::Log),
        }
    }

    /// Rescale the interval by a positive factor, keeping kind and bin count.
    pub fn scaled(&self, factor: f64) -> Result<Self, BinnerError> {
        match self {
            Self::Uniform(b) => b.scaled(factor).map(Self::Uniform),
            Self::Log(b) => b.scaled(factor).map(Self::Log),
        }
    }
}

impl From<UniformBinner> for AxisBinner {
    fn from(binner: UniformBinner) -> Self {
        Self::Uniform(binner)
    }
}

impl From<LogBinner> for AxisBinner {
    fn from(binner: LogBinner) -> Self {
        Self::Log(binner)
    }
}

impl EventBinner for AxisBinner {
    #[inline]
    fn axis_min(&self) -> f64 {
        match self {
            Self::Uniform(b) => b.axis_min(),
            Self::Log(b) => b.axis_min(),
        }
    }

    #[inline]
    fn axis_max(&self) -> f64 {
        match self {
            Self::Uniform(b) => b.axis_max(),
            Self::Log(b) => b.axis_max(),
        }
    }

    #[inline]
    fn n_bins(&self) -> usize {
        match self {
            Self::Uniform(b) => b.n_bins(),
            Self::Log(b) => b.n_bins(),
        }
    }

    #[inline]
    fn index(&self, value: f64) -> i64 {
        match self {
            Self::Uniform(b) => b.index(value),
            Self::Log(b) => b.index(value),
        }
    }

    #[inline]
    fn min_val(&self, i: usize) -> f64 {
        match self {
            Self::Uniform(b) => b.min_val(i),
            Self::Log(b) => b.min_val(i),
        }
    }

    #[inline]
    fn center_val(&self, i: usize) -> f64 {
        match self {
            Self::Uniform(b) => b.center_val(i),
            Self::Log(b) => b.center_val(i),
        }
    }

    #[inline]
    fn value_at(&self, fractional_index: f64) -> f64 {
        match self {
            Self::Uniform(b) => b.value_at(fractional_index),
            Self::Log(b) => b.value_at(fractional_index),
        }
    }
}

impl AbsDiffEq for AxisBinner {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        1e-9
    }

    /// Same kind and bin count, with bounds within `epsilon`.
    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.kind() == other.kind()
            && self.n_bins() == other.n_bins()
            && self.axis_min().abs_diff_eq(&other.axis_min(), epsilon)
            && self.axis_max().abs_diff_eq(&other.axis_max(), epsilon)
    }
}

// =============================================================================
// Tests
// =============================================================================
