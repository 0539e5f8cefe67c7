//! Common utilities used across the crate.
//!
//! This module provides the parallelism switch shared by the segment runner,
//! plus a few small vector helpers.

use glam::DVec3;
use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// Components that receive `Sequential` must iterate on the calling thread.
/// The actual pool is owned by [`SegmentRunner`](crate::histogram::SegmentRunner);
/// this flag only decides whether work is handed to it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if rayon's global pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    /// Map over `iter`, in parallel if allowed. Output order matches input order.
    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Vector Helpers
// =============================================================================

/// Build a `DVec3` from single-precision coordinates.
#[inline]
pub fn dvec3(p: [f32; 3]) -> DVec3 {
    DVec3::new(p[0] as f64, p[1] as f64, p[2] as f64)
}

/// Narrow a `DVec3` to single-precision coordinates.
#[inline]
pub fn to_f32_array(v: DVec3) -> [f32; 3] {
    [v.x as f32, v.y as f32, v.z as f32]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parallelism_from_threads() {
        assert!(!Parallelism::from_threads(1).is_parallel());
        assert!(Parallelism::from_threads(2).is_parallel());
        assert!(Parallelism::from_threads(8).is_parallel());
    }

    #[test]
    fn test_maybe_par_map_preserves_order() {
        let result: Vec<_> = Parallelism::Sequential.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);

        let result: Vec<_> = Parallelism::Parallel.maybe_par_map(0..5usize, |i| i * 2);
        assert_eq!(result, vec![0, 2, 4, 6, 8]);
    }

    #[test]
    fn test_vector_conversions() {
        let v = dvec3([1.0, -2.5, 0.25]);
        assert_eq!(v, DVec3::new(1.0, -2.5, 0.25));
        assert_eq!(to_f32_array(v), [1.0, -2.5, 0.25]);
    }
}
