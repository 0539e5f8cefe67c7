//! Property-based tests for binners.
//!
//! Boundaries must map back to their own bin for any valid parameters, and the
//! dual basis must recover edge coefficients for any well-conditioned axes.

use glam::DVec3;
use proptest::prelude::*;

use evhist::{
    AxisBinner, EventBinner, LogBinner, ProjectionBinner, UniformBinner, dual_binners,
};

// =============================================================================
// Strategies
// =============================================================================

fn arb_uniform() -> impl Strategy<Value = UniformBinner> {
    (-1e4f64..1e4, 1e-3f64..1e3, 1usize..400)
        .prop_map(|(min, width, n)| UniformBinner::new(min, min + width, n).unwrap())
}

fn arb_log() -> impl Strategy<Value = LogBinner> {
    (1e-3f64..1e4, 1.5f64..200.0, 0.005f64..1.0).prop_map(|(min, span, step)| {
        LogBinner::new(min, min * span, min * step).unwrap()
    })
}

/// Unit axis `k` tilted by small components along the other two.
fn arb_tilted(k: usize) -> impl Strategy<Value = DVec3> {
    (-0.4f64..0.4, -0.4f64..0.4).prop_map(move |(a, b)| {
        let mut v = [a; 3];
        v[(k + 1) % 3] = b;
        v[k] = 1.0;
        DVec3::from_array(v)
    })
}

fn check_boundaries<B: EventBinner>(b: &B) -> Result<(), TestCaseError> {
    for i in 0..b.n_bins() {
        prop_assert_eq!(b.index(b.min_val(i)), i as i64, "min of bin {}", i);
        prop_assert_eq!(b.index(b.center_val(i)), i as i64, "center of bin {}", i);
    }
    prop_assert_eq!(b.index(b.axis_min() - b.axis_min().abs() * 1e-9 - 1e-9), -1);
    Ok(())
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #[test]
    fn uniform_boundaries_map_to_own_bin(b in arb_uniform()) {
        check_boundaries(&b)?;
    }

    #[test]
    fn log_boundaries_map_to_own_bin(b in arb_log()) {
        check_boundaries(&b)?;
        prop_assert!(b.axis_max() >= b.min_val(b.n_bins() - 1));
    }

    #[test]
    fn sub_binner_boundaries_match(b in arb_log(), a in 0usize..1000, len in 1usize..50) {
        let b = AxisBinner::from(b);
        let first = a % b.n_bins();
        let last = (first + len - 1).min(b.n_bins() - 1);
        let sub = b.sub_binner(first, last).unwrap();
        prop_assert_eq!(sub.n_bins(), last - first + 1);
        for i in 0..sub.n_bins() {
            let expected = b.min_val(first + i);
            prop_assert!((sub.min_val(i) - expected).abs() <= expected * 1e-12);
        }
    }

    #[test]
    fn dual_recovers_edge_coefficients(
        d0 in arb_tilted(0),
        d1 in arb_tilted(1),
        d2 in arb_tilted(2),
        c in prop::array::uniform3(0usize..20),
    ) {
        let dirs = [d0.normalize(), d1.normalize(), d2.normalize()];
        let edges = dirs.map(|d| {
            ProjectionBinner::new(UniformBinner::new(-5.0, 15.0, 20).unwrap(), d).unwrap()
        });
        let duals = dual_binners([&edges[0], &edges[1], &edges[2]]).unwrap();

        let p: DVec3 = (0..3).map(|k| dirs[k] * (c[k] as f64 - 4.5)).sum();
        for k in 0..3 {
            prop_assert_eq!(duals[k].index(p), c[k] as i64, "axis {}", k);
        }
    }
}
