use std::time::Duration;

use criterion::Criterion;

/// Settings for single-run histogram benches (axis kinds, scans).
pub fn default_criterion() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .warm_up_time(Duration::from_secs(2))
        .measurement_time(Duration::from_secs(10))
        .sample_size(10)
}

/// Settings for the thread sweep.
///
/// Every worker count rebuilds a rayon pool and bins a million events per
/// iteration, so warm-up is short and fewer seconds are spent per point.
pub fn thread_sweep_criterion() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(5))
        .sample_size(10)
        .noise_threshold(0.05)
}
