//! End-to-end tests for `Histogram3D`.

use std::time::Duration;

use approx::assert_abs_diff_eq;
use glam::DVec3;
use rand::prelude::*;
use rstest::rstest;

use evhist::testing::data::{blob_events, random_event_list, random_events};
use evhist::utils::dvec3;
use evhist::{
    AxisBinner, Event, EventBinner, EventSource, Histogram3D, HistogramConfig, HistogramError,
    HistogramStats, LogBinner, ProjectionBinner, SegmentError, Weighting, flatten_event_lists,
};

// =============================================================================
// Helpers
// =============================================================================

fn edge(min: f64, max: f64, n: usize, direction: DVec3) -> ProjectionBinner {
    ProjectionBinner::new(AxisBinner::uniform(min, max, n).unwrap(), direction).unwrap()
}

fn config(n_threads: usize, n_segments: usize) -> HistogramConfig {
    HistogramConfig::builder()
        .n_threads(n_threads)
        .n_segments(n_segments)
        .build()
        .unwrap()
}

/// Unit cells over `[0, n)` on every axis.
fn cube(n: usize, config: HistogramConfig) -> Histogram3D {
    Histogram3D::with_config(
        edge(0.0, n as f64, n, DVec3::X),
        edge(0.0, n as f64, n, DVec3::Y),
        edge(0.0, n as f64, n, DVec3::Z),
        config,
    )
    .unwrap()
}

fn inside(p: [f32; 3], n: usize) -> bool {
    p.iter().all(|&c| c >= 0.0 && c < n as f32)
}

/// Random events with weights spread over many orders of magnitude.
fn wide_weight_events(n: usize, seed: u64, min: f32, max: f32) -> Vec<Event> {
    let mut rng = StdRng::seed_from_u64(seed);
    random_events(n, seed, [min; 3], [max; 3])
        .into_iter()
        .map(|e| Event {
            weight: 10f32.powf(rng.gen_range(-3.0..7.0)) * rng.gen_range(0.5..1.5),
            ..e
        })
        .collect()
}

fn assert_same_results(reference: &Histogram3D, other: &Histogram3D) {
    assert_eq!(reference.cells(), other.cells());
    assert_eq!(reference.stats(), other.stats());
    assert_eq!(reference.num_dropped(), other.num_dropped());
}

// =============================================================================
// Binning
// =============================================================================

#[rstest]
#[case(1, 1)]
#[case(4, 4)]
#[case(3, 7)]
fn total_equals_in_range_weights(#[case] n_threads: usize, #[case] n_segments: usize) {
    let mut hist = cube(10, config(n_threads, n_segments));
    let events = random_events(20_000, 11, [-2.0; 3], [12.0; 3]);

    let expected: f64 = events
        .iter()
        .filter(|e| inside(e.position, 10))
        .map(|e| e.weight as f64)
        .sum();
    let n_outside = events.iter().filter(|e| !inside(e.position, 10)).count() as u64;

    let delta = hist.add_events(&events, Weighting::Weighted).unwrap();
    assert_eq!(delta, expected);
    assert_eq!(hist.total(), expected);
    assert_eq!(hist.num_added(), events.len() as u64);
    assert_eq!(hist.num_dropped(), n_outside);

    let cell_sum: f64 = hist.cells().iter().map(|&v| v as f64).sum();
    assert_eq!(cell_sum, expected);

    let before = hist.stats();
    hist.scan_histogram().unwrap();
    assert_eq!(hist.stats(), before);
}

#[test]
fn out_of_range_events_appear_nowhere() {
    let mut hist = cube(4, HistogramConfig::default());
    let events = vec![
        Event::new(-0.1, 1.0, 1.0),
        Event::new(1.0, 4.0, 1.0),
        Event::new(1.0, 1.0, 17.0),
        Event::new(f32::NAN, 1.0, 1.0),
    ];
    let delta = hist.add_events(&events, Weighting::Weighted).unwrap();
    assert_eq!(delta, 0.0);
    assert_eq!(hist.num_dropped(), 4);
    assert!(hist.cells().iter().all(|&v| v == 0.0));
    assert_eq!(hist.max_val(), 0.0);
}

#[test]
fn batches_accumulate() {
    let mut hist = cube(8, HistogramConfig::default());
    let list = random_event_list(5_000, 5, [0.0; 3], [8.0; 3]);
    let first = hist.add_events(&list, Weighting::Weighted).unwrap();
    let second = hist.add_events(&list, Weighting::Unit).unwrap();

    assert_eq!(first, list.total_weight());
    assert_eq!(second, 5_000.0);
    assert_eq!(hist.total(), first + second);
    assert_eq!(hist.num_added(), 10_000);
    assert_eq!(hist.num_dropped(), 0);
}

#[test]
fn clear_then_scan_is_all_zero() {
    let mut hist = cube(6, HistogramConfig::default());
    hist.add_events(&blob_events(1_000, 1, [3.0; 3], 1.0), Weighting::Weighted)
        .unwrap();
    assert!(hist.total() > 0.0);

    hist.clear().unwrap();
    hist.scan_histogram().unwrap();
    assert_eq!(hist.min_val(), 0.0);
    assert_eq!(hist.max_val(), 0.0);
    assert_eq!(hist.total(), 0.0);
    assert_eq!(hist.num_added(), 0);
}

#[test]
fn worker_count_does_not_change_results() {
    let events = wide_weight_events(50_000, 99, -1.0, 17.0);

    let mut sequential = cube(16, HistogramConfig::sequential());
    let mut parallel = cube(16, config(4, 4));
    let mut uneven = cube(16, config(3, 5));
    for hist in [&mut sequential, &mut parallel, &mut uneven] {
        hist.add_events(&events, Weighting::Weighted).unwrap();
    }

    assert_same_results(&sequential, &parallel);
    assert_same_results(&sequential, &uneven);
}

#[test]
fn segment_count_does_not_change_total() {
    let events = vec![
        Event::weighted(0.5, 0.5, 0.5, 1e16),
        Event::weighted(0.5, 0.5, 7.5, 1.0),
        Event::weighted(1.5, 0.5, 7.5, 1.0),
    ];
    let mut sequential = cube(8, HistogramConfig::sequential());
    let mut parallel = cube(8, config(4, 4));
    for hist in [&mut sequential, &mut parallel] {
        hist.add_events(&events, Weighting::Weighted).unwrap();
    }
    assert_same_results(&sequential, &parallel);

    for hist in [&mut sequential, &mut parallel] {
        hist.scan_histogram().unwrap();
    }
    assert_same_results(&sequential, &parallel);
}

#[test]
fn more_segments_than_pages() {
    let mut hist = Histogram3D::with_config(
        edge(0.0, 4.0, 4, DVec3::X),
        edge(0.0, 4.0, 4, DVec3::Y),
        edge(0.0, 2.0, 2, DVec3::Z),
        config(4, 16),
    )
    .unwrap();
    let events = random_events(1_000, 2, [0.0; 3], [4.0, 4.0, 2.0]);
    let delta = hist.add_events(&events, Weighting::Weighted).unwrap();
    let expected: f64 = events.iter().map(|e| e.weight as f64).sum();
    assert_eq!(delta, expected);
    let levels = AxisBinner::uniform(0.1, 1e6, 1).unwrap();
    assert_eq!(hist.get_event_lists(&levels).unwrap().len(), 2);
}

// =============================================================================
// Oblique and logarithmic axes
// =============================================================================

#[test]
fn oblique_points_land_in_coefficient_bins() {
    let dirs = [
        DVec3::X,
        DVec3::new(1.0, 1.0, 0.0).normalize(),
        DVec3::new(0.3, 0.2, 1.0).normalize(),
    ];
    let mut hist = Histogram3D::new(
        edge(0.0, 10.0, 10, dirs[0]),
        edge(0.0, 10.0, 10, dirs[1]),
        edge(0.0, 10.0, 10, dirs[2]),
    )
    .unwrap();

    let bins = [[2usize, 3, 7], [0, 9, 4], [6, 0, 0], [9, 9, 9]];
    let events: Vec<Event> = bins
        .iter()
        .enumerate()
        .map(|(i, b)| {
            let p: DVec3 = (0..3).map(|k| dirs[k] * (b[k] as f64 + 0.5)).sum();
            Event::weighted(p.x as f32, p.y as f32, p.z as f32, (i + 1) as f32)
        })
        .collect();
    hist.add_events(&events, Weighting::Weighted).unwrap();

    assert_eq!(hist.num_dropped(), 0);
    for (i, &[ix, iy, iz]) in bins.iter().enumerate() {
        assert_eq!(hist.cells()[[iz, iy, ix]], (i + 1) as f32);

        let center = hist.bin_location(ix, iy, iz);
        let p = dvec3(events[i].position);
        assert_abs_diff_eq!(center.distance(p), 0.0, epsilon = 1e-5);
    }
}

#[test]
fn log_axis_bins_events_by_magnitude() {
    let log = LogBinner::new(1000.0, 32000.0, 0.2).unwrap();
    let n = log.n_bins();
    let x = ProjectionBinner::new(log.clone(), DVec3::X).unwrap();
    let mut hist = Histogram3D::new(x, edge(0.0, 1.0, 1, DVec3::Y), edge(0.0, 1.0, 1, DVec3::Z))
        .unwrap();

    let events: Vec<Event> = (0..n)
        .map(|i| Event::new(log.center_val(i) as f32, 0.5, 0.5))
        .collect();
    hist.add_events(&events, Weighting::Weighted).unwrap();
    assert_eq!(hist.num_dropped(), 0);
    assert!(hist.page(0).unwrap().row(0).iter().all(|&v| v == 1.0));
}

// =============================================================================
// Event lists
// =============================================================================

#[test]
fn overflow_level_holds_cell_center() {
    let mut hist = cube(4, HistogramConfig::default());
    let events = vec![
        Event::weighted(2.2, 1.7, 3.1, 100.0),
        Event::weighted(2.9, 1.1, 3.9, 50.0),
    ];
    hist.add_events(&events, Weighting::Weighted).unwrap();

    let levels = AxisBinner::uniform(10.0, 100.0, 9).unwrap();
    let nested = hist.get_event_lists(&levels).unwrap();
    assert!(nested.iter().all(|buckets| buckets.len() == 10));

    let flat = flatten_event_lists(nested);
    assert_eq!(flat.len(), 1);
    assert_eq!(flat.code(0), Some(9));
    assert_eq!(flat.weight(0), 150.0);
    assert_eq!(flat.positions()[0], [2.5, 1.5, 3.5]);
}

#[test]
fn event_lists_preserve_total() {
    let mut hist = cube(12, config(4, 3));
    hist.add_events(&random_events(10_000, 8, [0.0; 3], [12.0; 3]), Weighting::Weighted)
        .unwrap();

    let levels = AxisBinner::uniform(1e-3, 2.0, 4).unwrap();
    let flat = flatten_event_lists(hist.get_event_lists(&levels).unwrap());
    let occupied = hist.cells().iter().filter(|&&v| v != 0.0).count();

    assert_eq!(flat.len(), occupied);
    assert_eq!(flat.total_weight(), hist.total());
    assert!(flat.codes().unwrap().iter().all(|&c| c <= 4));
}

// =============================================================================
// Failures
// =============================================================================

/// Events whose positions panic past a given index.
struct Exploding {
    len: usize,
    fuse: usize,
}

impl EventSource for Exploding {
    fn len(&self) -> usize {
        self.len
    }

    fn position(&self, i: usize) -> [f32; 3] {
        assert!(i < self.fuse, "corrupt event {i}");
        [0.5; 3]
    }
}

#[rstest]
#[case(1)]
#[case(4)]
fn panicking_source_fails_batch(#[case] n_threads: usize) {
    let mut hist = cube(4, config(n_threads, 4));
    let err = hist
        .add_events(&Exploding { len: 10, fuse: 5 }, Weighting::Weighted)
        .unwrap_err();
    assert!(matches!(
        err,
        HistogramError::Segment(SegmentError::Panicked { segment: 0, .. })
    ));

    // Cached aggregates are untouched; a scan brings them in line with the cells.
    assert_eq!(hist.total(), 0.0);
    assert_eq!(hist.num_added(), 0);
    hist.scan_histogram().unwrap();
    assert_eq!(hist.total(), 5.0);
}

fn expiring_config() -> HistogramConfig {
    HistogramConfig::builder()
        .n_threads(2)
        .timeout(Duration::from_nanos(1))
        .build()
        .unwrap()
}

fn is_timeout(err: &HistogramError) -> bool {
    matches!(
        err,
        HistogramError::Segment(SegmentError::TimedOut { .. } | SegmentError::BatchTimedOut { .. })
    )
}

#[test]
fn timeout_fails_scan() {
    let mut hist = cube(32, expiring_config());
    let err = hist.scan_histogram().unwrap_err();
    assert!(is_timeout(&err), "{err}");
    assert_eq!(hist.stats(), HistogramStats::default());
}

#[test]
fn timeout_fails_event_lists() {
    let hist = cube(32, expiring_config());
    let levels = AxisBinner::uniform(0.5, 10.0, 4).unwrap();
    let err = hist.get_event_lists(&levels).unwrap_err();
    assert!(is_timeout(&err), "{err}");
}

#[test]
fn timeout_fails_batch() {
    let mut hist = cube(8, expiring_config());
    let events = random_events(100_000, 4, [0.0; 3], [8.0; 3]);

    let err = hist.add_events(&events, Weighting::Weighted).unwrap_err();
    assert!(is_timeout(&err), "{err}");
    assert_eq!(hist.total(), 0.0);
}
