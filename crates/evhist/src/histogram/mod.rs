//! The 3D histogram engine.
//!
//! [`Histogram3D`] stores cell values in an `Array3<f32>` indexed as
//! `[page, row, col]`, i.e. `[z, y, x]` in the coordinates of its edge binners.
//! Bulk operations (clearing, binning, scanning, event-list extraction) are
//! split into page segments and executed by a [`SegmentRunner`].
//!
//! # Example
//!
//! ```
//! use glam::DVec3;
//! use evhist::{AxisBinner, Event, Histogram3D, ProjectionBinner, Weighting};
//!
//! let axis = |d| ProjectionBinner::new(AxisBinner::uniform(0.0, 10.0, 10).unwrap(), d).unwrap();
//! let mut hist = Histogram3D::new(axis(DVec3::X), axis(DVec3::Y), axis(DVec3::Z)).unwrap();
//!
//! let events = vec![Event::weighted(1.5, 2.5, 3.5, 2.0), Event::new(20.0, 0.0, 0.0)];
//! let added = hist.add_events(&events, Weighting::Weighted).unwrap();
//! assert_eq!(added, 2.0);
//! assert_eq!(hist.num_dropped(), 1);
//! assert_eq!(hist.page(3).unwrap()[[2, 1]], 2.0);
//! ```

mod ops;
mod region;
pub mod segment;

pub use ops::Weighting;
pub use region::{RegionRanges, SphereIntegrals};
pub use segment::{Deadline, Segment, SegmentRunner, SegmentStats, split_pages};

use ndarray::{Array2, Array3, ArrayView2, ArrayView3, ArrayViewMut2, Axis};

use crate::binning::{AxisBinner, ProjectionBinner, dual_binners};
use crate::config::HistogramConfig;
use crate::error::{HistogramError, Result};
use crate::event::{EventList, EventSource};
use ops::CenterTables;
use segment::{split_pages_mut, split_pages_ref};

/// Cached aggregates of all cell values.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct HistogramStats {
    pub min: f32,
    pub max: f32,
    pub total: f64,
}

// =============================================================================
// Histogram3D
// =============================================================================

/// A dense 3D histogram over parallelepiped bins.
///
/// Bins are described by three edge [`ProjectionBinner`]s. Events are binned
/// with the derived dual binners, which recover each event's coefficient
/// along the (possibly oblique) edge directions.
#[derive(Debug)]
pub struct Histogram3D {
    edges: [ProjectionBinner; 3],
    duals: [ProjectionBinner; 3],
    cells: Array3<f32>,
    stats: HistogramStats,
    num_added: u64,
    num_dropped: u64,
    config: HistogramConfig,
    runner: SegmentRunner,
}

impl Histogram3D {
    /// Create an empty histogram with the default configuration.
    pub fn new(x: ProjectionBinner, y: ProjectionBinner, z: ProjectionBinner) -> Result<Self> {
        Self::with_config(x, y, z, HistogramConfig::default())
    }

    /// Create an empty histogram.
    ///
    /// # Errors
    ///
    /// Fails if the edge directions are coplanar, the configuration is invalid
    /// or the worker pool cannot be built.
    pub fn with_config(
        x: ProjectionBinner,
        y: ProjectionBinner,
        z: ProjectionBinner,
        config: HistogramConfig,
    ) -> Result<Self> {
        let runner = SegmentRunner::new(&config)?;
        let duals = dual_binners([&x, &y, &z])?;
        let cells = Array3::zeros((z.n_bins(), y.n_bins(), x.n_bins()));
        log::debug!(
            "created {}x{}x{} histogram with {} thread(s)",
            x.n_bins(),
            y.n_bins(),
            z.n_bins(),
            runner.n_threads()
        );
        Ok(Self {
            edges: [x, y, z],
            duals,
            cells,
            stats: HistogramStats::default(),
            num_added: 0,
            num_dropped: 0,
            config,
            runner,
        })
    }

    /// Histogram over `edges` holding `cells`, with aggregates computed from
    /// the cells.
    pub(crate) fn from_cells(
        edges: [ProjectionBinner; 3],
        cells: Array3<f32>,
        config: HistogramConfig,
    ) -> Result<Self> {
        let [x, y, z] = edges;
        let mut hist = Self::with_config(x, y, z, config)?;
        debug_assert_eq!(hist.cells.dim(), cells.dim());
        hist.cells = cells;
        hist.scan_histogram()?;
        hist.num_added = hist.stats.total.max(0.0) as u64;
        Ok(hist)
    }

    /// Move the histogram to new edge binners and clear it.
    ///
    /// The cell array is reused if the bin counts are unchanged. On error the
    /// histogram is left untouched.
    pub fn set_position(
        &mut self,
        x: ProjectionBinner,
        y: ProjectionBinner,
        z: ProjectionBinner,
    ) -> Result<()> {
        let duals = dual_binners([&x, &y, &z])?;
        let shape = (z.n_bins(), y.n_bins(), x.n_bins());
        self.edges = [x, y, z];
        self.duals = duals;
        if self.cells.dim() == shape {
            self.clear()
        } else {
            self.cells = Array3::zeros(shape);
            self.reset_counters();
            Ok(())
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Edge binners in `[x, y, z]` order.
    #[inline]
    pub fn edge_binners(&self) -> &[ProjectionBinner; 3] {
        &self.edges
    }

    /// Dual binners in `[x, y, z]` order, used to bin events.
    #[inline]
    pub fn dual_binners(&self) -> &[ProjectionBinner; 3] {
        &self.duals
    }

    #[inline]
    pub fn config(&self) -> &HistogramConfig {
        &self.config
    }

    #[inline]
    pub fn n_pages(&self) -> usize {
        self.cells.len_of(Axis(0))
    }

    #[inline]
    pub fn n_rows(&self) -> usize {
        self.cells.len_of(Axis(1))
    }

    #[inline]
    pub fn n_cols(&self) -> usize {
        self.cells.len_of(Axis(2))
    }

    /// `(n_pages, n_rows, n_cols)`.
    #[inline]
    pub fn shape(&self) -> (usize, usize, usize) {
        self.cells.dim()
    }

    /// All cells, indexed `[page, row, col]`.
    #[inline]
    pub fn cells(&self) -> ArrayView3<'_, f32> {
        self.cells.view()
    }

    #[inline]
    pub fn min_val(&self) -> f32 {
        self.stats.min
    }

    #[inline]
    pub fn max_val(&self) -> f32 {
        self.stats.max
    }

    /// Sum of all cell values.
    #[inline]
    pub fn total(&self) -> f64 {
        self.stats.total
    }

    #[inline]
    pub fn stats(&self) -> HistogramStats {
        self.stats
    }

    /// Number of events offered to [`add_events`](Self::add_events) since the
    /// last clear, including dropped ones.
    #[inline]
    pub fn num_added(&self) -> u64 {
        self.num_added
    }

    /// Number of events that fell outside the histogram since the last clear.
    #[inline]
    pub fn num_dropped(&self) -> u64 {
        self.num_dropped
    }

    // =========================================================================
    // Segment Operations
    // =========================================================================

    fn segments(&self) -> Vec<Segment> {
        split_pages(self.n_pages(), self.config.n_segments)
    }

    fn reset_counters(&mut self) {
        self.stats = HistogramStats::default();
        self.num_added = 0;
        self.num_dropped = 0;
    }

    /// Set every cell and aggregate to zero.
    pub fn clear(&mut self) -> Result<()> {
        let segments = self.segments();
        let views = split_pages_mut(self.cells.view_mut(), &segments);
        let tasks: Vec<_> = segments.into_iter().zip(views).collect();
        self.runner
            .run(tasks, |_, (segment, pages), deadline| {
                ops::clear_pages(&segment, pages, deadline)
            })?;
        self.reset_counters();
        Ok(())
    }

    /// Add `events` to the histogram and return the change of the total.
    ///
    /// The new total is the sum of the cells after binning, so weights that
    /// an `f32` cell cannot absorb do not count towards it.
    ///
    /// Events outside the histogram are dropped and counted by
    /// [`num_dropped`](Self::num_dropped). If a segment fails, cells may be
    /// partially updated while the cached aggregates keep their old values;
    /// [`scan_histogram`](Self::scan_histogram) brings them back in sync.
    pub fn add_events<E: EventSource + ?Sized>(
        &mut self,
        events: &E,
        weighting: Weighting,
    ) -> Result<f64> {
        let n_events = events.len();
        if n_events == 0 {
            return Ok(0.0);
        }

        let segments = self.segments();
        let views = split_pages_mut(self.cells.view_mut(), &segments);
        let tasks: Vec<_> = segments.into_iter().zip(views).collect();
        let duals = &self.duals;
        let partials = self.runner.run(tasks, |_, (segment, pages), deadline| {
            ops::bin_events(&segment, pages, duals, events, weighting, deadline)
        })?;
        let merged = SegmentStats::reduce(partials);

        let old_total = self.stats.total;
        self.stats = HistogramStats {
            min: merged.min,
            max: merged.max,
            total: merged.sum(),
        };
        let dropped = n_events as u64 - merged.binned;
        self.num_added += n_events as u64;
        self.num_dropped += dropped;

        if dropped == n_events as u64 {
            log::warn!("all {n_events} events fell outside the histogram");
        } else {
            log::debug!(
                "binned {} of {n_events} events, {dropped} dropped",
                merged.binned
            );
        }
        Ok(self.stats.total - old_total)
    }

    /// Recompute minimum, maximum and total from the cells.
    pub fn scan_histogram(&mut self) -> Result<()> {
        let segments = self.segments();
        let views = split_pages_ref(self.cells.view(), &segments);
        let tasks: Vec<_> = segments.into_iter().zip(views).collect();
        let partials = self.runner.run(tasks, |_, (segment, pages), deadline| {
            ops::scan_pages(&segment, pages, deadline)
        })?;
        let merged = SegmentStats::reduce(partials);
        self.stats = HistogramStats {
            min: merged.min,
            max: merged.max,
            total: merged.sum(),
        };
        log::debug!(
            "scanned histogram: min {}, max {}, total {}",
            merged.min,
            merged.max,
            self.stats.total
        );
        Ok(())
    }

    /// One representative event per occupied cell, grouped by segment and by
    /// the level of the cell value.
    ///
    /// The result holds, for each segment, `levels.n_bins() + 1` buckets. Each
    /// event sits at its cell center, carries the cell value as weight and the
    /// bucket index as code. Cells with value zero or below the first level are
    /// skipped; values beyond the last level go to the final bucket. Empty
    /// buckets are `None`.
    ///
    /// See [`flatten_event_lists`](crate::event::flatten_event_lists) to merge
    /// the result.
    pub fn get_event_lists(&self, levels: &AxisBinner) -> Result<Vec<Vec<Option<EventList>>>> {
        let centers = CenterTables::new(&self.edges);
        let segments = self.segments();
        let views = split_pages_ref(self.cells.view(), &segments);
        let tasks: Vec<_> = segments.into_iter().zip(views).collect();
        let lists = self.runner.run(tasks, |_, (segment, pages), deadline| {
            ops::collect_event_lists(&segment, pages, &centers, levels, deadline)
        })?;
        Ok(lists)
    }

    // =========================================================================
    // Slices
    // =========================================================================

    fn check_index(axis: &'static str, index: usize, len: usize) -> Result<()> {
        if index < len {
            Ok(())
        } else {
            Err(HistogramError::IndexOutOfRange { axis, index, len })
        }
    }

    /// Page `i` as a `[row, col]` view.
    pub fn page(&self, i: usize) -> Result<ArrayView2<'_, f32>> {
        Self::check_index("page", i, self.n_pages())?;
        Ok(self.cells.index_axis(Axis(0), i))
    }

    /// Row `i` of every page as a new `[col, page]` array.
    pub fn row(&self, i: usize) -> Result<Array2<f32>> {
        let mut out = Array2::zeros((self.n_cols(), self.n_pages()));
        self.row_into(i, out.view_mut())?;
        Ok(out)
    }

    /// Write row `i` of every page into `out`, indexed `[col, page]`.
    pub fn row_into(&self, i: usize, mut out: ArrayViewMut2<'_, f32>) -> Result<()> {
        Self::check_index("row", i, self.n_rows())?;
        let expected = (self.n_cols(), self.n_pages());
        if out.dim() != expected {
            return Err(HistogramError::BufferShape {
                expected,
                got: out.dim(),
            });
        }
        out.assign(&self.cells.index_axis(Axis(1), i).t());
        Ok(())
    }

    /// Column `i` of every page as a `[page, row]` view.
    pub fn col(&self, i: usize) -> Result<ArrayView2<'_, f32>> {
        Self::check_index("col", i, self.n_cols())?;
        Ok(self.cells.index_axis(Axis(2), i))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binning::UniformBinner;
    use crate::error::BinnerError;
    use crate::event::Event;
    use glam::DVec3;

    fn axis(min: f64, max: f64, n: usize, d: DVec3) -> ProjectionBinner {
        ProjectionBinner::new(UniformBinner::new(min, max, n).unwrap(), d).unwrap()
    }

    fn hist(nx: usize, ny: usize, nz: usize, config: HistogramConfig) -> Histogram3D {
        Histogram3D::with_config(
            axis(0.0, nx as f64, nx, DVec3::X),
            axis(0.0, ny as f64, ny, DVec3::Y),
            axis(0.0, nz as f64, nz, DVec3::Z),
            config,
        )
        .unwrap()
    }

    #[test]
    fn test_new_is_empty() {
        let h = hist(3, 4, 5, HistogramConfig::default());
        assert_eq!(h.shape(), (5, 4, 3));
        assert_eq!(h.stats(), HistogramStats::default());
        assert_eq!(h.num_added(), 0);
    }

    #[test]
    fn test_coplanar_edges_rejected() {
        let err = Histogram3D::new(
            axis(0.0, 1.0, 1, DVec3::X),
            axis(0.0, 1.0, 1, DVec3::Y),
            axis(0.0, 1.0, 1, DVec3::new(1.0, 1.0, 0.0)),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            HistogramError::Binner(BinnerError::DegenerateBasis)
        ));
    }

    #[test]
    fn test_add_events_updates_aggregates() {
        let mut h = hist(4, 4, 4, HistogramConfig::default());
        let events = vec![
            Event::weighted(0.5, 0.5, 0.5, 2.0),
            Event::weighted(0.5, 0.5, 0.5, 3.0),
            Event::weighted(3.5, 1.5, 2.5, 1.5),
            Event::weighted(-1.0, 0.5, 0.5, 100.0),
        ];
        let delta = h.add_events(&events, Weighting::Weighted).unwrap();
        assert_eq!(delta, 6.5);
        assert_eq!(h.total(), 6.5);
        assert_eq!(h.max_val(), 5.0);
        assert_eq!(h.min_val(), 0.0);
        assert_eq!(h.num_added(), 4);
        assert_eq!(h.num_dropped(), 1);
        assert_eq!(h.cells()[[2, 1, 3]], 1.5);

        let delta = h.add_events(&events, Weighting::Unit).unwrap();
        assert_eq!(delta, 3.0);
        assert_eq!(h.total(), 9.5);
        assert_eq!(h.max_val(), 7.0);
    }

    #[test]
    fn test_total_follows_cells_past_f32_precision() {
        let mut h = hist(2, 2, 2, HistogramConfig::default());
        let events = vec![
            Event::weighted(0.5, 0.5, 0.5, 16_777_216.0),
            Event::weighted(0.5, 0.5, 0.5, 1.0),
        ];
        let delta = h.add_events(&events, Weighting::Weighted).unwrap();
        assert_eq!(delta, 16_777_216.0);
        assert_eq!(h.total(), 16_777_216.0);
        assert_eq!(h.num_dropped(), 0);

        let cached = h.stats();
        h.scan_histogram().unwrap();
        assert_eq!(h.stats(), cached);
    }

    #[test]
    fn test_empty_events_are_a_no_op() {
        let mut h = hist(2, 2, 2, HistogramConfig::default());
        let none: Vec<Event> = Vec::new();
        assert_eq!(h.add_events(&none, Weighting::Weighted).unwrap(), 0.0);
        assert_eq!(h.num_added(), 0);
    }

    #[test]
    fn test_clear_and_scan() {
        let mut h = hist(3, 3, 6, HistogramConfig::default());
        let events = vec![Event::new(1.0, 1.0, 1.0), Event::new(2.0, 2.0, 5.0)];
        h.add_events(&events, Weighting::Weighted).unwrap();

        h.clear().unwrap();
        assert_eq!(h.stats(), HistogramStats::default());
        assert_eq!(h.num_added(), 0);
        h.scan_histogram().unwrap();
        assert_eq!(h.stats(), HistogramStats::default());
        assert!(h.cells().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_scan_repairs_stats() {
        let mut h = hist(2, 2, 2, HistogramConfig::default());
        h.cells[[1, 0, 1]] = 4.0;
        h.cells[[0, 1, 0]] = -1.0;
        h.scan_histogram().unwrap();
        assert_eq!(
            h.stats(),
            HistogramStats {
                min: -1.0,
                max: 4.0,
                total: 3.0
            }
        );
    }

    #[test]
    fn test_slices() {
        let mut h = hist(2, 3, 4, HistogramConfig::default());
        for ((p, r, c), v) in h.cells.indexed_iter_mut() {
            *v = (100 * p + 10 * r + c) as f32;
        }

        let page = h.page(2).unwrap();
        assert_eq!(page.dim(), (3, 2));
        assert_eq!(page[[1, 1]], 211.0);

        let row = h.row(1).unwrap();
        assert_eq!(row.dim(), (2, 4));
        assert_eq!(row[[1, 3]], 311.0);

        let col = h.col(0).unwrap();
        assert_eq!(col.dim(), (4, 3));
        assert_eq!(col[[3, 2]], 320.0);

        let mut buffer = Array2::zeros((2, 4));
        h.row_into(2, buffer.view_mut()).unwrap();
        assert_eq!(buffer[[0, 1]], 120.0);
    }

    #[test]
    fn test_slice_errors() {
        let h = hist(2, 3, 4, HistogramConfig::default());
        assert!(matches!(
            h.page(4),
            Err(HistogramError::IndexOutOfRange {
                axis: "page",
                index: 4,
                len: 4
            })
        ));
        assert!(h.row(3).is_err());
        assert!(h.col(2).is_err());
        let mut wrong = Array2::zeros((4, 2));
        assert!(matches!(
            h.row_into(0, wrong.view_mut()),
            Err(HistogramError::BufferShape { .. })
        ));
    }

    #[test]
    fn test_set_position() {
        let mut h = hist(2, 2, 2, HistogramConfig::default());
        h.add_events(&vec![Event::new(0.5, 0.5, 0.5)], Weighting::Weighted)
            .unwrap();

        h.set_position(
            axis(10.0, 12.0, 2, DVec3::X),
            axis(10.0, 12.0, 2, DVec3::Y),
            axis(10.0, 12.0, 2, DVec3::Z),
        )
        .unwrap();
        assert_eq!(h.total(), 0.0);
        assert!(h.cells().iter().all(|&v| v == 0.0));
        h.add_events(&vec![Event::new(11.5, 10.5, 10.5)], Weighting::Weighted)
            .unwrap();
        assert_eq!(h.cells()[[0, 0, 1]], 1.0);

        h.set_position(
            axis(0.0, 5.0, 5, DVec3::X),
            axis(0.0, 1.0, 1, DVec3::Y),
            axis(0.0, 3.0, 3, DVec3::Z),
        )
        .unwrap();
        assert_eq!(h.shape(), (3, 1, 5));
        assert_eq!(h.num_added(), 0);

        let before = h.edge_binners().clone();
        assert!(
            h.set_position(
                axis(0.0, 1.0, 1, DVec3::X),
                axis(0.0, 1.0, 1, DVec3::X),
                axis(0.0, 1.0, 1, DVec3::Z),
            )
            .is_err()
        );
        assert_eq!(h.edge_binners(), &before);
    }

    #[test]
    fn test_event_lists_per_segment() {
        let config = HistogramConfig::builder().n_segments(2).build().unwrap();
        let mut h = hist(2, 2, 4, config);
        let events = vec![
            Event::weighted(0.5, 0.5, 0.5, 20.0),
            Event::weighted(1.5, 1.5, 3.5, 50.0),
        ];
        h.add_events(&events, Weighting::Weighted).unwrap();

        let levels = AxisBinner::uniform(10.0, 100.0, 9).unwrap();
        let lists = h.get_event_lists(&levels).unwrap();
        assert_eq!(lists.len(), 2);
        assert!(lists.iter().all(|seg| seg.len() == 10));

        let first = lists[0][1].as_ref().unwrap();
        assert_eq!(first.positions(), &[[0.5, 0.5, 0.5]]);
        assert_eq!(first.weights(), Some(&[20.0][..]));
        let second = lists[1][4].as_ref().unwrap();
        assert_eq!(second.positions(), &[[1.5, 1.5, 3.5]]);
        assert_eq!(second.code(0), Some(4));
    }
}
