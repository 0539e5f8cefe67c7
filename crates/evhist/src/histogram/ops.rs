//! Segment operators.
//!
//! Each operator works on the pages of one segment only. Page indices inside
//! an operator are local to its view; `segment.first_page()` maps them back to
//! histogram pages.

use glam::DVec3;
use ndarray::{ArrayView3, ArrayViewMut3, Axis};

use super::segment::{Deadline, Segment, SegmentStats};
use crate::binning::{AxisBinner, EventBinner, ProjectionBinner};
use crate::error::SegmentError;
use crate::event::{EventList, EventSource};
use crate::utils::{dvec3, to_f32_array};

/// Events processed between deadline checks.
const EVENT_CHUNK: usize = 4096;

/// How event weights contribute to cells.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Weighting {
    /// Add each event's own weight.
    #[default]
    Weighted,
    /// Add one per event.
    Unit,
}

impl Weighting {
    #[inline]
    fn weight<E: EventSource + ?Sized>(self, events: &E, i: usize) -> f32 {
        match self {
            Weighting::Weighted => events.weight(i),
            Weighting::Unit => 1.0,
        }
    }
}

/// Zero every page of the segment.
pub(crate) fn clear_pages(
    segment: &Segment,
    mut pages: ArrayViewMut3<'_, f32>,
    deadline: &Deadline,
) -> Result<(), SegmentError> {
    for mut page in pages.axis_iter_mut(Axis(0)) {
        deadline.check(segment.index)?;
        page.fill(0.0);
    }
    Ok(())
}

/// Bin every event whose page falls in the segment.
///
/// Every segment walks the full event list in order, so the accumulation
/// order of any single cell does not depend on the number of workers. After
/// binning, the segment's pages are rescanned: the returned sums are those of
/// the `f32` cells, not of the offered weights.
pub(crate) fn bin_events<E: EventSource + ?Sized>(
    segment: &Segment,
    mut pages: ArrayViewMut3<'_, f32>,
    duals: &[ProjectionBinner; 3],
    events: &E,
    weighting: Weighting,
    deadline: &Deadline,
) -> Result<SegmentStats, SegmentError> {
    let [x_binner, y_binner, z_binner] = duals;
    let (n_pages, n_rows, n_cols) = pages.dim();
    let first_page = segment.first_page();
    let n_events = events.len();

    let mut binned = 0u64;
    for chunk_start in (0..n_events).step_by(EVENT_CHUNK) {
        deadline.check(segment.index)?;
        for i in chunk_start..(chunk_start + EVENT_CHUNK).min(n_events) {
            let p = dvec3(events.position(i));

            let Some(page) = z_binner
                .checked_index(p)
                .and_then(|z| z.checked_sub(first_page))
                .filter(|&z| z < n_pages)
            else {
                continue;
            };
            let Some(row) = y_binner.checked_index(p).filter(|&y| y < n_rows) else {
                continue;
            };
            let Some(col) = x_binner.checked_index(p).filter(|&x| x < n_cols) else {
                continue;
            };

            pages[[page, row, col]] += weighting.weight(events, i);
            binned += 1;
        }
    }

    let mut stats = scan_pages(segment, pages.view(), deadline)?;
    stats.binned = binned;
    Ok(stats)
}

/// Per-page sums and extremes of the segment's pages.
pub(crate) fn scan_pages(
    segment: &Segment,
    pages: ArrayView3<'_, f32>,
    deadline: &Deadline,
) -> Result<SegmentStats, SegmentError> {
    let mut stats = SegmentStats::EMPTY;
    stats.page_sums.reserve(pages.len_of(Axis(0)));
    for page in pages.axis_iter(Axis(0)) {
        deadline.check(segment.index)?;
        let mut sum = 0.0f64;
        for &v in page.iter() {
            sum += v as f64;
            stats.min = stats.min.min(v);
            stats.max = stats.max.max(v);
        }
        stats.page_sums.push(sum);
    }
    stats.validate(segment.index)?;
    Ok(stats)
}

/// Bin centers of the edge binners, one table per axis.
#[derive(Clone, Debug)]
pub(crate) struct CenterTables {
    pub x: Vec<DVec3>,
    pub y: Vec<DVec3>,
    pub z: Vec<DVec3>,
}

impl CenterTables {
    pub fn new(edges: &[ProjectionBinner; 3]) -> Self {
        let table = |b: &ProjectionBinner| -> Vec<DVec3> {
            (0..b.n_bins()).map(|i| b.center_vec(i)).collect()
        };
        Self {
            x: table(&edges[0]),
            y: table(&edges[1]),
            z: table(&edges[2]),
        }
    }
}

/// One event per occupied cell, bucketed by the level of the cell value.
///
/// Returns `n_levels + 1` buckets; the last one collects values at or above
/// the level binner's upper bound. Cells below the lowest level are skipped.
pub(crate) fn collect_event_lists(
    segment: &Segment,
    pages: ArrayView3<'_, f32>,
    centers: &CenterTables,
    levels: &AxisBinner,
    deadline: &Deadline,
) -> Result<Vec<Option<EventList>>, SegmentError> {
    let n_levels = levels.n_bins();
    let mut positions: Vec<Vec<[f32; 3]>> = vec![Vec::new(); n_levels + 1];
    let mut weights: Vec<Vec<f32>> = vec![Vec::new(); n_levels + 1];

    for (local_page, page) in pages.axis_iter(Axis(0)).enumerate() {
        deadline.check(segment.index)?;
        let z = centers.z[segment.first_page() + local_page];
        for ((row, col), &value) in page.indexed_iter() {
            if value == 0.0 {
                continue;
            }
            let level = levels.index(value as f64);
            if level < 0 {
                continue;
            }
            let bucket = (level as usize).min(n_levels);
            let center = centers.x[col] + centers.y[row] + z;
            positions[bucket].push(to_f32_array(center));
            weights[bucket].push(value);
        }
    }

    Ok(positions
        .into_iter()
        .zip(weights)
        .enumerate()
        .map(|(bucket, (p, w))| {
            (!p.is_empty()).then(|| EventList::coded(p, w, bucket as u32))
        })
        .collect())
}
