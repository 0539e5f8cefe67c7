//! Point and neighbourhood queries.

use std::ops::RangeInclusive;

use glam::DVec3;
use ndarray::s;

use super::Histogram3D;
use crate::binning::{ProjectionBinner, bin_center};
use crate::error::Result;

/// Inclusive bin index ranges along the three edge axes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionRanges {
    pub x: RangeInclusive<usize>,
    pub y: RangeInclusive<usize>,
    pub z: RangeInclusive<usize>,
}

impl RegionRanges {
    fn iter(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.z.clone().flat_map(move |iz| {
            self.y
                .clone()
                .flat_map(move |iy| self.x.clone().map(move |ix| [ix, iy, iz]))
        })
    }
}

/// Totals of the cells whose centers lie inside spheres of increasing radius.
#[derive(Clone, Debug, PartialEq)]
pub struct SphereIntegrals {
    /// Sum of cell values per radius.
    pub counts: Vec<f64>,
    /// Number of cells per radius.
    pub n_bins: Vec<usize>,
}

/// Range of bins a sphere covers along `binner`, clamped to the histogram and
/// optionally to `max_offset` bins around the center bin.
fn min_max_index(
    binner: &ProjectionBinner,
    center: DVec3,
    center_index: usize,
    radius: f64,
    max_offset: Option<usize>,
) -> RangeInclusive<usize> {
    let last = binner.n_bins() as i64 - 1;
    let reach = binner.direction() * radius;
    let clamp = |p: DVec3| binner.index(p).clamp(0, last) as usize;
    let mut lo = clamp(center - reach);
    let mut hi = clamp(center + reach);
    if lo > hi {
        std::mem::swap(&mut lo, &mut hi);
    }
    if let Some(offset) = max_offset {
        lo = lo.max(center_index.saturating_sub(offset));
        hi = hi.min(center_index + offset);
    }
    lo..=hi
}

/// Index of the largest entry; ties go to the entry closest to `center`.
fn argmax_nearest(values: &[f64], center: usize) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] || (v == values[best] && i.abs_diff(center) < best.abs_diff(center)) {
            best = i;
        }
    }
    best
}

impl Histogram3D {
    /// `[x, y, z]` bin indices of the cell containing `p`.
    pub fn cell_index(&self, p: DVec3) -> Option<[usize; 3]> {
        let [x, y, z] = &self.duals;
        Some([x.checked_index(p)?, y.checked_index(p)?, z.checked_index(p)?])
    }

    /// Whether `p` lies inside the histogram.
    #[inline]
    pub fn is_point_in(&self, p: DVec3) -> bool {
        self.cell_index(p).is_some()
    }

    /// Value of the cell containing `p`, or zero outside the histogram.
    pub fn value_at(&self, p: DVec3) -> f32 {
        self.cell_index(p)
            .map_or(0.0, |[ix, iy, iz]| self.cells[[iz, iy, ix]])
    }

    /// Sum over the cube of cells within `n` bins of the cell containing `p`.
    ///
    /// Returns zero unless the whole cube lies inside the histogram.
    pub fn total_near(&self, p: DVec3, n: usize) -> f64 {
        let Some(idx) = self.cell_index(p) else {
            return 0.0;
        };
        let lens = [self.n_cols(), self.n_rows(), self.n_pages()];
        if (0..3).any(|k| idx[k] < n || idx[k] + n >= lens[k]) {
            return 0.0;
        }
        let [ix, iy, iz] = idx;
        self.cells
            .slice(s![iz - n..=iz + n, iy - n..=iy + n, ix - n..=ix + n])
            .iter()
            .map(|&v| v as f64)
            .sum()
    }

    /// Center of the bin `[ix, iy, iz]`.
    #[inline]
    pub fn bin_location(&self, ix: usize, iy: usize, iz: usize) -> DVec3 {
        bin_center([ix, iy, iz], &self.edges)
    }

    /// Bins covering a sphere of `radius` around `p`, restricted to the
    /// histogram and to `max_offsets` bins (per axis) around the center bin.
    ///
    /// Returns `None` if `p` is outside the histogram.
    pub fn index_ranges(
        &self,
        p: DVec3,
        radius: f64,
        max_offsets: [Option<usize>; 3],
    ) -> Option<RegionRanges> {
        let center = self.cell_index(p)?;
        let range = |k: usize| min_max_index(&self.duals[k], p, center[k], radius, max_offsets[k]);
        Some(RegionRanges {
            x: range(0),
            y: range(1),
            z: range(2),
        })
    }

    /// Copy of the cells around `p` as a new histogram.
    ///
    /// The region is chosen by [`index_ranges`](Self::index_ranges); the new
    /// histogram uses the matching sub-binners of the edge binners and the same
    /// configuration. Since the original events are unknown, its
    /// [`num_added`](Self::num_added) is set to the truncated total.
    pub fn sub_histogram(
        &self,
        p: DVec3,
        radius: f64,
        max_offsets: [Option<usize>; 3],
    ) -> Result<Option<Histogram3D>> {
        let Some(ranges) = self.index_ranges(p, radius, max_offsets) else {
            return Ok(None);
        };
        let [x, y, z] = &self.edges;
        let edges = [
            x.sub_binner(*ranges.x.start(), *ranges.x.end())?,
            y.sub_binner(*ranges.y.start(), *ranges.y.end())?,
            z.sub_binner(*ranges.z.start(), *ranges.z.end())?,
        ];
        let cells = self
            .cells
            .slice(s![ranges.z.clone(), ranges.y.clone(), ranges.x.clone()])
            .to_owned();
        Histogram3D::from_cells(edges, cells, self.config.clone()).map(Some)
    }

    /// Weighted mean position of the cells whose centers lie within `radius`
    /// of `p`.
    ///
    /// Returns `None` if `p` is outside the histogram or the region holds no
    /// counts.
    pub fn centroid(&self, p: DVec3, radius: f64) -> Option<DVec3> {
        let ranges = self.index_ranges(p, radius, [None; 3])?;
        let mut total = 0.0f64;
        let mut weighted = [0.0f64; 3];
        for idx in ranges.iter() {
            if self.bin_location(idx[0], idx[1], idx[2]).distance(p) >= radius {
                continue;
            }
            let [ix, iy, iz] = idx;
            let v = self.cells[[iz, iy, ix]] as f64;
            total += v;
            for k in 0..3 {
                weighted[k] += idx[k] as f64 * v;
            }
        }
        if total == 0.0 {
            return None;
        }
        Some(
            (0..3)
                .map(|k| self.edges[k].vec_at(weighted[k] / total + 0.5))
                .sum(),
        )
    }

    /// Center of the bin where the per-axis projections of the cells around
    /// `p` peak.
    ///
    /// The region is the box covering a sphere of `radius`. Ties go to the bin
    /// closest to the bin containing `p`. Returns `None` if `p` is outside the
    /// histogram or the region holds no counts.
    pub fn max_point(&self, p: DVec3, radius: f64) -> Option<DVec3> {
        let center = self.cell_index(p)?;
        let ranges = self.index_ranges(p, radius, [None; 3])?;
        let starts = [*ranges.x.start(), *ranges.y.start(), *ranges.z.start()];
        let lens = [
            ranges.x.clone().count(),
            ranges.y.clone().count(),
            ranges.z.clone().count(),
        ];
        let mut projections = lens.map(|n| vec![0.0f64; n]);
        let mut any = false;
        for idx in ranges.iter() {
            let v = self.cells[[idx[2], idx[1], idx[0]]] as f64;
            any |= v != 0.0;
            for k in 0..3 {
                projections[k][idx[k] - starts[k]] += v;
            }
        }
        if !any {
            return None;
        }

        let best: [usize; 3] = std::array::from_fn(|k| {
            argmax_nearest(&projections[k], center[k].saturating_sub(starts[k]))
        });
        log::debug!(
            "max_point: region {:?}, peak offsets {:?}, projections {:?}",
            lens,
            best,
            projections
        );
        Some(self.bin_location(
            starts[0] + best[0],
            starts[1] + best[1],
            starts[2] + best[2],
        ))
    }

    /// Counts and cell numbers within each of `radii` around `p`.
    ///
    /// Returns `None` if `p` is outside the histogram.
    pub fn sphere_integrals(&self, p: DVec3, radii: &[f64]) -> Option<SphereIntegrals> {
        let max_radius = radii.iter().copied().fold(0.0, f64::max);
        let ranges = self.index_ranges(p, max_radius, [None; 3])?;
        let mut out = SphereIntegrals {
            counts: vec![0.0; radii.len()],
            n_bins: vec![0; radii.len()],
        };
        for idx in ranges.iter() {
            let distance = self.bin_location(idx[0], idx[1], idx[2]).distance(p);
            let v = self.cells[[idx[2], idx[1], idx[0]]] as f64;
            for (i, &r) in radii.iter().enumerate() {
                if distance < r {
                    out.counts[i] += v;
                    out.n_bins[i] += 1;
                }
            }
        }
        Some(out)
    }
}
