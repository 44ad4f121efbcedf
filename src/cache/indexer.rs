// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Plot iteration: partitioning cached chunks by an iteration axis and
//! computing per-partition and global axis ranges.

use itertools::Itertools;
use log::info;

use super::{CacheError, VisCache};
use crate::axis::Axis;

/// Min/max of one plot axis over a set of points, split by mask state.
#[derive(Debug, Clone, Copy, Default)]
pub struct AxisRanges {
    /// Over unflagged points only.
    pub masked: Option<(f64, f64)>,
    /// Over all points.
    pub unmasked: Option<(f64, f64)>,
}

impl AxisRanges {
    fn update(&mut self, value: f64, masked: bool) {
        if value.is_nan() {
            return;
        }
        let grow = |r: &mut Option<(f64, f64)>| match r {
            None => *r = Some((value, value)),
            Some((lo, hi)) => {
                *lo = lo.min(value);
                *hi = hi.max(value);
            }
        };
        grow(&mut self.unmasked);
        if masked {
            grow(&mut self.masked);
        }
    }

    fn fold(&mut self, other: &AxisRanges) {
        let merge = |into: &mut Option<(f64, f64)>, from: Option<(f64, f64)>| {
            if let Some((lo, hi)) = from {
                match into {
                    None => *into = Some((lo, hi)),
                    Some((ilo, ihi)) => {
                        *ilo = ilo.min(lo);
                        *ihi = ihi.max(hi);
                    }
                }
            }
        };
        merge(&mut self.masked, other.masked);
        merge(&mut self.unmasked, other.unmasked);
    }
}

/// One iteration step: the chunks it draws from and its axis ranges.
/// Partitions never copy point data.
#[derive(Debug)]
pub struct Partition {
    /// The iteration-axis value this partition shows; `None` for the
    /// everything-in-one partition.
    pub value: Option<i32>,
    pub chunks: Vec<usize>,
    pub x: AxisRanges,
    pub y: AxisRanges,
}

#[derive(Debug)]
pub(super) struct Indexer {
    iter_axis: Option<Axis>,
    partitions: Vec<Partition>,
    global_x: bool,
    global_y: bool,
    x_global: AxisRanges,
    y_global: AxisRanges,
}

impl VisCache {
    /// Partition the cache for iterated plotting and compute axis ranges.
    ///
    /// `global_x`/`global_y` make [`VisCache::plot_ranges`] report the
    /// global range for that axis instead of the per-partition one.
    pub fn setup_indexer(
        &mut self,
        iter_axis: Option<Axis>,
        global_x: bool,
        global_y: bool,
    ) -> Result<(), CacheError> {
        if !self.ready {
            return Err(CacheError::NotReady);
        }
        match iter_axis {
            Some(axis @ (Axis::Baseline | Axis::Antenna)) if self.averaging.baseline => {
                return Err(CacheError::IterationWithBaselineAveraging(axis));
            }
            None
            | Some(Axis::Scan | Axis::Spw | Axis::Field | Axis::Baseline | Axis::Antenna) => {}
            Some(axis) => return Err(CacheError::UnsupportedIteration(axis)),
        }

        // Iterating over rows only makes sense when rows are plottable.
        if matches!(iter_axis, Some(Axis::Baseline | Axis::Antenna)) && !self.net_mask.row {
            self.net_mask.row = true;
            self.rebuild_plot_mask();
            self.rebuild_points();
        }

        let good_chunks: Vec<usize> = (0..self.chunk_shapes.len())
            .filter(|&c| self.good[c])
            .collect();

        let new_partition = |value| Partition {
            value,
            chunks: vec![],
            x: AxisRanges::default(),
            y: AxisRanges::default(),
        };

        let mut partitions: Vec<Partition> = match iter_axis {
            None => {
                let mut p = new_partition(None);
                p.chunks = good_chunks;
                vec![p]
            }
            Some(axis @ (Axis::Scan | Axis::Spw | Axis::Field)) => good_chunks
                .iter()
                .map(|&c| self.i32_at(axis, c, 0))
                .sorted()
                .dedup()
                .map(|v| {
                    let mut p = new_partition(Some(v));
                    p.chunks = good_chunks
                        .iter()
                        .copied()
                        .filter(|&c| self.i32_at(axis, c, 0) == v)
                        .collect();
                    p
                })
                .collect(),
            Some(axis @ (Axis::Baseline | Axis::Antenna)) => {
                let occurs = |chunk: usize, v: i32| -> bool {
                    (0..self.chunk_shapes[chunk].n_row).any(|ir| match axis {
                        Axis::Baseline => self.i32_at(Axis::Baseline, chunk, ir) == v,
                        _ => {
                            self.i32_at(Axis::Antenna1, chunk, ir) == v
                                || self.i32_at(Axis::Antenna2, chunk, ir) == v
                        }
                    })
                };
                let mut values: Vec<i32> = vec![];
                for &c in &good_chunks {
                    for ir in 0..self.chunk_shapes[c].n_row {
                        match axis {
                            Axis::Baseline => values.push(self.i32_at(Axis::Baseline, c, ir)),
                            _ => {
                                values.push(self.i32_at(Axis::Antenna1, c, ir));
                                values.push(self.i32_at(Axis::Antenna2, c, ir));
                            }
                        }
                    }
                }
                values
                    .into_iter()
                    .filter(|&v| v >= 0)
                    .sorted()
                    .dedup()
                    .map(|v| {
                        let mut p = new_partition(Some(v));
                        p.chunks = good_chunks
                            .iter()
                            .copied()
                            .filter(|&c| occurs(c, v))
                            .collect();
                        p
                    })
                    .collect()
            }
            Some(_) => unreachable!("rejected above"),
        };

        let (x_axis, y_axis) = self.current_axes()?;
        let mut x_global = AxisRanges::default();
        let mut y_global = AxisRanges::default();
        for p in &mut partitions {
            for &chunk in &p.chunks {
                for rel in 0..self.chunk_points(chunk) {
                    let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
                    if !self.in_partition(iter_axis, p.value, chunk, ir) {
                        continue;
                    }
                    let masked = self.mask_at(chunk, ic, ichan, ir, ia);
                    p.x.update(
                        self.axis_value(x_axis.axis, chunk, ic, ichan, ir, ia),
                        masked,
                    );
                    p.y.update(
                        self.axis_value(y_axis.axis, chunk, ic, ichan, ir, ia),
                        masked,
                    );
                }
            }
            x_global.fold(&p.x);
            y_global.fold(&p.y);
        }

        info!(
            "indexer: {} partition(s) over {:?}; x range {:?}, y range {:?}",
            partitions.len(),
            iter_axis,
            x_global.unmasked,
            y_global.unmasked
        );
        self.indexer = Some(Indexer {
            iter_axis,
            partitions,
            global_x,
            global_y,
            x_global,
            y_global,
        });
        Ok(())
    }

    /// Does the point at `(chunk, ir)` belong to the partition showing
    /// `value`? Scalar iteration axes are settled by chunk membership.
    fn in_partition(
        &self,
        iter_axis: Option<Axis>,
        value: Option<i32>,
        chunk: usize,
        ir: usize,
    ) -> bool {
        match (iter_axis, value) {
            (Some(Axis::Baseline), Some(v)) => self.i32_at(Axis::Baseline, chunk, ir) == v,
            (Some(Axis::Antenna), Some(v)) => {
                self.i32_at(Axis::Antenna1, chunk, ir) == v
                    || self.i32_at(Axis::Antenna2, chunk, ir) == v
            }
            _ => true,
        }
    }

    pub fn partitions(&self) -> &[Partition] {
        self.indexer
            .as_ref()
            .map_or(&[], |ix| ix.partitions.as_slice())
    }

    pub fn iteration_axis(&self) -> Option<Axis> {
        self.indexer.as_ref().and_then(|ix| ix.iter_axis)
    }

    /// The (x, y) ranges to draw partition `i` with, honoring the global
    /// toggles given to [`VisCache::setup_indexer`].
    pub fn plot_ranges(&self, i: usize) -> Option<(AxisRanges, AxisRanges)> {
        let ix = self.indexer.as_ref()?;
        let p = ix.partitions.get(i)?;
        Some((
            if ix.global_x { ix.x_global } else { p.x },
            if ix.global_y { ix.y_global } else { p.y },
        ))
    }
}
