// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The visibility cache.

[`VisCache`] owns per-chunk, per-axis storage for everything a plot needs.
A load pass counts chunks, runs the memory gate, then fills storage for
exactly the axes that are not already satisfied; point accessors, range
indexing and flag write-back all read from that storage afterwards.
 */

mod count;
mod error;
mod flag;
mod indexer;
mod load;
mod mask;

pub use error::CacheError;
pub use flag::FlagPolicy;
pub use indexer::{AxisRanges, Partition};

use hifitime::Epoch;
use indexmap::IndexMap;
use log::info;
use ndarray::prelude::*;
use vec1::Vec1;

use crate::averaging::Averaging;
use crate::axis::{Axis, AxisMask, DataColumn, METADATA_AXES};
use crate::progress::Progress;
use crate::selection::Selection;
use crate::stream::RecordStream;
use crate::volume::{MemoryBudget, VolumeMeter};

use indexer::Indexer;

/// An axis plus the visibility column it reads. The column is only
/// meaningful for data-like axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlotAxis {
    pub axis: Axis,
    pub column: DataColumn,
}

impl PlotAxis {
    pub fn new(axis: Axis) -> PlotAxis {
        PlotAxis {
            axis,
            column: DataColumn::default(),
        }
    }
}

impl From<Axis> for PlotAxis {
    fn from(axis: Axis) -> PlotAxis {
        PlotAxis::new(axis)
    }
}

/// Value transforms applied to raw groups as they are read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transforms {
    /// Phase-center offset (dx, dy) in radians. Rotates all visibility
    /// columns per row and channel.
    pub phase_shift: Option<(f64, f64)>,
}

/// A rectangle in plot coordinates.
#[derive(Debug, Clone, Copy)]
pub struct PlotRegion {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl PlotRegion {
    fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }
}

/// Everything known about one plotted point.
#[derive(Debug, Clone, Copy)]
pub struct PointMeta {
    pub point: u64,
    pub chunk: usize,
    pub scan: i32,
    pub field: i32,
    pub spw: i32,
    /// Seconds past the cache reference time.
    pub time: f64,
    pub antenna1: i32,
    pub antenna2: i32,
    pub channel: i32,
    /// GHz.
    pub frequency: f64,
    /// Correlation-type code.
    pub corr: i32,
    pub x: f64,
    pub y: f64,
}

/// Shape of one cached chunk.
#[derive(Debug, Clone, Copy, Default)]
struct ChunkShape {
    n_corr: usize,
    n_chan: usize,
    n_row: usize,
}

/// Typed per-chunk storage for one axis. Indexed by chunk id; every variant
/// stays aligned with the chunk metadata list, bad chunks holding empty
/// entries.
#[derive(Debug)]
enum AxisData {
    ChunkF64(Vec<f64>),
    ChunkI32(Vec<i32>),
    VecI32(Vec<Vec<i32>>),
    VecU64(Vec<Vec<u64>>),
    VecF64(Vec<Vec<f64>>),
    VecBool(Vec<Vec<bool>>),
    MatF32(Vec<Array2<f32>>),
    MatF64(Vec<Array2<f64>>),
    CubeF32(Vec<Array3<f32>>),
    CubeBool(Vec<Array3<bool>>),
}

#[derive(Debug)]
struct LoadedAxis {
    /// The visibility column behind a data-like axis.
    column: Option<DataColumn>,
    data: AxisData,
}

pub struct VisCache {
    budget: MemoryBudget,

    selection: Selection,
    averaging: Averaging,
    transforms: Transforms,

    chunk_shapes: Vec<ChunkShape>,
    good: Vec<bool>,
    groups_per_chunk: Vec<usize>,
    n_ant: usize,
    ref_time: Epoch,

    axes: IndexMap<Axis, LoadedAxis>,

    current: Option<(PlotAxis, PlotAxis)>,
    net_mask: AxisMask,
    plot_mask: Vec<Array3<bool>>,
    cum_points: Vec<u64>,
    indexer: Option<Indexer>,
    ready: bool,
}

impl VisCache {
    pub fn new(budget: MemoryBudget) -> VisCache {
        VisCache {
            budget,
            selection: Selection::default(),
            averaging: Averaging::default(),
            transforms: Transforms::default(),
            chunk_shapes: vec![],
            good: vec![],
            groups_per_chunk: vec![],
            n_ant: 0,
            ref_time: Epoch::from_mjd_utc(0.0),
            axes: IndexMap::new(),
            current: None,
            net_mask: AxisMask::NONE,
            plot_mask: vec![],
            cum_points: vec![],
            indexer: None,
            ready: false,
        }
    }

    /// Load whatever `x`, `y` and `extra` need that is not already cached.
    ///
    /// Metadata axes are always part of the pending set. Axes loaded on a
    /// previous call are kept and skipped unless their data column changed.
    /// A change of selection, averaging or transforms invalidates the whole
    /// cache first.
    ///
    /// Cancellation through `progress` is not an error: the call returns
    /// `Ok` with [`VisCache::is_ready`] false.
    #[allow(clippy::too_many_arguments)]
    pub fn load(
        &mut self,
        stream: &mut dyn RecordStream,
        x: PlotAxis,
        y: PlotAxis,
        extra: &[PlotAxis],
        selection: &Selection,
        averaging: &Averaging,
        transforms: &Transforms,
        progress: &dyn Progress,
    ) -> Result<(), CacheError> {
        if !self.axes.is_empty()
            && (self.selection != *selection
                || self.averaging != *averaging
                || self.transforms != *transforms)
        {
            info!("cache configuration changed; discarding cached axes");
            self.clear();
        }
        self.selection = selection.clone();
        self.averaging = averaging.clone();
        self.transforms = transforms.clone();

        // Pending = metadata axes, requested axes, then axes already loaded.
        let mut pending: IndexMap<Axis, DataColumn> = IndexMap::new();
        for axis in METADATA_AXES {
            pending.insert(axis, DataColumn::default());
        }
        for pa in [&x, &y].into_iter().chain(extra) {
            pending.insert(pa.axis, pa.column);
        }
        for (axis, state) in &self.axes {
            pending
                .entry(*axis)
                .or_insert(state.column.unwrap_or_default());
        }

        if averaging.any() && pending.contains_key(&Axis::Wt) {
            return Err(CacheError::UnsupportedAveragingCombination);
        }
        for axis in pending.keys() {
            if !axis.is_loadable() {
                return Err(CacheError::UnsupportedAxis(*axis));
            }
        }

        // Only axes not yet satisfied get loaded.
        let mut load_list: Vec<(Axis, DataColumn)> = pending
            .iter()
            .filter(|(axis, column)| match self.axes.get(*axis) {
                None => true,
                Some(state) => axis.is_data() && state.column != Some(**column),
            })
            .map(|(axis, column)| (*axis, *column))
            .collect();

        if !load_list.is_empty() {
            let mut meter = VolumeMeter::new(stream, averaging);
            let counted = if averaging.cross_record() {
                count::count_averaging(stream, averaging, &mut meter)?
            } else {
                count::count_simple(stream, &mut meter)?
            };

            let net = x.axis.mask().union(y.axis.mask());
            let to_price: Vec<Axis> = pending.keys().copied().collect();
            if let Err(e) = meter.estimate(&to_price, net, self.budget) {
                // The gate failing must leave nothing half-loaded behind.
                self.clear();
                return Err(e.into());
            }

            // A different chunk layout than what is cached means the stream
            // changed underneath us; reload everything.
            if !self.axes.is_empty() && counted.n_chunks != self.chunk_shapes.len() {
                self.axes.clear();
                load_list = pending.iter().map(|(a, c)| (*a, *c)).collect();
            }

            self.n_ant = stream.n_antennas();
            self.ref_time = counted.ref_time;
            self.groups_per_chunk = counted.groups_per_chunk.clone();
            self.chunk_shapes = Vec::with_capacity(counted.n_chunks);
            self.good = Vec::with_capacity(counted.n_chunks);
            for &(axis, column) in &load_list {
                self.axes.insert(
                    axis,
                    LoadedAxis {
                        column: axis.is_data().then_some(column),
                        data: load::empty_arena(axis),
                    },
                );
            }

            let canceled = self.run_load(stream, &counted, &load_list, progress)?;
            if canceled {
                info!("cache load canceled");
                self.ready = false;
                return Ok(());
            }
        }

        self.current = Some((x, y));
        self.net_mask = x.axis.mask().union(y.axis.mask());
        self.rebuild_plot_mask();
        self.rebuild_points();
        self.indexer = None;
        self.ready = true;
        info!(
            "cache ready: {} chunks, {} plottable points, {} axes loaded",
            self.chunk_shapes.len(),
            self.n_points(),
            self.axes.len()
        );
        Ok(())
    }

    /// Drop the given axes' storage. Releasing a metadata axis or the active
    /// X or Y axis leaves the cache unplottable until the next load.
    pub fn release(&mut self, axes: &[Axis]) {
        for axis in axes {
            self.axes.shift_remove(axis);
            let active = self
                .current
                .is_some_and(|(x, y)| x.axis == *axis || y.axis == *axis);
            if axis.is_metadata() || active {
                self.reset_plot_state();
            }
        }
    }

    /// Release everything.
    pub fn clear(&mut self) {
        self.axes.clear();
        self.current = None;
        self.reset_plot_state();
    }

    fn reset_plot_state(&mut self) {
        self.ready = false;
        self.chunk_shapes.clear();
        self.good.clear();
        self.groups_per_chunk.clear();
        self.plot_mask.clear();
        self.cum_points.clear();
        self.net_mask = AxisMask::NONE;
        self.indexer = None;
    }

    /// Loaded axes and the number of cached values each holds.
    pub fn loaded_axes(&self) -> Vec<(Axis, u64)> {
        self.axes
            .keys()
            .map(|&axis| {
                let m = axis.mask();
                let n: u64 = self
                    .chunk_shapes
                    .iter()
                    .zip(&self.good)
                    .filter(|&(_, good)| *good)
                    .map(|(s, _)| {
                        (if m.corr { s.n_corr as u64 } else { 1 })
                            * (if m.chan { s.n_chan as u64 } else { 1 })
                            * (if m.row { s.n_row as u64 } else { 1 })
                            * (if m.ant { self.n_ant as u64 } else { 1 })
                    })
                    .sum();
                (axis, n)
            })
            .collect()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn n_chunks(&self) -> usize {
        self.chunk_shapes.len()
    }

    pub fn n_points(&self) -> u64 {
        self.cum_points.last().copied().unwrap_or(0)
    }

    /// Masked sizes of a chunk under the current net mask, in
    /// (corr, chan, row, antenna) order.
    fn masked_shape(&self, chunk: usize) -> (usize, usize, usize, usize) {
        let s = self.chunk_shapes[chunk];
        let m = self.net_mask;
        (
            if m.corr { s.n_corr } else { 1 },
            if m.chan { s.n_chan } else { 1 },
            if m.row { s.n_row } else { 1 },
            if m.ant { self.n_ant } else { 1 },
        )
    }

    fn chunk_points(&self, chunk: usize) -> u64 {
        if !self.good[chunk] {
            return 0;
        }
        let (c, n, r, a) = self.masked_shape(chunk);
        (c * n * r * a) as u64
    }

    pub(crate) fn rebuild_points(&mut self) {
        let mut cum = Vec::with_capacity(self.chunk_shapes.len() + 1);
        cum.push(0);
        let mut total = 0u64;
        for chunk in 0..self.chunk_shapes.len() {
            total += self.chunk_points(chunk);
            cum.push(total);
        }
        self.cum_points = cum;
    }

    /// Global point index → (chunk, relative index).
    fn set_chunk(&self, point: u64) -> Result<(usize, u64), CacheError> {
        let n_points = self.n_points();
        if point >= n_points {
            return Err(CacheError::PointOutOfRange {
                index: point,
                n_points,
            });
        }
        let chunk = self.cum_points.partition_point(|&c| c <= point) - 1;
        Ok((chunk, point - self.cum_points[chunk]))
    }

    /// Relative index → (corr, chan, row, antenna) indices. Correlation
    /// varies fastest, then channel, then row, then antenna.
    fn decompose(&self, chunk: usize, rel: u64) -> (usize, usize, usize, usize) {
        let (c, n, r, _) = self.masked_shape(chunk);
        let rel = rel as usize;
        let ic = rel % c;
        let ichan = (rel / c) % n;
        let ir = (rel / (c * n)) % r;
        let ia = rel / (c * n * r);
        (ic, ichan, ir, ia)
    }

    /// Cached value of `axis` at the given chunk and dimension indices.
    /// Indices for dimensions the axis does not span are ignored.
    fn axis_value(&self, axis: Axis, chunk: usize, ic: usize, ichan: usize, ir: usize, ia: usize) -> f64 {
        let Some(loaded) = self.axes.get(&axis) else {
            return f64::NAN;
        };
        let m = axis.mask();
        // The single index a 1-D container wants.
        let i1 = if m.ant {
            ia
        } else if m.corr && !m.chan && !m.row {
            ic
        } else if m.chan && !m.row {
            ichan
        } else {
            ir
        };
        match &loaded.data {
            AxisData::ChunkF64(v) => v[chunk],
            AxisData::ChunkI32(v) => f64::from(v[chunk]),
            AxisData::VecI32(v) => f64::from(v[chunk][i1]),
            AxisData::VecU64(v) => v[chunk][i1] as f64,
            AxisData::VecF64(v) => v[chunk][i1],
            AxisData::VecBool(v) => f64::from(u8::from(v[chunk][i1])),
            AxisData::MatF32(v) => f64::from(v[chunk][(ic, ir)]),
            AxisData::MatF64(v) => v[chunk][(ichan, ir)],
            AxisData::CubeF32(v) => f64::from(v[chunk][(ic, ichan, ir)]),
            AxisData::CubeBool(v) => f64::from(u8::from(v[chunk][(ic, ichan, ir)])),
        }
    }

    fn i32_at(&self, axis: Axis, chunk: usize, i: usize) -> i32 {
        match self.axes.get(&axis).map(|l| &l.data) {
            Some(AxisData::ChunkI32(v)) => v[chunk],
            Some(AxisData::VecI32(v)) => v[chunk][i],
            _ => -1,
        }
    }

    fn f64_at(&self, axis: Axis, chunk: usize, i: usize) -> f64 {
        match self.axes.get(&axis).map(|l| &l.data) {
            Some(AxisData::ChunkF64(v)) => v[chunk],
            Some(AxisData::VecF64(v)) => v[chunk][i],
            _ => f64::NAN,
        }
    }

    /// Plot-mask value at the given indices: true when the point is
    /// unflagged (plottable).
    fn mask_at(&self, chunk: usize, ic: usize, ichan: usize, ir: usize, ia: usize) -> bool {
        let m = self.net_mask;
        let mask = &self.plot_mask[chunk];
        if mask.is_empty() {
            return false;
        }
        let third = if m.row {
            ir
        } else if m.ant {
            ia
        } else {
            0
        };
        mask[(
            if m.corr { ic } else { 0 },
            if m.chan { ichan } else { 0 },
            third,
        )]
    }

    fn current_axes(&self) -> Result<(PlotAxis, PlotAxis), CacheError> {
        if !self.ready {
            return Err(CacheError::NotReady);
        }
        self.current.ok_or(CacheError::NotReady)
    }

    pub fn get_x(&self, point: u64) -> Result<f64, CacheError> {
        let (x, _) = self.current_axes()?;
        let (chunk, rel) = self.set_chunk(point)?;
        let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
        Ok(self.axis_value(x.axis, chunk, ic, ichan, ir, ia))
    }

    pub fn get_y(&self, point: u64) -> Result<f64, CacheError> {
        let (_, y) = self.current_axes()?;
        let (chunk, rel) = self.set_chunk(point)?;
        let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
        Ok(self.axis_value(y.axis, chunk, ic, ichan, ir, ia))
    }

    /// True when the point is unflagged.
    pub fn get_flag_mask(&self, point: u64) -> Result<bool, CacheError> {
        if !self.ready {
            return Err(CacheError::NotReady);
        }
        let (chunk, rel) = self.set_chunk(point)?;
        let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
        Ok(self.mask_at(chunk, ic, ichan, ir, ia))
    }

    fn point_meta(&self, chunk: usize, rel: u64, x: f64, y: f64) -> PointMeta {
        let (ic, ichan, ir, _) = self.decompose(chunk, rel);
        PointMeta {
            point: self.cum_points[chunk] + rel,
            chunk,
            scan: self.i32_at(Axis::Scan, chunk, 0),
            field: self.i32_at(Axis::Field, chunk, 0),
            spw: self.i32_at(Axis::Spw, chunk, 0),
            time: self.f64_at(Axis::Time, chunk, 0),
            antenna1: self.i32_at(Axis::Antenna1, chunk, ir),
            antenna2: self.i32_at(Axis::Antenna2, chunk, ir),
            channel: self.i32_at(Axis::Channel, chunk, ichan),
            frequency: self.f64_at(Axis::Frequency, chunk, ichan),
            corr: self.i32_at(Axis::Corr, chunk, ic),
            x,
            y,
        }
    }

    /// All unflagged points whose (x, y) fall inside any of `regions`, with
    /// their metadata.
    pub fn locate_range(&self, regions: &Vec1<PlotRegion>) -> Result<Vec<PointMeta>, CacheError> {
        let (x_axis, y_axis) = self.current_axes()?;
        let mut found = vec![];
        for chunk in 0..self.chunk_shapes.len() {
            let n = self.chunk_points(chunk);
            for rel in 0..n {
                let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
                if !self.mask_at(chunk, ic, ichan, ir, ia) {
                    continue;
                }
                let x = self.axis_value(x_axis.axis, chunk, ic, ichan, ir, ia);
                let y = self.axis_value(y_axis.axis, chunk, ic, ichan, ir, ia);
                if regions.iter().any(|r| r.contains(x, y)) {
                    found.push(self.point_meta(chunk, rel, x, y));
                }
            }
        }
        info!(
            "located {} unflagged points in {} regions",
            found.len(),
            regions.len()
        );
        Ok(found)
    }
}
