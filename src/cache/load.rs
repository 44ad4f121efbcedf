// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The two load pipelines and the per-axis extraction they dispatch to.

use std::f64::consts::TAU;

use hifitime::Epoch;
use log::trace;
use ndarray::prelude::*;
use num_complex::Complex;

use super::count::ChunkCount;
use super::{AxisData, CacheError, ChunkShape, VisCache};
use crate::averaging::{channel_average, AveragerNeeds, GroupAverager};
use crate::axis::{Axis, DataColumn};
use crate::progress::{Progress, PROGRESS_SEGMENT};
use crate::stream::{RecordGroup, RecordStream, StreamError};

const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// A fresh, empty arena of the right storage kind for an axis.
pub(super) fn empty_arena(axis: Axis) -> AxisData {
    use Axis::*;
    match axis {
        Time | TimeInterval => AxisData::ChunkF64(vec![]),
        Scan | Field | Spw => AxisData::ChunkI32(vec![]),
        Channel | Corr | Antenna1 | Antenna2 | Baseline | Antenna => AxisData::VecI32(vec![]),
        Row => AxisData::VecU64(vec![]),
        Frequency | Uvdist | U | V | W => AxisData::VecF64(vec![]),
        FlagRow => AxisData::VecBool(vec![]),
        Wt => AxisData::MatF32(vec![]),
        UvdistL => AxisData::MatF64(vec![]),
        Amp | Phase | Real | Imag => AxisData::CubeF32(vec![]),
        Flag => AxisData::CubeBool(vec![]),
        // Rejected before any arena is made; an empty f64 arena keeps the
        // match total.
        Velocity | Az0 | El0 | Ha0 | Pa0 | Azimuth | Elevation | ParAng => {
            AxisData::VecF64(vec![])
        }
    }
}

/// Baseline index for an antenna pair. Negative (averaged-away) antenna ids
/// take the slot one past the last antenna.
pub(crate) fn baseline_index(n_ant: usize, a1: i32, a2: i32) -> i32 {
    let n = n_ant as i32;
    let a1 = if a1 < 0 { n } else { a1 };
    let a2 = if a2 < 0 { n } else { a2 };
    (n + 1) * a1 - a1 * (a1 + 1) / 2 + a2
}

/// Which columns the load list reads.
fn column_needs(load_list: &[(Axis, DataColumn)]) -> AveragerNeeds {
    let mut needs = AveragerNeeds::default();
    for &(axis, column) in load_list {
        if axis.is_data() {
            match column {
                DataColumn::Data => needs.data = true,
                DataColumn::Model => needs.model = true,
                DataColumn::Corrected => needs.corrected = true,
                DataColumn::Residual => {
                    needs.corrected = true;
                    needs.model = true;
                }
            }
        }
        if matches!(axis, Axis::Uvdist | Axis::UvdistL | Axis::U | Axis::V | Axis::W) {
            needs.uvw = true;
        }
    }
    needs
}

fn ensure_columns(
    group: &RecordGroup,
    needs: AveragerNeeds,
    group_index: usize,
) -> Result<(), CacheError> {
    for (wanted, cube, name) in [
        (needs.data, &group.data, "data"),
        (needs.model, &group.model, "model"),
        (needs.corrected, &group.corrected, "corrected"),
    ] {
        if wanted && cube.is_none() {
            return Err(CacheError::Stream(StreamError::MissingColumn {
                group: group_index,
                column: name.to_string(),
            }));
        }
    }
    Ok(())
}

impl VisCache {
    /// Run the pipeline matching the retained averaging config over the
    /// load list. Returns true if the progress handle canceled the load.
    pub(super) fn run_load(
        &mut self,
        stream: &mut dyn RecordStream,
        counted: &ChunkCount,
        load_list: &[(Axis, DataColumn)],
        progress: &dyn Progress,
    ) -> Result<bool, CacheError> {
        let needs = column_needs(load_list);
        progress.set_status("Loading cache");

        let n_chunks = counted.n_chunks;
        let segment = if n_chunks < PROGRESS_SEGMENT {
            1
        } else {
            PROGRESS_SEGMENT
        };

        stream.reset()?;
        if self.averaging.cross_record() {
            let averaging = self.averaging.clone();
            let mut group_index = 0;
            for (chunk, &n_groups) in counted.groups_per_chunk.iter().enumerate() {
                if chunk % segment == 0 {
                    progress.set_progress((100 * chunk / n_chunks.max(1)) as u8);
                    if progress.is_canceled() {
                        return Ok(true);
                    }
                }
                let mut averager = GroupAverager::new(&averaging, needs);
                for _ in 0..n_groups {
                    let group = stream.current()?;
                    ensure_columns(group, needs, group_index)?;
                    let prepared = self.prepare_group(group);
                    averager.accumulate(&prepared);
                    group_index += 1;
                    stream.advance()?;
                }
                let merged = averager.finalize();
                trace!(
                    "chunk {chunk}: merged {n_groups} groups into {} rows",
                    merged.n_rows()
                );
                self.push_chunk(&merged, load_list)?;
            }
        } else {
            let mut chunk = 0;
            while stream.more() {
                if chunk % segment == 0 {
                    progress.set_progress((100 * chunk / n_chunks.max(1)) as u8);
                    if progress.is_canceled() {
                        return Ok(true);
                    }
                }
                let group = stream.current()?;
                ensure_columns(group, needs, chunk)?;
                let prepared = self.prepare_group(group);
                self.push_chunk(&prepared, load_list)?;
                chunk += 1;
                stream.advance()?;
            }
        }
        progress.set_progress(100);
        Ok(false)
    }

    /// Apply the phase-shift transform and channel averaging to a raw group.
    fn prepare_group(&self, group: &RecordGroup) -> RecordGroup {
        let mut group = group.clone();
        if let Some((dx, dy)) = self.transforms.phase_shift {
            let (ncorr, nchan, nrow) = group.flags.dim();
            for cube in [&mut group.data, &mut group.model, &mut group.corrected]
                .into_iter()
                .flatten()
            {
                for ir in 0..nrow {
                    let uv = group.uvw[(0, ir)] * dx + group.uvw[(1, ir)] * dy;
                    for ch in 0..nchan {
                        let arg = -TAU * uv * group.freqs[ch] / SPEED_OF_LIGHT;
                        let phasor = Complex::from_polar(1.0f32, arg as f32);
                        for ic in 0..ncorr {
                            cube[(ic, ch, ir)] *= phasor;
                        }
                    }
                }
            }
        }
        let factor = self.averaging.channel_factor();
        if factor > 1 {
            group = channel_average(&group, factor);
        }
        group
    }

    /// Record one chunk's shape and append its values for every load-list
    /// axis. A zero-row group becomes a bad chunk with empty entries.
    fn push_chunk(
        &mut self,
        group: &RecordGroup,
        load_list: &[(Axis, DataColumn)],
    ) -> Result<(), CacheError> {
        let chunk = self.chunk_shapes.len();
        let good = group.n_rows() > 0;
        self.chunk_shapes.push(ChunkShape {
            n_corr: group.n_corrs(),
            n_chan: group.n_chans(),
            n_row: group.n_rows(),
        });
        self.good.push(good);

        let ref_time = self.ref_time;
        let n_ant = self.n_ant;
        for &(axis, column) in load_list {
            // Arenas for the whole load list are created before the pipeline
            // runs.
            if let Some(state) = self.axes.get_mut(&axis) {
                if good {
                    append_axis(&mut state.data, axis, column, group, ref_time, n_ant, chunk)?;
                } else {
                    append_empty(&mut state.data);
                }
            }
        }
        Ok(())
    }
}

/// Keep an arena aligned with the chunk list when a chunk has no data.
fn append_empty(data: &mut AxisData) {
    match data {
        AxisData::ChunkF64(v) => v.push(f64::NAN),
        AxisData::ChunkI32(v) => v.push(-1),
        AxisData::VecI32(v) => v.push(vec![]),
        AxisData::VecU64(v) => v.push(vec![]),
        AxisData::VecF64(v) => v.push(vec![]),
        AxisData::VecBool(v) => v.push(vec![]),
        AxisData::MatF32(v) => v.push(Array2::zeros((0, 0))),
        AxisData::MatF64(v) => v.push(Array2::zeros((0, 0))),
        AxisData::CubeF32(v) => v.push(Array3::zeros((0, 0, 0))),
        AxisData::CubeBool(v) => v.push(Array3::from_elem((0, 0, 0), false)),
    }
}

/// The visibility cube behind a column, with `Residual` derived.
fn vis_cube(
    group: &RecordGroup,
    column: DataColumn,
    chunk: usize,
) -> Result<Array3<Complex<f32>>, CacheError> {
    let missing = |name: &str| {
        CacheError::Stream(StreamError::MissingColumn {
            group: chunk,
            column: name.to_string(),
        })
    };
    match column {
        DataColumn::Residual => {
            let corrected = group.corrected.as_ref().ok_or_else(|| missing("corrected"))?;
            let model = group.model.as_ref().ok_or_else(|| missing("model"))?;
            Ok(corrected - model)
        }
        _ => group
            .column(column)
            .cloned()
            .ok_or_else(|| missing(&column.to_string().to_lowercase())),
    }
}

/// Extract one axis's values from a prepared group into its arena.
fn append_axis(
    data: &mut AxisData,
    axis: Axis,
    column: DataColumn,
    group: &RecordGroup,
    ref_time: Epoch,
    n_ant: usize,
    chunk: usize,
) -> Result<(), CacheError> {
    use Axis::*;

    let uvdist = |ir: usize| group.uvw[(0, ir)].hypot(group.uvw[(1, ir)]);

    match (axis, data) {
        (Time, AxisData::ChunkF64(v)) => v.push((group.time - ref_time).to_seconds()),
        (TimeInterval, AxisData::ChunkF64(v)) => v.push(group.interval.to_seconds()),
        (Scan, AxisData::ChunkI32(v)) => v.push(group.scan),
        (Field, AxisData::ChunkI32(v)) => v.push(group.field),
        (Spw, AxisData::ChunkI32(v)) => v.push(group.spw),
        (Channel, AxisData::VecI32(v)) => v.push(group.channels.clone()),
        (Frequency, AxisData::VecF64(v)) => {
            v.push(group.freqs.iter().map(|f| f / 1e9).collect())
        }
        (Corr, AxisData::VecI32(v)) => v.push(group.corr_types.clone()),
        (Row, AxisData::VecU64(v)) => v.push(group.row_ids.clone()),
        (Antenna1, AxisData::VecI32(v)) => v.push(group.antenna1.clone()),
        (Antenna2, AxisData::VecI32(v)) => v.push(group.antenna2.clone()),
        (Baseline, AxisData::VecI32(v)) => v.push(
            group
                .antenna1
                .iter()
                .zip(&group.antenna2)
                .map(|(&a1, &a2)| baseline_index(n_ant, a1, a2))
                .collect(),
        ),
        (Antenna, AxisData::VecI32(v)) => v.push((0..n_ant as i32).collect()),
        (Uvdist, AxisData::VecF64(v)) => v.push((0..group.n_rows()).map(uvdist).collect()),
        (U, AxisData::VecF64(v)) => v.push(group.uvw.row(0).to_vec()),
        (V, AxisData::VecF64(v)) => v.push(group.uvw.row(1).to_vec()),
        (W, AxisData::VecF64(v)) => v.push(group.uvw.row(2).to_vec()),
        (FlagRow, AxisData::VecBool(v)) => v.push(group.flag_row.clone()),
        (Wt, AxisData::MatF32(v)) => v.push(group.weights.clone()),
        (UvdistL, AxisData::MatF64(v)) => {
            let (nchan, nrow) = (group.n_chans(), group.n_rows());
            let mut m = Array2::zeros((nchan, nrow));
            for ir in 0..nrow {
                let d = uvdist(ir);
                for ch in 0..nchan {
                    m[(ch, ir)] = d * group.freqs[ch] / SPEED_OF_LIGHT;
                }
            }
            v.push(m);
        }
        (Amp, AxisData::CubeF32(v)) => v.push(vis_cube(group, column, chunk)?.mapv(|c| c.norm())),
        (Phase, AxisData::CubeF32(v)) => {
            v.push(vis_cube(group, column, chunk)?.mapv(|c| c.arg().to_degrees()))
        }
        (Real, AxisData::CubeF32(v)) => v.push(vis_cube(group, column, chunk)?.mapv(|c| c.re)),
        (Imag, AxisData::CubeF32(v)) => v.push(vis_cube(group, column, chunk)?.mapv(|c| c.im)),
        (Flag, AxisData::CubeBool(v)) => v.push(group.flags.clone()),
        (axis, _) => return Err(CacheError::UnsupportedAxis(axis)),
    }
    Ok(())
}
