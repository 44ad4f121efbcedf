// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! An in-memory record stream. This is the stand-in for the file-backed
//! source the interactive tool uses; tests and demos drive the whole
//! cache/flag pipeline through it.

use ndarray::prelude::*;

use super::{RecordGroup, RecordStream, StreamError, WritableRecordStream};
use crate::selection::Selection;

/// One selected group: the sub-selected copy handed to readers, plus enough
/// bookkeeping to scatter flag writes back to the full-resolution original.
#[derive(Debug, Clone)]
struct ViewGroup {
    orig: usize,
    group: RecordGroup,
    chan_pos: Vec<usize>,
    corr_pos: Vec<usize>,
}

#[derive(Debug)]
pub struct MemoryStream {
    groups: Vec<RecordGroup>,
    n_antennas: usize,
    selection: Selection,
    chan_ranges: Option<Vec<(usize, usize)>>,
    corr_sel: Option<Vec<usize>>,
    view: Vec<ViewGroup>,
    cursor: usize,
    locked: bool,
}

impl MemoryStream {
    /// Open a stream over `groups`, keeping only those passing the row-level
    /// parts of `selection`. Channel/correlation parts of the selection are
    /// applied immediately too; `select_channels`/`select_correlations` can
    /// revise them later (the flag writer does this).
    pub fn open(groups: Vec<RecordGroup>, n_antennas: usize, selection: &Selection) -> MemoryStream {
        let mut stream = MemoryStream {
            groups,
            n_antennas,
            selection: selection.clone(),
            chan_ranges: selection.channels.clone(),
            corr_sel: selection.correlations.clone(),
            view: vec![],
            cursor: 0,
            locked: true,
        };
        stream.rebuild_view();
        stream
    }

    /// The full-resolution groups, in original order. Tests use this to
    /// check flag round-trips.
    pub fn groups(&self) -> &[RecordGroup] {
        &self.groups
    }

    /// Has the exclusive lock been released?
    pub fn is_released(&self) -> bool {
        !self.locked
    }

    fn rebuild_view(&mut self) {
        self.view = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| self.selection.matches(g.scan, g.field, g.spw))
            .map(|(orig, g)| {
                let chan_pos: Vec<usize> = match &self.chan_ranges {
                    None => (0..g.n_chans()).collect(),
                    Some(ranges) => ranges
                        .iter()
                        .flat_map(|&(lo, hi)| lo..=hi.min(g.n_chans().saturating_sub(1)))
                        .filter(|&c| c < g.n_chans())
                        .collect(),
                };
                let corr_pos: Vec<usize> = match &self.corr_sel {
                    None => (0..g.n_corrs()).collect(),
                    Some(corrs) => corrs.iter().copied().filter(|&c| c < g.n_corrs()).collect(),
                };
                ViewGroup {
                    orig,
                    group: subselect(g, &corr_pos, &chan_pos),
                    chan_pos,
                    corr_pos,
                }
            })
            .collect();
        self.cursor = 0;
    }
}

/// Take the (`corr_pos` × `chan_pos` × all-rows) subset of a group.
fn subselect(g: &RecordGroup, corr_pos: &[usize], chan_pos: &[usize]) -> RecordGroup {
    let pick_cube = |cube: &Array3<bool>| -> Array3<bool> {
        let picked = cube.select(Axis(0), corr_pos);
        picked.select(Axis(1), chan_pos)
    };
    let pick_vis = |cube: &Option<Array3<num_complex::Complex<f32>>>| {
        cube.as_ref()
            .map(|c| c.select(Axis(0), corr_pos).select(Axis(1), chan_pos))
    };

    RecordGroup {
        time: g.time,
        interval: g.interval,
        scan: g.scan,
        field: g.field,
        spw: g.spw,
        antenna1: g.antenna1.clone(),
        antenna2: g.antenna2.clone(),
        uvw: g.uvw.clone(),
        channels: chan_pos.iter().map(|&c| g.channels[c]).collect(),
        freqs: chan_pos.iter().map(|&c| g.freqs[c]).collect(),
        corr_types: corr_pos.iter().map(|&c| g.corr_types[c]).collect(),
        row_ids: g.row_ids.clone(),
        flags: pick_cube(&g.flags),
        flag_row: g.flag_row.clone(),
        weights: g.weights.select(Axis(0), corr_pos),
        data: pick_vis(&g.data),
        model: pick_vis(&g.model),
        corrected: pick_vis(&g.corrected),
    }
}

impl RecordStream for MemoryStream {
    fn reset(&mut self) -> Result<(), StreamError> {
        self.cursor = 0;
        Ok(())
    }

    fn more(&self) -> bool {
        self.cursor < self.view.len()
    }

    fn advance(&mut self) -> Result<(), StreamError> {
        if self.cursor < self.view.len() {
            self.cursor += 1;
        }
        Ok(())
    }

    fn current(&self) -> Result<&RecordGroup, StreamError> {
        self.view
            .get(self.cursor)
            .map(|v| &v.group)
            .ok_or(StreamError::Exhausted)
    }

    fn n_antennas(&self) -> usize {
        self.n_antennas
    }

    fn n_spws(&self) -> usize {
        self.groups
            .iter()
            .map(|g| g.spw as usize + 1)
            .max()
            .unwrap_or(0)
    }

    fn n_channels(&self, spw: usize) -> usize {
        self.view
            .iter()
            .find(|v| v.group.spw as usize == spw)
            .map_or(0, |v| v.group.n_chans())
    }

    fn n_correlations(&self, spw: usize) -> usize {
        self.view
            .iter()
            .find(|v| v.group.spw as usize == spw)
            .map_or(0, |v| v.group.n_corrs())
    }

    fn select_channels(&mut self, ranges: &[(usize, usize)]) -> Result<(), StreamError> {
        for &(lo, hi) in ranges {
            if lo > hi {
                return Err(StreamError::BadChannelRange { lo, hi, nchan: 0 });
            }
        }
        self.chan_ranges = if ranges.is_empty() {
            None
        } else {
            Some(ranges.to_vec())
        };
        self.rebuild_view();
        Ok(())
    }

    fn select_correlations(&mut self, corrs: &[usize]) -> Result<(), StreamError> {
        self.corr_sel = if corrs.is_empty() {
            None
        } else {
            Some(corrs.to_vec())
        };
        self.rebuild_view();
        Ok(())
    }
}

impl WritableRecordStream for MemoryStream {
    fn write_flags(&mut self, flags: ArrayView3<bool>) -> Result<(), StreamError> {
        let v = self.view.get(self.cursor).ok_or(StreamError::Exhausted)?;
        let expected = v.group.flags.dim();
        if flags.dim() != expected {
            return Err(StreamError::FlagShapeMismatch {
                got: flags.dim(),
                expected,
            });
        }

        // Scatter back to the full-resolution original.
        let orig = v.orig;
        for (vi, &ci) in v.corr_pos.iter().enumerate() {
            for (vj, &cj) in v.chan_pos.iter().enumerate() {
                for row in 0..expected.2 {
                    self.groups[orig].flags[(ci, cj, row)] = flags[(vi, vj, row)];
                }
            }
        }
        // Keep the selected copy coherent for any further reads.
        self.view[self.cursor].group.flags.assign(&flags);
        Ok(())
    }

    fn release(&mut self) {
        self.locked = false;
    }
}
