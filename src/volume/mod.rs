// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Pre-load memory accounting.

Before any bulk data is read, a [`VolumeMeter`] is fed the chunk shapes the
chunk counter found, then asked whether the requested axes (plus the plot
mask) fit in the caller's [`MemoryBudget`]. Loading never starts on an
estimate that does not fit.
 */

mod error;
#[cfg(test)]
mod tests;

pub use error::VolumeError;

use std::fmt;

use indexmap::IndexMap;
use indicatif::HumanBytes;
use log::debug;

use crate::averaging::Averaging;
use crate::axis::{Axis, AxisMask};
use crate::stream::RecordStream;

/// How much memory the cache may use. There is no host probing here; the
/// embedding application decides what to offer.
#[derive(Debug, Clone, Copy)]
pub struct MemoryBudget {
    /// The cap the user configured.
    pub total_bytes: u64,
    /// Memory currently free on the host, if the caller knows it.
    pub free_bytes: u64,
    /// Trust `total_bytes` even when `free_bytes` is lower.
    pub ignore_free: bool,
}

impl MemoryBudget {
    pub fn available(&self) -> u64 {
        if self.ignore_free {
            self.total_bytes
        } else {
            self.total_bytes.min(self.free_bytes)
        }
    }
}

/// The outcome of a volume estimate.
#[derive(Debug, Clone, Copy)]
pub struct VolumeEstimate {
    pub required_bytes: u64,
    pub available_bytes: u64,
}

impl VolumeEstimate {
    pub fn fits(&self) -> bool {
        self.required_bytes <= self.available_bytes
    }
}

impl fmt::Display for VolumeEstimate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} required, {} available",
            HumanBytes(self.required_bytes),
            HumanBytes(self.available_bytes)
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SpwShape {
    n_chunks: u64,
    n_rows: u64,
    n_chans: u64,
    n_corrs: u64,
}

/// Accumulates per-spectral-window chunk shapes and prices axes against
/// them. Channel and correlation counts are fixed at construction (after
/// selection and channel averaging); chunk and row counts arrive via
/// [`VolumeMeter::add`] as the chunk counter walks the stream.
#[derive(Debug)]
pub struct VolumeMeter {
    spws: IndexMap<i32, SpwShape>,
    n_ant: u64,
}

impl VolumeMeter {
    pub fn new(stream: &dyn RecordStream, averaging: &Averaging) -> VolumeMeter {
        let factor = averaging.channel_factor() as u64;
        let spws = (0..stream.n_spws())
            .map(|spw| {
                let n_chans = stream.n_channels(spw) as u64;
                (
                    spw as i32,
                    SpwShape {
                        n_chunks: 0,
                        n_rows: 0,
                        n_chans: n_chans.div_ceil(factor),
                        n_corrs: stream.n_correlations(spw) as u64,
                    },
                )
            })
            .collect();
        VolumeMeter {
            spws,
            n_ant: stream.n_antennas() as u64,
        }
    }

    /// Record one counted chunk: `n_rows` is the (upper-bound) row count of
    /// the chunk after any averaging.
    pub fn add(&mut self, spw: i32, n_rows: usize) {
        let shape = self.spws.entry(spw).or_default();
        shape.n_chunks += 1;
        shape.n_rows += n_rows as u64;
    }

    /// Bytes needed for one array with the given shape mask and element
    /// size, summed over spectral windows.
    fn masked_bytes(&self, mask: AxisMask, elem_bytes: u64) -> u64 {
        self.spws
            .values()
            .map(|s| {
                let units = if mask.row { s.n_rows } else { s.n_chunks };
                let chans = if mask.chan { s.n_chans } else { 1 };
                let corrs = if mask.corr { s.n_corrs } else { 1 };
                let ants = if mask.ant { self.n_ant } else { 1 };
                units * chans * corrs * ants * elem_bytes
            })
            .sum()
    }

    /// Price the given axes plus the plot mask (one byte per point of the
    /// combined mask shape). Errors when the estimate exceeds the budget.
    pub fn estimate(
        &self,
        axes: &[Axis],
        net_mask: AxisMask,
        budget: MemoryBudget,
    ) -> Result<VolumeEstimate, VolumeError> {
        let mut seen: Vec<Axis> = vec![];
        let mut required = 0u64;
        for &axis in axes {
            if seen.contains(&axis) {
                continue;
            }
            seen.push(axis);
            required += self.masked_bytes(axis.mask(), axis.elem_bytes());
        }
        required += self.masked_bytes(net_mask, 1);

        let estimate = VolumeEstimate {
            required_bytes: required,
            available_bytes: budget.available(),
        };
        debug!("cache volume estimate: {estimate}");
        if estimate.fits() {
            Ok(estimate)
        } else {
            Err(VolumeError::InsufficientMemory { estimate })
        }
    }
}
