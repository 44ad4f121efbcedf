// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
The record-group data model and the stream traits the cache consumes.

A [`RecordGroup`] is one atomic unit from the raw data source: all rows
sharing a timestamp and spectral setup. The cache only ever walks a stream
forwards, but may [`RecordStream::reset`] it to walk again (the chunk
counters and the load pipelines each make one pass).
 */

mod error;
mod memory;

pub use error::StreamError;
pub use memory::MemoryStream;

use hifitime::{Duration, Epoch};
use ndarray::prelude::*;
use num_complex::Complex;

use crate::axis::DataColumn;

/// One atomic unit from the raw data stream. Cube shapes are
/// `(ncorr, nchan, nrow)`; the UVW matrix is `(3, nrow)`; the weight matrix
/// is `(ncorr, nrow)`.
#[derive(Debug, Clone)]
pub struct RecordGroup {
    pub time: Epoch,
    pub interval: Duration,
    pub scan: i32,
    pub field: i32,
    pub spw: i32,

    pub antenna1: Vec<i32>,
    pub antenna2: Vec<i32>,
    pub uvw: Array2<f64>,

    /// Channel numbers (post-selection; not necessarily starting at 0).
    pub channels: Vec<i32>,
    /// Sky frequencies \[Hz\], parallel to `channels`.
    pub freqs: Vec<f64>,
    /// Correlation-type codes (e.g. Stokes enums), one per correlation.
    pub corr_types: Vec<i32>,
    /// Underlying storage row ids, for the `Row` axis.
    pub row_ids: Vec<u64>,

    pub flags: Array3<bool>,
    pub flag_row: Vec<bool>,
    pub weights: Array2<f32>,

    pub data: Option<Array3<Complex<f32>>>,
    pub model: Option<Array3<Complex<f32>>>,
    pub corrected: Option<Array3<Complex<f32>>>,
}

impl RecordGroup {
    pub fn n_corrs(&self) -> usize {
        self.corr_types.len()
    }

    pub fn n_chans(&self) -> usize {
        self.channels.len()
    }

    pub fn n_rows(&self) -> usize {
        self.antenna1.len()
    }

    /// The visibility cube backing `column`, if the source provided it.
    /// `Residual` is not a stored column; callers combine `Corrected` and
    /// `Model` themselves.
    pub fn column(&self, column: DataColumn) -> Option<&Array3<Complex<f32>>> {
        match column {
            DataColumn::Data => self.data.as_ref(),
            DataColumn::Model => self.model.as_ref(),
            DataColumn::Corrected => self.corrected.as_ref(),
            DataColumn::Residual => None,
        }
    }
}

/// Read side of the data source: an ordered, re-iterable stream of record
/// groups plus the observation-level metadata the volume estimator needs.
pub trait RecordStream {
    /// Go back to the first group.
    fn reset(&mut self) -> Result<(), StreamError>;

    /// Is there a group under the cursor?
    fn more(&self) -> bool;

    /// Step to the next group.
    fn advance(&mut self) -> Result<(), StreamError>;

    /// The group under the cursor.
    fn current(&self) -> Result<&RecordGroup, StreamError>;

    fn n_antennas(&self) -> usize;

    /// Number of distinct spectral windows in the selected data.
    fn n_spws(&self) -> usize;

    /// Channel count for a spectral window, after selection but before any
    /// channel averaging.
    fn n_channels(&self, spw: usize) -> usize;

    /// Correlation count for a spectral window, after selection.
    fn n_correlations(&self, spw: usize) -> usize;

    /// Restrict subsequent groups to these inclusive channel-index ranges.
    /// An empty slice clears any channel sub-selection.
    fn select_channels(&mut self, ranges: &[(usize, usize)]) -> Result<(), StreamError>;

    /// Restrict subsequent groups to these correlation indices. An empty
    /// slice clears any correlation sub-selection.
    fn select_correlations(&mut self, corrs: &[usize]) -> Result<(), StreamError>;
}

/// A stream that can also write flags back for the group under the cursor.
/// The writer holds an exclusive lock for the duration of a flag write-back;
/// [`WritableRecordStream::release`] must be called on every exit path.
pub trait WritableRecordStream: RecordStream {
    /// Replace the current group's flag cube in the underlying store. The
    /// cube shape must match the current group's.
    fn write_flags(&mut self, flags: ArrayView3<bool>) -> Result<(), StreamError>;

    /// Close any underlying lock.
    fn release(&mut self);
}
