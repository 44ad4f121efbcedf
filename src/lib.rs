// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Data caching and flag write-back for interactive visualization of
interferometric radio-astronomy observations.

The cache takes a record stream, a selection, an averaging policy and a pair
of plot axes; it checks the memory cost up front, loads only what is not
already cached, and serves plottable points, axis ranges and flag edits back
to the embedding tool.
 */

pub mod averaging;
pub mod axis;
pub mod cache;
mod error;
pub mod progress;
pub mod selection;
pub mod stream;
pub mod volume;

#[cfg(test)]
mod tests;

// Re-exports.
pub use averaging::Averaging;
pub use axis::{Axis, AxisMask, DataColumn};
pub use cache::{
    AxisRanges, CacheError, FlagPolicy, Partition, PlotAxis, PlotRegion, PointMeta, Transforms,
    VisCache,
};
pub use error::Error;
pub use progress::{NoProgress, Progress, ProgressBarHandle};
pub use selection::Selection;
pub use stream::{
    MemoryStream, RecordGroup, RecordStream, StreamError, WritableRecordStream,
};
pub use volume::{MemoryBudget, VolumeError, VolumeEstimate, VolumeMeter};

// External re-exports.
pub use vec1::{vec1, Vec1};
