// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use crate::axis::Axis;
use crate::stream::StreamError;
use crate::volume::VolumeError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error(transparent)]
    Volume(#[from] VolumeError),

    #[error("Weights cannot be plotted while averaging is enabled")]
    UnsupportedAveragingCombination,

    #[error("Axis {0} cannot be loaded from the record stream")]
    UnsupportedAxis(Axis),

    #[error("Plots cannot be iterated over axis {0}")]
    UnsupportedIteration(Axis),

    #[error("Iterating over axis {0} is not possible while baselines are being averaged away")]
    IterationWithBaselineAveraging(Axis),

    #[error("Point index {index} is out of range ({n_points} cached points)")]
    PointOutOfRange { index: u64, n_points: u64 },

    #[error("The cache holds no plottable data; load a pair of axes first")]
    NotReady,

    #[error(transparent)]
    Stream(#[from] StreamError),
}
