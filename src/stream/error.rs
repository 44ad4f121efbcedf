// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("The stream cursor is past the last record group")]
    Exhausted,

    #[error("Record group {group} does not carry the {column} column")]
    MissingColumn { group: usize, column: String },

    #[error("Flag cube shape {got:?} does not match the current group's {expected:?}")]
    FlagShapeMismatch {
        got: (usize, usize, usize),
        expected: (usize, usize, usize),
    },

    #[error("Channel range {lo}..={hi} is out of bounds for a {nchan}-channel spectral window")]
    BadChannelRange { lo: usize, hi: usize, nchan: usize },

    #[error("Correlation index {corr} is out of bounds ({ncorr} correlations)")]
    BadCorrelation { corr: usize, ncorr: usize },
}
