// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

use super::VolumeEstimate;

#[derive(Error, Debug)]
pub enum VolumeError {
    #[error("Insufficient memory to load the requested data: {estimate}. Reduce the selection, average more heavily, or raise the memory cap.")]
    InsufficientMemory { estimate: VolumeEstimate },
}
