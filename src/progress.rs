// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Cooperative progress reporting and cancellation.
//!
//! Load and flag-write operations poll the supplied handle at a coarse
//! interval (every chunk when there are fewer than [`PROGRESS_SEGMENT`]
//! chunks, else every [`PROGRESS_SEGMENT`]th chunk). There are no background
//! tasks; cancellation takes effect at the next poll.

use std::sync::atomic::{AtomicBool, Ordering};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

/// How many chunks between progress polls.
pub(crate) const PROGRESS_SEGMENT: usize = 10;

pub trait Progress {
    /// Has the user asked to stop? Polled between chunks.
    fn is_canceled(&self) -> bool {
        false
    }

    /// Percent complete of the current operation.
    fn set_progress(&self, _percent: u8) {}

    /// Short human-readable description of the current step.
    fn set_status(&self, _status: &str) {}
}

/// A handle that never cancels and reports nowhere.
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {}

/// A terminal progress bar with a cancellation flag the embedding tool can
/// set from its UI thread.
pub struct ProgressBarHandle {
    bar: ProgressBar,
    canceled: AtomicBool,
}

impl ProgressBarHandle {
    pub fn new(visible: bool) -> ProgressBarHandle {
        let bar = ProgressBar::with_draw_target(
            Some(100),
            if visible {
                ProgressDrawTarget::stdout()
            } else {
                ProgressDrawTarget::hidden()
            },
        )
        .with_style(
            ProgressStyle::default_bar()
                .template("{msg:17}: [{wide_bar:.blue}] {pos:3}%")
                .unwrap()
                .progress_chars("=> "),
        );
        ProgressBarHandle {
            bar,
            canceled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Relaxed);
    }
}

impl Progress for ProgressBarHandle {
    fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Relaxed)
    }

    fn set_progress(&self, percent: u8) {
        self.bar.set_position(u64::from(percent.min(100)));
    }

    fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }
}
