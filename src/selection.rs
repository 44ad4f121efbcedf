// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Data-selection configuration. The record stream applies this when it is
//! opened; the cache only retains it so that the flag writer can re-derive
//! the channel/correlation sub-selection it needs.

/// Which parts of an observation to iterate over. `None` means "everything".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Scan numbers to keep.
    pub scans: Option<Vec<i32>>,

    /// Field ids to keep.
    pub fields: Option<Vec<i32>>,

    /// Spectral-window ids to keep.
    pub spws: Option<Vec<i32>>,

    /// Inclusive channel-index ranges to keep, applied per spectral window.
    pub channels: Option<Vec<(usize, usize)>>,

    /// Correlation indices to keep.
    pub correlations: Option<Vec<usize>>,
}

impl Selection {
    /// Does a record group with these ids pass the row-level selection?
    pub fn matches(&self, scan: i32, field: i32, spw: i32) -> bool {
        fn ok(sel: &Option<Vec<i32>>, v: i32) -> bool {
            sel.as_ref().map_or(true, |s| s.contains(&v))
        }
        ok(&self.scans, scan) && ok(&self.fields, field) && ok(&self.spws, spw)
    }
}
