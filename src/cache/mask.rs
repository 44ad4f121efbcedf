// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Per-chunk plot masks: which cached points are unflagged under the
//! current net axis mask.

use ndarray::prelude::*;

use super::{AxisData, VisCache};
use crate::axis::{Axis, AxisMask};

impl VisCache {
    /// Rebuild every chunk's plot mask from its cached flag cube. Called
    /// after every load, after flag edits, and when the net mask changes.
    pub(super) fn rebuild_plot_mask(&mut self) {
        let net = self.net_mask;
        let n_ant = self.n_ant;
        let flag_cubes = match self.axes.get(&Axis::Flag).map(|l| &l.data) {
            Some(AxisData::CubeBool(v)) => v,
            _ => {
                self.plot_mask.clear();
                return;
            }
        };
        self.plot_mask = flag_cubes
            .iter()
            .zip(&self.good)
            .map(|(flags, &good)| {
                if good {
                    collapse_flags(flags, net, n_ant)
                } else {
                    Array3::from_elem((0, 0, 0), false)
                }
            })
            .collect();
    }
}

/// Collapse a flag cube to the net mask's shape. Spanned dimensions keep
/// their sizes; unspanned dimensions reduce to 1 with an any-unflagged
/// test. A mask spanning antenna but not row is synthesized all-true, since
/// flags are stored per baseline, not per antenna.
fn collapse_flags(flags: &Array3<bool>, net: AxisMask, n_ant: usize) -> Array3<bool> {
    let (nc, nn, nr) = flags.dim();
    let oc = if net.corr { nc } else { 1 };
    let on = if net.chan { nn } else { 1 };
    if net.ant && !net.row {
        return Array3::from_elem((oc, on, n_ant), true);
    }
    let or = if net.row { nr } else { 1 };

    let mut out = Array3::from_elem((oc, on, or), false);
    for i in 0..oc {
        let cr = if net.corr { i..i + 1 } else { 0..nc };
        for j in 0..on {
            let nnr = if net.chan { j..j + 1 } else { 0..nn };
            for k in 0..or {
                let rr = if net.row { k..k + 1 } else { 0..nr };
                out[(i, j, k)] = cr.clone().any(|ci| {
                    nnr.clone()
                        .any(|cj| rr.clone().any(|ck| !flags[(ci, cj, ck)]))
                });
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapse_keeps_spanned_dims() {
        let flags = Array3::from_elem((2, 4, 3), false);
        let net = AxisMask {
            corr: true,
            chan: true,
            row: true,
            ant: false,
        };
        assert_eq!(collapse_flags(&flags, net, 5).dim(), (2, 4, 3));
    }

    #[test]
    fn collapsed_dim_is_any_unflagged() {
        // Fully flagged except one correlation of one cell.
        let mut flags = Array3::from_elem((2, 4, 3), true);
        flags[(1, 2, 0)] = false;
        let net = AxisMask {
            corr: false,
            chan: true,
            row: true,
            ant: false,
        };
        let mask = collapse_flags(&flags, net, 5);
        assert_eq!(mask.dim(), (1, 4, 3));
        assert!(mask[(0, 2, 0)]);
        assert!(!mask[(0, 2, 1)]);
        assert!(!mask[(0, 1, 0)]);
    }

    #[test]
    fn antenna_without_row_is_all_true() {
        let flags = Array3::from_elem((2, 4, 3), true);
        let net = AxisMask {
            corr: false,
            chan: false,
            row: false,
            ant: true,
        };
        let mask = collapse_flags(&flags, net, 5);
        assert_eq!(mask.dim(), (1, 1, 5));
        assert!(mask.iter().all(|&m| m));
    }
}
