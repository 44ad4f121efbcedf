// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Helpers for internal tests.

use hifitime::{Duration, Epoch};
use ndarray::prelude::*;
use num_complex::Complex;

use crate::stream::RecordGroup;

/// Synthesise a record group `offset_s` seconds after a fixed anchor time,
/// with one row per `(antenna1, antenna2)` pair. Data values are
/// deterministic, everything is unflagged, weights are 1.
pub(crate) fn synth_group(
    offset_s: f64,
    scan: i32,
    field: i32,
    spw: i32,
    ncorr: usize,
    nchan: usize,
    baselines: &[(i32, i32)],
) -> RecordGroup {
    let nrow = baselines.len();

    let mut uvw = Array2::zeros((3, nrow));
    for (ir, &(a1, a2)) in baselines.iter().enumerate() {
        uvw[(0, ir)] = f64::from(a2 - a1) * 100.0;
        uvw[(1, ir)] = f64::from(a1) * 10.0;
        uvw[(2, ir)] = 1.0;
    }

    let mut data = Array3::zeros((ncorr, nchan, nrow));
    for ic in 0..ncorr {
        for ch in 0..nchan {
            for ir in 0..nrow {
                data[(ic, ch, ir)] =
                    Complex::new(1.0 + ic as f32 + ch as f32 * 0.5, ir as f32 * 0.25);
            }
        }
    }

    RecordGroup {
        time: Epoch::from_gpst_seconds(1_090_008_640.0) + Duration::from_seconds(offset_s),
        interval: Duration::from_seconds(2.0),
        scan,
        field,
        spw,
        antenna1: baselines.iter().map(|&(a1, _)| a1).collect(),
        antenna2: baselines.iter().map(|&(_, a2)| a2).collect(),
        uvw,
        channels: (0..nchan as i32).collect(),
        freqs: (0..nchan)
            .map(|ch| 150e6 + spw as f64 * 30.72e6 + ch as f64 * 40e3)
            .collect(),
        corr_types: (9..9 + ncorr as i32).collect(),
        row_ids: (0..nrow as u64).collect(),
        flags: Array3::from_elem((ncorr, nchan, nrow), false),
        flag_row: vec![false; nrow],
        weights: Array2::from_elem((ncorr, nrow), 1.0),
        data: Some(data),
        model: None,
        corrected: None,
    }
}
