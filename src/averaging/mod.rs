// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Averaging configuration, channel-bin averaging, and the record-group
accumulator that the averaging load pipeline drives.
 */


use std::num::NonZeroUsize;

use hifitime::{Duration, Epoch};
use indexmap::IndexMap;
use ndarray::prelude::*;
use num_complex::Complex;

use crate::stream::RecordGroup;

/// How records should be merged before caching.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Averaging {
    /// Solution interval for time averaging. `None` (or zero) disables it.
    pub time: Option<Duration>,

    /// Keep merging across scan boundaries.
    pub combine_scan: bool,
    /// Keep merging across field boundaries.
    pub combine_field: bool,
    /// Keep merging across spectral-window boundaries.
    pub combine_spw: bool,

    /// Collapse all baselines into one output row.
    pub baseline: bool,
    /// Collapse baselines onto their first antenna.
    pub antenna: bool,

    /// Channel-bin averaging factor. `None` (or 1) disables it.
    pub channel: Option<NonZeroUsize>,

    /// Average amplitudes rather than complex values.
    pub scalar: bool,
}

impl Averaging {
    /// Is any form of averaging active at all?
    pub fn any(&self) -> bool {
        self.cross_record() || self.channel_factor() > 1
    }

    /// Does this config merge multiple raw groups into one chunk? This is
    /// what selects the averaging chunk counter and load pipeline.
    pub fn cross_record(&self) -> bool {
        self.time.is_some_and(|t| t > Duration::ZERO)
            || self.baseline
            || self.antenna
            || self.combine_spw
    }

    pub fn channel_factor(&self) -> usize {
        self.channel.map_or(1, NonZeroUsize::get)
    }

    /// The interval used for chunk-boundary decisions. Combining fields
    /// and/or spws forces it to zero so that only coincident timestamps
    /// merge.
    pub(crate) fn effective_interval(&self) -> Duration {
        if self.combine_spw || self.combine_field {
            Duration::ZERO
        } else {
            self.time.unwrap_or(Duration::ZERO)
        }
    }
}

/// Inclusive input-channel position bounds for each averaged output channel.
pub(crate) fn chan_ave_bounds(n_chan: usize, factor: usize) -> Vec<(usize, usize)> {
    if factor <= 1 || n_chan == 0 {
        return (0..n_chan).map(|c| (c, c)).collect();
    }
    (0..n_chan)
        .step_by(factor)
        .map(|lo| (lo, (lo + factor - 1).min(n_chan - 1)))
        .collect()
}

/// Average a group's channel axis down by `factor`. Each output channel is
/// the mean of the unflagged inputs in its bin; a bin with no unflagged
/// inputs takes the plain mean and stays flagged.
pub(crate) fn channel_average(group: &RecordGroup, factor: usize) -> RecordGroup {
    if factor <= 1 || group.n_chans() == 0 {
        return group.clone();
    }

    let bounds = chan_ave_bounds(group.n_chans(), factor);
    let (ncorr, _, nrow) = group.flags.dim();
    let nout = bounds.len();

    let mut channels = Vec::with_capacity(nout);
    let mut freqs = Vec::with_capacity(nout);
    for &(lo, hi) in &bounds {
        let n = (hi - lo + 1) as f64;
        channels.push(
            (group.channels[lo..=hi].iter().map(|&c| i64::from(c)).sum::<i64>() as f64 / n).round()
                as i32,
        );
        freqs.push(group.freqs[lo..=hi].iter().sum::<f64>() / n);
    }

    let mut flags = Array3::from_elem((ncorr, nout, nrow), true);
    for ic in 0..ncorr {
        for (ob, &(lo, hi)) in bounds.iter().enumerate() {
            for ir in 0..nrow {
                if (lo..=hi).any(|ch| !group.flags[(ic, ch, ir)]) {
                    flags[(ic, ob, ir)] = false;
                }
            }
        }
    }

    let ave_cube = |cube: &Array3<Complex<f32>>| -> Array3<Complex<f32>> {
        let mut out = Array3::zeros((ncorr, nout, nrow));
        for ic in 0..ncorr {
            for (ob, &(lo, hi)) in bounds.iter().enumerate() {
                for ir in 0..nrow {
                    let mut sum = Complex::new(0.0f32, 0.0);
                    let mut all = Complex::new(0.0f32, 0.0);
                    let mut n_good = 0u32;
                    for ch in lo..=hi {
                        let v = cube[(ic, ch, ir)];
                        all += v;
                        if !group.flags[(ic, ch, ir)] {
                            sum += v;
                            n_good += 1;
                        }
                    }
                    out[(ic, ob, ir)] = if n_good > 0 {
                        sum / n_good as f32
                    } else {
                        all / (hi - lo + 1) as f32
                    };
                }
            }
        }
        out
    };

    RecordGroup {
        channels,
        freqs,
        flags,
        data: group.data.as_ref().map(&ave_cube),
        model: group.model.as_ref().map(&ave_cube),
        corrected: group.corrected.as_ref().map(&ave_cube),
        ..group.clone()
    }
}

/// Which derived quantities a [`GroupAverager`] accumulates, decided from
/// the axes being loaded.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct AveragerNeeds {
    pub data: bool,
    pub model: bool,
    pub corrected: bool,
    pub uvw: bool,
}

struct ColAccum {
    sum: Array2<Complex<f64>>,
    wt: Array2<f64>,
}

impl ColAccum {
    fn new(ncorr: usize, nchan: usize) -> ColAccum {
        ColAccum {
            sum: Array2::zeros((ncorr, nchan)),
            wt: Array2::zeros((ncorr, nchan)),
        }
    }
}

struct RowAccum {
    a1: i32,
    a2: i32,
    row_id: u64,
    flag_row: bool,
    uvw_sum: [f64; 3],
    uvw_n: f64,
    n_unflagged: Array2<u32>,
    weight_sum: Vec<f32>,
    data: Option<ColAccum>,
    model: Option<ColAccum>,
    corrected: Option<ColAccum>,
}

/// Merges N raw record groups into one. The averaging load pipeline
/// constructs a fresh averager per output chunk, feeds it the counted number
/// of groups, then finalizes.
pub(crate) struct GroupAverager {
    baseline_ave: bool,
    antenna_ave: bool,
    scalar: bool,
    needs: AveragerNeeds,
    first: Option<RecordGroup>,
    time_sum: f64,
    interval_sum: f64,
    n_groups: f64,
    rows: IndexMap<(i32, i32), RowAccum>,
}

impl GroupAverager {
    pub(crate) fn new(averaging: &Averaging, needs: AveragerNeeds) -> GroupAverager {
        GroupAverager {
            baseline_ave: averaging.baseline,
            antenna_ave: averaging.antenna,
            scalar: averaging.scalar,
            needs,
            first: None,
            time_sum: 0.0,
            interval_sum: 0.0,
            n_groups: 0.0,
            rows: IndexMap::new(),
        }
    }

    fn row_key(&self, a1: i32, a2: i32) -> (i32, i32) {
        if self.baseline_ave {
            (-1, -1)
        } else if self.antenna_ave {
            (a1, -1)
        } else {
            (a1, a2)
        }
    }

    pub(crate) fn accumulate(&mut self, group: &RecordGroup) {
        let (ncorr, nchan, nrow) = group.flags.dim();

        let anchor = match &self.first {
            Some(g) => g.time,
            None => {
                self.first = Some(group.clone());
                group.time
            }
        };
        self.time_sum += (group.time - anchor).to_seconds();
        self.interval_sum += group.interval.to_seconds();
        self.n_groups += 1.0;

        let scalar = self.scalar;
        let needs = self.needs;
        for ir in 0..nrow {
            let key = self.row_key(group.antenna1[ir], group.antenna2[ir]);
            let acc = self.rows.entry(key).or_insert_with(|| RowAccum {
                a1: key.0,
                a2: key.1,
                row_id: group.row_ids[ir],
                flag_row: true,
                uvw_sum: [0.0; 3],
                uvw_n: 0.0,
                n_unflagged: Array2::zeros((ncorr, nchan)),
                weight_sum: vec![0.0; ncorr],
                data: needs.data.then(|| ColAccum::new(ncorr, nchan)),
                model: needs.model.then(|| ColAccum::new(ncorr, nchan)),
                corrected: needs.corrected.then(|| ColAccum::new(ncorr, nchan)),
            });

            acc.flag_row &= group.flag_row[ir];
            if needs.uvw {
                for k in 0..3 {
                    acc.uvw_sum[k] += group.uvw[(k, ir)];
                }
                acc.uvw_n += 1.0;
            }

            for ic in 0..ncorr {
                acc.weight_sum[ic] += group.weights[(ic, ir)];
                for ch in 0..nchan {
                    if group.flags[(ic, ch, ir)] {
                        continue;
                    }
                    acc.n_unflagged[(ic, ch)] += 1;
                    let wt = f64::from(group.weights[(ic, ir)]).max(f64::MIN_POSITIVE);
                    let add =
                        |col: &mut Option<ColAccum>, cube: &Option<Array3<Complex<f32>>>| {
                            if let (Some(col), Some(cube)) = (col.as_mut(), cube.as_ref()) {
                                let v = cube[(ic, ch, ir)];
                                let v64 = if scalar {
                                    Complex::new(f64::from(v.norm()), 0.0)
                                } else {
                                    Complex::new(f64::from(v.re), f64::from(v.im))
                                };
                                col.sum[(ic, ch)] += v64 * wt;
                                col.wt[(ic, ch)] += wt;
                            }
                        };
                    add(&mut acc.data, &group.data);
                    add(&mut acc.model, &group.model);
                    add(&mut acc.corrected, &group.corrected);
                }
            }
        }
    }

    /// Close out the average. Yields a group with zero rows when nothing was
    /// accumulated.
    pub(crate) fn finalize(self) -> RecordGroup {
        let Some(template) = self.first else {
            return empty_group();
        };
        let ncorr = template.n_corrs();
        let nchan = template.n_chans();
        let nrow = self.rows.len();

        let time = template.time + Duration::from_seconds(self.time_sum / self.n_groups);
        let interval = Duration::from_seconds(self.interval_sum / self.n_groups);

        let mut antenna1 = Vec::with_capacity(nrow);
        let mut antenna2 = Vec::with_capacity(nrow);
        let mut row_ids = Vec::with_capacity(nrow);
        let mut flag_row = Vec::with_capacity(nrow);
        let mut uvw = Array2::zeros((3, nrow));
        let mut flags = Array3::from_elem((ncorr, nchan, nrow), true);
        let mut weights = Array2::zeros((ncorr, nrow));
        let mut data = self.needs.data.then(|| Array3::zeros((ncorr, nchan, nrow)));
        let mut model = self.needs.model.then(|| Array3::zeros((ncorr, nchan, nrow)));
        let mut corrected = self
            .needs
            .corrected
            .then(|| Array3::zeros((ncorr, nchan, nrow)));

        for (ir, acc) in self.rows.values().enumerate() {
            antenna1.push(acc.a1);
            antenna2.push(acc.a2);
            row_ids.push(acc.row_id);
            flag_row.push(acc.flag_row);
            if acc.uvw_n > 0.0 {
                for k in 0..3 {
                    uvw[(k, ir)] = acc.uvw_sum[k] / acc.uvw_n;
                }
            }
            for ic in 0..ncorr {
                weights[(ic, ir)] = acc.weight_sum[ic];
                for ch in 0..nchan {
                    if acc.n_unflagged[(ic, ch)] > 0 {
                        flags[(ic, ch, ir)] = false;
                    }
                    let put =
                        |out: &mut Option<Array3<Complex<f32>>>, col: &Option<ColAccum>| {
                            if let (Some(out), Some(col)) = (out.as_mut(), col.as_ref()) {
                                if col.wt[(ic, ch)] > 0.0 {
                                    let v = col.sum[(ic, ch)] / col.wt[(ic, ch)];
                                    out[(ic, ch, ir)] = Complex::new(v.re as f32, v.im as f32);
                                }
                            }
                        };
                    put(&mut data, &acc.data);
                    put(&mut model, &acc.model);
                    put(&mut corrected, &acc.corrected);
                }
            }
        }

        RecordGroup {
            time,
            interval,
            antenna1,
            antenna2,
            uvw,
            row_ids,
            flag_row,
            flags,
            weights,
            data,
            model,
            corrected,
            ..template
        }
    }
}

fn empty_group() -> RecordGroup {
    RecordGroup {
        time: Epoch::from_mjd_utc(0.0),
        interval: Duration::ZERO,
        scan: -1,
        field: -1,
        spw: -1,
        antenna1: vec![],
        antenna2: vec![],
        uvw: Array2::zeros((3, 0)),
        channels: vec![],
        freqs: vec![],
        corr_types: vec![],
        row_ids: vec![],
        flags: Array3::from_elem((0, 0, 0), false),
        flag_row: vec![],
        weights: Array2::zeros((0, 0)),
        data: None,
        model: None,
        corrected: None,
    }
}
