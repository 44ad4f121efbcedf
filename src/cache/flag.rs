// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Flag write-back: turning on-screen selections into edits of the cached
//! flag cubes and of the underlying store.

use log::{debug, info};
use vec1::Vec1;

use super::{AxisData, CacheError, PlotRegion, VisCache};
use crate::averaging::chan_ave_bounds;
use crate::axis::Axis;
use crate::stream::WritableRecordStream;

/// How far one selected point's flag edit extends.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlagPolicy {
    /// Flag every correlation, not just the selected one.
    pub all_correlations: bool,
    /// Flag every channel, not just the selected one.
    pub all_channels: bool,
    /// Flag every baseline, not just the selected one.
    pub across_baselines: bool,
}

/// One resolved edit. `corr`/`chan` of `None` mean the whole dimension;
/// `a1 < 0` means every row, `a2 < 0` any row touching `a1`. `rows` caches
/// the matching row indices of the edit's own chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FlagPick {
    chunk: usize,
    corr: Option<usize>,
    chan: Option<usize>,
    rows: Option<Vec<usize>>,
    a1: i32,
    a2: i32,
}

impl VisCache {
    /// Flag (or unflag) every point inside `regions`, extend per `policy`,
    /// and write the edits through `stream`. Returns the number of selected
    /// points. The stream's lock is released on every exit path.
    pub fn flag_range(
        &mut self,
        regions: &Vec1<PlotRegion>,
        policy: FlagPolicy,
        flag: bool,
        stream: &mut dyn WritableRecordStream,
    ) -> Result<usize, CacheError> {
        let (x_axis, y_axis) = match self.current_axes() {
            Ok(axes) => axes,
            Err(e) => {
                stream.release();
                return Err(e);
            }
        };
        let net = self.net_mask;

        // Flagging targets visible (unflagged) points; unflagging targets
        // hidden (flagged) ones.
        let mut picks: Vec<FlagPick> = vec![];
        let mut n_points = 0usize;
        for chunk in 0..self.chunk_shapes.len() {
            for rel in 0..self.chunk_points(chunk) {
                let (ic, ichan, ir, ia) = self.decompose(chunk, rel);
                if self.mask_at(chunk, ic, ichan, ir, ia) != flag {
                    continue;
                }
                let x = self.axis_value(x_axis.axis, chunk, ic, ichan, ir, ia);
                let y = self.axis_value(y_axis.axis, chunk, ic, ichan, ir, ia);
                if !regions.iter().any(|r| r.contains(x, y)) {
                    continue;
                }
                n_points += 1;

                let corr = (net.corr && !policy.all_correlations).then_some(ic);
                let chan = (net.chan && !policy.all_channels).then_some(ichan);
                let (a1, a2) = if net.row && !policy.across_baselines {
                    (
                        self.i32_at(Axis::Antenna1, chunk, ir),
                        self.i32_at(Axis::Antenna2, chunk, ir),
                    )
                } else if net.ant && !net.row && !policy.across_baselines {
                    (ia as i32, -1)
                } else {
                    (-1, -1)
                };
                let rows = (a1 >= 0).then(|| {
                    (0..self.chunk_shapes[chunk].n_row)
                        .filter(|&r| {
                            let r1 = self.i32_at(Axis::Antenna1, chunk, r);
                            let r2 = self.i32_at(Axis::Antenna2, chunk, r);
                            if a2 >= 0 {
                                r1 == a1 && r2 == a2
                            } else {
                                r1 == a1 || r2 == a1
                            }
                        })
                        .collect()
                });
                picks.push(FlagPick {
                    chunk,
                    corr,
                    chan,
                    rows,
                    a1,
                    a2,
                });
            }
        }
        if picks.is_empty() {
            stream.release();
            return Ok(0);
        }
        picks.dedup();

        // Edit the cached flag cubes first so the plot reflects the change
        // whether or not the write-back below gets anywhere.
        if let Some(AxisData::CubeBool(cubes)) = self.axes.get_mut(&Axis::Flag).map(|l| &mut l.data)
        {
            for p in &picks {
                let cube = &mut cubes[p.chunk];
                let (nc, nn, nr) = cube.dim();
                for ic in p.corr.map_or(0..nc, |c| c..c + 1) {
                    for ch in p.chan.map_or(0..nn, |c| c..c + 1) {
                        match &p.rows {
                            Some(rows) => {
                                for &r in rows {
                                    cube[(ic, ch, r)] = flag;
                                }
                            }
                            None => {
                                for r in 0..nr {
                                    cube[(ic, ch, r)] = flag;
                                }
                            }
                        }
                    }
                }
            }
        }
        self.rebuild_plot_mask();

        debug!(
            "writing {} flag edit(s) from {} selected point(s)",
            picks.len(),
            n_points
        );
        let result = self.write_picks(&picks, policy, flag, stream);
        let restored = self.restore_selection(stream);
        stream.release();
        result?;
        restored?;
        info!(
            "{} {} point(s)",
            if flag { "flagged" } else { "unflagged" },
            n_points
        );
        Ok(n_points)
    }

    /// Walk the stream in lock-step with the per-chunk merge counts and
    /// rewrite the flag cube of every raw group behind an edited chunk.
    fn write_picks(
        &self,
        picks: &[FlagPick],
        policy: FlagPolicy,
        flag: bool,
        stream: &mut dyn WritableRecordStream,
    ) -> Result<(), CacheError> {
        let net = self.net_mask;

        // Narrow the stream only along dimensions whose edits are exact;
        // extended dimensions must cover the unselected parts too.
        if net.chan && !policy.all_channels {
            if let Some(ranges) = &self.selection.channels {
                stream.select_channels(ranges)?;
            }
        } else {
            stream.select_channels(&[])?;
        }
        if net.corr && !policy.all_correlations {
            if let Some(corrs) = &self.selection.correlations {
                stream.select_correlations(corrs)?;
            }
        } else {
            stream.select_correlations(&[])?;
        }
        stream.reset()?;

        let factor = self.averaging.channel_factor();
        let mut next = 0usize;
        for (chunk, &n_groups) in self.groups_per_chunk.iter().enumerate() {
            let start = next;
            while next < picks.len() && picks[next].chunk == chunk {
                next += 1;
            }
            let chunk_picks = &picks[start..next];
            if chunk_picks.is_empty() {
                if next >= picks.len() {
                    // Everything pending is behind us.
                    break;
                }
                for _ in 0..n_groups {
                    stream.advance()?;
                }
                continue;
            }

            for _ in 0..n_groups {
                let group = stream.current()?;
                let mut flags = group.flags.clone();
                let antenna1 = group.antenna1.clone();
                let antenna2 = group.antenna2.clone();
                let (nc, nn, nr) = flags.dim();
                if nn == 0 {
                    stream.advance()?;
                    continue;
                }
                // Cached channel index → raw channel positions.
                let bounds = chan_ave_bounds(nn, factor);

                for p in chunk_picks {
                    let (ch_lo, ch_hi) = match p.chan {
                        None => (0, nn - 1),
                        Some(c) => bounds.get(c).copied().unwrap_or((0, nn - 1)),
                    };
                    let row_ok = |r: usize| {
                        if p.a1 < 0 {
                            true
                        } else if p.a2 >= 0 {
                            antenna1[r] == p.a1 && antenna2[r] == p.a2
                        } else {
                            antenna1[r] == p.a1 || antenna2[r] == p.a1
                        }
                    };
                    for ic in p.corr.map_or(0..nc, |c| c..(c + 1).min(nc)) {
                        for ch in ch_lo..=ch_hi {
                            for r in 0..nr {
                                if row_ok(r) {
                                    flags[(ic, ch, r)] = flag;
                                }
                            }
                        }
                    }
                }
                stream.write_flags(flags.view())?;
                stream.advance()?;
            }
        }
        Ok(())
    }

    /// Put the stream's channel/correlation sub-selection back the way the
    /// cache's own configuration has it, undoing any widening the write-back
    /// walk applied.
    fn restore_selection(
        &self,
        stream: &mut dyn WritableRecordStream,
    ) -> Result<(), CacheError> {
        stream.select_channels(self.selection.channels.as_deref().unwrap_or(&[]))?;
        stream.select_correlations(self.selection.correlations.as_deref().unwrap_or(&[]))?;
        Ok(())
    }
}
