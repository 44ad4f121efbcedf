// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Chunk counting: one pass over the stream before any data is read, fixing
//! how many cache chunks the load will produce and feeding the volume meter.

use hifitime::Epoch;
use log::debug;

use crate::averaging::Averaging;
use crate::stream::{RecordStream, StreamError};
use crate::volume::VolumeMeter;

/// What a counting pass found.
#[derive(Debug, Clone)]
pub(crate) struct ChunkCount {
    pub(crate) n_chunks: usize,
    /// How many raw record groups each chunk merges, in chunk order. The
    /// flag writer walks the stream in lock-step with this.
    pub(crate) groups_per_chunk: Vec<usize>,
    /// Midnight (UTC) before the first timestamp. Cached time values are
    /// seconds past this.
    pub(crate) ref_time: Epoch,
}

fn midnight_before(t: Epoch) -> Epoch {
    Epoch::from_mjd_utc(t.to_mjd_utc_days().floor())
}

/// One chunk per raw group.
pub(crate) fn count_simple(
    stream: &mut dyn RecordStream,
    meter: &mut VolumeMeter,
) -> Result<ChunkCount, StreamError> {
    stream.reset()?;
    let mut count = ChunkCount {
        n_chunks: 0,
        groups_per_chunk: vec![],
        ref_time: Epoch::from_mjd_utc(0.0),
    };
    while stream.more() {
        let g = stream.current()?;
        if count.n_chunks == 0 {
            count.ref_time = midnight_before(g.time);
        }
        meter.add(g.spw, g.n_rows());
        count.n_chunks += 1;
        count.groups_per_chunk.push(1);
        stream.advance()?;
    }
    debug!("counted {} chunks (no averaging)", count.n_chunks);
    Ok(count)
}

/// One chunk per averaging interval. A chunk closes when the elapsed time
/// since its first group exceeds the interval, when time steps backwards,
/// or when a scan/field/spw boundary is crossed with the corresponding
/// combine flag off.
pub(crate) fn count_averaging(
    stream: &mut dyn RecordStream,
    averaging: &Averaging,
    meter: &mut VolumeMeter,
) -> Result<ChunkCount, StreamError> {
    stream.reset()?;
    let mut count = ChunkCount {
        n_chunks: 0,
        groups_per_chunk: vec![],
        ref_time: Epoch::from_mjd_utc(0.0),
    };

    let interval_s = averaging.effective_interval().to_seconds();
    let mut ave_start = Epoch::from_mjd_utc(0.0);
    let mut last_time = Epoch::from_mjd_utc(0.0);
    let mut last_scan = 0;
    let mut last_field = 0;
    let mut last_spw = 0;

    // Open chunk state.
    let mut chunk_spw = 0;
    let mut chunk_groups = 0usize;
    let mut chunk_max_rows = 0usize;

    while stream.more() {
        let g = stream.current()?;
        let first = count.groups_per_chunk.is_empty() && chunk_groups == 0;
        if first {
            count.ref_time = midnight_before(g.time);
        }

        let boundary = first
            || (g.time - ave_start).to_seconds() > interval_s
            || g.time < last_time
            || (g.scan != last_scan && !averaging.combine_scan)
            || (g.spw != last_spw && !averaging.combine_spw)
            || (g.field != last_field && !averaging.combine_field);

        if boundary {
            if chunk_groups > 0 {
                meter.add(chunk_spw, chunk_max_rows);
                count.n_chunks += 1;
                count.groups_per_chunk.push(chunk_groups);
            }
            ave_start = g.time;
            chunk_spw = g.spw;
            chunk_groups = 0;
            chunk_max_rows = 0;
        }

        chunk_groups += 1;
        chunk_max_rows = chunk_max_rows.max(g.n_rows());
        last_time = g.time;
        last_scan = g.scan;
        last_field = g.field;
        last_spw = g.spw;
        stream.advance()?;
    }
    if chunk_groups > 0 {
        meter.add(chunk_spw, chunk_max_rows);
        count.n_chunks += 1;
        count.groups_per_chunk.push(chunk_groups);
    }

    debug!(
        "counted {} averaged chunks from {} groups",
        count.n_chunks,
        count.groups_per_chunk.iter().sum::<usize>()
    );
    Ok(count)
}
