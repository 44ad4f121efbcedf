// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! End-to-end tests: load a synthetic stream, plot, flag, and check the
//! edits that land back in the store.

use std::num::NonZeroUsize;

use hifitime::{Duration, Epoch};
use ndarray::prelude::*;
use num_complex::Complex;

use viscache::{
    vec1, Averaging, Axis, FlagPolicy, MemoryBudget, MemoryStream, NoProgress, PlotAxis,
    PlotRegion, RecordGroup, Selection, Transforms, VisCache,
};

fn budget() -> MemoryBudget {
    MemoryBudget {
        total_bytes: 1 << 30,
        free_bytes: 1 << 30,
        ignore_free: false,
    }
}

fn make_group(
    offset_s: f64,
    scan: i32,
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
        field: 0,
        spw,
        antenna1: baselines.iter().map(|&(a1, _)| a1).collect(),
        antenna2: baselines.iter().map(|&(_, a2)| a2).collect(),
        uvw,
        channels: (0..nchan as i32).collect(),
        freqs: (0..nchan).map(|ch| 150e6 + ch as f64 * 40e3).collect(),
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

const ROWS: &[(i32, i32)] = &[(0, 1), (0, 2), (1, 2)];

/// Four raw groups, 10 s apart, 2 corrs x 4 chans x 3 rows each.
fn four_chunk_stream() -> MemoryStream {
    let groups = (0..4)
        .map(|i| make_group(10.0 * i as f64, 1, 0, 2, 4, ROWS))
        .collect();
    MemoryStream::open(groups, 3, &Selection::default())
}

fn load(cache: &mut VisCache, stream: &mut MemoryStream, averaging: &Averaging) {
    cache
        .load(
            stream,
            PlotAxis::new(Axis::Time),
            PlotAxis::new(Axis::Amp),
            &[],
            &Selection::default(),
            averaging,
            &Transforms::default(),
            &NoProgress,
        )
        .unwrap();
}

/// A region covering one chunk's full time stamp and every amplitude.
fn chunk_region(cache: &VisCache, point: u64) -> PlotRegion {
    let t = cache.get_x(point).unwrap();
    PlotRegion {
        x_min: t - 1.0,
        x_max: t + 1.0,
        y_min: f64::MIN,
        y_max: f64::MAX,
    }
}

#[test]
fn flagging_one_chunk_flags_exactly_its_group() {
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    load(&mut cache, &mut stream, &Averaging::default());
    assert_eq!(cache.n_points(), 4 * 24);

    // Chunk 2 starts at point 48; its region holds all 24 of its points.
    let region = chunk_region(&cache, 48);
    let n = cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    assert_eq!(n, 24);
    assert!(stream.is_released());

    let groups = stream.groups();
    assert!(groups[2].flags.iter().all(|&f| f));
    for i in [0, 1, 3] {
        assert!(groups[i].flags.iter().all(|&f| !f));
    }

    // The cache agrees without a reload.
    for p in 48..72 {
        assert!(!cache.get_flag_mask(p).unwrap());
    }
    assert!(cache.get_flag_mask(0).unwrap());
}

#[test]
fn flag_then_unflag_restores_the_store_bit_for_bit() {
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    load(&mut cache, &mut stream, &Averaging::default());

    let before: Vec<Array3<bool>> = stream.groups().iter().map(|g| g.flags.clone()).collect();

    let region = chunk_region(&cache, 24);
    let flagged = cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    assert_eq!(flagged, 24);
    assert_ne!(stream.groups()[1].flags, before[1]);

    let unflagged = cache
        .flag_range(&vec1![region], FlagPolicy::default(), false, &mut stream)
        .unwrap();
    assert_eq!(unflagged, 24);
    for (g, orig) in stream.groups().iter().zip(&before) {
        assert_eq!(&g.flags, orig);
    }
}

#[test]
fn flag_edits_extend_through_averaged_chunks() {
    // 15 s averaging merges the 10 s-spaced groups in pairs; flagging one
    // cached point must edit both raw groups behind its chunk.
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    let averaging = Averaging {
        time: Some(Duration::from_seconds(15.0)),
        ..Averaging::default()
    };
    load(&mut cache, &mut stream, &averaging);
    assert_eq!(cache.n_chunks(), 2);

    // Select exactly cached point 0: corr 0, chan 0, row (0,1) of chunk 0.
    let t = cache.get_x(0).unwrap();
    let y = cache.get_y(0).unwrap();
    let region = PlotRegion {
        x_min: t - 1.0,
        x_max: t + 1.0,
        y_min: y - 1e-3,
        y_max: y + 1e-3,
    };
    let n = cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    // Corr 0 chan 0 has the same amplitude on every row; rows are separated
    // by their imaginary parts, so only row 0 falls in the y window.
    assert_eq!(n, 1);

    let groups = stream.groups();
    for g in &groups[0..2] {
        assert!(g.flags[(0, 0, 0)], "both merged groups take the edit");
        assert!(!g.flags[(1, 0, 0)]);
        assert!(!g.flags[(0, 1, 0)]);
        assert!(!g.flags[(0, 0, 1)]);
    }
    for g in &groups[2..4] {
        assert!(g.flags.iter().all(|&f| !f));
    }
}

#[test]
fn channel_extension_expands_through_averaging_bins() {
    // Channel averaging by 2 leaves 2 cached channels; flagging one cached
    // channel without extension must flag both raw channels in its bin.
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    let averaging = Averaging {
        channel: NonZeroUsize::new(2),
        ..Averaging::default()
    };
    load(&mut cache, &mut stream, &averaging);
    // 2 corrs x 2 averaged chans x 3 rows per chunk.
    assert_eq!(cache.n_points(), 4 * 12);

    // Cached point 0: corr 0, averaged chan 0, row (0,1) of chunk 0.
    let t = cache.get_x(0).unwrap();
    let y = cache.get_y(0).unwrap();
    let region = PlotRegion {
        x_min: t - 1.0,
        x_max: t + 1.0,
        y_min: y - 1e-3,
        y_max: y + 1e-3,
    };
    let n = cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    assert_eq!(n, 1);

    let flags = &stream.groups()[0].flags;
    assert!(flags[(0, 0, 0)] && flags[(0, 1, 0)], "whole bin flagged");
    assert!(!flags[(0, 2, 0)] && !flags[(0, 3, 0)]);
    assert!(!flags[(1, 0, 0)]);
}

#[test]
fn correlation_extension_flags_every_correlation() {
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    load(&mut cache, &mut stream, &Averaging::default());

    // One point, extended across correlations.
    let t = cache.get_x(0).unwrap();
    let y = cache.get_y(0).unwrap();
    let region = PlotRegion {
        x_min: t - 1.0,
        x_max: t + 1.0,
        y_min: y - 1e-3,
        y_max: y + 1e-3,
    };
    let policy = FlagPolicy {
        all_correlations: true,
        ..FlagPolicy::default()
    };
    cache
        .flag_range(&vec1![region], policy, true, &mut stream)
        .unwrap();

    let flags = &stream.groups()[0].flags;
    assert!(flags[(0, 0, 0)] && flags[(1, 0, 0)]);
    assert!(!flags[(0, 1, 0)]);
    assert!(!flags[(0, 0, 1)]);
}

#[test]
fn locate_reports_point_metadata() {
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    load(&mut cache, &mut stream, &Averaging::default());

    let region = chunk_region(&cache, 48);
    let found = cache.locate_range(&vec1![region]).unwrap();
    assert_eq!(found.len(), 24);

    let meta = &found[0];
    assert_eq!(meta.chunk, 2);
    assert_eq!(meta.scan, 1);
    assert_eq!(meta.spw, 0);
    assert_eq!(meta.antenna1, 0);
    assert_eq!(meta.antenna2, 1);
    assert_eq!(meta.channel, 0);
    assert_eq!(meta.corr, 9);
    // Frequency is cached in GHz.
    assert!((meta.frequency - 0.15).abs() < 1e-6);

    // Flagged points disappear from locate results.
    cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    assert!(cache.locate_range(&vec1![region]).unwrap().is_empty());
}

#[test]
fn selection_narrows_what_gets_loaded_and_flagged() {
    // Channel selection keeps channels 1..=2; flagging with extension off
    // only touches selected channels.
    let selection = Selection {
        channels: Some(vec![(1, 2)]),
        ..Selection::default()
    };
    let groups = (0..2)
        .map(|i| make_group(10.0 * i as f64, 1, 0, 2, 4, ROWS))
        .collect();
    let mut stream = MemoryStream::open(groups, 3, &selection);
    let mut cache = VisCache::new(budget());
    cache
        .load(
            &mut stream,
            PlotAxis::new(Axis::Time),
            PlotAxis::new(Axis::Amp),
            &[],
            &selection,
            &Averaging::default(),
            &Transforms::default(),
            &NoProgress,
        )
        .unwrap();
    // 2 corrs x 2 selected chans x 3 rows per chunk.
    assert_eq!(cache.n_points(), 2 * 12);

    let region = chunk_region(&cache, 0);
    let n = cache
        .flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream)
        .unwrap();
    assert_eq!(n, 12);

    let flags = &stream.groups()[0].flags;
    for ic in 0..2 {
        for ir in 0..3 {
            assert!(!flags[(ic, 0, ir)], "unselected channel untouched");
            assert!(flags[(ic, 1, ir)]);
            assert!(flags[(ic, 2, ir)]);
            assert!(!flags[(ic, 3, ir)]);
        }
    }
}

#[test]
fn flag_write_back_leaves_the_stream_selection_intact() {
    // One selected correlation; the write-back walk widens the stream to
    // reach the other one, but must hand the selection back as configured.
    let selection = Selection {
        correlations: Some(vec![0]),
        ..Selection::default()
    };
    let groups = (0..2)
        .map(|i| make_group(10.0 * i as f64, 1, 0, 2, 4, ROWS))
        .collect();
    let mut stream = MemoryStream::open(groups, 3, &selection);
    let mut cache = VisCache::new(budget());
    cache
        .load(
            &mut stream,
            PlotAxis::new(Axis::Time),
            PlotAxis::new(Axis::Amp),
            &[],
            &selection,
            &Averaging::default(),
            &Transforms::default(),
            &NoProgress,
        )
        .unwrap();
    // 1 selected corr x 4 chans x 3 rows per chunk.
    assert_eq!(cache.n_points(), 2 * 12);

    let region = chunk_region(&cache, 0);
    let policy = FlagPolicy {
        all_correlations: true,
        ..FlagPolicy::default()
    };
    let n = cache
        .flag_range(&vec1![region], policy, true, &mut stream)
        .unwrap();
    assert_eq!(n, 12);
    assert!(stream.groups()[0].flags.iter().all(|&f| f));

    // A later load over the same stream still sees one correlation.
    cache
        .load(
            &mut stream,
            PlotAxis::new(Axis::Time),
            PlotAxis::new(Axis::Phase),
            &[],
            &selection,
            &Averaging::default(),
            &Transforms::default(),
            &NoProgress,
        )
        .unwrap();
    assert_eq!(cache.n_points(), 2 * 12);
}

#[test]
fn an_unplottable_cache_still_releases_the_stream() {
    let mut stream = four_chunk_stream();
    let mut cache = VisCache::new(budget());
    let region = PlotRegion {
        x_min: 0.0,
        x_max: 1.0,
        y_min: 0.0,
        y_max: 1.0,
    };
    let result = cache.flag_range(&vec1![region], FlagPolicy::default(), true, &mut stream);
    assert!(result.is_err());
    assert!(stream.is_released());
}
