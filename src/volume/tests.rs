// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::num::NonZeroUsize;

use super::*;
use crate::selection::Selection;
use crate::stream::MemoryStream;
use crate::tests::synth_group;

fn budget(total: u64) -> MemoryBudget {
    MemoryBudget {
        total_bytes: total,
        free_bytes: total,
        ignore_free: false,
    }
}

#[test]
fn budget_respects_free_memory_unless_told_not_to() {
    let mut b = MemoryBudget {
        total_bytes: 1000,
        free_bytes: 600,
        ignore_free: false,
    };
    assert_eq!(b.available(), 600);
    b.ignore_free = true;
    assert_eq!(b.available(), 1000);
}

/// One spw, 2 corrs, 4 chans, 3 antennas; two chunks of 3 rows each.
fn meter(averaging: &Averaging) -> VolumeMeter {
    let rows = &[(0, 1), (0, 2), (1, 2)];
    let groups = vec![
        synth_group(0.0, 1, 0, 0, 2, 4, rows),
        synth_group(10.0, 1, 0, 0, 2, 4, rows),
    ];
    let stream = MemoryStream::open(groups, 3, &Selection::default());
    let mut m = VolumeMeter::new(&stream, averaging);
    m.add(0, 3);
    m.add(0, 3);
    m
}

#[test]
fn estimate_prices_each_shape_class() {
    let m = meter(&Averaging::default());
    // Amp spans corr, chan and row: 6 rows x 4 chans x 2 corrs x 4 bytes.
    // Time is per chunk: 2 chunks x 8 bytes.
    // The plot mask takes the union shape at 1 byte: 6 x 4 x 2.
    let est = m
        .estimate(
            &[Axis::Amp, Axis::Time],
            Axis::Amp.mask().union(Axis::Time.mask()),
            budget(1 << 20),
        )
        .unwrap();
    assert_eq!(est.required_bytes, 192 + 16 + 48);
}

#[test]
fn repeated_axes_are_priced_once() {
    let m = meter(&Averaging::default());
    let est = m
        .estimate(&[Axis::Time, Axis::Time], AxisMask::NONE, budget(1 << 20))
        .unwrap();
    // No mask dimensions spanned: the mask is one byte per chunk.
    assert_eq!(est.required_bytes, 16 + 2);
}

#[test]
fn channel_averaging_shrinks_the_channel_count() {
    let ave = Averaging {
        channel: NonZeroUsize::new(2),
        ..Averaging::default()
    };
    let m = meter(&ave);
    let est = m
        .estimate(&[Axis::Frequency], Axis::Frequency.mask(), budget(1 << 20))
        .unwrap();
    // Frequency is per chunk per chan: 2 chunks x 2 averaged chans x 8
    // bytes, plus the same shape of mask bytes.
    assert_eq!(est.required_bytes, 32 + 4);
}

#[test]
fn oversized_estimates_are_refused() {
    let m = meter(&Averaging::default());
    let result = m.estimate(&[Axis::Amp], Axis::Amp.mask(), budget(100));
    match result {
        Err(VolumeError::InsufficientMemory { estimate }) => {
            assert_eq!(estimate.required_bytes, 192 + 48);
            assert_eq!(estimate.available_bytes, 100);
        }
        Ok(_) => panic!("estimate unexpectedly fit"),
    }
}
