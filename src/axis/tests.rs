// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use strum::IntoEnumIterator;

use super::*;

#[test]
fn metadata_axes_are_flagged_as_metadata() {
    for axis in METADATA_AXES {
        assert!(axis.is_metadata(), "{axis} should be metadata");
    }
    assert!(!Axis::Amp.is_metadata());
    assert!(!Axis::Uvdist.is_metadata());
}

#[test]
fn data_axes_span_all_three_cube_dims() {
    for axis in [Axis::Amp, Axis::Phase, Axis::Real, Axis::Imag, Axis::Flag] {
        let m = axis.mask();
        assert!(m.corr && m.chan && m.row);
        assert!(!m.ant);
    }
}

#[test]
fn degenerate_axes_have_empty_masks() {
    for axis in [Axis::Time, Axis::TimeInterval, Axis::Scan, Axis::Field, Axis::Spw] {
        assert_eq!(axis.mask(), AxisMask::NONE);
    }
}

#[test]
fn uvdist_l_spans_channel_and_row() {
    let m = Axis::UvdistL.mask();
    assert!(m.chan && m.row);
    assert!(!m.corr && !m.ant);
}

#[test]
fn mask_union() {
    let net = Axis::Amp.mask().union(Axis::Time.mask());
    assert!(net.corr && net.chan && net.row && !net.ant);

    let net = Axis::Frequency.mask().union(Axis::Uvdist.mask());
    assert!(!net.corr && net.chan && net.row && !net.ant);
}

#[test]
fn every_axis_has_an_element_size() {
    for axis in Axis::iter() {
        assert!(axis.elem_bytes() > 0);
    }
}

#[test]
fn geometry_axes_are_not_loadable() {
    for axis in [Axis::Az0, Axis::El0, Axis::Ha0, Axis::Pa0, Axis::Azimuth, Axis::Elevation, Axis::ParAng, Axis::Velocity] {
        assert!(!axis.is_loadable());
    }
    assert!(Axis::Antenna.is_loadable());
    assert!(Axis::Amp.is_loadable());
}
