// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Plot-axis enumeration and the per-axis descriptor table.

Every part of the cache that needs to know something structural about an axis
(its shape class, whether it is metadata, whether it reads a visibility
column, its element size) consults the methods here rather than matching on
the enum locally.
 */

#[cfg(test)]
mod tests;

use strum_macros::{Display, EnumIter, EnumString};

/// All quantities that can be plotted against one another.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, EnumString)]
pub enum Axis {
    Time,
    TimeInterval,
    Scan,
    Field,
    Spw,
    Channel,
    Frequency,
    Velocity,
    Corr,
    Antenna1,
    Antenna2,
    Baseline,
    Row,
    Uvdist,
    /// uv-distance in wavelengths (varies per channel).
    UvdistL,
    U,
    V,
    W,
    Amp,
    Phase,
    Real,
    Imag,
    Flag,
    FlagRow,
    Wt,
    /// Azimuth of the array reference position.
    Az0,
    /// Elevation of the array reference position.
    El0,
    /// Hour angle of the array reference position.
    Ha0,
    /// Parallactic angle of the array reference position.
    Pa0,
    /// Antenna index (0..nant).
    Antenna,
    Azimuth,
    Elevation,
    ParAng,
}

/// Which visibility column a data-like axis reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display)]
pub enum DataColumn {
    #[default]
    Data,
    Model,
    Corrected,
    /// Corrected minus model.
    Residual,
}

/// An axis's shape class: the structural dimensions it varies over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisMask {
    pub corr: bool,
    pub chan: bool,
    pub row: bool,
    pub ant: bool,
}

impl AxisMask {
    pub(crate) const NONE: AxisMask = AxisMask {
        corr: false,
        chan: false,
        row: false,
        ant: false,
    };

    pub fn union(self, other: AxisMask) -> AxisMask {
        AxisMask {
            corr: self.corr || other.corr,
            chan: self.chan || other.chan,
            row: self.row || other.row,
            ant: self.ant || other.ant,
        }
    }
}

/// The axes that are always cached, whatever the plot. Flag write-back and
/// point metadata reporting depend on all of these being present.
pub(crate) const METADATA_AXES: [Axis; 13] = [
    Axis::Time,
    Axis::TimeInterval,
    Axis::Field,
    Axis::Spw,
    Axis::Scan,
    Axis::Antenna1,
    Axis::Antenna2,
    Axis::Baseline,
    Axis::Channel,
    Axis::Corr,
    Axis::Frequency,
    Axis::Flag,
    Axis::FlagRow,
];

impl Axis {
    /// The structural dimensions this axis varies over.
    pub fn mask(self) -> AxisMask {
        use Axis::*;
        let mut m = AxisMask::NONE;
        match self {
            Amp | Phase | Real | Imag | Flag => {
                m.corr = true;
                m.chan = true;
                m.row = true;
            }
            Channel | Frequency | Velocity => m.chan = true,
            Corr => m.corr = true,
            Row | Antenna1 | Antenna2 | Baseline | Uvdist | U | V | W | FlagRow | Wt => {
                m.row = true
            }
            UvdistL => {
                m.chan = true;
                m.row = true;
            }
            Antenna | Azimuth | Elevation | ParAng => m.ant = true,
            Time | TimeInterval | Scan | Spw | Field | Az0 | El0 | Ha0 | Pa0 => (),
        }
        m
    }

    /// Is this axis always loaded alongside any plot?
    pub fn is_metadata(self) -> bool {
        METADATA_AXES.contains(&self)
    }

    /// Does this axis read one of the visibility data columns?
    pub fn is_data(self) -> bool {
        matches!(self, Axis::Amp | Axis::Phase | Axis::Real | Axis::Imag)
    }

    /// Bytes per stored element, for the pre-flight volume estimate.
    pub(crate) fn elem_bytes(self) -> u64 {
        use Axis::*;
        match self {
            Scan | Field | Spw | Channel | Corr | Antenna1 | Antenna2 | Baseline | Antenna => 4,
            Time | TimeInterval | Frequency | Velocity | Uvdist | UvdistL | U | V | W | Az0
            | El0 | Ha0 | Pa0 | Azimuth | Elevation => 8,
            Amp | Phase | Real | Imag | Wt | ParAng => 4,
            Flag | FlagRow => 1,
            Row => 8,
        }
    }

    /// Whether the axis loader can populate this axis. Geometry-derived
    /// quantities and velocities come from an external collaborator, not from
    /// the record stream, so they are rejected at load time.
    pub(crate) fn is_loadable(self) -> bool {
        !matches!(
            self,
            Axis::Velocity
                | Axis::Az0
                | Axis::El0
                | Axis::Ha0
                | Axis::Pa0
                | Axis::Azimuth
                | Axis::Elevation
                | Axis::ParAng
        )
    }
}
