use std::fmt::Display;

use pmtsim_common::{Time, Voltage};

/// A single photoelectron pulse: a scaled, time-shifted copy of the SPE
/// shape. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pulse {
    /// Scale factor applied to the shape, relative to the normalized SPE.
    pub amplitude: Voltage,
    /// Absolute time of the shape's zero point.
    pub time: Time,
}

impl Display for Pulse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("{0},{1}", self.time, self.amplitude))
    }
}

/// Pulses in generation order. Cleared and repopulated on every build.
pub type PulseArray = Vec<Pulse>;
