use pmtsim_common::Time;
use thiserror::Error;

use crate::shape::ShapeError;

/// Rejected configuration. Raised when parameters are set, never mid-build.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Shape(#[from] ShapeError),

    #[error("probability {name} = {value} is outside [0, 1]")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("parameter {name} = {value} is invalid")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("interaction probabilities sum to {sum}, which exceeds 1")]
    ProbabilitySumExceedsOne { sum: f64 },

    #[error("shape area {0} cannot normalize the SPE amplitude")]
    DegenerateShapeArea(f64),
}

/// Failure during a waveform build. Configuration errors never reach here.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("dark-count window [{begin}, {end}) is invalid")]
    InvalidWindow { begin: Time, end: Time },
}
