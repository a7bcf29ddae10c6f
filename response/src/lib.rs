//! Stochastic PMT response and waveform synthesis.
//!
//! Converts photon arrival times into photoelectron pulses via the banded
//! interaction model of [`pmt::Pmt`], superposes a single-photoelectron
//! shape at each pulse time with [`waveform::OutWave`], and adds a Poisson
//! dark-count background. All randomness flows through an injected
//! [`rand::Rng`], so a reseeded generator reproduces a build bit for bit.

pub mod diagnostics;
pub mod error;
pub mod pmt;
pub mod pulse;
pub mod shape;
pub mod waveform;

pub use error::{BuildError, ConfigError};
pub use pmt::{Interaction, Pmt, PmtParams};
pub use pulse::{Pulse, PulseArray};
pub use shape::SpeShape;
pub use waveform::{OutWave, OutWaveParams, WaveformGenerator};
