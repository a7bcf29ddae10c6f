use pmtsim_common::{Sample, Time};
use serde::Deserialize;
use tracing::debug;

use crate::{
    diagnostics::ResponseMetrics,
    error::{BuildError, ConfigError},
    pmt::Pmt,
    pulse::{Pulse, PulseArray},
    shape::SpeShape,
};

/// Geometry of the digitized output waveform.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutWaveParams {
    /// Time between samples, ns.
    pub period: Time,
    /// ADC units per mV.
    pub gain: f64,
    pub num_samples: usize,
    /// Absolute time of sample 0, ns.
    pub delay: Time,
}

impl Default for OutWaveParams {
    fn default() -> Self {
        Self {
            period: 2.0,
            gain: 0.125,
            num_samples: 150_000,
            delay: -150_000.0,
        }
    }
}

impl OutWaveParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.period.is_finite() && self.period > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "period",
                value: self.period,
            });
        }
        if !(self.gain.is_finite() && self.gain != 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "gain",
                value: self.gain,
            });
        }
        if !self.delay.is_finite() {
            return Err(ConfigError::InvalidParameter {
                name: "delay",
                value: self.delay,
            });
        }
        Ok(())
    }

    /// Absolute time one past the last sample.
    pub fn window_end(&self) -> Time {
        self.delay + self.num_samples as f64 * self.period
    }
}

/// The output waveform buffer. Exclusively owned by its builder for the
/// duration of a build; a snapshot between builds.
#[derive(Debug, Clone)]
pub struct OutWave {
    params: OutWaveParams,
    samples: Vec<Sample>,
}

impl OutWave {
    pub fn new(params: OutWaveParams) -> Result<Self, ConfigError> {
        params.validate()?;
        Ok(Self {
            params,
            samples: vec![0.0; params.num_samples],
        })
    }

    pub fn params(&self) -> &OutWaveParams {
        &self.params
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Absolute time of sample `index`.
    pub fn time_of_sample(&self, index: usize) -> Time {
        self.params.delay + index as f64 * self.params.period
    }

    /// Zero the buffer ahead of a fresh build. Nothing carries over.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.samples.resize(self.params.num_samples, 0.0);
    }

    /// Superpose a scaled, time-shifted copy of `shape` for every pulse.
    ///
    /// The touched sample range is `ceil` on the left edge and `floor` on
    /// the right, so exactly the samples whose times fall inside the
    /// shape's domain are written. Pulses clipped down to an empty range
    /// lie outside the window and are skipped; that is the normal path for
    /// sparse waveforms, not an error.
    pub fn add_pulses(&mut self, shape: &SpeShape, pulses: &[Pulse]) {
        for pulse in pulses {
            // Time of the shape's zero point relative to sample 0.
            let arrival = pulse.time - self.params.delay;
            let start = f64::ceil((arrival + shape.xmin()) / self.params.period);
            let finish = f64::floor((arrival + shape.xmax()) / self.params.period);
            let start = f64::max(start, 0.0);
            let finish = f64::min(finish, self.params.num_samples as f64 - 1.0);
            if start > finish {
                continue;
            }
            for s in (start as usize)..=(finish as usize) {
                let sample_time = s as f64 * self.params.period;
                self.samples[s] +=
                    pulse.amplitude / self.params.gain * shape.eval(sample_time - arrival);
            }
        }
    }
}

/// Drives a full waveform build: photoelectron generation for a photon
/// sequence, dark-count generation over the output window, and synthesis
/// into the owned [`OutWave`].
///
/// The pulse buffers are cleared and repopulated on every build; no pulse
/// outlives the build that consumed it.
#[derive(Debug, Clone)]
pub struct WaveformGenerator {
    pmt: Pmt,
    out_wave: OutWave,
    photo_electrons: PulseArray,
    dark_electrons: PulseArray,
}

impl WaveformGenerator {
    pub fn new(pmt: Pmt, params: OutWaveParams) -> Result<Self, ConfigError> {
        Ok(Self {
            pmt,
            out_wave: OutWave::new(params)?,
            photo_electrons: PulseArray::new(),
            dark_electrons: PulseArray::new(),
        })
    }

    pub fn pmt(&self) -> &Pmt {
        &self.pmt
    }

    pub fn out_wave(&self) -> &OutWave {
        &self.out_wave
    }

    pub fn photo_electrons(&self) -> &[Pulse] {
        &self.photo_electrons
    }

    pub fn dark_electrons(&self) -> &[Pulse] {
        &self.dark_electrons
    }

    /// Build the waveform for one photon sequence plus dark counts,
    /// returning the finished sample buffer.
    pub fn build(
        &mut self,
        rng: &mut impl rand::Rng,
        photon_times: &[Time],
        metrics: &mut dyn ResponseMetrics,
    ) -> Result<&[Sample], BuildError> {
        self.out_wave.reset();

        self.photo_electrons.clear();
        for &time in photon_times {
            let interaction = self.pmt.one_photon(rng, time, &mut self.photo_electrons);
            metrics.record_interaction(interaction);
        }
        for pulse in &self.photo_electrons {
            metrics.record_pulse_area(pulse.amplitude * self.pmt.shape_area());
        }
        self.out_wave
            .add_pulses(self.pmt.shape(), &self.photo_electrons);

        // Extend the window left by the shape support so dark pulses whose
        // tails reach the first samples still contribute.
        self.dark_electrons.clear();
        let params = self.out_wave.params();
        let begin = params.delay - (self.pmt.shape().xmax() - self.pmt.shape().xmin());
        let end = params.window_end();
        self.pmt
            .dark_counts(rng, begin, end, &mut self.dark_electrons)?;
        self.out_wave
            .add_pulses(self.pmt.shape(), &self.dark_electrons);

        debug!(
            "built waveform: {} photons, {} photoelectrons, {} dark counts",
            photon_times.len(),
            self.photo_electrons.len(),
            self.dark_electrons.len()
        );
        Ok(self.out_wave.samples())
    }
}
