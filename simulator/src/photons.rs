use anyhow::{Context, Result};
use pmtsim_common::Time;
use rand::Rng;
use rand_distr::{Binomial, Distribution, Exp};
use serde::Deserialize;

/// Cutoff for decay-time sampling, in units of the component lifetime.
const DECAY_CUTOFF_LIFETIMES: f64 = 30.0;

/// Scintillation fast-fraction defaults, affine in the photon count.
const ER_FAST_FRACTION: (f64, f64) = (0.178464, 46.705);
const NR_FAST_FRACTION: (f64, f64) = (0.723801, -52.0528);

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) enum InteractionType {
    Er,
    Nr,
}

/// How the photon count splits between the fast and slow components.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "fraction-type")]
pub(crate) enum FastFraction {
    /// A fixed share of the photons is fast.
    Fixed { fraction: f64 },
    /// The fast count is binomial in the photon count.
    Binomial { fraction: f64 },
    /// Binomial, with the fraction looked up for the recoil type.
    InteractionType { interaction: InteractionType },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct ScintillationParams {
    pub(crate) photons: u64,
    pub(crate) split: FastFraction,
    #[serde(default = "default_tau_fast")]
    pub(crate) tau_fast: Time,
    #[serde(default = "default_tau_slow")]
    pub(crate) tau_slow: Time,
}

fn default_tau_fast() -> Time {
    6.0
}

fn default_tau_slow() -> Time {
    1500.0
}

impl ScintillationParams {
    pub(crate) fn validate(&self) -> bool {
        if !(self.tau_fast.is_finite() && self.tau_fast > 0.0) {
            tracing::error!("tau-fast must be positive, got {}", self.tau_fast);
            return false;
        }
        if !(self.tau_slow.is_finite() && self.tau_slow > 0.0) {
            tracing::error!("tau-slow must be positive, got {}", self.tau_slow);
            return false;
        }
        if let FastFraction::Fixed { fraction } | FastFraction::Binomial { fraction } =
            &self.split
        {
            if !(0.0..=1.0).contains(fraction) {
                tracing::error!("fast fraction must be in [0, 1], got {fraction}");
                return false;
            }
        }
        true
    }

    /// Fast-component share for this configuration.
    fn fraction(&self) -> f64 {
        match &self.split {
            FastFraction::Fixed { fraction } | FastFraction::Binomial { fraction } => *fraction,
            FastFraction::InteractionType { interaction } => {
                let (a, b) = match interaction {
                    InteractionType::Er => ER_FAST_FRACTION,
                    InteractionType::Nr => NR_FAST_FRACTION,
                };
                (a + b / self.photons as f64).clamp(0.0, 1.0)
            }
        }
    }
}

/// Number of fast photons per event.
#[derive(Debug, Clone)]
enum FastCount {
    Fixed(u64),
    Random(Binomial),
}

/// Samples photon flash times for one scintillation event, with the
/// interaction at time zero.
#[derive(Debug, Clone)]
pub(crate) struct Scintillator {
    photons: u64,
    fast_count: FastCount,
    decay_fast: Exp<f64>,
    decay_slow: Exp<f64>,
    cutoff_fast: Time,
    cutoff_slow: Time,
}

impl Scintillator {
    pub(crate) fn new(params: &ScintillationParams) -> Result<Self> {
        let fraction = params.fraction();
        let fast_count = match params.split {
            FastFraction::Fixed { .. } => {
                FastCount::Fixed((params.photons as f64 * fraction).round() as u64)
            }
            FastFraction::Binomial { .. } | FastFraction::InteractionType { .. } => {
                FastCount::Random(
                    Binomial::new(params.photons, fraction)
                        .context("fast-photon binomial")?,
                )
            }
        };
        Ok(Self {
            photons: params.photons,
            fast_count,
            decay_fast: Exp::new(1.0 / params.tau_fast).context("fast decay")?,
            decay_slow: Exp::new(1.0 / params.tau_slow).context("slow decay")?,
            cutoff_fast: DECAY_CUTOFF_LIFETIMES * params.tau_fast,
            cutoff_slow: DECAY_CUTOFF_LIFETIMES * params.tau_slow,
        })
    }

    pub(crate) fn sample(&self, rng: &mut impl Rng) -> Vec<Time> {
        let num_fast = match &self.fast_count {
            FastCount::Fixed(n) => *n,
            FastCount::Random(binomial) => binomial.sample(rng),
        };
        let num_slow = self.photons - num_fast.min(self.photons);

        let mut times = Vec::with_capacity(self.photons as usize);
        for _ in 0..num_fast {
            times.push(sample_decay(rng, self.decay_fast, self.cutoff_fast));
        }
        for _ in 0..num_slow {
            times.push(sample_decay(rng, self.decay_slow, self.cutoff_slow));
        }
        times
    }
}

/// Exponential decay time, restricted to `[0, cutoff]`.
fn sample_decay(rng: &mut impl Rng, decay: Exp<f64>, cutoff: Time) -> Time {
    std::iter::repeat_with(|| decay.sample(rng))
        .find(|t| *t <= cutoff)
        .unwrap_or(cutoff)
}
