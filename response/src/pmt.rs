use std::fmt::Display;

use pmtsim_common::Time;
use rand::Rng;
use rand_distr::{Distribution, Normal, Poisson};
use serde::Deserialize;
use tracing::debug;

use crate::{
    error::{BuildError, ConfigError},
    pulse::{Pulse, PulseArray},
    shape::SpeShape,
};

/// Independent PMT parameters, set by the user.
///
/// Everything the response model derives (band probabilities, amplitude and
/// time-of-flight statistics) is recomputed from these whenever they change;
/// derived state is never mutable on its own.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PmtParams {
    /// Quantum efficiency of the photocathode, counted in photoelectrons
    /// per photon, so double emission is folded in.
    pub qe: f64,
    /// Double photoelectron emission probability for the photocathode,
    /// P(2phe) / (P(1phe) + P(2phe)).
    pub dpe_pc: f64,
    /// Quantum efficiency of the first dynode.
    pub qe_1d: f64,
    /// Double photoelectron emission probability for the first dynode.
    pub dpe_1d: f64,
    /// Amplification of the photocathode to first-dynode gap.
    pub gain_pc_1d: f64,
    /// Geometric probability for a photon passing the photocathode to hit
    /// the first dynode.
    pub gf_1d: f64,
    /// SPE pulse area, mV*ns.
    pub area_mean: f64,
    pub area_sigma: f64,
    /// Electron time of flight from photocathode to first dynode, ns.
    pub tof_pc_1d: f64,
    /// Electron time of flight from photocathode to anode, ns.
    pub tof_mean: f64,
    pub tof_sigma: f64,
    /// Dark counts per ns.
    pub dark_count_rate: f64,
    /// After-pulse placeholders. Carried in the parameter record but not
    /// modelled.
    #[serde(default)]
    pub ap_cont: f64,
    #[serde(default)]
    pub ap_peak: f64,
}

impl Default for PmtParams {
    /// Hamamatsu R11410-20 values.
    fn default() -> Self {
        Self {
            qe: 0.3,
            dpe_pc: 0.225,
            qe_1d: 0.105,
            dpe_1d: 0.0,
            gain_pc_1d: 13.0,
            gf_1d: 0.1,
            area_mean: 10.0,
            area_sigma: 1.0,
            tof_pc_1d: 6.0,
            tof_mean: 30.0,
            tof_sigma: 3.0,
            dark_count_rate: 1.0e-4,
            ap_cont: 0.0,
            ap_peak: 0.0,
        }
    }
}

impl PmtParams {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("dpe-pc", self.dpe_pc),
            ("qe-1d", self.qe_1d),
            ("dpe-1d", self.dpe_1d),
            ("gf-1d", self.gf_1d),
            ("ap-cont", self.ap_cont),
            ("ap-peak", self.ap_peak),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        // The quantum efficiency is a phe yield, so it may exceed 1 when
        // double emission is present; the derived band probabilities are
        // still required to land in [0, 1].
        if !(self.qe.is_finite() && self.qe >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "qe",
                value: self.qe,
            });
        }
        if !(self.gain_pc_1d.is_finite() && self.gain_pc_1d > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "gain-pc-1d",
                value: self.gain_pc_1d,
            });
        }
        if !(self.area_mean.is_finite() && self.area_mean > 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "area-mean",
                value: self.area_mean,
            });
        }
        for (name, value) in [("area-sigma", self.area_sigma), ("tof-sigma", self.tof_sigma)] {
            if !(value.is_finite() && value >= 0.0) {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        for (name, value) in [("tof-pc-1d", self.tof_pc_1d), ("tof-mean", self.tof_mean)] {
            if !value.is_finite() {
                return Err(ConfigError::InvalidParameter { name, value });
            }
        }
        if !(self.dark_count_rate.is_finite() && self.dark_count_rate >= 0.0) {
            return Err(ConfigError::InvalidParameter {
                name: "dark-count-rate",
                value: self.dark_count_rate,
            });
        }
        Ok(())
    }
}

/// Outcome of one photon hitting the tube.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Interaction {
    PhotocathodeSingle,
    PhotocathodeDouble,
    DynodeSingle,
    DynodeDouble,
    NoInteraction,
}

impl Interaction {
    pub fn photoelectrons(self) -> usize {
        match self {
            Self::PhotocathodeSingle | Self::DynodeSingle => 1,
            Self::PhotocathodeDouble | Self::DynodeDouble => 2,
            Self::NoInteraction => 0,
        }
    }

    pub fn at_dynode(self) -> bool {
        matches!(self, Self::DynodeSingle | Self::DynodeDouble)
    }
}

/// Widths of the interaction bands, exposed for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionProbabilities {
    pub photocathode: f64,
    pub photocathode_single: f64,
    pub photocathode_double: f64,
    pub dynode: f64,
    pub dynode_single: f64,
    pub dynode_double: f64,
}

/// State derived from [`PmtParams`] and the shape. Recomputed wholesale on
/// every reconfiguration.
#[derive(Debug, Clone)]
struct Derived {
    prob_c: f64,
    prob_c1: f64,
    prob_c2: f64,
    prob_1d: f64,
    prob_1d1: f64,
    prob_1d2: f64,
    shape_area: f64,
    amplitude_mean: f64,
    amplitude_sigma: f64,
    area_1d_mean: f64,
    area_1d_sigma: f64,
    tof_1d_mean: f64,
    tof_1d_sigma: f64,
    pc_amplitude: Normal<f64>,
    pc_tof: Normal<f64>,
    dynode_amplitude: Normal<f64>,
    dynode_tof: Normal<f64>,
}

impl Derived {
    fn compute(params: &PmtParams, shape: &SpeShape) -> Result<Self, ConfigError> {
        params.validate()?;
        shape.validate()?;

        let shape_area = shape.area();
        if !(shape_area.is_finite() && shape_area != 0.0) {
            return Err(ConfigError::DegenerateShapeArea(shape_area));
        }

        // Contribution of the first dynode to the full quantum efficiency,
        // in photocathode-equivalent photoelectrons per photon.
        let qe_1d_ratio = params.gf_1d * params.qe_1d / params.gain_pc_1d;

        let prob_c = (params.qe - qe_1d_ratio) / (1.0 + params.dpe_pc - qe_1d_ratio);
        let prob_1d = (1.0 - prob_c) * params.gf_1d * params.qe_1d / (1.0 + params.dpe_1d);
        let prob_c1 = (1.0 - params.dpe_pc) * prob_c;
        let prob_c2 = params.dpe_pc * prob_c;
        let prob_1d1 = (1.0 - params.dpe_1d) * prob_1d;
        let prob_1d2 = params.dpe_1d * prob_1d;

        for (name, value) in [
            ("P(photocathode)", prob_c),
            ("P(first dynode)", prob_1d),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ProbabilityOutOfRange { name, value });
            }
        }
        let sum = prob_c + prob_1d;
        if sum > 1.0 {
            return Err(ConfigError::ProbabilitySumExceedsOne { sum });
        }

        let amplitude_mean = params.area_mean / shape_area;
        let amplitude_sigma = amplitude_mean.abs() * (params.area_sigma / params.area_mean);

        let tof_1d_mean = params.tof_mean - params.tof_pc_1d;
        // Halving the dynode-path spread is the reference approximation.
        let tof_1d_sigma = 0.5 * params.tof_sigma;

        let distribution = |name, mean: f64, sigma: f64| {
            Normal::new(mean, sigma)
                .map_err(|_| ConfigError::InvalidParameter { name, value: sigma })
        };

        Ok(Self {
            prob_c,
            prob_c1,
            prob_c2,
            prob_1d,
            prob_1d1,
            prob_1d2,
            shape_area,
            amplitude_mean,
            amplitude_sigma,
            area_1d_mean: params.area_mean / params.gain_pc_1d,
            area_1d_sigma: params.area_sigma / params.gain_pc_1d,
            tof_1d_mean,
            tof_1d_sigma,
            pc_amplitude: distribution("amplitude", amplitude_mean, amplitude_sigma)?,
            pc_tof: distribution("tof", params.tof_mean, params.tof_sigma)?,
            dynode_amplitude: distribution(
                "dynode amplitude",
                amplitude_mean / params.gain_pc_1d,
                amplitude_sigma / params.gain_pc_1d,
            )?,
            dynode_tof: distribution("dynode tof", tof_1d_mean, tof_1d_sigma)?,
        })
    }
}

/// The PMT response model: converts single photons into photoelectron
/// pulses and generates the dark-count background.
#[derive(Debug, Clone)]
pub struct Pmt {
    params: PmtParams,
    shape: SpeShape,
    derived: Derived,
}

impl Pmt {
    pub fn new(params: PmtParams, shape: SpeShape) -> Result<Self, ConfigError> {
        let derived = Derived::compute(&params, &shape)?;
        Ok(Self {
            params,
            shape,
            derived,
        })
    }

    /// Replace the independent parameters, recomputing all derived state.
    /// On error the previous configuration is kept.
    pub fn set_params(&mut self, params: PmtParams) -> Result<(), ConfigError> {
        let derived = Derived::compute(&params, &self.shape)?;
        self.params = params;
        self.derived = derived;
        Ok(())
    }

    /// Replace the SPE shape, recomputing all derived state. On error the
    /// previous configuration is kept.
    pub fn set_shape(&mut self, shape: SpeShape) -> Result<(), ConfigError> {
        let derived = Derived::compute(&self.params, &shape)?;
        self.shape = shape;
        self.derived = derived;
        Ok(())
    }

    pub fn params(&self) -> &PmtParams {
        &self.params
    }

    pub fn shape(&self) -> &SpeShape {
        &self.shape
    }

    pub fn shape_area(&self) -> f64 {
        self.derived.shape_area
    }

    pub fn amplitude_mean(&self) -> f64 {
        self.derived.amplitude_mean
    }

    pub fn amplitude_sigma(&self) -> f64 {
        self.derived.amplitude_sigma
    }

    pub fn area_1d_mean(&self) -> f64 {
        self.derived.area_1d_mean
    }

    pub fn area_1d_sigma(&self) -> f64 {
        self.derived.area_1d_sigma
    }

    pub fn tof_1d_mean(&self) -> f64 {
        self.derived.tof_1d_mean
    }

    pub fn tof_1d_sigma(&self) -> f64 {
        self.derived.tof_1d_sigma
    }

    pub fn probabilities(&self) -> InteractionProbabilities {
        InteractionProbabilities {
            photocathode: self.derived.prob_c,
            photocathode_single: self.derived.prob_c1,
            photocathode_double: self.derived.prob_c2,
            dynode: self.derived.prob_1d,
            dynode_single: self.derived.prob_1d1,
            dynode_double: self.derived.prob_1d2,
        }
    }

    /// Convert one photon arriving at `time` into zero, one, or two
    /// photoelectron pulses, appended to `electrons`.
    ///
    /// A single uniform draw partitions the outcome space into five
    /// closed-open bands, most specific category first:
    ///
    /// ```text
    /// [0, P_C1)                 1 phe at the photocathode
    /// [P_C1, P_C)               2 phe at the photocathode
    /// [P_C, P_C + P_1d1)        1 phe at the first dynode
    /// [P_C + P_1d1, P_C + P_1d) 2 phe at the first dynode
    /// [P_C + P_1d, 1)           no interaction
    /// ```
    ///
    /// Band edges are cumulative, so a zero-width band can never be
    /// selected.
    pub fn one_photon(
        &self,
        rng: &mut impl Rng,
        time: Time,
        electrons: &mut PulseArray,
    ) -> Interaction {
        let d = &self.derived;
        let r: f64 = rng.random();
        let interaction = if r < d.prob_c1 {
            Interaction::PhotocathodeSingle
        } else if r < d.prob_c {
            Interaction::PhotocathodeDouble
        } else if r < d.prob_c + d.prob_1d1 {
            Interaction::DynodeSingle
        } else if r < d.prob_c + d.prob_1d {
            Interaction::DynodeDouble
        } else {
            Interaction::NoInteraction
        };

        let (amplitude, tof) = if interaction.at_dynode() {
            (d.dynode_amplitude, d.dynode_tof)
        } else {
            (d.pc_amplitude, d.pc_tof)
        };
        for _ in 0..interaction.photoelectrons() {
            electrons.push(Pulse {
                amplitude: amplitude.sample(rng),
                time: time + tof.sample(rng),
            });
        }
        debug!("photon at {time} ns: {interaction:?}");
        interaction
    }

    /// Generate dark-count pulses over `[begin, end)`, appended to
    /// `electrons`. The count is Poisson in the window length; times are
    /// uniform and amplitudes use full photocathode statistics.
    pub fn dark_counts(
        &self,
        rng: &mut impl Rng,
        begin: Time,
        end: Time,
        electrons: &mut PulseArray,
    ) -> Result<usize, BuildError> {
        if !(begin.is_finite() && end.is_finite() && begin <= end) {
            return Err(BuildError::InvalidWindow { begin, end });
        }
        let mean = self.params.dark_count_rate * (end - begin);
        if mean == 0.0 {
            return Ok(0);
        }
        let count = Poisson::new(mean)
            .map_err(|_| BuildError::InvalidWindow { begin, end })?
            .sample(rng) as usize;
        for _ in 0..count {
            electrons.push(Pulse {
                amplitude: self.derived.pc_amplitude.sample(rng),
                time: rng.random_range(begin..end),
            });
        }
        debug!("{count} dark counts in [{begin}, {end}) ns");
        Ok(count)
    }
}

impl Display for Pmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let p = &self.params;
        let d = &self.derived;
        writeln!(f, "PMT parameters:")?;
        writeln!(f, "  qe             = {}", p.qe)?;
        writeln!(f, "  dpe (pc/1d)    = {} / {}", p.dpe_pc, p.dpe_1d)?;
        writeln!(f, "  qe 1d          = {}", p.qe_1d)?;
        writeln!(f, "  gain pc->1d    = {}", p.gain_pc_1d)?;
        writeln!(f, "  gf 1d          = {}", p.gf_1d)?;
        writeln!(f, "  area           = {} +/- {} mV*ns", p.area_mean, p.area_sigma)?;
        writeln!(f, "  tof pc->anode  = {} +/- {} ns", p.tof_mean, p.tof_sigma)?;
        writeln!(f, "  tof pc->1d     = {} ns", p.tof_pc_1d)?;
        writeln!(f, "  dark rate      = {} /ns", p.dark_count_rate)?;
        writeln!(f, "derived:")?;
        writeln!(f, "  P(pc) 1/2 phe  = {} = {} + {}", d.prob_c, d.prob_c1, d.prob_c2)?;
        writeln!(f, "  P(1d) 1/2 phe  = {} = {} + {}", d.prob_1d, d.prob_1d1, d.prob_1d2)?;
        writeln!(f, "  shape area     = {} mV*ns", d.shape_area)?;
        writeln!(f, "  amplitude      = {} +/- {}", d.amplitude_mean, d.amplitude_sigma)?;
        writeln!(f, "  area 1d        = {} +/- {} mV*ns", d.area_1d_mean, d.area_1d_sigma)?;
        writeln!(f, "  tof 1d->anode  = {} +/- {} ns", d.tof_1d_mean, d.tof_1d_sigma)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use rand::{SeedableRng, rngs::StdRng};

    fn test_shape() -> SpeShape {
        SpeShape::Gaussian {
            peak: 1.0,
            mean: 0.0,
            sd: 1.0,
            xmin: -5.0,
            xmax: 5.0,
        }
    }

    fn pc_only_params() -> PmtParams {
        PmtParams {
            qe: 1.225,
            dpe_pc: 0.225,
            qe_1d: 0.0,
            ..Default::default()
        }
    }

    #[test]
    fn default_parameters_produce_expected_bands() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let p = pmt.probabilities();

        // Hand-computed from the derivation formulas.
        let qe_1d_ratio = 0.1 * 0.105 / 13.0;
        let prob_c = (0.3 - qe_1d_ratio) / (1.225 - qe_1d_ratio);
        let prob_1d = (1.0 - prob_c) * 0.1 * 0.105;
        assert_approx_eq!(p.photocathode, prob_c);
        assert_approx_eq!(p.dynode, prob_1d);
        assert_approx_eq!(p.photocathode_single + p.photocathode_double, p.photocathode);
        assert_approx_eq!(p.dynode_single, p.dynode);
        assert_approx_eq!(p.dynode_double, 0.0);
        assert!(p.photocathode + p.dynode <= 1.0);
    }

    #[test]
    fn amplitude_normalized_by_shape_area() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        assert_approx_eq!(
            pmt.amplitude_mean(),
            10.0 / pmt.shape_area(),
            1e-9
        );
        assert_approx_eq!(
            pmt.amplitude_sigma(),
            pmt.amplitude_mean() * (1.0 / 10.0),
            1e-9
        );
    }

    #[test]
    fn dynode_statistics_follow_gain_and_transit_time() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        assert_approx_eq!(pmt.area_1d_mean(), 10.0 / 13.0);
        assert_approx_eq!(pmt.tof_1d_mean(), 24.0);
        assert_approx_eq!(pmt.tof_1d_sigma(), 1.5);
    }

    #[test]
    fn set_params_recomputes_derived_state() {
        let mut pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let amplitude_before = pmt.amplitude_mean();
        pmt.set_params(PmtParams {
            area_mean: 20.0,
            ..Default::default()
        })
        .unwrap();
        assert_approx_eq!(pmt.amplitude_mean(), 2.0 * amplitude_before);
    }

    #[test]
    fn failed_reconfiguration_keeps_previous_state() {
        let mut pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let before = pmt.probabilities();
        assert!(
            pmt.set_params(PmtParams {
                qe: 2.0,
                dpe_pc: 0.0,
                ..Default::default()
            })
            .is_err()
        );
        assert_eq!(pmt.probabilities(), before);
    }

    #[test]
    fn rejects_band_probability_over_one() {
        let result = Pmt::new(
            PmtParams {
                qe: 1.5,
                dpe_pc: 0.0,
                qe_1d: 0.0,
                ..Default::default()
            },
            test_shape(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::ProbabilityOutOfRange { .. })
        ));
    }

    #[test]
    fn rejects_out_of_range_dpe() {
        let result = Pmt::new(
            PmtParams {
                dpe_pc: 1.5,
                ..Default::default()
            },
            test_shape(),
        );
        assert!(matches!(
            result,
            Err(ConfigError::ProbabilityOutOfRange { name: "dpe-pc", .. })
        ));
    }

    #[test]
    fn rejects_zero_area_shape() {
        // Identically zero over its whole domain.
        let shape = SpeShape::Tabulated {
            knots: vec![
                crate::shape::Knot { time: 0.0, value: 0.0 },
                crate::shape::Knot { time: 1.0, value: 0.0 },
            ],
        };
        let result = Pmt::new(PmtParams::default(), shape);
        assert!(matches!(result, Err(ConfigError::DegenerateShapeArea(_))));
    }

    #[test]
    fn photocathode_only_never_yields_dynode_interactions() {
        let pmt = Pmt::new(pc_only_params(), test_shape()).unwrap();
        let mut rng = StdRng::seed_from_u64(13);
        let mut electrons = PulseArray::new();
        for photon in 0..10_000 {
            electrons.clear();
            let interaction = pmt.one_photon(&mut rng, photon as f64, &mut electrons);
            assert!(!interaction.at_dynode());
            assert_ne!(interaction, Interaction::NoInteraction);
            assert!(matches!(electrons.len(), 1 | 2));
        }
    }

    #[test]
    fn interaction_frequencies_converge_to_band_widths() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let p = pmt.probabilities();
        let mut rng = StdRng::seed_from_u64(42);
        let mut electrons = PulseArray::new();

        let trials = 200_000;
        let mut counts = [0usize; 5];
        for _ in 0..trials {
            let slot = match pmt.one_photon(&mut rng, 0.0, &mut electrons) {
                Interaction::PhotocathodeSingle => 0,
                Interaction::PhotocathodeDouble => 1,
                Interaction::DynodeSingle => 2,
                Interaction::DynodeDouble => 3,
                Interaction::NoInteraction => 4,
            };
            counts[slot] += 1;
        }

        let expected = [
            p.photocathode_single,
            p.photocathode_double,
            p.dynode_single,
            p.dynode_double,
            1.0 - p.photocathode - p.dynode,
        ];
        for (count, expected) in counts.iter().zip(expected) {
            assert_approx_eq!(*count as f64 / trials as f64, expected, 5e-3);
        }
    }

    #[test]
    fn photoelectron_times_follow_transit_statistics() {
        let pmt = Pmt::new(pc_only_params(), test_shape()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let mut electrons = PulseArray::new();
        for _ in 0..20_000 {
            pmt.one_photon(&mut rng, 100.0, &mut electrons);
        }
        let mean =
            electrons.iter().map(|e| e.time).sum::<f64>() / electrons.len() as f64;
        // Photon time plus the photocathode-to-anode transit time.
        assert_approx_eq!(mean, 130.0, 0.1);
        assert!(electrons.iter().all(|e| e.amplitude.is_finite()));
    }

    #[test]
    fn same_seed_reproduces_identical_pulses() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let times: Vec<f64> = (0..100).map(|t| t as f64).collect();

        let run = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut electrons = PulseArray::new();
            for &t in &times {
                pmt.one_photon(&mut rng, t, &mut electrons);
            }
            electrons
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn dark_count_mean_matches_rate_times_length() {
        let pmt = Pmt::new(
            PmtParams {
                dark_count_rate: 0.01,
                ..Default::default()
            },
            test_shape(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut electrons = PulseArray::new();

        let trials = 500;
        let mut total = 0;
        for _ in 0..trials {
            electrons.clear();
            total += pmt.dark_counts(&mut rng, 0.0, 10_000.0, &mut electrons).unwrap();
            assert!(electrons.iter().all(|e| (0.0..10_000.0).contains(&e.time)));
        }
        // rate * length = 100 expected per trial.
        assert_approx_eq!(total as f64 / trials as f64, 100.0, 2.0);
    }

    #[test]
    fn zero_rate_generates_no_dark_counts() {
        let pmt = Pmt::new(
            PmtParams {
                dark_count_rate: 0.0,
                ..Default::default()
            },
            test_shape(),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut electrons = PulseArray::new();
        assert_eq!(
            pmt.dark_counts(&mut rng, 0.0, 1.0e6, &mut electrons).unwrap(),
            0
        );
        assert!(electrons.is_empty());
    }

    #[test]
    fn reversed_dark_window_is_rejected() {
        let pmt = Pmt::new(PmtParams::default(), test_shape()).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        let mut electrons = PulseArray::new();
        assert!(
            pmt.dark_counts(&mut rng, 10.0, 0.0, &mut electrons)
                .is_err()
        );
    }
}
