use pmtsim_common::{DEFAULT_INTEGRATION_BINS, Time, Voltage};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShapeError {
    #[error("shape domain [{xmin}, {xmax}] must be finite and non-empty")]
    InvalidDomain { xmin: Time, xmax: Time },

    #[error("shape parameter {name} = {value} is invalid")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("tabulated shape needs at least two knots, got {0}")]
    TooFewKnots(usize),

    #[error("tabulated shape knot times must be finite and strictly ascending")]
    UnorderedKnots,

    #[error("tabulated shape values must be finite")]
    NonFiniteKnot,
}

/// One point of a tabulated SPE curve.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Knot {
    pub time: Time,
    pub value: Voltage,
}

/// The normalized single-photoelectron pulse shape.
///
/// Exactly one representation is active at a time. The shape is defined on
/// a finite domain and is zero outside it; [`SpeShape::eval`] enforces the
/// zero convention so callers never extrapolate.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "shape-type")]
pub enum SpeShape {
    Gaussian {
        peak: Voltage,
        mean: Time,
        sd: Time,
        xmin: Time,
        xmax: Time,
    },
    Biexp {
        start: Time,
        stop: Time,
        rise: Time,
        decay: Time,
        peak: Voltage,
    },
    Tabulated {
        knots: Vec<Knot>,
    },
}

impl SpeShape {
    /// Reject shapes that cannot be evaluated everywhere inside their
    /// domain. Called at configuration time, before any build.
    pub fn validate(&self) -> Result<(), ShapeError> {
        match self {
            Self::Gaussian {
                peak,
                mean,
                sd,
                xmin,
                xmax,
            } => {
                if !(xmin.is_finite() && xmax.is_finite() && xmin < xmax) {
                    return Err(ShapeError::InvalidDomain {
                        xmin: *xmin,
                        xmax: *xmax,
                    });
                }
                if !(sd.is_finite() && *sd > 0.0) {
                    return Err(ShapeError::InvalidParameter {
                        name: "sd",
                        value: *sd,
                    });
                }
                if !mean.is_finite() {
                    return Err(ShapeError::InvalidParameter {
                        name: "mean",
                        value: *mean,
                    });
                }
                if !peak.is_finite() {
                    return Err(ShapeError::InvalidParameter {
                        name: "peak",
                        value: *peak,
                    });
                }
                Ok(())
            }
            Self::Biexp {
                start,
                stop,
                rise,
                decay,
                peak,
            } => {
                if !(start.is_finite() && stop.is_finite() && start < stop) {
                    return Err(ShapeError::InvalidDomain {
                        xmin: *start,
                        xmax: *stop,
                    });
                }
                if !(rise.is_finite() && *rise > 0.0) {
                    return Err(ShapeError::InvalidParameter {
                        name: "rise",
                        value: *rise,
                    });
                }
                // The peak-time algebra requires the decay constant to
                // dominate the rise constant.
                if !(decay.is_finite() && *decay > *rise) {
                    return Err(ShapeError::InvalidParameter {
                        name: "decay",
                        value: *decay,
                    });
                }
                if !peak.is_finite() {
                    return Err(ShapeError::InvalidParameter {
                        name: "peak",
                        value: *peak,
                    });
                }
                Ok(())
            }
            Self::Tabulated { knots } => {
                if knots.len() < 2 {
                    return Err(ShapeError::TooFewKnots(knots.len()));
                }
                for pair in knots.windows(2) {
                    if !(pair[0].time.is_finite() && pair[0].time < pair[1].time) {
                        return Err(ShapeError::UnorderedKnots);
                    }
                }
                if knots.iter().any(|k| !(k.time.is_finite() && k.value.is_finite())) {
                    return Err(ShapeError::NonFiniteKnot);
                }
                Ok(())
            }
        }
    }

    /// Left edge of the domain of definition.
    pub fn xmin(&self) -> Time {
        match self {
            Self::Gaussian { xmin, .. } => *xmin,
            Self::Biexp { start, .. } => *start,
            Self::Tabulated { knots } => knots.first().map(|k| k.time).unwrap_or_default(),
        }
    }

    /// Right edge of the domain of definition.
    pub fn xmax(&self) -> Time {
        match self {
            Self::Gaussian { xmax, .. } => *xmax,
            Self::Biexp { stop, .. } => *stop,
            Self::Tabulated { knots } => knots.last().map(|k| k.time).unwrap_or_default(),
        }
    }

    /// Shape value at `t`, zero outside the domain.
    pub fn eval(&self, t: Time) -> Voltage {
        if t < self.xmin() || t > self.xmax() {
            return 0.0;
        }
        match self {
            Self::Gaussian { peak, mean, sd, .. } => {
                peak * f64::exp(-0.5 * f64::powi((t - mean) / sd, 2))
            }
            Self::Biexp {
                start,
                rise,
                decay,
                peak,
                ..
            } => {
                let u = t - start;
                biexp_coef(*rise, *decay, *peak)
                    * (f64::exp(-u / decay) - f64::exp(-u / rise))
            }
            Self::Tabulated { knots } => {
                // Position of the first knot past t; t is bracketed by its
                // neighbour on the left.
                let right = knots.partition_point(|k| k.time <= t);
                if right == 0 {
                    return knots[0].value;
                }
                if right == knots.len() {
                    return knots[knots.len() - 1].value;
                }
                let (a, b) = (knots[right - 1], knots[right]);
                let frac = (t - a.time) / (b.time - a.time);
                a.value + frac * (b.value - a.value)
            }
        }
    }

    /// The definite integral over the domain.
    ///
    /// Closed form where one exists; otherwise the fixed-step midpoint rule
    /// with [`DEFAULT_INTEGRATION_BINS`] bins.
    pub fn area(&self) -> f64 {
        self.area_with_bins(DEFAULT_INTEGRATION_BINS)
    }

    pub fn area_with_bins(&self, bins: usize) -> f64 {
        match self {
            Self::Biexp {
                start,
                stop,
                rise,
                decay,
                peak,
            } => {
                let len = stop - start;
                biexp_coef(*rise, *decay, *peak)
                    * (decay * (1.0 - f64::exp(-len / decay))
                        - rise * (1.0 - f64::exp(-len / rise)))
            }
            Self::Gaussian { .. } | Self::Tabulated { .. } => self.midpoint_integral(bins),
        }
    }

    /// The maximum value over the domain.
    pub fn ymax(&self) -> Voltage {
        self.extremum_candidates()
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// The minimum value over the domain.
    pub fn ymin(&self) -> Voltage {
        self.extremum_candidates().fold(f64::INFINITY, f64::min)
    }

    fn midpoint_integral(&self, bins: usize) -> f64 {
        let bin_width = (self.xmax() - self.xmin()) / bins as f64;
        (0..bins)
            .map(|i| bin_width * self.eval(self.xmin() + (i as f64 + 0.5) * bin_width))
            .sum()
    }

    /// Values at every point where an extremum can occur: the domain edges,
    /// the stationary point of an analytic form, every knot of a table.
    fn extremum_candidates(&self) -> Box<dyn Iterator<Item = Voltage> + '_> {
        match self {
            Self::Gaussian {
                mean, xmin, xmax, ..
            } => {
                let mut candidates = vec![self.eval(*xmin), self.eval(*xmax)];
                if (*xmin..=*xmax).contains(mean) {
                    candidates.push(self.eval(*mean));
                }
                Box::new(candidates.into_iter())
            }
            Self::Biexp {
                start,
                stop,
                rise,
                decay,
                ..
            } => {
                let mut candidates = vec![self.eval(*start), self.eval(*stop)];
                let peak_time = start + biexp_peak_time(*rise, *decay);
                if (*start..=*stop).contains(&peak_time) {
                    candidates.push(self.eval(peak_time));
                }
                Box::new(candidates.into_iter())
            }
            Self::Tabulated { knots } => Box::new(knots.iter().map(|k| k.value)),
        }
    }
}

/// Time of the biexponential maximum, relative to its start.
fn biexp_peak_time(rise: Time, decay: Time) -> Time {
    decay * rise / (decay - rise) * f64::ln(decay / rise)
}

/// Scale factor giving the biexponential its requested peak value.
fn biexp_coef(rise: Time, decay: Time, peak: Voltage) -> f64 {
    let t = biexp_peak_time(rise, decay);
    peak / (f64::exp(-t / decay) - f64::exp(-t / rise))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn unit_gaussian() -> SpeShape {
        SpeShape::Gaussian {
            peak: 1.0,
            mean: 0.0,
            sd: 1.0,
            xmin: -5.0,
            xmax: 5.0,
        }
    }

    #[test]
    fn gaussian_eval_inside_domain() {
        let shape = unit_gaussian();
        assert_approx_eq!(shape.eval(0.0), 1.0);
        assert_approx_eq!(shape.eval(1.0), f64::exp(-0.5));
        assert_approx_eq!(shape.eval(-1.0), shape.eval(1.0));
    }

    #[test]
    fn eval_is_zero_outside_domain() {
        let shape = unit_gaussian();
        assert_eq!(shape.eval(-5.1), 0.0);
        assert_eq!(shape.eval(5.1), 0.0);
        assert_eq!(shape.eval(1.0e9), 0.0);
    }

    #[test]
    fn gaussian_area_matches_analytic_value() {
        // Nearly all of the mass of a unit gaussian lies within +/- 5 sigma.
        let shape = unit_gaussian();
        assert_approx_eq!(shape.area(), f64::sqrt(2.0 * std::f64::consts::PI), 1e-4);
    }

    #[test]
    fn gaussian_extrema() {
        let shape = unit_gaussian();
        assert_approx_eq!(shape.ymax(), 1.0);
        assert_approx_eq!(shape.ymin(), f64::exp(-12.5));
    }

    #[test]
    fn biexp_peaks_at_requested_height() {
        let shape = SpeShape::Biexp {
            start: 0.0,
            stop: 50.0,
            rise: 2.0,
            decay: 10.0,
            peak: 3.0,
        };
        shape.validate().unwrap();
        assert_approx_eq!(shape.ymax(), 3.0);
        assert_eq!(shape.eval(0.0), 0.0);
    }

    #[test]
    fn biexp_area_matches_midpoint_rule() {
        let shape = SpeShape::Biexp {
            start: 0.0,
            stop: 80.0,
            rise: 2.0,
            decay: 10.0,
            peak: 1.0,
        };
        assert_approx_eq!(shape.area(), shape.midpoint_integral(10_000), 1e-6);
    }

    #[test]
    fn tabulated_interpolates_between_knots() {
        let shape = SpeShape::Tabulated {
            knots: vec![
                Knot { time: 0.0, value: 0.0 },
                Knot { time: 1.0, value: 2.0 },
                Knot { time: 3.0, value: 0.0 },
            ],
        };
        shape.validate().unwrap();
        assert_approx_eq!(shape.eval(0.5), 1.0);
        assert_approx_eq!(shape.eval(1.0), 2.0);
        assert_approx_eq!(shape.eval(2.0), 1.0);
        assert_eq!(shape.eval(-0.1), 0.0);
        assert_eq!(shape.eval(3.1), 0.0);
    }

    #[test]
    fn tabulated_triangle_area() {
        // Triangle of base 3 and height 2.
        let shape = SpeShape::Tabulated {
            knots: vec![
                Knot { time: 0.0, value: 0.0 },
                Knot { time: 1.0, value: 2.0 },
                Knot { time: 3.0, value: 0.0 },
            ],
        };
        assert_approx_eq!(shape.area(), 3.0, 1e-2);
        assert_approx_eq!(shape.area_with_bins(100_000), 3.0, 1e-4);
    }

    #[test]
    fn rejects_inverted_domain() {
        let shape = SpeShape::Gaussian {
            peak: 1.0,
            mean: 0.0,
            sd: 1.0,
            xmin: 5.0,
            xmax: -5.0,
        };
        assert!(matches!(
            shape.validate(),
            Err(ShapeError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn rejects_non_finite_domain() {
        let shape = SpeShape::Gaussian {
            peak: 1.0,
            mean: 0.0,
            sd: 1.0,
            xmin: f64::NEG_INFINITY,
            xmax: 5.0,
        };
        assert!(matches!(
            shape.validate(),
            Err(ShapeError::InvalidDomain { .. })
        ));
    }

    #[test]
    fn rejects_unordered_knots() {
        let shape = SpeShape::Tabulated {
            knots: vec![
                Knot { time: 1.0, value: 0.0 },
                Knot { time: 0.0, value: 1.0 },
            ],
        };
        assert!(matches!(shape.validate(), Err(ShapeError::UnorderedKnots)));
    }

    #[test]
    fn rejects_single_knot() {
        let shape = SpeShape::Tabulated {
            knots: vec![Knot { time: 0.0, value: 1.0 }],
        };
        assert!(matches!(shape.validate(), Err(ShapeError::TooFewKnots(1))));
    }

    #[test]
    fn rejects_zero_sd() {
        let shape = SpeShape::Gaussian {
            peak: 1.0,
            mean: 0.0,
            sd: 0.0,
            xmin: -5.0,
            xmax: 5.0,
        };
        assert!(matches!(
            shape.validate(),
            Err(ShapeError::InvalidParameter { name: "sd", .. })
        ));
    }
}
