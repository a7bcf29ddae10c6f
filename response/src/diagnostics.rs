use std::fmt::Display;

use crate::pmt::Interaction;

/// Sink for per-build diagnostic quantities. The response model writes
/// category tallies and pulse areas through this; nothing in the core reads
/// them back.
pub trait ResponseMetrics {
    fn record_interaction(&mut self, interaction: Interaction);

    /// Pulse area in mV*ns, i.e. amplitude times the shape area.
    fn record_pulse_area(&mut self, area: f64);
}

/// Discards everything recorded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMetrics;

impl ResponseMetrics for NullMetrics {
    fn record_interaction(&mut self, _interaction: Interaction) {}

    fn record_pulse_area(&mut self, _area: f64) {}
}

/// Accumulates interaction tallies and pulse areas across builds.
#[derive(Debug, Default, Clone)]
pub struct SummaryMetrics {
    pub photocathode_single: usize,
    pub photocathode_double: usize,
    pub dynode_single: usize,
    pub dynode_double: usize,
    pub no_interaction: usize,
    pub pulse_areas: Vec<f64>,
}

impl SummaryMetrics {
    /// Photons processed, over all categories.
    pub fn photons(&self) -> usize {
        self.photocathode_single
            + self.photocathode_double
            + self.dynode_single
            + self.dynode_double
            + self.no_interaction
    }

    /// Photoelectrons produced by those photons.
    pub fn photoelectrons(&self) -> usize {
        self.photocathode_single
            + 2 * self.photocathode_double
            + self.dynode_single
            + 2 * self.dynode_double
    }

    pub fn mean_pulse_area(&self) -> Option<f64> {
        if self.pulse_areas.is_empty() {
            return None;
        }
        Some(self.pulse_areas.iter().sum::<f64>() / self.pulse_areas.len() as f64)
    }

    /// Fold another summary in, for combining per-worker tallies.
    pub fn merge(&mut self, other: &SummaryMetrics) {
        self.photocathode_single += other.photocathode_single;
        self.photocathode_double += other.photocathode_double;
        self.dynode_single += other.dynode_single;
        self.dynode_double += other.dynode_double;
        self.no_interaction += other.no_interaction;
        self.pulse_areas.extend_from_slice(&other.pulse_areas);
    }
}

impl ResponseMetrics for SummaryMetrics {
    fn record_interaction(&mut self, interaction: Interaction) {
        match interaction {
            Interaction::PhotocathodeSingle => self.photocathode_single += 1,
            Interaction::PhotocathodeDouble => self.photocathode_double += 1,
            Interaction::DynodeSingle => self.dynode_single += 1,
            Interaction::DynodeDouble => self.dynode_double += 1,
            Interaction::NoInteraction => self.no_interaction += 1,
        }
    }

    fn record_pulse_area(&mut self, area: f64) {
        self.pulse_areas.push(area);
    }
}

impl Display for SummaryMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "photons          = {}", self.photons())?;
        writeln!(f, "  1 phe at pc    = {}", self.photocathode_single)?;
        writeln!(f, "  2 phe at pc    = {}", self.photocathode_double)?;
        writeln!(f, "  1 phe at 1d    = {}", self.dynode_single)?;
        writeln!(f, "  2 phe at 1d    = {}", self.dynode_double)?;
        writeln!(f, "  no interaction = {}", self.no_interaction)?;
        writeln!(f, "photoelectrons   = {}", self.photoelectrons())?;
        match self.mean_pulse_area() {
            Some(mean) => writeln!(f, "mean pulse area  = {mean:.3} mV*ns"),
            None => writeln!(f, "mean pulse area  = n/a"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn tallies_by_category() {
        let mut metrics = SummaryMetrics::default();
        metrics.record_interaction(Interaction::PhotocathodeSingle);
        metrics.record_interaction(Interaction::PhotocathodeDouble);
        metrics.record_interaction(Interaction::DynodeDouble);
        metrics.record_interaction(Interaction::NoInteraction);

        assert_eq!(metrics.photons(), 4);
        assert_eq!(metrics.photoelectrons(), 1 + 2 + 2);
    }

    #[test]
    fn mean_pulse_area() {
        let mut metrics = SummaryMetrics::default();
        assert!(metrics.mean_pulse_area().is_none());
        metrics.record_pulse_area(8.0);
        metrics.record_pulse_area(12.0);
        assert_approx_eq!(metrics.mean_pulse_area().unwrap(), 10.0);
    }

    #[test]
    fn merge_combines_worker_tallies() {
        let mut a = SummaryMetrics::default();
        a.record_interaction(Interaction::PhotocathodeSingle);
        a.record_pulse_area(1.0);

        let mut b = SummaryMetrics::default();
        b.record_interaction(Interaction::DynodeSingle);
        b.record_interaction(Interaction::NoInteraction);
        b.record_pulse_area(3.0);

        a.merge(&b);
        assert_eq!(a.photons(), 3);
        assert_eq!(a.pulse_areas, vec![1.0, 3.0]);
    }
}
