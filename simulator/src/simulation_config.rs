use pmtsim_common::Time;
use pmtsim_response::{OutWaveParams, PmtParams, SpeShape};
use serde::Deserialize;
use tracing::error;

use crate::photons::ScintillationParams;

/// Where each event's photon arrival times come from.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "source-type")]
pub(crate) enum PhotonSource {
    /// The same explicit arrival times for every event.
    Fixed { times: Vec<Time> },
    /// Scintillation decay-time sampling, fresh per event.
    Scintillation(ScintillationParams),
}

impl PhotonSource {
    pub(crate) fn validate(&self) -> bool {
        match self {
            Self::Fixed { times } => {
                if times.iter().any(|t| !t.is_finite()) {
                    error!("fixed photon times must be finite");
                    return false;
                }
                true
            }
            Self::Scintillation(params) => params.validate(),
        }
    }
}

/// One simulation run, as loaded from the JSON configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub(crate) struct Simulation {
    pub(crate) pmt: PmtParams,
    pub(crate) shape: SpeShape,
    pub(crate) out_wave: OutWaveParams,
    pub(crate) photon_source: PhotonSource,
    pub(crate) num_events: usize,
    #[serde(default)]
    pub(crate) seed: u64,
}

impl Simulation {
    /// Checks the binary-level configuration; the response library
    /// re-validates its own blocks when the model is constructed.
    pub(crate) fn validate(&self) -> bool {
        if self.num_events == 0 {
            error!("num-events must be at least 1");
            return false;
        }
        self.photon_source.validate()
    }
}
