mod output;
mod photons;
mod simulation_config;

use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result, bail};
use clap::Parser;
use metrics::counter;
use pmtsim_common::{
    EventNumber, Time,
    metrics::{
        component_info_metric,
        failures::{self, FailureKind},
        interactions::{self, InteractionKind},
        names::{
            DARK_PULSES_GENERATED, FAILURES, INTERACTIONS, PHOTOELECTRONS_GENERATED,
            PHOTONS_PROCESSED, WAVEFORMS_BUILT,
        },
    },
};
use pmtsim_response::{Pmt, WaveformGenerator, diagnostics::SummaryMetrics};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use crate::{
    photons::Scintillator,
    simulation_config::{PhotonSource, Simulation},
};

// cargo run --bin simulator -- --config configs/r11410.json --num-events 100 --save-dir Waveforms

/// [clap] derived struct to parse command line arguments.
#[derive(Debug, Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Path to the JSON simulation configuration.
    #[clap(long)]
    config: PathBuf,

    /// Base RNG seed, overriding the configuration. Event n runs on its own
    /// stream seeded with base + n, so runs reproduce bit for bit.
    #[clap(long)]
    seed: Option<u64>,

    /// Number of events to simulate, overriding the configuration.
    #[clap(long)]
    num_events: Option<usize>,

    /// Directory to write per-event waveform files into. Nothing is
    /// persisted when absent.
    #[clap(long)]
    save_dir: Option<PathBuf>,
}

/// Per-event photon supply, resolved from the configuration.
enum EventSource {
    Fixed(Vec<Time>),
    Scintillation(Scintillator),
}

impl EventSource {
    fn photon_times(&self, rng: &mut impl Rng) -> Vec<Time> {
        match self {
            Self::Fixed(times) => times.clone(),
            Self::Scintillation(scintillator) => scintillator.sample(rng),
        }
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let file = File::open(&cli.config)
        .with_context(|| format!("opening configuration {}", cli.config.display()))?;
    let simulation: Simulation =
        serde_json::from_reader(file).context("parsing configuration")?;
    if !simulation.validate() {
        counter!(
            FAILURES,
            &[failures::get_label(FailureKind::InvalidConfiguration)]
        )
        .increment(1);
        bail!("invalid simulation configuration");
    }

    // Metrics
    component_info_metric("simulator");
    metrics::describe_counter!(
        PHOTONS_PROCESSED,
        metrics::Unit::Count,
        "Number of photons fed to the response model"
    );
    metrics::describe_counter!(
        PHOTOELECTRONS_GENERATED,
        metrics::Unit::Count,
        "Number of photoelectron pulses generated"
    );
    metrics::describe_counter!(
        DARK_PULSES_GENERATED,
        metrics::Unit::Count,
        "Number of dark-count pulses generated"
    );
    metrics::describe_counter!(
        WAVEFORMS_BUILT,
        metrics::Unit::Count,
        "Number of waveforms synthesized"
    );
    metrics::describe_counter!(
        INTERACTIONS,
        metrics::Unit::Count,
        "Photon interactions by category"
    );

    let pmt = Pmt::new(simulation.pmt.clone(), simulation.shape.clone())?;
    info!("{pmt}");

    let generator = WaveformGenerator::new(pmt, simulation.out_wave)?;
    let source = match &simulation.photon_source {
        PhotonSource::Fixed { times } => EventSource::Fixed(times.clone()),
        PhotonSource::Scintillation(params) => {
            EventSource::Scintillation(Scintillator::new(params)?)
        }
    };

    let num_events = cli.num_events.unwrap_or(simulation.num_events);
    let base_seed = cli.seed.unwrap_or(simulation.seed);
    if let Some(directory) = &cli.save_dir {
        std::fs::create_dir_all(directory)
            .with_context(|| format!("creating save directory {}", directory.display()))?;
    }

    info!("simulating {num_events} events with base seed {base_seed}");

    let per_event = (0..num_events)
        .into_par_iter()
        .map_init(
            || generator.clone(),
            |generator, event| -> Result<SummaryMetrics> {
                let mut rng = StdRng::seed_from_u64(base_seed.wrapping_add(event as u64));
                let photon_times = source.photon_times(&mut rng);

                let mut metrics = SummaryMetrics::default();
                generator
                    .build(&mut rng, &photon_times, &mut metrics)
                    .with_context(|| format!("building waveform for event {event}"))?;

                counter!(PHOTONS_PROCESSED).increment(photon_times.len() as u64);
                counter!(PHOTOELECTRONS_GENERATED)
                    .increment(generator.photo_electrons().len() as u64);
                counter!(DARK_PULSES_GENERATED)
                    .increment(generator.dark_electrons().len() as u64);
                counter!(WAVEFORMS_BUILT).increment(1);

                if let Some(directory) = &cli.save_dir {
                    output::save_waveform(directory, event as EventNumber, generator.out_wave())
                        .inspect_err(|_| {
                            counter!(
                                FAILURES,
                                &[failures::get_label(FailureKind::FileWriteFailed)]
                            )
                            .increment(1);
                        })?;
                }

                debug!(
                    "event {event}: {} photons, {} photoelectrons, {} dark pulses",
                    photon_times.len(),
                    generator.photo_electrons().len(),
                    generator.dark_electrons().len()
                );
                Ok(metrics)
            },
        )
        .collect::<Result<Vec<_>>>()?;

    let mut totals = SummaryMetrics::default();
    for metrics in &per_event {
        totals.merge(metrics);
    }
    for (kind, count) in [
        (InteractionKind::PhotocathodeSingle, totals.photocathode_single),
        (InteractionKind::PhotocathodeDouble, totals.photocathode_double),
        (InteractionKind::DynodeSingle, totals.dynode_single),
        (InteractionKind::DynodeDouble, totals.dynode_double),
        (InteractionKind::NoInteraction, totals.no_interaction),
    ] {
        counter!(INTERACTIONS, &[interactions::get_label(kind)]).increment(count as u64);
    }

    info!("finished {num_events} events");
    info!("{totals}");
    Ok(())
}
