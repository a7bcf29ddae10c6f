use metrics::{describe_gauge, gauge};

pub fn component_info_metric(name: &'static str) {
    static NAME: &str = "pmt_sim_component_info";

    describe_gauge!(NAME, "Basic information about the component");

    let git_rev = option_env!("GIT_VERSION").unwrap_or("unknown");
    gauge!(NAME, "component" => name, "git_version" => git_rev).set(1);
}

pub mod names {
    pub const METRIC_NAME_PREFIX: &str = "pmt_sim_";

    pub const PHOTONS_PROCESSED: &str = "pmt_sim_photons_processed";
    pub const PHOTOELECTRONS_GENERATED: &str = "pmt_sim_photoelectrons_generated";
    pub const DARK_PULSES_GENERATED: &str = "pmt_sim_dark_pulses_generated";
    pub const WAVEFORMS_BUILT: &str = "pmt_sim_waveforms_built";
    pub const INTERACTIONS: &str = "pmt_sim_interactions";
    pub const FAILURES: &str = "pmt_sim_failures";
}

pub mod interactions {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum InteractionKind {
        PhotocathodeSingle,
        PhotocathodeDouble,
        DynodeSingle,
        DynodeDouble,
        NoInteraction,
    }

    // Label building function
    pub fn get_label(interaction_kind: InteractionKind) -> (&'static str, &'static str) {
        (
            "interaction_kind",
            match interaction_kind {
                InteractionKind::PhotocathodeSingle => "photocathode_single",
                InteractionKind::PhotocathodeDouble => "photocathode_double",
                InteractionKind::DynodeSingle => "dynode_single",
                InteractionKind::DynodeDouble => "dynode_double",
                InteractionKind::NoInteraction => "no_interaction",
            },
        )
    }
}

pub mod failures {
    #[derive(Debug, Clone, Eq, Hash, PartialEq)]
    pub enum FailureKind {
        InvalidConfiguration,
        FileWriteFailed,
    }

    // Label building function
    pub fn get_label(failure_kind: FailureKind) -> (&'static str, &'static str) {
        (
            "failure_kind",
            match failure_kind {
                FailureKind::InvalidConfiguration => "invalid_configuration",
                FailureKind::FileWriteFailed => "file_write_failed",
            },
        )
    }
}
