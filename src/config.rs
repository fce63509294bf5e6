//! Mechanism for loading, checking and sharing the analysis configuration

use crate::{
    errors::{FlowError, Result as FlowResult},
    evgen::{AcceptanceHole, GeneratorConfig},
    numeric::Float,
};

use eyre::{ensure, eyre, Result, WrapErr};

use std::{fs, str::FromStr};

/// How reaction-plane particles are split into two sub-events
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum SubeventPolicy {
    /// No sub-events, resolution estimation is disabled
    None,

    /// Random halves
    Random,

    /// Split by pseudorapidity sign, particles with |η| < gap/2 are left out
    Pseudorapidity {
        /// Width of the central η region left out of both halves
        gap: Float,
    },

    /// Split by charge sign, neutral particles are left out
    Charge,
}

/// Azimuthal acceptance weighting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PhiWeighting {
    /// Unweighted
    None,

    /// One weight table for the whole detector
    Combined,

    /// One weight table per detector side (positive, negative, crossing)
    PerSide,
}

/// Transverse momentum weighting
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PtWeighting {
    /// Unweighted
    None,

    /// Weight by pT, saturating at some maximal value (GeV/c)
    Linear {
        /// pT above which the weight stays constant
        saturation: Float,
    },
}

/// Pseudorapidity weighting
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EtaWeighting {
    /// Unweighted
    None,

    /// For odd harmonics, weight by |η| and flip the sign of backward
    /// particles, since directed flow is antisymmetric in η
    OddHarmonics,
}

/// What the multiplicity of a flow vector counts
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MultiplicityMode {
    /// Number of contributing particles
    Count,

    /// Sum of the absolute contribution weights
    WeightSum,
}

/// Which event plane a harmonic's resolution refers to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResolutionMode {
    /// v_n is measured with respect to the n-th harmonic plane
    SameHarmonic,

    /// v_n is measured with respect to the first harmonic plane
    MixedHarmonic,
}

/// Analysis options, validated once before the event loop starts
#[derive(Clone, Debug, PartialEq)]
pub struct AnalysisConfig {
    /// Sub-event partition policy
    pub subevents: SubeventPolicy,

    /// Azimuthal acceptance weighting
    pub phi_weighting: PhiWeighting,

    /// Transverse momentum weighting
    pub pt_weighting: PtWeighting,

    /// Pseudorapidity weighting
    pub eta_weighting: EtaWeighting,

    /// Definition of flow vector multiplicities
    pub multiplicity: MultiplicityMode,

    /// Reference plane of resolution corrections
    pub resolution: ResolutionMode,

    /// Apply the Bayesian abundance prior to particle identification
    pub bayesian_weights: bool,

    /// Seed of random sub-event partitions
    pub seed: u64,
}
//
impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            subevents: SubeventPolicy::Random,
            phi_weighting: PhiWeighting::None,
            pt_weighting: PtWeighting::None,
            eta_weighting: EtaWeighting::None,
            multiplicity: MultiplicityMode::Count,
            resolution: ResolutionMode::SameHarmonic,
            bayesian_weights: false,
            seed: 12345,
        }
    }
}
//
impl AnalysisConfig {
    /// Check that the configuration makes sense
    pub fn validate(&self) -> FlowResult<()> {
        if let SubeventPolicy::Pseudorapidity { gap } = self.subevents {
            if !gap.is_finite() || gap < 0. {
                return Err(FlowError::InvalidConfiguration(format!(
                    "pseudorapidity gap must be positive, got {gap}"
                )));
            }
        }
        if let PtWeighting::Linear { saturation } = self.pt_weighting {
            if !saturation.is_finite() || saturation <= 0. {
                return Err(FlowError::InvalidConfiguration(format!(
                    "pT weight saturation must be strictly positive, got {saturation}"
                )));
            }
        }
        Ok(())
    }

    /// Truth that sub-event resolution estimation is enabled
    pub fn has_subevents(&self) -> bool {
        self.subevents != SubeventPolicy::None
    }

    /// Log the configuration
    pub fn print(&self) {
        log::info!("Sub-events          : {:?}", self.subevents);
        log::info!("Phi weighting       : {:?}", self.phi_weighting);
        log::info!("Pt weighting        : {:?}", self.pt_weighting);
        log::info!("Eta weighting       : {:?}", self.eta_weighting);
        log::info!("Multiplicity        : {:?}", self.multiplicity);
        log::info!("Resolution          : {:?}", self.resolution);
        log::info!("Bayesian weights    : {}", self.bayesian_weights);
        log::info!("Seed                : {}", self.seed);
    }
}

impl FromStr for SubeventPolicy {
    type Err = FlowError;

    /// Parse the policy name, the η gap is configured separately
    fn from_str(s: &str) -> FlowResult<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(SubeventPolicy::None),
            "random" | "rnd" => Ok(SubeventPolicy::Random),
            "eta" => Ok(SubeventPolicy::Pseudorapidity { gap: 0. }),
            "charge" => Ok(SubeventPolicy::Charge),
            other => Err(unknown_option("sub-event policy", other)),
        }
    }
}

impl FromStr for PhiWeighting {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(PhiWeighting::None),
            "combined" | "one" => Ok(PhiWeighting::Combined),
            "per-side" | "sides" => Ok(PhiWeighting::PerSide),
            other => Err(unknown_option("phi weighting", other)),
        }
    }
}

impl FromStr for EtaWeighting {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s.to_lowercase().as_str() {
            "none" => Ok(EtaWeighting::None),
            "odd" => Ok(EtaWeighting::OddHarmonics),
            other => Err(unknown_option("eta weighting", other)),
        }
    }
}

impl FromStr for MultiplicityMode {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s.to_lowercase().as_str() {
            "count" => Ok(MultiplicityMode::Count),
            "weights" => Ok(MultiplicityMode::WeightSum),
            other => Err(unknown_option("multiplicity mode", other)),
        }
    }
}

impl FromStr for ResolutionMode {
    type Err = FlowError;

    fn from_str(s: &str) -> FlowResult<Self> {
        match s.to_lowercase().as_str() {
            "same" => Ok(ResolutionMode::SameHarmonic),
            "mixed" => Ok(ResolutionMode::MixedHarmonic),
            other => Err(unknown_option("resolution mode", other)),
        }
    }
}

fn unknown_option(what: &str, value: &str) -> FlowError {
    FlowError::InvalidConfiguration(format!("unknown {what} '{value}'"))
}

/// Configuration of a complete run of the driver
pub struct Configuration {
    /// Number of events to be generated and analyzed
    pub num_events: usize,

    /// Toy event generator settings
    pub generator: GeneratorConfig,

    /// Flow analysis settings
    pub analysis: AnalysisConfig,
}
//
impl Configuration {
    /// Load the configuration from a file, check it, and print it out
    pub fn load(file_name: &str) -> Result<Self> {
        // Read out the configuration file or die trying.
        let config_str = fs::read_to_string(file_name)
            .wrap_err_with(|| format!("Could not read configuration file {file_name}"))?;

        // Configuration items are the first non-whitespace chunk of text on
        // each line, in a fixed order. Blank lines are ignored.
        let mut config_iter = config_str
            .lines()
            .filter_map(|line| line.split_whitespace().next());

        // This closure fetches the next configuration item, tagging it with
        // the name of the configuration field which it is supposed to fill to
        // ease error reporting, and handling unexpected end-of-file too.
        let mut next_item = |name: &'static str| -> Result<ConfigItem> {
            config_iter
                .next()
                .map(|data| ConfigItem::new(name, data))
                .ok_or_else(|| eyre!("Missing configuration of {}", name))
        };

        // Decode the configuration items into concrete values
        let num_events = next_item("num_events")?.parse::<usize>()?;
        let multiplicity = next_item("multiplicity")?.parse::<usize>()?;
        let v1 = next_item("v1")?.parse::<Float>()?;
        let v2 = next_item("v2")?.parse::<Float>()?;
        let hole_phi_min = next_item("hole_phi_min")?.parse::<Float>()?;
        let hole_phi_max = next_item("hole_phi_max")?.parse::<Float>()?;
        let hole_efficiency = next_item("hole_efficiency")?.parse::<Float>()?;
        let mut subevents = next_item("subevents")?.parse::<SubeventPolicy>()?;
        let eta_gap = next_item("eta_gap")?.parse::<Float>()?;
        let phi_weighting = next_item("phi_weighting")?.parse::<PhiWeighting>()?;
        let pt_saturation = next_item("pt_saturation")?.parse::<Float>()?;
        let eta_weighting = next_item("eta_weighting")?.parse::<EtaWeighting>()?;
        let multiplicity_mode = next_item("multiplicity_mode")?.parse::<MultiplicityMode>()?;
        let resolution = next_item("resolution_mode")?.parse::<ResolutionMode>()?;
        let bayesian_weights = next_item("bayesian_weights")?.parse_bool()?;
        let seed = next_item("seed")?.parse::<u64>()?;

        if let SubeventPolicy::Pseudorapidity { ref mut gap } = subevents {
            *gap = eta_gap;
        }
        let config = Configuration {
            num_events,
            generator: GeneratorConfig {
                multiplicity,
                v1,
                v2,
                acceptance_hole: (hole_phi_max > hole_phi_min).then_some(AcceptanceHole {
                    phi_min: hole_phi_min,
                    phi_max: hole_phi_max,
                    efficiency: hole_efficiency,
                }),
            },
            analysis: AnalysisConfig {
                subevents,
                phi_weighting,
                pt_weighting: if pt_saturation > 0. {
                    PtWeighting::Linear {
                        saturation: pt_saturation,
                    }
                } else {
                    PtWeighting::None
                },
                eta_weighting,
                multiplicity: multiplicity_mode,
                resolution,
                bayesian_weights,
                seed,
            },
        };

        // Display it
        config.print();

        // A sensible run must analyze at least one event
        ensure!(config.num_events > 0, "Please analyze at least one event");

        // Flow vectors of a single particle carry no plane information
        ensure!(
            config.generator.multiplicity >= 2,
            "Please generate at least two particles per event"
        );

        // Anisotropies summing above 1/2 make the φ distribution negative somewhere
        ensure!(
            config.generator.v1.abs() + config.generator.v2.abs() <= 0.5,
            "Flow coefficients are too large for a positive azimuthal distribution"
        );
        ensure!(
            (0. ..=1.).contains(&hole_efficiency),
            "The acceptance hole efficiency must lie between 0 and 1"
        );

        // If nothing bad occured, check the analysis part and we're done
        config.analysis.validate()?;
        Ok(config)
    }

    /// Display the configuration
    pub fn print(&self) {
        log::info!("Events              : {}", self.num_events);
        log::info!("Multiplicity        : {}", self.generator.multiplicity);
        log::info!("v1                  : {}", self.generator.v1);
        log::info!("v2                  : {}", self.generator.v2);
        log::info!("Acceptance hole     : {:?}", self.generator.acceptance_hole);
        self.analysis.print();
    }
}

/// A value from the configuration file, tagged with the struct field which it
/// is supposed to map for error reporting purposes.
struct ConfigItem<'data> {
    name: &'static str,
    data: &'data str,
}
//
impl<'data> ConfigItem<'data> {
    /// Build a config item from a struct field tag and raw iterator data
    fn new(name: &'static str, data: &'data str) -> Self {
        Self { name, data }
    }

    /// Parse this data using Rust's standard parsing logic
    fn parse<T: FromStr>(self) -> Result<T>
    where
        <T as FromStr>::Err: std::error::Error + Send + Sync + 'static,
    {
        self.data
            .parse::<T>()
            .wrap_err_with(|| format!("Could not parse configuration of {}", self.name))
    }

    /// Parse this data using special logic which handles Fortran's bool syntax
    fn parse_bool(self) -> Result<bool> {
        match self.data.to_lowercase().as_str() {
            ".true." => Ok(true),
            ".false." => Ok(false),
            _ => self.parse::<bool>(),
        }
    }
}
