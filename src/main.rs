//! Monte Carlo driver of the flow analysis
//!
//! Generates toy events with known flow, analyses them, and prints out the
//! measured resolutions and flow coefficients. When acceptance or PID
//! corrections are requested, a first pass over the events derives their
//! calibration tables.

use eyre::WrapErr;

use flowplane::{
    analyser::{Calibration, FlowAnalyser},
    config::{AnalysisConfig, Configuration, PhiWeighting},
    evgen::EventGenerator,
    output,
    resfin::FinalResults,
    scheduling,
};

use std::time::Instant;

/// We'll use eyre's type-erased result type throughout the application
type Result<T> = eyre::Result<T>;

/// Run one analysis pass over the generated events
fn analyse_events(
    num_events: usize,
    evgen: &EventGenerator,
    analyser: &FlowAnalyser,
) -> Result<FinalResults> {
    let accumulator = scheduling::run_analysis(num_events, |batch| {
        let mut accumulator = analyser.accumulator();
        for id in batch {
            let generated = evgen.generate(id as u64);
            accumulator.integrate(analyser.analyze(&generated.event))?;
        }
        Ok(accumulator)
    })?;
    Ok(accumulator.finalize()?)
}

/// This will act as our main function, with suitable error handling
fn main() -> Result<()> {
    // ### CONFIGURATION READOUT ###
    colog::init();
    let config_file = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "valeurs".to_owned());
    let cfg = Configuration::load(&config_file).wrap_err("Failed to load the configuration")?;

    // ### ANALYSIS INITIALIZATION ###

    // Start the clock after configuration I/O, to avoid IO-induced timing
    // fluctuations
    let saved_time = Instant::now();
    let evgen = EventGenerator::new(cfg.generator, cfg.analysis.seed);

    // Calibration pass, if the analysis needs calibration tables
    let needs_phi_weights = cfg.analysis.phi_weighting != PhiWeighting::None;
    let calibration = if needs_phi_weights || cfg.analysis.bayesian_weights {
        log::info!("Running the calibration pass");
        let uncorrected = AnalysisConfig {
            phi_weighting: PhiWeighting::None,
            bayesian_weights: false,
            ..cfg.analysis.clone()
        };
        let analyser = FlowAnalyser::new(uncorrected, Calibration::default())?;
        let results = analyse_events(cfg.num_events, &evgen, &analyser)
            .wrap_err("Calibration pass failed")?;
        Calibration {
            phi_weights: needs_phi_weights
                .then(|| results.phi_weights(cfg.analysis.phi_weighting == PhiWeighting::PerSide)),
            bayesian_prior: if cfg.analysis.bayesian_weights {
                Some(results.bayesian_prior()?)
            } else {
                None
            },
        }
    } else {
        Calibration::default()
    };

    // ### ANALYSIS EXECUTION ###
    let analyser = FlowAnalyser::new(cfg.analysis.clone(), calibration)?;
    let results = analyse_events(cfg.num_events, &evgen, &analyser).wrap_err("Analysis failed")?;

    // ### RESULTS DISPLAY ###
    let elapsed_time = saved_time.elapsed();
    output::dump_results(&cfg, &results, elapsed_time).wrap_err("Failed to output the results")?;
    Ok(())
}
