//! This module is in charge of outputting the final analysis results to the
//! standard output

use crate::{
    config::Configuration,
    event::Species,
    numeric::Float,
    resfin::{FinalResults, Measurement},
    resolution::ResolutionEstimate,
    selection::{Harmonic, Selection},
};
use eyre::{Result, WrapErr};
use time::{format_description, OffsetDateTime};

use std::time::Duration;

/// Format of the end-of-run timestamp
const TIMESTAMP_FORMAT: &str =
    "[day]-[month repr:short]-[year repr:last_two]   [hour]:[minute]:[second]";

/// Output the analysis results to the console
pub fn dump_results(
    cfg: &Configuration,
    res_fin: &FinalResults,
    elapsed_time: Duration,
) -> Result<()> {
    // Compute a timestamp of when the run ended
    let format =
        format_description::parse(TIMESTAMP_FORMAT).wrap_err("Invalid timestamp format")?;
    let timestamp = OffsetDateTime::now_utc()
        .format(&format)
        .wrap_err("Failed to format the timestamp")?;

    println!();
    println!("{timestamp}");
    println!("---------------------------------------------");
    let counters = &res_fin.counters;
    println!("Events analysed          : {}", counters.events);
    println!("Particles                : {}", counters.particles);
    println!("Skipped contributions    : {}", counters.skipped_particles);
    println!("Flow observable entries  : {}", counters.poi);
    let elapsed_secs = elapsed_time.as_secs_f64() as Float;
    println!("Elapsed time (s)         : {elapsed_secs:.3}");
    println!(
        "Time per event (s)       : {:.3e}",
        elapsed_secs / cfg.num_events as Float
    );
    println!(
        "Generated v1, v2         : {}, {}",
        cfg.generator.v1, cfg.generator.v2
    );

    for sel in Selection::ALL {
        println!();
        println!("Selection {sel}");
        println!(" n : resolution (error)   chi   v_obs (error)   v_n (error)   <q_n>");
        for har in Harmonic::ALL {
            let resolution = match &res_fin.resolution[(sel, har)] {
                ResolutionEstimate::Available(res) => format!(
                    "{:.5} ({})   {:>8.4}",
                    res.resolution,
                    format_error(res.error),
                    res.chi
                ),
                ResolutionEstimate::Unavailable(reason) => format!("unavailable: {reason}"),
            };
            let observed = res_fin.observed[(sel, har)]
                .map(format_measurement)
                .unwrap_or_else(|| "-".to_owned());
            let corrected = res_fin
                .corrected_flow(sel, har)
                .map(format_measurement)
                .unwrap_or_else(|_| "-".to_owned());
            let flow_length = res_fin.flow_lengths[(sel, har)]
                .map(|q| format!("{:.4}", q.value))
                .unwrap_or_else(|| "-".to_owned());
            println!(" {har} : {resolution}   {observed}   {corrected}   {flow_length}");
        }

        print!(" abundances :");
        let abundances = &res_fin.abundances[sel.index()];
        for species in Species::ALL {
            print!(" {}={:.4}", species.name(), abundances[species.index()]);
        }
        println!();
    }
    println!();
    Ok(())
}

/// Display a measurement with its error
fn format_measurement(measurement: Measurement) -> String {
    format!(
        "{:+.5} ({})",
        measurement.value,
        format_error(measurement.error)
    )
}

/// Display an optional statistical error
fn format_error(error: Option<Float>) -> String {
    error.map_or_else(|| "n/a".to_owned(), |e| format!("{e:.1e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_format_is_valid() {
        assert!(format_description::parse(TIMESTAMP_FORMAT).is_ok());
    }

    #[test]
    fn measurements_are_formatted_with_errors() {
        let m = Measurement {
            value: 0.05,
            error: None,
            count: 1,
        };
        assert_eq!(format_measurement(m), "+0.05000 (n/a)");
        assert_eq!(format_error(Some(0.00123)), "1.2e-3");
    }
}
