//! This module allows integrating analysis results across events

use crate::{
    analyser::EventContribution,
    bayesian::BayesianPidReweighter,
    config::AnalysisConfig,
    errors::{FlowError, Result},
    resfin::{FinalResults, RunCounters},
    resolution::{CosineSums, ResolutionEstimator},
    selection::{FlowTable, Harmonic, Selection},
    weights::{PhiHistogram, DEFAULT_PHI_BINS},
};

/// This struct accumulates intermediary results during the event loop, and
/// ultimately computes the final results (see FinalResults)
///
/// Every accumulated quantity is a sum, so accumulators of disjoint sets of
/// events can be merged in any order.
///
#[derive(Clone, Debug, PartialEq)]
pub struct ResultsAccumulator {
    /// Sub-event correlations
    resolution: ResolutionEstimator,

    /// Observed flow of the flow observable candidates
    observed: FlowTable<CosineSums>,

    /// Normalized lengths q_n of the full event flow vectors
    flow_lengths: FlowTable<CosineSums>,

    /// Running species abundances
    abundances: BayesianPidReweighter,

    /// Azimuthal distribution of the plane particles
    phi_histogram: PhiHistogram,

    /// Number of events, particles...
    counters: RunCounters,
}
//
impl ResultsAccumulator {
    /// Prepare for results integration
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            resolution: ResolutionEstimator::new(config.resolution),
            observed: FlowTable::default(),
            flow_lengths: FlowTable::default(),
            abundances: BayesianPidReweighter::new(),
            phi_histogram: PhiHistogram::new(DEFAULT_PHI_BINS),
            counters: RunCounters::default(),
        }
    }

    /// Integrate one event's contribution into the run results
    #[allow(clippy::needless_pass_by_value)]
    pub fn integrate(&mut self, contribution: EventContribution) -> Result<()> {
        self.resolution.integrate(&contribution.flow)?;
        self.observed
            .zip_with(contribution.observed, |mine, theirs| mine.merge(&theirs));
        for sel in Selection::ALL {
            for har in Harmonic::ALL {
                if let Some(q) = contribution.flow.full[(sel, har)].normalized_length() {
                    self.flow_lengths[(sel, har)].integrate(q);
                }
            }
        }
        for sel in Selection::ALL {
            self.abundances
                .accumulate(sel, &contribution.pid_sums[sel.index()]);
        }
        for (side, phi) in contribution.phi_entries {
            self.phi_histogram.fill(side, phi);
        }
        self.counters.events += 1;
        self.counters.particles += contribution.particles;
        self.counters.skipped_particles += contribution.skipped_particles;
        self.counters.poi += contribution.poi;
        Ok(())
    }

    /// Integrate analysis results from another ResultsAccumulator
    pub fn merge(&mut self, other: Self) -> Result<()> {
        self.resolution.merge(other.resolution)?;
        self.observed
            .zip_with(other.observed, |mine, theirs| mine.merge(&theirs));
        self.flow_lengths
            .zip_with(other.flow_lengths, |mine, theirs| mine.merge(&theirs));
        self.abundances.merge(other.abundances);
        self.phi_histogram.merge(other.phi_histogram);
        self.counters.merge(&other.counters);
        Ok(())
    }

    /// Number of events integrated so far
    pub fn num_events(&self) -> usize {
        self.counters.events
    }

    /// Turn integrated analysis data into finalized results
    pub fn finalize(mut self) -> Result<FinalResults> {
        if self.counters.events == 0 {
            return Err(FlowError::NoEventsAccumulated);
        }
        self.resolution.finish()?;
        log::info!(
            "Finalized {} events ({} particles, {} skipped contributions)",
            self.counters.events,
            self.counters.particles,
            self.counters.skipped_particles
        );
        Ok(FinalResults::new(
            self.resolution.into_estimates()?,
            self.observed,
            self.flow_lengths,
            Selection::ALL.map(|sel| self.abundances.abundance(sel)),
            self.phi_histogram,
            self.counters,
        ))
    }
}
