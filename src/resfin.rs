//! This module contains everything that is needed to store and query the
//! final results of an analysis run

use crate::{
    bayesian::BayesianPrior,
    errors::{FlowError, Result},
    event::PidVector,
    numeric::{functions::sqr, Float},
    resolution::{CosineSums, Resolution, ResolutionEstimate},
    selection::{FlowTable, Harmonic, Selection, SelectionTable},
    weights::{PhiHistogram, WeightTable},
};
use prefix_num_ops::real::*;

/// Bookkeeping of what went through the analysis
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunCounters {
    /// Number of analysed events
    pub events: usize,

    /// Number of particles in these events
    pub particles: usize,

    /// Number of particle contributions dropped because of malformed records
    pub skipped_particles: usize,

    /// Number of flow observable candidate contributions, over selections
    pub poi: usize,
}
//
impl RunCounters {
    /// Integrate the counts of another run fragment
    pub fn merge(&mut self, other: &Self) {
        self.events += other.events;
        self.particles += other.particles;
        self.skipped_particles += other.skipped_particles;
        self.poi += other.poi;
    }
}

/// Mean of an accumulated quantity, with its statistical error
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Measurement {
    /// Mean value
    pub value: Float,

    /// Standard error of the mean, if at least two samples were seen
    pub error: Option<Float>,

    /// Number of samples
    pub count: usize,
}
//
impl Measurement {
    /// Measure the mean of some accumulated samples
    pub fn from_sums(sums: &CosineSums) -> Option<Self> {
        sums.mean().map(|(value, error)| Self {
            value,
            error,
            count: sums.count,
        })
    }
}

/// Final results of the analysis
#[derive(Clone, Debug, PartialEq)]
pub struct FinalResults {
    /// Event plane resolution of every (selection, harmonic)
    pub resolution: FlowTable<ResolutionEstimate>,

    /// Observed flow ⟨cos(n·(φ − Ψ))⟩, not corrected for resolution
    pub observed: FlowTable<Option<Measurement>>,

    /// Mean normalized flow vector length ⟨q_n⟩ = ⟨|Q_n|/√M⟩, over the
    /// events where the selection was not empty
    pub flow_lengths: FlowTable<Option<Measurement>>,

    /// Normalized species abundances, per selection
    pub abundances: SelectionTable<PidVector>,

    /// Azimuthal distribution of the plane particles
    pub phi_histogram: PhiHistogram,

    /// Run bookkeeping
    pub counters: RunCounters,
}
//
impl FinalResults {
    /// Assemble the final results
    pub fn new(
        resolution: FlowTable<ResolutionEstimate>,
        observed: FlowTable<CosineSums>,
        flow_lengths: FlowTable<CosineSums>,
        abundances: SelectionTable<PidVector>,
        phi_histogram: PhiHistogram,
        counters: RunCounters,
    ) -> Self {
        Self {
            resolution,
            observed: observed.map(|_, _, sums| Measurement::from_sums(&sums)),
            flow_lengths: flow_lengths.map(|_, _, sums| Measurement::from_sums(&sums)),
            abundances,
            phi_histogram,
            counters,
        }
    }

    /// Resolution of some (selection, harmonic), if it could be estimated
    pub fn resolution(&self, sel: Selection, har: Harmonic) -> Result<&Resolution> {
        self.resolution[(sel, har)].value()
    }

    /// Resolution-corrected flow, v_n = v_obs / R
    pub fn corrected_flow(&self, sel: Selection, har: Harmonic) -> Result<Measurement> {
        let observed = self.observed[(sel, har)].ok_or_else(|| {
            FlowError::ResolutionUnavailable("no flow observable candidate".to_owned())
        })?;
        let resolution = self.resolution(sel, har)?;
        let r = resolution.resolution;
        let value = observed.value / r;
        let error = observed.error.map(|obs_error| {
            let res_error = resolution.error.unwrap_or(0.);
            sqrt(sqr(obs_error / r) + sqr(value * res_error / r))
        });
        Ok(Measurement {
            value,
            error,
            count: observed.count,
        })
    }

    /// Azimuthal flattening weights for a subsequent run
    pub fn phi_weights(&self, per_side: bool) -> WeightTable {
        self.phi_histogram.to_weights(per_side)
    }

    /// Bayesian abundance prior for a subsequent run
    pub fn bayesian_prior(&self) -> Result<BayesianPrior> {
        BayesianPrior::new(self.abundances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolution::UnavailableReason;
    use approx::assert_relative_eq;
    use num_traits::Zero;

    fn results(resolution: ResolutionEstimate, cosines: &[Float]) -> FinalResults {
        let mut sums = CosineSums::default();
        cosines.iter().for_each(|&c| sums.integrate(c));
        FinalResults::new(
            FlowTable::from_fn(|_, _| resolution),
            FlowTable::from_fn(|_, _| sums),
            FlowTable::default(),
            [PidVector::zero(); 2],
            PhiHistogram::new(8),
            RunCounters::default(),
        )
    }

    #[test]
    fn observed_flow_is_divided_by_the_resolution() {
        let resolution = ResolutionEstimate::Available(Resolution {
            resolution: 0.5,
            error: Some(0.01),
            chi: 0.8,
            subevent_resolution: 0.37,
            mean_cosine: 0.137,
            events: 100,
        });
        let res = results(resolution, &[0.04, 0.06]);
        let flow = res
            .corrected_flow(Selection::Poi, Harmonic::Second)
            .unwrap();
        assert_relative_eq!(flow.value, 0.1, max_relative = 1e-12);
        assert_eq!(flow.count, 2);

        // 0.01 on the observed flow and 2% on the resolution
        let expected = ((0.01 / 0.5 as Float).powi(2) + (0.1 * 0.02 as Float).powi(2)).sqrt();
        assert_relative_eq!(flow.error.unwrap(), expected, max_relative = 1e-9);
    }

    #[test]
    fn unavailable_resolutions_propagate() {
        let unavailable = ResolutionEstimate::Unavailable(UnavailableReason::NoData);
        let (sel, har) = (Selection::Default, Harmonic::First);
        let res = results(unavailable, &[0.1]);
        assert!(matches!(
            res.corrected_flow(sel, har),
            Err(FlowError::ResolutionUnavailable(_))
        ));
        assert!(res.observed[(sel, har)].is_some());

        let res = results(unavailable, &[]);
        assert!(res.observed[(sel, har)].is_none());
        assert!(res.corrected_flow(sel, har).is_err());
    }

    #[test]
    fn counters_merge_by_summing() {
        let mut counters = RunCounters {
            events: 1,
            particles: 10,
            skipped_particles: 1,
            poi: 3,
        };
        let copy = counters;
        counters.merge(&copy);
        assert_eq!(
            counters,
            RunCounters {
                events: 2,
                particles: 20,
                skipped_particles: 2,
                poi: 6
            }
        );
    }
}
