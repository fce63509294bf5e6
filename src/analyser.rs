//! Per-event orchestration of the flow analysis
//!
//! The analyser turns one event's particle sample into an `EventContribution`
//! (flow vectors, observed flow, corrected PID probabilities, acceptance
//! histogram entries), which the run accumulator then integrates. Nothing in
//! here depends on other events, so events can be analysed in any order and
//! on any thread.

use crate::{
    bayesian::{BayesianPidReweighter, BayesianPrior},
    config::{AnalysisConfig, PhiWeighting, ResolutionMode},
    errors::{FlowError, Result},
    event::{DetectorSide, Event, Particle, PidVector},
    flowvec::{EventFlow, FlowVectorBuilder},
    numeric::Float,
    resacc::ResultsAccumulator,
    resfin::FinalResults,
    resolution::CosineSums,
    scheduling,
    selection::{FlowTable, Harmonic, Selection, SelectionTable, NUM_SELECTIONS},
    weights::WeightTable,
};
use num_traits::Zero;

/// Calibration tables, loaded once before the event loop
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Calibration {
    /// Azimuthal acceptance weights
    pub phi_weights: Option<WeightTable>,

    /// Species abundance prior of the Bayesian PID correction
    pub bayesian_prior: Option<BayesianPrior>,
}

/// Everything that one event contributes to the run results
#[derive(Clone, Debug, PartialEq)]
pub struct EventContribution {
    /// Flow vectors of the event
    pub flow: EventFlow,

    /// cos(n·(φ − Ψ)) of the event's flow observable candidates
    pub observed: FlowTable<CosineSums>,

    /// Summed (possibly Bayes-corrected) PID probabilities, per selection
    pub pid_sums: SelectionTable<PidVector>,

    /// Detector side and azimuth of the default selection's plane particles
    pub phi_entries: Vec<(DetectorSide, Float)>,

    /// Number of particles in the event
    pub particles: usize,

    /// Number of particle contributions dropped because of malformed records
    pub skipped_particles: usize,

    /// Number of flow observable candidate contributions
    pub poi: usize,
}

/// Flow analysis of a run, configured and calibrated once
pub struct FlowAnalyser {
    /// Analysis configuration
    config: AnalysisConfig,

    /// Calibration tables
    calibration: Calibration,
}
//
impl FlowAnalyser {
    /// Set up an analysis, checking that the configuration is valid and
    /// that every calibration table it needs was provided
    pub fn new(config: AnalysisConfig, calibration: Calibration) -> Result<Self> {
        config.validate()?;
        match (&config.phi_weighting, &calibration.phi_weights) {
            (PhiWeighting::None, _) => {}
            (_, None) => return Err(FlowError::MissingCalibration("phi weights")),
            (PhiWeighting::Combined, Some(WeightTable::PerSide { .. })) => {
                return Err(FlowError::MissingCalibration("combined phi weights"));
            }
            (PhiWeighting::PerSide, Some(WeightTable::Combined(_))) => {
                return Err(FlowError::MissingCalibration("per-side phi weights"));
            }
            _ => {}
        }
        if config.bayesian_weights && calibration.bayesian_prior.is_none() {
            return Err(FlowError::MissingCalibration("bayesian prior"));
        }
        Ok(Self { config, calibration })
    }

    /// Analysis configuration
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Azimuthal weights in use, if any
    fn phi_weights(&self) -> Option<&WeightTable> {
        match self.config.phi_weighting {
            PhiWeighting::None => None,
            PhiWeighting::Combined | PhiWeighting::PerSide => self.calibration.phi_weights.as_ref(),
        }
    }

    /// Flow vector builder matching this analysis
    fn builder(&self) -> FlowVectorBuilder<'_> {
        FlowVectorBuilder::new(&self.config, self.phi_weights())
    }

    /// Compute the flow vectors of an event
    pub fn flow(&self, event: &Event) -> EventFlow {
        self.builder().build(event)
    }

    /// PID probabilities of a particle in some selection, Bayes-corrected if
    /// the analysis was configured to do so
    ///
    /// Returns None if the particle carries no PID information, and an error
    /// if its PID information is unusable.
    ///
    pub fn particle_pid(&self, particle: &Particle, sel: Selection) -> Result<Option<PidVector>> {
        let Some(raw) = particle.pid else {
            return Ok(None);
        };
        if raw.iter().any(|p| !p.is_finite() || *p < 0.) {
            return Err(FlowError::MalformedParticleRecord("pid"));
        }
        Ok(Some(match (&self.calibration.bayesian_prior, self.config.bayesian_weights) {
            (Some(prior), true) => BayesianPidReweighter::reweight(&raw, prior.get(sel)),
            _ => raw,
        }))
    }

    /// Analyse one event
    pub fn analyze(&self, event: &Event) -> EventContribution {
        let builder = self.builder();
        let flow = self.flow(event);
        let mode = self.config.multiplicity;
        let mut observed = FlowTable::<CosineSums>::default();
        let mut pid_sums = [PidVector::zero(); NUM_SELECTIONS];
        let mut phi_entries = Vec::new();
        let mut skipped_particles = flow.skipped.iter().sum::<usize>();
        let mut poi = 0;

        for particle in &event.particles {
            // Particles without a usable azimuth were already accounted for
            // by the flow vector builder, if they were plane particles
            let phi = particle.azimuth().ok();

            for sel in Selection::ALL {
                if !(particle.is_rp(sel) || particle.is_poi(sel)) {
                    continue;
                }
                match self.particle_pid(particle, sel) {
                    Ok(Some(pid)) => pid_sums[sel.index()] += pid,
                    Ok(None) => {}
                    Err(e) => {
                        log::debug!(
                            "Event {}: ignoring PID of particle in {sel} selection: {e}",
                            event.id
                        );
                        skipped_particles += 1;
                    }
                }

                let Some(phi) = phi else {
                    if particle.is_poi(sel) && !particle.is_rp(sel) {
                        skipped_particles += 1;
                    }
                    continue;
                };
                if sel == Selection::Default && particle.is_rp(sel) {
                    phi_entries.push((particle.side, phi));
                }
                if !particle.is_poi(sel) {
                    continue;
                }

                poi += 1;
                let in_plane = particle.is_rp(sel) && builder.usable_azimuth(particle).is_ok();
                for har in Harmonic::ALL {
                    let plane_harmonic = match self.config.resolution {
                        ResolutionMode::SameHarmonic => har,
                        ResolutionMode::MixedHarmonic => Harmonic::First,
                    };

                    // Take the particle's own contribution out of the plane
                    // to avoid correlating it with itself
                    let q = &flow.full[(sel, plane_harmonic)];
                    let reference = if in_plane {
                        match builder.particle_weight(particle, phi, plane_harmonic) {
                            Ok(weight) => q.without(phi, plane_harmonic, weight, mode),
                            Err(_) => *q,
                        }
                    } else {
                        *q
                    };

                    match reference.plane_angle(plane_harmonic) {
                        Ok(psi) => {
                            let n = har.order() as Float;
                            observed[(sel, har)].integrate((n * (phi - psi)).cos());
                        }
                        Err(e) => log::debug!(
                            "Event {}: no {sel} reference plane for harmonic {har}: {e}",
                            event.id
                        ),
                    }
                }
            }
        }

        EventContribution {
            flow,
            observed,
            pid_sums,
            phi_entries,
            particles: event.particles.len(),
            skipped_particles,
            poi,
        }
    }

    /// Set up an empty accumulator matching this analysis
    pub fn accumulator(&self) -> ResultsAccumulator {
        ResultsAccumulator::new(&self.config)
    }

    /// Analyse a sequence of events into an accumulator
    pub fn accumulate<'a>(
        &self,
        events: impl IntoIterator<Item = &'a Event>,
    ) -> Result<ResultsAccumulator> {
        let mut accumulator = self.accumulator();
        for event in events {
            accumulator.integrate(self.analyze(event))?;
        }
        Ok(accumulator)
    }

    /// Analyse a whole run and finalize its results
    pub fn run(&self, events: &[Event]) -> Result<FinalResults> {
        if events.is_empty() {
            return Err(FlowError::NoEventsAccumulated);
        }
        let accumulator =
            scheduling::run_analysis(events.len(), |batch| self.accumulate(&events[batch]))?;
        accumulator.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SubeventPolicy, numeric::reals::consts::PI, weights::PhiWeights};
    use approx::assert_relative_eq;

    fn pid(values: &[Float]) -> PidVector {
        let mut v = PidVector::zero();
        v.iter_mut().zip(values).for_each(|(dst, src)| *dst = *src);
        v
    }

    #[test]
    fn missing_calibration_is_fatal() {
        let config = AnalysisConfig {
            phi_weighting: PhiWeighting::Combined,
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            FlowAnalyser::new(config.clone(), Calibration::default()),
            Err(FlowError::MissingCalibration(_))
        ));

        let per_side = WeightTable::PerSide {
            positive: PhiWeights::uniform(4),
            negative: PhiWeights::uniform(4),
            cross: PhiWeights::uniform(4),
        };
        let calibration = Calibration {
            phi_weights: Some(per_side),
            bayesian_prior: None,
        };
        assert!(FlowAnalyser::new(config, calibration.clone()).is_err());
        let config = AnalysisConfig {
            phi_weighting: PhiWeighting::PerSide,
            ..AnalysisConfig::default()
        };
        assert!(FlowAnalyser::new(config, calibration).is_ok());

        let config = AnalysisConfig {
            bayesian_weights: true,
            ..AnalysisConfig::default()
        };
        assert_eq!(
            FlowAnalyser::new(config, Calibration::default()).err(),
            Some(FlowError::MissingCalibration("bayesian prior"))
        );
    }

    #[test]
    fn invalid_configuration_is_fatal() {
        let config = AnalysisConfig {
            subevents: SubeventPolicy::Pseudorapidity { gap: -1. },
            ..AnalysisConfig::default()
        };
        assert!(matches!(
            FlowAnalyser::new(config, Calibration::default()),
            Err(FlowError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn pid_is_corrected_with_the_calibration_prior() {
        let prior = BayesianPrior::new([pid(&[0.1, 0.9]), pid(&[1., 1.])]).unwrap();
        let config = AnalysisConfig {
            bayesian_weights: true,
            ..AnalysisConfig::default()
        };
        let calibration = Calibration {
            phi_weights: None,
            bayesian_prior: Some(prior),
        };
        let analyser = FlowAnalyser::new(config, calibration).unwrap();

        let mut particle = Particle::new(0.5, 1., 0.1, 1);
        assert_eq!(
            analyser.particle_pid(&particle, Selection::Default),
            Ok(None)
        );
        particle.pid = Some(pid(&[0.9, 0.1]));
        let corrected = analyser
            .particle_pid(&particle, Selection::Default)
            .unwrap()
            .unwrap();
        assert_relative_eq!(corrected[0], 0.5, max_relative = 1e-12);
        let corrected = analyser
            .particle_pid(&particle, Selection::Poi)
            .unwrap()
            .unwrap();
        assert_relative_eq!(corrected[0], 0.9, max_relative = 1e-12);

        particle.pid = Some(pid(&[Float::NAN]));
        assert_eq!(
            analyser.particle_pid(&particle, Selection::Default),
            Err(FlowError::MalformedParticleRecord("pid"))
        );
    }

    #[test]
    fn observed_flow_excludes_autocorrelations() {
        let analyser =
            FlowAnalyser::new(AnalysisConfig::default(), Calibration::default()).unwrap();

        // With the particle itself removed, a two-particle event correlates
        // each particle with the other one only
        let event = Event::new(
            0,
            vec![
                Particle::new(0.2, 1., 0.5, 1),
                Particle::new(0.2 + PI / 2., 1., -0.5, -1),
            ],
        );
        let contribution = analyser.analyze(&event);
        let first = contribution.observed[(Selection::Default, Harmonic::First)];
        assert_eq!(first.count, 2);
        assert_relative_eq!(first.sum, 0., epsilon = 1e-12);
        let second = contribution.observed[(Selection::Default, Harmonic::Second)];
        assert_relative_eq!(
            second.sum / second.count as Float,
            -1.,
            max_relative = 1e-12
        );
        assert_eq!(contribution.poi, 4);
        assert_eq!(contribution.particles, 2);
        assert_eq!(contribution.phi_entries.len(), 2);
    }

    #[test]
    fn poi_outside_the_plane_see_the_full_vector() {
        let analyser =
            FlowAnalyser::new(AnalysisConfig::default(), Calibration::default()).unwrap();
        let mut particles = (0..10)
            .map(|_| Particle::new(1., 1., 0.3, 1))
            .collect::<Vec<_>>();
        for particle in &mut particles {
            particle.poi = [false; NUM_SELECTIONS];
        }
        let mut candidate = Particle::new(1. + PI, 1., 0.3, 1);
        candidate.rp = [false; NUM_SELECTIONS];
        particles.push(candidate);

        let contribution = analyser.analyze(&Event::new(3, particles));
        let obs = contribution.observed[(Selection::Poi, Harmonic::First)];
        assert_eq!(obs.count, 1);
        assert_relative_eq!(obs.sum, -1., max_relative = 1e-12);
        let obs = contribution.observed[(Selection::Poi, Harmonic::Second)];
        assert_relative_eq!(obs.sum, 1., max_relative = 1e-12);
    }

    #[test]
    fn candidates_left_out_of_the_plane_are_not_removed_from_it() {
        let config = AnalysisConfig {
            subevents: SubeventPolicy::Pseudorapidity { gap: 0.1 },
            ..AnalysisConfig::default()
        };
        let analyser = FlowAnalyser::new(config, Calibration::default()).unwrap();
        let mut particles = (0..5)
            .map(|_| Particle::new(0.4, 1., 0.3, 1))
            .collect::<Vec<_>>();
        for particle in &mut particles {
            particle.poi = [false; NUM_SELECTIONS];
        }
        // Without η, the candidate cannot enter the η-split plane
        particles.push(Particle::new(0.4 + PI / 2., 1., Float::NAN, 1));

        let contribution = analyser.analyze(&Event::new(0, particles));
        assert_eq!(contribution.flow.skipped, [1, 1]);
        let first = contribution.observed[(Selection::Default, Harmonic::First)];
        assert_eq!(first.count, 1);
        assert_relative_eq!(first.sum, 0., epsilon = 1e-12);
    }

    #[test]
    fn mixed_harmonic_mode_uses_the_first_harmonic_plane() {
        let config = AnalysisConfig {
            resolution: ResolutionMode::MixedHarmonic,
            ..AnalysisConfig::default()
        };
        let analyser = FlowAnalyser::new(config, Calibration::default()).unwrap();
        let mut particles = (0..5)
            .map(|_| Particle::new(0.4, 1., 0.3, 1))
            .collect::<Vec<_>>();
        let mut candidate = Particle::new(0.4 + PI / 2., 1., 0.3, 1);
        candidate.rp = [false; NUM_SELECTIONS];
        particles.push(candidate);
        for particle in particles.iter_mut().take(5) {
            particle.poi = [false; NUM_SELECTIONS];
        }

        let contribution = analyser.analyze(&Event::new(0, particles));
        let second = contribution.observed[(Selection::Default, Harmonic::Second)];
        assert_relative_eq!(second.sum, -1., max_relative = 1e-12);
        let fourth = contribution.observed[(Selection::Default, Harmonic::Fourth)];
        assert_relative_eq!(fourth.sum, 1., max_relative = 1e-12);
    }

    #[test]
    fn empty_runs_are_rejected() {
        let analyser =
            FlowAnalyser::new(AnalysisConfig::default(), Calibration::default()).unwrap();
        assert_eq!(
            analyser.run(&[]).err(),
            Some(FlowError::NoEventsAccumulated)
        );
    }
}
