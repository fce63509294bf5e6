//! Flow vectors (Q-vectors) of an event
//!
//! The flow vector of harmonic n is Q_n = Σ w_i·e^(i·n·φ_i), summed over the
//! particles of a selection. Its direction estimates n times the reaction
//! plane angle, its length grows with the anisotropy of the event.

use crate::{
    config::{AnalysisConfig, EtaWeighting, MultiplicityMode, PtWeighting, SubeventPolicy},
    errors::{FlowError, Result},
    event::{Event, Particle},
    numeric::{Complex, Float},
    plane,
    random::RandomGenerator,
    selection::{FlowTable, Harmonic, Selection, SelectionTable, SubeventHalf, NUM_SELECTIONS},
    subevent,
    weights::WeightTable,
};
use num_traits::Zero;
use prefix_num_ops::real::*;

/// Below this fraction of the summed weights, a flow vector counts as zero
const ZERO_TOLERANCE: Float = 1e-12;

/// Flow vector of one selection and harmonic, with its multiplicity
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FlowVector {
    /// Weighted sum of the particles' unit vectors at n·φ
    pub q: Complex,

    /// Multiplicity (particle count or sum of absolute weights)
    pub multiplicity: Float,

    /// Sum of absolute contribution weights
    weight_norm: Float,

    /// Number of contributing particles
    pub count: usize,
}
//
impl Default for FlowVector {
    fn default() -> Self {
        Self {
            q: Complex::zero(),
            multiplicity: 0.,
            weight_norm: 0.,
            count: 0,
        }
    }
}
//
impl FlowVector {
    /// Add a particle's contribution
    pub fn add(&mut self, phi: Float, harmonic: Harmonic, weight: Float, mode: MultiplicityMode) {
        self.q += Complex::from_polar(weight, harmonic.order() as Float * phi);
        self.weight_norm += abs(weight);
        self.count += 1;
        self.multiplicity += match mode {
            MultiplicityMode::Count => 1.,
            MultiplicityMode::WeightSum => abs(weight),
        };
    }

    /// This flow vector, with a particle's contribution taken back out
    pub fn without(
        &self,
        phi: Float,
        harmonic: Harmonic,
        weight: Float,
        mode: MultiplicityMode,
    ) -> Self {
        let mut result = *self;
        result.q -= Complex::from_polar(weight, harmonic.order() as Float * phi);
        result.weight_norm = (result.weight_norm - abs(weight)).max(0.);
        result.count = result.count.saturating_sub(1);
        result.multiplicity -= match mode {
            MultiplicityMode::Count => 1.,
            MultiplicityMode::WeightSum => abs(weight),
        };
        result.multiplicity = result.multiplicity.max(0.);
        result
    }

    /// Truth that no particle contributed
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Truth that the flow vector vanishes, up to rounding errors
    pub fn is_zero(&self) -> bool {
        self.is_empty() || self.q.norm() <= ZERO_TOLERANCE * self.weight_norm
    }

    /// Length of the flow vector divided by √M
    pub fn normalized_length(&self) -> Option<Float> {
        (self.multiplicity > 0.).then(|| self.q.norm() / sqrt(self.multiplicity))
    }

    /// Event plane angle estimated by this flow vector, in [0, 2π/n)
    pub fn plane_angle(&self, harmonic: Harmonic) -> Result<Float> {
        if self.is_zero() {
            return Err(FlowError::UndefinedPlaneAngle);
        }
        plane::plane_angle(self.q, harmonic)
    }
}

/// Sub-event flow vectors of one selection and harmonic
pub type SubeventVectors = [FlowVector; 2];

/// Flow quantities of one event
#[derive(Clone, Debug, PartialEq)]
pub struct EventFlow {
    /// Identifier of the event
    pub id: u64,

    /// Full-event flow vectors
    pub full: FlowTable<FlowVector>,

    /// Sub-event flow vectors, if sub-events are enabled
    pub subs: Option<FlowTable<SubeventVectors>>,

    /// Number of particle contributions dropped from each selection because
    /// of malformed records
    pub skipped: SelectionTable<usize>,
}
//
impl EventFlow {
    /// Full-event plane angle
    pub fn psi(&self, sel: Selection, har: Harmonic) -> Result<Float> {
        self.full[(sel, har)].plane_angle(har)
    }

    /// Sub-event flow vector, if sub-events are enabled
    pub fn sub(&self, sel: Selection, har: Harmonic, half: SubeventHalf) -> Option<&FlowVector> {
        self.subs
            .as_ref()
            .map(|subs| &subs[(sel, har)][half.index()])
    }

    /// Sub-event plane angle
    pub fn sub_psi(&self, sel: Selection, har: Harmonic, half: SubeventHalf) -> Result<Float> {
        self.sub(sel, har, half)
            .ok_or_else(|| FlowError::ResolutionUnavailable("sub-events are disabled".to_owned()))?
            .plane_angle(har)
    }

    /// cos(n·(Ψ_A − Ψ_B)), if both sub-event planes are defined
    pub fn subevent_cosine(&self, sel: Selection, har: Harmonic) -> Option<Float> {
        let psi_a = self.sub_psi(sel, har, SubeventHalf::A).ok()?;
        let psi_b = self.sub_psi(sel, har, SubeventHalf::B).ok()?;
        Some((har.order() as Float * (psi_a - psi_b)).cos())
    }
}

/// Builder of per-event flow vectors
pub struct FlowVectorBuilder<'a> {
    /// Analysis configuration
    config: &'a AnalysisConfig,

    /// Azimuthal acceptance weights, if enabled
    phi_weights: Option<&'a WeightTable>,
}
//
impl<'a> FlowVectorBuilder<'a> {
    /// Set up a builder (the configuration is assumed to be validated)
    pub fn new(config: &'a AnalysisConfig, phi_weights: Option<&'a WeightTable>) -> Self {
        Self { config, phi_weights }
    }

    /// Contribution weight of a particle at some harmonic
    ///
    /// Fails if a quantity that the configured weighting needs is missing.
    ///
    pub fn particle_weight(&self, particle: &Particle, phi: Float, har: Harmonic) -> Result<Float> {
        let mut weight = 1.;

        if let Some(table) = self.phi_weights {
            weight *= table.weight(particle.side, phi);
        }

        if let PtWeighting::Linear { saturation } = self.config.pt_weighting {
            if !particle.pt.is_finite() {
                return Err(FlowError::MalformedParticleRecord("pt"));
            }
            weight *= particle.pt.min(saturation);
        }

        if self.config.eta_weighting == EtaWeighting::OddHarmonics && har.is_odd() {
            if !particle.eta.is_finite() {
                return Err(FlowError::MalformedParticleRecord("eta"));
            }
            weight *= particle.eta;
        }

        Ok(weight)
    }

    /// Azimuth of a particle, if it can be placed in every plane of a
    /// selection
    ///
    /// Under η sub-events, a particle without a finite η cannot be assigned
    /// to a half, so it is left out of the full event vector too.
    ///
    pub fn usable_azimuth(&self, particle: &Particle) -> Result<Float> {
        let phi = particle.azimuth()?;
        if let SubeventPolicy::Pseudorapidity { .. } = self.config.subevents {
            if !particle.eta.is_finite() {
                return Err(FlowError::MalformedParticleRecord("eta"));
            }
        }
        Ok(phi)
    }

    /// Compute the flow vectors of an event
    pub fn build(&self, event: &Event) -> EventFlow {
        let mode = self.config.multiplicity;
        let mut rng = RandomGenerator::for_event(self.config.seed, event.id);
        let mut full = FlowTable::<FlowVector>::default();
        let mut subs = self
            .config
            .has_subevents()
            .then(FlowTable::<SubeventVectors>::default);
        let mut skipped = [0; NUM_SELECTIONS];

        for sel in Selection::ALL {
            // Collect the selection's reaction plane particles, dropping the
            // ones whose azimuth (or η, when splitting by η) is unusable
            let mut members = Vec::new();
            let mut azimuths = Vec::new();
            for particle in event.particles.iter().filter(|p| p.is_rp(sel)) {
                match self.usable_azimuth(particle) {
                    Ok(phi) => {
                        members.push(particle);
                        azimuths.push(phi);
                    }
                    Err(e) => {
                        log::debug!(
                            "Event {}: dropping particle from {sel} selection: {e}",
                            event.id
                        );
                        skipped[sel.index()] += 1;
                    }
                }
            }
            let halves = subevent::partition(self.config.subevents, &members, &mut rng);

            for har in Harmonic::ALL {
                for ((particle, &phi), half) in members.iter().zip(&azimuths).zip(&halves) {
                    let weight = match self.particle_weight(particle, phi, har) {
                        Ok(weight) => weight,
                        Err(e) => {
                            log::debug!(
                                "Event {}: dropping particle from {sel} harmonic {har}: {e}",
                                event.id
                            );
                            skipped[sel.index()] += 1;
                            continue;
                        }
                    };
                    full[(sel, har)].add(phi, har, weight, mode);
                    if let (Some(subs), Some(half)) = (subs.as_mut(), half) {
                        subs[(sel, har)][half.index()].add(phi, har, weight, mode);
                    }
                }
            }
        }

        EventFlow {
            id: event.id,
            full,
            subs,
            skipped,
        }
    }
}
