//! This module provides toy event generation facilities
//!
//! Events are generated with a random reaction plane and an azimuthal
//! distribution dN/dφ ∝ 1 + 2·v1·cos(φ − Ψ) + 2·v2·cos(2·(φ − Ψ)), which is
//! enough to exercise every part of the analysis with a known answer.

use crate::{
    event::{DetectorSide, Event, Particle, PidVector, NUM_SPECIES},
    numeric::{reals::consts::PI, Float},
    random::RandomGenerator,
    selection::Selection,
};
use num_traits::Zero;
use prefix_num_ops::real::*;

/// Mean transverse momentum of generated particles (GeV/c)
const MEAN_PT: Float = 0.5;

/// Fraction of particles crossing the central membrane
const CROSS_FRACTION: Float = 0.1;

/// Species abundances of generated particles, in PID vector order
const ABUNDANCES: [Float; NUM_SPECIES] = [0.02, 0.01, 0.75, 0.12, 0.09, 0.01];

/// Probability given by the PID detector to the true species
const PID_PURITY: Float = 0.7;

/// Salt which separates generator random streams from analysis ones
const SEED_SALT: u64 = 0x5DEE_CE66_D1CE_4E5B;

/// Region of azimuth where the detector loses particles
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AcceptanceHole {
    /// Start of the region (radians)
    pub phi_min: Float,

    /// End of the region (radians)
    pub phi_max: Float,

    /// Probability to detect a particle in the region
    pub efficiency: Float,
}
//
impl AcceptanceHole {
    /// Truth that a particle at φ falls into the hole
    fn contains(&self, phi: Float) -> bool {
        (self.phi_min..self.phi_max).contains(&phi)
    }
}

/// Parameters of the toy event generator
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeneratorConfig {
    /// Number of generated particles per event, before acceptance losses
    pub multiplicity: usize,

    /// Directed flow coefficient
    pub v1: Float,

    /// Elliptic flow coefficient
    pub v2: Float,

    /// Optional acceptance hole
    pub acceptance_hole: Option<AcceptanceHole>,
}

/// Generated event, along with its true reaction plane
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedEvent {
    /// Particle sample, as the analysis sees it
    pub event: Event,

    /// True reaction plane angle, in [0, 2π)
    pub reaction_plane: Float,
}

/// Generator of toy flow events
pub struct EventGenerator {
    /// Generator parameters
    config: GeneratorConfig,

    /// Seed of the generator's random streams
    seed: u64,
}
//
impl EventGenerator {
    /// Set up the generator
    pub fn new(config: GeneratorConfig, seed: u64) -> Self {
        Self {
            config,
            seed: seed ^ SEED_SALT,
        }
    }

    /// Maximum of the azimuthal density, used for acceptance-rejection
    fn max_density(&self) -> Float {
        1. + 2. * abs(self.config.v1) + 2. * abs(self.config.v2)
    }

    /// Azimuthal density relative to the reaction plane
    fn density(&self, relative_phi: Float) -> Float {
        1. + 2. * self.config.v1 * cos(relative_phi) + 2. * self.config.v2 * cos(2. * relative_phi)
    }

    /// Draw an azimuth from the flow distribution around some plane
    fn draw_azimuth(&self, rng: &mut RandomGenerator, reaction_plane: Float) -> Float {
        let max_density = self.max_density();
        loop {
            let phi = rng.uniform(0., 2. * PI);
            if rng.random() * max_density < self.density(phi - reaction_plane) {
                return phi;
            }
        }
    }

    /// Draw PID probabilities for a particle
    fn draw_pid(rng: &mut RandomGenerator) -> PidVector {
        let draw = rng.random();
        let mut cumulative = 0.;
        let mut species = NUM_SPECIES - 1;
        for (index, abundance) in ABUNDANCES.iter().enumerate() {
            cumulative += abundance;
            if draw < cumulative {
                species = index;
                break;
            }
        }
        let mut pid = PidVector::zero();
        pid.fill((1. - PID_PURITY) / (NUM_SPECIES - 1) as Float);
        pid[species] = PID_PURITY;
        pid
    }

    /// Generate the event with some identifier
    ///
    /// The result only depends on the seed and on the identifier, so events
    /// can be generated in any order.
    ///
    pub fn generate(&self, id: u64) -> GeneratedEvent {
        let mut rng = RandomGenerator::for_event(self.seed, id);
        let reaction_plane = rng.uniform(0., 2. * PI);

        let mut particles = Vec::with_capacity(self.config.multiplicity);
        for _ in 0..self.config.multiplicity {
            let phi = self.draw_azimuth(&mut rng, reaction_plane);
            if let Some(hole) = self.config.acceptance_hole {
                if hole.contains(phi) && rng.random() >= hole.efficiency {
                    continue;
                }
            }

            let eta = rng.uniform(-1., 1.);
            let pt = -MEAN_PT * ln(1. - rng.random());
            let charge = if rng.random() < 0.5 { 1 } else { -1 };
            let mut particle = Particle::new(phi, pt, eta, charge);
            if rng.random() < CROSS_FRACTION {
                particle.side = DetectorSide::Cross;
            }
            particle.pid = Some(Self::draw_pid(&mut rng));
            // The POI selection only studies particles above the mean pT
            particle.poi[Selection::Poi.index()] = pt > MEAN_PT;
            particles.push(particle);
        }

        GeneratedEvent {
            event: Event::new(id, particles),
            reaction_plane,
        }
    }
}
