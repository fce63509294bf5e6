//! This module defines the properties and storage of analyzed events

use crate::{
    errors::{FlowError, Result},
    numeric::{reals::consts::PI, Float},
    selection::{Selection, NUM_SELECTIONS},
};
use nalgebra::SVector;

/// Number of particle species considered by particle identification
pub const NUM_SPECIES: usize = 6;

/// Per-species probabilities (or abundances)
pub type PidVector = SVector<Float, NUM_SPECIES>;

/// Particle species, in PID vector order
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Species {
    Electron,
    Muon,
    Pion,
    Kaon,
    Proton,
    Deuteron,
}
//
impl Species {
    /// All species, in PID vector order
    pub const ALL: [Species; NUM_SPECIES] = [
        Species::Electron,
        Species::Muon,
        Species::Pion,
        Species::Kaon,
        Species::Proton,
        Species::Deuteron,
    ];

    /// Index of this species in PID vectors
    pub fn index(self) -> usize {
        self as usize
    }

    /// Short name of the species
    pub fn name(self) -> &'static str {
        match self {
            Species::Electron => "e",
            Species::Muon => "mu",
            Species::Pion => "pi",
            Species::Kaon => "k",
            Species::Proton => "p",
            Species::Deuteron => "d",
        }
    }
}

/// Part of the detector which a particle was measured in
///
/// Tracks which stay on one side of the central membrane are "positive" or
/// "negative", those which cross it are "cross".
///
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum DetectorSide {
    Positive,
    Negative,
    Cross,
}
//
impl DetectorSide {
    /// All detector sides, in storage order
    pub const ALL: [DetectorSide; 3] = [
        DetectorSide::Positive,
        DetectorSide::Negative,
        DetectorSide::Cross,
    ];

    /// Storage index of this side
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Per-particle record, as provided by the event source
#[derive(Clone, Debug, PartialEq)]
pub struct Particle {
    /// Azimuthal angle (radians), None if the source could not provide it
    pub phi: Option<Float>,

    /// Transverse momentum (GeV/c)
    pub pt: Float,

    /// Pseudorapidity
    pub eta: Float,

    /// Charge sign (-1, 0 or +1)
    pub charge: i8,

    /// Detector side which the particle was measured in
    pub side: DetectorSide,

    /// Particle identification probabilities, if available
    pub pid: Option<PidVector>,

    /// Whether the particle is used in each selection's reaction plane
    pub rp: [bool; NUM_SELECTIONS],

    /// Whether the particle is a flow observable candidate in each selection
    pub poi: [bool; NUM_SELECTIONS],
}
//
impl Particle {
    /// Build a particle which contributes to every selection's reaction plane
    /// and is a flow observable candidate everywhere
    ///
    /// The detector side follows the sign of η. A particle whose η is not
    /// finite cannot be placed on either side of the membrane, so it goes to
    /// the cross side.
    ///
    pub fn new(phi: Float, pt: Float, eta: Float, charge: i8) -> Self {
        let side = if !eta.is_finite() {
            DetectorSide::Cross
        } else if eta >= 0. {
            DetectorSide::Positive
        } else {
            DetectorSide::Negative
        };
        Self {
            phi: Some(phi),
            pt,
            eta,
            charge,
            side,
            pid: None,
            rp: [true; NUM_SELECTIONS],
            poi: [true; NUM_SELECTIONS],
        }
    }

    /// Azimuthal angle wrapped to [0, 2π), or an error if it is missing
    pub fn azimuth(&self) -> Result<Float> {
        match self.phi {
            Some(phi) if phi.is_finite() => {
                let wrapped = phi.rem_euclid(2. * PI);
                Ok(if wrapped >= 2. * PI { 0. } else { wrapped })
            }
            _ => Err(FlowError::MalformedParticleRecord("phi")),
        }
    }

    /// Truth that this particle contributes to a selection's reaction plane
    pub fn is_rp(&self, sel: Selection) -> bool {
        self.rp[sel.index()]
    }

    /// Truth that this particle is a flow observable candidate of a selection
    pub fn is_poi(&self, sel: Selection) -> bool {
        self.poi[sel.index()]
    }
}

/// Storage for one event's particle sample
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    /// Identifier of the event, unique within a run
    pub id: u64,

    /// Particles of the event
    pub particles: Vec<Particle>,
}
//
impl Event {
    /// Build an event from its particle sample
    pub fn new(id: u64, particles: Vec<Particle>) -> Self {
        Self { id, particles }
    }
}
