//! flowplane: event plane flow analysis
//!
//!
//! # Introduction (for the physicist)
//!
//! In non-central heavy ion collisions, the overlap region of the two nuclei
//! is almond-shaped. Pressure gradients turn this spatial anisotropy into an
//! azimuthal anisotropy of the emitted particles, characterized by the Fourier
//! coefficients v_n of their distribution around the reaction plane.
//!
//! The reaction plane is not observed directly. It is estimated event by
//! event from the flow vectors Q_n of the particles, and the finite accuracy
//! of that estimate (the event plane resolution) is measured by correlating
//! two independent sub-events of each event.
//!
//!
//! # Introduction (for the computer guy)
//!
//! The analysis is organized as a pipeline:
//!
//! * configure and calibrate a `FlowAnalyser` once
//! * analyse every event into an `EventContribution` (flow vectors, plane
//!   angles, observed flow, PID probabilities)
//! * integrate contributions into a mergeable `ResultsAccumulator`
//! * finalize once into `FinalResults`, which holds resolutions, resolution
//!   corrected flow and species abundances.
//!
//! Events are independent and accumulators only hold sums, so the event loop
//! may be split across threads (see the `multi-threading` feature) without
//! changing the results.

#![warn(missing_docs)]

pub mod analyser;
pub mod bayesian;
pub mod config;
pub mod errors;
pub mod event;
pub mod evgen;
pub mod flowvec;
pub mod numeric;
pub mod output;
pub mod plane;
pub mod random;
pub mod resacc;
pub mod resfin;
pub mod resolution;
pub mod scheduling;
pub mod selection;
pub mod subevent;
pub mod weights;

pub use crate::{
    analyser::{Calibration, EventContribution, FlowAnalyser},
    config::AnalysisConfig,
    errors::{FlowError, Result},
    event::{Event, Particle},
    resfin::FinalResults,
    selection::{Harmonic, Selection},
};
