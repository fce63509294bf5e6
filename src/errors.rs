//! Errors that can occur during a flow analysis

use thiserror::Error;

/// Everything that can go wrong in the analysis core
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FlowError {
    /// Harmonic order outside of 1..=4
    #[error("harmonic order {0} is not supported (expected 1, 2, 3 or 4)")]
    InvalidHarmonic(u32),

    /// Zero-magnitude flow vector
    #[error("the flow vector has zero magnitude, the event plane angle is undefined")]
    UndefinedPlaneAngle,

    /// Resolution could not be estimated
    #[error("the event plane resolution is unavailable ({0})")]
    ResolutionUnavailable(String),

    /// Missing or non-finite per-particle field
    #[error("particle record is missing a valid '{0}'")]
    MalformedParticleRecord(&'static str),

    /// Configured weighting without its calibration table
    #[error("the configuration requires a calibration table that was not provided ({0})")]
    MissingCalibration(&'static str),

    /// Nonsensical analysis option
    #[error("invalid analysis configuration: {0}")]
    InvalidConfiguration(String),

    /// Accumulation or finalization after the end of the run
    #[error("the resolution estimator has already been finalized")]
    AlreadyFinalized,

    /// Final results requested during the event loop
    #[error("the resolution estimator has not been finalized yet")]
    NotFinalized,

    /// Finalization of an empty run
    #[error("no event was accumulated before finalization")]
    NoEventsAccumulated,
}

/// Result type used throughout the analysis core
pub type Result<T> = std::result::Result<T, FlowError>;
