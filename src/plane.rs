//! Event plane angle extraction
//!
//! A flow vector of harmonic n is invariant under rotations by 2π/n, so the
//! event plane it estimates is only defined modulo 2π/n. Angles are always
//! folded into [0, 2π/n).

use crate::{
    errors::{FlowError, Result},
    numeric::{reals::consts::PI, Complex, Float},
    selection::Harmonic,
};

use std::convert::TryFrom;

/// Period of the event plane angle of some harmonic
pub fn plane_period(harmonic: Harmonic) -> Float {
    2. * PI / harmonic.order() as Float
}

/// Event plane angle of a flow vector, in [0, 2π/n)
///
/// A zero vector has no orientation, which is reported as
/// `FlowError::UndefinedPlaneAngle` rather than as some arbitrary angle.
///
pub fn plane_angle(q: Complex, harmonic: Harmonic) -> Result<Float> {
    if !(q.re.is_finite() && q.im.is_finite()) || (q.re == 0. && q.im == 0.) {
        return Err(FlowError::UndefinedPlaneAngle);
    }
    Ok(fold_angle(q.arg() / harmonic.order() as Float, harmonic))
}

/// Event plane angle of a flow vector for a raw harmonic order
pub fn plane_angle_for_order(q: Complex, order: u32) -> Result<Float> {
    plane_angle(q, Harmonic::try_from(order)?)
}

/// Fold any angle into [0, 2π/n)
pub fn fold_angle(angle: Float, harmonic: Harmonic) -> Float {
    let period = plane_period(harmonic);
    let folded = angle.rem_euclid(period);
    // rem_euclid may round up to the period itself for tiny negative inputs
    if folded >= period {
        0.
    } else {
        folded
    }
}
