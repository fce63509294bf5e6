//! Basic numerical concepts used throughout the analysis

#![allow(missing_docs)]

use num_complex;
use prefix_num_ops::real::*;

// Floating-point precision is configured here
pub type Float = f64;
pub use std::f64 as reals;
pub type Complex = num_complex::Complex<Float>;

/// Mathematical functions
pub mod functions {
    use super::{reals::consts::PI, Float};
    use prefix_num_ops::real::*;

    /// Above this argument, modified Bessel functions are evaluated using
    /// their asymptotic expansion instead of their power series
    const ASYMPTOTIC_THRESHOLD: Float = 20.;

    /// Maximal number of terms in the power series
    const MAX_SERIES_TERMS: usize = 500;

    /// Maximal number of terms in the asymptotic expansion
    const MAX_ASYMPTOTIC_TERMS: usize = 40;

    /// Square of a number
    pub fn sqr(x: Float) -> Float {
        x * x
    }

    /// Γ(ν + 1) for an integer or half-integer order ν = twice_order / 2
    fn gamma_of_order_plus_one(twice_order: u32) -> Float {
        let nu = twice_order as Float / 2.;
        let (mut gamma, mut factor) = if twice_order % 2 == 0 {
            (1., 1.)
        } else {
            (sqrt(PI), 0.5)
        };
        while factor <= nu {
            gamma *= factor;
            factor += 1.;
        }
        gamma
    }

    /// Exponentially scaled modified Bessel function of the first kind,
    /// e⁻ˣ·I_ν(x), for x ≥ 0 and ν = twice_order / 2
    ///
    /// The exponential scaling keeps the result finite for arguments where
    /// I_ν itself overflows, which is what resolution formulas need since
    /// they always multiply I_ν(χ²/4) by e^(-χ²/4).
    ///
    pub fn scaled_bessel_i(twice_order: u32, x: Float) -> Float {
        debug_assert!(
            x >= 0.,
            "Modified Bessel functions are evaluated for x >= 0"
        );
        let nu = twice_order as Float / 2.;
        if x == 0. {
            return if twice_order == 0 { 1. } else { 0. };
        }

        if x <= ASYMPTOTIC_THRESHOLD {
            // Power series Σ (x/2)^(2m+ν) / (m! Γ(m+ν+1))
            let half_x = x / 2.;
            let quarter_x2 = half_x * half_x;
            let mut term = half_x.powf(nu) / gamma_of_order_plus_one(twice_order);
            let mut sum = term;
            for m in 1..MAX_SERIES_TERMS {
                let m = m as Float;
                term *= quarter_x2 / (m * (m + nu));
                sum += term;
                if term <= sum * Float::EPSILON {
                    break;
                }
            }
            sum * exp(-x)
        } else {
            // Hankel expansion, 1/√(2πx) Σ (-1)^k a_k(ν) / x^k
            let mu = 4. * nu * nu;
            let mut term: Float = 1.;
            let mut sum = term;
            for k in 1..MAX_ASYMPTOTIC_TERMS {
                let odd = (2 * k - 1) as Float;
                let next = -term * (mu - odd * odd) / (k as Float * 8. * x);
                if abs(next) >= abs(term) {
                    break;
                }
                term = next;
                sum += term;
                if abs(term) <= abs(sum) * Float::EPSILON {
                    break;
                }
            }
            sum / sqrt(2. * PI * x)
        }
    }

    /// Finite-difference derivative of a smooth function defined on [0, ∞)
    ///
    /// Central differences are used, except too close to 0 where the
    /// difference is taken forward.
    ///
    pub fn derivative(f: impl Fn(Float) -> Float, x: Float) -> Float {
        let h = 1e-6 * x.abs().max(1.);
        if x - h < 0. {
            (f(x + h) - f(x)) / h
        } else {
            (f(x + h) - f(x - h)) / (2. * h)
        }
    }
}

/// Mean and standard error of the mean from accumulated sums
///
/// Returns None for the error if fewer than two samples were accumulated.
///
pub fn mean_and_error(count: usize, sum: Float, sum_sq: Float) -> (Float, Option<Float>) {
    let n = count as Float;
    let mean = sum / n;
    if count < 2 {
        return (mean, None);
    }
    let variance = ((sum_sq - sum * sum / n) / (n - 1.)).max(0.);
    (mean, Some(sqrt(variance / n)))
}
