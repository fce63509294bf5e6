//! Bayesian particle identification weights
//!
//! The detector response alone gives, for each particle, the probability
//! that it would produce the observed signal under each species hypothesis.
//! Multiplying these by the species abundances (the prior) and
//! renormalizing gives the probability of each species given the signal.

use crate::{
    errors::{FlowError, Result},
    event::{PidVector, NUM_SPECIES},
    numeric::Float,
    selection::{Selection, SelectionTable, NUM_SELECTIONS},
};
use num_traits::Zero;

/// Running per-selection species abundances
#[derive(Clone, Debug, PartialEq)]
pub struct BayesianPidReweighter {
    /// Accumulated PID probability mass, per selection
    sums: SelectionTable<PidVector>,
}
//
impl Default for BayesianPidReweighter {
    fn default() -> Self {
        Self::new()
    }
}
//
impl BayesianPidReweighter {
    /// Start with no observed particle
    pub fn new() -> Self {
        Self {
            sums: [PidVector::zero(); NUM_SELECTIONS],
        }
    }

    /// Record the PID probabilities of a particle of some selection
    pub fn accumulate(&mut self, sel: Selection, pid: &PidVector) {
        self.sums[sel.index()] += pid;
    }

    /// Integrate the abundances observed by another reweighter
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        for (mine, theirs) in self.sums.iter_mut().zip(other.sums.iter()) {
            *mine += theirs;
        }
    }

    /// Raw accumulated probability mass of a selection
    pub fn sums(&self, sel: Selection) -> &PidVector {
        &self.sums[sel.index()]
    }

    /// Normalized abundance estimate of a selection
    ///
    /// Sums to 1 over species, unless nothing was observed at all in which
    /// case every species reports 0.
    ///
    pub fn abundance(&self, sel: Selection) -> PidVector {
        normalized_or_zero(&self.sums[sel.index()])
    }

    /// Correct a particle's PID probabilities using this reweighter's
    /// running abundances as a prior
    pub fn reweight_running(&self, sel: Selection, raw: &PidVector) -> PidVector {
        Self::reweight(raw, &self.abundance(sel))
    }

    /// Bayes-correct raw PID probabilities with an abundance prior
    ///
    /// If the corrected probabilities all vanish, the raw vector is returned
    /// unchanged.
    ///
    pub fn reweight(raw: &PidVector, prior: &PidVector) -> PidVector {
        let product = raw.component_mul(prior);
        let norm = product.sum();
        if norm == 0. {
            log::warn!("Degenerate Bayesian PID reweighting, falling back to raw probabilities");
            return *raw;
        }
        product / norm
    }
}

/// Normalize a vector to unit sum, a vector summing to zero stays zero
fn normalized_or_zero(v: &PidVector) -> PidVector {
    let total = v.sum();
    if total > 0. {
        v / total
    } else {
        PidVector::zero()
    }
}

/// Species abundance prior, loaded once before the event loop
#[derive(Clone, Debug, PartialEq)]
pub struct BayesianPrior(SelectionTable<PidVector>);
//
impl Default for BayesianPrior {
    /// Flat prior, every species is equally likely
    fn default() -> Self {
        Self([PidVector::repeat(1. / NUM_SPECIES as Float); NUM_SELECTIONS])
    }
}
//
impl BayesianPrior {
    /// Build a prior from per-selection abundances, which are normalized
    pub fn new(abundances: SelectionTable<PidVector>) -> Result<Self> {
        let mut normalized = abundances;
        for (sel, abundance) in Selection::ALL.into_iter().zip(normalized.iter_mut()) {
            if abundance.iter().any(|a| !a.is_finite() || *a < 0.) || abundance.sum() <= 0. {
                return Err(FlowError::InvalidConfiguration(format!(
                    "the Bayesian prior of the {sel} selection must be positive with a nonzero sum"
                )));
            }
            *abundance = normalized_or_zero(abundance);
        }
        Ok(Self(normalized))
    }

    /// Build a prior from the abundances observed during a previous run
    pub fn from_observed(reweighter: &BayesianPidReweighter) -> Result<Self> {
        Self::new(Selection::ALL.map(|sel| *reweighter.sums(sel)))
    }

    /// Normalized prior of a selection
    pub fn get(&self, sel: Selection) -> &PidVector {
        &self.0[sel.index()]
    }
}
