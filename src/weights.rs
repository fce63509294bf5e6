//! Azimuthal acceptance correction weights
//!
//! A detector with non-uniform azimuthal acceptance biases flow vectors
//! towards its most efficient regions. Weighting each particle by the inverse
//! of the (normalized) acceptance of its φ bin flattens this bias out.

use crate::{
    errors::{FlowError, Result},
    event::DetectorSide,
    numeric::{reals::consts::PI, Float},
};

/// Default number of φ bins of weight tables and histograms
pub const DEFAULT_PHI_BINS: usize = 120;

/// φ-binned weights covering [0, 2π)
#[derive(Clone, Debug, PartialEq)]
pub struct PhiWeights {
    /// One weight per φ bin
    bins: Box<[Float]>,
}
//
impl PhiWeights {
    /// Build a table from its bin contents, checking that they make sense
    pub fn new(bins: Vec<Float>) -> Result<Self> {
        if bins.is_empty() {
            return Err(FlowError::InvalidConfiguration(
                "a phi weight table needs at least one bin".to_owned(),
            ));
        }
        if let Some(bad) = bins.iter().find(|w| !w.is_finite() || **w < 0.) {
            return Err(FlowError::InvalidConfiguration(format!(
                "phi weights must be finite and positive, found {bad}"
            )));
        }
        Ok(Self {
            bins: bins.into_boxed_slice(),
        })
    }

    /// Flat table (every weight is 1)
    pub fn uniform(num_bins: usize) -> Self {
        Self {
            bins: vec![1.; num_bins.max(1)].into_boxed_slice(),
        }
    }

    /// Number of φ bins
    pub fn num_bins(&self) -> usize {
        self.bins.len()
    }

    /// Bin contents
    pub fn bins(&self) -> &[Float] {
        &self.bins
    }

    /// Weight of the bin containing φ, which may lie outside of [0, 2π)
    pub fn weight(&self, phi: Float) -> Float {
        self.bins[phi_bin(phi, self.bins.len())]
    }
}

/// Index of the bin containing φ in a [0, 2π) axis of num_bins bins
fn phi_bin(phi: Float, num_bins: usize) -> usize {
    let wrapped = phi.rem_euclid(2. * PI);
    let bin = (wrapped / (2. * PI) * num_bins as Float) as usize;
    bin.min(num_bins - 1)
}

/// Azimuthal weight lookup, either detector-wide or per detector side
#[derive(Clone, Debug, PartialEq)]
pub enum WeightTable {
    /// A single table for the whole detector
    Combined(PhiWeights),

    /// Separate tables for positive side, negative side and crossing tracks
    PerSide {
        positive: PhiWeights,
        negative: PhiWeights,
        cross: PhiWeights,
    },
}
//
impl WeightTable {
    /// Correction weight of a particle measured at φ on some detector side
    pub fn weight(&self, side: DetectorSide, phi: Float) -> Float {
        match self {
            WeightTable::Combined(table) => table.weight(phi),
            WeightTable::PerSide {
                positive,
                negative,
                cross,
            } => match side {
                DetectorSide::Positive => positive.weight(phi),
                DetectorSide::Negative => negative.weight(phi),
                DetectorSide::Cross => cross.weight(phi),
            },
        }
    }

    /// Truth that this table distinguishes detector sides
    pub fn is_per_side(&self) -> bool {
        matches!(self, WeightTable::PerSide { .. })
    }
}

/// φ distribution of reaction-plane particles, per detector side, from which
/// the weights of a subsequent run can be derived
#[derive(Clone, Debug, PartialEq)]
pub struct PhiHistogram {
    /// Bin contents, indexed by detector side then by φ bin
    counts: [Box<[Float]>; 3],
}
//
impl PhiHistogram {
    /// Set up an empty histogram
    pub fn new(num_bins: usize) -> Self {
        let num_bins = num_bins.max(1);
        Self {
            counts: DetectorSide::ALL.map(|_| vec![0.; num_bins].into_boxed_slice()),
        }
    }

    /// Number of φ bins
    pub fn num_bins(&self) -> usize {
        self.counts[0].len()
    }

    /// Record one particle
    pub fn fill(&mut self, side: DetectorSide, phi: Float) {
        let counts = &mut self.counts[side.index()];
        let bin = phi_bin(phi, counts.len());
        counts[bin] += 1.;
    }

    /// Integrate the contents of another histogram with the same binning
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) {
        assert_eq!(
            self.num_bins(),
            other.num_bins(),
            "Histogram binnings must match"
        );
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            for (m, t) in mine.iter_mut().zip(theirs.iter()) {
                *m += t;
            }
        }
    }

    /// Contents of one side of the detector
    pub fn side(&self, side: DetectorSide) -> &[Float] {
        &self.counts[side.index()]
    }

    /// Contents summed over all detector sides
    pub fn combined(&self) -> Vec<Float> {
        (0..self.num_bins())
            .map(|bin| self.counts.iter().map(|side| side[bin]).sum())
            .collect()
    }

    /// Derive flattening weights, weight = mean bin content / bin content
    ///
    /// Empty bins get a weight of 1 since there is nothing to correct there.
    ///
    pub fn to_weights(&self, per_side: bool) -> WeightTable {
        if per_side {
            WeightTable::PerSide {
                positive: flattening_weights(self.side(DetectorSide::Positive)),
                negative: flattening_weights(self.side(DetectorSide::Negative)),
                cross: flattening_weights(self.side(DetectorSide::Cross)),
            }
        } else {
            WeightTable::Combined(flattening_weights(&self.combined()))
        }
    }
}

/// Weights which flatten a φ distribution
fn flattening_weights(counts: &[Float]) -> PhiWeights {
    let mean = counts.iter().sum::<Float>() / counts.len() as Float;
    let bins = counts
        .iter()
        .map(|&count| if count > 0. { mean / count } else { 1. })
        .collect::<Vec<_>>();
    PhiWeights {
        bins: bins.into_boxed_slice(),
    }
}
