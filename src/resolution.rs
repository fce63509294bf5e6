//! Event plane resolution, from the correlation of sub-event planes
//!
//! The resolution ⟨cos(k·n·(Ψ_n − Ψ_true))⟩ is a known function R_k(χ) of a
//! single parameter χ, which grows like v_n·√M. Two random sub-events each
//! have half of the full-event multiplicity, so their correlation is
//! ⟨cos(n·(Ψ_A − Ψ_B))⟩ = R_1(χ_sub)² with χ = √2·χ_sub. Measuring the
//! correlation, inverting R_1 and evaluating R_k at √2·χ_sub thus gives the
//! full-event resolution.

use crate::{
    config::ResolutionMode,
    errors::{FlowError, Result},
    flowvec::EventFlow,
    numeric::{
        functions::{derivative, scaled_bessel_i, sqr},
        mean_and_error,
        reals::consts::{PI, SQRT_2},
        Float,
    },
    selection::{FlowTable, Harmonic, Selection},
};
use prefix_num_ops::real::*;

use std::fmt::{self, Display};

/// Upper end of the χ search interval
pub const CHI_MAX: Float = 40.;

/// Relative convergence tolerance of the χ search
pub const CHI_TOLERANCE: Float = 1e-6;

/// Iteration cap of the χ search
pub const MAX_ITERATIONS: usize = 100;

/// Below this argument, the half-integer Bessel closed forms suffer from
/// cancellation and the power series is used instead
const SMALL_ARGUMENT: Float = 0.1;

/// Resolution of an event plane as a function of χ
///
/// There is one implementation per supported harmonic ratio k between the
/// measured flow harmonic and the event plane harmonic.
///
pub trait ResolutionModel: Sync {
    /// Harmonic ratio k
    fn order(&self) -> u32;

    /// R_k(χ), for χ ≥ 0
    fn resolution(&self, chi: Float) -> Float;
}

/// Common prefactor √π / (2√2) of the resolution functions
fn prefactor() -> Float {
    sqrt(PI / 8.)
}

/// e⁻ˣ·I_ν(x) for ν = 1/2, 3/2 and 5/2, using their closed forms
fn scaled_half_integer_bessels(x: Float) -> [Float; 3] {
    if x < SMALL_ARGUMENT {
        return [1, 3, 5].map(|twice_order| scaled_bessel_i(twice_order, x));
    }
    let scale = sqrt(2. / (PI * x));
    // e⁻ˣ·sinh(x) and e⁻ˣ·cosh(x), without overflow
    let sinh = -(-2. * x).exp_m1() / 2.;
    let cosh = (1. + exp(-2. * x)) / 2.;
    let half = scale * sinh;
    let three_halves = scale * (cosh - sinh / x);
    let five_halves = half - 3. / x * three_halves;
    [half, three_halves, five_halves]
}

/// Resolution with respect to a plane of the same harmonic (k = 1)
pub struct FirstOrder;
//
impl ResolutionModel for FirstOrder {
    fn order(&self) -> u32 {
        1
    }

    fn resolution(&self, chi: Float) -> Float {
        if chi <= 0. {
            return 0.;
        }
        let x = sqr(chi) / 4.;
        prefactor() * chi * (scaled_bessel_i(0, x) + scaled_bessel_i(2, x))
    }
}

/// Resolution for twice the plane harmonic (k = 2)
pub struct SecondOrder;
//
impl ResolutionModel for SecondOrder {
    fn order(&self) -> u32 {
        2
    }

    fn resolution(&self, chi: Float) -> Float {
        if chi <= 0. {
            return 0.;
        }
        let [half, three_halves, _] = scaled_half_integer_bessels(sqr(chi) / 4.);
        prefactor() * chi * (half + three_halves)
    }
}

/// Resolution for three times the plane harmonic (k = 3)
pub struct ThirdOrder;
//
impl ResolutionModel for ThirdOrder {
    fn order(&self) -> u32 {
        3
    }

    fn resolution(&self, chi: Float) -> Float {
        if chi <= 0. {
            return 0.;
        }
        let x = sqr(chi) / 4.;
        prefactor() * chi * (scaled_bessel_i(2, x) + scaled_bessel_i(4, x))
    }
}

/// Resolution for four times the plane harmonic (k = 4)
pub struct FourthOrder;
//
impl ResolutionModel for FourthOrder {
    fn order(&self) -> u32 {
        4
    }

    fn resolution(&self, chi: Float) -> Float {
        if chi <= 0. {
            return 0.;
        }
        let [_, three_halves, five_halves] = scaled_half_integer_bessels(sqr(chi) / 4.);
        prefactor() * chi * (three_halves + five_halves)
    }
}

/// Resolution model of some harmonic ratio
pub fn resolution_model(k: Harmonic) -> &'static dyn ResolutionModel {
    match k {
        Harmonic::First => &FirstOrder,
        Harmonic::Second => &SecondOrder,
        Harmonic::Third => &ThirdOrder,
        Harmonic::Fourth => &FourthOrder,
    }
}

/// Why a resolution could not be estimated
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UnavailableReason {
    /// No event had both sub-event planes defined
    NoData,

    /// Sub-event planes are not positively correlated, χ is undefined
    NonPositiveCorrelation(Float),

    /// The sub-event resolution lies beyond what χ ∈ [0, CHI_MAX] gives
    OutOfRange(Float),

    /// The χ search did not converge within the iteration cap
    NotConverged,
}
//
impl Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnavailableReason::NoData => write!(f, "no data"),
            UnavailableReason::NonPositiveCorrelation(c) => {
                write!(f, "non-positive sub-event correlation {c}")
            }
            UnavailableReason::OutOfRange(r) => write!(f, "sub-event resolution {r} out of range"),
            UnavailableReason::NotConverged => write!(f, "chi search did not converge"),
        }
    }
}

/// Find χ such that R(χ) = target, by bisection on [0, CHI_MAX]
pub fn chi_from_resolution(
    model: &dyn ResolutionModel,
    target: Float,
) -> std::result::Result<Float, UnavailableReason> {
    bisect_chi(model, target, CHI_TOLERANCE, MAX_ITERATIONS)
}

/// Bisection with an explicit tolerance and iteration cap
fn bisect_chi(
    model: &dyn ResolutionModel,
    target: Float,
    tolerance: Float,
    max_iterations: usize,
) -> std::result::Result<Float, UnavailableReason> {
    if !(target > 0.) {
        return Err(UnavailableReason::NonPositiveCorrelation(target));
    }
    if !(target < model.resolution(CHI_MAX)) {
        return Err(UnavailableReason::OutOfRange(target));
    }

    // R is increasing, so the root is always kept inside [low, high]
    let (mut low, mut high) = (0., CHI_MAX);
    for _ in 0..max_iterations {
        let mid = (low + high) / 2.;
        if model.resolution(mid) < target {
            low = mid;
        } else {
            high = mid;
        }
        let mid = (low + high) / 2.;
        if high - low <= tolerance * mid {
            return Ok(mid);
        }
    }
    Err(UnavailableReason::NotConverged)
}

/// Estimated resolution of one (selection, harmonic) slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Resolution {
    /// Full-event resolution R
    pub resolution: Float,

    /// Statistical error on R, if enough events were accumulated
    pub error: Option<Float>,

    /// Full-event χ
    pub chi: Float,

    /// Sub-event resolution √⟨cos(n·(Ψ_A − Ψ_B))⟩
    pub subevent_resolution: Float,

    /// Mean sub-event correlation ⟨cos(n·(Ψ_A − Ψ_B))⟩
    pub mean_cosine: Float,

    /// Number of events which contributed
    pub events: usize,
}

/// Final state of one (selection, harmonic) slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ResolutionEstimate {
    /// The resolution was estimated
    Available(Resolution),

    /// The resolution could not be estimated, for this reason
    Unavailable(UnavailableReason),
}
//
impl ResolutionEstimate {
    /// Access the resolution, if available
    pub fn value(&self) -> Result<&Resolution> {
        match self {
            ResolutionEstimate::Available(res) => Ok(res),
            ResolutionEstimate::Unavailable(reason) => {
                Err(FlowError::ResolutionUnavailable(reason.to_string()))
            }
        }
    }
}

/// Accumulated cosines of one (selection, harmonic) slot
///
/// Used both for sub-event correlations cos(n·(Ψ_A − Ψ_B)) and for observed
/// flow cos(n·(φ − Ψ)). The normalized flow vector lengths q_n are averaged
/// the same way.
///
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CosineSums {
    /// Number of accumulated samples
    pub count: usize,

    /// Σ cos
    pub sum: Float,

    /// Σ cos²
    pub sum_sq: Float,
}
//
impl CosineSums {
    /// Record one sample
    pub fn integrate(&mut self, cosine: Float) {
        self.count += 1;
        self.sum += cosine;
        self.sum_sq += cosine * cosine;
    }

    /// Integrate sums from another accumulator
    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.sum += other.sum;
        self.sum_sq += other.sum_sq;
    }

    /// Mean cosine and its standard error, if anything was accumulated
    pub fn mean(&self) -> Option<(Float, Option<Float>)> {
        (self.count > 0).then(|| mean_and_error(self.count, self.sum, self.sum_sq))
    }

    /// Turn the accumulated correlation into a resolution estimate
    pub fn estimate(&self, model: &dyn ResolutionModel) -> ResolutionEstimate {
        match self.try_estimate(model) {
            Ok(res) => ResolutionEstimate::Available(res),
            Err(reason) => ResolutionEstimate::Unavailable(reason),
        }
    }

    fn try_estimate(
        &self,
        model: &dyn ResolutionModel,
    ) -> std::result::Result<Resolution, UnavailableReason> {
        if self.count == 0 {
            return Err(UnavailableReason::NoData);
        }
        let (mean_cosine, mean_error) = mean_and_error(self.count, self.sum, self.sum_sq);
        if !(mean_cosine > 0.) {
            return Err(UnavailableReason::NonPositiveCorrelation(mean_cosine));
        }

        let subevent_resolution = sqrt(mean_cosine);
        let chi_sub = chi_from_resolution(&FirstOrder, subevent_resolution)?;
        let chi = SQRT_2 * chi_sub;
        let resolution = model.resolution(chi);

        // Propagate the error on the mean cosine through c -> √c -> χ_sub
        // -> χ -> R_k(χ)
        let error = mean_error.map(|sigma| {
            let d_res_d_chi = derivative(|x| model.resolution(x), chi);
            let d_sub_d_chi_sub = derivative(|x| FirstOrder.resolution(x), chi_sub);
            let d_res_d_cos = d_res_d_chi * SQRT_2 / d_sub_d_chi_sub / (2. * subevent_resolution);
            abs(d_res_d_cos) * sigma
        });

        Ok(Resolution {
            resolution,
            error,
            chi,
            subevent_resolution,
            mean_cosine,
            events: self.count,
        })
    }
}

/// Lifecycle of the resolution estimator
#[derive(Clone, Debug, PartialEq)]
enum EstimatorState {
    /// Event loop in progress
    Accumulating {
        sums: FlowTable<CosineSums>,
        events: usize,
    },

    /// End of run reached, results are read-only
    Finalized(FlowTable<ResolutionEstimate>),
}

/// Resolution estimator, accumulating sub-event correlations during the
/// event loop and turning them into resolutions once at the end
#[derive(Clone, Debug, PartialEq)]
pub struct ResolutionEstimator {
    /// Which plane each harmonic's resolution refers to
    mode: ResolutionMode,

    /// Current state
    state: EstimatorState,
}
//
impl ResolutionEstimator {
    /// Start accumulating
    pub fn new(mode: ResolutionMode) -> Self {
        Self {
            mode,
            state: EstimatorState::Accumulating {
                sums: FlowTable::default(),
                events: 0,
            },
        }
    }

    /// Truth that finish() was successfully called
    pub fn is_finalized(&self) -> bool {
        matches!(self.state, EstimatorState::Finalized(_))
    }

    /// Record the sub-event correlations of one event
    ///
    /// Slots where either sub-event plane is undefined are left untouched.
    ///
    pub fn integrate(&mut self, flow: &EventFlow) -> Result<()> {
        match &mut self.state {
            EstimatorState::Accumulating { sums, events } => {
                *events += 1;
                for sel in Selection::ALL {
                    for har in Harmonic::ALL {
                        if let Some(cosine) = flow.subevent_cosine(sel, har) {
                            sums[(sel, har)].integrate(cosine);
                        }
                    }
                }
                Ok(())
            }
            EstimatorState::Finalized(_) => Err(FlowError::AlreadyFinalized),
        }
    }

    /// Integrate the correlations accumulated by another estimator
    #[allow(clippy::needless_pass_by_value)]
    pub fn merge(&mut self, other: Self) -> Result<()> {
        match (&mut self.state, other.state) {
            (
                EstimatorState::Accumulating { sums, events },
                EstimatorState::Accumulating {
                    sums: other_sums,
                    events: other_events,
                },
            ) => {
                *events += other_events;
                sums.zip_with(other_sums, |mine, theirs| mine.merge(&theirs));
                Ok(())
            }
            _ => Err(FlowError::AlreadyFinalized),
        }
    }

    /// Accumulated sums of a slot, while accumulating
    pub fn sums(&self, sel: Selection, har: Harmonic) -> Option<&CosineSums> {
        match &self.state {
            EstimatorState::Accumulating { sums, .. } => Some(&sums[(sel, har)]),
            EstimatorState::Finalized(_) => None,
        }
    }

    /// Convert the accumulated correlations into resolutions
    ///
    /// Must be called exactly once, after at least one event was recorded.
    /// Slots whose resolution cannot be determined are marked unavailable
    /// but do not make finalization fail.
    ///
    pub fn finish(&mut self) -> Result<()> {
        let sums = match &self.state {
            EstimatorState::Finalized(_) => return Err(FlowError::AlreadyFinalized),
            EstimatorState::Accumulating { events: 0, .. } => {
                return Err(FlowError::NoEventsAccumulated);
            }
            EstimatorState::Accumulating { sums, .. } => sums,
        };

        let mode = self.mode;
        let estimates = FlowTable::from_fn(|sel, har| match mode {
            ResolutionMode::SameHarmonic => sums[(sel, har)].estimate(&FirstOrder),
            ResolutionMode::MixedHarmonic => {
                sums[(sel, Harmonic::First)].estimate(resolution_model(har))
            }
        });
        for ((sel, har), estimate) in estimates.iter() {
            match estimate {
                ResolutionEstimate::Available(res) => log::info!(
                    "Resolution of {sel} selection, harmonic {har}: {} (chi = {})",
                    res.resolution,
                    res.chi
                ),
                ResolutionEstimate::Unavailable(reason) => {
                    log::warn!("No {sel} resolution for harmonic {har}: {reason}")
                }
            }
        }

        self.state = EstimatorState::Finalized(estimates);
        Ok(())
    }

    /// Final estimate of a slot
    pub fn get(&self, sel: Selection, har: Harmonic) -> Result<&ResolutionEstimate> {
        match &self.state {
            EstimatorState::Finalized(estimates) => Ok(&estimates[(sel, har)]),
            EstimatorState::Accumulating { .. } => Err(FlowError::NotFinalized),
        }
    }

    /// All final estimates
    pub fn into_estimates(self) -> Result<FlowTable<ResolutionEstimate>> {
        match self.state {
            EstimatorState::Finalized(estimates) => Ok(estimates),
            EstimatorState::Accumulating { .. } => Err(FlowError::NotFinalized),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const ALL_MODELS: [&dyn ResolutionModel; 4] =
        [&FirstOrder, &SecondOrder, &ThirdOrder, &FourthOrder];

    #[test]
    fn models_are_increasing_between_zero_and_one() {
        for model in ALL_MODELS {
            let order = model.order();
            let mut previous = 0.;
            for step in 1..=200 {
                let chi = step as Float * 0.05;
                let res = model.resolution(chi);
                assert!(res > previous, "R_{order} not increasing at chi = {chi}");
                assert!(res < 1.);
                previous = res;
            }
            assert!(model.resolution(1e-3) < 1e-3);
            assert!(
                model.resolution(CHI_MAX) > 0.98,
                "R_{order} too low at large chi"
            );
            assert_eq!(model.resolution(0.), 0.);
        }
    }

    #[test]
    fn models_match_reference_values() {
        // R_1(1) = √(π/8)·e^(-1/4)·(I0(1/4) + I1(1/4))
        let x: Float = 0.25;
        let i0 = 1.0156861412236078;
        let i1 = 0.12597910894546671;
        let expected = (PI / 8.).sqrt() * (-x).exp() * (i0 + i1);
        assert_relative_eq!(FirstOrder.resolution(1.), expected, max_relative = 1e-10);

        // The closed forms and the series must agree around their switch
        let chi = (4. * SMALL_ARGUMENT).sqrt();
        for model in [&SecondOrder as &dyn ResolutionModel, &FourthOrder] {
            let below = model.resolution(chi * (1. - 1e-9));
            let above = model.resolution(chi * (1. + 1e-9));
            assert_relative_eq!(below, above, max_relative = 1e-7);
        }
    }

    #[test]
    fn small_chi_behaves_like_a_power_law() {
        // R_k grows like χ^k near 0
        for model in ALL_MODELS {
            let k = model.order() as i32;
            let ratio = model.resolution(0.02) / model.resolution(0.01);
            assert_relative_eq!(ratio, (2 as Float).powi(k), max_relative = 1e-2);
        }
    }

    #[test]
    fn chi_inversion_recovers_chi() {
        for &chi in &[0.05, 0.4, 1., 2.5, 7.] {
            let target = FirstOrder.resolution(chi);
            let found = chi_from_resolution(&FirstOrder, target).unwrap();
            assert_relative_eq!(found, chi, max_relative = 1e-5);
        }
    }

    #[test]
    fn chi_inversion_reports_failures() {
        assert_eq!(
            chi_from_resolution(&FirstOrder, 0.),
            Err(UnavailableReason::NonPositiveCorrelation(0.))
        );
        assert!(matches!(
            chi_from_resolution(&FirstOrder, 0.999999),
            Err(UnavailableReason::OutOfRange(_))
        ));
        assert_eq!(
            bisect_chi(&FirstOrder, 0.5, CHI_TOLERANCE, 3),
            Err(UnavailableReason::NotConverged)
        );
    }

    #[test]
    fn perfectly_correlated_subevents_give_known_resolution() {
        // Two sub-events with R_sub = 0.6 each
        let mut sums = CosineSums::default();
        for cosine in [0.3, 0.42, 0.36, 0.36] {
            sums.integrate(cosine);
        }
        let res = *sums.estimate(&FirstOrder).value().unwrap();
        assert_relative_eq!(res.mean_cosine, 0.36, max_relative = 1e-12);
        assert_relative_eq!(res.subevent_resolution, 0.6, max_relative = 1e-12);
        let subevent_chi = res.chi / SQRT_2;
        assert_relative_eq!(
            FirstOrder.resolution(subevent_chi),
            0.6,
            max_relative = 1e-5
        );
        let expected = FirstOrder.resolution(res.chi);
        assert_relative_eq!(res.resolution, expected, max_relative = 1e-12);
        assert!(res.resolution > res.subevent_resolution);
        assert_eq!(res.events, 4);

        // The error follows from the spread of the cosines
        let sigma = mean_and_error(4, sums.sum, sums.sum_sq).1.unwrap();
        let error = res.error.unwrap();
        assert!(error > 0.);
        let shifted = CosineSums {
            count: 4,
            sum: sums.sum + 0.4 * sigma,
            sum_sq: sums.sum_sq,
        };
        let moved = shifted.estimate(&FirstOrder).value().unwrap().resolution;
        assert_relative_eq!(moved - res.resolution, 0.1 * error, max_relative = 0.02);
    }

    #[test]
    fn degenerate_sums_are_unavailable() {
        let empty = CosineSums::default();
        assert_eq!(
            empty.estimate(&FirstOrder),
            ResolutionEstimate::Unavailable(UnavailableReason::NoData)
        );

        let mut anticorrelated = CosineSums::default();
        anticorrelated.integrate(-0.2);
        assert!(matches!(
            anticorrelated.estimate(&FirstOrder).value(),
            Err(FlowError::ResolutionUnavailable(_))
        ));

        let mut single = CosineSums::default();
        single.integrate(0.5);
        let estimate = single.estimate(&FirstOrder);
        assert!(estimate.value().unwrap().error.is_none());
    }

    #[test]
    fn estimator_lifecycle_is_enforced() {
        let mut estimator = ResolutionEstimator::new(ResolutionMode::SameHarmonic);
        assert_eq!(
            estimator.get(Selection::Default, Harmonic::First),
            Err(FlowError::NotFinalized)
        );
        assert_eq!(estimator.finish(), Err(FlowError::NoEventsAccumulated));
        assert!(!estimator.is_finalized());

        let flow = EventFlow {
            id: 0,
            full: FlowTable::default(),
            subs: None,
            skipped: [0; 2],
        };
        estimator.integrate(&flow).unwrap();
        estimator.finish().unwrap();
        assert!(estimator.is_finalized());
        assert_eq!(estimator.finish(), Err(FlowError::AlreadyFinalized));
        assert_eq!(estimator.integrate(&flow), Err(FlowError::AlreadyFinalized));

        // Nothing populated any slot
        assert_eq!(
            estimator.get(Selection::Poi, Harmonic::Fourth),
            Ok(&ResolutionEstimate::Unavailable(UnavailableReason::NoData))
        );
    }
}
