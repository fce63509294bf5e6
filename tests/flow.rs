//! End-to-end checks of the flow analysis on toy events

use approx::assert_relative_eq;
use flowplane::{
    config::{AnalysisConfig, ResolutionMode},
    evgen::{AcceptanceHole, EventGenerator, GeneratorConfig},
    flowvec::FlowVectorBuilder,
    numeric::{reals::consts::PI, Float},
    random::RandomGenerator,
    resolution::ResolutionEstimate,
    scheduling::EVENT_BATCH_SIZE,
    weights::WeightTable,
    Calibration, Event, FinalResults, FlowAnalyser, Harmonic, Particle, Selection,
};

/// Elliptic flow slot of the event-wide selection
const DEFAULT_V2: (Selection, Harmonic) = (Selection::Default, Harmonic::Second);

fn generator(multiplicity: usize, v2: Float, seed: u64) -> EventGenerator {
    EventGenerator::new(
        GeneratorConfig {
            multiplicity,
            v1: 0.,
            v2,
            acceptance_hole: None,
        },
        seed,
    )
}

fn isotropic_event(id: u64, multiplicity: usize, rng: &mut RandomGenerator) -> Event {
    let particles = (0..multiplicity)
        .map(|_| Particle::new(rng.uniform(0., 2. * PI), 1., rng.uniform(-1., 1.), 1))
        .collect();
    Event::new(id, particles)
}

#[test]
fn isotropic_flow_vectors_scale_like_square_root_of_multiplicity() {
    let config = AnalysisConfig::default();
    let builder = FlowVectorBuilder::new(&config, None);
    let mut rng = RandomGenerator::new(2024);

    for multiplicity in [50, 200] {
        let trials = 2000;
        let mut sum_q2 = 0.;
        let mut lower_half = 0;
        for id in 0..trials {
            let flow = builder.build(&isotropic_event(id, multiplicity, &mut rng));
            let q = &flow.full[(Selection::Default, Harmonic::Second)];
            sum_q2 += q.q.norm_sqr();
            if flow.psi(Selection::Default, Harmonic::Second).unwrap() < PI / 2. {
                lower_half += 1;
            }
        }

        // ⟨|Q|²⟩ = M for uncorrelated unit vectors
        let mean_q2 = sum_q2 / trials as Float;
        assert_relative_eq!(mean_q2 / multiplicity as Float, 1., max_relative = 0.1);

        // Plane angles are uniform over [0, π)
        let fraction = lower_half as Float / trials as Float;
        assert!(
            (fraction - 0.5).abs() < 0.05,
            "plane angle fraction {fraction}"
        );
    }
}

#[test]
fn elliptic_flow_points_to_the_reaction_plane() {
    let config = AnalysisConfig::default();
    let builder = FlowVectorBuilder::new(&config, None);
    let evgen = generator(1000, 0.1, 99);

    let trials = 200;
    let mut errors = (0..trials)
        .map(|id| {
            let generated = evgen.generate(id);
            let psi = builder
                .build(&generated.event)
                .psi(Selection::Default, Harmonic::Second)
                .unwrap();
            let distance = (psi - generated.reaction_plane).rem_euclid(PI);
            distance.min(PI - distance).to_degrees()
        })
        .collect::<Vec<_>>();
    errors.sort_by(Float::total_cmp);

    let median = errors[trials as usize / 2];
    let within_20 = errors.iter().filter(|&&e| e < 20.).count();
    assert!(median < 10., "median plane error {median}°");
    assert!(within_20 as Float >= 0.9 * trials as Float);
}

/// Check that two runs over the same events agree, up to summation order
fn assert_same_results(a: &FinalResults, b: &FinalResults) {
    assert_eq!(a.counters, b.counters);
    for ((key, res_a), (_, res_b)) in a.resolution.iter().zip(b.resolution.iter()) {
        match (res_a, res_b) {
            (ResolutionEstimate::Available(x), ResolutionEstimate::Available(y)) => {
                assert_relative_eq!(x.mean_cosine, y.mean_cosine, max_relative = 1e-9);
                assert_relative_eq!(x.resolution, y.resolution, max_relative = 1e-9);
                assert_eq!(x.events, y.events);
            }
            _ => assert_eq!(
                std::mem::discriminant(res_a),
                std::mem::discriminant(res_b),
                "slot {key:?}"
            ),
        }
    }
    for sel in Selection::ALL {
        let (abundances_a, abundances_b) = (&a.abundances[sel.index()], &b.abundances[sel.index()]);
        for (x, y) in abundances_a.iter().zip(abundances_b.iter()) {
            assert_relative_eq!(x, y, max_relative = 1e-9);
        }
    }
    assert_eq!(a.phi_histogram, b.phi_histogram);
}

fn default_analyser() -> FlowAnalyser {
    FlowAnalyser::new(AnalysisConfig::default(), Calibration::default()).unwrap()
}

#[test]
fn results_do_not_depend_on_event_order() {
    let evgen = generator(300, 0.1, 5);
    let analyser = default_analyser();
    let events = (0..150)
        .map(|id| evgen.generate(id).event)
        .collect::<Vec<_>>();
    let mut shuffled = events.clone();
    shuffled.rotate_left(40);
    shuffled[..70].reverse();

    let forward = analyser.accumulate(&events).unwrap().finalize().unwrap();
    let reordered = analyser.accumulate(&shuffled).unwrap().finalize().unwrap();
    assert_same_results(&forward, &reordered);
}

#[test]
fn batched_runs_match_a_single_pass() {
    let evgen = generator(12, 0.1, 21);
    let analyser = default_analyser();
    let num_events = 2 * EVENT_BATCH_SIZE + 321;
    let events = (0..num_events as u64)
        .map(|id| evgen.generate(id).event)
        .collect::<Vec<_>>();

    let batched = analyser.run(&events).unwrap();
    assert_eq!(batched.counters.events, num_events);
    let single_pass = analyser.accumulate(&events).unwrap().finalize().unwrap();
    assert_same_results(&batched, &single_pass);

    // Batches are merged in a fixed order, whatever thread analysed them
    assert_eq!(analyser.run(&events).unwrap(), batched);
}

#[test]
fn subevent_resolution_matches_the_true_resolution() {
    let evgen = generator(200, 0.1, 17);
    let analyser = default_analyser();

    let num_events = 4000;
    let mut accumulator = analyser.accumulator();
    let mut true_cosines = 0.;
    for id in 0..num_events {
        let generated = evgen.generate(id);
        let contribution = analyser.analyze(&generated.event);
        let psi = contribution.flow.psi(DEFAULT_V2.0, DEFAULT_V2.1).unwrap();
        true_cosines += (2. * (psi - generated.reaction_plane)).cos();
        accumulator.integrate(contribution).unwrap();
    }
    let true_resolution = true_cosines / num_events as Float;

    let results = accumulator.finalize().unwrap();
    let estimate = results.resolution(DEFAULT_V2.0, DEFAULT_V2.1).unwrap();
    assert!((estimate.resolution - true_resolution).abs() < 0.03);
    assert!(estimate.error.unwrap() < 0.03);
    assert_eq!(estimate.events, num_events as usize);

    // Dividing by the resolution recovers the generated flow
    let v2 = results.corrected_flow(DEFAULT_V2.0, DEFAULT_V2.1).unwrap();
    assert!((v2.value - 0.1).abs() < 0.01, "corrected v2 = {}", v2.value);
    let observed = results.observed[DEFAULT_V2].unwrap();
    assert!(observed.value < v2.value);
}

#[test]
fn mixed_harmonic_resolution_is_lower_than_the_plane_resolution() {
    let evgen = EventGenerator::new(
        GeneratorConfig {
            multiplicity: 300,
            v1: 0.15,
            v2: 0.,
            acceptance_hole: None,
        },
        8,
    );
    let config = AnalysisConfig {
        resolution: ResolutionMode::MixedHarmonic,
        ..AnalysisConfig::default()
    };
    let analyser = FlowAnalyser::new(config, Calibration::default()).unwrap();
    let events = (0..500)
        .map(|id| evgen.generate(id).event)
        .collect::<Vec<_>>();
    let results = analyser.run(&events).unwrap();

    let first = results.resolution(Selection::Default, Harmonic::First);
    let second = results.resolution(Selection::Default, Harmonic::Second);
    let (first, second) = (first.unwrap(), second.unwrap());
    assert_relative_eq!(first.chi, second.chi, max_relative = 1e-12);
    assert!(second.resolution < first.resolution);
}

#[test]
fn acceptance_hole_yields_compensating_weights() {
    let hole = AcceptanceHole {
        phi_min: 0.,
        phi_max: PI / 2.,
        efficiency: 0.5,
    };
    let evgen = EventGenerator::new(
        GeneratorConfig {
            multiplicity: 200,
            v1: 0.,
            v2: 0.05,
            acceptance_hole: Some(hole),
        },
        3,
    );
    let analyser = default_analyser();
    let events = (0..1000)
        .map(|id| evgen.generate(id).event)
        .collect::<Vec<_>>();
    let results = analyser.run(&events).unwrap();

    let WeightTable::Combined(weights) = results.phi_weights(false) else {
        panic!("expected a combined weight table");
    };
    let bins = weights.bins();
    let quarter = bins.len() / 4;
    let inside = bins[..quarter].iter().sum::<Float>() / quarter as Float;
    let outside = bins[quarter..].iter().sum::<Float>() / (bins.len() - quarter) as Float;
    assert_relative_eq!(inside / outside, 2., max_relative = 0.05);
    assert!(results.phi_weights(true).is_per_side());
}
