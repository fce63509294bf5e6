//! Random number generation, a thin facade on top of the rand crate
//!
//! Every event gets its own generator, whose state only depends on a run
//! seed and on the event identifier. Random decisions are thus reproducible
//! whatever order events are processed in, and by whichever thread.

use crate::numeric::Float;
use rand::{seq::SliceRandom, Rng, SeedableRng};

/// Random number generation engine in use
type Engine = rand_xoshiro::Xoshiro256Plus;

/// Facade which exposes the few random operations the analysis needs
#[derive(Clone)]
pub struct RandomGenerator {
    rng: Engine,
}
//
impl RandomGenerator {
    /// Spawn a generator from a seed
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Engine::seed_from_u64(seed),
        }
    }

    /// Spawn the generator of one event of a run
    pub fn for_event(seed: u64, event_id: u64) -> Self {
        // Spread consecutive identifiers over the seed space
        Self::new(seed ^ event_id.wrapping_add(1).wrapping_mul(0x9E37_79B9_7F4A_7C15))
    }

    /// Generate a random floating-point number between 0 and 1
    pub fn random(&mut self) -> Float {
        self.rng.gen()
    }

    /// Generate a random floating-point number in [low, high)
    pub fn uniform(&mut self, low: Float, high: Float) -> Float {
        low + (high - low) * self.random()
    }

    /// Randomly reorder a slice
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_generators_are_reproducible() {
        let mut first = RandomGenerator::for_event(42, 7);
        let mut again = RandomGenerator::for_event(42, 7);
        let mut other = RandomGenerator::for_event(42, 8);
        let a = (0..4).map(|_| first.random()).collect::<Vec<_>>();
        let b = (0..4).map(|_| again.random()).collect::<Vec<_>>();
        let c = (0..4).map(|_| other.random()).collect::<Vec<_>>();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.iter().all(|x| (0. ..1.).contains(x)));
    }
}
