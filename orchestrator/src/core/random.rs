//! Injectable random source.
//!
//! All randomness (room-rule choice, dice, heuristic tie-breaks, deck
//! shuffles) flows through one seeded generator so runs are reproducible.

use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: Arc<Mutex<StdRng>>,
}

impl RandomSource {
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    pub fn from_seed(seed: Option<u64>) -> Self {
        match seed {
            Some(seed) => Self::seeded(seed),
            None => Self::from_entropy(),
        }
    }

    /// Uniform index in `0..len`. `len` must be non-zero.
    pub fn pick_index(&self, len: usize) -> usize {
        self.with(|rng| rng.gen_range(0..len))
    }

    /// Uniform value in `1..=sides`.
    pub fn roll(&self, sides: u8) -> u8 {
        self.with(|rng| rng.gen_range(1..=sides))
    }

    pub fn coin(&self) -> bool {
        self.with(|rng| rng.gen_bool(0.5))
    }

    pub fn shuffle<T>(&self, items: &mut [T]) {
        self.with(|rng| items.shuffle(rng));
    }

    fn with<T>(&self, f: impl FnOnce(&mut StdRng) -> T) -> T {
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut rng)
    }
}
