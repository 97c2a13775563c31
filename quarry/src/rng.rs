//! Seeded random number generation.
//!
//! Every draw in the engine is addressed by a `u64` seed so that runs can be
//! replayed bit-for-bit.

use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Create a new RNG, seeded when `seed` is given and from entropy otherwise
pub fn create_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Create a new RNG with a specific seed
pub fn seeded_rng(seed: u64) -> StdRng {
    StdRng::seed_from_u64(seed)
}

/// Draw a fresh 64-bit seed
pub fn next_seed(rng: &mut dyn RngCore) -> u64 {
    rng.next_u64()
}
