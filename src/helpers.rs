use rand::rngs::StdRng;
use rand::SeedableRng;

pub mod tracing;

/// Deterministic generator for a fixed seed, an entropy-seeded one otherwise.
#[must_use]
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    seed.map_or_else(StdRng::from_entropy, StdRng::seed_from_u64)
}
