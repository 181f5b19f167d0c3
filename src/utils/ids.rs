use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

const ALPHABET: &[u8; 26] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const ID_LEN: usize = 10;

/// Deterministic generator of ten-character uppercase ASCII block ids
/// (spec.md §6, §9). Seeded to a fixed value so that applying the same
/// ordered list of hits to the same initial input yields bit-identical
/// graphs; reset the generator to its seed to start a reproducible run.
///
/// This is the one piece of state spec.md explicitly sanctions as global in
/// the reference implementation. Here it lives as a field on `Graph` instead
/// of a process-wide singleton -- the reproducibility guarantee only needs
/// "same seed in, same sequence of ids out", which a struct gives us without
/// the ambient-global footgun.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    seed: u64,
    rng: StdRng,
}

impl IdGenerator {
    pub fn new(seed: u64) -> Self {
        IdGenerator {
            seed,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Reset to the seed this generator was constructed with.
    pub fn reset(&mut self) {
        self.rng = StdRng::seed_from_u64(self.seed);
    }

    /// Draw the next random ten-character uppercase id.
    pub fn next_id(&mut self) -> String {
        (0..ID_LEN)
            .map(|_| ALPHABET[self.rng.gen_range(0..ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        IdGenerator::new(0)
    }
}
