use rand::{Rng, SeedableRng, distr::StandardUniform, prelude::Distribution};
use rand_pcg::Pcg32;

use crate::core::ShapeKind;

/// Seed for a game's piece sequence.
///
/// Wraps the 16 bytes a [`Pcg32`] needs so seeds can be stored, logged, and
/// replayed. A random seed can be drawn from any [`Rng`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PieceSeed([u8; 16]);

impl PieceSeed {
    #[must_use]
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn from_u64(value: u64) -> Self {
        let mut bytes = [0; 16];
        let v = value.to_le_bytes();
        let mut i = 0;
        while i < 8 {
            bytes[i] = v[i];
            i += 1;
        }
        Self(bytes)
    }
}

impl Distribution<PieceSeed> for StandardUniform {
    fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> PieceSeed {
        PieceSeed(rng.random())
    }
}

#[derive(Debug, Clone)]
enum Source {
    Uniform(Pcg32),
    Fixed(ShapeKind),
}

/// Source of upcoming piece kinds for one game.
///
/// Each game owns its own generator so concurrent games never contend on a
/// shared RNG and a seeded game replays the exact same piece sequence.
#[derive(Debug, Clone)]
pub struct PieceGenerator {
    source: Source,
}

impl Default for PieceGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl PieceGenerator {
    /// Creates a generator with a seed drawn from the thread RNG.
    #[must_use]
    pub fn new() -> Self {
        Self::with_seed(rand::rng().random())
    }

    /// Creates a uniformly distributed generator with a fixed seed.
    #[must_use]
    pub fn with_seed(seed: PieceSeed) -> Self {
        Self {
            source: Source::Uniform(Pcg32::from_seed(seed.0)),
        }
    }

    /// Creates a generator that always yields `kind`. Intended for tests.
    #[must_use]
    pub fn fixed(kind: ShapeKind) -> Self {
        Self {
            source: Source::Fixed(kind),
        }
    }

    pub fn next_kind(&mut self) -> ShapeKind {
        match &mut self.source {
            Source::Uniform(rng) => rng.random(),
            Source::Fixed(kind) => *kind,
        }
    }
}
