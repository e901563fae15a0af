// Draft order generation: random base permutation plus snake rounds.

use rand::seq::SliceRandom;
use rand::Rng;

/// A shuffled team order and the snake ordering derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftOrder {
    base: Vec<i64>,
}

impl DraftOrder {
    /// Shuffle `teams` uniformly with the thread-local RNG.
    pub fn generate(teams: &[i64]) -> Self {
        Self::generate_with(teams, &mut rand::rng())
    }

    /// Shuffle `teams` with a caller-provided RNG (seeded in tests).
    pub fn generate_with<R: Rng + ?Sized>(teams: &[i64], rng: &mut R) -> Self {
        let mut base = teams.to_vec();
        base.shuffle(rng);
        DraftOrder { base }
    }

    /// Wrap an existing order without shuffling.
    pub fn from_base(base: Vec<i64>) -> Self {
        DraftOrder { base }
    }

    pub fn base(&self) -> &[i64] {
        &self.base
    }

    /// Team order for a 1-indexed round: odd rounds use the base order, even
    /// rounds run it in reverse.
    pub fn round(&self, round: u32) -> Vec<i64> {
        if round % 2 == 1 {
            self.base.clone()
        } else {
            self.base.iter().rev().copied().collect()
        }
    }

    /// Every slot of a `rounds`-round draft as `(round, pick_in_round, team)`.
    pub fn slots(&self, rounds: u32) -> Vec<(u32, u32, i64)> {
        (1..=rounds)
            .flat_map(|round| {
                self.round(round)
                    .into_iter()
                    .enumerate()
                    .map(move |(i, team)| (round, i as u32 + 1, team))
            })
            .collect()
    }
}
