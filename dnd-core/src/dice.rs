//! Percentile success rolls.
//!
//! Every attempted action is settled by one roll in `0..100` against the
//! success chance of its assessed [`Difficulty`]. The RNG is owned by the
//! caller so a seeded run replays the same rolls.

use crate::actions::{Difficulty, DifficultyAssessment};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Result of settling one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuccessRoll {
    /// The rolled value, or 0 when the roll was skipped.
    pub roll: u32,
    pub success: bool,
    pub skipped: bool,
}

impl SuccessRoll {
    fn skipped(success: bool) -> Self {
        Self {
            roll: 0,
            success,
            skipped: true,
        }
    }
}

impl DifficultyAssessment {
    /// Settle the assessed action.
    ///
    /// Auto-resolved assessments succeed only when the difficulty is
    /// `always_succeed`.
    pub fn roll_with_rng<R: Rng>(&self, rng: &mut R) -> SuccessRoll {
        if self.auto_resolve {
            return SuccessRoll::skipped(self.difficulty == Difficulty::AlwaysSucceed);
        }
        match self.difficulty.success_chance() {
            None => SuccessRoll::skipped(self.difficulty == Difficulty::AlwaysSucceed),
            Some(chance) => {
                let roll = rng.gen_range(0..100);
                SuccessRoll {
                    roll,
                    success: roll <= chance,
                    skipped: false,
                }
            }
        }
    }
}

/// Build the roller RNG, seeded when a seed is configured.
pub fn rng_from_seed(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}
