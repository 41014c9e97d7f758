//! Epsilon-greedy action selection over a value function.
//!
//! The exploration rate is not mutated here. Callers pass the number of
//! selections made so far and [`EpsilonGreedy::epsilon_at`] derives the
//! decayed rate from it, so the same step always yields the same rate.

use crate::board::{Action, GameState};
use rand::prelude::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpsilonGreedy {
    pub epsilon: f64,
    pub decay: Option<f64>,
}

/// How an action was picked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Decision {
    Explore(Action),
    Exploit(Action),
}

impl Decision {
    pub fn action(self) -> Action {
        match self {
            Decision::Explore(action) | Decision::Exploit(action) => action,
        }
    }
}

impl EpsilonGreedy {
    pub fn new(epsilon: f64, decay: Option<f64>) -> Self {
        EpsilonGreedy { epsilon, decay }
    }

    /// Rate used by the `step`-th selection (1-based): the decay factor compounds once per step.
    pub fn epsilon_at(&self, step: u64) -> f64 {
        match self.decay {
            Some(decay) => self.epsilon * decay.powf(step as f64),
            None => self.epsilon,
        }
    }

    /// Explores with probability `epsilon_at(step)`, otherwise acts greedily on `value_of`.
    ///
    /// Returns `None` only when the board has no empty cell.
    pub fn select<R, F>(&self, step: u64, state: &GameState, value_of: F, rng: &mut R) -> Option<Decision>
    where
        R: Rng + ?Sized,
        F: FnMut(Action) -> f64,
    {
        if rng.gen::<f64>() < self.epsilon_at(step) {
            state
                .available_moves()
                .choose(rng)
                .copied()
                .map(Decision::Explore)
        } else {
            greedy_action(state, value_of, rng).map(Decision::Exploit)
        }
    }
}

/// Picks uniformly among the empty cells whose value equals the maximum.
///
/// `value_of` is called exactly once per empty cell, in row-major order.
pub fn greedy_action<R, F>(state: &GameState, mut value_of: F, rng: &mut R) -> Option<Action>
where
    R: Rng + ?Sized,
    F: FnMut(Action) -> f64,
{
    let scored = state
        .available_moves()
        .into_iter()
        .map(|action| (action, value_of(action)))
        .collect::<Vec<(Action, f64)>>();
    let max_value = scored
        .iter()
        .map(|&(_, value)| value)
        .fold(f64::NEG_INFINITY, f64::max);
    let best = scored
        .iter()
        .filter(|&&(_, value)| value == max_value)
        .map(|&(action, _)| action)
        .collect::<Vec<Action>>();
    best.choose(rng).copied()
}
