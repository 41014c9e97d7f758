//! Tabular TD control: SARSA (on-policy) and Q-learning (off-policy).
//!
//! Both learners share [`TdAgent`], which owns the value table, the
//! epsilon-greedy policy and the per-game session. The only difference between
//! them is the [`UpdateRule`] that decides which value of the next state the
//! previous state-action pair is moved towards:
//!
//! ```text
//! SARSA:       Q(s,a) += alpha * (r(s') + gamma * Q(s',a')        - Q(s,a))
//! Q-learning:  Q(s,a) += alpha * (r(s') + gamma * max_b Q(s',b)   - Q(s,a))
//! terminal:    Q(s,a) += alpha * (r(final)                        - Q(s,a))
//! ```

use crate::board::{evaluate, Action, GameState, Mark, Outcome, StateKey};
use crate::config::TdConfig;
use crate::error::Result;
use crate::players::Player;
use crate::policy::{Decision, EpsilonGreedy};
use crate::q_table::QTable;
use itertools::Itertools;
use log::{debug, trace, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Scalar rewards for a game outcome seen from one side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rewards {
    pub win: f64,
    pub draw: f64,
    pub lose: f64,
    pub not_finished: f64,
}

impl Default for Rewards {
    fn default() -> Self {
        Rewards {
            win: 1.0,
            draw: 0.0,
            lose: -1.0,
            not_finished: 0.0,
        }
    }
}

impl Rewards {
    pub fn reward(&self, outcome: Outcome, side: Mark) -> f64 {
        match outcome {
            Outcome::InPlay => self.not_finished,
            Outcome::Drawn => self.draw,
            _ if outcome.winner() == Some(side) => self.win,
            _ => self.lose,
        }
    }
}

/// Chooses the value of the next state used as the TD target.
pub trait UpdateRule: fmt::Debug + Default {
    const NAME: &'static str;

    /// Value of `next` that the previous pair is corrected towards, given the
    /// value of the action just chosen there.
    fn target_value(&self, next: &StateKey, chosen_value: f64) -> f64;

    /// Called after every selection with the chosen action's value.
    fn observe(&mut self, _next: StateKey, _chosen_value: f64) {}

    /// Drops anything derived from the table's previous contents.
    fn clear(&mut self) {}
}

/// On-policy: bootstraps from the action the policy actually picked.
#[derive(Clone, Debug, Default)]
pub struct Sarsa;

impl UpdateRule for Sarsa {
    const NAME: &'static str = "SarsaAgent";

    fn target_value(&self, _next: &StateKey, chosen_value: f64) -> f64 {
        chosen_value
    }
}

/// Off-policy: bootstraps from the best value seen so far at the next state.
///
/// The maximum is a running cache fed by [`UpdateRule::observe`], not a scan
/// of the table. It only ever grows, so it can lag behind an entry that was
/// later updated downwards; that approximation is kept on purpose.
#[derive(Clone, Debug, Default)]
pub struct QLearning {
    max_values: HashMap<StateKey, f64>,
}

impl QLearning {
    pub fn max_value(&self, key: &StateKey) -> Option<f64> {
        self.max_values.get(key).copied()
    }
}

impl UpdateRule for QLearning {
    const NAME: &'static str = "QLearningAgent";

    fn target_value(&self, next: &StateKey, _chosen_value: f64) -> f64 {
        self.max_value(next).unwrap_or(0.0)
    }

    fn observe(&mut self, next: StateKey, chosen_value: f64) {
        self.max_values
            .entry(next)
            .and_modify(|max| {
                if chosen_value > *max {
                    *max = chosen_value;
                }
            })
            .or_insert(chosen_value);
    }

    fn clear(&mut self) {
        self.max_values.clear();
    }
}

/// What the agent remembers between two of its own moves in one game.
///
/// `previous` is `None` until the first move of a game, so that move only selects.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
struct Session {
    previous: Option<(StateKey, Action)>,
    prev_value: f64,
}

#[derive(Debug)]
pub struct TdAgent<R: UpdateRule> {
    name: String,
    mark: Mark,
    table: QTable,
    policy: EpsilonGreedy,
    steps: u64,
    alpha: f64,
    gamma: f64,
    learning: bool,
    rewards: Rewards,
    rule: R,
    session: Session,
    rng: StdRng,
}

pub type SarsaAgent = TdAgent<Sarsa>;
pub type QLearningAgent = TdAgent<QLearning>;

impl<R: UpdateRule> TdAgent<R> {
    pub fn new(config: &TdConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        TdAgent {
            name: R::NAME.to_owned(),
            mark: Mark::Empty,
            table: QTable::new(),
            policy: EpsilonGreedy::new(config.epsilon, config.epsilon_decay),
            steps: 0,
            alpha: config.alpha,
            gamma: config.gamma,
            learning: config.learning,
            rewards: config.rewards,
            rule: R::default(),
            session: Session::default(),
            rng,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_table(mut self, table: QTable) -> Self {
        self.replace_table(table);
        self
    }

    pub fn table(&self) -> &QTable {
        &self.table
    }

    pub fn rule(&self) -> &R {
        &self.rule
    }

    /// Swaps in another table; anything cached from the old one is dropped.
    pub fn replace_table(&mut self, table: QTable) {
        self.table = table;
        self.rule.clear();
    }

    pub fn is_learning(&self) -> bool {
        self.learning
    }

    pub fn set_learning(&mut self, learning: bool) {
        self.learning = learning;
    }

    /// Current exploration rate, after the decay of every selection so far.
    pub fn epsilon(&self) -> f64 {
        self.policy.epsilon_at(self.steps)
    }

    /// Restarts the exploration schedule from `epsilon`.
    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.policy.epsilon = epsilon;
        self.steps = 0;
    }

    pub fn save_records(&self, path: &Path) -> Result<()> {
        self.table.save_records(path)
    }

    pub fn snapshot(&self, path: &Path) -> Result<()> {
        self.table.snapshot_to_disk(path)
    }

    pub fn restore(&mut self, path: &Path) -> Result<()> {
        let table = QTable::restore_from_disk(path)?;
        self.replace_table(table);
        Ok(())
    }

    /// Restores the snapshot at `path`, or falls back to an empty table with
    /// learning switched on. Returns whether the snapshot was loaded.
    pub fn restore_or_fresh(&mut self, path: &Path) -> bool {
        match self.restore(path) {
            Ok(()) => true,
            Err(e) => {
                warn!("{}: {e}; starting from an empty table", self.name);
                self.replace_table(QTable::new());
                self.learning = true;
                false
            }
        }
    }

    /// Value table entries for the empty cells of `state`, laid out as a board.
    pub fn value_board(&self, state: &GameState) -> String {
        let key = state.to_state_key();
        state
            .indexed_iter()
            .map(|((row, col), &mark)| match mark {
                Mark::Empty => match self.table.value(&key, Action::new(row, col)) {
                    Some(value) => format!("{value:^7.3}"),
                    None => format!("{:^7}", "?"),
                },
                mark => format!("{:^7}", mark.as_char()),
            })
            .tuples::<(_, _, _)>()
            .map(|(a, b, c)| format!("|{a}|{b}|{c}|"))
            .join("\n")
    }

    fn update_previous(&mut self, reward: f64, next_value: f64) {
        if let Some((key, action)) = self.session.previous {
            let delta = self.alpha * (reward + self.gamma * next_value - self.session.prev_value);
            self.table.add(key, action, delta);
        }
    }
}

impl<R: UpdateRule> Player for TdAgent<R> {
    fn get_name(&self) -> &str {
        &self.name
    }

    fn set_mark(&mut self, mark: Mark) {
        if mark != Mark::Empty {
            self.mark = mark;
        }
    }

    fn get_mark(&self) -> Mark {
        self.mark
    }

    fn choose_move(&mut self, state: &GameState) -> Option<Action> {
        let key = state.to_state_key();
        let outcome = evaluate(state);
        // New entries start at the reward of the state they are taken from.
        let default = self.rewards.reward(outcome, self.mark);
        self.steps += 1;
        let table = &mut self.table;
        let decision = self.policy.select(
            self.steps,
            state,
            |action| table.value_or_insert(key, action, default),
            &mut self.rng,
        )?;
        let action = decision.action();
        match decision {
            Decision::Explore(_) => debug!("{}: exploration move {action}", self.name),
            Decision::Exploit(_) => debug!("{}: exploitation move {action}", self.name),
        }
        let chosen_value = self.table.value_or_insert(key, action, default);
        if self.learning {
            let next_value = self.rule.target_value(&key, chosen_value);
            self.update_previous(default, next_value);
            self.session.previous = Some((key, action));
            self.session.prev_value = chosen_value;
            trace!(
                "{}: {} entries, previous state {key}, action {action}, value {chosen_value}\n{}",
                self.name,
                self.table.len(),
                self.value_board(state)
            );
        }
        self.rule.observe(key, chosen_value);
        Some(action)
    }

    fn end_game(&mut self, outcome: Outcome) {
        let reward = self.rewards.reward(outcome, self.mark);
        if self.learning {
            if let Some((key, action)) = self.session.previous {
                self.table
                    .add(key, action, self.alpha * (reward - self.session.prev_value));
            }
        }
        debug!("{}: game over, {outcome}", self.name);
        self.session = Session::default();
    }

    fn abort_game(&mut self) {
        debug!("{}: game aborted, nothing learned from the last move", self.name);
        self.session = Session::default();
    }
}
