use crate::error::{Error, Result};
use crate::learner::Rewards;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

pub const LEARNING_RATE: f64 = 0.1;
pub const DISCOUNT_RATE: f64 = 0.9;
pub const EXPLORATION_RATE: f64 = 0.1;

pub const NUM_EPISODES: usize = 300;
pub const GAMES_PER_EPISODE: usize = 200;

/// Hyper-parameters of a TD learner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TdConfig {
    /// Step size of the TD update.
    pub alpha: f64,
    /// Discount applied to the bootstrapped value.
    pub gamma: f64,
    /// Exploration probability before any decay.
    pub epsilon: f64,
    /// Multiplicative decay applied once per action selection.
    pub epsilon_decay: Option<f64>,
    /// When false the agent plays from its table without changing it.
    pub learning: bool,
    pub rewards: Rewards,
    /// Seed for exploration and tie-breaking; `None` draws one from the OS.
    pub seed: Option<u64>,
}

impl Default for TdConfig {
    fn default() -> Self {
        TdConfig {
            alpha: LEARNING_RATE,
            gamma: DISCOUNT_RATE,
            epsilon: EXPLORATION_RATE,
            epsilon_decay: None,
            learning: true,
            rewards: Rewards::default(),
            seed: None,
        }
    }
}

impl TdConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub episodes: usize,
    pub games_per_episode: usize,
    /// Cross's exploration rate during the first episodes.
    pub epsilon: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            episodes: NUM_EPISODES,
            games_per_episode: GAMES_PER_EPISODE,
            epsilon: EXPLORATION_RATE,
        }
    }
}

impl TrainingConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        read_json(path)
    }

    /// Flat for the first 350 episodes, then `epsilon / sqrt(episode / 100)`.
    ///
    /// The division is integral, so the rate drops in steps of a hundred episodes.
    pub fn epsilon_for_episode(&self, episode: usize) -> f64 {
        if episode < 350 {
            self.epsilon
        } else {
            self.epsilon / ((episode / 100) as f64).sqrt()
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|source| Error::Io {
        operation: "open",
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: TdConfig = serde_json::from_str(r#"{"alpha": 0.5, "rewards": {"draw": 0.5}}"#).unwrap();
        assert_eq!(cfg.alpha, 0.5);
        assert_eq!(cfg.gamma, DISCOUNT_RATE);
        assert_eq!(cfg.rewards.draw, 0.5);
        assert_eq!(cfg.rewards.win, 1.0);
        assert!(cfg.learning);
        assert_eq!(cfg.epsilon_decay, None);
    }

    #[test]
    fn config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"epsilon": 0.0, "learning": false, "seed": 7}}"#).unwrap();
        let cfg = TdConfig::from_json_file(file.path()).unwrap();
        assert_eq!(cfg.epsilon, 0.0);
        assert!(!cfg.learning);
        assert_eq!(cfg.seed, Some(7));
    }

    #[test]
    fn bad_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            TrainingConfig::from_json_file(file.path()),
            Err(Error::Json(_))
        ));
    }

    #[test]
    fn epsilon_schedule() {
        let cfg = TrainingConfig::default();
        assert_eq!(cfg.epsilon_for_episode(0), 0.1);
        assert_eq!(cfg.epsilon_for_episode(349), 0.1);
        assert_eq!(cfg.epsilon_for_episode(400), 0.1 / 2.0);
        assert_eq!(cfg.epsilon_for_episode(499), 0.1 / 2.0);
        assert!((cfg.epsilon_for_episode(900) - 0.1 / 3.0).abs() < 1e-12);
    }
}
