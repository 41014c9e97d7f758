//! Command line front end: train agents against each other, evaluate a trained
//! one, play against one, or dump a snapshot as CSV records.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use td_learn::config::{TdConfig, TrainingConfig};
use td_learn::experiment::{average_rewards, winner_frequencies, FrequencyReport};
use td_learn::learner::{QLearningAgent, SarsaAgent};
use td_learn::players::{DummyPlayer, HumanPlayer, MinimaxPlayer, Player, RandomPlayer, WinBlockingPlayer};
use td_learn::q_table::{dated_file_name, QTable};
use td_learn::{Error, Game};

#[derive(Parser)]
#[command(name = "arena")]
#[command(version, about = "Tic-tac-toe arena for SARSA and Q-learning agents", long_about = None)]
struct Cli {
    /// Log every move and decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train two agents against each other
    Train {
        #[arg(long, value_enum, default_value_t = AgentKind::Sarsa)]
        x: AgentKind,
        #[arg(long, value_enum, default_value_t = AgentKind::Blocker)]
        o: AgentKind,
        /// Learner hyper-parameters (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Episode schedule (JSON)
        #[arg(long)]
        training: Option<PathBuf>,
        #[arg(long)]
        episodes: Option<usize>,
        #[arg(long)]
        games: Option<usize>,
        /// Directory for the snapshots of the learning agents
        #[arg(long, default_value = ".")]
        out: PathBuf,
    },

    /// Play a frozen trained agent against another agent and report win rates
    Evaluate {
        #[arg(long, value_enum, default_value_t = AgentKind::Sarsa)]
        kind: AgentKind,
        /// Snapshot of the trained agent
        #[arg(long)]
        table: PathBuf,
        #[arg(long, value_enum, default_value_t = AgentKind::Blocker)]
        against: AgentKind,
        #[arg(long, default_value_t = 100)]
        episodes: usize,
        /// Games per side in each episode
        #[arg(long, default_value_t = 100)]
        games: usize,
    },

    /// Play against an agent; the side is drawn at random for every game
    Play {
        #[arg(long, value_enum, default_value_t = AgentKind::Sarsa)]
        kind: AgentKind,
        /// Snapshot to load into a learning agent
        #[arg(long)]
        table: Option<PathBuf>,
        #[arg(long, default_value = "Player")]
        name: String,
        #[arg(long, default_value_t = 1)]
        games: usize,
    },

    /// Convert a snapshot into CSV records
    Export {
        #[arg(long)]
        table: PathBuf,
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum AgentKind {
    Sarsa,
    QLearning,
    Random,
    Blocker,
    Dummy,
    Minimax,
}

enum Contender {
    Sarsa(SarsaAgent),
    QLearning(QLearningAgent),
    Other(Box<dyn Player>),
}

impl Contender {
    fn new(kind: AgentKind, config: &TdConfig) -> Self {
        match kind {
            AgentKind::Sarsa => Contender::Sarsa(SarsaAgent::new(config)),
            AgentKind::QLearning => Contender::QLearning(QLearningAgent::new(config)),
            AgentKind::Random => Contender::Other(Box::new(RandomPlayer::new("RandomAgent", config.seed))),
            AgentKind::Blocker => {
                Contender::Other(Box::new(WinBlockingPlayer::new("WinBlockingRandomAgent", config.seed)))
            }
            AgentKind::Dummy => Contender::Other(Box::new(DummyPlayer::new("DummyAgent"))),
            AgentKind::Minimax => Contender::Other(Box::new(MinimaxPlayer::new("MinimaxAgent"))),
        }
    }

    fn player(&mut self) -> &mut dyn Player {
        match self {
            Contender::Sarsa(agent) => agent,
            Contender::QLearning(agent) => agent,
            Contender::Other(player) => player.as_mut(),
        }
    }

    fn set_epsilon(&mut self, epsilon: f64) {
        match self {
            Contender::Sarsa(agent) => agent.set_epsilon(epsilon),
            Contender::QLearning(agent) => agent.set_epsilon(epsilon),
            Contender::Other(_) => {}
        }
    }

    fn epsilon(&self) -> Option<f64> {
        match self {
            Contender::Sarsa(agent) => Some(agent.epsilon()),
            Contender::QLearning(agent) => Some(agent.epsilon()),
            Contender::Other(_) => None,
        }
    }

    fn restore(&mut self, path: &Path) -> Result<()> {
        match self {
            Contender::Sarsa(agent) => agent.restore(path)?,
            Contender::QLearning(agent) => agent.restore(path)?,
            Contender::Other(player) => {
                anyhow::bail!("{} does not learn and has no table to load", player.get_name())
            }
        }
        Ok(())
    }

    fn restore_or_fresh(&mut self, path: &Path) -> bool {
        match self {
            Contender::Sarsa(agent) => agent.restore_or_fresh(path),
            Contender::QLearning(agent) => agent.restore_or_fresh(path),
            Contender::Other(_) => false,
        }
    }

    fn snapshot(&self, dir: &Path, side: &str) -> Result<Option<PathBuf>> {
        let (prefix, table) = match self {
            Contender::Sarsa(agent) => ("qtable-sarsa", agent.table()),
            Contender::QLearning(agent) => ("qtable-q-learning", agent.table()),
            Contender::Other(_) => return Ok(None),
        };
        let path = dir.join(dated_file_name(&format!("{prefix}-{side}"), "pickle"));
        table
            .snapshot_to_disk(&path)
            .with_context(|| format!("Saving the {side} table"))?;
        Ok(Some(path))
    }
}

fn train(
    x: AgentKind,
    o: AgentKind,
    td: TdConfig,
    training: TrainingConfig,
    out: &Path,
) -> Result<()> {
    let mut player_x = Contender::new(x, &td);
    let mut player_o = Contender::new(o, &TdConfig {
        seed: td.seed.map(|seed| seed.wrapping_add(1)),
        ..td.clone()
    });
    for episode in 0..training.episodes {
        start_episode(&mut player_x, &mut player_o, &training, &td, episode);
        let report = average_rewards(
            player_x.player(),
            player_o.player(),
            training.games_per_episode,
            &td.rewards,
        )
        .with_context(|| format!("Episode {episode}"))?;
        info!("episode {episode}: {report}");
    }
    std::fs::create_dir_all(out).with_context(|| format!("Creating {}", out.display()))?;
    for (contender, side) in [(&player_x, "x"), (&player_o, "o")] {
        if let Some(path) = contender.snapshot(out, side)? {
            println!("Saved {} table to {}", side, path.display());
        }
    }
    Ok(())
}

/// Both sides restart their exploration schedule: Cross from the episode
/// schedule, Nought from the configured rate.
fn start_episode(
    player_x: &mut Contender,
    player_o: &mut Contender,
    training: &TrainingConfig,
    td: &TdConfig,
    episode: usize,
) {
    player_x.set_epsilon(training.epsilon_for_episode(episode));
    player_o.set_epsilon(td.epsilon);
    debug!(
        "episode {episode}: epsilon x {:?}, o {:?}",
        player_x.epsilon(),
        player_o.epsilon()
    );
}

fn frozen_config() -> TdConfig {
    TdConfig {
        epsilon: 0.0,
        learning: false,
        ..TdConfig::default()
    }
}

fn evaluate(
    kind: AgentKind,
    table: &Path,
    against: AgentKind,
    episodes: usize,
    games: usize,
) -> Result<Vec<FrequencyReport>> {
    let mut agent = Contender::new(kind, &frozen_config());
    agent
        .restore(table)
        .with_context(|| format!("Loading {}", table.display()))?;
    let mut opponent = Contender::new(against, &TdConfig::default());
    let mut reports = Vec::with_capacity(episodes);
    for episode in 0..episodes {
        let report = winner_frequencies(agent.player(), opponent.player(), games)
            .with_context(|| format!("Episode {episode}"))?;
        info!("episode {episode}:\n{report}");
        reports.push(report);
    }
    Ok(reports)
}

fn play(kind: AgentKind, table: Option<PathBuf>, name: String, games: usize) -> Result<()> {
    let mut agent = Contender::new(kind, &frozen_config());
    if let Some(path) = table {
        if !agent.restore_or_fresh(&path) {
            warn!("{} could not be loaded, the agent learns from scratch", path.display());
        }
    }
    let mut human = HumanPlayer::new(name);
    let played = play_session(agent.player(), &mut human, games)?;
    info!("{played} of {games} games played");
    Ok(())
}

/// Up to `games` games, sides drawn at random each time. Stops at the first
/// illegal move and returns how many games were finished.
fn play_session(agent: &mut dyn Player, human: &mut dyn Player, games: usize) -> Result<usize> {
    for played in 0..games {
        let human_first = rand::random::<bool>();
        let result = if human_first {
            Game::new(&mut *human, &mut *agent).play()
        } else {
            Game::new(&mut *agent, &mut *human).play()
        };
        match result {
            Ok(outcome) => info!("game over: {outcome}"),
            Err(Error::IllegalMove { player, .. }) => {
                println!("{player} did not make a valid move, game over.");
                return Ok(played);
            }
            Err(e) => return Err(e).context("Playing the game"),
        }
    }
    Ok(games)
}

fn export(table: &Path, csv: &Path) -> Result<()> {
    let q = QTable::restore_from_disk(table)
        .with_context(|| format!("Loading {}", table.display()))?;
    q.save_records(csv)
        .with_context(|| format!("Writing {}", csv.display()))?;
    println!("{} entries over {} states written to {}", q.len(), q.states().len(), csv.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        simplelog::LevelFilter::Debug
    } else {
        simplelog::LevelFilter::Info
    };
    simplelog::TermLogger::init(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    match cli.command {
        Commands::Train {
            x,
            o,
            config,
            training,
            episodes,
            games,
            out,
        } => {
            let td = match config {
                Some(path) => TdConfig::from_json_file(&path).context("Reading learner config")?,
                None => TdConfig::default(),
            };
            let mut schedule = match training {
                Some(path) => TrainingConfig::from_json_file(&path).context("Reading training config")?,
                None => TrainingConfig::default(),
            };
            if let Some(episodes) = episodes {
                schedule.episodes = episodes;
            }
            if let Some(games) = games {
                schedule.games_per_episode = games;
            }
            train(x, o, td, schedule, &out)
        }
        Commands::Evaluate {
            kind,
            table,
            against,
            episodes,
            games,
        } => evaluate(kind, &table, against, episodes, games).map(|_| ()),
        Commands::Play {
            kind,
            table,
            name,
            games,
        } => play(kind, table, name, games),
        Commands::Export { table, csv } => export(&table, &csv),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use td_learn::players::DummyPlayer;

    #[test]
    fn evaluate_defaults() {
        let cli = Cli::try_parse_from(["arena", "evaluate", "--table", "q.pickle", "--against", "minimax"]).unwrap();
        match cli.command {
            Commands::Evaluate {
                kind,
                table,
                against,
                episodes,
                games,
            } => {
                assert_eq!(kind, AgentKind::Sarsa);
                assert_eq!(table, PathBuf::from("q.pickle"));
                assert_eq!(against, AgentKind::Minimax);
                assert_eq!((episodes, games), (100, 100));
            }
            _ => panic!("expected the evaluate command"),
        }
    }

    #[test]
    fn both_sides_restart_exploration_each_episode() {
        let td = TdConfig {
            epsilon: 0.2,
            epsilon_decay: Some(0.5),
            seed: Some(1),
            ..TdConfig::default()
        };
        let training = TrainingConfig {
            epsilon: 0.3,
            ..TrainingConfig::default()
        };
        let mut x = Contender::new(AgentKind::Sarsa, &td);
        let mut o = Contender::new(AgentKind::QLearning, &td);
        start_episode(&mut x, &mut o, &training, &td, 0);
        average_rewards(x.player(), o.player(), 5, &td.rewards).unwrap();
        assert!(o.epsilon().unwrap() < td.epsilon);
        start_episode(&mut x, &mut o, &training, &td, 400);
        assert_eq!(o.epsilon(), Some(0.2));
        assert_eq!(x.epsilon(), Some(0.3 / 2.0));
    }

    #[test]
    fn evaluate_reports_every_episode() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("sarsa.pickle");
        let td = TdConfig {
            seed: Some(3),
            ..TdConfig::default()
        };
        let mut sarsa = SarsaAgent::new(&td);
        let mut dummy = DummyPlayer::new("dummy");
        average_rewards(&mut sarsa, &mut dummy, 20, &td.rewards)?;
        sarsa.snapshot(&path)?;

        let reports = evaluate(AgentKind::Sarsa, &path, AgentKind::Blocker, 3, 10)?;
        assert_eq!(reports.len(), 3);
        for report in &reports {
            let as_x = report.agent1_x_win + report.agent2_o_win + report.agent1_x_agent2_o_draw;
            assert!((as_x - 1.0).abs() < 1e-9);
        }
        let missing = dir.path().join("missing.pickle");
        assert!(evaluate(AgentKind::Sarsa, &missing, AgentKind::Blocker, 1, 1).is_err());
        assert!(evaluate(AgentKind::Dummy, &path, AgentKind::Blocker, 1, 1).is_err());
        Ok(())
    }

    #[test]
    fn play_session_runs_several_games() -> Result<()> {
        let mut agent = DummyPlayer::new("agent");
        let mut other = DummyPlayer::new("other");
        assert_eq!(play_session(&mut agent, &mut other, 3)?, 3);
        let mut human = HumanPlayer::with_input("Ada", Cursor::new(""));
        assert_eq!(play_session(&mut agent, &mut human, 3)?, 0);
        Ok(())
    }
}
