//! Head-to-head statistics between two agents.
//!
//! Each helper plays `games` games with the first agent as Cross, then `games`
//! games with the seats swapped. Learning agents keep learning while they play.

use crate::board::{Mark, Outcome};
use crate::learner::Rewards;
use crate::players::Player;
use crate::{Game, Result};
use log::info;
use serde::Serialize;
use std::fmt;

/// Average reward per game for each agent on each side.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct RewardReport {
    pub agent1_x: f64,
    pub agent2_o: f64,
    pub agent1_o: f64,
    pub agent2_x: f64,
}

impl fmt::Display for RewardReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "agent1_x {:.3}  agent2_o {:.3}  agent1_o {:.3}  agent2_x {:.3}",
            self.agent1_x, self.agent2_o, self.agent1_o, self.agent2_x
        )
    }
}

/// Share of games ending in each result, per seating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FrequencyReport {
    pub agent1_x_win: f64,
    pub agent2_o_win: f64,
    pub agent1_x_agent2_o_draw: f64,
    pub agent2_x_win: f64,
    pub agent1_o_win: f64,
    pub agent2_x_agent1_o_draw: f64,
}

impl fmt::Display for FrequencyReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(
            f,
            "agent1 as X: win {:.3} draw {:.3} lose {:.3}",
            self.agent1_x_win, self.agent1_x_agent2_o_draw, self.agent2_o_win
        )?;
        write!(
            f,
            "agent1 as O: win {:.3} draw {:.3} lose {:.3}",
            self.agent1_o_win, self.agent2_x_agent1_o_draw, self.agent2_x_win
        )
    }
}

fn play_series(
    player_x: &mut dyn Player,
    player_o: &mut dyn Player,
    games: usize,
    mut record: impl FnMut(Outcome),
) -> Result<()> {
    let mut game = Game::new(player_x, player_o);
    for _ in 0..games {
        record(game.play()?);
    }
    Ok(())
}

pub fn average_rewards(
    agent1: &mut dyn Player,
    agent2: &mut dyn Player,
    games: usize,
    rewards: &Rewards,
) -> Result<RewardReport> {
    let mut report = RewardReport::default();
    if games == 0 {
        return Ok(report);
    }
    let share = 1.0 / games as f64;
    play_series(agent1, agent2, games, |outcome| {
        report.agent1_x += rewards.reward(outcome, Mark::Cross) * share;
        report.agent2_o += rewards.reward(outcome, Mark::Nought) * share;
    })?;
    play_series(agent2, agent1, games, |outcome| {
        report.agent2_x += rewards.reward(outcome, Mark::Cross) * share;
        report.agent1_o += rewards.reward(outcome, Mark::Nought) * share;
    })?;
    info!("{games} games per side: {report}");
    Ok(report)
}

pub fn winner_frequencies(
    agent1: &mut dyn Player,
    agent2: &mut dyn Player,
    games: usize,
) -> Result<FrequencyReport> {
    let mut report = FrequencyReport::default();
    if games == 0 {
        return Ok(report);
    }
    let share = 1.0 / games as f64;
    play_series(agent1, agent2, games, |outcome| match outcome.winner() {
        Some(Mark::Cross) => report.agent1_x_win += share,
        Some(_) => report.agent2_o_win += share,
        None => report.agent1_x_agent2_o_draw += share,
    })?;
    play_series(agent2, agent1, games, |outcome| match outcome.winner() {
        Some(Mark::Cross) => report.agent2_x_win += share,
        Some(_) => report.agent1_o_win += share,
        None => report.agent2_x_agent1_o_draw += share,
    })?;
    info!("{games} games per side:\n{report}");
    Ok(report)
}
