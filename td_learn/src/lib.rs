use crate::board::{evaluate, validate, Action, GameState, Mark, Outcome};
use crate::players::Player;
use log::debug;

pub mod board;
pub mod config;
pub mod error;
pub mod experiment;
pub mod learner;
pub mod players;
pub mod policy;
pub mod q_table;

pub use error::{Error, Result};

/// One table, two players. Cross always moves first.
pub struct Game<'a> {
    pub board: GameState,
    pub player_x: &'a mut dyn Player,
    pub player_o: &'a mut dyn Player,

    step: usize,
    moves: Vec<Action>,
    verbose: bool,
}

impl<'a> Game<'a> {
    pub fn new(player_x: &'a mut dyn Player, player_o: &'a mut dyn Player) -> Self {
        player_x.set_mark(Mark::Cross);
        player_o.set_mark(Mark::Nought);
        Game {
            board: GameState::new(),
            player_x,
            player_o,
            step: 0,
            moves: Vec::with_capacity(9),
            verbose: false,
        }
    }

    /// Log the board after every half-move.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Half-moves made in the current game.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn moves(&self) -> &[Action] {
        &self.moves
    }

    /// Plays one game from an empty board.
    ///
    /// Players are told the result through `end_game`, Cross first. A move that
    /// fails [`validate`] ends the game at once with [`Error::IllegalMove`];
    /// both players get `abort_game` and no result.
    pub fn play(&mut self) -> Result<Outcome> {
        self.board = GameState::new();
        self.step = 0;
        self.moves.clear();
        let mut outcome = Outcome::InPlay;
        while outcome == Outcome::InPlay {
            let player = if self.step % 2 == 0 {
                &mut *self.player_x
            } else {
                &mut *self.player_o
            };
            let mark = player.get_mark();
            let action = player.choose_move(&self.board);
            let action = match action {
                Some(action) if validate(&self.board, Some(action)) => action,
                _ => {
                    let player = player.get_name().to_owned();
                    self.player_x.abort_game();
                    self.player_o.abort_game();
                    return Err(Error::IllegalMove { player, action });
                }
            };
            self.board.place(action, mark);
            self.moves.push(action);
            self.step += 1;
            outcome = evaluate(&self.board);
            debug!("step {}: {} plays {} at {action}", self.step, player.get_name(), mark.as_char());
            if self.verbose {
                debug!("\n{}", self.board);
            }
        }
        debug!("game over after {} moves: {outcome}", self.step);
        self.player_x.end_game(outcome);
        self.player_o.end_game(outcome);
        Ok(outcome)
    }
}
