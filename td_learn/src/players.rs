use crate::board::{evaluate, validate, Action, GameState, Mark, Outcome, StateKey, LINES};
use rand::prelude::SliceRandom;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::{HashMap, HashSet};
use std::io::{self, BufRead};

/// How many malformed or illegal entries a human gets before the move is forfeited.
pub const MAX_INPUT_ATTEMPTS: usize = 3;

/// Anything that can sit at the board.
///
/// The game assigns a mark with `set_mark`, asks for moves with `choose_move`
/// and reports the final result through `end_game`. Returning `None` from
/// `choose_move`, or a move that does not pass [`validate`], aborts the game;
/// both players then get `abort_game` instead of `end_game`.
pub trait Player {
    fn get_name(&self) -> &str;
    fn set_mark(&mut self, mark: Mark);
    fn get_mark(&self) -> Mark;
    fn choose_move(&mut self, state: &GameState) -> Option<Action>;
    fn end_game(&mut self, _outcome: Outcome) {}
    fn abort_game(&mut self) {}
}

fn seeded(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    }
}

/// Plays at random, preferring moves it has not tried yet in the same position.
#[derive(Debug)]
pub struct RandomPlayer {
    pub name: String,
    pub mark: Mark,
    visited: HashSet<(StateKey, Action)>,
    rng: StdRng,
}

impl RandomPlayer {
    pub fn new(name: impl Into<String>, seed: Option<u64>) -> Self {
        RandomPlayer {
            name: name.into(),
            mark: Mark::Empty,
            visited: HashSet::new(),
            rng: seeded(seed),
        }
    }
}

impl Player for RandomPlayer {
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
        let available_moves = state.available_moves();
        let not_visited = available_moves
            .iter()
            .copied()
            .filter(|&mv| !self.visited.contains(&(key, mv)))
            .collect::<Vec<Action>>();
        let mv = if not_visited.is_empty() {
            *available_moves.choose(&mut self.rng)?
        } else {
            *not_visited.choose(&mut self.rng)?
        };
        self.visited.insert((key, mv));
        Some(mv)
    }
}

/// Wins when it can, blocks when it must, otherwise plays like [`RandomPlayer`].
#[derive(Debug)]
pub struct WinBlockingPlayer {
    inner: RandomPlayer,
}

impl WinBlockingPlayer {
    pub fn new(name: impl Into<String>, seed: Option<u64>) -> Self {
        WinBlockingPlayer {
            inner: RandomPlayer::new(name, seed),
        }
    }

    /// Two marks of one side plus one empty cell: that side and the empty cell's position.
    fn check_triple(cells: [Mark; 3]) -> Option<(Mark, usize)> {
        let count = |mark: Mark| cells.iter().filter(|&&cell| cell == mark).count();
        let empty = cells.iter().position(|&cell| cell == Mark::Empty)?;
        match (count(Mark::Cross), count(Mark::Nought), count(Mark::Empty)) {
            (2, 0, 1) => Some((Mark::Cross, empty)),
            (0, 2, 1) => Some((Mark::Nought, empty)),
            _ => None,
        }
    }

    /// Own winning move first; otherwise one of the opponent's winning cells at random.
    fn win_block_move(&mut self, state: &GameState) -> Option<Action> {
        let mark = |(row, col): (usize, usize)| state[(row, col)];
        // Rows and columns interleave per index, then the two diagonals.
        let order = [0, 3, 1, 4, 2, 5, 6, 7];
        let mut block_moves = Vec::new();
        for line in order.iter().map(|&i| LINES[i]) {
            if let Some((side, index)) = Self::check_triple(line.map(mark)) {
                let (row, col) = line[index];
                if side == self.inner.mark {
                    return Some(Action::new(row, col));
                }
                block_moves.push(Action::new(row, col));
            }
        }
        block_moves.choose(&mut self.inner.rng).copied()
    }
}

impl Player for WinBlockingPlayer {
    fn get_name(&self) -> &str {
        self.inner.get_name()
    }
    fn set_mark(&mut self, mark: Mark) {
        self.inner.set_mark(mark);
    }
    fn get_mark(&self) -> Mark {
        self.inner.get_mark()
    }
    fn choose_move(&mut self, state: &GameState) -> Option<Action> {
        self.win_block_move(state)
            .or_else(|| self.inner.choose_move(state))
    }
}

/// Always takes the first empty cell in row-major order.
#[derive(Debug)]
pub struct DummyPlayer {
    pub name: String,
    pub mark: Mark,
}

impl DummyPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        DummyPlayer {
            name: name.into(),
            mark: Mark::Empty,
        }
    }
}

impl Player for DummyPlayer {
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
        state.available_moves().first().copied()
    }
}

/// Perfect play by exhaustive search, preferring quicker wins and slower losses.
#[derive(Debug)]
pub struct MinimaxPlayer {
    pub name: String,
    pub mark: Mark,
    memo: HashMap<StateKey, i32>,
}

impl MinimaxPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        MinimaxPlayer {
            name: name.into(),
            mark: Mark::Empty,
            memo: HashMap::new(),
        }
    }

    /// Score of `state` for this player's mark with `to_move` about to play.
    pub fn minimax(&mut self, state: &mut GameState, to_move: Mark) -> i32 {
        let key = state.to_state_key();
        if let Some(&score) = self.memo.get(&key) {
            return score;
        }
        let remaining = state.count(Mark::Empty) as i32;
        let score = match evaluate(state) {
            Outcome::Drawn => 0,
            Outcome::InPlay => {
                let mut scores = Vec::with_capacity(remaining as usize);
                for mv in state.available_moves() {
                    state.place(mv, to_move);
                    scores.push(self.minimax(state, to_move.other()));
                    state.place(mv, Mark::Empty);
                }
                if to_move == self.mark {
                    scores.into_iter().max().unwrap_or(0)
                } else {
                    scores.into_iter().min().unwrap_or(0)
                }
            }
            outcome if outcome.winner() == Some(self.mark) => 1 + remaining,
            _ => -1 - remaining,
        };
        self.memo.insert(key, score);
        score
    }
}

impl Player for MinimaxPlayer {
    fn get_name(&self) -> &str {
        &self.name
    }
    fn set_mark(&mut self, mark: Mark) {
        if mark != Mark::Empty && mark != self.mark {
            self.mark = mark;
            self.memo.clear();
        }
    }
    fn get_mark(&self) -> Mark {
        self.mark
    }
    fn choose_move(&mut self, state: &GameState) -> Option<Action> {
        let mut scratch = state.clone();
        let mut best: Option<(Action, i32)> = None;
        for mv in state.available_moves() {
            scratch.place(mv, self.mark);
            let score = self.minimax(&mut scratch, self.mark.other());
            scratch.place(mv, Mark::Empty);
            if best.map_or(true, |(_, best_score)| score > best_score) {
                best = Some((mv, score));
            }
        }
        best.map(|(mv, _)| mv)
    }
}

/// A person typing `row,col` (0-indexed) on some input stream.
pub struct HumanPlayer {
    pub name: String,
    pub mark: Mark,
    input: Box<dyn BufRead>,
}

impl std::fmt::Debug for HumanPlayer {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("HumanPlayer")
            .field("name", &self.name)
            .field("mark", &self.mark)
            .finish()
    }
}

impl HumanPlayer {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_input(name, io::stdin().lock())
    }

    pub fn with_input(name: impl Into<String>, input: impl BufRead + 'static) -> Self {
        HumanPlayer {
            name: name.into(),
            mark: Mark::Empty,
            input: Box::new(input),
        }
    }
}

impl Player for HumanPlayer {
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
        println!("{state}");
        for _ in 0..MAX_INPUT_ATTEMPTS {
            println!("{}, your move as row,col (0-2):", self.name);
            let mut line = String::new();
            match self.input.read_line(&mut line) {
                Ok(0) | Err(_) => return None,
                Ok(_) => {}
            }
            match line.trim().parse::<Action>() {
                Ok(mv) if validate(state, Some(mv)) => return Some(mv),
                Ok(mv) => println!("{mv} is not an empty cell, please choose another one."),
                Err(e) => println!("{e}, please try again."),
            }
        }
        println!("You tried {MAX_INPUT_ATTEMPTS} times.");
        None
    }
    fn end_game(&mut self, outcome: Outcome) {
        match outcome.winner() {
            None => println!("The game ended in a draw."),
            Some(mark) if mark == self.mark => println!("Congratulations, {}! You have won!", self.name),
            Some(_) => println!("Really sorry, {}, you have lost.", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn board(s: &str) -> GameState {
        s.parse().unwrap()
    }

    #[test]
    fn check_triple() {
        use Mark::*;
        assert_eq!(WinBlockingPlayer::check_triple([Cross, Empty, Cross]), Some((Cross, 1)));
        assert_eq!(WinBlockingPlayer::check_triple([Empty, Nought, Nought]), Some((Nought, 0)));
        assert_eq!(WinBlockingPlayer::check_triple([Cross, Nought, Empty]), None);
        assert_eq!(WinBlockingPlayer::check_triple([Empty, Empty, Cross]), None);
    }

    fn blocker(mark: Mark) -> WinBlockingPlayer {
        let mut player = WinBlockingPlayer::new("blocker", Some(1));
        player.set_mark(mark);
        player
    }

    #[test]
    fn blocker_takes_its_win() {
        assert_eq!(blocker(Mark::Cross).choose_move(&board("XX-/OO-/---")), Some(Action::new(0, 2)));
        assert_eq!(blocker(Mark::Nought).choose_move(&board("XO-/XO-/--X")), Some(Action::new(2, 1)));
        assert_eq!(blocker(Mark::Cross).choose_move(&board("XO-/OX-/---")), Some(Action::new(2, 2)));
        assert_eq!(blocker(Mark::Nought).choose_move(&board("X-O/XO-/---")), Some(Action::new(2, 0)));
    }

    #[test]
    fn blocker_blocks_the_opponent() {
        assert_eq!(blocker(Mark::Nought).choose_move(&board("XX-/O--/---")), Some(Action::new(0, 2)));
        assert_eq!(blocker(Mark::Cross).choose_move(&board("O--/O--/-X-")), Some(Action::new(2, 0)));
        assert_eq!(blocker(Mark::Nought).choose_move(&board("X--/-X-/O--")), Some(Action::new(2, 2)));
    }

    #[test]
    fn blocker_falls_back_to_random() {
        let state = board("X--/---/---");
        let mv = blocker(Mark::Nought).choose_move(&state).unwrap();
        assert!(validate(&state, Some(mv)));
    }

    #[test]
    fn random_player_prefers_untried_moves() {
        let mut player = RandomPlayer::new("random", Some(5));
        player.set_mark(Mark::Cross);
        let state = board("XO-/XO-/O-X");
        let mut seen = HashSet::new();
        for _ in 0..3 {
            seen.insert(player.choose_move(&state).unwrap());
        }
        assert_eq!(seen.len(), 3);
        let again = player.choose_move(&state).unwrap();
        assert!(seen.contains(&again));
        assert_eq!(player.choose_move(&board("XOX/XOO/OXX")), None);
    }

    #[test]
    fn dummy_takes_first_empty_cell() {
        let mut player = DummyPlayer::new("dummy");
        assert_eq!(player.choose_move(&board("XO-/---/---")), Some(Action::new(0, 2)));
        assert_eq!(player.choose_move(&board("XOX/XOO/OXX")), None);
    }

    #[test]
    fn minimax_wins_and_blocks() {
        let mut player = MinimaxPlayer::new("minimax");
        player.set_mark(Mark::Cross);
        assert_eq!(player.choose_move(&board("XX-/OO-/---")), Some(Action::new(0, 2)));
        let mut player = MinimaxPlayer::new("minimax");
        player.set_mark(Mark::Nought);
        assert_eq!(player.choose_move(&board("XX-/O--/---")), Some(Action::new(0, 2)));
    }

    #[test]
    fn human_retries_then_succeeds() {
        let input = Cursor::new("banana\n0,0\n1,1\n");
        let mut human = HumanPlayer::with_input("Ada", input);
        human.set_mark(Mark::Nought);
        let state = board("X--/---/---");
        assert_eq!(human.choose_move(&state), Some(Action::new(1, 1)));
    }

    #[test]
    fn human_gives_up_after_bounded_attempts() {
        let input = Cursor::new("9,9\n1\n0,0\n2,2\n");
        let mut human = HumanPlayer::with_input("Ada", input);
        let state = board("X--/---/---");
        assert_eq!(human.choose_move(&state), None);
    }

    #[test]
    fn human_input_ends() {
        let mut human = HumanPlayer::with_input("Ada", Cursor::new(""));
        assert_eq!(human.choose_move(&GameState::new()), None);
    }
}
