use crate::error::{ParseBoardError, ParseMoveError};
use itertools::{iproduct, Itertools};
use ndarray::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, ops::Deref, str::FromStr};

#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum Mark {
    #[default]
    Empty,
    Cross,
    Nought,
}

impl Mark {
    pub fn other(self) -> Self {
        match self {
            Self::Cross => Mark::Nought,
            Self::Nought => Mark::Cross,
            Self::Empty => Mark::Empty,
        }
    }
    pub fn as_char(self) -> char {
        match self {
            Self::Cross => 'X',
            Self::Nought => 'O',
            Self::Empty => '-',
        }
    }
    /// Cell code used by the value records: 0 empty, 1 cross, 2 nought.
    pub fn code(self) -> u8 {
        match self {
            Self::Empty => 0,
            Self::Cross => 1,
            Self::Nought => 2,
        }
    }
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Mark::Empty),
            1 => Some(Mark::Cross),
            2 => Some(Mark::Nought),
            _ => None,
        }
    }
    fn from_char(c: char) -> Option<Self> {
        match c {
            'X' | 'x' => Some(Mark::Cross),
            'O' | 'o' | '0' => Some(Mark::Nought),
            '-' | '.' | '_' => Some(Mark::Empty),
            _ => None,
        }
    }
}

impl From<Mark> for u8 {
    fn from(mark: Mark) -> u8 {
        mark.code()
    }
}

impl TryFrom<u8> for Mark {
    type Error = String;
    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Mark::from_code(code).ok_or_else(|| format!("unknown cell code {code}"))
    }
}

/// A cell coordinate, 0-indexed.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Action {
    pub row: usize,
    pub col: usize,
}

impl Action {
    pub const fn new(row: usize, col: usize) -> Self {
        Action { row, col }
    }
    /// Row-major cell index, `3 * row + col`.
    pub fn index(self) -> usize {
        3 * self.row + self.col
    }
    pub fn from_index(index: usize) -> Option<Self> {
        (index < 9).then(|| Action::new(index / 3, index % 3))
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

impl TryFrom<&[i64]> for Action {
    type Error = ParseMoveError;
    fn try_from(coords: &[i64]) -> Result<Self, Self::Error> {
        let (row, col) = coords
            .iter()
            .copied()
            .collect_tuple()
            .ok_or(ParseMoveError::Arity(coords.len()))?;
        let row = usize::try_from(row).map_err(|_| ParseMoveError::Negative(row))?;
        let col = usize::try_from(col).map_err(|_| ParseMoveError::Negative(col))?;
        Ok(Action::new(row, col))
    }
}

/// Parses `row,col` or `row col`. Range is checked later by [`validate`].
impl FromStr for Action {
    type Err = ParseMoveError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let coords = s
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<i64>()
                    .map_err(|_| ParseMoveError::NotANumber(part.to_owned()))
            })
            .collect::<Result<Vec<i64>, _>>()?;
        Action::try_from(coords.as_slice())
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Outcome {
    InPlay,
    Drawn,
    CrossWins,
    NoughtWins,
}

impl Outcome {
    pub fn won_by(mark: Mark) -> Self {
        match mark {
            Mark::Cross => Outcome::CrossWins,
            Mark::Nought => Outcome::NoughtWins,
            Mark::Empty => Outcome::InPlay,
        }
    }
    pub fn winner(self) -> Option<Mark> {
        match self {
            Outcome::CrossWins => Some(Mark::Cross),
            Outcome::NoughtWins => Some(Mark::Nought),
            _ => None,
        }
    }
    pub fn is_over(self) -> bool {
        self != Outcome::InPlay
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::InPlay => write!(f, "not finished"),
            Outcome::Drawn => write!(f, "draw"),
            Outcome::CrossWins => write!(f, "X wins"),
            Outcome::NoughtWins => write!(f, "O wins"),
        }
    }
}

/// Canonical, immutable snapshot of a board, used as the value-table key.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct StateKey(pub [[Mark; 3]; 3]);

impl StateKey {
    pub fn cell(&self, row: usize, col: usize) -> Mark {
        self.0[row][col]
    }
    pub fn codes(&self) -> [u8; 9] {
        let mut codes = [0u8; 9];
        for (row, col) in iproduct!(0..3, 0..3) {
            codes[3 * row + col] = self.0[row][col].code();
        }
        codes
    }
    pub fn from_codes(codes: &[u8]) -> Option<Self> {
        if codes.len() != 9 {
            return None;
        }
        let mut cells = [[Mark::Empty; 3]; 3];
        for (i, &code) in codes.iter().enumerate() {
            cells[i / 3][i % 3] = Mark::from_code(code)?;
        }
        Some(StateKey(cells))
    }
    pub fn to_state(&self) -> GameState {
        let mut state = GameState::new();
        for (row, col) in iproduct!(0..3, 0..3) {
            state.state[(row, col)] = self.0[row][col];
        }
        state
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s: String = self.0.iter().flatten().map(|m| m.as_char()).collect();
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameState {
    pub state: Array2<Mark>,
}

impl Deref for GameState {
    type Target = Array2<Mark>;
    fn deref(&self) -> &Self::Target {
        &self.state
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let rows = self
            .iter()
            .map(|m| m.as_char())
            .tuples::<(_, _, _)>()
            .map(|(a, b, c)| format!(" {a} | {b} | {c} "))
            .join("\n---+---+---\n");
        write!(f, "{rows}")
    }
}

/// Nine marks in row-major order; `/`, `|` and whitespace are ignored.
impl FromStr for GameState {
    type Err = ParseBoardError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let marks = s
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '/' && *c != '|')
            .map(Mark::from_char)
            .collect::<Option<Vec<Mark>>>()
            .filter(|marks| marks.len() == 9)
            .ok_or_else(|| ParseBoardError(s.to_owned()))?;
        let state = Array2::from_shape_vec((3, 3), marks).map_err(|_| ParseBoardError(s.to_owned()))?;
        Ok(GameState { state })
    }
}

impl GameState {
    pub fn new() -> Self {
        GameState {
            state: Array::from_elem((3, 3), Mark::Empty),
        }
    }
    pub fn to_state_key(&self) -> StateKey {
        let mut cells = [[Mark::Empty; 3]; 3];
        for ((row, col), &mark) in self.indexed_iter() {
            cells[row][col] = mark;
        }
        StateKey(cells)
    }
    pub fn cell(&self, action: Action) -> Mark {
        self.state[(action.row, action.col)]
    }
    /// Empty cells in row-major order.
    pub fn available_moves(&self) -> Vec<Action> {
        self.indexed_iter()
            .filter(|(_index, &value)| value == Mark::Empty)
            .map(|((row, col), _)| Action::new(row, col))
            .collect()
    }
    pub fn is_full(&self) -> bool {
        self.iter().all(|&value| value != Mark::Empty)
    }
    /// Writes `mark` into the cell without any legality check; callers run [`validate`] first.
    pub fn place(&mut self, action: Action, mark: Mark) {
        self.state[(action.row, action.col)] = mark;
    }
    pub fn count(&self, mark: Mark) -> usize {
        self.iter().filter(|&&value| value == mark).count()
    }
}

/// The eight winning lines, checked in this order: rows, columns, main diagonal, anti-diagonal.
pub const LINES: [[(usize, usize); 3]; 8] = [
    [(0, 0), (0, 1), (0, 2)],
    [(1, 0), (1, 1), (1, 2)],
    [(2, 0), (2, 1), (2, 2)],
    [(0, 0), (1, 0), (2, 0)],
    [(0, 1), (1, 1), (2, 1)],
    [(0, 2), (1, 2), (2, 2)],
    [(0, 0), (1, 1), (2, 2)],
    [(0, 2), (1, 1), (2, 0)],
];

pub fn evaluate(state: &GameState) -> Outcome {
    for line in LINES.iter() {
        let first = state.state[line[0]];
        if first != Mark::Empty && line.iter().all(|&cell| state.state[cell] == first) {
            return Outcome::won_by(first);
        }
    }
    if state.is_full() {
        Outcome::Drawn
    } else {
        Outcome::InPlay
    }
}

/// A move is legal when it exists, lies on the board and targets an empty cell.
pub fn validate(state: &GameState, action: Option<Action>) -> bool {
    match action {
        Some(action) if action.row < 3 && action.col < 3 => state.cell(action) == Mark::Empty,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn board(s: &str) -> GameState {
        s.parse().unwrap()
    }

    #[test]
    fn empty_board_is_in_play() {
        let state = GameState::new();
        assert_eq!(evaluate(&state), Outcome::InPlay);
        assert_eq!(state.available_moves().len(), 9);
        assert_eq!(state.available_moves()[0], Action::new(0, 0));
    }

    #[test]
    fn rows_columns_and_diagonals_win() {
        assert_eq!(evaluate(&board("XXX/OO-/---")), Outcome::CrossWins);
        assert_eq!(evaluate(&board("XX-/OOO/X--")), Outcome::NoughtWins);
        assert_eq!(evaluate(&board("XO-/XO-/X--")), Outcome::CrossWins);
        assert_eq!(evaluate(&board("-XO/XXO/--O")), Outcome::NoughtWins);
        assert_eq!(evaluate(&board("XO-/OX-/--X")), Outcome::CrossWins);
        assert_eq!(evaluate(&board("XXO/XO-/O--")), Outcome::NoughtWins);
    }

    #[test]
    fn full_board_without_line_is_a_draw() {
        assert_eq!(evaluate(&board("XOX/XOO/OXX")), Outcome::Drawn);
    }

    #[test]
    fn one_empty_cell_keeps_game_in_play() {
        assert_eq!(evaluate(&board("XOX/XOO/OX-")), Outcome::InPlay);
    }

    #[test]
    fn validate_rejects_occupied_out_of_range_and_missing_moves() {
        let state = board("X--/-O-/---");
        assert!(validate(&state, Some(Action::new(0, 1))));
        assert!(!validate(&state, Some(Action::new(0, 0))));
        assert!(!validate(&state, Some(Action::new(1, 1))));
        assert!(!validate(&state, Some(Action::new(3, 0))));
        assert!(!validate(&state, Some(Action::new(0, 3))));
        assert!(!validate(&state, None));
    }

    #[test]
    fn malformed_coordinates_are_rejected() {
        assert_eq!(Action::try_from(&[1_i64][..]), Err(ParseMoveError::Arity(1)));
        assert_eq!(Action::try_from(&[1_i64, 2, 0][..]), Err(ParseMoveError::Arity(3)));
        assert_eq!(Action::try_from(&[-1_i64, 2][..]), Err(ParseMoveError::Negative(-1)));
        assert_eq!("1,2".parse::<Action>(), Ok(Action::new(1, 2)));
        assert_eq!(" 2 0 ".parse::<Action>(), Ok(Action::new(2, 0)));
        assert_eq!(
            "a,1".parse::<Action>(),
            Err(ParseMoveError::NotANumber("a".to_owned()))
        );
        assert_eq!("".parse::<Action>(), Err(ParseMoveError::Arity(0)));
    }

    #[test]
    fn action_index_round_trips() {
        for index in 0..9 {
            assert_eq!(Action::from_index(index).unwrap().index(), index);
        }
        assert_eq!(Action::from_index(9), None);
    }

    #[test]
    fn state_key_does_not_alias_the_board() {
        let mut state = board("X--/---/---");
        let key = state.to_state_key();
        state.place(Action::new(2, 2), Mark::Nought);
        assert_eq!(key, board("X--/---/---").to_state_key());
        assert_ne!(key, state.to_state_key());
        assert_eq!(key.to_state(), board("X--/---/---"));
        assert_eq!(key.to_string(), "X--------");
    }

    #[test]
    fn state_key_codes_round_trip() {
        let key = board("XO-/-X-/O--").to_state_key();
        assert_eq!(key.codes(), [1, 2, 0, 0, 1, 0, 2, 0, 0]);
        assert_eq!(StateKey::from_codes(&key.codes()), Some(key));
        assert_eq!(StateKey::from_codes(&[3, 0, 0, 0, 0, 0, 0, 0, 0]), None);
    }

    fn any_board() -> impl Strategy<Value = GameState> {
        prop::collection::vec(0u8..3, 9).prop_map(|codes| {
            StateKey::from_codes(&codes).unwrap().to_state()
        })
    }

    fn has_line(state: &GameState, mark: Mark) -> bool {
        LINES
            .iter()
            .any(|line| line.iter().all(|&cell| state.state[cell] == mark))
    }

    proptest! {
        #[test]
        fn evaluate_matches_line_definition(state in any_board()) {
            let outcome = evaluate(&state);
            let x_line = has_line(&state, Mark::Cross);
            let o_line = has_line(&state, Mark::Nought);
            if x_line || o_line {
                let winner = outcome.winner().unwrap();
                prop_assert!(has_line(&state, winner));
            } else if state.is_full() {
                prop_assert_eq!(outcome, Outcome::Drawn);
            } else {
                prop_assert_eq!(outcome, Outcome::InPlay);
            }
        }

        #[test]
        fn validate_accepts_exactly_the_empty_cells(state in any_board(), row in 0usize..5, col in 0usize..5) {
            let action = Action::new(row, col);
            let expected = state.available_moves().contains(&action);
            prop_assert_eq!(validate(&state, Some(action)), expected);
        }

        #[test]
        fn equal_boards_share_a_key(state in any_board()) {
            let copy = state.to_state_key().to_state();
            prop_assert_eq!(copy.to_state_key(), state.to_state_key());
        }
    }
}
