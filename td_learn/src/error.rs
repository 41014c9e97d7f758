//! Error types for the td_learn crate

use std::path::PathBuf;

use thiserror::Error;

use crate::board::Action;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A player handed the game a move that `validate` rejects.
    #[error("not allowed move {} from player {player}", describe(.action))]
    IllegalMove {
        player: String,
        action: Option<Action>,
    },

    #[error("failed to {operation} '{}': {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("pickle error: {0}")]
    Pickle(#[from] serde_pickle::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid value record {line}: {reason}")]
    InvalidRecord { line: u64, reason: String },
}

fn describe(action: &Option<Action>) -> String {
    match action {
        Some(action) => action.to_string(),
        None => "<none>".to_owned(),
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Rejected human input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseMoveError {
    #[error("expected two coordinates, got {0}")]
    Arity(usize),

    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("coordinate {0} is negative")]
    Negative(i64),
}

/// A board literal that is not nine cells of `X`, `O` or `-`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid board '{0}'")]
pub struct ParseBoardError(pub String);
