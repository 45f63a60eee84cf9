use thiserror::Error;

use crate::session::GameStatus;

#[derive(Debug, Error)]
pub enum GameError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cannot {operation} while {status}")]
    InvalidState {
        operation: &'static str,
        status: GameStatus,
    },

    #[error("High score persistence failed: {0}")]
    Persistence(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GameError>;

impl From<rusqlite::Error> for GameError {
    fn from(e: rusqlite::Error) -> Self {
        GameError::Persistence(e.to_string())
    }
}
