use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
pub enum GameStatus {
    Idle,
    Running,
    Ended,
}

/// Live state of one run, recreated on every `start_game`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub status: GameStatus,
    /// `None` before the first tick.
    pub current_index: Option<usize>,
    pub current_value: Option<u32>,
    pub match_judged: bool,
    pub score: u32,
    // Tallies for the results screen
    pub correct: u32,
    pub incorrect: u32,
    pub misses: u32,
    /// Error indicator for the current tick; cleared when the next stimulus shows.
    pub match_error: bool,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            status: GameStatus::Idle,
            current_index: None,
            current_value: None,
            match_judged: false,
            score: 0,
            correct: 0,
            incorrect: 0,
            misses: 0,
            match_error: false,
        }
    }
}

impl SessionState {
    /// Fresh state for a run that is about to start ticking.
    pub fn running() -> Self {
        Self {
            status: GameStatus::Running,
            ..Self::default()
        }
    }

    pub fn is_running(&self) -> bool {
        self.status == GameStatus::Running
    }

    /// Index as the signed position used by presentation layers (-1 before the first tick).
    pub fn display_index(&self) -> i64 {
        self.current_index.map_or(-1, |i| i as i64)
    }

    pub fn advance(&mut self, index: usize, value: u32) {
        self.current_index = Some(index);
        self.current_value = Some(value);
        self.match_judged = false;
        self.match_error = false;
    }
}
