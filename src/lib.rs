// Library surface for the binary and for headless/integration tests.
pub mod app_dirs;
pub mod config;
pub mod driver;
pub mod error;
pub mod evaluator;
pub mod game;
pub mod highscore;
pub mod presenter;
pub mod random;
pub mod runtime;
pub mod sequence;
pub mod session;

pub use config::{ConfigUpdate, Density, GameConfig, Modality};
pub use error::{GameError, Result};
pub use evaluator::Judgement;
pub use game::{GameEvent, GameSession, GameSummary, SessionHandle};
pub use highscore::{HighScoreStore, MemoryHighScoreStore, SqliteHighScoreStore};
pub use presenter::StimulusPresenter;
pub use random::{RandomSource, ScriptedRandom, SeededRandom};
pub use sequence::{SequenceGenerator, StimulusSequence};
pub use session::{GameStatus, SessionState};
