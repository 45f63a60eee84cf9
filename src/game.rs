//! Game session orchestration.
//!
//! A [`GameSession`] owns the configuration, generates a fresh stimulus
//! sequence on every start and drives it on a background thread. Commands
//! from the foreground (declaring a match, stopping) go through the shared
//! state lock, so a tick can never reset the "already judged" flag in the
//! middle of a judgement.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

use chrono::Local;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigUpdate, GameConfig};
use crate::error::{GameError, Result};
use crate::evaluator::{self, Judgement};
use crate::highscore::{HighScoreStore, SessionRecord};
use crate::presenter::StimulusPresenter;
use crate::random::{RandomSource, SeededRandom};
use crate::runtime::{EventLoop, FixedTicker, LoopOutcome};
use crate::sequence::{SequenceGenerator, StimulusSequence};
use crate::session::{GameStatus, SessionState};

/// Result of a finished run
#[derive(Debug, Clone, PartialEq)]
pub struct GameSummary {
    pub score: u32,
    pub high_score: u32,
    pub new_high_score: bool,
    pub correct: u32,
    pub incorrect: u32,
    pub misses: u32,
    pub outcome: LoopOutcome,
}

/// Notifications published to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    Started { event_count: usize },
    Tick { index: usize, value: u32 },
    Judged {
        index: Option<usize>,
        judgement: Judgement,
        score: u32,
    },
    Ended(GameSummary),
}

struct Shared {
    state: SessionState,
    config: GameConfig,
    sequence: Option<Arc<StimulusSequence>>,
    high_score: u32,
    cancel: Arc<AtomicBool>,
    subscribers: Vec<Sender<GameEvent>>,
}

impl Shared {
    fn publish(&mut self, event: GameEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

/// Cloneable handle onto a session's live state, for input threads and presenters.
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<Mutex<Shared>>,
}

impl SessionHandle {
    fn lock(&self) -> MutexGuard<'_, Shared> {
        lock(&self.shared)
    }

    pub fn snapshot(&self) -> SessionState {
        self.lock().state.clone()
    }

    pub fn status(&self) -> GameStatus {
        self.lock().state.status
    }

    pub fn score(&self) -> u32 {
        self.lock().state.score
    }

    pub fn high_score(&self) -> u32 {
        self.lock().high_score
    }

    pub fn config(&self) -> GameConfig {
        self.lock().config.clone()
    }

    pub fn sequence(&self) -> Option<Arc<StimulusSequence>> {
        self.lock().sequence.clone()
    }

    /// Receive every event published from now on
    pub fn subscribe(&self) -> Receiver<GameEvent> {
        let (tx, rx) = mpsc::channel();
        self.lock().subscribers.push(tx);
        rx
    }

    /// Declare that the current stimulus matches the one n steps back.
    pub fn declare_match(&self) -> Result<Judgement> {
        let mut guard = self.lock();
        let shared = &mut *guard;
        if !shared.state.is_running() {
            return Err(GameError::InvalidState {
                operation: "declare a match",
                status: shared.state.status,
            });
        }
        let Some(sequence) = shared.sequence.clone() else {
            return Err(GameError::InvalidState {
                operation: "declare a match",
                status: shared.state.status,
            });
        };

        let judgement =
            evaluator::declare_match(&mut shared.state, &sequence, shared.config.n_back);
        debug!(
            index = shared.state.display_index(),
            ?judgement,
            score = shared.state.score,
            "match declared"
        );

        if judgement != Judgement::AlreadyJudged {
            let event = GameEvent::Judged {
                index: shared.state.current_index,
                judgement,
                score: shared.state.score,
            };
            shared.publish(event);
        }
        Ok(judgement)
    }

    /// Cancel the running loop and end the session. The loop itself drains at
    /// the next tick boundary.
    pub fn stop(&self) -> Result<()> {
        let mut shared = self.lock();
        match shared.state.status {
            GameStatus::Running => {
                shared.cancel.store(true, Ordering::SeqCst);
                shared.state.status = GameStatus::Ended;
                info!(
                    "Game stopped at index {} with score {}",
                    shared.state.display_index(),
                    shared.state.score
                );
                Ok(())
            }
            GameStatus::Ended => Ok(()),
            GameStatus::Idle => Err(GameError::InvalidState {
                operation: "stop the game",
                status: GameStatus::Idle,
            }),
        }
    }
}

/// Orchestrates runs: Idle -> Running -> Ended -> (reset) Idle.
pub struct GameSession<P, S, R = SeededRandom>
where
    P: StimulusPresenter,
    S: HighScoreStore,
    R: RandomSource,
{
    handle: SessionHandle,
    presenter: Arc<P>,
    store: Arc<S>,
    random: R,
    worker: Option<JoinHandle<GameSummary>>,
}

impl<P, S, R> GameSession<P, S, R>
where
    P: StimulusPresenter,
    S: HighScoreStore,
    R: RandomSource,
{
    pub fn new(config: GameConfig, presenter: P, store: S, random: R) -> Result<Self> {
        config.validate()?;

        let high_score = match store.read() {
            Ok(score) => score,
            Err(e) => {
                warn!("Failed to read high score, starting from 0: {}", e);
                0
            }
        };
        debug!("Loaded high score {}", high_score);

        let shared = Shared {
            state: SessionState::default(),
            config,
            sequence: None,
            high_score,
            cancel: Arc::new(AtomicBool::new(false)),
            subscribers: Vec::new(),
        };

        Ok(Self {
            handle: SessionHandle {
                shared: Arc::new(Mutex::new(shared)),
            },
            presenter: Arc::new(presenter),
            store: Arc::new(store),
            random,
            worker: None,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn snapshot(&self) -> SessionState {
        self.handle.snapshot()
    }

    pub fn status(&self) -> GameStatus {
        self.handle.status()
    }

    pub fn score(&self) -> u32 {
        self.handle.score()
    }

    pub fn high_score(&self) -> u32 {
        self.handle.high_score()
    }

    pub fn config(&self) -> GameConfig {
        self.handle.config()
    }

    pub fn sequence(&self) -> Option<Arc<StimulusSequence>> {
        self.handle.sequence()
    }

    pub fn subscribe(&self) -> Receiver<GameEvent> {
        self.handle.subscribe()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Change configuration fields. Only allowed while no game is running.
    pub fn set_configuration(&mut self, update: &ConfigUpdate) -> Result<()> {
        let mut shared = self.handle.lock();
        if shared.state.is_running() {
            return Err(GameError::InvalidState {
                operation: "change the configuration",
                status: shared.state.status,
            });
        }
        let merged = shared.config.merged(update);
        merged.validate()?;
        debug!("Configuration updated: {:?}", merged);
        shared.config = merged;
        Ok(())
    }

    /// Start a new run in the background and return immediately.
    pub fn start_game(&mut self) -> Result<()> {
        let config = {
            let shared = self.handle.lock();
            if shared.state.is_running() {
                return Err(GameError::InvalidState {
                    operation: "start a game",
                    status: shared.state.status,
                });
            }
            shared.config.clone()
        };

        let sequence = Arc::new(SequenceGenerator::generate(
            &config,
            config.match_ratio,
            &mut self.random,
        )?);

        // A stopped run may still be sleeping out its last interval.
        self.join_worker();

        let cancel = Arc::new(AtomicBool::new(false));
        {
            let mut shared = self.handle.lock();
            shared.state = SessionState::running();
            shared.sequence = Some(Arc::clone(&sequence));
            shared.cancel = Arc::clone(&cancel);
            shared.publish(GameEvent::Started {
                event_count: sequence.len(),
            });
        }

        info!(
            "Starting {} game: n={}, {} events every {}ms",
            config.modality, config.n_back, config.event_count, config.interval_ms
        );

        let shared = Arc::clone(&self.handle.shared);
        let presenter = Arc::clone(&self.presenter);
        let store = Arc::clone(&self.store);
        let spawned = thread::Builder::new()
            .name("nback-loop".into())
            .spawn(move || run_game(shared, presenter, store, sequence, config, cancel));

        match spawned {
            Ok(worker) => {
                self.worker = Some(worker);
                Ok(())
            }
            Err(e) => {
                error!("Failed to spawn game loop: {}", e);
                self.handle.lock().state.status = GameStatus::Ended;
                Err(e.into())
            }
        }
    }

    pub fn declare_match(&self) -> Result<Judgement> {
        self.handle.declare_match()
    }

    pub fn stop_game(&self) -> Result<()> {
        self.handle.stop()
    }

    /// Leave the results of an ended run and return to Idle.
    ///
    /// A stopped run finishes its bookkeeping before the state is cleared.
    pub fn reset(&mut self) -> Result<()> {
        if self.handle.status() == GameStatus::Running {
            return Err(GameError::InvalidState {
                operation: "reset",
                status: GameStatus::Running,
            });
        }
        self.join_worker();

        let mut shared = self.handle.lock();
        shared.state = SessionState::default();
        shared.sequence = None;
        Ok(())
    }

    /// Block until the current run's loop has finished and return its summary.
    pub fn wait(&mut self) -> Option<GameSummary> {
        self.worker.take().and_then(|worker| self.join(worker))
    }

    fn join_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.join(worker);
        }
    }

    fn join(&self, worker: JoinHandle<GameSummary>) -> Option<GameSummary> {
        match worker.join() {
            Ok(summary) => Some(summary),
            Err(_) => {
                error!("Game loop thread panicked; forcing session to end");
                self.handle.lock().state.status = GameStatus::Ended;
                None
            }
        }
    }
}

impl<P, S, R> Drop for GameSession<P, S, R>
where
    P: StimulusPresenter,
    S: HighScoreStore,
    R: RandomSource,
{
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            self.handle.lock().cancel.store(true, Ordering::SeqCst);
            let _ = worker.join();
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(|e| e.into_inner())
}

/// The loop reached the end and the last stimulus was actually shown.
fn complete_run(
    outcome: &LoopOutcome,
    state: &SessionState,
    sequence: &StimulusSequence,
) -> bool {
    matches!(outcome, LoopOutcome::Completed { .. })
        && state.current_index.map(|i| i + 1) == Some(sequence.len())
}

fn run_game<P: StimulusPresenter, S: HighScoreStore>(
    shared: Arc<Mutex<Shared>>,
    presenter: Arc<P>,
    store: Arc<S>,
    sequence: Arc<StimulusSequence>,
    config: GameConfig,
    cancel: Arc<AtomicBool>,
) -> GameSummary {
    let event_loop = EventLoop::new(FixedTicker::from_millis(config.interval_ms));

    let outcome = event_loop.run(
        &sequence,
        |index, value| {
            {
                let mut shared = lock(&shared);
                if !shared.state.is_running() || cancel.load(Ordering::SeqCst) {
                    return Ok(());
                }
                if evaluator::settle_tick(
                    &mut shared.state,
                    &sequence,
                    config.n_back,
                    config.penalize_misses,
                ) {
                    debug!("Missed match at index {}", shared.state.display_index());
                }
                shared.state.advance(index, value);
                shared.publish(GameEvent::Tick { index, value });
            }
            debug!(index, value, "tick");
            presenter.present(config.modality, value);
            Ok(())
        },
        || cancel.load(Ordering::SeqCst),
    );

    finish_game(&shared, &*store, &sequence, &config, outcome)
}

fn finish_game<S: HighScoreStore + ?Sized>(
    shared: &Mutex<Shared>,
    store: &S,
    sequence: &StimulusSequence,
    config: &GameConfig,
    outcome: LoopOutcome,
) -> GameSummary {
    let (state, previous_high) = {
        let mut shared = lock(shared);
        if complete_run(&outcome, &shared.state, sequence) {
            evaluator::settle_tick(
                &mut shared.state,
                sequence,
                config.n_back,
                config.penalize_misses,
            );
        }
        shared.state.status = GameStatus::Ended;
        let previous_high = shared.high_score;
        if shared.state.score > previous_high {
            shared.high_score = shared.state.score;
        }
        (shared.state.clone(), previous_high)
    };

    let new_high_score = state.score > previous_high;
    if new_high_score {
        info!("New high score: {} (was {})", state.score, previous_high);
        if let Err(e) = store.write(state.score) {
            warn!("Failed to persist high score {}: {}", state.score, e);
        }
    }

    let record = SessionRecord {
        finished_at: Local::now(),
        modality: config.modality,
        n_back: config.n_back,
        event_count: config.event_count,
        events_presented: state.current_index.map_or(0, |i| i + 1),
        score: state.score,
        correct: state.correct,
        incorrect: state.incorrect,
        misses: state.misses,
        cancelled: !complete_run(&outcome, &state, sequence),
    };
    if let Err(e) = store.record_session(&record) {
        warn!("Failed to record session history: {}", e);
    }

    let summary = GameSummary {
        score: state.score,
        high_score: previous_high.max(state.score),
        new_high_score,
        correct: state.correct,
        incorrect: state.incorrect,
        misses: state.misses,
        outcome,
    };
    info!(
        "Game ended after {} ticks: score {}, high score {}",
        summary.outcome.ticks(),
        summary.score,
        summary.high_score
    );

    lock(shared).publish(GameEvent::Ended(summary.clone()));
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Modality;
    use crate::highscore::MemoryHighScoreStore;
    use crate::presenter::LogPresenter;
    use crate::random::ScriptedRandom;

    fn config() -> GameConfig {
        GameConfig {
            n_back: 2,
            event_count: 5,
            interval_ms: 5,
            modality: Modality::Visual,
            match_ratio: 1.0,
            ..GameConfig::default()
        }
    }

    fn session(
        store: MemoryHighScoreStore,
    ) -> GameSession<LogPresenter, MemoryHighScoreStore, ScriptedRandom> {
        GameSession::new(
            config(),
            LogPresenter,
            store,
            ScriptedRandom::with_values(vec![3, 7]),
        )
        .unwrap()
    }

    #[test]
    fn new_session_is_idle_with_stored_high_score() {
        let game = session(MemoryHighScoreStore::with_high_score(4));
        assert_eq!(game.status(), GameStatus::Idle);
        assert_eq!(game.high_score(), 4);
        assert!(game.sequence().is_none());
    }

    #[test]
    fn new_rejects_invalid_config() {
        let bad = GameConfig {
            n_back: 5,
            ..config()
        };
        let result = GameSession::new(
            bad,
            LogPresenter,
            MemoryHighScoreStore::new(),
            ScriptedRandom::with_values(vec![1]),
        );
        assert!(matches!(result, Err(GameError::InvalidConfiguration(_))));
    }

    #[test]
    fn commands_rejected_while_idle() {
        let game = session(MemoryHighScoreStore::new());
        assert!(matches!(
            game.declare_match(),
            Err(GameError::InvalidState {
                status: GameStatus::Idle,
                ..
            })
        ));
        assert!(game.stop_game().is_err());
    }

    #[test]
    fn set_configuration_validates_and_applies() {
        let mut game = session(MemoryHighScoreStore::new());
        game.set_configuration(&ConfigUpdate::modality(Modality::Audio))
            .unwrap();
        assert_eq!(game.config().modality, Modality::Audio);

        let bad = ConfigUpdate {
            n_back: Some(9),
            ..ConfigUpdate::default()
        };
        assert!(matches!(
            game.set_configuration(&bad),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert_eq!(game.config().n_back, 2);
    }

    #[test]
    fn invalid_generation_leaves_state_untouched() {
        let mut game = session(MemoryHighScoreStore::new());
        // Bypass set_configuration validation to hit the generator check.
        game.handle.lock().config.match_ratio = 2.0;
        assert!(matches!(
            game.start_game(),
            Err(GameError::InvalidConfiguration(_))
        ));
        assert_eq!(game.status(), GameStatus::Idle);
    }

    #[test]
    fn full_run_without_input_ends_with_zero() {
        let store = MemoryHighScoreStore::new();
        let mut game = session(store.clone());
        game.start_game().unwrap();
        let summary = game.wait().unwrap();
        assert_eq!(summary.score, 0);
        assert_eq!(summary.misses, 3);
        assert_eq!(summary.outcome, LoopOutcome::Completed { ticks: 5 });
        assert!(!summary.new_high_score);
        assert_eq!(game.status(), GameStatus::Ended);
        assert!(store.writes().is_empty());
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.sessions()[0].events_presented, 5);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut game = session(MemoryHighScoreStore::new());
        game.start_game().unwrap();
        game.wait();
        game.reset().unwrap();
        let state = game.snapshot();
        assert_eq!(state.status, GameStatus::Idle);
        assert_eq!(state.current_index, None);
        assert!(game.sequence().is_none());
    }

    #[test]
    fn reset_and_reconfigure_rejected_while_running() {
        let mut game = session(MemoryHighScoreStore::new());
        game.set_configuration(&ConfigUpdate {
            interval_ms: Some(200),
            ..ConfigUpdate::default()
        })
        .unwrap();
        game.start_game().unwrap();
        assert!(matches!(
            game.reset(),
            Err(GameError::InvalidState {
                status: GameStatus::Running,
                ..
            })
        ));
        assert!(matches!(
            game.set_configuration(&ConfigUpdate::modality(Modality::Audio)),
            Err(GameError::InvalidState { .. })
        ));
        game.stop_game().unwrap();
        assert_eq!(game.status(), GameStatus::Ended);
        // Stopping twice is harmless.
        game.stop_game().unwrap();
        let summary = game.wait().unwrap();
        assert!(summary.outcome.was_cancelled());
        game.reset().unwrap();
    }

    #[test]
    fn events_are_published_in_order() {
        let mut game = session(MemoryHighScoreStore::new());
        let rx = game.subscribe();
        game.start_game().unwrap();
        game.wait();

        let events: Vec<GameEvent> = rx.try_iter().collect();
        assert_eq!(events.first(), Some(&GameEvent::Started { event_count: 5 }));
        let ticks: Vec<usize> = events
            .iter()
            .filter_map(|e| match e {
                GameEvent::Tick { index, .. } => Some(*index),
                _ => None,
            })
            .collect();
        assert_eq!(ticks, vec![0, 1, 2, 3, 4]);
        assert!(matches!(events.last(), Some(GameEvent::Ended(_))));
    }
}
