use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crossterm::event::{self, Event as CtEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tracing::{debug, error};

use crate::error::Result;
use crate::sequence::StimulusSequence;

/// Configurable ticker interface
pub trait Ticker: Send + Sync + 'static {
    fn interval(&self) -> Duration;
}

/// Fixed interval ticker
#[derive(Clone, Copy, Debug)]
pub struct FixedTicker {
    interval: Duration,
}

impl FixedTicker {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    pub fn from_millis(ms: u64) -> Self {
        Self::new(Duration::from_millis(ms))
    }
}

impl Ticker for FixedTicker {
    fn interval(&self) -> Duration {
        self.interval
    }
}

/// How a run of the event loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    Completed { ticks: usize },
    Cancelled { ticks: usize },
    Failed { ticks: usize, error: String },
}

impl LoopOutcome {
    pub fn ticks(&self) -> usize {
        match self {
            LoopOutcome::Completed { ticks }
            | LoopOutcome::Cancelled { ticks }
            | LoopOutcome::Failed { ticks, .. } => *ticks,
        }
    }

    pub fn was_cancelled(&self) -> bool {
        matches!(self, LoopOutcome::Cancelled { .. })
    }
}

/// Steps through a sequence one stimulus per interval.
///
/// Each step runs the tick callback, sleeps one interval, then checks for
/// cancellation if any stimulus is left. Ticks are strictly sequential in ascending index order, so a
/// cancellation raised mid-interval takes effect before the next stimulus.
pub struct EventLoop<T: Ticker> {
    ticker: T,
}

impl<T: Ticker> EventLoop<T> {
    pub fn new(ticker: T) -> Self {
        Self { ticker }
    }

    pub fn run<F, C>(
        &self,
        sequence: &StimulusSequence,
        mut on_tick: F,
        is_cancelled: C,
    ) -> LoopOutcome
    where
        F: FnMut(usize, u32) -> Result<()>,
        C: Fn() -> bool,
    {
        let interval = self.ticker.interval();

        for (index, &value) in sequence.values().iter().enumerate() {
            let ticks = index + 1;
            match panic::catch_unwind(AssertUnwindSafe(|| on_tick(index, value))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Tick {} failed: {}", index, e);
                    return LoopOutcome::Failed {
                        ticks,
                        error: e.to_string(),
                    };
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!("Tick {} panicked: {}", index, message);
                    return LoopOutcome::Failed {
                        ticks,
                        error: message,
                    };
                }
            }

            thread::sleep(interval);

            // A stop during the last interval still leaves a complete run.
            if ticks < sequence.len() && is_cancelled() {
                debug!("Event loop cancelled after {} ticks", ticks);
                return LoopOutcome::Cancelled { ticks };
            }
        }

        LoopOutcome::Completed {
            ticks: sequence.len(),
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Player commands delivered by an input source
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InputEvent {
    Match,
    Stop,
}

/// Source of player input (keyboard, scripted, ...)
pub trait InputSource: Send + 'static {
    /// Block for up to `timeout` waiting for an event.
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<InputEvent, RecvTimeoutError>;
}

/// Production input source using crossterm key events.
/// Space or `m` declares a match; Esc, `q` or ctrl+c stops the game.
pub struct CrosstermInputSource {
    rx: Receiver<InputEvent>,
}

impl CrosstermInputSource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || loop {
            match event::read() {
                Ok(CtEvent::Key(key)) => {
                    if let Some(input) = map_key(&key) {
                        if tx.send(input).is_err() {
                            break;
                        }
                    }
                }
                Ok(_) => {}
                Err(_) => break,
            }
        });

        Self { rx }
    }
}

impl Default for CrosstermInputSource {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSource for CrosstermInputSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<InputEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}

pub fn map_key(key: &KeyEvent) -> Option<InputEvent> {
    if key.kind == KeyEventKind::Release {
        return None;
    }
    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            Some(InputEvent::Stop)
        }
        KeyCode::Char(' ') | KeyCode::Char('m') | KeyCode::Enter => Some(InputEvent::Match),
        KeyCode::Esc | KeyCode::Char('q') => Some(InputEvent::Stop),
        _ => None,
    }
}

/// Channel-backed input source for tests and scripted play
pub struct ChannelInputSource {
    rx: Receiver<InputEvent>,
}

impl ChannelInputSource {
    pub fn new(rx: Receiver<InputEvent>) -> Self {
        Self { rx }
    }
}

impl InputSource for ChannelInputSource {
    fn recv_timeout(&self, timeout: Duration) -> std::result::Result<InputEvent, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }
}
