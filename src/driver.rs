use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Duration;

use tracing::debug;

use crate::error::{GameError, Result};
use crate::game::{GameEvent, GameSession, GameSummary};
use crate::highscore::HighScoreStore;
use crate::presenter::StimulusPresenter;
use crate::random::RandomSource;
use crate::runtime::{InputEvent, InputSource};

/// How often the driver polls for input between game events
pub const INPUT_POLL_MS: u64 = 20;

/// Start a game and feed it player input until it ends.
///
/// `on_event` sees every published event, including the judgements triggered
/// by the input it forwards. Returns the summary of the finished run.
pub fn play<P, S, R, I, F>(
    game: &mut GameSession<P, S, R>,
    input: &I,
    mut on_event: F,
) -> Result<Option<GameSummary>>
where
    P: StimulusPresenter,
    S: HighScoreStore,
    R: RandomSource,
    I: InputSource,
    F: FnMut(&GameEvent),
{
    let events = game.subscribe();
    game.start_game()?;

    loop {
        if drain(&events, &mut on_event) {
            break;
        }

        match input.recv_timeout(Duration::from_millis(INPUT_POLL_MS)) {
            Ok(InputEvent::Match) => match game.declare_match() {
                Ok(judgement) => debug!(?judgement, "input: match"),
                // The run can end between the keypress and the judgement.
                Err(GameError::InvalidState { .. }) => {}
                Err(e) => return Err(e),
            },
            Ok(InputEvent::Stop) => {
                game.stop_game()?;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                // No more input can arrive; let the run play out.
                let summary = game.wait();
                drain(&events, &mut on_event);
                return Ok(summary);
            }
        }
    }

    Ok(game.wait())
}

/// Forward pending events; true once the run has ended.
fn drain<F: FnMut(&GameEvent)>(events: &Receiver<GameEvent>, on_event: &mut F) -> bool {
    loop {
        match events.try_recv() {
            Ok(event) => {
                on_event(&event);
                if matches!(event, GameEvent::Ended(_)) {
                    return true;
                }
            }
            Err(TryRecvError::Empty) => return false,
            Err(TryRecvError::Disconnected) => return true,
        }
    }
}
