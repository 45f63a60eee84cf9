use crate::sequence::StimulusSequence;
use crate::session::SessionState;

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum Judgement {
    Correct,
    Incorrect,
    /// The current stimulus was already judged; nothing changed.
    AlreadyJudged,
}

/// True iff `current_index` has an n-back predecessor with the same value.
pub fn is_match(sequence: &StimulusSequence, current_index: usize, n_back: usize) -> bool {
    if n_back == 0 || current_index < n_back {
        return false;
    }
    match (
        sequence.get(current_index),
        sequence.get(current_index - n_back),
    ) {
        (Some(current), Some(previous)) => current == previous,
        _ => false,
    }
}

/// Judge a match declaration against the live state. At most one judgement counts per tick.
///
/// Declaring before the first tick is judged `Incorrect`: there is nothing to match yet.
pub fn declare_match(
    state: &mut SessionState,
    sequence: &StimulusSequence,
    n_back: usize,
) -> Judgement {
    if state.match_judged {
        return Judgement::AlreadyJudged;
    }
    state.match_judged = true;

    let matched = state
        .current_index
        .is_some_and(|i| is_match(sequence, i, n_back));

    if matched {
        state.score += 1;
        state.correct += 1;
        state.match_error = false;
        Judgement::Correct
    } else {
        state.incorrect += 1;
        state.match_error = true;
        Judgement::Incorrect
    }
}

/// Book-keeping when the tick at `index` is left: counts a match nobody declared.
/// Returns true if a miss was recorded.
pub fn settle_tick(
    state: &mut SessionState,
    sequence: &StimulusSequence,
    n_back: usize,
    penalize_misses: bool,
) -> bool {
    let Some(index) = state.current_index else {
        return false;
    };
    if state.match_judged || !is_match(sequence, index, n_back) {
        return false;
    }
    state.misses += 1;
    if penalize_misses {
        state.score = state.score.saturating_sub(1);
    }
    true
}
