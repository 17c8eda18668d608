//! Approximate token estimation.
//!
//! A deterministic budgeting heuristic, not a tokenizer. Latin letters are
//! cheap, other ASCII costs twice as much, and anything outside ASCII
//! (CJK, emoji, accented text) is assumed to cost more than a token per
//! character.

use parley_types::chat::Turn;

/// Cost of one character in quarter tokens.
fn char_units(c: char) -> usize {
    match c as u32 {
        65..=122 => 1,
        0..=127 => 2,
        _ => 6,
    }
}

/// Estimate the token count of `text`.
///
/// Monotonic in the length of `text`: appending characters never lowers
/// the estimate.
pub fn estimate(text: &str) -> usize {
    let units: usize = text.chars().map(char_units).sum();
    units.div_ceil(4)
}

/// Estimate a single turn by its text content.
pub fn estimate_turn(turn: &Turn) -> usize {
    estimate(turn.text())
}

/// Sum of per-turn estimates.
pub fn estimate_turns<'a>(turns: impl IntoIterator<Item = &'a Turn>) -> usize {
    turns.into_iter().map(estimate_turn).sum()
}
