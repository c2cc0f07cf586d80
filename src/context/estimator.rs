//! Token estimation for context size calculation.

use crate::types::Message;

/// Estimates token count for messages.
///
/// Uses a simple heuristic of ~4 bytes per token with a floor of one token per
/// message. Good enough for budgeting; not a tokenizer.
pub struct TokenEstimator;

impl TokenEstimator {
    const CHARS_PER_TOKEN: usize = 4;

    /// Estimate tokens for a text string.
    #[must_use]
    pub const fn estimate_text(text: &str) -> usize {
        text.len() / Self::CHARS_PER_TOKEN
    }

    /// Estimate tokens for a single message, never less than one.
    #[must_use]
    pub const fn estimate_message(message: &Message) -> usize {
        let tokens = Self::estimate_text(message.content.as_str());
        if tokens == 0 { 1 } else { tokens }
    }

    /// Estimate total tokens for a message history.
    #[must_use]
    pub fn estimate_history<'a, I>(messages: I) -> usize
    where
        I: IntoIterator<Item = &'a Message>,
    {
        messages.into_iter().map(Self::estimate_message).sum()
    }
}
