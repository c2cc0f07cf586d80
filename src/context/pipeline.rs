//! The shared filter, select and budget pipeline.

use super::config::{CompressionStrategy, ManagerConfig};
use super::filter::filter_messages;
use super::scoring::ImportanceScorer;
use super::selection::{
    drop_broken_pairs, enforce_token_budget, paired_call_ids, select_recent, select_semantic,
    select_smart, select_with_summary,
};
use crate::types::Message;
use anyhow::Result;
use time::OffsetDateTime;

/// Final size enforcement applied after selection.
///
/// The built-in [`MiddleOutCompressor`] drops messages from the middle of
/// the set. Supply another implementation to a manager to replace it.
pub trait MessageCompressor: Send + Sync {
    /// Reduce `messages` to fit `max_tokens`, keeping chronological order.
    ///
    /// # Errors
    /// Returns an error if compression fails.
    fn compress(&self, messages: Vec<Message>, max_tokens: usize) -> Result<Vec<Message>>;
}

/// Drops messages from the middle of the selection until it fits.
///
/// With `preserve_tool_call_pairs` (the default) an assistant message that
/// made tool calls leaves together with the tool messages answering it.
#[derive(Debug, Clone, Copy)]
pub struct MiddleOutCompressor {
    preserve_tool_call_pairs: bool,
}

impl MiddleOutCompressor {
    #[must_use]
    pub const fn new(preserve_tool_call_pairs: bool) -> Self {
        Self {
            preserve_tool_call_pairs,
        }
    }
}

impl Default for MiddleOutCompressor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MessageCompressor for MiddleOutCompressor {
    fn compress(&self, messages: Vec<Message>, max_tokens: usize) -> Result<Vec<Message>> {
        Ok(enforce_token_budget(
            messages,
            max_tokens,
            self.preserve_tool_call_pairs,
        ))
    }
}

/// Run filter, selection and budget enforcement over a flattened history.
///
/// `summary` is only consulted by [`CompressionStrategy::Summary`]. Semantic
/// selection enforces its own budget and skips the compressor.
///
/// With `preserve_tool_call_pairs` set, any call or result the compressor
/// separated from its partner is dropped as well.
///
/// # Errors
/// Returns an error if the compressor fails.
pub fn extract_context(
    messages: Vec<Message>,
    config: &ManagerConfig,
    summary: Option<&str>,
    compressor: &dyn MessageCompressor,
    now: OffsetDateTime,
) -> Result<Vec<Message>> {
    let filtered = filter_messages(messages, &config.filter(), now);
    let count = config.max_recent_messages;

    let selected = match config.strategy {
        CompressionStrategy::None => filtered,
        CompressionStrategy::Simple => select_recent(filtered, count),
        CompressionStrategy::Smart => {
            select_smart(filtered, count, config.preserve_tool_call_pairs)
        }
        CompressionStrategy::Semantic => {
            let scorer = ImportanceScorer::new(&config.important_keywords);
            return Ok(select_semantic(
                filtered,
                &scorer,
                count,
                config.max_tokens,
                config.preserve_tool_call_pairs,
            ));
        }
        CompressionStrategy::Summary => select_with_summary(filtered, count, summary, now),
    };

    if !config.preserve_tool_call_pairs {
        return compressor.compress(selected, config.max_tokens);
    }
    let pairs = paired_call_ids(&selected);
    let compressed = compressor.compress(selected, config.max_tokens)?;
    Ok(drop_broken_pairs(compressed, &pairs))
}
