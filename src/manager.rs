//! Conversation managers.
//!
//! A manager owns one conversation and decides what part of it is sent to
//! the LLM next. Three variants are provided:
//!
//! - [`DefaultConversationManager`]: policy driven, see [`CompressionStrategy`](crate::context::CompressionStrategy)
//! - [`SlidingWindowConversationManager`]: fixed-size tail plus a rolling
//!   queue of summaries for messages that left the window
//! - [`SemanticConversationManager`]: importance-scored selection
//!
//! Compaction only ever adds summaries to conversation state. Turns are never
//! removed from the store.

mod compaction;
mod default;
mod semantic;
mod sliding_window;
mod stats;

pub use default::DefaultConversationManager;
pub use semantic::SemanticConversationManager;
pub use sliding_window::SlidingWindowConversationManager;
pub use stats::ConversationStatistics;

use crate::conversation::{SharedConversation, Turn};
use crate::types::Message;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Contract shared by every manager variant.
#[async_trait]
pub trait ConversationManager: Send + Sync {
    /// Handle to the managed conversation.
    fn conversation(&self) -> &SharedConversation;

    /// Append a turn. When auto-compaction is enabled and the conversation
    /// needs it, compaction is started in the background and not awaited.
    fn add_turn(&self, turn: Turn);

    /// Messages to send on the next request, in chronological order.
    ///
    /// # Errors
    /// Returns an error if a pluggable compressor fails.
    fn extract_messages_for_next_turn(&self) -> Result<Vec<Message>>;

    fn should_compact(&self) -> bool;

    /// Compact older history into a summary. Returns `false` when there was
    /// nothing to do.
    ///
    /// # Errors
    /// Returns an error if the summarizer fails.
    async fn compact_conversation(&self) -> Result<bool>;

    /// Cumulative summary of the conversation.
    ///
    /// # Errors
    /// Returns an error if the summarizer fails.
    async fn get_conversation_summary(&self) -> Result<String>;

    /// Clear conversation state. Turn history is kept.
    fn reset(&self);

    fn statistics(&self) -> ConversationStatistics {
        ConversationStatistics::from_conversation(&self.conversation().read())
    }
}

#[async_trait]
impl<T: ConversationManager + ?Sized> ConversationManager for Arc<T> {
    fn conversation(&self) -> &SharedConversation {
        (**self).conversation()
    }

    fn add_turn(&self, turn: Turn) {
        (**self).add_turn(turn);
    }

    fn extract_messages_for_next_turn(&self) -> Result<Vec<Message>> {
        (**self).extract_messages_for_next_turn()
    }

    fn should_compact(&self) -> bool {
        (**self).should_compact()
    }

    async fn compact_conversation(&self) -> Result<bool> {
        (**self).compact_conversation().await
    }

    async fn get_conversation_summary(&self) -> Result<String> {
        (**self).get_conversation_summary().await
    }

    fn reset(&self) {
        (**self).reset();
    }

    fn statistics(&self) -> ConversationStatistics {
        (**self).statistics()
    }
}

/// Run `compact_conversation` on the current runtime without awaiting it.
///
/// Failures are logged. Outside a tokio runtime the request is dropped.
pub(crate) fn spawn_compaction<M>(manager: &M)
where
    M: ConversationManager + Clone + 'static,
{
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::warn!("Auto-compaction skipped: no tokio runtime");
        return;
    };

    let manager = manager.clone();
    handle.spawn(async move {
        match manager.compact_conversation().await {
            Ok(compacted) => tracing::debug!(compacted, "Background compaction finished"),
            Err(e) => tracing::warn!(error = %e, "Background compaction failed"),
        }
    });
}
