use super::compaction::{compact_turns, cumulative_summary};
use super::{ConversationManager, spawn_compaction};
use crate::context::{
    HeuristicSummarizer, ManagerConfig, MessageCompressor, MiddleOutCompressor, Summarizer,
    extract_context,
};
use crate::conversation::{CONVERSATION_SUMMARY_KEY, Conversation, SharedConversation, Turn};
use crate::types::Message;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

/// Policy-driven manager: the configured
/// [`CompressionStrategy`](crate::context::CompressionStrategy) picks the
/// context for every request.
///
/// Cloning yields another handle to the same conversation.
#[derive(Clone)]
pub struct DefaultConversationManager {
    conversation: SharedConversation,
    config: Arc<ManagerConfig>,
    summarizer: Arc<dyn Summarizer>,
    compressor: Arc<dyn MessageCompressor>,
}

impl DefaultConversationManager {
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_conversation(Conversation::default(), config)
    }

    #[must_use]
    pub fn with_conversation(conversation: Conversation, config: ManagerConfig) -> Self {
        let compressor = MiddleOutCompressor::new(config.preserve_tool_call_pairs);
        Self {
            conversation: SharedConversation::new(conversation),
            config: Arc::new(config),
            summarizer: Arc::new(HeuristicSummarizer),
            compressor: Arc::new(compressor),
        }
    }

    /// Use `summarizer` for compaction and summaries.
    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Replace the built-in middle-out budget enforcement.
    #[must_use]
    pub fn with_compressor(mut self, compressor: Arc<dyn MessageCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }
}

impl Default for DefaultConversationManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

#[async_trait]
impl ConversationManager for DefaultConversationManager {
    fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    fn add_turn(&self, turn: Turn) {
        self.conversation.add_turn(turn);
        if self.config.auto_compact && self.should_compact() {
            tracing::debug!(
                turns = self.conversation.turn_count(),
                threshold = self.config.compaction_threshold,
                "Scheduling auto-compaction"
            );
            spawn_compaction(self);
        }
    }

    fn extract_messages_for_next_turn(&self) -> Result<Vec<Message>> {
        let (messages, summary) = {
            let guard = self.conversation.read();
            let summary: Option<String> = guard.get_state(CONVERSATION_SUMMARY_KEY);
            (guard.chrono_messages().cloned().collect::<Vec<_>>(), summary)
        };

        extract_context(
            messages,
            &self.config,
            summary.as_deref(),
            self.compressor.as_ref(),
            OffsetDateTime::now_utc(),
        )
    }

    fn should_compact(&self) -> bool {
        self.conversation.turn_count() > self.config.compaction_threshold
    }

    async fn compact_conversation(&self) -> Result<bool> {
        if !self.should_compact() {
            return Ok(false);
        }
        compact_turns(
            &self.conversation,
            self.summarizer.as_ref(),
            self.config.max_recent_messages,
        )
        .await
    }

    async fn get_conversation_summary(&self) -> Result<String> {
        cumulative_summary(&self.conversation, self.summarizer.as_ref()).await
    }

    fn reset(&self) {
        self.conversation.clear_state();
    }
}
