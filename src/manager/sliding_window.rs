use super::compaction::{NO_HISTORY, cumulative_summary};
use super::{ConversationManager, spawn_compaction};
use crate::context::{
    HeuristicSummarizer, SlidingWindowConfig, Summarizer, filter_messages, summary_message,
};
use crate::conversation::{Conversation, SharedConversation, Turn};
use crate::types::{Message, Role};
use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt::Write;
use std::sync::Arc;
use time::OffsetDateTime;

/// Last message folded into a summary.
#[derive(Debug, Clone)]
struct SummaryMark {
    id: String,
    created_at: OffsetDateTime,
}

#[derive(Debug, Default)]
struct WindowState {
    summaries: VecDeque<String>,
    summarized_through: Option<SummaryMark>,
}

impl WindowState {
    /// Position of the first message not yet summarized.
    ///
    /// Falls back to the timestamp when the marked message has since been
    /// filtered out.
    fn resume_at(&self, messages: &[Message]) -> usize {
        let Some(mark) = &self.summarized_through else {
            return 0;
        };
        messages
            .iter()
            .position(|m| m.id == mark.id)
            .map_or_else(
                || messages.partition_point(|m| m.created_at <= mark.created_at),
                |idx| idx + 1,
            )
    }
}

/// Manager that returns a fixed-size tail of the conversation.
///
/// Messages leaving the window are summarized on compaction into a rolling
/// queue; queued summaries are prepended to the next extraction as one
/// system message.
#[derive(Clone)]
pub struct SlidingWindowConversationManager {
    conversation: SharedConversation,
    config: Arc<SlidingWindowConfig>,
    summarizer: Arc<dyn Summarizer>,
    window: Arc<Mutex<WindowState>>,
}

impl SlidingWindowConversationManager {
    #[must_use]
    pub fn new(config: SlidingWindowConfig) -> Self {
        Self::with_conversation(Conversation::default(), config)
    }

    #[must_use]
    pub fn with_conversation(conversation: Conversation, config: SlidingWindowConfig) -> Self {
        Self {
            conversation: SharedConversation::new(conversation),
            config: Arc::new(config),
            summarizer: Arc::new(HeuristicSummarizer),
            window: Arc::new(Mutex::new(WindowState::default())),
        }
    }

    #[must_use]
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    #[must_use]
    pub fn config(&self) -> &SlidingWindowConfig {
        &self.config
    }

    /// Summaries currently queued, oldest first.
    #[must_use]
    pub fn queued_summaries(&self) -> Vec<String> {
        self.window.lock().summaries.iter().cloned().collect()
    }

    /// History as extraction sees it: the configured filters applied.
    fn visible_messages(&self, now: OffsetDateTime) -> Vec<Message> {
        filter_messages(self.conversation.messages(), &self.config.filter, now)
    }

    fn queue_header(summaries: &VecDeque<String>) -> Option<String> {
        if summaries.is_empty() {
            return None;
        }
        let mut content = String::from("Summaries of earlier conversation:");
        for summary in summaries {
            let _ = write!(content, "\n\n{summary}");
        }
        Some(content)
    }
}

#[async_trait]
impl ConversationManager for SlidingWindowConversationManager {
    fn conversation(&self) -> &SharedConversation {
        &self.conversation
    }

    fn add_turn(&self, turn: Turn) {
        self.conversation.add_turn(turn);
        if self.config.auto_compact && self.should_compact() {
            tracing::debug!(
                window_size = self.config.window_size,
                "Scheduling sliding window compaction"
            );
            spawn_compaction(self);
        }
    }

    fn extract_messages_for_next_turn(&self) -> Result<Vec<Message>> {
        let now = OffsetDateTime::now_utc();
        let mut messages = self.visible_messages(now);

        let start = messages.len().saturating_sub(self.config.window_size);
        let keep_first = self.config.preserve_first_message
            && start > 0
            && messages.first().is_some_and(|m| m.role == Role::System);
        let first = keep_first.then(|| messages[0].clone());

        let mut selected: Vec<Message> = first.into_iter().chain(messages.drain(start..)).collect();

        let header = Self::queue_header(&self.window.lock().summaries);
        if let Some(header) = header {
            selected.insert(0, summary_message(header, selected.first(), now));
        }

        Ok(selected)
    }

    fn should_compact(&self) -> bool {
        self.visible_messages(OffsetDateTime::now_utc()).len() > self.config.window_size
    }

    async fn compact_conversation(&self) -> Result<bool> {
        // Cut over the sequence extraction windows.
        let messages = self.visible_messages(OffsetDateTime::now_utc());
        let end = messages.len().saturating_sub(self.config.window_size);
        let mut start = self.window.lock().resume_at(&messages);
        // A preserved system message stays visible and is not summarized.
        if start == 0
            && self.config.preserve_first_message
            && messages.first().is_some_and(|m| m.role == Role::System)
        {
            start = 1;
        }
        if start >= end {
            return Ok(false);
        }

        let summary = self.summarizer.summarize(&messages[start..end]).await?;

        let last = &messages[end - 1];
        let mut window = self.window.lock();
        window.summaries.push_back(summary);
        while window.summaries.len() > self.config.max_queued_summaries {
            window.summaries.pop_front();
        }
        let newer = window
            .summarized_through
            .as_ref()
            .is_none_or(|mark| mark.created_at <= last.created_at);
        if newer {
            window.summarized_through = Some(SummaryMark {
                id: last.id.clone(),
                created_at: last.created_at,
            });
        }

        tracing::info!(
            summarized = end - start,
            queued = window.summaries.len(),
            "Sliding window compacted"
        );
        Ok(true)
    }

    async fn get_conversation_summary(&self) -> Result<String> {
        if self.conversation.turn_count() == 0 {
            return Ok(NO_HISTORY.to_string());
        }
        cumulative_summary(&self.conversation, self.summarizer.as_ref()).await
    }

    fn reset(&self) {
        self.conversation.clear_state();
        let mut window = self.window.lock();
        window.summaries.clear();
        window.summarized_through = None;
    }
}
