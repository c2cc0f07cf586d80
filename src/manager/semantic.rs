use super::default::DefaultConversationManager;
use super::{ConversationManager, spawn_compaction};
use crate::context::{
    CompressionStrategy, ImportanceScorer, ManagerConfig, Summarizer, filter_messages,
};
use crate::conversation::{Conversation, SharedConversation, Turn};
use crate::types::Message;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use time::OffsetDateTime;

/// Manager that keeps the most important messages rather than the newest.
///
/// Messages are ranked by [`ImportanceScorer`] and taken greedily under the
/// configured message count (`max_recent_messages`) and token budget. The
/// first system message is always kept.
#[derive(Clone)]
pub struct SemanticConversationManager {
    inner: DefaultConversationManager,
}

impl SemanticConversationManager {
    /// The strategy in `config` is overridden with `Semantic`.
    #[must_use]
    pub fn new(config: ManagerConfig) -> Self {
        Self::with_conversation(Conversation::default(), config)
    }

    #[must_use]
    pub fn with_conversation(conversation: Conversation, config: ManagerConfig) -> Self {
        let config = config.with_strategy(CompressionStrategy::Semantic);
        Self {
            inner: DefaultConversationManager::with_conversation(conversation, config),
        }
    }

    #[must_use]
    pub fn with_summarizer(self, summarizer: Arc<dyn Summarizer>) -> Self {
        Self {
            inner: self.inner.with_summarizer(summarizer),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ManagerConfig {
        self.inner.config()
    }

    /// Importance score of every message that survives filtering, in
    /// chronological order.
    #[must_use]
    pub fn importance_scores(&self) -> Vec<(Message, f64)> {
        let config = self.inner.config();
        let messages = filter_messages(
            self.inner.conversation().messages(),
            &config.filter(),
            OffsetDateTime::now_utc(),
        );
        let scores = ImportanceScorer::new(&config.important_keywords).score_all(&messages);
        messages.into_iter().zip(scores).collect()
    }
}

impl Default for SemanticConversationManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

#[async_trait]
impl ConversationManager for SemanticConversationManager {
    fn conversation(&self) -> &SharedConversation {
        self.inner.conversation()
    }

    fn add_turn(&self, turn: Turn) {
        self.inner.conversation().add_turn(turn);
        if self.config().auto_compact && self.should_compact() {
            spawn_compaction(self);
        }
    }

    fn extract_messages_for_next_turn(&self) -> Result<Vec<Message>> {
        self.inner.extract_messages_for_next_turn()
    }

    fn should_compact(&self) -> bool {
        self.inner.should_compact()
    }

    async fn compact_conversation(&self) -> Result<bool> {
        self.inner.compact_conversation().await
    }

    async fn get_conversation_summary(&self) -> Result<String> {
        self.inner.get_conversation_summary().await
    }

    fn reset(&self) {
        self.inner.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn is_chronological(messages: &[Message]) -> bool {
        messages.windows(2).all(|w| w[0].created_at <= w[1].created_at)
    }

    #[test]
    fn test_important_message_survives_outside_recent_window() -> Result<()> {
        let manager =
            SemanticConversationManager::new(ManagerConfig::default().with_max_recent_messages(3));

        manager.add_turn(Turn::exchange("hello there", "hi"));
        manager.add_turn(Turn::exchange(
            "the report deadline is next friday",
            "noted",
        ));
        manager.add_turn(Turn::exchange("nice weather", "indeed"));
        manager.add_turn(Turn::exchange("any news", "not much"));
        manager.add_turn(Turn::exchange("ok thanks", "bye"));

        let messages = manager.extract_messages_for_next_turn()?;
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().any(|m| m.content.contains("deadline")));
        assert!(is_chronological(&messages));
        Ok(())
    }

    #[test]
    fn test_first_system_message_is_forced() -> Result<()> {
        let manager =
            SemanticConversationManager::new(ManagerConfig::default().with_max_recent_messages(2));
        manager.add_turn(Turn::system("you are terse"));
        for i in 0..5 {
            manager.add_turn(Turn::exchange(format!("critical q{i}"), "a"));
        }

        let messages = manager.extract_messages_for_next_turn()?;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        Ok(())
    }

    #[test]
    fn test_strategy_is_forced_to_semantic() {
        let manager = SemanticConversationManager::new(
            ManagerConfig::default().with_strategy(CompressionStrategy::Simple),
        );
        assert_eq!(manager.config().strategy, CompressionStrategy::Semantic);
    }

    #[test]
    fn test_importance_scores_cover_every_message() {
        let manager = SemanticConversationManager::default();
        manager.add_turn(Turn::exchange("remember the budget", "sure"));

        let scores = manager.importance_scores();
        assert_eq!(scores.len(), 2);
        assert!(scores.iter().all(|(_, s)| (0.0..=1.0).contains(s)));
        // keyword hit plus first-message bonus outranks the plain reply
        assert!(scores[0].1 > scores[1].1);
    }

    #[tokio::test]
    async fn test_compaction_does_not_remove_turns() -> Result<()> {
        let manager = SemanticConversationManager::new(
            ManagerConfig::default()
                .with_compaction_threshold(2)
                .with_max_recent_messages(2),
        );
        for i in 0..4 {
            manager.add_turn(Turn::exchange(format!("q{i}"), format!("a{i}")));
        }

        assert!(manager.compact_conversation().await?);
        assert_eq!(manager.conversation().turn_count(), 4);
        Ok(())
    }
}
