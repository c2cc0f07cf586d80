use crate::conversation::Conversation;
use crate::types::Role;
use serde::Serialize;
use time::OffsetDateTime;

/// Counts over a conversation's full history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversationStatistics {
    pub total_turns: usize,
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub tool_messages: usize,
    pub system_messages: usize,
    pub tool_calls: usize,
    pub tool_results: usize,
    /// Tool results flagged as errors.
    pub tool_errors: usize,
    #[serde(with = "time::serde::rfc3339::option")]
    pub first_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
}

impl ConversationStatistics {
    #[must_use]
    pub fn from_conversation(conversation: &Conversation) -> Self {
        let mut stats = Self {
            total_turns: conversation.turn_count(),
            ..Self::default()
        };

        for message in conversation.chrono_messages() {
            stats.total_messages += 1;
            match message.role {
                Role::System => stats.system_messages += 1,
                Role::User => stats.user_messages += 1,
                Role::Assistant => stats.assistant_messages += 1,
                Role::Tool => stats.tool_messages += 1,
            }
            stats.tool_calls += message.tool_calls.len();
            stats.tool_results += message.tool_results.len();
            stats.tool_errors += message.tool_results.iter().filter(|r| r.is_error).count();

            stats.first_message_at.get_or_insert(message.created_at);
            stats.last_message_at = Some(message.created_at);
        }

        stats
    }
}
