//! Conversation store: ordered turns plus a free-form state map.
//!
//! Turns are append-only and never reordered. The state map is last-write-wins
//! and is the only thing [`Conversation::clear_state`] touches; raw history is
//! never destroyed.

use crate::types::{ConversationId, Message, Role};
use anyhow::{Result, bail};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

/// State key holding the cumulative conversation summary.
pub const CONVERSATION_SUMMARY_KEY: &str = "conversation_summary";
/// State key holding the RFC 3339 timestamp of the last compaction.
pub const LAST_COMPACTION_KEY: &str = "last_compaction";
/// State key holding how many turns the stored summary covers.
pub const COMPACTED_TURN_COUNT_KEY: &str = "compacted_turn_count";

/// One user or system message, the assistant's reply and any tool exchange
/// triggered by it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: String,
    pub input: Message,
    pub assistant: Option<Message>,
    pub tool_messages: Vec<Message>,
}

impl Turn {
    #[must_use]
    pub fn new(input: Message) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            input,
            assistant: None,
            tool_messages: Vec::new(),
        }
    }

    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Message::user(text))
    }

    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Message::system(text))
    }

    /// Convenience for building a completed exchange.
    #[must_use]
    pub fn exchange(user: impl Into<String>, assistant: impl Into<String>) -> Self {
        let mut turn = Self::user(user);
        turn.assistant = Some(Message::assistant(assistant));
        turn
    }

    pub fn set_assistant(&mut self, message: Message) {
        self.assistant = Some(message);
    }

    /// Append a tool message.
    ///
    /// # Errors
    /// Fails unless the turn already carries an assistant message with tool calls.
    pub fn push_tool_message(&mut self, message: Message) -> Result<()> {
        if message.role != Role::Tool {
            bail!("expected a tool message, got {:?}", message.role);
        }
        match &self.assistant {
            Some(assistant) if assistant.has_tool_calls() => {
                self.tool_messages.push(message);
                Ok(())
            }
            _ => bail!("tool messages must follow an assistant message with tool calls"),
        }
    }

    /// Replace the assistant message with the post-tool answer.
    ///
    /// The replacement keeps the original tool calls and the original creation
    /// time so the flattened history stays chronological; the time the answer
    /// arrived is kept in `metadata["completed_at"]`.
    pub fn finalize_assistant(&mut self, mut final_message: Message) {
        if let Some(original) = self.assistant.take() {
            if let Ok(completed_at) = final_message
                .created_at
                .format(&time::format_description::well_known::Rfc3339)
            {
                final_message
                    .metadata
                    .insert("completed_at".to_string(), Value::String(completed_at));
            }
            final_message.tool_calls = original.tool_calls;
            final_message.created_at = original.created_at;
        }
        self.assistant = Some(final_message);
    }

    /// Messages of this turn in their fixed order: input, assistant, tools.
    pub fn messages(&self) -> impl Iterator<Item = &Message> {
        std::iter::once(&self.input)
            .chain(self.assistant.iter())
            .chain(self.tool_messages.iter())
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        1 + usize::from(self.assistant.is_some()) + self.tool_messages.len()
    }
}

/// Ordered sequence of turns plus a key/value state map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub last_activity_at: OffsetDateTime,
    turns: Vec<Turn>,
    state: HashMap<String, Value>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(ConversationId::new())
    }
}

impl Conversation {
    #[must_use]
    pub fn new(id: ConversationId) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            id,
            created_at: now,
            last_activity_at: now,
            turns: Vec::new(),
            state: HashMap::new(),
        }
    }

    pub fn add_turn(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.touch();
    }

    fn touch(&mut self) {
        self.last_activity_at = OffsetDateTime::now_utc();
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn turn_mut(&mut self, turn_id: &str) -> Option<&mut Turn> {
        self.turns.iter_mut().find(|t| t.id == turn_id)
    }

    /// Lazily flatten all turns in insertion order.
    pub fn chrono_messages(&self) -> impl Iterator<Item = &Message> {
        self.turns.iter().flat_map(Turn::messages)
    }

    #[must_use]
    pub fn message_count(&self) -> usize {
        self.turns.iter().map(Turn::message_count).sum()
    }

    /// Typed state lookup. A value that does not deserialize into `T` is
    /// reported as absent.
    #[must_use]
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.state
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store a value under `key`, replacing any previous value.
    ///
    /// # Errors
    /// Returns an error if the value cannot be serialized.
    pub fn set_state<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<()> {
        self.state.insert(key.into(), serde_json::to_value(value)?);
        Ok(())
    }

    #[must_use]
    pub fn has_state(&self, key: &str) -> bool {
        self.state.contains_key(key)
    }

    pub fn clear_state(&mut self) {
        self.state.clear();
    }
}

/// Cloneable handle to a conversation owned by one manager.
///
/// The lock only exists so that fire-and-forget compaction can run on its own
/// task; callers still drive a conversation from a single logical writer.
#[derive(Debug, Clone, Default)]
pub struct SharedConversation(Arc<RwLock<Conversation>>);

impl SharedConversation {
    #[must_use]
    pub fn new(conversation: Conversation) -> Self {
        Self(Arc::new(RwLock::new(conversation)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Conversation> {
        self.0.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Conversation> {
        self.0.write()
    }

    pub fn add_turn(&self, turn: Turn) {
        self.write().add_turn(turn);
    }

    /// Set the assistant message of an existing turn.
    ///
    /// # Errors
    /// Returns an error if the turn does not exist.
    pub fn set_assistant_message(&self, turn_id: &str, message: Message) -> Result<()> {
        let mut conversation = self.write();
        let Some(turn) = conversation.turn_mut(turn_id) else {
            bail!("turn not found: {turn_id}");
        };
        turn.set_assistant(message);
        conversation.touch();
        Ok(())
    }

    /// Replace the assistant message of a turn with the post-tool answer and
    /// return the stored result.
    ///
    /// # Errors
    /// Returns an error if the turn does not exist.
    pub fn finalize_assistant_message(&self, turn_id: &str, message: Message) -> Result<Message> {
        let mut conversation = self.write();
        let Some(turn) = conversation.turn_mut(turn_id) else {
            bail!("turn not found: {turn_id}");
        };
        turn.finalize_assistant(message);
        let finalized = turn.assistant.clone().unwrap_or_else(|| Message::assistant(""));
        conversation.touch();
        Ok(finalized)
    }

    /// Append a tool message to an existing turn.
    ///
    /// # Errors
    /// Returns an error if the turn does not exist or has no pending tool calls.
    pub fn push_tool_message(&self, turn_id: &str, message: Message) -> Result<()> {
        let mut conversation = self.write();
        let Some(turn) = conversation.turn_mut(turn_id) else {
            bail!("turn not found: {turn_id}");
        };
        turn.push_tool_message(message)?;
        conversation.touch();
        Ok(())
    }

    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.read().chrono_messages().cloned().collect()
    }

    #[must_use]
    pub fn turns(&self) -> Vec<Turn> {
        self.read().turns().to_vec()
    }

    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.read().turn_count()
    }

    #[must_use]
    pub fn get_state<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.read().get_state(key)
    }

    /// # Errors
    /// Returns an error if the value cannot be serialized.
    pub fn set_state<T: Serialize>(&self, key: impl Into<String>, value: T) -> Result<()> {
        self.write().set_state(key, value)
    }

    pub fn clear_state(&self) {
        self.write().clear_state();
    }
}
