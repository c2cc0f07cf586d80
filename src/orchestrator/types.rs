use crate::events::SequenceCounter;
use crate::llm::MessageDelta;
use crate::types::{Message, TokenUsage};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Orchestrator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Model name put on every request. Unset means the client's
    /// [`LlmClient::model`](crate::llm::LlmClient::model).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub max_tokens: u32,
    /// Start background compaction after a turn when the manager asks for it.
    pub auto_compact: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            model: None,
            max_tokens: 4096,
            auto_compact: true,
        }
    }
}

impl OrchestratorConfig {
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub const fn with_auto_compact(mut self, auto_compact: bool) -> Self {
        self.auto_compact = auto_compact;
        self
    }
}

/// Why a turn did not complete.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("LLM error: {0}")]
    Llm(String),

    #[error("Conversation manager error: {0}")]
    Manager(String),

    /// The client reported an error inside its chunk stream.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Turn cancelled")]
    Cancelled,
}

impl TurnError {
    pub(super) fn llm(error: &anyhow::Error) -> Self {
        Self::Llm(format!("{error:#}"))
    }

    pub(super) fn manager(error: &anyhow::Error) -> Self {
        Self::Manager(format!("{error:#}"))
    }

    /// Everything except cancellation is critical.
    #[must_use]
    pub const fn is_critical(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }
}

/// Item yielded by [`TurnOrchestrator::run_turn_stream`](super::TurnOrchestrator::run_turn_stream).
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// Incremental reply text or tool-call fragment.
    Delta(MessageDelta),
    /// A tool message appended to the turn.
    ToolMessage(Message),
    /// Final assistant message. Always the last item of a successful turn.
    Completed(Message),
}

pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = Result<StreamItem, TurnError>> + Send + 'a>>;

/// Mutable state of the turn being executed.
pub(super) struct TurnContext {
    pub(super) turn_id: String,
    pub(super) conversation_id: String,
    pub(super) seq: SequenceCounter,
    pub(super) cancel: CancellationToken,
    pub(super) total_usage: TokenUsage,
    pub(super) tool_call_count: usize,
    pub(super) start_time: Instant,
    /// Present when the caller consumes the turn as a stream.
    pub(super) stream: Option<mpsc::UnboundedSender<StreamItem>>,
}

impl TurnContext {
    pub(super) fn check_cancelled(&self) -> Result<(), TurnError> {
        if self.cancel.is_cancelled() {
            Err(TurnError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Forward an item to the stream consumer, if any. A dropped receiver is
    /// ignored.
    pub(super) fn forward(&self, item: StreamItem) {
        if let Some(tx) = &self.stream {
            let _ = tx.send(item);
        }
    }
}
