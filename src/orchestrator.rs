//! Turn orchestration.
//!
//! [`TurnOrchestrator`] drives a single user turn end to end. It records the
//! input, asks the LLM for a reply and dispatches any requested tool calls in
//! order. When tools ran it asks once more with their results and stores that
//! answer as the turn's final assistant message.
//!
//! # Example
//!
//! ```ignore
//! use conversation_sdk::{DefaultConversationManager, ToolRegistry, TurnOrchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! let orchestrator = TurnOrchestrator::builder()
//!     .llm_client(client)
//!     .manager(DefaultConversationManager::default())
//!     .tools(ToolRegistry::new())
//!     .build()?;
//!
//! let reply = orchestrator
//!     .run_turn("What time is it?", &CancellationToken::new())
//!     .await?;
//! println!("{}", reply.content);
//! ```

mod builder;
mod helpers;
mod llm;
mod tool_execution;
mod turn;
mod types;

#[cfg(test)]
mod test_utils;

pub use builder::TurnOrchestratorBuilder;
pub use types::{OrchestratorConfig, StreamItem, TurnError, TurnStream};

use crate::events::EventBus;
use crate::llm::LlmClient;
use crate::manager::ConversationManager;
use crate::tools::ToolRegistry;
use crate::types::Message;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Runs turns against one conversation manager.
///
/// Turns on the same orchestrator are expected to run one at a time.
pub struct TurnOrchestrator {
    client: Arc<dyn LlmClient>,
    manager: Arc<dyn ConversationManager>,
    tools: ToolRegistry,
    events: EventBus,
    config: OrchestratorConfig,
}

impl TurnOrchestrator {
    #[must_use]
    pub fn builder() -> TurnOrchestratorBuilder {
        TurnOrchestratorBuilder::new()
    }

    #[must_use]
    pub const fn manager(&self) -> &Arc<dyn ConversationManager> {
        &self.manager
    }

    #[must_use]
    pub const fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    #[must_use]
    pub const fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Configured model, or the client's own when none is set.
    #[must_use]
    pub fn request_model(&self) -> String {
        self.config
            .model
            .clone()
            .unwrap_or_else(|| self.client.model().to_string())
    }

    /// Run one turn and return the final assistant message.
    ///
    /// Tool failures never fail the turn; they are recorded as error tool
    /// messages the model sees on the follow-up request.
    ///
    /// # Errors
    ///
    /// Returns [`TurnError`] if an LLM call fails, the manager rejects an
    /// update, or `cancel` fires before the turn finishes.
    pub async fn run_turn(
        &self,
        input: impl Into<String>,
        cancel: &CancellationToken,
    ) -> Result<Message, TurnError> {
        self.execute_turn(input.into(), cancel.clone(), None).await
    }

    /// Run one turn, yielding reply deltas and tool messages as they are
    /// produced.
    ///
    /// The stream ends with [`StreamItem::Completed`] carrying the same
    /// message [`run_turn`](Self::run_turn) would return, or with a single
    /// error.
    pub fn run_turn_stream(
        &self,
        input: impl Into<String>,
        cancel: CancellationToken,
    ) -> TurnStream<'_> {
        enum Step {
            Item(StreamItem),
            Done(Result<Message, TurnError>),
        }

        let input = input.into();
        Box::pin(async_stream::stream! {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let drive = self.execute_turn(input, cancel, Some(tx));
            tokio::pin!(drive);

            loop {
                let step = tokio::select! {
                    biased;
                    Some(item) = rx.recv() => Step::Item(item),
                    result = &mut drive => Step::Done(result),
                };

                match step {
                    Step::Item(item) => {
                        yield Ok(item);
                    }
                    Step::Done(result) => {
                        while let Ok(item) = rx.try_recv() {
                            yield Ok(item);
                        }
                        yield result.map(StreamItem::Completed);
                        break;
                    }
                }
            }
        })
    }
}

impl std::fmt::Debug for TurnOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnOrchestrator")
            .field("model", &self.request_model())
            .field("tools", &self.tools.len())
            .field("observers", &self.events.len())
            .finish_non_exhaustive()
    }
}
