use super::{OrchestratorConfig, TurnOrchestrator};
use crate::events::{EventBus, TurnObserver};
use crate::llm::LlmClient;
use crate::manager::ConversationManager;
use crate::tools::ToolRegistry;
use anyhow::{Result, bail};
use std::sync::Arc;

/// Builder for [`TurnOrchestrator`].
///
/// The LLM client and the conversation manager are required; everything
/// else has a default.
#[derive(Default)]
pub struct TurnOrchestratorBuilder {
    client: Option<Arc<dyn LlmClient>>,
    manager: Option<Arc<dyn ConversationManager>>,
    tools: Option<ToolRegistry>,
    events: EventBus,
    config: Option<OrchestratorConfig>,
}

impl TurnOrchestratorBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn llm_client(self, client: impl LlmClient + 'static) -> Self {
        self.shared_llm_client(Arc::new(client))
    }

    /// Use a client that is shared with other components, such as an
    /// [`LlmSummarizer`](crate::context::LlmSummarizer).
    #[must_use]
    pub fn shared_llm_client(mut self, client: Arc<dyn LlmClient>) -> Self {
        self.client = Some(client);
        self
    }

    #[must_use]
    pub fn manager(self, manager: impl ConversationManager + 'static) -> Self {
        self.shared_manager(Arc::new(manager))
    }

    #[must_use]
    pub fn shared_manager(mut self, manager: Arc<dyn ConversationManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    #[must_use]
    pub fn tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Add an observer. Observers receive events in the order they were added.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn TurnObserver>) -> Self {
        self.events.subscribe(observer);
        self
    }

    #[must_use]
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// # Errors
    ///
    /// Returns an error if the LLM client or the manager was not set.
    pub fn build(self) -> Result<TurnOrchestrator> {
        let Some(client) = self.client else {
            bail!("an LLM client is required");
        };
        let Some(manager) = self.manager else {
            bail!("a conversation manager is required");
        };

        Ok(TurnOrchestrator {
            client,
            manager,
            tools: self.tools.unwrap_or_default(),
            events: self.events,
            config: self.config.unwrap_or_default(),
        })
    }
}
