//! Conversation SDK - conversation state and turn orchestration for
//! LLM-powered assistants.
//!
//! This crate provides:
//! - A turn-structured conversation store with typed key/value state
//! - Context selection under message and token budgets (recent, smart,
//!   importance-scored, summary-prefixed)
//! - Conversation managers that compact older history into summaries
//! - A turn orchestrator that dispatches tool calls, validates their
//!   arguments, emits lifecycle events, streams and honours cancellation
//!
//! # Example
//!
//! ```ignore
//! use conversation_sdk::{
//!     DefaultConversationManager, ManagerConfig, ToolRegistry, TurnOrchestrator,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let manager = DefaultConversationManager::new(
//!     ManagerConfig::default().with_max_recent_messages(30),
//! );
//! let orchestrator = TurnOrchestrator::builder()
//!     .llm_client(my_client)
//!     .manager(manager.clone())
//!     .tools(ToolRegistry::new())
//!     .build()?;
//!
//! let reply = orchestrator.run_turn("Hello!", &CancellationToken::new()).await?;
//! println!("{}", reply.content);
//! println!("{:?}", manager.statistics());
//! ```

#![forbid(unsafe_code)]

pub mod context;
mod conversation;
mod events;
pub mod llm;
mod manager;
mod orchestrator;
mod tools;
mod types;

pub use context::{
    CompressionStrategy, FilterConfig, HeuristicSummarizer, LlmSummarizer, ManagerConfig,
    SlidingWindowConfig, Summarizer,
};
pub use conversation::{
    COMPACTED_TURN_COUNT_KEY, CONVERSATION_SUMMARY_KEY, Conversation, LAST_COMPACTION_KEY,
    SharedConversation, Turn,
};
pub use events::{
    ChannelObserver, EventBus, EventEnvelope, LoggingObserver, SequenceCounter, TurnEvent,
    TurnObserver,
};
pub use llm::LlmClient;
pub use manager::{
    ConversationManager, ConversationStatistics, DefaultConversationManager,
    SemanticConversationManager, SlidingWindowConversationManager,
};
pub use orchestrator::{
    OrchestratorConfig, StreamItem, TurnError, TurnOrchestrator, TurnOrchestratorBuilder,
    TurnStream,
};
pub use tools::{
    CALL_ID_KEY, TOOL_NAME_KEY, Tool, ToolContext, ToolDeclaration, ToolExecutionError, ToolRegistry, ValidationOutcome,
    validate_tool_call,
};
pub use types::{ConversationId, Message, Role, TokenUsage, ToolCall, ToolResult};
