//! Tool definition and registry.
//!
//! - [`Tool`] trait - Define handlers the LLM can call
//! - [`ToolRegistry`] - Declared schemas plus registered handlers
//! - [`ToolContext`] - Context passed to tool execution
//! - [`ToolExecutionError`] - Structured failure a handler can raise
//! - [`validate_tool_call`] - Argument check run before dispatch
//!
//! A declaration tells the LLM a tool exists; a handler actually runs it.
//! The two are tracked separately so a declared tool without a handler is
//! reported in-band as not found instead of failing the turn.
//!
//! # Implementing a Tool
//!
//! ```
//! use conversation_sdk::{Tool, ToolContext};
//! use conversation_sdk::{ToolCall, ToolResult};
//! use serde_json::{Value, json};
//!
//! struct Clock;
//!
//! impl Tool for Clock {
//!     fn name(&self) -> &str { "time" }
//!     fn description(&self) -> &str { "Current UTC time" }
//!     fn input_schema(&self) -> Value { json!({ "type": "object" }) }
//!
//!     async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> anyhow::Result<ToolResult> {
//!         Ok(ToolResult::success(call, "12:00"))
//!     }
//! }
//! ```

mod validator;

pub use crate::llm::ToolDeclaration;
pub use validator::{ValidationOutcome, validate_tool_call};

use crate::types::{ToolCall, ToolResult};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// [`ToolContext::metadata`] key holding the id of the call being executed.
pub const CALL_ID_KEY: &str = "call_id";
/// [`ToolContext::metadata`] key holding the name the model called.
pub const TOOL_NAME_KEY: &str = "tool_name";

/// Context passed to tool execution.
#[derive(Debug, Clone, Default)]
pub struct ToolContext {
    pub conversation_id: String,
    pub turn_id: String,
    /// Per-call details. The orchestrator always sets [`CALL_ID_KEY`] and
    /// [`TOOL_NAME_KEY`].
    pub metadata: HashMap<String, Value>,
    cancel: CancellationToken,
}

impl ToolContext {
    #[must_use]
    pub fn new(conversation_id: impl Into<String>, turn_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turn_id: turn_id.into(),
            metadata: HashMap::new(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token cancelled when the owning turn is cancelled. Long-running tools
    /// should select on it.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// String metadata value, if present.
    #[must_use]
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Structured failure raised by a tool handler.
///
/// Handlers return it through `anyhow::Error`; the orchestrator downcasts to
/// recover the details.
#[derive(Debug, thiserror::Error)]
#[error("tool '{tool_name}' failed (call {call_id}): {source}")]
pub struct ToolExecutionError {
    pub tool_name: String,
    pub call_id: String,
    /// Raw argument payload the handler was invoked with.
    pub arguments: String,
    #[source]
    pub source: Box<dyn std::error::Error + Send + Sync>,
}

impl ToolExecutionError {
    #[must_use]
    pub fn new(call: &ToolCall, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self {
            tool_name: call.name.clone(),
            call_id: call.id.clone(),
            arguments: call.arguments.clone(),
            source: cause.into(),
        }
    }
}

/// Handler for one tool.
///
/// This trait uses native async functions in traits; `async_trait` is not
/// needed to implement it.
pub trait Tool: Send + Sync {
    /// Name the LLM uses to call this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str;

    /// JSON schema for the tool's input parameters.
    fn input_schema(&self) -> Value;

    /// Execute the tool for `call`.
    ///
    /// # Errors
    /// Returns an error (optionally a [`ToolExecutionError`]) if execution
    /// fails. The orchestrator turns it into an error tool result.
    fn execute(
        &self,
        ctx: &ToolContext,
        call: &ToolCall,
    ) -> impl Future<Output = Result<ToolResult>> + Send;
}

/// Type-erased tool trait for registry storage.
#[async_trait]
pub trait ErasedTool: Send + Sync {
    fn name_str(&self) -> &str;
    fn declaration(&self) -> ToolDeclaration;
    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult>;
}

struct ToolWrapper<T: Tool> {
    inner: T,
    name_cache: String,
}

impl<T: Tool> ToolWrapper<T> {
    fn new(tool: T) -> Self {
        let name_cache = tool.name().to_string();
        Self {
            inner: tool,
            name_cache,
        }
    }
}

#[async_trait]
impl<T: Tool + 'static> ErasedTool for ToolWrapper<T> {
    fn name_str(&self) -> &str {
        &self.name_cache
    }

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration::new(
            self.name_cache.clone(),
            self.inner.description(),
            self.inner.input_schema(),
        )
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult> {
        self.inner.execute(ctx, call).await
    }
}

/// Registry of declared tools and their handlers.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    declarations: Vec<ToolDeclaration>,
    handlers: HashMap<String, Arc<dyn ErasedTool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool: declares its schema and installs its handler.
    pub fn register<T>(&mut self, tool: T) -> &mut Self
    where
        T: Tool + 'static,
    {
        let wrapper = ToolWrapper::new(tool);
        self.declare(wrapper.declaration());
        self.handlers
            .insert(wrapper.name_str().to_string(), Arc::new(wrapper));
        self
    }

    /// Declare a schema without a handler. Replaces an existing declaration
    /// of the same name in place.
    pub fn declare(&mut self, declaration: ToolDeclaration) -> &mut Self {
        match self
            .declarations
            .iter_mut()
            .find(|d| d.name == declaration.name)
        {
            Some(existing) => *existing = declaration,
            None => self.declarations.push(declaration),
        }
        self
    }

    /// Remove a handler, keeping its declaration.
    pub fn remove_handler(&mut self, name: &str) -> Option<Arc<dyn ErasedTool>> {
        self.handlers.remove(name)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn ErasedTool>> {
        self.handlers.get(name)
    }

    #[must_use]
    pub fn declaration(&self, name: &str) -> Option<&ToolDeclaration> {
        self.declarations.iter().find(|d| d.name == name)
    }

    /// Declared schemas in declaration order, as sent to the LLM.
    #[must_use]
    pub fn declarations(&self) -> &[ToolDeclaration] {
        &self.declarations
    }

    /// Names with a registered handler, sorted.
    #[must_use]
    pub fn registered_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Keep only tools whose name satisfies the predicate. Applies to both
    /// declarations and handlers.
    pub fn filter<F>(&mut self, predicate: F)
    where
        F: Fn(&str) -> bool,
    {
        self.declarations.retain(|d| predicate(&d.name));
        self.handlers.retain(|name, _| predicate(name));
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("declarations", &self.declarations)
            .field("handlers", &self.registered_names())
            .finish()
    }
}
