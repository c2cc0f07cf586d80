use crate::events::{EventEnvelope, TurnObserver};
use crate::llm::{ChatRequest, ChatResponse, ChunkStream, FinishReason, LlmClient, StreamChunk};
use crate::tools::{CALL_ID_KEY, TOOL_NAME_KEY, Tool, ToolContext};
use crate::types::{Message, TokenUsage, ToolCall, ToolResult};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

// ===================
// Mock LLM clients
// ===================

/// Replays scripted replies in order, then answers "Done".
pub struct MockLlmClient {
    responses: RwLock<Vec<Result<ChatResponse, String>>>,
    requests: Mutex<Vec<ChatRequest>>,
    call_count: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(responses: Vec<ChatResponse>) -> Self {
        Self::scripted(responses.into_iter().map(Ok).collect())
    }

    pub fn scripted(responses: Vec<Result<ChatResponse, String>>) -> Self {
        Self {
            responses: RwLock::new(responses),
            requests: Mutex::new(Vec::new()),
            call_count: AtomicUsize::new(0),
        }
    }

    pub fn text_response(text: &str) -> ChatResponse {
        ChatResponse::new(Message::assistant(text))
            .with_usage(usage())
            .with_finish_reason(FinishReason::Stop)
    }

    pub fn tool_call_response(calls: Vec<(&str, &str, Value)>) -> ChatResponse {
        let calls = calls
            .into_iter()
            .map(|(id, name, input)| ToolCall::new(id, name, input.to_string()))
            .collect();
        ChatResponse::new(Message::assistant_with_tool_calls("", calls))
            .with_usage(usage())
            .with_finish_reason(FinishReason::ToolCalls)
    }

    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().clone()
    }
}

const fn usage() -> TokenUsage {
    TokenUsage {
        input_tokens: 10,
        output_tokens: 20,
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
        let idx = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request);

        let responses = self.responses.read();
        match responses.get(idx) {
            Some(Ok(response)) => Ok(response.clone()),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Ok(Self::text_response("Done")),
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

/// Streams scripted chunk sequences, one sequence per request.
pub struct ChunkedLlmClient {
    streams: Mutex<VecDeque<Vec<StreamChunk>>>,
}

impl ChunkedLlmClient {
    pub fn new(streams: Vec<Vec<StreamChunk>>) -> Self {
        Self {
            streams: Mutex::new(streams.into()),
        }
    }
}

#[async_trait]
impl LlmClient for ChunkedLlmClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
        bail!("ChunkedLlmClient only streams")
    }

    fn complete_stream(&self, _request: ChatRequest) -> ChunkStream<'_> {
        let chunks = self.streams.lock().pop_front().unwrap_or_else(|| {
            vec![
                StreamChunk::text("Done"),
                StreamChunk::complete(Some(usage()), Some(FinishReason::Stop)),
            ]
        });
        Box::pin(futures::stream::iter(chunks.into_iter().map(Ok)))
    }
}

/// Never answers.
pub struct HangingLlmClient;

#[async_trait]
impl LlmClient for HangingLlmClient {
    async fn complete(&self, _request: ChatRequest) -> Result<ChatResponse> {
        std::future::pending::<Result<ChatResponse>>().await
    }
}

// ===================
// Mock tools
// ===================

fn message_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "message": { "type": "string" }
        }
    })
}

pub struct EchoTool;

impl Tool for EchoTool {
    fn name(&self) -> &str {
        "echo"
    }

    fn description(&self) -> &str {
        "Echo the message back"
    }

    fn input_schema(&self) -> Value {
        message_schema()
    }

    async fn execute(&self, _ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult> {
        let input: Value = serde_json::from_str(&call.arguments)?;
        let message = input
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("no message");
        Ok(ToolResult::success(call, format!("Echo: {message}")))
    }
}

pub struct FailingTool;

impl Tool for FailingTool {
    fn name(&self) -> &str {
        "fail"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, _ctx: &ToolContext, _call: &ToolCall) -> Result<ToolResult> {
        bail!("disk on fire")
    }
}

pub struct PanickingTool;

impl Tool for PanickingTool {
    fn name(&self) -> &str {
        "explode"
    }

    fn description(&self) -> &str {
        "Panics"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    #[allow(clippy::unused_async)]
    async fn execute(&self, _ctx: &ToolContext, _call: &ToolCall) -> Result<ToolResult> {
        panic!("handler exploded")
    }
}

/// Cancels the running turn from inside the handler.
pub struct CancellingTool;

impl Tool for CancellingTool {
    fn name(&self) -> &str {
        "stop"
    }

    fn description(&self) -> &str {
        "Cancels the turn"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult> {
        ctx.cancellation().cancel();
        Ok(ToolResult::success(call, "stopping"))
    }
}

/// Reports the per-call details it was handed.
pub struct CallInfoTool;

impl Tool for CallInfoTool {
    fn name(&self) -> &str {
        "whoami"
    }

    fn description(&self) -> &str {
        "Describes the current call"
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn execute(&self, ctx: &ToolContext, call: &ToolCall) -> Result<ToolResult> {
        let name = ctx.metadata_str(TOOL_NAME_KEY).unwrap_or("?");
        let id = ctx.metadata_str(CALL_ID_KEY).unwrap_or("?");
        Ok(ToolResult::success(call, format!("{name} {id} in {}", ctx.turn_id)))
    }
}

// ===================
// Observers
// ===================

#[derive(Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EventEnvelope>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<EventEnvelope> {
        self.events.lock().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(|e| e.event.kind()).collect()
    }
}

impl TurnObserver for RecordingObserver {
    fn on_event(&self, envelope: &EventEnvelope) {
        self.events.lock().push(envelope.clone());
    }
}
