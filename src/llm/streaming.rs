//! Streaming types for LLM responses.
//!
//! An LLM client streams [`StreamChunk`]s, the last of which has
//! `is_complete` set. [`StreamAccumulator`] folds chunks back into a
//! [`ChatResponse`] so the orchestrator can treat both paths the same way.

use super::types::{ChatResponse, FinishReason};
use crate::types::{Message, TokenUsage, ToolCall};
use futures::Stream;
use std::pin::Pin;

/// One increment of a streamed reply.
#[derive(Debug, Clone, Default)]
pub struct StreamChunk {
    pub delta: Option<MessageDelta>,
    /// Set on the final chunk of a stream.
    pub is_complete: bool,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    /// In-band error reported by the client. Terminates the stream.
    pub error: Option<String>,
}

impl StreamChunk {
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            delta: Some(MessageDelta {
                content: text.into(),
                tool_calls: Vec::new(),
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tool_call(id: impl Into<String>, name: Option<&str>, arguments: impl Into<String>) -> Self {
        Self {
            delta: Some(MessageDelta {
                content: String::new(),
                tool_calls: vec![ToolCallDelta {
                    id: id.into(),
                    name: name.map(ToString::to_string),
                    arguments: arguments.into(),
                }],
            }),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn complete(usage: Option<TokenUsage>, finish_reason: Option<FinishReason>) -> Self {
        Self {
            is_complete: true,
            usage,
            finish_reason,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Partial assistant message carried by a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageDelta {
    pub content: String,
    pub tool_calls: Vec<ToolCallDelta>,
}

/// Fragment of a tool call.
///
/// Only the first fragment for an id is expected to carry the name; argument
/// text is concatenated in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub id: String,
    pub name: Option<String>,
    pub arguments: String,
}

/// Type alias for a boxed stream of chunks.
pub type ChunkStream<'a> = Pin<Box<dyn Stream<Item = anyhow::Result<StreamChunk>> + Send + 'a>>;

/// Collects chunks into a final response.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    text: String,
    tool_calls: Vec<ToolCallAccumulator>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    complete: bool,
}

/// Accumulator for a single tool call during streaming.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl StreamAccumulator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, chunk: &StreamChunk) {
        if let Some(delta) = &chunk.delta {
            self.text.push_str(&delta.content);
            for fragment in &delta.tool_calls {
                self.apply_tool_fragment(fragment);
            }
        }
        if let Some(usage) = &chunk.usage {
            self.usage = Some(usage.clone());
        }
        if chunk.finish_reason.is_some() {
            self.finish_reason = chunk.finish_reason;
        }
        if chunk.is_complete {
            self.complete = true;
        }
    }

    fn apply_tool_fragment(&mut self, fragment: &ToolCallDelta) {
        // An empty id continues the most recently opened call.
        let existing = if fragment.id.is_empty() {
            self.tool_calls.last_mut()
        } else {
            self.tool_calls.iter_mut().find(|c| c.id == fragment.id)
        };

        match existing {
            Some(call) => {
                if call.name.is_empty()
                    && let Some(name) = &fragment.name
                {
                    call.name.clone_from(name);
                }
                call.arguments.push_str(&fragment.arguments);
            }
            None => self.tool_calls.push(ToolCallAccumulator {
                id: fragment.id.clone(),
                name: fragment.name.clone().unwrap_or_default(),
                arguments: fragment.arguments.clone(),
            }),
        }
    }

    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.complete
    }

    #[must_use]
    pub const fn usage(&self) -> Option<&TokenUsage> {
        self.usage.as_ref()
    }

    #[must_use]
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Consume the accumulator. Tool calls come out in first-seen order.
    #[must_use]
    pub fn into_response(self) -> ChatResponse {
        let tool_calls: Vec<ToolCall> = self
            .tool_calls
            .into_iter()
            .map(|c| ToolCall::new(c.id, c.name, c.arguments))
            .collect();
        let message = if tool_calls.is_empty() {
            Message::assistant(self.text)
        } else {
            Message::assistant_with_tool_calls(self.text, tool_calls)
        };

        ChatResponse {
            message,
            usage: self.usage,
            finish_reason: self.finish_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulator_text_deltas() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamChunk::text("Hello"));
        acc.apply(&StreamChunk::text(" world"));
        acc.apply(&StreamChunk::complete(None, Some(FinishReason::Stop)));

        assert!(acc.is_complete());
        let response = acc.into_response();
        assert_eq!(response.message.content, "Hello world");
        assert!(!response.has_tool_calls());
        assert_eq!(response.finish_reason, Some(FinishReason::Stop));
    }

    #[test]
    fn test_accumulator_tool_call_fragments() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamChunk::tool_call("call_1", Some("calculator"), r#"{"expr":"#));
        acc.apply(&StreamChunk::tool_call("call_2", Some("time"), "{}"));
        acc.apply(&StreamChunk::tool_call("call_1", None, r#""2+2"}"#));

        let response = acc.into_response();
        let calls = &response.message.tool_calls;
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_1");
        assert_eq!(calls[0].name, "calculator");
        assert_eq!(calls[0].arguments, r#"{"expr":"2+2"}"#);
        assert_eq!(calls[1].name, "time");
    }

    #[test]
    fn test_fragment_without_id_continues_last_call() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamChunk::tool_call("call_1", Some("calculator"), "{"));
        acc.apply(&StreamChunk::tool_call("", None, "}"));

        let response = acc.into_response();
        assert_eq!(response.message.tool_calls.len(), 1);
        assert_eq!(response.message.tool_calls[0].arguments, "{}");
    }

    #[test]
    fn test_late_name_fills_in() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamChunk::tool_call("call_1", None, "{"));
        acc.apply(&StreamChunk::tool_call("call_1", Some("time"), "}"));

        let response = acc.into_response();
        assert_eq!(response.message.tool_calls[0].name, "time");
    }

    #[test]
    fn test_usage_from_final_chunk() {
        let mut acc = StreamAccumulator::new();
        acc.apply(&StreamChunk::text("hi"));
        acc.apply(&StreamChunk::complete(
            Some(TokenUsage {
                input_tokens: 10,
                output_tokens: 2,
            }),
            None,
        ));

        assert_eq!(acc.usage().map(TokenUsage::total), Some(12));
    }

    #[test]
    fn test_accumulator_empty() {
        let acc = StreamAccumulator::new();
        assert!(!acc.is_complete());
        let response = acc.into_response();
        assert!(response.message.content.is_empty());
        assert!(response.usage.is_none());
    }
}
