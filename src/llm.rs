pub mod streaming;
pub mod types;

pub use streaming::{
    ChunkStream, MessageDelta, StreamAccumulator, StreamChunk, ToolCallAccumulator, ToolCallDelta,
};
pub use types::*;

use anyhow::Result;
use async_trait::async_trait;

/// Collaborator that talks to a model.
///
/// Vendor adapters implement `complete`. Clients that can stream override
/// `complete_stream`; the default yields the whole reply as one delta
/// followed by a completion chunk.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, request: ChatRequest) -> Result<ChatResponse>;

    fn complete_stream(&self, request: ChatRequest) -> ChunkStream<'_> {
        Box::pin(async_stream::stream! {
            let response = match self.complete(request).await {
                Ok(response) => response,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };

            let message = response.message;
            let tool_calls = message
                .tool_calls
                .into_iter()
                .map(|call| ToolCallDelta {
                    id: call.id,
                    name: Some(call.name),
                    arguments: call.arguments,
                })
                .collect();
            yield Ok(StreamChunk {
                delta: Some(MessageDelta {
                    content: message.content,
                    tool_calls,
                }),
                ..StreamChunk::default()
            });
            yield Ok(StreamChunk::complete(response.usage, response.finish_reason));
        })
    }

    /// Model used when the caller does not name one.
    fn model(&self) -> &str {
        "unknown"
    }
}
