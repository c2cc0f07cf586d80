use super::TurnOrchestrator;
use super::helpers::millis_to_u64;
use super::types::{StreamItem, TurnContext, TurnError};
use crate::events::TurnEvent;
use crate::llm::{ChatRequest, ChatResponse, StreamAccumulator};
use futures::StreamExt;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error};

impl TurnOrchestrator {
    /// Build a request from the manager's current context and send it.
    ///
    /// Races the call against the turn's cancellation token. Usage from the
    /// reply is added to the turn total.
    pub(super) async fn request_completion(
        &self,
        ctx: &mut TurnContext,
        attempt: u32,
    ) -> Result<ChatResponse, TurnError> {
        ctx.check_cancelled()?;

        let messages = self
            .manager
            .extract_messages_for_next_turn()
            .map_err(|e| TurnError::manager(&e))?;
        let request = ChatRequest::new(self.request_model(), messages)
            .with_tools(self.tools.declarations().to_vec())
            .with_max_tokens(self.config.max_tokens);

        self.publish(
            ctx,
            TurnEvent::RequestStarted {
                turn_id: ctx.turn_id.clone(),
                attempt,
                message_count: request.messages.len(),
                tool_count: request.tools.len(),
            },
        );
        debug!(
            turn_id = %ctx.turn_id,
            attempt,
            messages = request.messages.len(),
            "Sending LLM request"
        );

        let started = Instant::now();
        let cancel = ctx.cancel.clone();
        let outcome = match ctx.stream.clone() {
            Some(tx) => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TurnError::Cancelled),
                result = self.stream_completion(request, &tx) => result,
            },
            None => tokio::select! {
                biased;
                () = cancel.cancelled() => Err(TurnError::Cancelled),
                result = self.client.complete(request) => result.map_err(|e| TurnError::llm(&e)),
            },
        };

        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                if e.is_critical() {
                    error!(turn_id = %ctx.turn_id, attempt, error = %e, "LLM request failed");
                }
                return Err(e);
            }
        };

        if let Some(usage) = &response.usage {
            ctx.total_usage.add(usage);
        }
        self.publish(
            ctx,
            TurnEvent::ResponseReceived {
                turn_id: ctx.turn_id.clone(),
                attempt,
                tool_call_count: response.message.tool_calls.len(),
                usage: response.usage.clone(),
                duration_ms: millis_to_u64(started.elapsed().as_millis()),
            },
        );

        Ok(response)
    }

    /// Consume the client's chunk stream, forwarding non-empty deltas.
    async fn stream_completion(
        &self,
        request: ChatRequest,
        tx: &mpsc::UnboundedSender<StreamItem>,
    ) -> Result<ChatResponse, TurnError> {
        let mut chunks = self.client.complete_stream(request);
        let mut accumulator = StreamAccumulator::new();

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| TurnError::llm(&e))?;
            if let Some(message) = &chunk.error {
                return Err(TurnError::Stream(message.clone()));
            }

            accumulator.apply(&chunk);
            if let Some(delta) = chunk.delta
                && (!delta.content.is_empty() || !delta.tool_calls.is_empty())
            {
                let _ = tx.send(StreamItem::Delta(delta));
            }
            if chunk.is_complete {
                break;
            }
        }

        Ok(accumulator.into_response())
    }
}
