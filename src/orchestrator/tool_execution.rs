use super::TurnOrchestrator;
use super::helpers::{
    execution_failed, millis_to_u64, panic_message, tool_not_found, validation_failed,
};
use super::types::{StreamItem, TurnContext, TurnError};
use crate::events::TurnEvent;
use crate::tools::{
    CALL_ID_KEY, TOOL_NAME_KEY, ToolContext, ToolExecutionError, validate_tool_call,
};
use crate::types::{Message, ToolCall, ToolResult};
use futures::FutureExt;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::time::Instant;
use tracing::{debug, warn};

impl TurnOrchestrator {
    /// Execute `calls` one at a time in the order the model listed them,
    /// appending one tool message per call.
    ///
    /// Only cancellation and manager failures abort the loop.
    pub(super) async fn dispatch_tool_calls(
        &self,
        ctx: &mut TurnContext,
        calls: &[ToolCall],
    ) -> Result<(), TurnError> {
        for call in calls {
            ctx.check_cancelled()?;

            let result = self.execute_tool_call(ctx, call).await;
            ctx.tool_call_count += 1;

            let message = Message::tool(result);
            self.manager
                .conversation()
                .push_tool_message(&ctx.turn_id, message.clone())
                .map_err(|e| TurnError::manager(&e))?;
            ctx.forward(StreamItem::ToolMessage(message));
        }
        Ok(())
    }

    /// Validate and run a single call. Always produces a result paired with
    /// the call.
    async fn execute_tool_call(&self, ctx: &TurnContext, call: &ToolCall) -> ToolResult {
        if let Some(declaration) = self.tools.declaration(&call.name) {
            let outcome = validate_tool_call(call, declaration);
            if !outcome.is_valid {
                warn!(tool = %call.name, call_id = %call.id, errors = ?outcome.errors, "Tool call rejected");
                self.publish(
                    ctx,
                    TurnEvent::ToolValidationFailed {
                        turn_id: ctx.turn_id.clone(),
                        call_id: call.id.clone(),
                        tool_name: call.name.clone(),
                        errors: outcome.errors.clone(),
                    },
                );
                return validation_failed(call, &outcome.errors);
            }
        }

        let Some(tool) = self.tools.get(&call.name) else {
            let available_tools = self.tools.registered_names();
            warn!(tool = %call.name, call_id = %call.id, "Unknown tool");
            self.publish(
                ctx,
                TurnEvent::ToolNotFound {
                    turn_id: ctx.turn_id.clone(),
                    call_id: call.id.clone(),
                    tool_name: call.name.clone(),
                    available_tools: available_tools.clone(),
                },
            );
            return tool_not_found(call, &available_tools);
        };

        self.publish(
            ctx,
            TurnEvent::ToolExecutionStarted {
                turn_id: ctx.turn_id.clone(),
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
            },
        );

        let tool_context = ToolContext::new(ctx.conversation_id.clone(), ctx.turn_id.clone())
            .with_cancellation(ctx.cancel.clone())
            .with_metadata(CALL_ID_KEY, Value::String(call.id.clone()))
            .with_metadata(TOOL_NAME_KEY, Value::String(call.name.clone()));
        let started = Instant::now();
        let outcome = AssertUnwindSafe(tool.execute(&tool_context, call))
            .catch_unwind()
            .await;
        let duration_ms = millis_to_u64(started.elapsed().as_millis());

        let result = match outcome {
            Ok(Ok(mut result)) => {
                result.call_id.clone_from(&call.id);
                result.tool_name.clone_from(&call.name);
                result
            }
            Ok(Err(e)) => {
                let message = match e.downcast_ref::<ToolExecutionError>() {
                    Some(failure) => failure.source.to_string(),
                    None => format!("{e:#}"),
                };
                warn!(tool = %call.name, call_id = %call.id, error = %message, "Tool execution failed");
                execution_failed(call, &message)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                warn!(tool = %call.name, call_id = %call.id, panic = %message, "Tool panicked");
                execution_failed(call, &message)
            }
        };

        debug!(
            tool = %call.name,
            call_id = %call.id,
            duration_ms,
            is_error = result.is_error,
            "Tool call finished"
        );
        self.publish(
            ctx,
            TurnEvent::ToolExecutionCompleted {
                turn_id: ctx.turn_id.clone(),
                call_id: call.id.clone(),
                tool_name: call.name.clone(),
                duration_ms,
                is_error: result.is_error,
            },
        );

        result
    }
}
