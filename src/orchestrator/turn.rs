use super::TurnOrchestrator;
use super::helpers::millis_to_u64;
use super::types::{StreamItem, TurnContext, TurnError};
use crate::conversation::Turn;
use crate::events::{SequenceCounter, TurnEvent};
use crate::manager::spawn_compaction;
use crate::types::{Message, TokenUsage};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

impl TurnOrchestrator {
    /// Run a turn and report its outcome through the event bus.
    pub(super) async fn execute_turn(
        &self,
        input: String,
        cancel: CancellationToken,
        stream: Option<mpsc::UnboundedSender<StreamItem>>,
    ) -> Result<Message, TurnError> {
        let turn = Turn::user(input.clone());
        let mut ctx = TurnContext {
            turn_id: turn.id.clone(),
            conversation_id: self.manager.conversation().read().id.to_string(),
            seq: SequenceCounter::new(),
            cancel,
            total_usage: TokenUsage::default(),
            tool_call_count: 0,
            start_time: Instant::now(),
            stream,
        };

        self.publish(
            &ctx,
            TurnEvent::TurnStarted {
                turn_id: ctx.turn_id.clone(),
                conversation_id: ctx.conversation_id.clone(),
                input,
            },
        );
        info!(turn_id = %ctx.turn_id, conversation_id = %ctx.conversation_id, "Turn started");

        match self.drive_turn(turn, &mut ctx).await {
            Ok(message) => {
                self.schedule_compaction();
                let duration_ms = millis_to_u64(ctx.start_time.elapsed().as_millis());
                info!(
                    turn_id = %ctx.turn_id,
                    duration_ms,
                    tool_calls = ctx.tool_call_count,
                    total_tokens = ctx.total_usage.total(),
                    "Turn completed"
                );
                self.publish(
                    &ctx,
                    TurnEvent::TurnCompleted {
                        turn_id: ctx.turn_id.clone(),
                        duration_ms,
                        tool_call_count: ctx.tool_call_count,
                        usage: ctx.total_usage.clone(),
                    },
                );
                Ok(message)
            }
            Err(e) => {
                if e.is_critical() {
                    error!(turn_id = %ctx.turn_id, error = %e, "Turn failed");
                } else {
                    info!(turn_id = %ctx.turn_id, "Turn cancelled");
                }
                self.publish(
                    &ctx,
                    TurnEvent::TurnFailed {
                        turn_id: ctx.turn_id.clone(),
                        message: e.to_string(),
                        critical: e.is_critical(),
                    },
                );
                Err(e)
            }
        }
    }

    async fn drive_turn(&self, turn: Turn, ctx: &mut TurnContext) -> Result<Message, TurnError> {
        ctx.check_cancelled()?;
        self.manager.add_turn(turn);
        let conversation = self.manager.conversation();

        let primary = self.request_completion(ctx, 1).await?;
        conversation
            .set_assistant_message(&ctx.turn_id, primary.message.clone())
            .map_err(|e| TurnError::manager(&e))?;

        if !primary.has_tool_calls() {
            return Ok(primary.message);
        }

        self.dispatch_tool_calls(ctx, &primary.message.tool_calls)
            .await?;

        let secondary = self.request_completion(ctx, 2).await?;
        if secondary.has_tool_calls() {
            warn!(
                turn_id = %ctx.turn_id,
                ignored = secondary.message.tool_calls.len(),
                "Follow-up response requested more tools; ignoring them"
            );
        }

        conversation
            .finalize_assistant_message(&ctx.turn_id, secondary.message)
            .map_err(|e| TurnError::manager(&e))
    }

    fn schedule_compaction(&self) {
        if self.config.auto_compact && self.manager.should_compact() {
            spawn_compaction(&self.manager);
        }
    }
}
