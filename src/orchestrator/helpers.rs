use super::TurnOrchestrator;
use super::types::TurnContext;
use crate::events::TurnEvent;
use crate::types::{ToolCall, ToolResult};
use serde_json::{Value, json};
use std::any::Any;

/// Convert u128 milliseconds to u64, capping at `u64::MAX`
#[allow(clippy::cast_possible_truncation)]
pub(super) const fn millis_to_u64(millis: u128) -> u64 {
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

impl TurnOrchestrator {
    pub(super) fn publish(&self, ctx: &TurnContext, event: TurnEvent) {
        self.events.publish(event, &ctx.seq);
    }
}

/// Best-effort text of a panic payload.
pub(super) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "tool panicked".to_string()
    }
}

fn error_result(call: &ToolCall, payload: &Value) -> ToolResult {
    ToolResult::error(call, payload.to_string())
}

pub(super) fn validation_failed(call: &ToolCall, errors: &[String]) -> ToolResult {
    error_result(
        call,
        &json!({
            "error": "validation_failed",
            "tool": call.name,
            "errors": errors,
        }),
    )
}

pub(super) fn tool_not_found(call: &ToolCall, available_tools: &[String]) -> ToolResult {
    error_result(
        call,
        &json!({
            "error": "tool_not_found",
            "tool": call.name,
            "available_tools": available_tools,
        }),
    )
}

pub(super) fn execution_failed(call: &ToolCall, message: &str) -> ToolResult {
    error_result(
        call,
        &json!({
            "error": "execution_failed",
            "tool": call.name,
            "message": message,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_to_u64_saturates() {
        assert_eq!(millis_to_u64(42), 42);
        assert_eq!(millis_to_u64(u128::MAX), u64::MAX);
    }

    #[test]
    fn test_error_payloads_are_json() -> anyhow::Result<()> {
        let call = ToolCall::new("c1", "weather", "{}");

        let result = tool_not_found(&call, &["time".to_string()]);
        assert!(result.is_error);
        assert_eq!(result.call_id, "c1");
        let payload: Value = serde_json::from_str(&result.content)?;
        assert_eq!(payload["error"], "tool_not_found");
        assert_eq!(payload["available_tools"][0], "time");

        let payload: Value =
            serde_json::from_str(&execution_failed(&call, "boom").content)?;
        assert_eq!(payload["message"], "boom");
        Ok(())
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(payload.as_ref()), "static");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(payload.as_ref()), "tool panicked");
    }
}
