use super::ToolDeclaration;
use crate::types::ToolCall;
use serde::Serialize;

/// Result of checking a tool call against its declaration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationOutcome {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

impl ValidationOutcome {
    fn from_errors(errors: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
        }
    }
}

/// Check that a call's arguments are present and well-formed JSON.
///
/// The declared schema is not enforced yet: required fields and types go
/// unchecked.
#[must_use]
pub fn validate_tool_call(call: &ToolCall, declaration: &ToolDeclaration) -> ValidationOutcome {
    let mut errors = Vec::new();

    if call.name != declaration.name {
        errors.push(format!(
            "Tool call '{}' does not match declaration '{}'",
            call.name, declaration.name
        ));
    }

    if call.arguments.trim().is_empty() {
        errors.push(format!("Tool '{}' was called with empty arguments", call.name));
    } else if let Err(e) = serde_json::from_str::<serde_json::Value>(&call.arguments) {
        errors.push(format!("Invalid JSON arguments for tool '{}': {e}", call.name));
    }

    ValidationOutcome::from_errors(errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn declaration() -> ToolDeclaration {
        ToolDeclaration::new(
            "calculator",
            "Evaluate an expression",
            json!({
                "type": "object",
                "properties": { "expr": { "type": "string" } },
                "required": ["expr"]
            }),
        )
    }

    #[test]
    fn test_valid_arguments() {
        let call = ToolCall::new("c1", "calculator", r#"{"expr":"1+1"}"#);
        let outcome = validate_tool_call(&call, &declaration());
        assert!(outcome.is_valid);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_empty_arguments() {
        let call = ToolCall::new("c1", "calculator", "  ");
        let outcome = validate_tool_call(&call, &declaration());
        assert!(!outcome.is_valid);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].contains("empty arguments"));
    }

    #[test]
    fn test_malformed_json() {
        let call = ToolCall::new("c1", "calculator", r#"{"expr":"#);
        let outcome = validate_tool_call(&call, &declaration());
        assert!(!outcome.is_valid);
        assert!(outcome.errors[0].starts_with("Invalid JSON arguments"));
    }

    #[test]
    fn test_schema_not_enforced() {
        // Missing a required field is accepted for now.
        let call = ToolCall::new("c1", "calculator", "{}");
        assert!(validate_tool_call(&call, &declaration()).is_valid);
    }

    #[test]
    fn test_errors_are_ordered() {
        let call = ToolCall::new("c1", "other", "");
        let outcome = validate_tool_call(&call, &declaration());
        assert_eq!(outcome.errors.len(), 2);
        assert!(outcome.errors[0].contains("does not match"));
        assert!(outcome.errors[1].contains("empty arguments"));
    }
}
