//! Summary generation for compaction.

use crate::llm::{ChatRequest, LlmClient};
use crate::types::{Message, Role};
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;

const PREVIEW_CHARS: usize = 100;
const PREVIEWS_PER_ROLE: usize = 3;
const TOOL_RESULT_CHARS: usize = 500;

/// Turns a slice of history into a textual summary.
///
/// Implement this trait to plug a custom summary source into the managers.
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Summarize `messages`.
    ///
    /// # Errors
    /// Returns an error if summarization fails.
    async fn summarize(&self, messages: &[Message]) -> Result<String>;
}

/// Deterministic offline summarizer.
///
/// Groups messages by role and reports a count and a few short previews for
/// each group.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicSummarizer;

impl HeuristicSummarizer {
    #[must_use]
    pub fn summarize_now(messages: &[Message]) -> String {
        if messages.is_empty() {
            return "No messages to summarize.".to_string();
        }

        let total = messages.len();
        let mut output = format!("Summary of {total} {}:\n", plural(total));
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let group: Vec<&Message> = messages.iter().filter(|m| m.role == role).collect();
            if group.is_empty() {
                continue;
            }

            let _ = writeln!(
                output,
                "{} ({} {}):",
                role.as_str(),
                group.len(),
                plural(group.len())
            );
            for message in group.iter().take(PREVIEWS_PER_ROLE) {
                let _ = writeln!(output, "  - {}", preview(message));
            }
        }

        output.truncate(output.trim_end().len());
        output
    }
}

#[async_trait]
impl Summarizer for HeuristicSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        Ok(Self::summarize_now(messages))
    }
}

const fn plural(count: usize) -> &'static str {
    if count == 1 { "message" } else { "messages" }
}

fn preview(message: &Message) -> String {
    let content = message.content.trim();
    if content.is_empty() {
        if message.has_tool_calls() {
            let names: Vec<&str> = message.tool_calls.iter().map(|c| c.name.as_str()).collect();
            return format!("[called: {}]", names.join(", "));
        }
        return "(empty)".to_string();
    }
    truncate_chars(&content.replace('\n', " "), PREVIEW_CHARS)
}

/// Truncate to at most `max_chars` characters, never splitting a code point.
pub(crate) fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...", &text[..byte_idx]),
        None => text.to_string(),
    }
}

/// Summarizer that asks the LLM for a prose summary.
pub struct LlmSummarizer {
    client: Arc<dyn LlmClient>,
    model: String,
    max_tokens: u32,
}

impl LlmSummarizer {
    #[must_use]
    pub fn new(client: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: 2000,
        }
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn format_messages(messages: &[Message]) -> String {
        let mut output = String::new();

        for message in messages {
            let _ = write!(output, "{}: ", message.role.as_str());
            if !message.content.is_empty() && message.role != Role::Tool {
                let _ = writeln!(output, "{}", message.content);
            }
            for call in &message.tool_calls {
                let _ = writeln!(
                    output,
                    "[Called tool: {} with input: {}]",
                    call.name, call.arguments
                );
            }
            for result in &message.tool_results {
                let status = if result.is_error { "error" } else { "success" };
                let content = if result.content.chars().count() > TOOL_RESULT_CHARS {
                    format!("{} (truncated)", truncate_chars(&result.content, TOOL_RESULT_CHARS))
                } else {
                    result.content.clone()
                };
                let _ = writeln!(output, "[Tool result ({status}): {content}]");
            }
            output.push('\n');
        }

        output
    }

    fn build_prompt(messages_text: &str) -> String {
        format!(
            r"Summarize this conversation concisely, preserving:
- Key decisions and conclusions reached
- Facts, names, dates and figures the user provided
- What has been accomplished and what is still pending
- Any errors encountered and how they were handled

Conversation:
{messages_text}

Provide a concise summary:"
        )
    }
}

#[async_trait]
impl Summarizer for LlmSummarizer {
    async fn summarize(&self, messages: &[Message]) -> Result<String> {
        if messages.is_empty() {
            return Ok(HeuristicSummarizer::summarize_now(messages));
        }

        let prompt = Self::build_prompt(&Self::format_messages(messages));
        let request = ChatRequest::new(
            self.model.clone(),
            vec![
                Message::system(
                    "You are a precise summarizer. Create concise but complete summaries of conversations, keeping every detail needed to continue them.",
                ),
                Message::user(prompt),
            ],
        )
        .with_max_tokens(self.max_tokens);

        let response = self
            .client
            .complete(request)
            .await
            .context("Failed to call LLM for summarization")?;

        let summary = response.message.content.trim();
        if summary.is_empty() {
            bail!("No text in summarization response");
        }
        Ok(summary.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatResponse;
    use crate::types::{ToolCall, ToolResult};
    use parking_lot::Mutex;

    #[test]
    fn test_heuristic_groups_by_role() {
        let call = ToolCall::new("c1", "time", "{}");
        let messages = vec![
            Message::system("be brief"),
            Message::user("hello"),
            Message::assistant_with_tool_calls("", vec![call.clone()]),
            Message::tool(ToolResult::success(&call, "noon")),
            Message::user("thanks"),
        ];

        let summary = HeuristicSummarizer::summarize_now(&messages);
        assert!(summary.starts_with("Summary of 5 messages:"));
        assert!(summary.contains("System (1 message):"));
        assert!(summary.contains("User (2 messages):"));
        assert!(summary.contains("[called: time]"));
        assert!(summary.contains("Tool (1 message):"));

        // Groups appear in role order.
        let system_at = summary.find("System").unwrap_or(usize::MAX);
        let user_at = summary.find("User").unwrap_or(usize::MAX);
        assert!(system_at < user_at);
    }

    #[test]
    fn test_heuristic_caps_previews() {
        let messages: Vec<Message> = (0..6).map(|i| Message::user(format!("msg {i}"))).collect();
        let summary = HeuristicSummarizer::summarize_now(&messages);
        assert!(summary.contains("msg 2"));
        assert!(!summary.contains("msg 3"));
    }

    #[test]
    fn test_heuristic_is_deterministic_and_handles_empty() {
        let messages = vec![Message::user("a".repeat(300))];
        assert_eq!(
            HeuristicSummarizer::summarize_now(&messages),
            HeuristicSummarizer::summarize_now(&messages)
        );
        assert_eq!(
            HeuristicSummarizer::summarize_now(&[]),
            "No messages to summarize."
        );
    }

    #[test]
    fn test_truncate_chars_is_unicode_safe() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
        let emoji = "🎉".repeat(10);
        assert_eq!(truncate_chars(&emoji, 3), format!("{}...", "🎉".repeat(3)));
    }

    #[test]
    fn test_format_messages_truncates_tool_results() {
        let call = ToolCall::new("c1", "read", r#"{"path":"a"}"#);
        let long = "é".repeat(600);
        let messages = vec![
            Message::assistant_with_tool_calls("reading", vec![call.clone()]),
            Message::tool(ToolResult::error(&call, long)),
        ];

        let formatted = LlmSummarizer::format_messages(&messages);
        assert!(formatted.contains(r#"[Called tool: read with input: {"path":"a"}]"#));
        assert!(formatted.contains("[Tool result (error): "));
        assert!(formatted.contains("(truncated)"));
    }

    struct CannedClient {
        reply: String,
        requests: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait]
    impl LlmClient for CannedClient {
        async fn complete(&self, request: ChatRequest) -> Result<ChatResponse> {
            self.requests.lock().push(request);
            Ok(ChatResponse::new(Message::assistant(self.reply.clone())))
        }
    }

    #[tokio::test]
    async fn test_llm_summarizer_uses_client_reply() -> Result<()> {
        let client = Arc::new(CannedClient {
            reply: "  The user greeted us.  ".to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let summarizer = LlmSummarizer::new(client.clone(), "test-model").with_max_tokens(100);

        let summary = summarizer.summarize(&[Message::user("hello")]).await?;
        assert_eq!(summary, "The user greeted us.");

        let requests = client.requests.lock();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "test-model");
        assert_eq!(requests[0].max_tokens, 100);
        assert!(requests[0].messages[1].content.contains("User: hello"));
        Ok(())
    }

    #[tokio::test]
    async fn test_llm_summarizer_rejects_empty_reply() {
        let client = Arc::new(CannedClient {
            reply: "   ".to_string(),
            requests: Mutex::new(Vec::new()),
        });
        let summarizer = LlmSummarizer::new(client, "m");
        assert!(summarizer.summarize(&[Message::user("hi")]).await.is_err());
    }
}
