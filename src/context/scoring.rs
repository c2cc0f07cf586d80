//! Importance scoring used by semantic selection.

use crate::types::{Message, Role};

const RECENCY_WEIGHT: f64 = 0.3;
const KEYWORD_BONUS: f64 = 0.2;
const LONG_CONTENT_BONUS: f64 = 0.1;
const LONG_CONTENT_CHARS: usize = 500;
const TOOL_CALL_BONUS: f64 = 0.2;
const ERROR_BONUS: f64 = 0.4;
const EDGE_BONUS: f64 = 0.3;
const MAX_SCORE: f64 = 1.0;

/// Additive keyword/heuristic scorer. Scores are capped at 1.0.
#[derive(Debug, Clone)]
pub struct ImportanceScorer {
    keywords: Vec<String>,
}

impl ImportanceScorer {
    #[must_use]
    pub fn new(keywords: &[String]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    /// Score the message at `position` within a set of `total` messages.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn score(&self, message: &Message, position: usize, total: usize) -> f64 {
        if total == 0 {
            return 0.0;
        }

        let mut score = position as f64 / total as f64 * RECENCY_WEIGHT;

        score += match message.role {
            Role::System => 0.8,
            Role::User => 0.6,
            Role::Assistant if message.has_tool_calls() => 0.7,
            Role::Assistant => 0.4,
            Role::Tool => 0.5,
        };

        let content = message.content.to_lowercase();
        let keyword_hits = self
            .keywords
            .iter()
            .filter(|k| !k.is_empty() && content.contains(k.as_str()))
            .count();
        score += keyword_hits as f64 * KEYWORD_BONUS;

        if message.content.chars().count() > LONG_CONTENT_CHARS {
            score += LONG_CONTENT_BONUS;
        }

        score += message.tool_calls.len() as f64 * TOOL_CALL_BONUS;

        if flags_error(message) || content.contains("error") || content.contains("exception") {
            score += ERROR_BONUS;
        }

        if position == 0 || position + 1 == total {
            score += EDGE_BONUS;
        }

        score.min(MAX_SCORE)
    }

    /// Score every message of a set, in order.
    #[must_use]
    pub fn score_all(&self, messages: &[Message]) -> Vec<f64> {
        let total = messages.len();
        messages
            .iter()
            .enumerate()
            .map(|(position, message)| self.score(message, position, total))
            .collect()
    }
}

fn flags_error(message: &Message) -> bool {
    if message.has_tool_error() {
        return true;
    }
    ["error", "is_error"].iter().any(|key| {
        message
            .metadata
            .get(*key)
            .is_some_and(|v| v.as_bool().unwrap_or(!v.is_null()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;
    use serde_json::json;

    fn scorer() -> ImportanceScorer {
        ImportanceScorer::new(&["deadline".to_string(), "budget".to_string()])
    }

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_role_and_recency_terms() {
        let s = scorer();
        // position 2 of 10: 0.06 recency + 0.6 user
        assert!(approx(s.score(&Message::user("hello"), 2, 10), 0.66));
        // 0.15 recency + 0.4 assistant
        assert!(approx(s.score(&Message::assistant("ok"), 5, 10), 0.55));
    }

    #[test]
    fn test_edge_bonus() {
        let s = scorer();
        assert!(approx(s.score(&Message::user("hi"), 0, 10), 0.9));
        // 0.27 + 0.4 + 0.3
        assert!(approx(s.score(&Message::assistant("bye"), 9, 10), 0.97));
    }

    #[test]
    fn test_keywords_are_case_insensitive() {
        let s = scorer();
        let plain = s.score(&Message::user("the plan"), 3, 10);
        let keyword = s.score(&Message::user("The DEADLINE is Friday"), 3, 10);
        assert!(approx(keyword - plain, 0.2));
    }

    #[test]
    fn test_tool_call_bonuses() {
        let s = scorer();
        let message = Message::assistant_with_tool_calls(
            "",
            vec![ToolCall::new("c1", "time", "{}")],
        );
        // 0.03 recency + 0.7 assistant with calls + 0.2 per call
        assert!(approx(s.score(&message, 1, 10), 0.93));
    }

    #[test]
    fn test_error_bonus_from_metadata_and_content() {
        let s = scorer();
        let flagged = Message::assistant("ok").with_metadata("error", json!(true));
        assert!(approx(s.score(&flagged, 5, 10), 0.95));

        let mentioned = Message::assistant("an Exception occurred");
        assert!(approx(s.score(&mentioned, 5, 10), 0.95));
    }

    #[test]
    fn test_score_is_capped() {
        let s = scorer();
        let message = Message::system(format!(
            "deadline budget error {}",
            "x".repeat(600)
        ));
        assert!(approx(s.score(&message, 0, 1), 1.0));
    }

    #[test]
    fn test_empty_set_scores_zero() {
        assert!(approx(scorer().score(&Message::user("x"), 0, 0), 0.0));
        assert!(scorer().score_all(&[]).is_empty());
    }
}
