//! Configuration for context selection and compaction.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Policy governing which subset of history is sent on the next request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionStrategy {
    /// Send the filtered history unchanged.
    None,
    /// Keep only the most recent messages.
    Simple,
    /// Keep recent messages plus older tool traffic and the first system message.
    #[default]
    Smart,
    /// Keep the highest scoring messages under a message and token budget.
    Semantic,
    /// Keep recent messages behind a synthesized summary of earlier history.
    Summary,
}

/// Configuration shared by the default and semantic conversation managers.
///
/// # Example
///
/// ```
/// use conversation_sdk::context::{CompressionStrategy, ManagerConfig};
///
/// let config = ManagerConfig::default()
///     .with_strategy(CompressionStrategy::Simple)
///     .with_max_recent_messages(4);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ManagerConfig {
    /// Selection policy.
    /// Default: `Smart`
    pub strategy: CompressionStrategy,

    /// Number of recent messages kept verbatim (or the message budget for
    /// `Semantic`).
    /// Default: 20
    pub max_recent_messages: usize,

    /// Estimated token budget for the extracted history.
    /// Default: 4,000
    pub max_tokens: usize,

    /// Messages older than this are dropped before selection.
    /// Default: none
    pub max_message_age: Option<Duration>,

    /// Drop every system message before selection.
    pub exclude_system_messages: bool,

    /// Drop every tool message before selection.
    pub exclude_tool_messages: bool,

    /// Keep tool calls and their results together in the extracted set.
    /// Default: true
    pub preserve_tool_call_pairs: bool,

    /// Keywords that raise a message's semantic score (case-insensitive).
    pub important_keywords: Vec<String>,

    /// Compaction is needed once the stored turn count exceeds this.
    /// Default: 50
    pub compaction_threshold: usize,

    /// Compact in the background from `add_turn` once the threshold is exceeded.
    /// Default: false
    pub auto_compact: bool,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            strategy: CompressionStrategy::default(),
            max_recent_messages: 20,
            max_tokens: 4_000,
            max_message_age: None,
            exclude_system_messages: false,
            exclude_tool_messages: false,
            preserve_tool_call_pairs: true,
            important_keywords: default_important_keywords(),
            compaction_threshold: 50,
            auto_compact: false,
        }
    }
}

fn default_important_keywords() -> Vec<String> {
    [
        "important",
        "critical",
        "urgent",
        "deadline",
        "remember",
        "decision",
        "requirement",
    ]
    .iter()
    .map(ToString::to_string)
    .collect()
}

impl ManagerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_strategy(mut self, strategy: CompressionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    #[must_use]
    pub const fn with_max_recent_messages(mut self, count: usize) -> Self {
        self.max_recent_messages = count;
        self
    }

    #[must_use]
    pub const fn with_max_tokens(mut self, tokens: usize) -> Self {
        self.max_tokens = tokens;
        self
    }

    #[must_use]
    pub const fn with_max_message_age(mut self, age: Duration) -> Self {
        self.max_message_age = Some(age);
        self
    }

    #[must_use]
    pub const fn with_exclude_system_messages(mut self, exclude: bool) -> Self {
        self.exclude_system_messages = exclude;
        self
    }

    #[must_use]
    pub const fn with_exclude_tool_messages(mut self, exclude: bool) -> Self {
        self.exclude_tool_messages = exclude;
        self
    }

    #[must_use]
    pub const fn with_preserve_tool_call_pairs(mut self, preserve: bool) -> Self {
        self.preserve_tool_call_pairs = preserve;
        self
    }

    #[must_use]
    pub fn with_important_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.important_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_compaction_threshold(mut self, turns: usize) -> Self {
        self.compaction_threshold = turns;
        self
    }

    #[must_use]
    pub const fn with_auto_compact(mut self, auto: bool) -> Self {
        self.auto_compact = auto;
        self
    }

    #[must_use]
    pub const fn filter(&self) -> FilterConfig {
        FilterConfig {
            max_message_age: self.max_message_age,
            exclude_system_messages: self.exclude_system_messages,
            exclude_tool_messages: self.exclude_tool_messages,
        }
    }
}

/// Options for the filter stage that runs before every selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    pub max_message_age: Option<Duration>,
    pub exclude_system_messages: bool,
    pub exclude_tool_messages: bool,
}

/// Configuration for the sliding window manager.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SlidingWindowConfig {
    /// Number of most recent messages returned.
    /// Default: 10
    pub window_size: usize,

    /// Keep the very first message if it is a system message.
    /// Default: true
    pub preserve_first_message: bool,

    /// Rolling summaries kept for messages that left the window.
    /// Default: 3
    pub max_queued_summaries: usize,

    /// Compact in the background from `add_turn` once the window overflows.
    /// Default: false
    pub auto_compact: bool,

    /// Filter stage applied before windowing.
    pub filter: FilterConfig,
}

impl Default for SlidingWindowConfig {
    fn default() -> Self {
        Self {
            window_size: 10,
            preserve_first_message: true,
            max_queued_summaries: 3,
            auto_compact: false,
            filter: FilterConfig::default(),
        }
    }
}

impl SlidingWindowConfig {
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        Self {
            window_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_preserve_first_message(mut self, preserve: bool) -> Self {
        self.preserve_first_message = preserve;
        self
    }

    #[must_use]
    pub const fn with_max_queued_summaries(mut self, count: usize) -> Self {
        self.max_queued_summaries = count;
        self
    }

    #[must_use]
    pub const fn with_auto_compact(mut self, auto: bool) -> Self {
        self.auto_compact = auto;
        self
    }

    #[must_use]
    pub const fn with_filter(mut self, filter: FilterConfig) -> Self {
        self.filter = filter;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ManagerConfig::default();
        assert_eq!(config.strategy, CompressionStrategy::Smart);
        assert_eq!(config.max_recent_messages, 20);
        assert_eq!(config.max_tokens, 4_000);
        assert_eq!(config.compaction_threshold, 50);
        assert!(config.preserve_tool_call_pairs);
        assert!(!config.auto_compact);
        assert!(config.important_keywords.iter().any(|k| k == "deadline"));
    }

    #[test]
    fn test_builder_pattern() {
        let config = ManagerConfig::new()
            .with_strategy(CompressionStrategy::Semantic)
            .with_max_recent_messages(5)
            .with_max_tokens(100)
            .with_max_message_age(Duration::from_secs(60))
            .with_exclude_tool_messages(true)
            .with_important_keywords(["budget"])
            .with_compaction_threshold(3)
            .with_auto_compact(true);

        assert_eq!(config.strategy, CompressionStrategy::Semantic);
        assert_eq!(config.max_recent_messages, 5);
        assert_eq!(config.max_tokens, 100);
        assert_eq!(config.important_keywords, vec!["budget".to_string()]);
        assert_eq!(config.compaction_threshold, 3);
        assert!(config.auto_compact);

        let filter = config.filter();
        assert_eq!(filter.max_message_age, Some(Duration::from_secs(60)));
        assert!(filter.exclude_tool_messages);
        assert!(!filter.exclude_system_messages);
    }

    #[test]
    fn test_strategy_serde_names() {
        let json = serde_json::to_string(&CompressionStrategy::Semantic).expect("serialize");
        assert_eq!(json, "\"semantic\"");
        let parsed: CompressionStrategy = serde_json::from_str("\"summary\"").expect("parse");
        assert_eq!(parsed, CompressionStrategy::Summary);
    }

    #[test]
    fn test_sliding_window_defaults() {
        let config = SlidingWindowConfig::new(2).with_preserve_first_message(false);
        assert_eq!(config.window_size, 2);
        assert!(!config.preserve_first_message);
        assert_eq!(config.max_queued_summaries, 3);
    }
}
