//! Context selection for the next LLM request.
//!
//! Every manager feeds the flattened conversation through the same pipeline:
//!
//! 1. **Filter**: drop messages older than the configured age and, if
//!    requested, every system or tool message
//! 2. **Select**: apply the configured [`CompressionStrategy`]
//! 3. **Budget**: shrink the selection to the token budget with a
//!    [`MessageCompressor`] (semantic selection budgets itself)
//!
//! Survivors always come back in chronological order.
//!
//! # Example
//!
//! ```
//! use conversation_sdk::context::{
//!     CompressionStrategy, ManagerConfig, MiddleOutCompressor, extract_context,
//! };
//! use conversation_sdk::Message;
//!
//! let config = ManagerConfig::default()
//!     .with_strategy(CompressionStrategy::Simple)
//!     .with_max_recent_messages(1);
//! let history = vec![Message::user("hi"), Message::assistant("hello")];
//!
//! let selected = extract_context(
//!     history,
//!     &config,
//!     None,
//!     &MiddleOutCompressor::default(),
//!     time::OffsetDateTime::now_utc(),
//! )
//! .unwrap();
//! assert_eq!(selected.len(), 1);
//! ```
//!
//! Compaction summaries are produced by a [`Summarizer`]: the deterministic
//! [`HeuristicSummarizer`] by default, or [`LlmSummarizer`] to have the model
//! write them.

mod config;
mod estimator;
mod filter;
mod pipeline;
mod scoring;
mod selection;
mod summarizer;

pub use config::{CompressionStrategy, FilterConfig, ManagerConfig, SlidingWindowConfig};
pub use estimator::TokenEstimator;
pub use filter::filter_messages;
pub use pipeline::{MessageCompressor, MiddleOutCompressor, extract_context};
pub use scoring::ImportanceScorer;
pub use selection::{
    complete_tool_pairs, drop_broken_pairs, enforce_token_budget, paired_call_ids, select_recent,
    select_semantic, select_smart, select_with_summary, summary_message,
};
pub use summarizer::{HeuristicSummarizer, LlmSummarizer, Summarizer};
