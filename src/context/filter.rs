//! Filter stage shared by every selection strategy.

use super::config::FilterConfig;
use crate::types::{Message, Role};
use time::OffsetDateTime;

/// Drop messages that are too old or of an excluded role. Order is preserved.
///
/// Messages created strictly before `now - max_message_age` are dropped.
#[must_use]
pub fn filter_messages(messages: Vec<Message>, config: &FilterConfig, now: OffsetDateTime) -> Vec<Message> {
    let cutoff = config
        .max_message_age
        .and_then(|age| time::Duration::try_from(age).ok())
        .and_then(|age| now.checked_sub(age));

    messages
        .into_iter()
        .filter(|m| cutoff.is_none_or(|cutoff| m.created_at >= cutoff))
        .filter(|m| !(config.exclude_system_messages && m.role == Role::System))
        .filter(|m| !(config.exclude_tool_messages && m.role == Role::Tool))
        .collect()
}
