//! Selection algorithms for the compression strategies.
//!
//! Selections work on positions within the filtered history and hand back
//! survivors in their original order, which is also timestamp order.

use super::estimator::TokenEstimator;
use super::scoring::ImportanceScorer;
use crate::types::{Message, Role};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashSet};
use time::OffsetDateTime;

/// Keep only the last `count` messages.
#[must_use]
pub fn select_recent(mut messages: Vec<Message>, count: usize) -> Vec<Message> {
    let start = messages.len().saturating_sub(count);
    messages.split_off(start)
}

/// Keep the last `count` messages verbatim, then pull back older tool traffic
/// and the first system message.
///
/// From the older part this re-adds every message carrying a tool call and
/// every tool message answering a call made in the older part.
#[must_use]
pub fn select_smart(messages: Vec<Message>, count: usize, preserve_pairs: bool) -> Vec<Message> {
    let start = messages.len().saturating_sub(count);
    let mut selected: BTreeSet<usize> = (start..messages.len()).collect();

    let older = &messages[..start];
    let older_call_ids: HashSet<&str> = older
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.as_str()))
        .collect();

    for (idx, message) in older.iter().enumerate() {
        let answers_older_call = message.role == Role::Tool
            && message
                .tool_results
                .iter()
                .any(|r| older_call_ids.contains(r.call_id.as_str()));
        if message.has_tool_calls() || answers_older_call {
            selected.insert(idx);
        }
    }

    if let Some(idx) = messages.iter().position(|m| m.role == Role::System) {
        selected.insert(idx);
    }

    if preserve_pairs {
        complete_tool_pairs(&mut selected, &messages);
    }

    take_positions(messages, &selected)
}

/// Greedy selection by importance under a message count and token budget.
///
/// The first system message is always included and charged first. Messages
/// that would overflow the token budget are skipped in favour of smaller ones
/// further down the ranking.
#[must_use]
pub fn select_semantic(
    messages: Vec<Message>,
    scorer: &ImportanceScorer,
    max_messages: usize,
    max_tokens: usize,
    preserve_pairs: bool,
) -> Vec<Message> {
    let scores = scorer.score_all(&messages);

    let mut ranked: Vec<usize> = (0..messages.len()).collect();
    ranked.sort_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(Ordering::Equal)
            .then(b.cmp(&a))
    });

    let mut selected = BTreeSet::new();
    let mut tokens = 0usize;

    if let Some(idx) = messages.iter().position(|m| m.role == Role::System) {
        selected.insert(idx);
        tokens += TokenEstimator::estimate_message(&messages[idx]);
    }

    for idx in ranked {
        if selected.len() >= max_messages {
            break;
        }
        if selected.contains(&idx) {
            continue;
        }
        let cost = TokenEstimator::estimate_message(&messages[idx]);
        if tokens + cost > max_tokens {
            continue;
        }
        selected.insert(idx);
        tokens += cost;
    }

    if preserve_pairs {
        complete_tool_pairs(&mut selected, &messages);
    }

    take_positions(messages, &selected)
}

/// Keep the last `count` messages behind a synthesized summary message.
#[must_use]
pub fn select_with_summary(
    messages: Vec<Message>,
    count: usize,
    summary: Option<&str>,
    now: OffsetDateTime,
) -> Vec<Message> {
    let recent = select_recent(messages, count);
    match summary.filter(|s| !s.trim().is_empty()) {
        Some(summary) => {
            let header = summary_message(
                format!("Previous conversation summary:\n{summary}"),
                recent.first(),
                now,
            );
            std::iter::once(header).chain(recent).collect()
        }
        None => recent,
    }
}

/// Build a synthetic system message placed ahead of `next`.
///
/// The timestamp is `now` unless that would sort after the message it
/// precedes, in which case it takes that message's timestamp.
#[must_use]
pub fn summary_message(content: String, next: Option<&Message>, now: OffsetDateTime) -> Message {
    let created_at = next.map_or(now, |m| m.created_at.min(now));
    Message::system(content)
        .with_created_at(created_at)
        .with_metadata("synthetic", serde_json::Value::Bool(true))
}

/// Drop messages from the middle outward until the estimate fits.
///
/// A leading system message is never dropped. With an even number of
/// droppable messages the later of the two middle ones goes first. With
/// `preserve_pairs` a tool call and its results are dropped together.
#[must_use]
pub fn enforce_token_budget(
    mut messages: Vec<Message>,
    max_tokens: usize,
    preserve_pairs: bool,
) -> Vec<Message> {
    let mut total = TokenEstimator::estimate_history(&messages);
    if total <= max_tokens {
        return messages;
    }

    let keep_leading = usize::from(messages.first().is_some_and(|m| m.role == Role::System));
    while total > max_tokens && messages.len() > keep_leading {
        let droppable = messages.len() - keep_leading;
        let mut unit = BTreeSet::from([keep_leading + droppable / 2]);
        if preserve_pairs {
            complete_tool_pairs(&mut unit, &messages);
        }
        for &idx in unit.iter().rev().filter(|&&idx| idx >= keep_leading) {
            total -= TokenEstimator::estimate_message(&messages[idx]);
            messages.remove(idx);
        }
    }

    messages
}

/// Call ids whose call and result are both present in `messages`.
#[must_use]
pub fn paired_call_ids(messages: &[Message]) -> HashSet<String> {
    let answered: HashSet<&str> = messages
        .iter()
        .filter(|m| m.role == Role::Tool)
        .flat_map(|m| m.tool_results.iter().map(|r| r.call_id.as_str()))
        .collect();
    messages
        .iter()
        .flat_map(|m| m.tool_calls.iter())
        .filter(|c| answered.contains(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}

/// Drop the remaining half of every pair in `pairs` that lost its partner.
///
/// Calls and results outside `pairs` are left alone, so history that was
/// already one-sided before trimming passes through unchanged.
#[must_use]
pub fn drop_broken_pairs(mut messages: Vec<Message>, pairs: &HashSet<String>) -> Vec<Message> {
    loop {
        let broken: HashSet<&str> = {
            let intact = paired_call_ids(&messages);
            pairs
                .iter()
                .map(String::as_str)
                .filter(|id| !intact.contains(*id))
                .collect()
        };
        let before = messages.len();
        messages.retain(|m| {
            let broken_call = m.tool_calls.iter().any(|c| broken.contains(c.id.as_str()));
            let broken_result = m.role == Role::Tool
                && m
                    .tool_results
                    .iter()
                    .any(|r| broken.contains(r.call_id.as_str()));
            !(broken_call || broken_result)
        });
        if messages.len() == before {
            return messages;
        }
    }
}

/// Grow `selected` so that tool calls and tool results travel together.
///
/// Selected tool messages pull in the assistant message that made the call;
/// every selected call then pulls in its results from `pool`.
pub fn complete_tool_pairs(selected: &mut BTreeSet<usize>, pool: &[Message]) {
    let answered: HashSet<&str> = selected
        .iter()
        .flat_map(|&idx| pool[idx].tool_results.iter().map(|r| r.call_id.as_str()))
        .collect();
    for (idx, message) in pool.iter().enumerate() {
        if message
            .tool_calls
            .iter()
            .any(|c| answered.contains(c.id.as_str()))
        {
            selected.insert(idx);
        }
    }

    let requested: HashSet<&str> = selected
        .iter()
        .flat_map(|&idx| pool[idx].tool_calls.iter().map(|c| c.id.as_str()))
        .collect();
    for (idx, message) in pool.iter().enumerate() {
        if message.role == Role::Tool
            && message
                .tool_results
                .iter()
                .any(|r| requested.contains(r.call_id.as_str()))
        {
            selected.insert(idx);
        }
    }
}

fn take_positions(messages: Vec<Message>, selected: &BTreeSet<usize>) -> Vec<Message> {
    let mut survivors: Vec<Message> = messages
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| selected.contains(idx))
        .map(|(_, m)| m)
        .collect();
    // Positions are already chronological; the stable sort only guards
    // against callers feeding out-of-order input.
    survivors.sort_by_key(|m| m.created_at);
    survivors
}
