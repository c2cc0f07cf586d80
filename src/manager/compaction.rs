//! Turn-level compaction shared by the default and semantic managers.

use crate::context::Summarizer;
use crate::conversation::{
    COMPACTED_TURN_COUNT_KEY, CONVERSATION_SUMMARY_KEY, LAST_COMPACTION_KEY, SharedConversation,
    Turn,
};
use crate::types::Message;
use anyhow::Result;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

pub(super) const NO_HISTORY: &str = "No conversation history.";

/// Number of leading turns that fall outside a window of
/// `max_recent_messages` messages, counting back from the newest turn.
pub(super) fn turns_outside_window(turns: &[Turn], max_recent_messages: usize) -> usize {
    let mut retained_messages = 0;
    let mut retained_turns = 0;
    for turn in turns.iter().rev() {
        let count = turn.message_count();
        if retained_messages + count > max_recent_messages {
            break;
        }
        retained_messages += count;
        retained_turns += 1;
    }
    turns.len() - retained_turns
}

fn flatten(turns: &[Turn]) -> Vec<Message> {
    turns.iter().flat_map(Turn::messages).cloned().collect()
}

/// Summarize the turns outside the retained window and store the summary.
///
/// Never removes turns. Returns `false` when every turn is still inside the
/// window.
pub(super) async fn compact_turns(
    conversation: &SharedConversation,
    summarizer: &dyn Summarizer,
    max_recent_messages: usize,
) -> Result<bool> {
    let (older, cut) = {
        let guard = conversation.read();
        let turns = guard.turns();
        let cut = turns_outside_window(turns, max_recent_messages);
        (flatten(&turns[..cut]), cut)
    };

    if cut == 0 {
        return Ok(false);
    }

    let summary = summarizer.summarize(&older).await?;
    let stamp = OffsetDateTime::now_utc().format(&Rfc3339)?;

    let mut guard = conversation.write();
    guard.set_state(CONVERSATION_SUMMARY_KEY, summary)?;
    guard.set_state(LAST_COMPACTION_KEY, stamp)?;
    guard.set_state(COMPACTED_TURN_COUNT_KEY, cut)?;

    tracing::info!(
        conversation_id = %guard.id,
        compacted_turns = cut,
        total_turns = guard.turn_count(),
        "Conversation compacted"
    );
    Ok(true)
}

/// Cumulative summary: summarize everything on first use, afterwards only
/// the turns added since the stored summary was written, appending to it.
pub(super) async fn cumulative_summary(
    conversation: &SharedConversation,
    summarizer: &dyn Summarizer,
) -> Result<String> {
    let (existing, fresh, total) = {
        let guard = conversation.read();
        let turns = guard.turns();
        if turns.is_empty() {
            return Ok(NO_HISTORY.to_string());
        }

        let existing: Option<String> = guard.get_state(CONVERSATION_SUMMARY_KEY);
        let covered = if existing.is_some() {
            guard
                .get_state::<usize>(COMPACTED_TURN_COUNT_KEY)
                .unwrap_or(0)
                .min(turns.len())
        } else {
            0
        };
        (existing, flatten(&turns[covered..]), turns.len())
    };

    let summary = match existing {
        Some(existing) if fresh.is_empty() => return Ok(existing),
        Some(existing) => {
            let addition = summarizer.summarize(&fresh).await?;
            format!("{existing}\n\n{addition}")
        }
        None => summarizer.summarize(&fresh).await?,
    };

    let mut guard = conversation.write();
    guard.set_state(CONVERSATION_SUMMARY_KEY, summary.clone())?;
    guard.set_state(COMPACTED_TURN_COUNT_KEY, total)?;
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::HeuristicSummarizer;

    fn conversation_with(turns: usize) -> SharedConversation {
        let conversation = SharedConversation::default();
        for i in 0..turns {
            conversation.add_turn(Turn::exchange(format!("q{i}"), format!("a{i}")));
        }
        conversation
    }

    #[test]
    fn test_turns_outside_window() {
        let turns: Vec<Turn> = (0..5).map(|i| Turn::exchange(format!("q{i}"), "a")).collect();
        assert_eq!(turns_outside_window(&turns, 4), 3);
        assert_eq!(turns_outside_window(&turns, 5), 3);
        assert_eq!(turns_outside_window(&turns, 10), 0);
        assert_eq!(turns_outside_window(&turns, 0), 5);
        assert_eq!(turns_outside_window(&[], 3), 0);
    }

    #[tokio::test]
    async fn test_compact_stores_summary_and_keeps_turns() -> Result<()> {
        let conversation = conversation_with(5);

        let compacted = compact_turns(&conversation, &HeuristicSummarizer, 4).await?;

        assert!(compacted);
        assert_eq!(conversation.turn_count(), 5);
        let summary: String = conversation
            .get_state(CONVERSATION_SUMMARY_KEY)
            .unwrap_or_default();
        assert!(summary.contains("q0"));
        assert!(!summary.contains("q4"));
        assert_eq!(conversation.get_state::<usize>(COMPACTED_TURN_COUNT_KEY), Some(3));
        let stamp: String = conversation.get_state(LAST_COMPACTION_KEY).unwrap_or_default();
        OffsetDateTime::parse(&stamp, &Rfc3339)?;
        Ok(())
    }

    #[tokio::test]
    async fn test_compact_noop_inside_window() -> Result<()> {
        let conversation = conversation_with(2);
        assert!(!compact_turns(&conversation, &HeuristicSummarizer, 10).await?);
        assert!(!conversation.read().has_state(CONVERSATION_SUMMARY_KEY));
        Ok(())
    }

    #[tokio::test]
    async fn test_cumulative_summary_appends() -> Result<()> {
        let conversation = conversation_with(2);

        let first = cumulative_summary(&conversation, &HeuristicSummarizer).await?;
        assert!(first.contains("q0"));

        conversation.add_turn(Turn::exchange("later question", "later answer"));
        let second = cumulative_summary(&conversation, &HeuristicSummarizer).await?;

        assert!(second.starts_with(&first));
        assert!(second.contains("later question"));
        assert_eq!(conversation.get_state::<usize>(COMPACTED_TURN_COUNT_KEY), Some(3));

        // Nothing new: stored summary is returned unchanged.
        let third = cumulative_summary(&conversation, &HeuristicSummarizer).await?;
        assert_eq!(third, second);
        Ok(())
    }

    #[tokio::test]
    async fn test_cumulative_summary_without_history() -> Result<()> {
        let conversation = SharedConversation::default();
        assert_eq!(
            cumulative_summary(&conversation, &HeuristicSummarizer).await?,
            NO_HISTORY
        );
        Ok(())
    }
}
