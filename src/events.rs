//! Turn lifecycle events.
//!
//! The [`TurnEvent`] enum represents everything observable while a turn runs.
//! Events are wrapped in an [`EventEnvelope`] and delivered synchronously, in
//! order, to every observer registered on the [`EventBus`].
//!
//! # Event Flow
//!
//! A turn without tools emits:
//! 1. `TurnStarted`
//! 2. `RequestStarted` / `ResponseReceived`
//! 3. `TurnCompleted`, or `TurnFailed` if the LLM or manager failed
//!
//! A tool-bearing turn adds, per call, `ToolExecutionStarted` followed by
//! `ToolExecutionCompleted`, or just `ToolValidationFailed` / `ToolNotFound`,
//! then a second `RequestStarted` / `ResponseReceived` pair.

use crate::types::TokenUsage;
use serde::{Deserialize, Serialize};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tokio::sync::mpsc;

/// Events emitted by the orchestrator during a turn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    TurnStarted {
        turn_id: String,
        conversation_id: String,
        input: String,
    },

    /// An LLM request is about to be sent. `attempt` is 1 for the primary
    /// call and 2 for the call after tool execution.
    RequestStarted {
        turn_id: String,
        attempt: u32,
        message_count: usize,
        tool_count: usize,
    },

    ResponseReceived {
        turn_id: String,
        attempt: u32,
        tool_call_count: usize,
        usage: Option<TokenUsage>,
        duration_ms: u64,
    },

    ToolExecutionStarted {
        turn_id: String,
        call_id: String,
        tool_name: String,
    },

    ToolExecutionCompleted {
        turn_id: String,
        call_id: String,
        tool_name: String,
        duration_ms: u64,
        is_error: bool,
    },

    /// Arguments were rejected; the handler did not run.
    ToolValidationFailed {
        turn_id: String,
        call_id: String,
        tool_name: String,
        errors: Vec<String>,
    },

    ToolNotFound {
        turn_id: String,
        call_id: String,
        tool_name: String,
        available_tools: Vec<String>,
    },

    TurnCompleted {
        turn_id: String,
        duration_ms: u64,
        tool_call_count: usize,
        /// Usage summed over every LLM call of the turn.
        usage: TokenUsage,
    },

    /// The turn aborted. Cancellation is reported with `critical: false`.
    TurnFailed {
        turn_id: String,
        message: String,
        critical: bool,
    },
}

impl TurnEvent {
    /// Snake-case discriminant, as serialized in the `type` field.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TurnStarted { .. } => "turn_started",
            Self::RequestStarted { .. } => "request_started",
            Self::ResponseReceived { .. } => "response_received",
            Self::ToolExecutionStarted { .. } => "tool_execution_started",
            Self::ToolExecutionCompleted { .. } => "tool_execution_completed",
            Self::ToolValidationFailed { .. } => "tool_validation_failed",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::TurnCompleted { .. } => "turn_completed",
            Self::TurnFailed { .. } => "turn_failed",
        }
    }

    #[must_use]
    pub fn turn_id(&self) -> &str {
        match self {
            Self::TurnStarted { turn_id, .. }
            | Self::RequestStarted { turn_id, .. }
            | Self::ResponseReceived { turn_id, .. }
            | Self::ToolExecutionStarted { turn_id, .. }
            | Self::ToolExecutionCompleted { turn_id, .. }
            | Self::ToolValidationFailed { turn_id, .. }
            | Self::ToolNotFound { turn_id, .. }
            | Self::TurnCompleted { turn_id, .. }
            | Self::TurnFailed { turn_id, .. } => turn_id,
        }
    }
}

/// Monotonic sequence counter for event envelopes.
///
/// Each turn gets a fresh counter starting at 0. Clones share state.
#[derive(Clone, Debug)]
pub struct SequenceCounter(Arc<AtomicU64>);

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    /// Get the next sequence number, incrementing the counter.
    #[must_use]
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// A [`TurnEvent`] plus delivery metadata.
///
/// The event is flattened in JSON so `event_id`, `sequence`, `timestamp`
/// and the event's `type` all sit at the same level.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_id: uuid::Uuid,
    /// Position within the turn, starting at 0.
    pub sequence: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(flatten)]
    pub event: TurnEvent,
}

impl EventEnvelope {
    #[must_use]
    pub fn wrap(event: TurnEvent, seq: &SequenceCounter) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4(),
            sequence: seq.next(),
            timestamp: OffsetDateTime::now_utc(),
            event,
        }
    }
}

/// Receives turn events.
///
/// Called synchronously on the orchestrating task, so implementations must
/// return quickly. Hand work off to a channel (see [`ChannelObserver`]).
pub trait TurnObserver: Send + Sync {
    fn on_event(&self, envelope: &EventEnvelope);
}

/// Ordered list of observers.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Vec<Arc<dyn TurnObserver>>,
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn TurnObserver>) -> &mut Self {
        self.observers.push(observer);
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Wrap `event` and deliver it to every observer in subscription order.
    ///
    /// A panicking observer is logged and skipped; later observers still see
    /// the event.
    pub fn publish(&self, event: TurnEvent, seq: &SequenceCounter) -> EventEnvelope {
        let envelope = EventEnvelope::wrap(event, seq);
        for observer in &self.observers {
            let delivered =
                std::panic::catch_unwind(AssertUnwindSafe(|| observer.on_event(&envelope)));
            if delivered.is_err() {
                tracing::warn!(
                    event = envelope.event.kind(),
                    sequence = envelope.sequence,
                    "Observer panicked while handling event"
                );
            }
        }
        envelope
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Forwards events into a bounded channel.
///
/// Uses `try_send`: when the channel is full or closed the event is dropped
/// so a slow consumer never stalls a turn.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    tx: mpsc::Sender<EventEnvelope>,
}

impl ChannelObserver {
    #[must_use]
    pub const fn new(tx: mpsc::Sender<EventEnvelope>) -> Self {
        Self { tx }
    }

    /// Create an observer together with its receiving end.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<EventEnvelope>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

impl TurnObserver for ChannelObserver {
    fn on_event(&self, envelope: &EventEnvelope) {
        if let Err(e) = self.tx.try_send(envelope.clone()) {
            tracing::debug!(error = %e, "Dropping turn event");
        }
    }
}

/// Debug logging for all events.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingObserver;

impl TurnObserver for LoggingObserver {
    fn on_event(&self, envelope: &EventEnvelope) {
        tracing::debug!(
            sequence = envelope.sequence,
            turn_id = envelope.event.turn_id(),
            event = ?envelope.event,
            "Turn event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    fn sample_event() -> TurnEvent {
        TurnEvent::TurnStarted {
            turn_id: "turn_1".to_string(),
            conversation_id: "conv_1".to_string(),
            input: "hello".to_string(),
        }
    }

    #[test]
    fn sequence_counter_increments_monotonically() {
        let seq = SequenceCounter::new();
        assert_eq!(seq.next(), 0);
        assert_eq!(seq.next(), 1);
        assert_eq!(seq.next(), 2);
    }

    #[test]
    fn sequence_counter_clones_share_state() {
        let seq = SequenceCounter::new();
        let clone = seq.clone();
        assert_eq!(seq.next(), 0);
        assert_eq!(clone.next(), 1);
    }

    #[tokio::test]
    async fn sequence_counter_unique_across_concurrent_tasks() {
        let seq = SequenceCounter::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let seq = seq.clone();
            handles.push(tokio::spawn(async move {
                (0..50).map(|_| seq.next()).collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for n in handle.await.expect("task") {
                assert!(seen.insert(n), "duplicate sequence {n}");
            }
        }
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn envelope_serializes_flat_json() {
        let seq = SequenceCounter::new();
        let envelope = EventEnvelope::wrap(sample_event(), &seq);
        let json = serde_json::to_value(&envelope).expect("serialize");

        assert!(json.get("event_id").is_some());
        assert_eq!(json.get("sequence").and_then(serde_json::Value::as_u64), Some(0));
        assert_eq!(
            json.get("type").and_then(|v| v.as_str()),
            Some("turn_started")
        );
        assert_eq!(json.get("turn_id").and_then(|v| v.as_str()), Some("turn_1"));
        assert!(json.get("event").is_none());

        let ts = json.get("timestamp").and_then(|v| v.as_str()).expect("timestamp");
        OffsetDateTime::parse(ts, &time::format_description::well_known::Rfc3339)
            .expect("timestamp should be valid RFC 3339");
    }

    #[test]
    fn envelope_roundtrip_serde() {
        let seq = SequenceCounter::new();
        let original = EventEnvelope::wrap(sample_event(), &seq);

        let json = serde_json::to_string(&original).expect("serialize");
        let restored: EventEnvelope = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(restored.event_id, original.event_id);
        assert_eq!(restored.event, original.event);
    }

    #[test]
    fn kind_matches_serialized_type() {
        let event = TurnEvent::ToolNotFound {
            turn_id: "t".to_string(),
            call_id: "c".to_string(),
            tool_name: "missing".to_string(),
            available_tools: vec!["time".to_string()],
        };
        let json = serde_json::to_value(&event).expect("serialize");
        assert_eq!(json["type"], event.kind());
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<u64>>);

    impl TurnObserver for Recorder {
        fn on_event(&self, envelope: &EventEnvelope) {
            self.0.lock().push(envelope.sequence);
        }
    }

    struct Panicker;

    impl TurnObserver for Panicker {
        fn on_event(&self, _envelope: &EventEnvelope) {
            panic!("observer bug");
        }
    }

    #[test]
    fn bus_delivers_in_order_and_survives_panics() {
        let recorder = Arc::new(Recorder::default());
        let mut bus = EventBus::new();
        bus.subscribe(Arc::new(Panicker));
        bus.subscribe(recorder.clone());

        let seq = SequenceCounter::new();
        bus.publish(sample_event(), &seq);
        bus.publish(sample_event(), &seq);

        assert_eq!(*recorder.0.lock(), vec![0, 1]);
    }

    #[tokio::test]
    async fn channel_observer_drops_when_full() {
        let (observer, mut rx) = ChannelObserver::channel(1);
        let seq = SequenceCounter::new();

        observer.on_event(&EventEnvelope::wrap(sample_event(), &seq));
        observer.on_event(&EventEnvelope::wrap(sample_event(), &seq));

        let first = rx.recv().await.expect("first event");
        assert_eq!(first.sequence, 0);
        assert!(rx.try_recv().is_err());
    }
}
