//! # Lifecycle events emitted by media channels.
//!
//! [`EventKind`] classifies events across three categories:
//! - **Lifecycle events**: state transitions and shutdown progress.
//! - **Step/scheduler events**: blocked or performed setup steps, timer fires.
//! - **Error events**: latched or ignored error reports.
//!
//! The [`Event`] struct carries optional metadata (channel id, states, error
//! code, step name, timer id) set per kind.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases
//! monotonically across all channels in the process. Use `seq` to restore
//! the exact order when events are observed out of order.
//!
//! ## Example
//! ```rust
//! use stepvisor::{ChannelState, Event, EventKind};
//!
//! let ev = Event::new(EventKind::StateChanged)
//!     .with_channel(3)
//!     .with_prev(ChannelState::Pending)
//!     .with_state(ChannelState::Ready);
//!
//! assert_eq!(ev.kind, EventKind::StateChanged);
//! assert_eq!(ev.channel, Some(3));
//! assert_eq!(ev.state, Some(ChannelState::Ready));
//! ```

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;
use std::time::SystemTime;

use crate::channel::ChannelState;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of channel lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Lifecycle events ===
    /// The channel moved to a new state.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `prev`: previous state
    /// - `state`: new state
    StateChanged,

    /// Graceful shutdown was initiated (first `cancel` call).
    ///
    /// Sets:
    /// - `channel`: channel id
    ShutdownRequested,

    // === Step/scheduler events ===
    /// A setup step could not proceed; the pass aborted and will retry.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `step`: name of the blocked step
    StepBlocked,

    /// A setup step performed its work during this pass.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `step`: name of the performed step
    StepPerformed,

    /// A channel timer fired and drove a step pass.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `timer`: timer id
    TimerFired,

    // === Error events ===
    /// An error was latched as the channel's first failure.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `code`: numeric error code
    /// - `reason`: latched reason text
    ErrorLatched,

    /// An error report arrived after one was already latched; observed only.
    ///
    /// Sets:
    /// - `channel`: channel id
    /// - `code`: offered error code
    /// - `reason`: offered reason text
    ErrorIgnored,

    // === Subscriber plumbing ===
    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `step`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `step`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,
}

/// Channel lifecycle event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Debug, Clone)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Id of the channel this event concerns, if applicable.
    pub channel: Option<u64>,
    /// New state (for `StateChanged`).
    pub state: Option<ChannelState>,
    /// Previous state (for `StateChanged`).
    pub prev: Option<ChannelState>,
    /// Numeric error code (for error events).
    pub code: Option<u16>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Step or subscriber name, if applicable.
    pub step: Option<Arc<str>>,
    /// Timer id (for `TimerFired`).
    pub timer: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next
    /// sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            channel: None,
            state: None,
            prev: None,
            code: None,
            reason: None,
            step: None,
            timer: None,
        }
    }

    /// Attaches the channel id.
    #[inline]
    pub fn with_channel(mut self, id: u64) -> Self {
        self.channel = Some(id);
        self
    }

    /// Attaches the new state.
    #[inline]
    pub fn with_state(mut self, state: ChannelState) -> Self {
        self.state = Some(state);
        self
    }

    /// Attaches the previous state.
    #[inline]
    pub fn with_prev(mut self, state: ChannelState) -> Self {
        self.prev = Some(state);
        self
    }

    /// Attaches a numeric error code.
    #[inline]
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches a step or subscriber name.
    #[inline]
    pub fn with_step(mut self, step: impl Into<Arc<str>>) -> Self {
        self.step = Some(step.into());
        self
    }

    /// Attaches a timer id.
    #[inline]
    pub fn with_timer(mut self, timer: u64) -> Self {
        self.timer = Some(timer);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_step(subscriber)
            .with_reason(reason)
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_step(subscriber)
            .with_reason(info)
    }

    /// Whether this event reports subscriber plumbing trouble rather than
    /// channel lifecycle activity.
    #[inline]
    pub fn is_subscriber_noise(&self) -> bool {
        matches!(
            self.kind,
            EventKind::SubscriberOverflow | EventKind::SubscriberPanicked
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seq_strictly_increases() {
        let a = Event::new(EventKind::StateChanged);
        let b = Event::new(EventKind::StateChanged);
        let c = Event::new(EventKind::TimerFired);
        assert!(a.seq < b.seq);
        assert!(b.seq < c.seq);
    }

    #[test]
    fn test_builders_set_fields() {
        let ev = Event::new(EventKind::ErrorLatched)
            .with_channel(9)
            .with_code(404)
            .with_reason("stream gone");
        assert_eq!(ev.channel, Some(9));
        assert_eq!(ev.code, Some(404));
        assert_eq!(ev.reason.as_deref(), Some("stream gone"));
        assert_eq!(ev.state, None);
        assert_eq!(ev.timer, None);
    }

    #[test]
    fn test_subscriber_noise_classification() {
        assert!(Event::subscriber_overflow("log", "full").is_subscriber_noise());
        assert!(Event::subscriber_panicked("log", "boom".into()).is_subscriber_noise());
        assert!(!Event::new(EventKind::StateChanged).is_subscriber_noise());
    }
}
