//! Structured, read-only view of a channel's internal state.

use crate::channel::latch::LatchedError;
use crate::channel::state::ChannelState;

/// Diagnostic snapshot of a [`MediaChannel`](crate::MediaChannel).
///
/// Taken under the channel lock in one shot, so all fields are mutually
/// consistent. Safe to take at any time, including mid-shutdown; taking a
/// snapshot has no side effects.
#[derive(Debug, Clone)]
pub struct ChannelSnapshot {
    /// Immutable channel identity.
    pub id: u64,
    /// Lifecycle state at snapshot time.
    pub state: ChannelState,
    /// Whether the graceful-shutdown self-reference is currently held.
    pub graceful_shutdown: bool,
    /// Latched first error, if any.
    pub error: Option<LatchedError>,
    /// Identity of the owning collaborator, if its weak reference still
    /// resolves. `None` means "unknown", not a fault.
    pub owner: Option<u64>,
    /// Outbound operations still in flight.
    pub in_flight: usize,
    /// Timers currently attached.
    pub timers: usize,
}

impl std::fmt::Display for ChannelSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "channel={} state={} graceful={} in_flight={} timers={}",
            self.id,
            self.state.as_str(),
            self.graceful_shutdown,
            self.in_flight,
            self.timers
        )?;
        match &self.error {
            Some(e) => write!(f, " error={} reason={:?}", e.code, &*e.reason)?,
            None => write!(f, " error=none")?,
        }
        match self.owner {
            Some(id) => write!(f, " owner={id}"),
            None => write!(f, " owner=unknown"),
        }
    }
}
