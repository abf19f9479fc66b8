//! # Lifecycle states of a media channel.
//!
//! A channel walks a monotonic path through four states:
//!
//! ```text
//! Pending ──► Ready ──► ShuttingDown ──► Shutdown
//!    │          │                           ▲
//!    │          └───────────────────────────┤
//!    └──────────────────────────────────────┘
//! ```
//!
//! Intermediate states may be skipped (a pending channel that is cancelled
//! with no graceful work outstanding goes straight to `Shutdown`), but the
//! walk never reverses. `Shutdown` is terminal: no sub-task runs and no
//! further state-changing side effects occur once it is reached.

/// Lifecycle state of a [`MediaChannel`](crate::MediaChannel).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelState {
    /// Construction finished, but not all setup steps are satisfied yet.
    Pending,
    /// All setup steps satisfied; the channel is fully operational.
    Ready,
    /// Shutdown initiated; graceful work is being unwound.
    ShuttingDown,
    /// Fully torn down. Terminal and inert.
    Shutdown,
}

impl ChannelState {
    /// Returns the display name of the state.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelState::Pending => "pending",
            ChannelState::Ready => "ready",
            ChannelState::ShuttingDown => "shutting down",
            ChannelState::Shutdown => "shutdown",
        }
    }

    /// True while a graceful shutdown is in progress.
    pub fn is_shutting_down(&self) -> bool {
        matches!(self, ChannelState::ShuttingDown)
    }

    /// True once the channel is fully torn down.
    pub fn is_shutdown(&self) -> bool {
        matches!(self, ChannelState::Shutdown)
    }

    /// Position along the monotonic walk.
    fn rank(&self) -> u8 {
        match self {
            ChannelState::Pending => 0,
            ChannelState::Ready => 1,
            ChannelState::ShuttingDown => 2,
            ChannelState::Shutdown => 3,
        }
    }

    /// Whether moving to `next` keeps the walk monotonic.
    ///
    /// Skipping forward over intermediate states is allowed; moving backward
    /// or re-entering the current state is not.
    pub fn can_transition_to(&self, next: ChannelState) -> bool {
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
