//! Error types used by the stepvisor runtime.
//!
//! Construction is the only fallible boundary of the crate: every other
//! operation reports trouble through the channel's error latch and the event
//! bus instead of returning errors (a sub-task that cannot proceed is a
//! "blocked" outcome, not a failure).

use thiserror::Error;

/// # Errors raised when building a media channel.
///
/// These represent invalid or missing mandatory dependencies detected at
/// construction time. A channel that fails to build is never returned to the
/// caller.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChannelError {
    /// The owning sender-channel reference was not supplied.
    ///
    /// A channel cannot exist without its owner; supply one via
    /// [`ChannelBuilder::owner`](crate::ChannelBuilder::owner).
    #[error("channel owner reference is required")]
    MissingOwner,
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use stepvisor::ChannelError;
    ///
    /// assert_eq!(ChannelError::MissingOwner.as_label(), "channel_missing_owner");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::MissingOwner => "channel_missing_owner",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            ChannelError::MissingOwner => {
                "cannot build a media channel without an owning sender channel".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_label_is_stable() {
        assert_eq!(ChannelError::MissingOwner.as_label(), "channel_missing_owner");
    }

    #[test]
    fn test_display_mentions_owner() {
        let msg = ChannelError::MissingOwner.to_string();
        assert!(msg.contains("owner"));
    }
}
