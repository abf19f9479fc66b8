//! # Channel runtime configuration.
//!
//! [`ChannelConfig`] controls the ambient machinery around a channel: event
//! bus capacity and the optional periodic retry timer that re-polls blocked
//! setup steps.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use stepvisor::ChannelConfig;
//!
//! let mut cfg = ChannelConfig::default();
//! cfg.bus_capacity = 64;
//! cfg.retry_interval = Some(Duration::from_millis(250));
//! ```

use std::time::Duration;

/// Configuration for one media channel.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Capacity of the event bus channel.
    pub bus_capacity: usize,
    /// When set, a periodic timer is scheduled at build time that re-runs
    /// the step pass, so blocked steps are retried even without explicit
    /// wakes. `None` means progress relies on wakes alone.
    pub retry_interval: Option<Duration>,
}

impl Default for ChannelConfig {
    /// Provides a default configuration:
    /// - `bus_capacity = 256`
    /// - `retry_interval = None`
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            retry_interval: None,
        }
    }
}

impl ChannelConfig {
    /// Bus capacity clamped to a sane minimum.
    pub(crate) fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = ChannelConfig::default();
        assert_eq!(cfg.bus_capacity, 256);
        assert!(cfg.retry_interval.is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let cfg = ChannelConfig {
            bus_capacity: 0,
            retry_interval: None,
        };
        assert_eq!(cfg.bus_capacity_clamped(), 1);
    }
}
