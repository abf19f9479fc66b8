//! # Event subscribers: the observer extension point.
//!
//! Channels publish every state transition, latched error, blocked step, and
//! timer fire to their [`Bus`](crate::events::Bus). This module provides the
//! [`Subscribe`] trait and the [`SubscriberSet`] fan-out that delivers bus
//! events to registered observers without ever blocking the channel.
//!
//! Observer notification is strictly optional: channel correctness never
//! depends on any subscriber being attached or keeping up.
//!
//! ## Event flow
//! ```text
//!   MediaChannel ── publish(Event) ──► Bus ──► listener ──► SubscriberSet::emit(&Event)
//!                                                       ┌─────────┬─────────┐
//!                                                       ▼         ▼         ▼
//!                                                [queue S1] [queue S2] ... [queue SN]
//!                                                       │         │         │
//!                                                worker S1  worker S2 ... worker SN
//!                                                       │         │         │
//!                                               sub.on_event(&Event) (per subscriber)
//! ```

mod set;
mod subscribe;

#[cfg(feature = "logging")]
mod log;

pub use set::SubscriberSet;
pub use subscribe::Subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
