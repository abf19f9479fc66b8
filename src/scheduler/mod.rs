//! Scheduler adapter: wake coalescing and channel timers.
//!
//! Decouples "something happened that might unblock progress" from "a step
//! pass runs now". Both wake requests and timer fires funnel into the same
//! locked step entry on the channel, so every state-affecting path is
//! serialized by the one channel lock.

pub(crate) mod timer;
pub(crate) mod waker;

pub use timer::TimerId;
