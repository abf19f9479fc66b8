//! Runtime events and the broadcast bus that carries them.

mod base;
mod bus;

pub use base::{Event, EventKind};
pub use bus::Bus;
