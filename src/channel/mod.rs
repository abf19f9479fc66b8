//! # Channel: the lifecycle core.
//!
//! - [`core`] - the [`MediaChannel`] controller and its locked state machine.
//! - [`builder`] - [`ChannelBuilder`] construction and background wiring.
//! - [`state`] - the monotonic [`ChannelState`] walk.
//! - [`step`] - the [`SetupStep`] contract and [`StepOutcome`].
//! - [`latch`] - the first-error-wins [`LatchedError`] latch.
//! - [`snapshot`] - [`ChannelSnapshot`] diagnostics.
//! - [`config`] - [`ChannelConfig`] tuning knobs.

pub mod builder;
pub mod config;
pub(crate) mod core;
pub(crate) mod latch;
pub mod snapshot;
pub mod state;
pub mod step;

pub use builder::ChannelBuilder;
pub use config::ChannelConfig;
pub use self::core::{InflightGuard, MediaChannel};
pub use latch::LatchedError;
pub use snapshot::ChannelSnapshot;
pub use state::ChannelState;
pub use step::{SetupStep, StepContext, StepOutcome};
