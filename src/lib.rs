//! # stepvisor
//!
//! **Stepvisor** is a lightweight lifecycle controller library for Rust.
//!
//! It drives pluggable async components (media channels, pipeline stages)
//! from "not ready" to "ready" to "torn down" under concurrent access: a
//! lock-serialized step loop, coalesced wakes, timer-driven retries, a
//! graceful shutdown guard, and a first-error-wins latch. The crate is
//! designed as a building block for higher-level media and pipeline stacks.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  SetupStep   │   │  SetupStep   │   │  SetupStep   │
//!     │ (precond #1) │   │ (precond #2) │   │ (precond #3) │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  MediaChannel (locked state machine)                              │
//! │  - ChannelState (Pending ─► Ready ─► ShuttingDown ─► Shutdown)    │
//! │  - ErrorLatch (first error wins)                                  │
//! │  - graceful self-reference + in-flight work counter               │
//! │  - Bus (broadcast events)                                         │
//! └──────┬──────────────────┬──────────────────┬───────────────┬──────┘
//!        │ weak             │ weak             │ weak          │
//!        ▼                  ▼                  ▼               ▼
//!   ChannelOwner       MediaTrack       FrameTransport     ReportSink
//!   (identity)         (source)         (outbound wire)    (inbound)
//!
//!  wake() ──► Notify ──► driver task ──┐
//!  TimerRegistry (periodic fires) ─────┼──► lock ──► step pass
//!  cancel()/set_error()/snapshot() ────┘
//!
//!  events ──► Bus ──► fan-out task ──► SubscriberSet (per-sub queues)
//! ```
//!
//! ### Step loop
//! ```text
//! wake / timer fire
//!   │
//!   ▼ (under the channel lock)
//! step():
//!   ├─ shutting down or shut down? ─► delegate to cancel(), return
//!   ├─ for each SetupStep, in order:
//!   │     ├─ Complete  ─► next step
//!   │     ├─ Performed ─► publish StepPerformed, next step
//!   │     ├─ Blocked   ─► publish StepBlocked, abort pass
//!   │     └─ Failed    ─► latch error (first wins), abort pass
//!   └─ all Complete/Performed ─► state = Ready
//!
//! cancel():
//!   ├─ already Shutdown? ─► return
//!   ├─ first call ─► publish ShutdownRequested, grab self-reference
//!   ├─ in-flight work? ─► state = ShuttingDown, wait for guards to drop
//!   └─ none ─► state = Shutdown, stop timers + driver, drop self-reference
//! ```
//!
//! ## Features
//! | Area               | Description                                                       | Key types / traits                       |
//! |--------------------|-------------------------------------------------------------------|------------------------------------------|
//! | **Lifecycle**      | Locked state machine with monotonic transitions.                  | [`MediaChannel`], [`ChannelState`]       |
//! | **Setup steps**    | Pluggable, re-runnable readiness preconditions.                   | [`SetupStep`], [`StepOutcome`]           |
//! | **Scheduling**     | Coalesced wakes and periodic retry timers.                        | [`MediaChannel::wake`], [`TimerId`]      |
//! | **Graceful work**  | RAII tracking of outbound work across shutdown.                   | [`InflightGuard`]                        |
//! | **Collaborators**  | Weakly-held neighbors the channel talks to.                       | [`ChannelOwner`], [`FrameTransport`]     |
//! | **Errors**         | First-error-wins latch plus typed build errors.                   | [`LatchedError`], [`ChannelError`]       |
//! | **Subscriber API** | Hook into lifecycle events (logging, metrics, custom).            | [`Subscribe`], [`Event`]                 |
//! | **Diagnostics**    | One-shot structured state snapshots.                              | [`ChannelSnapshot`]                      |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use stepvisor::{
//!     ChannelBuilder, ChannelOwner, ChannelState, MediaParameters, SetupStep,
//!     StepContext, StepOutcome,
//! };
//!
//! struct Sender;
//! impl ChannelOwner for Sender {
//!     fn id(&self) -> u64 { 1 }
//! }
//!
//! /// A precondition that is satisfied immediately.
//! struct AttachEncoder;
//! impl SetupStep for AttachEncoder {
//!     fn name(&self) -> &str { "attach_encoder" }
//!     fn evaluate(&self, _cx: &StepContext<'_>) -> StepOutcome {
//!         StepOutcome::Complete
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let owner = Arc::new(Sender);
//!     let channel = ChannelBuilder::new(MediaParameters::default())
//!         .owner(owner.clone())
//!         .step(AttachEncoder)
//!         .build()?;
//!
//!     let mut events = channel.subscribe();
//!     channel.wake();
//!     while channel.state() != ChannelState::Ready {
//!         let _ = events.recv().await?;
//!     }
//!
//!     channel.cancel();
//!     assert!(channel.is_shutdown());
//!     Ok(())
//! }
//! ```
mod channel;
mod collab;
mod error;
mod events;
mod scheduler;
mod subscribers;

// ---- Public re-exports ----

pub use channel::{
    ChannelBuilder, ChannelConfig, ChannelSnapshot, ChannelState, InflightGuard, LatchedError,
    MediaChannel, SetupStep, StepContext, StepOutcome,
};
pub use collab::{ChannelOwner, FrameTransport, MediaParameters, MediaTrack, ReportSink};
pub use error::ChannelError;
pub use events::{Bus, Event, EventKind};
pub use scheduler::TimerId;
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
