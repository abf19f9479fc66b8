//! # Setup steps: three-outcome sub-task evaluation.
//!
//! A channel reaches [`Ready`](crate::ChannelState::Ready) by walking an
//! ordered list of [`SetupStep`]s. Each evaluation reports one of three
//! outcomes:
//!
//! - [`StepOutcome::Complete`] - the step already ran; skip it.
//! - [`StepOutcome::Blocked`] - external state is not there yet; abort the
//!   whole pass and retry on the next wake or timer fire.
//! - [`StepOutcome::Performed`] - the step did its work just now; continue.
//! - [`StepOutcome::Failed`] - the step failed terminally; the channel
//!   latches the error itself and aborts the pass.
//!
//! Representing "not ready yet" as abort-and-retry rather than blocking the
//! calling thread is what lets every operation share the single channel lock
//! without long lock-held waits.
//!
//! ## Rules
//! - `evaluate` runs **under the channel lock**: never block, never await,
//!   and never call back into the channel (`set_error`, `cancel`, `state`,
//!   `snapshot`, ...) - the lock is not recursive and re-entry deadlocks.
//!   Terminal failures are reported through [`StepOutcome::Failed`]; the
//!   channel latches them on the step's behalf.
//! - Steps must be idempotent across retries (a blocked pass re-evaluates
//!   earlier steps, which then report `Complete`).
//! - The concrete step set is supplied by the integrator at build time; an
//!   empty list is legal and means the channel is immediately ready.
//!
//! ## Example
//! ```
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use stepvisor::{SetupStep, StepContext, StepOutcome};
//!
//! struct AllocateEncoder {
//!     done: AtomicBool,
//! }
//!
//! impl SetupStep for AllocateEncoder {
//!     fn name(&self) -> &str {
//!         "allocate-encoder"
//!     }
//!
//!     fn evaluate(&self, _cx: &StepContext<'_>) -> StepOutcome {
//!         if self.done.swap(true, Ordering::AcqRel) {
//!             StepOutcome::Complete
//!         } else {
//!             StepOutcome::Performed
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use crate::collab::MediaParameters;

/// Result of evaluating one setup step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// The step already completed on an earlier pass; nothing to do.
    Complete,
    /// The step cannot proceed given current external state; the whole pass
    /// aborts and is retried on the next wake/timer.
    Blocked,
    /// The step performed its work during this evaluation.
    Performed,
    /// The step failed terminally. The channel latches `(code, reason)`
    /// through its first-error-wins latch (an empty reason defaults from
    /// the code) and aborts the pass. This is the only failure channel
    /// available under the held lock; never call
    /// [`set_error`](crate::MediaChannel::set_error) from `evaluate`.
    Failed {
        /// Numeric error code (HTTP-style by convention).
        code: u16,
        /// Human-readable reason; may be empty.
        reason: Arc<str>,
    },
}

/// Read-only view of the channel handed to each step evaluation.
pub struct StepContext<'a> {
    channel: u64,
    params: &'a MediaParameters,
}

impl<'a> StepContext<'a> {
    pub(crate) fn new(channel: u64, params: &'a MediaParameters) -> Self {
        Self { channel, params }
    }

    /// Id of the channel being stepped.
    pub fn channel_id(&self) -> u64 {
        self.channel
    }

    /// The channel's immutable media parameters.
    pub fn params(&self) -> &MediaParameters {
        self.params
    }
}

/// One unit of setup work evaluated during a step pass.
///
/// Evaluations happen under the channel lock and must return promptly. A
/// step that depends on slow external work should kick it off elsewhere,
/// report [`StepOutcome::Blocked`], and arrange for a
/// [`wake`](crate::MediaChannel::wake) once the work lands.
///
/// The channel lock is not recursive: `evaluate` must not call back into
/// the channel it belongs to. `wake` is the one exception (it only touches
/// the notifier, never the lock). Terminal failures are reported as
/// [`StepOutcome::Failed`] and latched by the channel itself.
pub trait SetupStep: Send + Sync + 'static {
    /// Returns a stable, human-readable step name (used in events).
    fn name(&self) -> &str;

    /// Evaluates the step against current external state.
    fn evaluate(&self, cx: &StepContext<'_>) -> StepOutcome;
}
