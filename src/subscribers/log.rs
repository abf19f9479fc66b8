//! # Simple logging subscriber for debugging and demos.
//!
//! [`LogWriter`] prints events to stdout in a human-readable format.
//! This is primarily useful for development, debugging, and examples.
//!
//! ## Output format
//! ```text
//! [state] channel=3 pending -> ready
//! [shutdown-requested] channel=3
//! [step-blocked] channel=3 step=allocate-encoder
//! [timer] channel=3 id=1
//! [error] channel=3 code=404 reason="Not Found"
//! [error-ignored] channel=3 code=500 reason="later failure"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Subscribe;

/// Simple stdout logging subscriber.
///
/// Enabled via the `logging` feature. Prints human-readable event
/// descriptions to stdout for debugging and demonstration purposes.
///
/// Not intended for production use - implement a custom [`Subscribe`] for
/// structured logging or metrics collection.
#[derive(Default)]
pub struct LogWriter;

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let channel = e.channel.unwrap_or(0);
        match e.kind {
            EventKind::StateChanged => {
                let prev = e.prev.map(|s| s.as_str()).unwrap_or("?");
                let next = e.state.map(|s| s.as_str()).unwrap_or("?");
                println!("[state] channel={channel} {prev} -> {next}");
            }
            EventKind::ShutdownRequested => {
                println!("[shutdown-requested] channel={channel}");
            }
            EventKind::StepBlocked => {
                println!(
                    "[step-blocked] channel={channel} step={:?}",
                    e.step.as_deref().unwrap_or("?")
                );
            }
            EventKind::StepPerformed => {
                println!(
                    "[step-performed] channel={channel} step={:?}",
                    e.step.as_deref().unwrap_or("?")
                );
            }
            EventKind::TimerFired => {
                println!("[timer] channel={channel} id={:?}", e.timer);
            }
            EventKind::ErrorLatched => {
                println!(
                    "[error] channel={channel} code={:?} reason={:?}",
                    e.code,
                    e.reason.as_deref()
                );
            }
            EventKind::ErrorIgnored => {
                println!(
                    "[error-ignored] channel={channel} code={:?} reason={:?}",
                    e.code,
                    e.reason.as_deref()
                );
            }
            EventKind::SubscriberOverflow => {
                println!(
                    "[subscriber-overflow] name={:?} reason={:?}",
                    e.step.as_deref(),
                    e.reason.as_deref()
                );
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] name={:?} reason={:?}",
                    e.step.as_deref(),
                    e.reason.as_deref()
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
