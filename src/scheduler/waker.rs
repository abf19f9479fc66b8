//! # Driver task: coalesced wake delivery.
//!
//! Every channel has one driver task. Collaborators and internal completions
//! call [`MediaChannel::wake`](crate::MediaChannel::wake), which notifies the
//! driver; the driver takes the channel lock and runs one step pass.
//!
//! ## Wake contract
//! - Multiple wakes before the pass runs collapse into a single pass.
//! - A wake requested **while** a pass runs is not lost: [`tokio::sync::Notify`]
//!   stores a permit, so at least one more pass follows the current one. The
//!   condition that triggered the wake may have changed mid-pass, and the
//!   extra pass re-checks it.
//!
//! The driver holds only a `Weak` back-reference; it never keeps the channel
//! alive and exits as soon as the channel is gone or teardown is signalled.

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::channel::MediaChannel;

/// Spawns the driver loop for one channel.
pub(crate) fn spawn_driver(
    channel: Weak<MediaChannel>,
    wake: Arc<Notify>,
    teardown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = teardown.cancelled() => break,
                _ = wake.notified() => {
                    let Some(ch) = channel.upgrade() else { break };
                    ch.drive_step();
                }
            }
        }
    })
}
