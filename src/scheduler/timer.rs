//! # Channel timers: periodic step retries.
//!
//! Each timer is a spawned interval task guarded by a child
//! [`CancellationToken`]. On every fire it re-enters the channel through the
//! same locked path a wake uses ([`MediaChannel::on_timer`]), so timer
//! deliveries are totally ordered with wakes and direct calls.
//!
//! Cancellation on teardown is mandatory: the registry's parent token is
//! cancelled during the channel's final cleanup, so no timer can ever fire
//! into a disposed channel. Timer tasks additionally hold only a `Weak`
//! back-reference and stop on their own once the channel is gone.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::channel::MediaChannel;

/// Process-wide counter for timer identities.
static TIMER_SEQ: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one channel timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    fn next() -> Self {
        Self(TIMER_SEQ.fetch_add(1, Ordering::Relaxed))
    }

    /// Numeric value, for logs and events.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TimerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Registry of the interval tasks attached to one channel.
pub(crate) struct TimerRegistry {
    parent: CancellationToken,
    active: Mutex<HashMap<TimerId, CancellationToken>>,
}

impl TimerRegistry {
    /// Creates an empty registry whose timers all stop when `parent` is
    /// cancelled.
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            active: Mutex::new(HashMap::new()),
        }
    }

    fn locked(&self) -> std::sync::MutexGuard<'_, HashMap<TimerId, CancellationToken>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a periodic timer delivering to `channel` every `period`.
    ///
    /// The first fire happens one full `period` after scheduling. Fires that
    /// queue up behind a slow step pass are skipped, not bunched.
    pub fn schedule(&self, channel: Weak<MediaChannel>, period: Duration) -> TimerId {
        let id = TimerId::next();
        let token = self.parent.child_token();
        self.locked().insert(id, token.clone());

        tokio::spawn(async move {
            let mut tick = time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // interval's first tick completes immediately; swallow it so the
            // first delivery lands after one full period.
            tick.tick().await;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        let Some(ch) = channel.upgrade() else { break };
                        ch.on_timer(id);
                    }
                }
            }
        });

        id
    }

    /// Cancels one timer. Returns `false` if the id was unknown.
    pub fn cancel(&self, id: TimerId) -> bool {
        match self.locked().remove(&id) {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancels every attached timer. Called during final cleanup.
    pub fn cancel_all(&self) {
        for (_, token) in self.locked().drain() {
            token.cancel();
        }
    }

    /// Number of timers currently attached.
    pub fn active_count(&self) -> usize {
        self.locked().len()
    }
}
