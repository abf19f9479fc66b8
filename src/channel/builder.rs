//! # Channel construction.
//!
//! [`ChannelBuilder`] wires a [`MediaChannel`] together with its
//! collaborators, setup steps, and subscribers, then spawns the background
//! machinery (driver task, optional retry timer, subscriber fan-out) and
//! issues the initial wake. Construction therefore must happen inside a
//! Tokio runtime.

use std::sync::{Arc, Weak};

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::channel::config::ChannelConfig;
use crate::channel::core::{ChannelParts, MediaChannel};
use crate::channel::step::SetupStep;
use crate::collab::{ChannelOwner, FrameTransport, MediaParameters, MediaTrack, ReportSink};
use crate::error::ChannelError;
use crate::events::Bus;
use crate::scheduler::waker::spawn_driver;
use crate::subscribers::{Subscribe, SubscriberSet};

/// Builder for [`MediaChannel`].
///
/// ```no_run
/// use std::sync::Arc;
/// use stepvisor::{ChannelBuilder, ChannelOwner, MediaParameters};
///
/// struct Owner;
/// impl ChannelOwner for Owner {
///     fn id(&self) -> u64 { 1 }
/// }
///
/// # async fn demo() -> Result<(), stepvisor::ChannelError> {
/// let channel = ChannelBuilder::new(MediaParameters::default())
///     .owner(Arc::new(Owner))
///     .build()?;
/// channel.wake();
/// # Ok(())
/// # }
/// ```
pub struct ChannelBuilder {
    params: MediaParameters,
    owner: Option<Weak<dyn ChannelOwner>>,
    track: Option<Weak<dyn MediaTrack>>,
    transport: Option<Weak<dyn FrameTransport>>,
    report_sink: Option<Arc<dyn ReportSink>>,
    steps: Vec<Box<dyn SetupStep>>,
    subscribers: Vec<Arc<dyn Subscribe>>,
    config: ChannelConfig,
}

impl ChannelBuilder {
    /// Starts a builder for a channel carrying the given media parameters.
    pub fn new(params: MediaParameters) -> Self {
        Self {
            params,
            owner: None,
            track: None,
            transport: None,
            report_sink: None,
            steps: Vec::new(),
            subscribers: Vec::new(),
            config: ChannelConfig::default(),
        }
    }

    /// Attaches the owning component. Mandatory; the channel holds it
    /// weakly and never extends its lifetime.
    pub fn owner(mut self, owner: Arc<dyn ChannelOwner>) -> Self {
        self.owner = Some(Arc::downgrade(&owner));
        self
    }

    /// Attaches the media source collaborator (held weakly).
    pub fn track(mut self, track: Arc<dyn MediaTrack>) -> Self {
        self.track = Some(Arc::downgrade(&track));
        self
    }

    /// Attaches the outbound frame transport (held weakly).
    pub fn transport(mut self, transport: Arc<dyn FrameTransport>) -> Self {
        self.transport = Some(Arc::downgrade(&transport));
        self
    }

    /// Attaches the inbound report consumer.
    pub fn report_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.report_sink = Some(sink);
        self
    }

    /// Appends one setup step. Steps run in insertion order on every pass.
    pub fn step<S: SetupStep>(mut self, step: S) -> Self {
        self.steps.push(Box::new(step));
        self
    }

    /// Appends a batch of setup steps.
    pub fn steps(mut self, steps: Vec<Box<dyn SetupStep>>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Registers a lifecycle event subscriber.
    pub fn subscriber(mut self, sub: Arc<dyn Subscribe>) -> Self {
        self.subscribers.push(sub);
        self
    }

    /// Registers a batch of lifecycle event subscribers.
    pub fn subscribers(mut self, subs: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers.extend(subs);
        self
    }

    /// Overrides tuning knobs.
    pub fn config(mut self, config: ChannelConfig) -> Self {
        self.config = config;
        self
    }

    /// Assembles the channel and starts its background machinery.
    ///
    /// Spawns the driver task, the subscriber fan-out (when subscribers are
    /// registered), and the optional retry timer, then issues the initial
    /// wake so the first step pass runs without further prompting.
    ///
    /// # Errors
    ///
    /// [`ChannelError::MissingOwner`] when no owner was attached.
    pub fn build(self) -> Result<Arc<MediaChannel>, ChannelError> {
        let owner = self.owner.ok_or(ChannelError::MissingOwner)?;

        let bus = Bus::new(self.config.bus_capacity_clamped());
        let wake = Arc::new(Notify::new());
        let teardown = CancellationToken::new();

        let parts = ChannelParts {
            owner,
            track: self.track,
            transport: self.transport,
            report_sink: self.report_sink,
            params: self.params,
            steps: self.steps,
            bus: bus.clone(),
            wake: wake.clone(),
            teardown: teardown.clone(),
        };
        let channel = Arc::new_cyclic(|weak| MediaChannel::from_parts(weak.clone(), parts));

        if !self.subscribers.is_empty() {
            spawn_fanout(self.subscribers, bus, teardown.clone());
        }
        let _ = spawn_driver(Arc::downgrade(&channel), wake, teardown);

        if let Some(period) = self.config.retry_interval {
            let _ = channel.schedule_timer(period);
        }
        channel.wake();
        Ok(channel)
    }
}

/// Bridges the broadcast bus into the per-subscriber queues. The task runs
/// until channel teardown, then drains whatever the bus already buffered so
/// subscribers see the terminal transition.
fn spawn_fanout(subs: Vec<Arc<dyn Subscribe>>, bus: Bus, teardown: CancellationToken) {
    let mut rx = bus.subscribe();
    let set = SubscriberSet::new(subs, bus);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = teardown.cancelled() => break,
                recv = rx.recv() => match recv {
                    Ok(event) => set.emit(&event),
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        loop {
            match rx.try_recv() {
                Ok(event) => set.emit(&event),
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        set.shutdown().await;
    });
}
