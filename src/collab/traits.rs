//! Narrow trait seams for the channel's collaborators.
//!
//! All traits are object-safe and `Send + Sync` so handles can be shared
//! across the runtime. Media semantics (codec setup, RTP/RTCP parsing,
//! congestion control) live entirely behind these seams.

/// The owning parent of a channel (e.g. a sender channel).
///
/// Mandatory at construction; held as a weak back-reference afterwards. The
/// owner may be destroyed independently of the channel, in which case
/// diagnostics report it as unknown.
pub trait ChannelOwner: Send + Sync + 'static {
    /// Stable identity of the owner, used in diagnostics.
    fn id(&self) -> u64;
}

/// The media/track source feeding the channel.
pub trait MediaTrack: Send + Sync + 'static {
    /// Stable identity of the track, used in diagnostics.
    fn id(&self) -> u64;
}

/// Outbound transport seam for wire frames.
///
/// Both operations take a raw frame and report delivery success. The channel
/// gates them on its own lifecycle state before the transport ever sees the
/// frame: once shutdown has begun, nothing further is issued.
pub trait FrameTransport: Send + Sync + 'static {
    /// Sends a media frame. Returns `false` if delivery failed.
    fn send_media_frame(&self, frame: &[u8]) -> bool;

    /// Sends a control/report frame. Returns `false` if delivery failed.
    fn send_report_frame(&self, frame: &[u8]) -> bool;
}

/// Consumer for inbound protocol-control messages.
///
/// The channel does not interpret control packets itself; it forwards them
/// here after gating on lifecycle state. Returns whether the packet was
/// consumed.
pub trait ReportSink: Send + Sync + 'static {
    /// Handles one opaque control packet.
    fn handle_report(&self, packet: &[u8]) -> bool;
}
