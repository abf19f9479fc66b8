//! Immutable media parameter set handed to a channel at construction.

use std::sync::Arc;

/// Parameters describing the media a channel carries.
///
/// Fixed for the lifetime of the channel; setup steps read them through
/// [`StepContext::params`](crate::StepContext::params). The channel core
/// never interprets these values, it only carries them to the steps and the
/// diagnostics snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaParameters {
    /// Codec/payload name (e.g. "VP8").
    pub codec: Arc<str>,
    /// RTP payload type.
    pub payload_type: u8,
    /// Synchronization source identifier.
    pub ssrc: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Maximum framerate.
    pub max_framerate: u32,
    /// Target bitrate in bits per second.
    pub target_bitrate_bps: u32,
}

impl Default for MediaParameters {
    /// Conventional realtime-video defaults: VP8, payload type 100,
    /// 800×600 at 30 fps, 2 Mbit/s target.
    fn default() -> Self {
        Self {
            codec: Arc::from("VP8"),
            payload_type: 100,
            ssrc: 1000,
            width: 800,
            height: 600,
            max_framerate: 30,
            target_bitrate_bps: 2_000_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_realtime_video() {
        let p = MediaParameters::default();
        assert_eq!(&*p.codec, "VP8");
        assert_eq!(p.payload_type, 100);
        assert_eq!(p.max_framerate, 30);
    }
}
