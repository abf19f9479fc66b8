//! Collaborator contracts: the externally-owned dependencies a channel
//! talks to.
//!
//! The channel never owns its collaborators. It keeps weak back-references
//! and resolves them opportunistically; a collaborator that has been dropped
//! independently is a normal, handled case ("unknown"), never a fault. The
//! channel lock is never held across a collaborator call, so no cross-object
//! lock ordering can arise.

mod params;
mod traits;

pub use params::MediaParameters;
pub use traits::{ChannelOwner, FrameTransport, MediaTrack, ReportSink};
