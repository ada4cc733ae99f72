// Playback capability surface and the delegating adapter.
//
// Every protocol-specific player implements [`Player`]; callers that must
// swap the concrete implementation at runtime (e.g. after protocol sniffing)
// wrap it in [`DelegatingPlayer`] and attach the chosen delegate.

mod base;
mod delegating;

pub use base::{
    EventCallback, PlayResult, Player, PlayerError, ResumeCallback, SeekTarget, SockInfo, Track,
    TrackType,
};
pub use delegating::DelegatingPlayer;
