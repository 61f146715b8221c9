//! # Audio Module
//!
//! Per-guild playback core. Everything here is independent of Discord: the
//! voice connection, the transcoder and the notification sink are reached
//! through traits so the state machine can be driven by fakes in tests.
//!
//! ## Components
//!
//! ### [`session`] - Playback Session
//! - Queue, current track, connection and pipeline ownership for one guild
//! - Pause-aware timing through [`clock::PlaybackClock`]
//! - Filter changes restart the pipeline at the current offset
//!
//! ### [`registry`] - Session Registry
//! - Lazily creates one [`session::PlaybackSession`] per guild
//!
//! ### [`transcoder`] - Transcoder Gateway
//! - Resolves a source reference and spawns ffmpeg, returning a byte stream
//!   plus a cancel handle
//!
//! ### [`recommendation`] - Recommendation Flow
//! - Offers "more like this" choices when the queue runs out
//!
//! ### [`idle`] - Idle Teardown Timer
//! - Disconnects after a grace period once nothing is left to play
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Channels**: Stereo (2 channels)
//! - **Encoding**: Opus in an Ogg container, `OPUS_BITRATE` (96kbps default)

pub mod clock;
pub mod error;
pub mod filters;
pub mod idle;
pub mod notify;
pub mod queue;
pub mod recommendation;
pub mod registry;
pub mod session;
pub mod track;
pub mod transcoder;
pub mod transport;

#[cfg(test)]
pub mod testing;

pub use error::{ControlOutcome, PlayerError};
pub use registry::SessionRegistry;
pub use session::{Enqueued, PlaybackSession, SessionDeps, SessionSettings, SessionSnapshot, SessionStatus};
pub use track::{Requester, Track};
