//! Cadence - Playback Orchestration
//!
//! Drives a platform audio transport through a queue of tracks.
//!
//! This crate provides:
//! - Queue with original and shuffled order, repeat modes (Off, All, One)
//! - Single-writer dispatcher: every command and callback is serialized
//! - Asynchronous prepare with stale-completion detection
//! - Audio focus handling (pause, transient pause and resume, ducking)
//! - Cancellable volume fades
//! - Resume after restart (queue, modes and bookmark persisted)
//! - Sleep timer and periodic progress reports
//!
//! # Architecture
//!
//! `cadence-playback` does not decode or output audio and does not own a
//! track database. The host plugs those in through traits:
//! - [`AudioTransport`]: prepare/start/pause/seek/volume on the output primitive
//! - [`TrackCatalog`]: track lookup, favorites, recently played
//! - [`FocusService`] and [`WakeLease`]: platform resource arbitration
//! - [`KeyValueStore`]: durable storage for the resume snapshot
//! - [`PlaybackListener`]: notifications for UI and media-session layers
//!
//! [`Player`] owns a dispatcher thread. Commands return immediately; queries
//! are answered by the dispatcher thread in mailbox order.
//!
//! # Example
//!
//! ```rust,no_run
//! use cadence_playback::{
//!     AudioTransport, Collaborators, MemoryStore, Player, PlayerConfig, PrepareTicket, Result,
//!     Track, TrackCatalog, TrackId, TransportSink,
//! };
//! use std::sync::Arc;
//!
//! struct Output;
//!
//! impl AudioTransport for Output {
//!     fn attach(&self, _sink: TransportSink) {}
//!     fn prepare(&self, _track: &Track, _ticket: PrepareTicket) {
//!         // open the source, then call sink.prepared(ticket)
//!     }
//!     fn start(&self) -> Result<()> {
//!         Ok(())
//!     }
//!     fn pause(&self) {}
//!     fn seek(&self, _position_ms: u64) {}
//!     fn set_volume(&self, _level: f32) {}
//!     fn release(&self) {}
//!     fn position_ms(&self) -> u64 {
//!         0
//!     }
//!     fn is_playing(&self) -> bool {
//!         false
//!     }
//! }
//!
//! struct Library;
//!
//! impl TrackCatalog for Library {
//!     fn lookup_by_id(&self, _id: TrackId) -> Option<Track> {
//!         None
//!     }
//!     fn is_favorite(&self, _id: TrackId) -> bool {
//!         false
//!     }
//!     fn toggle_favorite(&mut self, _id: TrackId) {}
//!     fn record_recently_played(&mut self, _id: TrackId) {}
//! }
//!
//! # fn main() -> Result<()> {
//! let collaborators = Collaborators::new(Arc::new(Output), Library, MemoryStore::new());
//! let player = Player::start(PlayerConfig::load()?, collaborators)?;
//!
//! let tracks = vec![Track::new(1, "Intro"), Track::new(2, "Theme")];
//! player.load(tracks, "Album", 0, false, true)?;
//! player.cycle_repeat_mode()?;
//! player.next(true)?;
//!
//! player.shutdown()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dispatcher;
mod error;
pub mod events;
pub mod persistence;
pub mod platform;
mod player;
pub mod queue;
mod shuffle;
pub mod transport;
pub mod types;
mod volume;

// Public exports
pub use config::PlayerConfig;
pub use dispatcher::{Collaborators, Dispatcher};
pub use error::{ErrorCode, PlaybackError, Result};
pub use events::{
    ChannelListener, Event, EventSink, FocusSink, NullListener, PlaybackEvent, PlaybackListener,
    TransportSink,
};
pub use persistence::{KeyValueStore, MemoryStore, Snapshot};
pub use platform::{FocusService, NoWakeLease, TrackCatalog, UnmanagedFocus, WakeLease};
pub use player::Player;
pub use queue::Queue;
pub use transport::{AudioTransport, PrepareTicket};
pub use types::{
    AudioFocus, FocusRequest, PlaybackState, PlaybackStatus, RepeatMode, Track, TrackId,
    TrackLocator,
};
pub use volume::{FadeRamp, FULL_VOLUME};
