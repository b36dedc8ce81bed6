//! Playback Events
//!
//! Two directions of traffic:
//! - [`Event`]: everything the dispatcher consumes (commands, transport and
//!   focus callbacks, timer ticks), delivered through one FIFO mailbox
//! - [`PlaybackListener`]: notifications pushed out to the surrounding layers
//!   (UI, media session) after the dispatcher changed state

use crate::dispatcher::Dispatcher;
use crate::error::{ErrorCode, PlaybackError, Result};
use crate::transport::PrepareTicket;
use crate::types::{AudioFocus, Track};
use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Read-only access to the dispatcher from another thread
pub type Inspector = Box<dyn FnOnce(&Dispatcher) + Send>;

/// Mailbox message processed by the dispatcher
pub enum Event {
    /// Replace the queue
    Load {
        tracks: Vec<Track>,
        playlist_name: String,
        start_index: usize,
        shuffle: bool,
        autoplay: bool,
    },
    Play,
    Pause,
    Toggle,

    /// Pause and persist without tearing down (output became noisy, external stop)
    Stop,
    Seek(u64),
    Next {
        force: bool,
    },
    Previous {
        force: bool,
    },
    SetPosition(usize),
    TrackEnded,
    PrepareNextLookahead,
    FocusChanged(AudioFocus),
    Duck,
    Unduck,
    QueueChanged,
    StateChanged,
    ToggleShuffle,
    CycleRepeatMode,

    /// Arm (`Some`) or cancel (`None`) the sleep timer
    SetSleepTimer(Option<Duration>),
    ToggleFavorite,

    /// Transport finished preparing the ticketed track
    Prepared(PrepareTicket),

    /// Transport reached the end of the ticketed track
    Completed(PrepareTicket),

    /// Transport could not prepare or keep playing the ticketed track
    TransportFailed {
        ticket: PrepareTicket,
        reason: String,
    },

    /// Periodic position report while playing
    ProgressTick,

    /// Load the persisted snapshot
    Restore,

    /// Run a read-only query against the dispatcher
    Inspect(Inspector),

    /// Tear down and stop the worker
    Shutdown,
}

impl Event {
    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::Load { .. } => "load",
            Event::Play => "play",
            Event::Pause => "pause",
            Event::Toggle => "toggle",
            Event::Stop => "stop",
            Event::Seek(_) => "seek",
            Event::Next { .. } => "next",
            Event::Previous { .. } => "previous",
            Event::SetPosition(_) => "set_position",
            Event::TrackEnded => "track_ended",
            Event::PrepareNextLookahead => "prepare_next_lookahead",
            Event::FocusChanged(_) => "focus_changed",
            Event::Duck => "duck",
            Event::Unduck => "unduck",
            Event::QueueChanged => "queue_changed",
            Event::StateChanged => "state_changed",
            Event::ToggleShuffle => "toggle_shuffle",
            Event::CycleRepeatMode => "cycle_repeat_mode",
            Event::SetSleepTimer(_) => "set_sleep_timer",
            Event::ToggleFavorite => "toggle_favorite",
            Event::Prepared(_) => "prepared",
            Event::Completed(_) => "completed",
            Event::TransportFailed { .. } => "transport_failed",
            Event::ProgressTick => "progress_tick",
            Event::Restore => "restore",
            Event::Inspect(_) => "inspect",
            Event::Shutdown => "shutdown",
        }
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Load {
                tracks,
                playlist_name,
                start_index,
                shuffle,
                autoplay,
            } => f
                .debug_struct("Load")
                .field("tracks", &tracks.len())
                .field("playlist_name", playlist_name)
                .field("start_index", start_index)
                .field("shuffle", shuffle)
                .field("autoplay", autoplay)
                .finish(),
            Event::Seek(position_ms) => write!(f, "Seek({position_ms})"),
            Event::Next { force } => write!(f, "Next {{ force: {force} }}"),
            Event::Previous { force } => write!(f, "Previous {{ force: {force} }}"),
            Event::SetPosition(index) => write!(f, "SetPosition({index})"),
            Event::FocusChanged(focus) => write!(f, "FocusChanged({focus:?})"),
            Event::SetSleepTimer(after) => write!(f, "SetSleepTimer({after:?})"),
            Event::Prepared(ticket) => write!(f, "Prepared({ticket:?})"),
            Event::Completed(ticket) => write!(f, "Completed({ticket:?})"),
            Event::TransportFailed { ticket, reason } => f
                .debug_struct("TransportFailed")
                .field("ticket", ticket)
                .field("reason", reason)
                .finish(),
            other => f.write_str(other.name()),
        }
    }
}

/// Notification pushed to the surrounding layers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlaybackEvent {
    /// Playing, or about to play once the transport is ready
    PlayingStateChanged { playing: bool },

    /// Transport has prepared a new current track
    TrackChanged { track: Track, is_favorite: bool },

    /// Position update while playing
    Progress { position_ms: u64 },

    /// User-visible failure
    Error { code: ErrorCode, detail: String },

    /// Track that will follow the current one
    NextTrackComputed { track: Track },

    /// Favorite flag of the current track
    FavoriteChanged { is_favorite: bool },

    /// Queue contents or order changed
    QueueChanged { length: usize },
}

/// Receiver of dispatcher notifications
///
/// Called on the dispatcher thread; implementations must not block and must
/// not call back into the player synchronously.
pub trait PlaybackListener: Send {
    fn on_playing_state_changed(&mut self, _playing: bool) {}

    fn on_track_changed(&mut self, _track: &Track, _is_favorite: bool) {}

    fn on_progress(&mut self, _position_ms: u64) {}

    fn on_error(&mut self, _code: ErrorCode, _detail: &str) {}

    fn on_next_track_computed(&mut self, _track: &Track) {}

    fn on_favorite_changed(&mut self, _is_favorite: bool) {}

    fn on_queue_changed(&mut self, _length: usize) {}
}

/// Listener that ignores every notification
#[derive(Debug, Default)]
pub struct NullListener;

impl PlaybackListener for NullListener {}

/// Listener that forwards notifications as [`PlaybackEvent`]s
#[derive(Debug, Clone)]
pub struct ChannelListener {
    tx: Sender<PlaybackEvent>,
}

impl ChannelListener {
    /// Create the listener and the receiving end of its channel
    pub fn new() -> (Self, crossbeam_channel::Receiver<PlaybackEvent>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, event: PlaybackEvent) {
        // Nobody is listening anymore
        let _ = self.tx.send(event);
    }
}

impl PlaybackListener for ChannelListener {
    fn on_playing_state_changed(&mut self, playing: bool) {
        self.forward(PlaybackEvent::PlayingStateChanged { playing });
    }

    fn on_track_changed(&mut self, track: &Track, is_favorite: bool) {
        self.forward(PlaybackEvent::TrackChanged {
            track: track.clone(),
            is_favorite,
        });
    }

    fn on_progress(&mut self, position_ms: u64) {
        self.forward(PlaybackEvent::Progress { position_ms });
    }

    fn on_error(&mut self, code: ErrorCode, detail: &str) {
        self.forward(PlaybackEvent::Error {
            code,
            detail: detail.to_string(),
        });
    }

    fn on_next_track_computed(&mut self, track: &Track) {
        self.forward(PlaybackEvent::NextTrackComputed {
            track: track.clone(),
        });
    }

    fn on_favorite_changed(&mut self, is_favorite: bool) {
        self.forward(PlaybackEvent::FavoriteChanged { is_favorite });
    }

    fn on_queue_changed(&mut self, length: usize) {
        self.forward(PlaybackEvent::QueueChanged { length });
    }
}

/// Posting end of the dispatcher mailbox
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Sender<Event>,
}

impl EventSink {
    pub fn new(tx: Sender<Event>) -> Self {
        Self { tx }
    }

    /// Append an event to the mailbox
    pub fn post(&self, event: Event) -> Result<()> {
        self.tx.send(event).map_err(|_| PlaybackError::Disconnected)
    }

    fn post_callback(&self, event: Event) {
        let name = event.name();
        if self.post(event).is_err() {
            tracing::debug!("Dropping {} callback, dispatcher is gone", name);
        }
    }
}

/// Handle given to the audio transport for its asynchronous callbacks
#[derive(Debug, Clone)]
pub struct TransportSink {
    sink: EventSink,
}

impl TransportSink {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    /// Source is open and seekable
    pub fn prepared(&self, ticket: PrepareTicket) {
        self.sink.post_callback(Event::Prepared(ticket));
    }

    /// Playback reached the end of the source
    pub fn completed(&self, ticket: PrepareTicket) {
        self.sink.post_callback(Event::Completed(ticket));
    }

    /// Source could not be opened, or playback broke off
    pub fn failed(&self, ticket: PrepareTicket, reason: impl Into<String>) {
        self.sink.post_callback(Event::TransportFailed {
            ticket,
            reason: reason.into(),
        });
    }
}

/// Handle given to the platform focus service for focus callbacks
#[derive(Debug, Clone)]
pub struct FocusSink {
    sink: EventSink,
}

impl FocusSink {
    pub fn new(sink: EventSink) -> Self {
        Self { sink }
    }

    pub fn focus_changed(&self, focus: AudioFocus) {
        self.sink.post_callback(Event::FocusChanged(focus));
    }
}
