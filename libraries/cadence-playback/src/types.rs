//! Core types for playback orchestration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Catalog identifier of a track
///
/// Tracks played straight from a file path are not catalog-backed and carry
/// [`TrackId::UNCATALOGUED`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(i64);

impl TrackId {
    /// Sentinel for tracks that only exist as a raw path
    pub const UNCATALOGUED: TrackId = TrackId(-1);

    /// Create a new track ID
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw catalog value
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Whether the catalog knows this track
    pub fn is_catalogued(self) -> bool {
        self != Self::UNCATALOGUED
    }
}

impl From<i64> for TrackId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where the transport reads a track from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackLocator {
    /// Resolved by the platform through the catalog id
    Catalog(TrackId),

    /// Raw file path, not known to the catalog
    Path(PathBuf),
}

/// Track information for queue management
///
/// Immutable value; everything needed for playback and display is loaded
/// eagerly so the dispatcher never touches the catalog for metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Catalog identifier (or [`TrackId::UNCATALOGUED`])
    pub id: TrackId,

    /// Track title
    pub title: String,

    /// Artist name
    pub artist: String,

    /// Album title
    pub album: String,

    /// Album identifier in the catalog
    pub album_id: i64,

    /// Track duration
    pub duration: Duration,

    /// Release year (optional)
    pub year: Option<u16>,

    /// Source the transport should open
    pub locator: TrackLocator,
}

impl Track {
    /// Create a catalog-backed track with empty metadata
    pub fn new(id: impl Into<TrackId>, title: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            id,
            title: title.into(),
            artist: String::new(),
            album: String::new(),
            album_id: -1,
            duration: Duration::ZERO,
            year: None,
            locator: TrackLocator::Catalog(id),
        }
    }

    /// Create a track that is played from a raw path
    pub fn from_path(path: impl Into<PathBuf>, title: impl Into<String>) -> Self {
        Self {
            locator: TrackLocator::Path(path.into()),
            ..Self::new(TrackId::UNCATALOGUED, title)
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = artist.into();
        self
    }

    pub fn with_album(mut self, album_id: i64, album: impl Into<String>) -> Self {
        self.album_id = album_id;
        self.album = album.into();
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_year(mut self, year: u16) -> Self {
        self.year = Some(year);
        self
    }
}

/// Playback status as seen by the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackStatus {
    /// No queue loaded, or torn down
    #[default]
    Idle,

    /// Transport is opening a source, not yet seekable
    Preparing,

    /// Prepared, not started
    Ready,

    /// Currently playing (possibly ducked)
    Playing,

    /// Paused mid-track
    Paused,
}

/// Repeat mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    /// Stop when queue ends
    #[default]
    Off,

    /// Loop entire queue
    All,

    /// Loop current track only
    One,
}

impl RepeatMode {
    /// Next mode in the Off -> All -> One -> Off cycle
    pub fn cycle(self) -> Self {
        match self {
            RepeatMode::Off => RepeatMode::All,
            RepeatMode::All => RepeatMode::One,
            RepeatMode::One => RepeatMode::Off,
        }
    }
}

/// Audio focus as reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioFocus {
    /// Exclusive use of the output device
    Granted,

    /// Lost for an unbounded time; the user has to resume
    Lost,

    /// Lost for a short time; playback must pause
    LostTransient,

    /// Lost for a short time; playback may continue attenuated
    LostTransientCanDuck,
}

/// Answer of the focus service to a focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusRequest {
    Granted,
    Denied,
}

/// Mutable playback state owned by the dispatcher
#[derive(Debug, Clone, Default)]
pub struct PlaybackState {
    pub status: PlaybackStatus,
    pub repeat_mode: RepeatMode,
    pub shuffle_enabled: bool,

    /// Last known position in the current track (milliseconds)
    pub bookmark_ms: u64,

    /// Set when a transient focus loss paused active playback
    pub paused_by_transient_focus_loss: bool,

    /// Sleep timer deadline, checked on every progress tick
    pub sleep_deadline: Option<Instant>,

    pub current_track_id: Option<TrackId>,
}
