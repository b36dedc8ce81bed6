//! Platform collaborators
//!
//! Narrow interfaces to the parts of the host the dispatcher depends on but
//! does not own: the track catalog, the audio focus service and a wake lease.

use crate::types::{FocusRequest, Track, TrackId};
use std::time::Duration;

/// Track library
pub trait TrackCatalog: Send {
    /// Resolve a track by catalog id
    fn lookup_by_id(&self, id: TrackId) -> Option<Track>;

    fn is_favorite(&self, id: TrackId) -> bool;

    fn toggle_favorite(&mut self, id: TrackId);

    /// Append to the recently played log
    fn record_recently_played(&mut self, id: TrackId);
}

/// Arbiter of the exclusive audio output
///
/// Focus changes arrive asynchronously through a
/// [`FocusSink`](crate::events::FocusSink).
pub trait FocusService: Send {
    fn request(&mut self) -> FocusRequest;

    fn abandon(&mut self);
}

/// Keeps the host awake across a track boundary
pub trait WakeLease: Send {
    /// Hold the lease for at most `timeout`
    fn acquire(&mut self, timeout: Duration);

    fn release(&mut self);
}

/// Focus service for hosts without output arbitration; always grants
#[derive(Debug, Default, Clone, Copy)]
pub struct UnmanagedFocus;

impl FocusService for UnmanagedFocus {
    fn request(&mut self) -> FocusRequest {
        FocusRequest::Granted
    }

    fn abandon(&mut self) {}
}

/// Wake lease for hosts that never sleep mid-playback
#[derive(Debug, Default, Clone, Copy)]
pub struct NoWakeLease;

impl WakeLease for NoWakeLease {
    fn acquire(&mut self, _timeout: Duration) {}

    fn release(&mut self) {}
}
