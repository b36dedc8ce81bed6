//! Shared fakes for integration tests
//!
//! Every fake is cheap to clone and clones share state, so a test can keep a
//! handle after moving one copy into the dispatcher.

#![allow(dead_code)]

use cadence_playback::{
    AudioTransport, ChannelListener, Collaborators, Dispatcher, Event, EventSink, FocusRequest,
    FocusService, MemoryStore, PlaybackEvent, PlayerConfig, PrepareTicket, Result, Track,
    TrackCatalog, TrackId, TransportSink, WakeLease,
};
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Once};
use std::time::{Duration, Instant};

static INIT: Once = Once::new();

/// Route dispatcher logs to the test output
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

// ===== Transport =====

#[derive(Default)]
struct TransportInner {
    sink: Option<TransportSink>,
    manual: bool,
    failing: HashSet<TrackId>,
    prepared: Vec<PrepareTicket>,
    current: Option<PrepareTicket>,
    playing: bool,
    position_ms: u64,
    seeks: Vec<u64>,
    volume: Option<f32>,
    starts: usize,
    released: bool,
}

/// Transport that prepares instantly (or on demand in manual mode)
#[derive(Default)]
pub struct FakeTransport {
    inner: Mutex<TransportInner>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Prepare requests wait for [`FakeTransport::finish_prepare`]
    pub fn manual() -> Arc<Self> {
        let transport = Self::default();
        transport.inner.lock().unwrap().manual = true;
        Arc::new(transport)
    }

    /// Tracks that fail to prepare
    pub fn fail_tracks(&self, ids: &[i64]) {
        let mut inner = self.inner.lock().unwrap();
        inner.failing = ids.iter().copied().map(TrackId::new).collect();
    }

    pub fn tickets(&self) -> Vec<PrepareTicket> {
        self.inner.lock().unwrap().prepared.clone()
    }

    pub fn prepare_count(&self) -> usize {
        self.inner.lock().unwrap().prepared.len()
    }

    /// Report `ticket` as prepared
    pub fn finish_prepare(&self, ticket: PrepareTicket) {
        let sink = self.inner.lock().unwrap().sink.clone();
        if let Some(sink) = sink {
            sink.prepared(ticket);
        }
    }

    /// Report the current source as played to the end
    pub fn finish_track(&self) {
        let (sink, ticket) = {
            let mut inner = self.inner.lock().unwrap();
            inner.playing = false;
            (inner.sink.clone(), inner.current)
        };
        if let (Some(sink), Some(ticket)) = (sink, ticket) {
            sink.completed(ticket);
        }
    }

    /// Report an error for `ticket` after it was prepared
    pub fn break_off(&self, ticket: PrepareTicket, reason: &str) {
        let sink = {
            let mut inner = self.inner.lock().unwrap();
            inner.playing = false;
            inner.sink.clone()
        };
        if let Some(sink) = sink {
            sink.failed(ticket, reason);
        }
    }

    pub fn set_position(&self, position_ms: u64) {
        self.inner.lock().unwrap().position_ms = position_ms;
    }

    pub fn seeks(&self) -> Vec<u64> {
        self.inner.lock().unwrap().seeks.clone()
    }

    pub fn volume(&self) -> Option<f32> {
        self.inner.lock().unwrap().volume
    }

    pub fn starts(&self) -> usize {
        self.inner.lock().unwrap().starts
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().unwrap().released
    }
}

impl AudioTransport for FakeTransport {
    fn attach(&self, sink: TransportSink) {
        self.inner.lock().unwrap().sink = Some(sink);
    }

    fn prepare(&self, track: &Track, ticket: PrepareTicket) {
        let (sink, manual, fails) = {
            let mut inner = self.inner.lock().unwrap();
            inner.prepared.push(ticket);
            inner.current = Some(ticket);
            inner.playing = false;
            inner.position_ms = 0;
            (
                inner.sink.clone(),
                inner.manual,
                inner.failing.contains(&track.id),
            )
        };

        let Some(sink) = sink else { return };
        if fails {
            sink.failed(ticket, "unsupported format");
        } else if !manual {
            sink.prepared(ticket);
        }
    }

    fn start(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.playing = true;
        inner.starts += 1;
        Ok(())
    }

    fn pause(&self) {
        self.inner.lock().unwrap().playing = false;
    }

    fn seek(&self, position_ms: u64) {
        let mut inner = self.inner.lock().unwrap();
        inner.position_ms = position_ms;
        inner.seeks.push(position_ms);
    }

    fn set_volume(&self, level: f32) {
        self.inner.lock().unwrap().volume = Some(level);
    }

    fn release(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.playing = false;
        inner.released = true;
    }

    fn position_ms(&self) -> u64 {
        self.inner.lock().unwrap().position_ms
    }

    fn is_playing(&self) -> bool {
        self.inner.lock().unwrap().playing
    }
}

// ===== Catalog =====

#[derive(Default)]
struct CatalogInner {
    tracks: Vec<Track>,
    favorites: HashSet<TrackId>,
    recent: Vec<TrackId>,
}

#[derive(Clone, Default)]
pub struct FakeCatalog {
    inner: Arc<Mutex<CatalogInner>>,
}

impl FakeCatalog {
    pub fn with_tracks(tracks: Vec<Track>) -> Self {
        let catalog = Self::default();
        catalog.inner.lock().unwrap().tracks = tracks;
        catalog
    }

    /// Forget a track, as if its file was deleted
    pub fn remove(&self, id: i64) {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .retain(|track| track.id != TrackId::new(id));
    }

    pub fn recent(&self) -> Vec<i64> {
        self.inner.lock().unwrap().recent.iter().map(|id| id.get()).collect()
    }
}

impl TrackCatalog for FakeCatalog {
    fn lookup_by_id(&self, id: TrackId) -> Option<Track> {
        self.inner
            .lock()
            .unwrap()
            .tracks
            .iter()
            .find(|track| track.id == id)
            .cloned()
    }

    fn is_favorite(&self, id: TrackId) -> bool {
        self.inner.lock().unwrap().favorites.contains(&id)
    }

    fn toggle_favorite(&mut self, id: TrackId) {
        let mut inner = self.inner.lock().unwrap();
        if !inner.favorites.remove(&id) {
            inner.favorites.insert(id);
        }
    }

    fn record_recently_played(&mut self, id: TrackId) {
        self.inner.lock().unwrap().recent.push(id);
    }
}

// ===== Focus and wake lease =====

#[derive(Default)]
struct FocusInner {
    deny: bool,
    requests: usize,
    abandoned: usize,
}

#[derive(Clone, Default)]
pub struct FakeFocus {
    inner: Arc<Mutex<FocusInner>>,
}

impl FakeFocus {
    pub fn deny(&self) {
        self.inner.lock().unwrap().deny = true;
    }

    pub fn allow(&self) {
        self.inner.lock().unwrap().deny = false;
    }

    pub fn requests(&self) -> usize {
        self.inner.lock().unwrap().requests
    }

    pub fn abandoned(&self) -> usize {
        self.inner.lock().unwrap().abandoned
    }
}

impl FocusService for FakeFocus {
    fn request(&mut self) -> FocusRequest {
        let mut inner = self.inner.lock().unwrap();
        inner.requests += 1;
        if inner.deny {
            FocusRequest::Denied
        } else {
            FocusRequest::Granted
        }
    }

    fn abandon(&mut self) {
        self.inner.lock().unwrap().abandoned += 1;
    }
}

#[derive(Default)]
struct WakeInner {
    held: bool,
    acquired: usize,
    timeout: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeWake {
    inner: Arc<Mutex<WakeInner>>,
}

impl FakeWake {
    pub fn is_held(&self) -> bool {
        self.inner.lock().unwrap().held
    }

    pub fn acquired(&self) -> usize {
        self.inner.lock().unwrap().acquired
    }

    pub fn last_timeout(&self) -> Option<Duration> {
        self.inner.lock().unwrap().timeout
    }
}

impl WakeLease for FakeWake {
    fn acquire(&mut self, timeout: Duration) {
        let mut inner = self.inner.lock().unwrap();
        inner.held = true;
        inner.acquired += 1;
        inner.timeout = Some(timeout);
    }

    fn release(&mut self) {
        self.inner.lock().unwrap().held = false;
    }
}

// ===== Tracks =====

pub fn create_track(id: i64, title: &str) -> Track {
    Track::new(id, title)
        .with_artist("Test Artist")
        .with_album(100, "Test Album")
        .with_duration(Duration::from_secs(180))
}

/// A (1), B (2), C (3)
pub fn abc() -> Vec<Track> {
    vec![
        create_track(1, "A"),
        create_track(2, "B"),
        create_track(3, "C"),
    ]
}

pub fn ids(tracks: &[Track]) -> Vec<i64> {
    tracks.iter().map(|track| track.id.get()).collect()
}

pub fn load_event(tracks: Vec<Track>, start_index: usize, autoplay: bool) -> Event {
    Event::Load {
        tracks,
        playlist_name: "Test Playlist".to_string(),
        start_index,
        shuffle: false,
        autoplay,
    }
}

/// Defaults with fades fast enough for tests
pub fn test_config() -> PlayerConfig {
    PlayerConfig {
        fade_step_delay_ms: 1,
        ..PlayerConfig::default()
    }
}

/// Poll `condition` until it holds or two seconds pass
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

// ===== Dispatcher harness =====

/// Dispatcher driven on the test thread
///
/// `send` handles an event and then everything it caused to be posted, so a
/// test observes the state after the whole chain settled.
pub struct Harness {
    pub dispatcher: Dispatcher,
    pub transport: Arc<FakeTransport>,
    pub catalog: FakeCatalog,
    pub focus: FakeFocus,
    pub wake: FakeWake,
    pub store: MemoryStore,
    mailbox: Receiver<Event>,
    events: Receiver<PlaybackEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(FakeTransport::new(), FakeCatalog::with_tracks(abc()), MemoryStore::new())
    }

    pub fn with_transport(transport: Arc<FakeTransport>) -> Self {
        Self::build(transport, FakeCatalog::with_tracks(abc()), MemoryStore::new())
    }

    pub fn build(transport: Arc<FakeTransport>, catalog: FakeCatalog, store: MemoryStore) -> Self {
        init_logging();
        let focus = FakeFocus::default();
        let wake = FakeWake::default();
        let (listener, events) = ChannelListener::new();
        let (tx, mailbox) = crossbeam_channel::unbounded();

        let collaborators = Collaborators::new(transport.clone(), catalog.clone(), store.clone())
            .with_listener(listener)
            .with_focus(focus.clone())
            .with_wake_lease(wake.clone());
        let dispatcher = Dispatcher::new(test_config(), collaborators, EventSink::new(tx));

        Self {
            dispatcher,
            transport,
            catalog,
            focus,
            wake,
            store,
            mailbox,
            events,
        }
    }

    pub fn send(&mut self, event: Event) {
        self.dispatcher.handle(event);
        self.pump();
    }

    /// Handle every callback waiting in the mailbox
    pub fn pump(&mut self) {
        while let Ok(event) = self.mailbox.try_recv() {
            self.dispatcher.handle(event);
        }
    }

    /// Notifications emitted since the last call
    pub fn drain(&self) -> Vec<PlaybackEvent> {
        self.events.try_iter().collect()
    }

    pub fn current_id(&self) -> Option<i64> {
        self.dispatcher.current_track().map(|track| track.id.get())
    }
}
