//! Playback state machine
//!
//! The dispatcher is the single writer of the queue and the playback state.
//! It consumes one [`Event`] at a time; handlers may run other handlers
//! directly (for example `set_position` computes the lookahead) and those
//! nested steps finish before the outer event returns.
//!
//! ```text
//! Idle -> Preparing -> Ready -> Playing <-> Paused
//!             ^                   |
//!             +---- next/prev ----+
//! ```
//!
//! Ducking happens inside `Playing`: the transport keeps playing at reduced
//! volume.

use crate::config::PlayerConfig;
use crate::error::PlaybackError;
use crate::events::{Event, EventSink, NullListener, PlaybackListener, TransportSink};
use crate::persistence::{self, KeyValueStore, Persistence};
use crate::platform::{FocusService, NoWakeLease, TrackCatalog, UnmanagedFocus, WakeLease};
use crate::queue::Queue;
use crate::transport::{AudioTransport, PrepareOutcome, PrepareTicket, TransportEngine};
use crate::types::{AudioFocus, FocusRequest, PlaybackState, PlaybackStatus, RepeatMode, Track, TrackId};
use crate::volume::FULL_VOLUME;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Everything the dispatcher talks to
pub struct Collaborators {
    pub transport: Arc<dyn AudioTransport>,
    pub catalog: Box<dyn TrackCatalog>,
    pub store: Box<dyn KeyValueStore>,
    pub listener: Box<dyn PlaybackListener>,
    pub focus: Box<dyn FocusService>,
    pub wake: Box<dyn WakeLease>,
}

impl Collaborators {
    /// Required collaborators; focus is always granted, no wake lease, no listener
    pub fn new(
        transport: Arc<dyn AudioTransport>,
        catalog: impl TrackCatalog + 'static,
        store: impl KeyValueStore + 'static,
    ) -> Self {
        Self {
            transport,
            catalog: Box::new(catalog),
            store: Box::new(store),
            listener: Box::new(NullListener),
            focus: Box::new(UnmanagedFocus),
            wake: Box::new(NoWakeLease),
        }
    }

    pub fn with_listener(mut self, listener: impl PlaybackListener + 'static) -> Self {
        self.listener = Box::new(listener);
        self
    }

    pub fn with_focus(mut self, focus: impl FocusService + 'static) -> Self {
        self.focus = Box::new(focus);
        self
    }

    pub fn with_wake_lease(mut self, wake: impl WakeLease + 'static) -> Self {
        self.wake = Box::new(wake);
        self
    }
}

/// Owner of the queue and playback state
pub struct Dispatcher {
    config: PlayerConfig,
    queue: Queue,
    state: PlaybackState,
    playlist_name: String,
    engine: TransportEngine,
    persistence: Persistence,
    catalog: Box<dyn TrackCatalog>,
    focus: Box<dyn FocusService>,
    wake: Box<dyn WakeLease>,
    listener: Box<dyn PlaybackListener>,
    holds_focus: bool,
    consecutive_failures: usize,
    running: bool,
}

impl Dispatcher {
    /// Build a dispatcher; transport callbacks are posted to `sink`
    pub fn new(config: PlayerConfig, collaborators: Collaborators, sink: EventSink) -> Self {
        let Collaborators {
            transport,
            catalog,
            store,
            listener,
            focus,
            wake,
        } = collaborators;

        let engine = TransportEngine::new(transport, TransportSink::new(sink), &config);
        let persistence = Persistence::new(
            store,
            config.snapshot_key.clone(),
            Duration::from_millis(config.bookmark_save_interval_ms),
        );

        Self {
            config,
            queue: Queue::new(),
            state: PlaybackState::default(),
            playlist_name: String::new(),
            engine,
            persistence,
            catalog,
            focus,
            wake,
            listener,
            holds_focus: false,
            consecutive_failures: 0,
            running: true,
        }
    }

    /// Process one event to completion
    pub fn handle(&mut self, event: Event) {
        if !self.running && !matches!(event, Event::Inspect(_)) {
            debug!(event = event.name(), "Ignoring event after shutdown");
            return;
        }

        if !matches!(event, Event::ProgressTick | Event::Inspect(_)) {
            debug!(event = ?event, "Handling event");
        }

        match event {
            Event::Load {
                tracks,
                playlist_name,
                start_index,
                shuffle,
                autoplay,
            } => self.load(tracks, playlist_name, start_index, shuffle, autoplay),
            Event::Play => self.play(),
            Event::Pause => self.pause_by_user(),
            Event::Toggle => self.toggle(),
            Event::Stop => self.stop(),
            Event::Seek(position_ms) => self.seek(position_ms),
            Event::Next { force } => self.next(force),
            Event::Previous { force } => self.previous(force),
            Event::SetPosition(index) => self.set_position(index),
            Event::TrackEnded => self.track_ended(),
            Event::PrepareNextLookahead => self.prepare_next_lookahead(),
            Event::FocusChanged(focus) => self.focus_changed(focus),
            Event::Duck => self.engine.duck(),
            Event::Unduck => self.engine.unduck(),
            Event::QueueChanged => self.queue_changed(),
            Event::StateChanged => self.state_changed(),
            Event::ToggleShuffle => self.toggle_shuffle(),
            Event::CycleRepeatMode => self.cycle_repeat_mode(),
            Event::SetSleepTimer(after) => self.set_sleep_timer(after),
            Event::ToggleFavorite => self.toggle_favorite(),
            Event::Prepared(ticket) => {
                let outcome = self.engine.on_prepared(ticket);
                self.apply_outcome(ticket, outcome);
            }
            Event::Completed(ticket) => self.completed(ticket),
            Event::TransportFailed { ticket, reason } => {
                let was_playing = self.state.status == PlaybackStatus::Playing;
                let outcome = match self.engine.on_failed(ticket, reason) {
                    PrepareOutcome::Failed {
                        reason,
                        play_when_ready,
                    } => PrepareOutcome::Failed {
                        reason,
                        play_when_ready: play_when_ready || was_playing,
                    },
                    other => other,
                };
                self.apply_outcome(ticket, outcome);
            }
            Event::ProgressTick => self.progress_tick(Instant::now()),
            Event::Restore => self.restore(),
            Event::Inspect(inspect) => inspect(self),
            Event::Shutdown => self.shutdown(),
        }
    }

    // Commands

    fn load(
        &mut self,
        tracks: Vec<Track>,
        playlist_name: String,
        start_index: usize,
        shuffle: bool,
        autoplay: bool,
    ) {
        let mut queue = match Queue::load(tracks, start_index) {
            Ok(queue) => queue,
            Err(e) => {
                warn!(error = %e, "Rejected queue load");
                return;
            }
        };

        if self.engine.is_playing() {
            self.pause();
        }

        if shuffle {
            queue.set_shuffle(true);
        }

        info!(
            playlist = %playlist_name,
            tracks = queue.len(),
            start_index,
            shuffle,
            autoplay,
            "Loading queue"
        );

        self.queue = queue;
        self.state.shuffle_enabled = shuffle;
        self.playlist_name = playlist_name;
        self.consecutive_failures = 0;

        let index = self.queue.current_index().unwrap_or(0);
        if autoplay {
            self.play_track_at(index);
        } else {
            self.set_position(index);
        }
        self.queue_changed();
    }

    fn play(&mut self) {
        if self.queue.is_empty() {
            debug!("Nothing to play");
            return;
        }

        if !self.acquire_focus() {
            let error = PlaybackError::FocusDenied;
            warn!("{}", error);
            self.listener.on_error(error.code(), &error.to_string());
            if matches!(
                self.state.status,
                PlaybackStatus::Ready | PlaybackStatus::Preparing
            ) {
                self.state.status = PlaybackStatus::Paused;
            }
            self.state_changed();
            return;
        }

        if self.engine.is_prepared() {
            if let Err(e) = self.engine.start(Instant::now()) {
                warn!(error = %e, "Transport refused to start");
                if let Some(track_id) = self.state.current_track_id {
                    self.recover_from_failure(track_id, e.to_string(), true);
                }
                return;
            }
            self.state.status = PlaybackStatus::Playing;
            if self.engine.volume() < FULL_VOLUME {
                self.engine.unduck();
            }
            self.state_changed();
        } else if self.engine.is_preparing() {
            self.engine.play_when_ready();
            self.state_changed();
        } else if let Some(index) = self.queue.current_index() {
            self.play_track_at(index);
        }
    }

    /// Pause requested by the user; a later focus gain must not resume
    fn pause_by_user(&mut self) {
        self.state.paused_by_transient_focus_loss = false;
        self.pause();
    }

    fn pause(&mut self) {
        if self.engine.is_prepared() {
            self.state.bookmark_ms = self.engine.position_ms();
        }
        self.engine.pause();

        if self.state.status == PlaybackStatus::Playing {
            self.state.status = PlaybackStatus::Paused;
        }

        self.persist();
        self.state_changed();
    }

    fn toggle(&mut self) {
        if self.is_playing() {
            self.pause_by_user();
        } else {
            self.play();
        }
    }

    fn stop(&mut self) {
        info!("Stopping playback");
        self.pause_by_user();
    }

    fn seek(&mut self, position_ms: u64) {
        if self.queue.is_empty() {
            return;
        }

        self.engine.seek(position_ms);
        self.state.bookmark_ms = position_ms;
        self.persist();
        self.listener.on_progress(position_ms);
    }

    fn next(&mut self, force: bool) {
        let (Some(current), Some(index)) = (
            self.queue.current_index(),
            self.queue.next_index(self.state.repeat_mode, force),
        ) else {
            return;
        };

        if index == current && self.state.repeat_mode == RepeatMode::Off {
            debug!("Already at the last track");
            return;
        }

        self.play_track_at(index);
    }

    fn previous(&mut self, force: bool) {
        let (Some(current), Some(index)) = (
            self.queue.current_index(),
            self.queue.previous_index(self.state.repeat_mode, force),
        ) else {
            return;
        };

        if self.engine.position_ms() > self.config.restart_threshold_ms
            || (index == current && self.state.repeat_mode == RepeatMode::Off)
        {
            self.seek(0);
            return;
        }

        self.play_track_at(index);
    }

    fn set_position(&mut self, index: usize) {
        let track = match self.queue.set_current(index) {
            Ok(track) => track.clone(),
            Err(e) => {
                warn!(error = %e, "Rejected position change");
                return;
            }
        };

        self.state.current_track_id = Some(track.id);
        self.state.bookmark_ms = 0;
        self.state.status = PlaybackStatus::Preparing;

        self.engine.prepare(&track);
        self.prepare_next_lookahead();
        self.persist();
    }

    fn play_track_at(&mut self, index: usize) {
        self.set_position(index);
        if self.state.status == PlaybackStatus::Preparing {
            self.engine.play_when_ready();
            self.state_changed();
        }
    }

    fn toggle_shuffle(&mut self) {
        let enable = !self.state.shuffle_enabled;
        self.queue.set_shuffle(enable);
        self.state.shuffle_enabled = enable;
        info!(enabled = enable, "Shuffle toggled");
        self.queue_changed();
    }

    fn cycle_repeat_mode(&mut self) {
        self.state.repeat_mode = self.state.repeat_mode.cycle();
        info!(mode = ?self.state.repeat_mode, "Repeat mode changed");
        self.persist();
        self.prepare_next_lookahead();
    }

    fn set_sleep_timer(&mut self, after: Option<Duration>) {
        self.state.sleep_deadline = after.map(|after| Instant::now() + after);
        match after {
            Some(after) => info!(after_ms = after.as_millis(), "Sleep timer armed"),
            None => info!("Sleep timer cancelled"),
        }
    }

    fn toggle_favorite(&mut self) {
        let Some(id) = self.state.current_track_id.filter(|id| id.is_catalogued()) else {
            debug!("Current track is not in the catalog");
            return;
        };

        self.catalog.toggle_favorite(id);
        self.state_changed();
    }

    // Transport callbacks

    fn apply_outcome(&mut self, ticket: PrepareTicket, outcome: PrepareOutcome) {
        match outcome {
            PrepareOutcome::Stale => {
                debug!(
                    track_id = %ticket.track_id,
                    serial = ticket.serial,
                    "Discarding stale transport callback"
                );
            }
            PrepareOutcome::Ready { play_when_ready } => {
                // A denied play while opening leaves the track paused
                if self.state.status == PlaybackStatus::Preparing {
                    self.state.status = PlaybackStatus::Ready;
                }
                self.consecutive_failures = 0;
                self.track_changed();
                if play_when_ready {
                    self.play();
                }
            }
            PrepareOutcome::Failed {
                reason,
                play_when_ready,
            } => self.recover_from_failure(ticket.track_id, reason, play_when_ready),
        }
    }

    /// Skip past an unplayable track, or stop once nothing else can play
    fn recover_from_failure(&mut self, track_id: TrackId, reason: String, resume: bool) {
        let error = PlaybackError::PrepareFailed { track_id, reason };
        warn!("{}", error);

        self.consecutive_failures += 1;
        let current = self.queue.current_index();
        let next = self.queue.next_index(self.state.repeat_mode, true);

        let index = match next {
            Some(index) if next != current && self.consecutive_failures < self.queue.len() => index,
            _ => {
                self.consecutive_failures = 0;
                self.engine.pause();
                self.state.status = PlaybackStatus::Paused;
                self.listener.on_error(error.code(), &error.to_string());
                self.state_changed();
                return;
            }
        };

        if resume {
            self.play_track_at(index);
        } else {
            self.set_position(index);
        }
    }

    fn completed(&mut self, ticket: PrepareTicket) {
        if !self.engine.is_current(ticket) {
            debug!(track_id = %ticket.track_id, "Discarding completion of a replaced track");
            return;
        }

        self.wake.acquire(self.config.wake_lease_timeout());
        self.track_ended();
        self.wake.release();
    }

    fn track_ended(&mut self) {
        if self.state.repeat_mode == RepeatMode::Off && self.queue.is_last() {
            debug!("Reached the end of the queue");
            self.engine.pause();
            self.engine.seek(0);
            self.state.status = PlaybackStatus::Paused;
            self.state.bookmark_ms = 0;
            self.persist();
            self.state_changed();
            return;
        }

        if let Some(index) = self.queue.next_index(self.state.repeat_mode, false) {
            self.play_track_at(index);
        }
    }

    fn progress_tick(&mut self, now: Instant) {
        if let Some(position_ms) = self.engine.tick(now) {
            self.state.bookmark_ms = position_ms;
            if self.persistence.bookmark_due(now) {
                self.persist();
            }
            self.listener.on_progress(position_ms);
        }

        if self.state.sleep_deadline.is_some_and(|deadline| now >= deadline) {
            info!("Sleep timer expired");
            self.state.sleep_deadline = None;
            self.pause_by_user();
        }
    }

    // Focus

    fn focus_changed(&mut self, focus: AudioFocus) {
        match focus {
            AudioFocus::Granted => {
                self.holds_focus = true;
                if self.state.paused_by_transient_focus_loss {
                    self.play();
                    self.state.paused_by_transient_focus_loss = false;
                } else {
                    self.engine.unduck();
                }
            }
            AudioFocus::Lost => {
                self.holds_focus = false;
                self.state.paused_by_transient_focus_loss = false;
                self.pause();
                self.engine.restore_volume();
            }
            AudioFocus::LostTransient => {
                self.holds_focus = false;
                let was_playing = self.is_playing();
                self.pause();
                self.state.paused_by_transient_focus_loss = was_playing;
            }
            AudioFocus::LostTransientCanDuck => {
                self.holds_focus = false;
                self.engine.duck();
            }
        }
    }

    fn acquire_focus(&mut self) -> bool {
        if !self.holds_focus {
            self.holds_focus = self.focus.request() == FocusRequest::Granted;
        }
        self.holds_focus
    }

    // Notifications

    fn prepare_next_lookahead(&mut self) {
        let next = self
            .queue
            .next_index(self.state.repeat_mode, false)
            .and_then(|index| self.queue.track_at(index));

        if let Some(track) = next {
            self.listener.on_next_track_computed(track);
        }
    }

    fn queue_changed(&mut self) {
        self.persist();
        if !self.queue.is_empty() {
            self.prepare_next_lookahead();
        }
        self.listener.on_queue_changed(self.queue.len());
    }

    fn state_changed(&mut self) {
        let playing = self.is_playing();
        let favorite = self.is_favorite();
        self.listener.on_favorite_changed(favorite);
        self.listener.on_playing_state_changed(playing);
    }

    fn track_changed(&mut self) {
        let Some(track) = self.queue.current() else {
            return;
        };

        if track.id.is_catalogued() {
            self.catalog.record_recently_played(track.id);
        }
        let favorite = track.id.is_catalogued() && self.catalog.is_favorite(track.id);
        self.listener.on_track_changed(track, favorite);
    }

    fn persist(&mut self) {
        let snapshot = persistence::snapshot(&self.queue, &self.state, &self.playlist_name);
        self.persistence.save(snapshot.as_ref());
    }

    // Lifecycle

    /// Load the persisted snapshot and prepare its current track
    ///
    /// Playback does not start; the restored bookmark, rewound slightly, is
    /// applied once the transport is prepared.
    pub fn restore(&mut self) {
        let Some(restored) = self.persistence.load(self.catalog.as_ref()) else {
            info!("No playback state to restore");
            return;
        };

        let bookmark_ms = restored.state.bookmark_ms;
        self.queue = restored.queue;
        self.state = restored.state;
        self.playlist_name = restored.playlist_name;

        info!(
            playlist = %self.playlist_name,
            tracks = self.queue.len(),
            bookmark_ms,
            "Restored playback state"
        );

        if let Some(index) = self.queue.current_index() {
            self.set_position(index);
            self.state.bookmark_ms = bookmark_ms;
            self.engine
                .seek_when_ready(persistence::resume_position(bookmark_ms, self.config.resume_rewind_ms));
        }
        self.queue_changed();
    }

    /// Pause, persist and release every platform resource
    pub fn shutdown(&mut self) {
        if !self.running {
            return;
        }
        info!("Shutting down playback");

        if self.engine.is_prepared() {
            self.state.bookmark_ms = self.engine.position_ms();
        }
        self.engine.pause();
        self.persist();

        self.focus.abandon();
        self.holds_focus = false;
        self.engine.release();
        self.wake.release();

        self.state.status = PlaybackStatus::Idle;
        self.running = false;
        self.listener.on_playing_state_changed(false);
    }

    // Queries

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// When the run loop has to deliver the next progress tick
    pub fn next_tick(&self) -> Option<Instant> {
        self.engine.next_tick()
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn status(&self) -> PlaybackStatus {
        self.state.status
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.queue.current()
    }

    pub fn current_index(&self) -> Option<usize> {
        self.queue.current_index()
    }

    /// Track that plays after the current one ends naturally
    pub fn next_track(&self) -> Option<&Track> {
        self.queue
            .next_index(self.state.repeat_mode, false)
            .and_then(|index| self.queue.track_at(index))
    }

    /// Playing, or about to play once preparation completes
    pub fn is_playing(&self) -> bool {
        self.engine.is_playing() || self.engine.is_going_to_play()
    }

    pub fn is_shuffle_enabled(&self) -> bool {
        self.state.shuffle_enabled
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.state.repeat_mode
    }

    pub fn bookmark_ms(&self) -> u64 {
        self.state.bookmark_ms
    }

    /// Position reported by the transport, or the pending seek target
    pub fn position_ms(&self) -> u64 {
        self.engine.position_ms()
    }

    /// Summed duration of the tracks after `from_index`
    pub fn remaining_queue_duration_ms(&self, from_index: usize) -> u64 {
        let remaining = self.queue.remaining_duration(from_index);
        u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn upcoming(&self) -> &[Track] {
        self.queue.upcoming()
    }

    pub fn playlist_name(&self) -> &str {
        &self.playlist_name
    }

    pub fn sleep_deadline(&self) -> Option<Instant> {
        self.state.sleep_deadline
    }

    pub fn is_sleep_timer_active(&self) -> bool {
        self.state.sleep_deadline.is_some()
    }

    /// Favorite flag of the current track
    pub fn is_favorite(&self) -> bool {
        self.state
            .current_track_id
            .filter(|id| id.is_catalogued())
            .is_some_and(|id| self.catalog.is_favorite(id))
    }

    /// Output volume as last set by the fader
    pub fn volume(&self) -> f32 {
        self.engine.volume()
    }
}
