//! Player handle
//!
//! Owns the dispatcher thread. Commands are posted into the mailbox and
//! return immediately; queries travel through the same mailbox so they
//! observe every command posted before them.

use crate::config::PlayerConfig;
use crate::dispatcher::{Collaborators, Dispatcher};
use crate::error::{PlaybackError, Result};
use crate::events::{Event, EventSink, FocusSink};
use crate::queue::Queue;
use crate::types::{PlaybackStatus, RepeatMode, Track};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Running playback orchestrator
pub struct Player {
    sink: EventSink,
    worker: Option<JoinHandle<()>>,
}

impl Player {
    /// Spawn the dispatcher thread and restore the persisted state
    pub fn start(config: PlayerConfig, collaborators: Collaborators) -> Result<Self> {
        config.validate()?;

        let (tx, rx) = crossbeam_channel::unbounded();
        let sink = EventSink::new(tx);
        let dispatcher = Dispatcher::new(config, collaborators, sink.clone());

        let worker = thread::Builder::new()
            .name("cadence-dispatcher".to_string())
            .spawn(move || run(dispatcher, &rx))
            .map_err(|e| {
                error!(error = %e, "Failed to start playback dispatcher");
                PlaybackError::Io(e)
            })?;

        let player = Self {
            sink,
            worker: Some(worker),
        };
        player.sink.post(Event::Restore)?;
        Ok(player)
    }

    /// Handle for the platform focus service
    pub fn focus_sink(&self) -> FocusSink {
        FocusSink::new(self.sink.clone())
    }

    // Commands

    /// Replace the queue
    ///
    /// Rejects an empty track list and an out-of-range start index without
    /// touching the current queue.
    pub fn load(
        &self,
        tracks: Vec<Track>,
        playlist_name: impl Into<String>,
        start_index: usize,
        shuffle: bool,
        autoplay: bool,
    ) -> Result<()> {
        if tracks.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        if start_index >= tracks.len() {
            return Err(PlaybackError::IndexOutOfBounds(start_index));
        }

        self.sink.post(Event::Load {
            tracks,
            playlist_name: playlist_name.into(),
            start_index,
            shuffle,
            autoplay,
        })
    }

    pub fn play(&self) -> Result<()> {
        self.sink.post(Event::Play)
    }

    pub fn pause(&self) -> Result<()> {
        self.sink.post(Event::Pause)
    }

    pub fn toggle(&self) -> Result<()> {
        self.sink.post(Event::Toggle)
    }

    /// Pause and persist, keeping the queue and transport
    pub fn stop(&self) -> Result<()> {
        self.sink.post(Event::Stop)
    }

    pub fn seek(&self, position_ms: u64) -> Result<()> {
        self.sink.post(Event::Seek(position_ms))
    }

    pub fn next(&self, force: bool) -> Result<()> {
        self.sink.post(Event::Next { force })
    }

    /// Previous track, or restart the current one once past the restart threshold
    pub fn previous(&self, force: bool) -> Result<()> {
        self.sink.post(Event::Previous { force })
    }

    /// Prepare the track at `index` without starting it
    pub fn set_position(&self, index: usize) -> Result<()> {
        self.sink.post(Event::SetPosition(index))
    }

    pub fn toggle_shuffle(&self) -> Result<()> {
        self.sink.post(Event::ToggleShuffle)
    }

    /// Off -> All -> One -> Off
    pub fn cycle_repeat_mode(&self) -> Result<()> {
        self.sink.post(Event::CycleRepeatMode)
    }

    /// Pause after `after`; `None` cancels a pending timer
    pub fn set_sleep_timer(&self, after: Option<Duration>) -> Result<()> {
        self.sink.post(Event::SetSleepTimer(after))
    }

    pub fn toggle_favorite(&self) -> Result<()> {
        self.sink.post(Event::ToggleFavorite)
    }

    // Queries

    /// Run `query` on the dispatcher thread and wait for its answer
    pub fn inspect<T, F>(&self, query: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Dispatcher) -> T + Send + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.sink.post(Event::Inspect(Box::new(move |dispatcher: &Dispatcher| {
            let _ = reply_tx.send(query(dispatcher));
        })))?;
        reply_rx.recv().map_err(|_| PlaybackError::Disconnected)
    }

    pub fn current_track(&self) -> Result<Option<Track>> {
        self.inspect(|d| d.current_track().cloned())
    }

    pub fn next_track(&self) -> Result<Option<Track>> {
        self.inspect(|d| d.next_track().cloned())
    }

    pub fn is_playing(&self) -> Result<bool> {
        self.inspect(Dispatcher::is_playing)
    }

    pub fn is_shuffle_enabled(&self) -> Result<bool> {
        self.inspect(Dispatcher::is_shuffle_enabled)
    }

    pub fn repeat_mode(&self) -> Result<RepeatMode> {
        self.inspect(Dispatcher::repeat_mode)
    }

    pub fn bookmark_ms(&self) -> Result<u64> {
        self.inspect(Dispatcher::bookmark_ms)
    }

    pub fn remaining_queue_duration_ms(&self, from_index: usize) -> Result<u64> {
        self.inspect(move |d| d.remaining_queue_duration_ms(from_index))
    }

    pub fn upcoming(&self) -> Result<Vec<Track>> {
        self.inspect(|d| d.upcoming().to_vec())
    }

    pub fn playlist_name(&self) -> Result<String> {
        self.inspect(|d| d.playlist_name().to_string())
    }

    pub fn sleep_deadline(&self) -> Result<Option<Instant>> {
        self.inspect(Dispatcher::sleep_deadline)
    }

    pub fn is_sleep_timer_active(&self) -> Result<bool> {
        self.inspect(Dispatcher::is_sleep_timer_active)
    }

    pub fn is_favorite(&self) -> Result<bool> {
        self.inspect(Dispatcher::is_favorite)
    }

    pub fn current_index(&self) -> Result<Option<usize>> {
        self.inspect(Dispatcher::current_index)
    }

    pub fn status(&self) -> Result<PlaybackStatus> {
        self.inspect(Dispatcher::status)
    }

    /// Copy of both queue orders
    pub fn queue(&self) -> Result<Queue> {
        self.inspect(|d| d.queue().clone())
    }

    // Lifecycle

    /// Tear down and wait for the dispatcher thread to exit
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_worker()
    }

    fn stop_worker(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        // The worker may already be gone; joining still reaps it
        let _ = self.sink.post(Event::Shutdown);
        worker
            .join()
            .map_err(|_| PlaybackError::InvalidOperation("dispatcher thread panicked".to_string()))
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        if let Err(e) = self.stop_worker() {
            error!(error = %e, "Playback dispatcher did not shut down cleanly");
        }
    }
}

/// Dispatcher loop: mailbox events in arrival order, with progress ticks
/// delivered whenever one falls due
fn run(mut dispatcher: Dispatcher, mailbox: &Receiver<Event>) {
    debug!("Playback dispatcher started");

    while dispatcher.is_running() {
        let event = match dispatcher.next_tick() {
            Some(deadline) if deadline <= Instant::now() => Event::ProgressTick,
            Some(deadline) => match mailbox.recv_deadline(deadline) {
                Ok(event) => event,
                Err(RecvTimeoutError::Timeout) => Event::ProgressTick,
                Err(RecvTimeoutError::Disconnected) => break,
            },
            None => match mailbox.recv() {
                Ok(event) => event,
                Err(_) => break,
            },
        };

        dispatcher.handle(event);
    }

    // Every handle dropped without an explicit shutdown
    dispatcher.shutdown();
    debug!("Playback dispatcher stopped");
}
