//! Transport engine
//!
//! Wraps the platform audio primitive. The primitive decodes and outputs
//! audio; the engine keeps track of what was asked of it:
//! - which prepare request is current (stale completions are discarded)
//! - whether playback should start once preparation finishes
//! - a seek that has to wait for preparation
//! - when the next progress tick is due
//! - volume fades for ducking

use crate::config::PlayerConfig;
use crate::error::Result;
use crate::events::TransportSink;
use crate::types::{Track, TrackId};
use crate::volume::{FadeRamp, Fader, FULL_VOLUME};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Identifies one prepare request
///
/// The serial grows with every request, so two requests for the same track
/// are still told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PrepareTicket {
    pub track_id: TrackId,
    pub serial: u64,
}

impl PrepareTicket {
    pub fn new(track_id: TrackId, serial: u64) -> Self {
        Self { track_id, serial }
    }
}

/// Platform audio primitive
///
/// `prepare` must return immediately and report back through the attached
/// [`TransportSink`]. Methods may be called from the dispatcher and from fade
/// threads at the same time (`set_volume` only).
pub trait AudioTransport: Send + Sync {
    /// Hand over the callback sink; called once before any other method
    fn attach(&self, sink: TransportSink);

    /// Start opening `track`; completion is reported with `ticket`
    fn prepare(&self, track: &Track, ticket: PrepareTicket);

    /// Start or resume output of the prepared source
    fn start(&self) -> Result<()>;

    fn pause(&self);

    fn seek(&self, position_ms: u64);

    /// Output gain, 0.0-1.0
    fn set_volume(&self, level: f32);

    /// Drop the source and free the output
    fn release(&self);

    fn position_ms(&self) -> u64;

    fn is_playing(&self) -> bool;
}

/// How a transport callback applies to the current request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrepareOutcome {
    /// Callback belongs to a request that was superseded
    Stale,

    /// Current track is prepared
    Ready { play_when_ready: bool },

    /// Current track failed
    Failed {
        reason: String,
        play_when_ready: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Preparing,
    Prepared,
}

/// Bookkeeping around an [`AudioTransport`]
pub struct TransportEngine {
    transport: Arc<dyn AudioTransport>,
    fader: Fader,
    phase: Phase,
    serial: u64,
    current: Option<PrepareTicket>,
    play_when_ready: bool,
    seek_when_ready: Option<u64>,
    next_tick: Option<Instant>,
    progress_interval: Duration,
    duck_volume: f32,
    fade_out_step: f32,
    fade_in_step: f32,
}

impl TransportEngine {
    /// Wrap `transport` and attach the callback sink
    pub fn new(transport: Arc<dyn AudioTransport>, sink: TransportSink, config: &PlayerConfig) -> Self {
        transport.attach(sink);

        Self {
            transport,
            fader: Fader::new(config.fade_step_delay()),
            phase: Phase::Idle,
            serial: 0,
            current: None,
            play_when_ready: false,
            seek_when_ready: None,
            next_tick: None,
            progress_interval: config.progress_interval(),
            duck_volume: config.duck_volume,
            fade_out_step: config.fade_out_step,
            fade_in_step: config.fade_in_step,
        }
    }

    /// Begin preparing `track`, superseding any earlier request
    pub fn prepare(&mut self, track: &Track) -> PrepareTicket {
        self.serial += 1;
        let ticket = PrepareTicket::new(track.id, self.serial);

        self.phase = Phase::Preparing;
        self.current = Some(ticket);
        self.play_when_ready = false;
        self.seek_when_ready = None;
        self.next_tick = None;

        tracing::debug!("Preparing track {} (serial {})", track.id, ticket.serial);
        self.transport.prepare(track, ticket);
        ticket
    }

    /// Whether `ticket` is the request currently in effect
    pub fn is_current(&self, ticket: PrepareTicket) -> bool {
        self.current == Some(ticket)
    }

    /// Apply a prepared callback
    ///
    /// A pending seek is forwarded to the transport before returning.
    pub fn on_prepared(&mut self, ticket: PrepareTicket) -> PrepareOutcome {
        if !self.is_current(ticket) || self.phase != Phase::Preparing {
            return PrepareOutcome::Stale;
        }

        self.phase = Phase::Prepared;
        if let Some(position_ms) = self.seek_when_ready.take() {
            self.transport.seek(position_ms);
        }

        PrepareOutcome::Ready {
            play_when_ready: std::mem::take(&mut self.play_when_ready),
        }
    }

    /// Apply a failure callback
    pub fn on_failed(&mut self, ticket: PrepareTicket, reason: String) -> PrepareOutcome {
        if !self.is_current(ticket) {
            return PrepareOutcome::Stale;
        }

        let play_when_ready = std::mem::take(&mut self.play_when_ready);
        self.phase = Phase::Idle;
        self.current = None;
        self.seek_when_ready = None;
        self.next_tick = None;

        PrepareOutcome::Failed {
            reason,
            play_when_ready,
        }
    }

    /// Start playback as soon as the current request is prepared
    pub fn play_when_ready(&mut self) {
        self.play_when_ready = true;
    }

    /// Waiting for preparation with playback requested
    pub fn is_going_to_play(&self) -> bool {
        self.play_when_ready && self.phase == Phase::Preparing
    }

    /// Remember a seek to apply once prepared
    pub fn seek_when_ready(&mut self, position_ms: u64) {
        self.seek_when_ready = Some(position_ms);
    }

    /// Start output and schedule the first progress tick
    pub fn start(&mut self, now: Instant) -> Result<()> {
        self.transport.start()?;
        self.next_tick = Some(now + self.progress_interval);
        Ok(())
    }

    /// Pause output and drop any deferred start
    pub fn pause(&mut self) {
        self.play_when_ready = false;
        self.next_tick = None;
        if self.phase == Phase::Prepared {
            self.transport.pause();
        }
    }

    /// Seek now if prepared, otherwise once prepared
    pub fn seek(&mut self, position_ms: u64) {
        match self.phase {
            Phase::Prepared => self.transport.seek(position_ms),
            Phase::Preparing | Phase::Idle => self.seek_when_ready = Some(position_ms),
        }
    }

    /// Position of the current track
    ///
    /// Before preparation completes this is the pending seek target.
    pub fn position_ms(&self) -> u64 {
        match self.phase {
            Phase::Prepared => self.transport.position_ms(),
            Phase::Preparing | Phase::Idle => self.seek_when_ready.unwrap_or(0),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase == Phase::Prepared && self.transport.is_playing()
    }

    pub fn is_prepared(&self) -> bool {
        self.phase == Phase::Prepared
    }

    pub fn is_preparing(&self) -> bool {
        self.phase == Phase::Preparing
    }

    /// Fade down to the duck floor while playback continues
    pub fn duck(&mut self) {
        let ramp = FadeRamp::down(self.duck_volume, self.fade_out_step);
        self.fader.start(ramp, Arc::clone(&self.transport));
    }

    /// Fade back up to full volume
    pub fn unduck(&mut self) {
        let ramp = FadeRamp::up(self.fade_in_step);
        self.fader.start(ramp, Arc::clone(&self.transport));
    }

    /// Cancel fades and jump to full volume
    pub fn restore_volume(&self) {
        self.fader.set_level(FULL_VOLUME, self.transport.as_ref());
    }

    /// Last volume written by the fader
    pub fn volume(&self) -> f32 {
        self.fader.level()
    }

    /// When the next progress tick is due, if one is scheduled
    pub fn next_tick(&self) -> Option<Instant> {
        self.next_tick
    }

    /// Run a progress tick
    ///
    /// Reschedules itself and returns the position while the transport is
    /// still playing; otherwise the schedule lapses and `None` is returned.
    pub fn tick(&mut self, now: Instant) -> Option<u64> {
        self.next_tick?;

        if !self.is_playing() {
            self.next_tick = None;
            return None;
        }

        self.next_tick = Some(now + self.progress_interval);
        Some(self.transport.position_ms())
    }

    /// Stop fades and free the transport
    pub fn release(&mut self) {
        self.fader.shutdown();
        self.transport.release();
        self.phase = Phase::Idle;
        self.current = None;
        self.play_when_ready = false;
        self.seek_when_ready = None;
        self.next_tick = None;
    }
}
