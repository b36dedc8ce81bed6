//! Volume fades
//!
//! Ducking and unducking step the transport volume toward a target on a
//! background thread. Every fade belongs to a generation; starting a new fade
//! or cancelling bumps the generation and any older fade stops at its next
//! step. The shared lock is only held for a single step, never across the
//! inter-step delay.

use crate::transport::AudioTransport;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Full output volume
pub const FULL_VOLUME: f32 = 1.0;

/// Levels closer than this to the target count as arrived
const LEVEL_TOLERANCE: f32 = 1e-3;

/// Direction and granularity of a single fade
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRamp {
    /// Level the fade settles at
    pub target: f32,

    /// Absolute change per step
    pub step: f32,
}

impl FadeRamp {
    /// Fade down to `floor`
    pub fn down(floor: f32, step: f32) -> Self {
        Self {
            target: floor.clamp(0.0, FULL_VOLUME),
            step: step.abs(),
        }
    }

    /// Fade up to full volume
    pub fn up(step: f32) -> Self {
        Self {
            target: FULL_VOLUME,
            step: step.abs(),
        }
    }

    /// Level after one step from `level`, or `None` once the target is reached
    ///
    /// The last step lands exactly on the target.
    pub fn step_from(&self, level: f32) -> Option<f32> {
        if (level - self.target).abs() <= LEVEL_TOLERANCE || self.step <= 0.0 {
            return None;
        }

        let next = if level > self.target {
            (level - self.step).max(self.target)
        } else {
            (level + self.step).min(self.target)
        };

        if (next - self.target).abs() <= LEVEL_TOLERANCE {
            Some(self.target)
        } else {
            Some(next)
        }
    }
}

#[derive(Debug)]
struct FadeState {
    generation: u64,
    level: f32,
}

/// Runs cancellable fades against a transport
pub struct Fader {
    state: Arc<Mutex<FadeState>>,
    step_delay: Duration,
    workers: Vec<JoinHandle<()>>,
}

impl Fader {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(FadeState {
                generation: 0,
                level: FULL_VOLUME,
            })),
            step_delay,
            workers: Vec::new(),
        }
    }

    /// Start a fade, cancelling any fade still in flight
    pub fn start(&mut self, ramp: FadeRamp, transport: Arc<dyn AudioTransport>) {
        self.workers.retain(|worker| !worker.is_finished());

        let generation = {
            let mut state = lock(&self.state);
            state.generation += 1;
            state.generation
        };

        let state = Arc::clone(&self.state);
        let fallback = Arc::clone(&transport);
        let delay = self.step_delay;

        let spawned = thread::Builder::new()
            .name("cadence-fade".to_string())
            .spawn(move || run_fade(&state, generation, ramp, transport.as_ref(), delay));

        match spawned {
            Ok(worker) => self.workers.push(worker),
            Err(e) => {
                tracing::warn!("Failed to spawn fade thread, jumping to target: {}", e);
                let mut state = lock(&self.state);
                if state.generation == generation {
                    state.level = ramp.target;
                    fallback.set_volume(ramp.target);
                }
            }
        }
    }

    /// Stop the fade in flight, leaving the volume where it is
    pub fn cancel(&self) {
        lock(&self.state).generation += 1;
    }

    /// Cancel any fade and set the volume immediately
    pub fn set_level(&self, level: f32, transport: &dyn AudioTransport) {
        let mut state = lock(&self.state);
        state.generation += 1;
        state.level = level.clamp(0.0, FULL_VOLUME);
        transport.set_volume(state.level);
    }

    /// Last level written to the transport
    pub fn level(&self) -> f32 {
        lock(&self.state).level
    }

    /// Cancel and wait for every fade thread to exit
    pub fn shutdown(&mut self) {
        self.cancel();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::warn!("Fade thread panicked");
            }
        }
    }
}

impl Drop for Fader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_fade(
    state: &Mutex<FadeState>,
    generation: u64,
    ramp: FadeRamp,
    transport: &dyn AudioTransport,
    delay: Duration,
) {
    loop {
        {
            let mut state = lock(state);
            if state.generation != generation {
                return;
            }
            match ramp.step_from(state.level) {
                Some(level) => {
                    state.level = level;
                    transport.set_volume(level);
                }
                None => return,
            }
        }
        thread::sleep(delay);
    }
}

fn lock(state: &Mutex<FadeState>) -> MutexGuard<'_, FadeState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}
