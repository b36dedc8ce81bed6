//! Shuffle for queue randomization
//!
//! Fisher-Yates over the active order, keeping the current track pinned at
//! the head so playback continues uninterrupted.

use crate::types::Track;
use rand::seq::SliceRandom;
use rand::Rng;

/// Shuffle `tracks` in place
///
/// When `current` points at a track, that track is removed first, the rest is
/// permuted, and it is reinserted at position 0.
pub fn shuffle_around<R: Rng + ?Sized>(tracks: &mut Vec<Track>, current: Option<usize>, rng: &mut R) {
    match current {
        Some(index) if index < tracks.len() => {
            let pinned = tracks.remove(index);
            tracks.shuffle(rng);
            tracks.insert(0, pinned);
        }
        _ => tracks.shuffle(rng),
    }
}
