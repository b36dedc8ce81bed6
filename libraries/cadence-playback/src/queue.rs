//! Queue manager
//!
//! Holds the loaded tracks in two orders over the same multiset:
//! - Original: load order
//! - Active: playback order (equal to original unless shuffled)
//!
//! ```text
//! original: A B C D E
//! active:   C A E B D      (shuffled, C was current when shuffle was enabled)
//!           ^ current_index = 0
//! ```
//!
//! Callers only ever get read-only views; the dispatcher is the sole writer.

use crate::error::{PlaybackError, Result};
use crate::shuffle::shuffle_around;
use crate::types::{RepeatMode, Track, TrackId};
use rand::Rng;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
pub struct Queue {
    /// Load order
    original: Vec<Track>,

    /// Playback order, always a permutation of `original`
    active: Vec<Track>,

    /// Index into `active`; `None` exactly when `active` is empty
    current: Option<usize>,
}

impl Queue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from `tracks`, starting at `start_index`
    ///
    /// Rejects an empty track list and an out-of-range start index.
    pub fn load(tracks: Vec<Track>, start_index: usize) -> Result<Self> {
        if tracks.is_empty() {
            return Err(PlaybackError::QueueEmpty);
        }
        if start_index >= tracks.len() {
            return Err(PlaybackError::IndexOutOfBounds(start_index));
        }

        Ok(Self {
            active: tracks.clone(),
            original: tracks,
            current: Some(start_index),
        })
    }

    /// Reassemble a queue from restored parts
    ///
    /// `current` is clamped into `active`.
    pub(crate) fn from_parts(original: Vec<Track>, active: Vec<Track>, current: usize) -> Self {
        let current = if active.is_empty() {
            None
        } else {
            Some(current.min(active.len() - 1))
        };

        Self {
            original,
            active,
            current,
        }
    }

    /// Enable or disable shuffle using the thread-local RNG
    pub fn set_shuffle(&mut self, enable: bool) {
        self.set_shuffle_with(enable, &mut rand::thread_rng());
    }

    /// Enable or disable shuffle with an explicit RNG
    ///
    /// Enabling pins the current track at `active[0]` and resets the index to 0.
    /// Disabling restores the original order and relocates the current track by
    /// id (first match, or 0 when it is no longer present).
    pub fn set_shuffle_with<R: Rng + ?Sized>(&mut self, enable: bool, rng: &mut R) {
        if enable {
            shuffle_around(&mut self.active, self.current, rng);
            if self.current.is_some() {
                self.current = Some(0);
            }
            return;
        }

        let current_id = self.current().map(|track| track.id);
        self.active.clone_from(&self.original);

        self.current = if self.active.is_empty() {
            None
        } else {
            let index = current_id
                .and_then(|id| self.original.iter().position(|track| track.id == id))
                .unwrap_or(0);
            Some(index)
        };
    }

    /// Index that follows the current one under `repeat`
    ///
    /// `force` marks an explicit skip by the user rather than a natural end.
    /// Returns `None` only for an empty queue.
    pub fn next_index(&self, repeat: RepeatMode, force: bool) -> Option<usize> {
        let current = self.current?;
        let last = self.active.len() - 1;
        let wrapped = if current >= last { 0 } else { current + 1 };

        Some(match repeat {
            RepeatMode::All => wrapped,
            RepeatMode::One if force => wrapped,
            RepeatMode::One => current,
            RepeatMode::Off => (current + 1).min(last),
        })
    }

    /// Index that precedes the current one under `repeat`
    ///
    /// Mirrors [`Queue::next_index`]; `Off` clamps at 0.
    pub fn previous_index(&self, repeat: RepeatMode, force: bool) -> Option<usize> {
        let current = self.current?;
        let last = self.active.len() - 1;
        let wrapped = if current == 0 { last } else { current - 1 };

        Some(match repeat {
            RepeatMode::All => wrapped,
            RepeatMode::One if force => wrapped,
            RepeatMode::One => current,
            RepeatMode::Off => current.saturating_sub(1),
        })
    }

    /// Move the current position
    pub fn set_current(&mut self, index: usize) -> Result<&Track> {
        if index >= self.active.len() {
            return Err(PlaybackError::IndexOutOfBounds(index));
        }
        self.current = Some(index);
        Ok(&self.active[index])
    }

    /// Find a track by exact id
    pub fn lookup(&self, id: TrackId) -> Option<&Track> {
        self.active.iter().find(|track| track.id == id)
    }

    pub fn current(&self) -> Option<&Track> {
        self.current.and_then(|index| self.active.get(index))
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current
    }

    /// Track at a position of the active order
    pub fn track_at(&self, index: usize) -> Option<&Track> {
        self.active.get(index)
    }

    /// Whether the current track is the last of the active order
    pub fn is_last(&self) -> bool {
        matches!(self.current, Some(index) if index + 1 == self.active.len())
    }

    /// Load order
    pub fn original(&self) -> &[Track] {
        &self.original
    }

    /// Playback order
    pub fn active(&self) -> &[Track] {
        &self.active
    }

    /// Tracks from the current one to the end of the active order
    pub fn upcoming(&self) -> &[Track] {
        match self.current {
            Some(index) => &self.active[index..],
            None => &[],
        }
    }

    /// Total duration of the tracks after `from_index`
    pub fn remaining_duration(&self, from_index: usize) -> Duration {
        self.active
            .iter()
            .skip(from_index.saturating_add(1))
            .map(|track| track.duration)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashMap;

    fn create_test_track(id: i64, title: &str) -> Track {
        Track::new(id, title).with_duration(Duration::from_secs(60 * id as u64))
    }

    /// A (1), B (2), C (3)
    fn abc(start: usize) -> Queue {
        Queue::load(
            vec![
                create_test_track(1, "A"),
                create_test_track(2, "B"),
                create_test_track(3, "C"),
            ],
            start,
        )
        .unwrap()
    }

    fn id_counts(tracks: &[Track]) -> HashMap<TrackId, usize> {
        let mut counts = HashMap::new();
        for track in tracks {
            *counts.entry(track.id).or_insert(0) += 1;
        }
        counts
    }

    #[test]
    fn create_empty_queue() {
        let queue = Queue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert!(queue.current_index().is_none());
        assert!(queue.next_index(RepeatMode::All, true).is_none());
    }

    #[test]
    fn load_rejects_invalid_input() {
        assert!(matches!(
            Queue::load(Vec::new(), 0),
            Err(PlaybackError::QueueEmpty)
        ));
        assert!(matches!(
            Queue::load(vec![create_test_track(1, "A")], 1),
            Err(PlaybackError::IndexOutOfBounds(1))
        ));
    }

    #[test]
    fn load_sets_both_orders() {
        let queue = abc(1);
        assert_eq!(queue.current_index(), Some(1));
        assert_eq!(queue.current().unwrap().title, "B");
        assert_eq!(queue.original(), queue.active());
    }

    #[test]
    fn repeat_all_wraps_past_the_end() {
        let mut queue = abc(0);

        let next = queue.next_index(RepeatMode::All, false).unwrap();
        assert_eq!(next, 1);
        queue.set_current(next).unwrap();

        let next = queue.next_index(RepeatMode::All, false).unwrap();
        queue.set_current(next).unwrap();
        let next = queue.next_index(RepeatMode::All, false).unwrap();
        assert_eq!(next, 0);
        assert_eq!(queue.track_at(next).unwrap().title, "A");
    }

    #[test]
    fn repeat_off_clamps_at_the_end() {
        let queue = abc(2);
        assert_eq!(queue.next_index(RepeatMode::Off, false), Some(2));
        assert_eq!(queue.next_index(RepeatMode::Off, true), Some(2));
    }

    #[test]
    fn repeat_off_clamps_at_the_start() {
        let queue = abc(0);
        assert_eq!(queue.previous_index(RepeatMode::Off, false), Some(0));
        assert_eq!(queue.previous_index(RepeatMode::Off, true), Some(0));
    }

    #[test]
    fn repeat_one_stays_unless_forced() {
        let queue = abc(2);
        assert_eq!(queue.next_index(RepeatMode::One, false), Some(2));
        assert_eq!(queue.next_index(RepeatMode::One, true), Some(0));
        assert_eq!(queue.previous_index(RepeatMode::One, false), Some(2));
        assert_eq!(queue.previous_index(RepeatMode::One, true), Some(1));
    }

    #[test]
    fn previous_wraps_under_repeat_all() {
        let queue = abc(0);
        assert_eq!(queue.previous_index(RepeatMode::All, false), Some(2));
    }

    #[test]
    fn enabling_shuffle_pins_current_track() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut queue = abc(1);

        queue.set_shuffle_with(true, &mut rng);

        assert_eq!(queue.current_index(), Some(0));
        assert_eq!(queue.active()[0].id, TrackId::new(2));
        assert_eq!(id_counts(queue.active()), id_counts(queue.original()));
    }

    #[test]
    fn disabling_shuffle_relocates_current_track() {
        let mut rng = StdRng::seed_from_u64(9);
        let mut queue = abc(2);
        queue.set_shuffle_with(true, &mut rng);

        // Move somewhere else in the shuffled order first
        queue.set_current(1).unwrap();
        let playing = queue.current().unwrap().id;

        queue.set_shuffle_with(false, &mut rng);

        assert_eq!(queue.active(), queue.original());
        assert_eq!(queue.current().unwrap().id, playing);
    }

    #[test]
    fn disabling_shuffle_on_missing_track_defaults_to_zero() {
        let original = vec![create_test_track(1, "A"), create_test_track(2, "B")];
        let active = vec![create_test_track(9, "Gone"), create_test_track(1, "A")];
        let mut queue = Queue::from_parts(original, active, 0);

        queue.set_shuffle(false);

        assert_eq!(queue.current_index(), Some(0));
    }

    #[test]
    fn lookup_by_id() {
        let queue = abc(0);
        assert_eq!(queue.lookup(TrackId::new(3)).unwrap().title, "C");
        assert!(queue.lookup(TrackId::new(4)).is_none());
    }

    #[test]
    fn remaining_duration_counts_tracks_after_index() {
        let queue = abc(0);
        // B (2 min) + C (3 min)
        assert_eq!(queue.remaining_duration(0), Duration::from_secs(300));
        assert_eq!(queue.remaining_duration(2), Duration::ZERO);
    }

    #[test]
    fn upcoming_starts_at_current() {
        let queue = abc(1);
        let titles: Vec<&str> = queue.upcoming().iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["B", "C"]);
    }

    #[test]
    fn set_current_rejects_out_of_range() {
        let mut queue = abc(0);
        assert!(queue.set_current(3).is_err());
        assert_eq!(queue.current_index(), Some(0));
    }
}
