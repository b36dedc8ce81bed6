//! Persistence adapter
//!
//! Saves the queue and the playback modes to a key-value store so playback
//! can resume after a restart. Only track ids are stored; tracks are resolved
//! again through the catalog on restore, which silently drops anything that
//! was deleted in the meantime.

use crate::error::{PlaybackError, Result};
use crate::platform::TrackCatalog;
use crate::queue::Queue;
use crate::types::{PlaybackState, RepeatMode, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Durable byte store
pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    fn remove(&mut self, key: &str) -> Result<()>;
}

/// In-memory store; clones share the same entries
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, Vec<u8>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries().get(key).cloned())
    }

    fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.entries().insert(key.to_string(), value);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<()> {
        self.entries().remove(key);
        Ok(())
    }
}

/// Stored record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub playlist_name: String,
    pub original_track_ids: Vec<TrackId>,
    pub active_track_ids: Vec<TrackId>,
    pub current_track_id: TrackId,
    pub repeat_mode: RepeatMode,
    pub shuffle_enabled: bool,
    pub bookmark_ms: u64,
}

impl Snapshot {
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| PlaybackError::PersistenceCorrupt(e.to_string()))
    }
}

/// Queue and state rebuilt from a snapshot
#[derive(Debug, Clone)]
pub struct Restored {
    pub queue: Queue,
    pub state: PlaybackState,
    pub playlist_name: String,
}

/// Capture the queue and state
///
/// Returns `None` for an empty queue; the stored record is then cleared
/// rather than overwritten with an empty list.
pub fn snapshot(queue: &Queue, state: &PlaybackState, playlist_name: &str) -> Option<Snapshot> {
    let current = queue.current()?;

    Some(Snapshot {
        playlist_name: playlist_name.to_string(),
        original_track_ids: queue.original().iter().map(|track| track.id).collect(),
        active_track_ids: queue.active().iter().map(|track| track.id).collect(),
        current_track_id: current.id,
        repeat_mode: state.repeat_mode,
        shuffle_enabled: state.shuffle_enabled,
        bookmark_ms: state.bookmark_ms,
    })
}

/// Rebuild a queue and state from `snapshot`
///
/// Ids the catalog no longer knows are dropped. Returns `None` when nothing
/// resolves. Active ids are matched against the resolved tracks; leftovers
/// are appended so the active order stays a permutation of the original.
/// When the current track is gone, playback restarts at index 0 from the
/// beginning.
pub fn restore(snapshot: &Snapshot, catalog: &dyn TrackCatalog) -> Option<Restored> {
    let original: Vec<Track> = snapshot
        .original_track_ids
        .iter()
        .filter_map(|&id| {
            let track = catalog.lookup_by_id(id);
            if track.is_none() {
                debug!(
                    error = %PlaybackError::SourceUnavailable(id),
                    "Dropping track from the restored queue"
                );
            }
            track
        })
        .collect();

    if original.is_empty() {
        return None;
    }

    let mut pool: Vec<Option<Track>> = original.iter().cloned().map(Some).collect();
    let mut active = Vec::with_capacity(original.len());
    for id in &snapshot.active_track_ids {
        let slot = pool
            .iter_mut()
            .find(|slot| slot.as_ref().is_some_and(|track| track.id == *id));
        if let Some(track) = slot.and_then(Option::take) {
            active.push(track);
        }
    }
    active.extend(pool.into_iter().flatten());

    let (current, bookmark_ms) = match active
        .iter()
        .position(|track| track.id == snapshot.current_track_id)
    {
        Some(index) => (index, snapshot.bookmark_ms),
        None => (0, 0),
    };

    let queue = Queue::from_parts(original, active, current);
    let state = PlaybackState {
        repeat_mode: snapshot.repeat_mode,
        shuffle_enabled: snapshot.shuffle_enabled,
        bookmark_ms,
        current_track_id: queue.current().map(|track| track.id),
        ..PlaybackState::default()
    };

    Some(Restored {
        queue,
        state,
        playlist_name: snapshot.playlist_name.clone(),
    })
}

/// Seek target for a restored bookmark
pub fn resume_position(bookmark_ms: u64, rewind_ms: u64) -> u64 {
    bookmark_ms.saturating_sub(rewind_ms)
}

/// Store-backed persistence used by the dispatcher
pub struct Persistence {
    store: Box<dyn KeyValueStore>,
    key: String,
    bookmark_interval: Duration,
    last_bookmark_save: Option<Instant>,
}

impl Persistence {
    pub fn new(store: Box<dyn KeyValueStore>, key: impl Into<String>, bookmark_interval: Duration) -> Self {
        Self {
            store,
            key: key.into(),
            bookmark_interval,
            last_bookmark_save: None,
        }
    }

    /// Write the snapshot, or clear the record when there is none
    ///
    /// Failures are logged and otherwise ignored.
    pub fn save(&mut self, snapshot: Option<&Snapshot>) {
        let result = match snapshot {
            Some(snapshot) => snapshot
                .encode()
                .and_then(|bytes| self.store.put(&self.key, bytes)),
            None => self.store.remove(&self.key),
        };

        if let Err(e) = result {
            warn!(error = %e, "Failed to persist playback state");
        }
    }

    /// Read and decode the stored snapshot
    pub fn load_snapshot(&self) -> Result<Option<Snapshot>> {
        match self.store.get(&self.key)? {
            Some(bytes) => Snapshot::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Restore through `catalog`
    ///
    /// A corrupt or unreadable record counts as nothing to restore.
    pub fn load(&self, catalog: &dyn TrackCatalog) -> Option<Restored> {
        match self.load_snapshot() {
            Ok(Some(snapshot)) => restore(&snapshot, catalog),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Ignoring stored playback state");
                None
            }
        }
    }

    /// Whether enough time passed since the last bookmark save
    ///
    /// Marks `now` as the last save when it returns true.
    pub fn bookmark_due(&mut self, now: Instant) -> bool {
        let due = match self.last_bookmark_save {
            Some(last) => now.saturating_duration_since(last) >= self.bookmark_interval,
            None => true,
        };
        if due {
            self.last_bookmark_save = Some(now);
        }
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Catalog(Vec<Track>);

    impl TrackCatalog for Catalog {
        fn lookup_by_id(&self, id: TrackId) -> Option<Track> {
            self.0.iter().find(|track| track.id == id).cloned()
        }
        fn is_favorite(&self, _id: TrackId) -> bool {
            false
        }
        fn toggle_favorite(&mut self, _id: TrackId) {}
        fn record_recently_played(&mut self, _id: TrackId) {}
    }

    fn tracks(ids: &[i64]) -> Vec<Track> {
        ids.iter().map(|&id| Track::new(id, format!("Track {id}"))).collect()
    }

    fn ids(tracks: &[Track]) -> Vec<i64> {
        tracks.iter().map(|track| track.id.get()).collect()
    }

    fn sample_snapshot() -> Snapshot {
        Snapshot {
            playlist_name: "Evening".to_string(),
            original_track_ids: [1, 2, 3, 4].map(TrackId::new).to_vec(),
            active_track_ids: [3, 1, 4, 2].map(TrackId::new).to_vec(),
            current_track_id: TrackId::new(4),
            repeat_mode: RepeatMode::All,
            shuffle_enabled: true,
            bookmark_ms: 42_000,
        }
    }

    #[test]
    fn snapshot_of_empty_queue_is_none() {
        assert!(snapshot(&Queue::new(), &PlaybackState::default(), "x").is_none());
    }

    #[test]
    fn snapshot_uses_camel_case_fields() {
        let json = String::from_utf8(sample_snapshot().encode().unwrap()).unwrap();
        assert!(json.contains("\"playlistName\":\"Evening\""));
        assert!(json.contains("\"originalTrackIds\":[1,2,3,4]"));
        assert!(json.contains("\"activeTrackIds\":[3,1,4,2]"));
        assert!(json.contains("\"currentTrackId\":4"));
        assert!(json.contains("\"repeatMode\":\"all\""));
        assert!(json.contains("\"shuffleEnabled\":true"));
        assert!(json.contains("\"bookmarkMs\":42000"));
    }

    #[test]
    fn restore_keeps_order_and_position() {
        let catalog = Catalog(tracks(&[1, 2, 3, 4]));
        let restored = restore(&sample_snapshot(), &catalog).unwrap();

        assert_eq!(ids(restored.queue.original()), vec![1, 2, 3, 4]);
        assert_eq!(ids(restored.queue.active()), vec![3, 1, 4, 2]);
        assert_eq!(restored.queue.current_index(), Some(2));
        assert_eq!(restored.state.current_track_id, Some(TrackId::new(4)));
        assert_eq!(restored.state.bookmark_ms, 42_000);
        assert_eq!(restored.playlist_name, "Evening");
    }

    #[test]
    fn restore_drops_deleted_tracks() {
        let catalog = Catalog(tracks(&[1, 3, 4]));
        let restored = restore(&sample_snapshot(), &catalog).unwrap();

        assert_eq!(ids(restored.queue.original()), vec![1, 3, 4]);
        assert_eq!(ids(restored.queue.active()), vec![3, 1, 4]);
        assert_eq!(restored.queue.current().unwrap().id, TrackId::new(4));
    }

    #[test]
    fn deleted_current_track_resets_position_and_bookmark() {
        let catalog = Catalog(tracks(&[1, 2, 3]));
        let restored = restore(&sample_snapshot(), &catalog).unwrap();

        assert_eq!(restored.queue.current_index(), Some(0));
        assert_eq!(restored.state.bookmark_ms, 0);
        assert_eq!(restored.state.current_track_id, Some(TrackId::new(3)));
    }

    #[test]
    fn nothing_resolving_restores_nothing() {
        let catalog = Catalog(Vec::new());
        assert!(restore(&sample_snapshot(), &catalog).is_none());
    }

    #[test]
    fn unmatched_active_ids_keep_a_permutation() {
        let mut snapshot = sample_snapshot();
        snapshot.active_track_ids = [9, 2].map(TrackId::new).to_vec();
        let catalog = Catalog(tracks(&[1, 2, 3, 4]));

        let restored = restore(&snapshot, &catalog).unwrap();

        assert_eq!(ids(restored.queue.active()), vec![2, 1, 3, 4]);
    }

    #[test]
    fn corrupt_record_restores_nothing() {
        let mut store = MemoryStore::new();
        store.put("key", b"{not json".to_vec()).unwrap();
        let persistence = Persistence::new(Box::new(store), "key", Duration::from_secs(5));

        assert!(matches!(
            persistence.load_snapshot(),
            Err(PlaybackError::PersistenceCorrupt(_))
        ));
        assert!(persistence.load(&Catalog(tracks(&[1]))).is_none());
    }

    #[test]
    fn saving_none_clears_the_record() {
        let store = MemoryStore::new();
        let mut persistence = Persistence::new(Box::new(store.clone()), "key", Duration::from_secs(5));

        persistence.save(Some(&sample_snapshot()));
        assert!(store.contains("key"));

        persistence.save(None);
        assert!(!store.contains("key"));
    }

    #[test]
    fn bookmark_saves_are_throttled() {
        let mut persistence = Persistence::new(Box::new(MemoryStore::new()), "key", Duration::from_secs(5));
        let start = Instant::now();

        assert!(persistence.bookmark_due(start));
        assert!(!persistence.bookmark_due(start + Duration::from_secs(4)));
        assert!(persistence.bookmark_due(start + Duration::from_secs(5)));
    }

    #[test]
    fn resume_position_rewinds_without_underflow() {
        assert_eq!(resume_position(42_000, 5_000), 37_000);
        assert_eq!(resume_position(3_000, 5_000), 0);
    }
}
