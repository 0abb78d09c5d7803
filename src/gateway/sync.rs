use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{audio::analyzer::spectrum::FrequencyBands, error::StudioError};

/// Somewhere the playback row can be written.
#[allow(async_fn_in_trait)]
pub trait PlaybackStore {
    async fn update_playback(&self, update: &PlaybackUpdate) -> Result<(), StudioError>;
}

/// Everything the overlay renderer reads, as of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub position_seconds: f64,
    pub bands: FrequencyBands,
    pub current_track_id: Option<String>,
    pub is_playing: bool,
    pub volume: f32,
    pub is_muted: bool,
    pub is_looping: bool,
    pub is_shuffling: bool,
    pub is_ducking: bool,
    pub emergency_mode: String,
}

/// Body of the PATCH. Position and bands go out every time; the rest only
/// when it differs from the last successful write.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackUpdate {
    pub playback_position: f64,
    pub audio_bass: f32,
    pub audio_mid: f32,
    pub audio_high: f32,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_track_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_playing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_muted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_looping: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_shuffling: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_ducking: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emergency_mode: Option<String>,
}

fn changed<T: PartialEq + Clone>(prev: Option<&T>, now: &T) -> Option<T> {
    match prev {
        Some(p) if p == now => None,
        _ => Some(now.clone()),
    }
}

/// Pushes playback snapshots to the store, one write per call.
///
/// Nothing is buffered: a failed write is logged and forgotten, and the next
/// call sends whatever is current then. Warnings are logged once per failure
/// streak.
#[derive(Debug, Default)]
pub struct PlaybackSync {
    last_written: Option<PlaybackSnapshot>,
    failures: u64,
    writes: u64,
}

impl PlaybackSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consecutive_failures(&self) -> u64 {
        self.failures
    }

    pub fn writes(&self) -> u64 {
        self.writes
    }

    /// Forget the last write so the next one carries every field.
    pub fn reset(&mut self) {
        self.last_written = None;
    }

    pub fn update_for(&self, snap: &PlaybackSnapshot) -> PlaybackUpdate {
        let last = self.last_written.as_ref();
        PlaybackUpdate {
            playback_position: snap.position_seconds,
            audio_bass: snap.bands.bass,
            audio_mid: snap.bands.mid,
            audio_high: snap.bands.high,
            updated_at: Utc::now(),
            current_track_id: changed(last.map(|l| &l.current_track_id), &snap.current_track_id),
            is_playing: changed(last.map(|l| &l.is_playing), &snap.is_playing),
            volume: changed(last.map(|l| &l.volume), &snap.volume),
            is_muted: changed(last.map(|l| &l.is_muted), &snap.is_muted),
            is_looping: changed(last.map(|l| &l.is_looping), &snap.is_looping),
            is_shuffling: changed(last.map(|l| &l.is_shuffling), &snap.is_shuffling),
            is_ducking: changed(last.map(|l| &l.is_ducking), &snap.is_ducking),
            emergency_mode: changed(last.map(|l| &l.emergency_mode), &snap.emergency_mode),
        }
    }

    /// Write `snap`. Returns whether the write succeeded.
    pub async fn push<S: PlaybackStore>(&mut self, store: &S, snap: PlaybackSnapshot) -> bool {
        let update = self.update_for(&snap);
        match store.update_playback(&update).await {
            Ok(()) => {
                if self.failures > 0 {
                    log::info!("Playback sync recovered after {} failed writes", self.failures);
                }
                self.failures = 0;
                self.writes += 1;
                self.last_written = Some(snap);
                true
            }
            Err(e) => {
                if self.failures == 0 {
                    log::warn!("Playback sync write failed: {e}");
                } else {
                    log::debug!("Playback sync still failing ({}): {e}", self.failures + 1);
                }
                self.failures += 1;
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    use super::*;

    #[derive(Default)]
    struct FlakyStore {
        down: AtomicBool,
        written: Mutex<Vec<PlaybackUpdate>>,
    }

    impl PlaybackStore for FlakyStore {
        async fn update_playback(&self, update: &PlaybackUpdate) -> Result<(), StudioError> {
            if self.down.load(Ordering::SeqCst) {
                return Err(StudioError::Sync("connection refused".into()));
            }
            self.written.lock().unwrap().push(update.clone());
            Ok(())
        }
    }

    fn snap(position: f64, bass: f32) -> PlaybackSnapshot {
        PlaybackSnapshot {
            position_seconds: position,
            bands: FrequencyBands {
                bass,
                mid: 0.2,
                high: 0.1,
            },
            current_track_id: Some("t1".into()),
            is_playing: true,
            volume: 0.7,
            is_muted: false,
            is_looping: false,
            is_shuffling: false,
            is_ducking: false,
            emergency_mode: "normal".into(),
        }
    }

    #[tokio::test]
    async fn failed_tick_is_dropped_and_next_tick_sends_fresh_data() {
        let store = FlakyStore::default();
        let mut sync = PlaybackSync::new();

        store.down.store(true, Ordering::SeqCst);
        assert!(!sync.push(&store, snap(1.0, 0.9)).await);
        assert_eq!(sync.consecutive_failures(), 1);

        store.down.store(false, Ordering::SeqCst);
        assert!(sync.push(&store, snap(1.1, 0.4)).await);
        assert_eq!(sync.consecutive_failures(), 0);

        let written = store.written.lock().unwrap();
        assert_eq!(written.len(), 1, "no backlog of failed writes");
        assert_eq!(written[0].playback_position, 1.1);
        assert_eq!(written[0].audio_bass, 0.4);
        assert_eq!(written[0].is_playing, Some(true));
    }

    #[tokio::test]
    async fn only_changed_flags_are_resent() {
        let store = FlakyStore::default();
        let mut sync = PlaybackSync::new();
        sync.push(&store, snap(1.0, 0.5)).await;

        let mut next = snap(1.1, 0.5);
        next.is_ducking = true;
        sync.push(&store, next).await;

        let written = store.written.lock().unwrap();
        let second = &written[1];
        assert_eq!(second.is_ducking, Some(true));
        assert_eq!(second.is_playing, None);
        assert_eq!(second.current_track_id, None);

        let json = serde_json::to_value(second).unwrap();
        assert!(json.get("volume").is_none());
        assert!(json.get("audio_mid").is_some());
    }

    #[test]
    fn cleared_track_is_sent_as_null() {
        let mut sync = PlaybackSync::new();
        sync.last_written = Some(snap(0.0, 0.0));
        let mut s = snap(0.0, 0.0);
        s.current_track_id = None;
        let json = serde_json::to_value(sync.update_for(&s)).unwrap();
        assert!(json["current_track_id"].is_null());
        assert!(json.as_object().unwrap().contains_key("current_track_id"));
    }
}
