use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::Track;

/// Why an entry is in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueueReason {
    EnergyMatch,
    ManualLock,
    AutodjSuggestion,
    /// Added by the operator from the library
    Manual,
}

impl QueueReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EnergyMatch => "energy-match",
            Self::ManualLock => "manual-lock",
            Self::AutodjSuggestion => "autodj-suggestion",
            Self::Manual => "manual",
        }
    }

    /// Entries the Auto-DJ put there on its own.
    pub fn is_automatic(self) -> bool {
        matches!(self, Self::EnergyMatch | Self::AutodjSuggestion)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Identity for remove / reorder; unique for the lifetime of the queue
    pub id: u64,
    pub track: Track,
    pub reason: QueueReason,
    pub score: f64,
    pub enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub track: Track,
    pub played_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupPolicy {
    #[default]
    AllowDuplicates,
    ByTrackId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// How many played tracks History keeps
    pub history_window: usize,
    pub dedup: DedupPolicy,
    pub auto_advance: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            history_window: 20,
            dedup: DedupPolicy::AllowDuplicates,
            auto_advance: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStats {
    pub count: usize,
    pub total_duration_seconds: f64,
}

// ── PlayQueue ────────────────────────────────────────────────────────────────

/// Upcoming tracks plus the History of what was advanced past.
///
/// The single source of truth for queue contents: the Auto-DJ, manual locks
/// and operator edits all mutate this one list, and every mutation bumps
/// `version` so observers can tell when to re-read it.
#[derive(Debug)]
pub struct PlayQueue {
    entries: VecDeque<QueueEntry>,
    /// Most recent last
    history: VecDeque<HistoryEntry>,
    config: QueueConfig,
    next_id: u64,
    version: u64,
}

impl PlayQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            entries: VecDeque::new(),
            history: VecDeque::new(),
            config,
            next_id: 1,
            version: 0,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn auto_advance_enabled(&self) -> bool {
        self.config.auto_advance
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.config.auto_advance = enabled;
        self.version += 1;
    }

    pub fn set_dedup(&mut self, dedup: DedupPolicy) {
        self.config.dedup = dedup;
    }

    /// Append at the back. Returns the new entry id, or `None` when the dedup
    /// policy rejects a track that is already queued.
    pub fn add_to_queue(&mut self, track: Track, reason: QueueReason, score: f64) -> Option<u64> {
        if self.rejects(&track) {
            log::debug!("Queue already holds {}, not adding again", track.id);
            return None;
        }
        let entry = self.entry(track, reason, score);
        let id = entry.id;
        self.entries.push_back(entry);
        self.version += 1;
        Some(id)
    }

    /// Insert behind any manual locks already at the head of the queue and
    /// ahead of everything else.
    pub fn insert_priority(&mut self, track: Track, reason: QueueReason, score: f64) -> Option<u64> {
        if self.rejects(&track) {
            return None;
        }
        let at = self.lock_prefix_len();
        let entry = self.entry(track, reason, score);
        let id = entry.id;
        self.entries.insert(at, entry);
        self.version += 1;
        Some(id)
    }

    /// Re-tag an existing entry and move it to the priority position.
    pub fn promote(&mut self, entry_id: u64, reason: QueueReason) -> bool {
        let Some(idx) = self.index_of(entry_id) else {
            return false;
        };
        let Some(mut entry) = self.entries.remove(idx) else {
            return false;
        };
        entry.reason = reason;
        let at = self.lock_prefix_len();
        self.entries.insert(at, entry);
        self.version += 1;
        true
    }

    pub fn remove_from_queue(&mut self, entry_id: u64) -> Option<QueueEntry> {
        let idx = self.index_of(entry_id)?;
        let removed = self.entries.remove(idx);
        self.version += 1;
        removed
    }

    pub fn move_to_front(&mut self, entry_id: u64) -> bool {
        let Some(idx) = self.index_of(entry_id) else {
            return false;
        };
        if idx > 0 {
            if let Some(entry) = self.entries.remove(idx) {
                self.entries.push_front(entry);
            }
        }
        self.version += 1;
        true
    }

    /// Empty the queue; History is untouched.
    pub fn clear_queue(&mut self) {
        self.entries.clear();
        self.version += 1;
    }

    /// Pop the head entry and record `current` (the track that just finished)
    /// in History. `current` is recorded even when the queue is empty.
    pub fn move_to_next(&mut self, current: Option<Track>) -> Option<QueueEntry> {
        if let Some(track) = current {
            self.push_history(track);
        }
        let next = self.entries.pop_front();
        self.version += 1;
        next
    }

    pub fn push_history(&mut self, track: Track) {
        self.history.push_back(HistoryEntry {
            track,
            played_at: Utc::now(),
        });
        while self.history.len() > self.config.history_window.max(1) {
            self.history.pop_front();
        }
        self.version += 1;
    }

    pub fn next_track(&self) -> Option<&QueueEntry> {
        self.entries.front()
    }

    pub fn queue_stats(&self) -> QueueStats {
        QueueStats {
            count: self.entries.len(),
            total_duration_seconds: self
                .entries
                .iter()
                .map(|e| e.track.duration_seconds.max(0.0))
                .sum(),
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &QueueEntry> + '_ {
        self.entries.iter()
    }

    pub fn get(&self, entry_id: u64) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.id == entry_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> + '_ {
        self.history.iter()
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Track ids of the last `n` played tracks, most recent first.
    pub fn recent_track_ids(&self, n: usize) -> Vec<String> {
        self.history
            .iter()
            .rev()
            .take(n)
            .map(|h| h.track.id.clone())
            .collect()
    }

    pub fn contains_track(&self, track_id: &str) -> bool {
        self.entries.iter().any(|e| e.track.id == track_id)
    }

    pub fn find_track(&self, track_id: &str) -> Option<&QueueEntry> {
        self.entries.iter().find(|e| e.track.id == track_id)
    }

    fn entry(&mut self, track: Track, reason: QueueReason, score: f64) -> QueueEntry {
        let id = self.next_id;
        self.next_id += 1;
        QueueEntry {
            id,
            track,
            reason,
            score,
            enqueued_at: Utc::now(),
        }
    }

    fn rejects(&self, track: &Track) -> bool {
        self.config.dedup == DedupPolicy::ByTrackId && self.contains_track(&track.id)
    }

    fn index_of(&self, entry_id: u64) -> Option<usize> {
        self.entries.iter().position(|e| e.id == entry_id)
    }

    fn lock_prefix_len(&self) -> usize {
        self.entries
            .iter()
            .take_while(|e| e.reason == QueueReason::ManualLock)
            .count()
    }
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track(id: &str, secs: f64) -> Track {
        Track::new(id, id.to_uppercase(), format!("/music/{id}.mp3")).with_duration(secs)
    }

    fn ids(q: &PlayQueue) -> Vec<String> {
        q.entries().map(|e| e.track.id.clone()).collect()
    }

    #[test]
    fn advances_in_fifo_order() {
        let mut q = PlayQueue::default();
        q.add_to_queue(track("a", 10.0), QueueReason::Manual, 0.0);
        q.add_to_queue(track("b", 10.0), QueueReason::Manual, 0.0);
        assert_eq!(q.move_to_next(None).unwrap().track.id, "a");
        assert_eq!(q.move_to_next(None).unwrap().track.id, "b");
        assert!(q.move_to_next(None).is_none());
    }

    #[test]
    fn move_to_front_reorders() {
        let mut q = PlayQueue::default();
        q.add_to_queue(track("a", 10.0), QueueReason::Manual, 0.0);
        let b = q.add_to_queue(track("b", 10.0), QueueReason::Manual, 0.0).unwrap();
        assert!(q.move_to_front(b));
        assert_eq!(q.move_to_next(None).unwrap().track.id, "b");
        assert!(!q.move_to_front(999));
    }

    #[test]
    fn move_to_next_records_history() {
        let mut q = PlayQueue::default();
        q.add_to_queue(track("b", 10.0), QueueReason::Manual, 0.0);
        let next = q.move_to_next(Some(track("a", 10.0))).unwrap();
        assert_eq!(next.track.id, "b");
        assert_eq!(q.recent_track_ids(5), vec!["a"]);

        // Nothing queued: the finished track still lands in History
        assert!(q.move_to_next(Some(track("b", 10.0))).is_none());
        assert_eq!(q.recent_track_ids(5), vec!["b", "a"]);
    }

    #[test]
    fn history_window_is_bounded() {
        let mut q = PlayQueue::default();
        for i in 0..25 {
            q.push_history(track(&format!("t{i}"), 1.0));
        }
        assert_eq!(q.history().count(), 20);
        assert_eq!(q.history().next().unwrap().track.id, "t5");
        assert_eq!(q.recent_track_ids(2), vec!["t24", "t23"]);
    }

    #[test]
    fn remove_and_clear_leave_history_alone() {
        let mut q = PlayQueue::default();
        let a = q.add_to_queue(track("a", 10.0), QueueReason::Manual, 0.0).unwrap();
        q.add_to_queue(track("b", 10.0), QueueReason::Manual, 0.0);
        q.push_history(track("z", 1.0));
        assert_eq!(q.remove_from_queue(a).unwrap().track.id, "a");
        assert!(q.remove_from_queue(a).is_none());
        q.clear_queue();
        assert!(q.is_empty());
        assert_eq!(q.history().count(), 1);
    }

    #[test]
    fn duplicates_follow_policy() {
        let mut q = PlayQueue::default();
        assert!(q.add_to_queue(track("a", 1.0), QueueReason::Manual, 0.0).is_some());
        assert!(q.add_to_queue(track("a", 1.0), QueueReason::Manual, 0.0).is_some());
        assert_eq!(q.len(), 2);

        q.clear_queue();
        q.set_dedup(DedupPolicy::ByTrackId);
        assert!(q.add_to_queue(track("a", 1.0), QueueReason::Manual, 0.0).is_some());
        assert!(q.add_to_queue(track("a", 1.0), QueueReason::Manual, 0.0).is_none());
    }

    #[test]
    fn priority_inserts_land_behind_existing_locks() {
        let mut q = PlayQueue::default();
        q.add_to_queue(track("auto", 1.0), QueueReason::AutodjSuggestion, 0.5);
        q.insert_priority(track("lock1", 1.0), QueueReason::ManualLock, 0.0);
        q.insert_priority(track("lock2", 1.0), QueueReason::ManualLock, 0.0);
        assert_eq!(ids(&q), vec!["lock1", "lock2", "auto"]);

        let manual = q.add_to_queue(track("m", 1.0), QueueReason::Manual, 0.0).unwrap();
        assert!(q.promote(manual, QueueReason::ManualLock));
        assert_eq!(ids(&q), vec!["lock1", "lock2", "m", "auto"]);
        assert_eq!(q.get(manual).unwrap().reason, QueueReason::ManualLock);
    }

    #[test]
    fn stats_and_version() {
        let mut q = PlayQueue::default();
        let v0 = q.version();
        q.add_to_queue(track("a", 90.0), QueueReason::Manual, 0.0);
        q.add_to_queue(track("b", 30.5), QueueReason::Manual, 0.0);
        assert!(q.version() > v0);
        let stats = q.queue_stats();
        assert_eq!(stats.count, 2);
        assert!((stats.total_duration_seconds - 120.5).abs() < 1e-9);
        assert_eq!(q.next_track().unwrap().track.id, "a");
    }

    #[test]
    fn reasons_serialize_kebab_case() {
        assert_eq!(
            serde_json::to_string(&QueueReason::AutodjSuggestion).unwrap(),
            "\"autodj-suggestion\""
        );
        assert_eq!(QueueReason::ManualLock.as_str(), "manual-lock");
    }
}
