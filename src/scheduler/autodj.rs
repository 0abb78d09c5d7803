/// Auto-DJ Suggestion Engine
///
/// Watches the music channel's progress and keeps the Play Queue fed: a
/// preview ranking at the suggest point, then one enqueue per track near its
/// end. Manual locks always sit ahead of anything the engine adds, and while
/// a lock is queued the engine stays out of the way.
use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};

use super::{
    queue::{PlayQueue, QueueReason},
    scoring::{self, PresetMode, ScoredTrack, ScoringContext},
};
use crate::{
    audio::PlayerState,
    db::{Catalog, Track},
    error::StudioError,
};

// ── Settings ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjSettings {
    pub enabled: bool,
    /// Desired energy 0.0 – 1.0
    pub energy_target: f32,
    pub stream_safe_only: bool,
    pub locked_track_id: Option<String>,
    pub preset_mode: PresetMode,
    /// How many History entries the recency penalty looks back over
    pub recency_limit: usize,
    /// Progress at which the preview ranking is computed
    pub suggest_at_progress: f64,
    /// Enqueue once this little of the current track is left...
    pub queue_lead_seconds: f64,
    /// ...or once progress passes this point, whichever comes first
    pub queue_at_progress: f64,
    pub prefer_tempo_match: bool,
}

impl Default for AutoDjSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            energy_target: 0.5,
            stream_safe_only: false,
            locked_track_id: None,
            preset_mode: PresetMode::Gradual,
            recency_limit: 10,
            suggest_at_progress: 0.5,
            queue_lead_seconds: 10.0,
            queue_at_progress: 0.9,
            prefer_tempo_match: true,
        }
    }
}

impl AutoDjSettings {
    /// Pull every field into range. `history_window` caps the recency lookback.
    pub fn sanitized(mut self, history_window: usize) -> Self {
        let unit = |v: f64, fallback: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        self.energy_target = if self.energy_target.is_finite() {
            self.energy_target.clamp(0.0, 1.0)
        } else {
            0.5
        };
        self.recency_limit = self.recency_limit.clamp(1, history_window.max(1));
        self.suggest_at_progress = unit(self.suggest_at_progress, 0.5);
        self.queue_at_progress = unit(self.queue_at_progress, 0.9);
        if !(self.queue_lead_seconds.is_finite() && self.queue_lead_seconds >= 0.0) {
            self.queue_lead_seconds = 10.0;
        }
        self
    }

    pub fn merge(&mut self, patch: AutoDjSettingsPatch) {
        if let Some(v) = patch.enabled {
            self.enabled = v;
        }
        if let Some(v) = patch.energy_target {
            self.energy_target = v;
        }
        if let Some(v) = patch.stream_safe_only {
            self.stream_safe_only = v;
        }
        if let Some(v) = patch.locked_track_id {
            self.locked_track_id = v;
        }
        if let Some(v) = patch.preset_mode {
            self.preset_mode = v;
        }
        if let Some(v) = patch.recency_limit {
            self.recency_limit = v;
        }
        if let Some(v) = patch.suggest_at_progress {
            self.suggest_at_progress = v;
        }
        if let Some(v) = patch.queue_lead_seconds {
            self.queue_lead_seconds = v;
        }
        if let Some(v) = patch.queue_at_progress {
            self.queue_at_progress = v;
        }
        if let Some(v) = patch.prefer_tempo_match {
            self.prefer_tempo_match = v;
        }
    }
}

/// Partial settings update; absent fields are left alone. `locked_track_id:
/// null` clears the lock.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoDjSettingsPatch {
    pub enabled: Option<bool>,
    pub energy_target: Option<f32>,
    pub stream_safe_only: Option<bool>,
    #[serde(deserialize_with = "present_or_null", skip_serializing_if = "Option::is_none")]
    pub locked_track_id: Option<Option<String>>,
    pub preset_mode: Option<PresetMode>,
    pub recency_limit: Option<usize>,
    pub suggest_at_progress: Option<f64>,
    pub queue_lead_seconds: Option<f64>,
    pub queue_at_progress: Option<f64>,
    pub prefer_tempo_match: Option<bool>,
}

fn present_or_null<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Option<String>>, D::Error> {
    Option::<String>::deserialize(d).map(Some)
}

// ── Engine ───────────────────────────────────────────────────────────────────

/// The suggestion the engine last put in the queue.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub entry_id: u64,
    pub track_id: String,
    pub score: f64,
    pub reason: QueueReason,
    pub accepted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AutoDjEvent {
    /// Best candidate at the suggest point; nothing queued yet
    Preview { track_id: String, score: f64 },
    Enqueued {
        entry_id: u64,
        track_id: String,
        reason: QueueReason,
        score: f64,
    },
    LockQueued { entry_id: u64, track_id: String },
    LockReleased { track_id: String },
    NoCandidates,
}

/// Per-track bookkeeping, reset whenever the current track changes.
#[derive(Debug, Default)]
struct TrackCycle {
    track_id: Option<String>,
    previewed: bool,
    queued: bool,
    skipped: HashSet<String>,
}

pub struct AutoDj {
    settings: AutoDjSettings,
    history_window: usize,
    preview: Vec<ScoredTrack>,
    pending: Option<Suggestion>,
    cycle: TrackCycle,
}

impl AutoDj {
    pub fn new(settings: AutoDjSettings, history_window: usize) -> Self {
        Self {
            settings: settings.sanitized(history_window),
            history_window,
            preview: Vec::new(),
            pending: None,
            cycle: TrackCycle::default(),
        }
    }

    pub fn settings(&self) -> &AutoDjSettings {
        &self.settings
    }

    pub fn update_settings(&mut self, patch: AutoDjSettingsPatch) {
        let mut next = self.settings.clone();
        next.merge(patch);
        let next = next.sanitized(self.history_window);
        if next.stream_safe_only != self.settings.stream_safe_only || next.preset_mode != self.settings.preset_mode {
            self.preview.clear();
        }
        log::debug!("Auto-DJ settings: {next:?}");
        self.settings = next;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        if self.settings.enabled != enabled {
            log::info!("Auto-DJ {}", if enabled { "enabled" } else { "disabled" });
        }
        self.settings.enabled = enabled;
    }

    /// Best candidate from the last preview ranking.
    pub fn preview(&self) -> Option<&ScoredTrack> {
        self.preview.first()
    }

    pub fn pending(&self) -> Option<&Suggestion> {
        self.pending.as_ref()
    }

    /// One scoring pass against the music channel.
    pub fn tick(&mut self, player: &PlayerState, catalog: &Catalog, queue: &mut PlayQueue) -> Vec<AutoDjEvent> {
        let mut events = Vec::new();
        self.forget_departed(queue);
        if !self.settings.enabled {
            return events;
        }
        let Some(current) = player.current_track.as_ref() else {
            return events;
        };
        if self.cycle.track_id.as_deref() != Some(current.id.as_str()) {
            self.cycle = TrackCycle {
                track_id: Some(current.id.clone()),
                ..TrackCycle::default()
            };
            self.preview.clear();
        }

        if let Some(event) = self.enforce_lock(current, catalog, queue) {
            events.push(event);
        }
        if has_lock(queue) || player.duration_seconds <= 0.0 {
            return events;
        }

        let progress = player.progress();
        if !self.cycle.previewed && progress >= self.settings.suggest_at_progress {
            self.cycle.previewed = true;
            self.preview = self.rank(Some(current), catalog, queue);
            match self.preview.first() {
                Some(top) => events.push(AutoDjEvent::Preview {
                    track_id: top.track.id.clone(),
                    score: top.score.total,
                }),
                None => log::debug!("Auto-DJ preview: no candidates"),
            }
        }

        let due = progress >= self.settings.queue_at_progress
            || player.remaining_seconds() <= self.settings.queue_lead_seconds;
        if due && !self.cycle.queued {
            self.cycle.queued = true;
            if self.pending.is_some() || !queue.is_empty() {
                log::debug!("Auto-DJ: next track already queued");
            } else {
                events.push(self.enqueue_best(Some(current), catalog, queue, QueueReason::AutodjSuggestion));
            }
        }
        events
    }

    /// Keep the pending suggestion queued. With nothing pending yet, queue the
    /// previewed pick now.
    pub fn accept_suggestion(&mut self, queue: &mut PlayQueue) -> Option<String> {
        if let Some(pending) = self.pending.as_mut() {
            pending.accepted = true;
            return Some(pending.track_id.clone());
        }
        let top = self.preview.first()?.clone();
        let entry_id = queue.add_to_queue(top.track.clone(), QueueReason::AutodjSuggestion, top.score.total)?;
        self.cycle.queued = true;
        self.pending = Some(Suggestion {
            entry_id,
            track_id: top.track.id.clone(),
            score: top.score.total,
            reason: QueueReason::AutodjSuggestion,
            accepted: true,
        });
        log::info!("Auto-DJ suggestion accepted: {}", top.track.display_name());
        Some(top.track.id)
    }

    /// Drop the current suggestion and offer the next best one instead. The
    /// skipped track is not offered again while the current track plays.
    pub fn skip_suggestion(
        &mut self,
        player: &PlayerState,
        catalog: &Catalog,
        queue: &mut PlayQueue,
    ) -> Option<AutoDjEvent> {
        if let Some(pending) = self.pending.take() {
            queue.remove_from_queue(pending.entry_id);
            self.preview.retain(|s| s.track.id != pending.track_id);
            self.cycle.skipped.insert(pending.track_id);
            return Some(self.enqueue_best(player.current_track.as_ref(), catalog, queue, pending.reason));
        }
        if self.preview.is_empty() {
            return None;
        }
        let skipped = self.preview.remove(0);
        self.cycle.skipped.insert(skipped.track.id);
        self.preview.first().map(|top| AutoDjEvent::Preview {
            track_id: top.track.id.clone(),
            score: top.score.total,
        })
    }

    /// Force `track_id` to play next, ahead of every automatic entry. An entry
    /// already in the queue is promoted rather than duplicated.
    pub fn lock_custom_track(
        &mut self,
        track_id: &str,
        catalog: &Catalog,
        queue: &mut PlayQueue,
    ) -> Result<u64, StudioError> {
        let track = catalog
            .get(track_id)
            .ok_or_else(|| StudioError::UnknownTrack(track_id.to_string()))?;
        let entry_id = match queue.find_track(track_id).map(|e| e.id) {
            Some(id) => {
                queue.promote(id, QueueReason::ManualLock);
                id
            }
            None => queue
                .insert_priority(track.clone(), QueueReason::ManualLock, 0.0)
                .ok_or_else(|| StudioError::UnknownTrack(track_id.to_string()))?,
        };
        self.settings.locked_track_id = Some(track_id.to_string());
        if self.pending.as_ref().is_some_and(|p| p.entry_id == entry_id) {
            self.pending = None;
        }
        log::info!("Locked next track: {}", track.display_name());
        Ok(entry_id)
    }

    /// Release the lock. The locked entry stays in the queue.
    pub fn unlock_custom_track(&mut self) -> Option<String> {
        self.settings.locked_track_id.take()
    }

    /// Aim at a new energy level. Values above 1 are read on the catalog's
    /// 1–10 scale. An unaccepted pending suggestion is replaced by the best
    /// match for the new target.
    pub fn request_energy(
        &mut self,
        level: f32,
        player: &PlayerState,
        catalog: &Catalog,
        queue: &mut PlayQueue,
    ) -> Option<AutoDjEvent> {
        let level = if level > 1.0 { level / 10.0 } else { level };
        self.settings.energy_target = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.5 };
        self.settings.preset_mode = PresetMode::Custom;
        log::info!("Auto-DJ energy target {:.2}", self.settings.energy_target);

        if self.cycle.previewed {
            self.preview = self.rank(player.current_track.as_ref(), catalog, queue);
        }
        if self.pending.as_ref().map_or(true, |p| p.accepted) {
            return None;
        }
        let pending = self.pending.take()?;
        queue.remove_from_queue(pending.entry_id);
        Some(self.enqueue_best(player.current_track.as_ref(), catalog, queue, QueueReason::EnergyMatch))
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn forget_departed(&mut self, queue: &PlayQueue) {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| queue.get(p.entry_id).is_none())
        {
            self.pending = None;
        }
    }

    fn enforce_lock(&mut self, current: &Track, catalog: &Catalog, queue: &mut PlayQueue) -> Option<AutoDjEvent> {
        let locked = self.settings.locked_track_id.clone()?;
        if current.id == locked {
            self.settings.locked_track_id = None;
            log::info!("Locked track {locked} is on air; lock released");
            return Some(AutoDjEvent::LockReleased { track_id: locked });
        }
        if let Some(entry) = queue.find_track(&locked) {
            if entry.reason != QueueReason::ManualLock {
                let id = entry.id;
                queue.promote(id, QueueReason::ManualLock);
            }
            return None;
        }
        match catalog.get(&locked) {
            Some(track) => {
                let entry_id = queue.insert_priority(track.clone(), QueueReason::ManualLock, 0.0)?;
                Some(AutoDjEvent::LockQueued {
                    entry_id,
                    track_id: locked,
                })
            }
            None => {
                log::warn!("Locked track {locked} is not in the catalog; lock released");
                self.settings.locked_track_id = None;
                None
            }
        }
    }

    fn rank(&self, current: Option<&Track>, catalog: &Catalog, queue: &PlayQueue) -> Vec<ScoredTrack> {
        // Whole window: plays beyond the lookback still score 80, not 100
        let recent = queue.recent_track_ids(queue.history_len());
        let ctx = ScoringContext {
            current,
            recent: &recent,
            recency_limit: self.settings.recency_limit,
            energy_target: self.settings.energy_target,
            mode: self.settings.preset_mode,
            prefer_tempo_match: self.settings.prefer_tempo_match,
        };
        let current_id = current.map(|t| t.id.as_str());
        scoring::rank(
            catalog.candidates(self.settings.stream_safe_only).filter(|t| {
                Some(t.id.as_str()) != current_id
                    && !t.is_blocked()
                    && !queue.contains_track(&t.id)
                    && !self.cycle.skipped.contains(&t.id)
            }),
            &ctx,
        )
    }

    /// Best candidate outside the recency lookback; when every candidate was
    /// played recently, the best one regardless.
    fn enqueue_best(
        &mut self,
        current: Option<&Track>,
        catalog: &Catalog,
        queue: &mut PlayQueue,
        reason: QueueReason,
    ) -> AutoDjEvent {
        let ranked = self.rank(current, catalog, queue);
        let recent = queue.recent_track_ids(self.settings.recency_limit);
        let pick = ranked
            .iter()
            .find(|s| !recent.contains(&s.track.id))
            .or_else(|| ranked.first());
        let Some(pick) = pick else {
            log::debug!("Auto-DJ: no candidates to queue");
            return AutoDjEvent::NoCandidates;
        };
        let Some(entry_id) = queue.add_to_queue(pick.track.clone(), reason, pick.score.total) else {
            return AutoDjEvent::NoCandidates;
        };
        log::info!(
            "Auto-DJ queued {} ({}, score {:.1})",
            pick.track.display_name(),
            reason.as_str(),
            pick.score.total
        );
        self.pending = Some(Suggestion {
            entry_id,
            track_id: pick.track.id.clone(),
            score: pick.score.total,
            reason,
            accepted: false,
        });
        AutoDjEvent::Enqueued {
            entry_id,
            track_id: pick.track.id.clone(),
            reason,
            score: pick.score.total,
        }
    }
}

fn has_lock(queue: &PlayQueue) -> bool {
    queue.entries().any(|e| e.reason == QueueReason::ManualLock)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::dsp::EffectsConfig;

    fn track(id: &str, energy: f32) -> Track {
        Track::new(id, id.to_uppercase(), format!("/music/{id}.mp3"))
            .with_duration(100.0)
            .with_energy(energy)
    }

    fn on_air(track: &Track, position: f64) -> PlayerState {
        PlayerState {
            current_track: Some(track.clone()),
            is_playing: true,
            is_paused: false,
            playback_position_seconds: position,
            duration_seconds: track.duration_seconds,
            volume: 0.7,
            is_muted: false,
            is_looping: false,
            is_shuffling: false,
            is_ducking: false,
            duck_level: 0.0,
            applied_effects: EffectsConfig::default(),
        }
    }

    fn engine() -> AutoDj {
        AutoDj::new(
            AutoDjSettings {
                enabled: true,
                ..AutoDjSettings::default()
            },
            20,
        )
    }

    fn library() -> (Track, Catalog) {
        let current = track("cur", 5.0);
        let catalog = Catalog::new(vec![
            current.clone(),
            track("up", 6.0),
            track("same", 5.0),
            track("jump", 10.0),
        ]);
        (current, catalog)
    }

    fn queued_ids(q: &PlayQueue) -> Vec<String> {
        q.entries().map(|e| e.track.id.clone()).collect()
    }

    #[test]
    fn previews_at_half_and_queues_once_near_end() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();

        assert!(dj.tick(&on_air(&current, 40.0), &catalog, &mut q).is_empty());

        let events = dj.tick(&on_air(&current, 50.0), &catalog, &mut q);
        assert!(matches!(&events[..], [AutoDjEvent::Preview { track_id, .. }] if track_id == "up"));
        assert!(q.is_empty());

        let events = dj.tick(&on_air(&current, 90.0), &catalog, &mut q);
        assert!(matches!(&events[..], [AutoDjEvent::Enqueued { track_id, reason: QueueReason::AutodjSuggestion, .. }] if track_id == "up"));
        assert!(dj.tick(&on_air(&current, 95.0), &catalog, &mut q).is_empty());
        assert_eq!(queued_ids(&q), vec!["up"]);
    }

    #[test]
    fn lead_time_triggers_before_progress_threshold() {
        let current = track("cur", 5.0).with_duration(60.0);
        let catalog = Catalog::new(vec![current.clone(), track("up", 6.0)]);
        let mut dj = engine();
        let mut q = PlayQueue::default();
        dj.tick(&on_air(&current, 51.0), &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["up"]);
    }

    #[test]
    fn empty_catalog_queues_nothing() {
        let current = track("cur", 5.0);
        let mut dj = engine();
        let mut q = PlayQueue::default();
        let events = dj.tick(&on_air(&current, 95.0), &Catalog::default(), &mut q);
        assert_eq!(events, vec![AutoDjEvent::NoCandidates]);
        assert!(q.is_empty());
    }

    #[test]
    fn exhausted_history_still_picks_something() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        for id in ["up", "same", "jump"] {
            q.push_history(track(id, 5.0));
        }
        dj.tick(&on_air(&current, 95.0), &catalog, &mut q);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn history_lookback_is_respected_when_possible() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        q.push_history(track("up", 6.0));
        dj.tick(&on_air(&current, 95.0), &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["same"]);
    }

    #[test]
    fn plays_beyond_lookback_score_eighty() {
        let (current, catalog) = library();
        let dj = engine();
        let mut q = PlayQueue::default();
        q.push_history(track("up", 6.0));
        for i in 0..11 {
            q.push_history(track(&format!("filler{i}"), 5.0));
        }

        let ranked = dj.rank(Some(&current), &catalog, &q);
        let recency = |id: &str| {
            ranked
                .iter()
                .find(|s| s.track.id == id)
                .map(|s| s.score.recency)
                .unwrap()
        };
        assert_eq!(recency("up"), 80.0);
        assert_eq!(recency("same"), 100.0);
    }

    #[test]
    fn manual_lock_is_never_preceded() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        dj.lock_custom_track("jump", &catalog, &mut q).unwrap();

        for pos in [50.0, 90.0, 95.0, 99.0] {
            dj.tick(&on_air(&current, pos), &catalog, &mut q);
        }
        assert_eq!(queued_ids(&q), vec!["jump"]);
        assert_eq!(q.next_track().unwrap().reason, QueueReason::ManualLock);
    }

    #[test]
    fn lock_jumps_ahead_of_existing_suggestion() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        dj.tick(&on_air(&current, 95.0), &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["up"]);

        dj.lock_custom_track("jump", &catalog, &mut q).unwrap();
        assert_eq!(queued_ids(&q), vec!["jump", "up"]);

        // Locking a track that is already queued promotes it instead
        let up_entry = dj.lock_custom_track("up", &catalog, &mut q).unwrap();
        assert_eq!(queued_ids(&q), vec!["jump", "up"]);
        assert_eq!(q.get(up_entry).unwrap().reason, QueueReason::ManualLock);
        assert!(dj.pending().is_none());
    }

    #[test]
    fn lock_is_requeued_and_released_on_air() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        let id = dj.lock_custom_track("jump", &catalog, &mut q).unwrap();
        q.remove_from_queue(id);

        let events = dj.tick(&on_air(&current, 10.0), &catalog, &mut q);
        assert!(matches!(&events[..], [AutoDjEvent::LockQueued { track_id, .. }] if track_id == "jump"));

        let next = q.move_to_next(Some(current.clone())).unwrap();
        let events = dj.tick(&on_air(&next.track, 1.0), &catalog, &mut q);
        assert_eq!(events, vec![AutoDjEvent::LockReleased { track_id: "jump".into() }]);
        assert_eq!(dj.settings().locked_track_id, None);
    }

    #[test]
    fn unknown_lock_is_an_error() {
        let (_, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        assert!(matches!(
            dj.lock_custom_track("nope", &catalog, &mut q),
            Err(StudioError::UnknownTrack(_))
        ));
    }

    #[test]
    fn skip_replaces_suggestion_with_next_best() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        let state = on_air(&current, 95.0);
        dj.tick(&state, &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["up"]);

        let event = dj.skip_suggestion(&state, &catalog, &mut q);
        assert!(matches!(event, Some(AutoDjEvent::Enqueued { ref track_id, .. }) if track_id == "same"));
        assert_eq!(queued_ids(&q), vec!["same"]);

        dj.skip_suggestion(&state, &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["jump"]);
    }

    #[test]
    fn accept_keeps_entry_and_blocks_rescoring() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        let state = on_air(&current, 50.0);
        dj.tick(&state, &catalog, &mut q);
        assert_eq!(dj.accept_suggestion(&mut q).as_deref(), Some("up"));
        assert_eq!(queued_ids(&q), vec!["up"]);

        assert!(dj.request_energy(1.0, &state, &catalog, &mut q).is_none());
        assert_eq!(queued_ids(&q), vec!["up"]);
    }

    #[test]
    fn energy_request_rescores_pending_suggestion() {
        let (current, catalog) = library();
        let mut dj = engine();
        let mut q = PlayQueue::default();
        let state = on_air(&current, 95.0);
        dj.tick(&state, &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["up"]);

        let event = dj.request_energy(10.0, &state, &catalog, &mut q);
        assert!(matches!(
            event,
            Some(AutoDjEvent::Enqueued { ref track_id, reason: QueueReason::EnergyMatch, .. }) if track_id == "jump"
        ));
        assert_eq!(queued_ids(&q), vec!["jump"]);
        assert_eq!(dj.settings().preset_mode, PresetMode::Custom);
        assert_eq!(dj.settings().energy_target, 1.0);
    }

    #[test]
    fn disabled_engine_does_nothing() {
        let (current, catalog) = library();
        let mut dj = AutoDj::new(AutoDjSettings::default(), 20);
        let mut q = PlayQueue::default();
        assert!(dj.tick(&on_air(&current, 99.0), &catalog, &mut q).is_empty());
        assert!(q.is_empty());
    }

    #[test]
    fn stream_safe_mode_filters_candidates() {
        let current = track("cur", 5.0);
        let safe = track("safe", 9.0).with_license(crate::db::LicenseType::RoyaltyFree);
        let catalog = Catalog::new(vec![current.clone(), track("up", 6.0), safe]);
        let mut dj = engine();
        dj.update_settings(AutoDjSettingsPatch {
            stream_safe_only: Some(true),
            ..AutoDjSettingsPatch::default()
        });
        let mut q = PlayQueue::default();
        dj.tick(&on_air(&current, 95.0), &catalog, &mut q);
        assert_eq!(queued_ids(&q), vec!["safe"]);
    }

    #[test]
    fn patch_merges_and_clears_lock() {
        let mut s = AutoDjSettings {
            locked_track_id: Some("x".into()),
            ..AutoDjSettings::default()
        };
        let patch: AutoDjSettingsPatch =
            serde_json::from_str(r#"{"energy_target":0.8,"locked_track_id":null,"preset_mode":"peak_valley"}"#).unwrap();
        s.merge(patch);
        assert_eq!(s.energy_target, 0.8);
        assert_eq!(s.locked_track_id, None);
        assert_eq!(s.preset_mode, PresetMode::PeakValley);

        let untouched: AutoDjSettingsPatch = serde_json::from_str(r#"{"enabled":true}"#).unwrap();
        assert_eq!(untouched.locked_track_id, None);
    }

    #[test]
    fn recency_limit_is_capped_by_history_window() {
        let s = AutoDjSettings {
            recency_limit: 50,
            ..AutoDjSettings::default()
        }
        .sanitized(20);
        assert_eq!(s.recency_limit, 20);
    }
}
