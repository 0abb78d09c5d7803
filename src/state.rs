/// `state.rs` — The studio: both playable channels and everything steering them
///
/// `Studio` is the single owner of the music and jingle players, the ducking
/// coordinator, the Play Queue, the Auto-DJ and the scheduler. The driver feeds
/// it commands and calls `tick()`; it answers with events and, on sync ticks,
/// a playback snapshot to push to the backend. Nothing here returns an error
/// to the caller: failures are logged, handed to the `on_error` callback and
/// emitted as `StudioEvent::Error`.
use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    audio::{
        analyzer::{
            analyze_frequency_bands, beatgrid, AnalysisNode, FrequencyBands, QuantizeSettings,
        },
        ducking::{DuckReason, DuckTrigger, DuckingCoordinator},
        dsp::{EffectPreset, EffectsConfig},
        fade::FadeCurve,
        mic_input::{MicActivityDetector, MicInput},
        player::{AudioPlayer, PlayerConfig, PlayerEvent, PlayerState},
        recorder::{RecordingSummary, VoiceRecorder, RECORDING_TIMEOUT_TASK},
        ChannelId, PlaybackBackend,
    },
    config::StudioConfig,
    db::{Catalog, Track},
    error::StudioError,
    gateway::PlaybackSnapshot,
    scheduler::{
        autodj::Suggestion,
        clock::{TASK_AUTODJ, TASK_POSITION, TASK_SYNC},
        queue::{HistoryEntry, QueueStats},
        AutoDj, AutoDjEvent, AutoDjSettings, AutoDjSettingsPatch, PlayQueue, QueueEntry, QueueReason,
        Scheduler,
    },
};

/// Music volume while "be right back" is showing.
const BRB_VOLUME: f32 = 0.15;
const EMERGENCY_FADE: Duration = Duration::from_secs(2);

// ── Emergency ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyMode {
    #[default]
    Normal,
    /// Both channels muted instantly
    Panic,
    /// Music down to a bed under the BRB screen
    Brb,
    /// Music faded out over two seconds
    FadeOut,
}

impl EmergencyMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Panic => "panic",
            Self::Brb => "brb",
            Self::FadeOut => "fade_out",
        }
    }
}

/// What `recover()` puts back; captured when leaving `Normal`.
#[derive(Debug, Clone)]
struct EmergencySnapshot {
    music_volume: f32,
    jingle_volume: f32,
    music_muted: bool,
    jingle_muted: bool,
    music_track_id: Option<String>,
    music_playing: bool,
    music_position: f64,
}

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioEvent {
    PlaybackStarted {
        channel: ChannelId,
        track_id: String,
    },
    TrackEnded {
        channel: ChannelId,
        track_id: String,
    },
    QueueAdvanced {
        entry_id: u64,
        track_id: String,
        reason: QueueReason,
    },
    /// Music ended with auto-advance on and nothing queued
    QueueExhausted,
    DuckChanged {
        ducked: bool,
        reasons: Vec<DuckReason>,
    },
    AutoDj(AutoDjEvent),
    EmergencyChanged {
        mode: EmergencyMode,
    },
    PlayableLimitReached {
        track_id: String,
        limit_seconds: f64,
    },
    FadeOutComplete {
        channel: ChannelId,
        track_id: String,
    },
    RecordingStarted {
        path: PathBuf,
    },
    RecordingStopped(RecordingSummary),
    RecordingAutoStopped(RecordingSummary),
    Error {
        message: String,
    },
}

/// Result of one `tick()`.
#[derive(Debug, Default)]
pub struct TickOutput {
    pub events: Vec<StudioEvent>,
    /// Present when the sync task fired (or playback just went idle)
    pub sync: Option<PlaybackSnapshot>,
}

/// Everything a dashboard needs to redraw, in one serializable value.
#[derive(Debug, Clone, Serialize)]
pub struct StudioStatus {
    pub music: PlayerState,
    pub jingle: PlayerState,
    pub queue: Vec<QueueEntry>,
    pub queue_stats: QueueStats,
    pub history: Vec<HistoryEntry>,
    pub auto_advance: bool,
    pub autodj: AutoDjSettings,
    pub pending_suggestion: Option<Suggestion>,
    pub preview_track_id: Option<String>,
    pub duck_reasons: Vec<DuckReason>,
    pub emergency_mode: EmergencyMode,
    pub recording: bool,
    pub bands: FrequencyBands,
}

type ErrorCallback = Box<dyn FnMut(&StudioError) + Send>;

// ── Studio ───────────────────────────────────────────────────────────────────

pub struct Studio<B: PlaybackBackend + Clone> {
    backend: B,
    music: AudioPlayer<B>,
    jingle: AudioPlayer<B>,
    ducking: DuckingCoordinator,
    queue: PlayQueue,
    autodj: AutoDj,
    catalog: Catalog,
    scheduler: Scheduler,
    analyser: Option<Box<dyn AnalysisNode + Send>>,
    bands: FrequencyBands,
    recorder: VoiceRecorder,
    mic: Option<MicInput>,
    mic_detector: MicActivityDetector,
    emergency: EmergencyMode,
    emergency_restore: Option<EmergencySnapshot>,
    /// The jingle channel currently holds a SoundDrop duck
    jingle_duck: bool,
    was_active: bool,
    last_position_at: Duration,
    events: Vec<StudioEvent>,
    on_error: Option<ErrorCallback>,
}

impl<B: PlaybackBackend + Clone> Studio<B> {
    pub fn new(config: StudioConfig, backend: B) -> Self {
        let music_config = PlayerConfig {
            duck_ramp_ms: config.ducking.ramp_ms,
            ..config.music.clone()
        };
        let mut scheduler = Scheduler::new();
        let every = |ms: u64| Duration::from_millis(ms);
        scheduler.schedule_every(TASK_POSITION, every(config.scheduler.position_interval_ms));
        scheduler.schedule_every(TASK_SYNC, every(config.scheduler.sync_interval_ms));
        scheduler.schedule_every(TASK_AUTODJ, every(config.scheduler.autodj_interval_ms));
        // Sync and Auto-DJ only run while something plays
        scheduler.set_enabled(TASK_SYNC, false);
        scheduler.set_enabled(TASK_AUTODJ, false);

        Self {
            music: AudioPlayer::new(ChannelId::Music, backend.clone(), &music_config),
            jingle: AudioPlayer::new(ChannelId::Jingle, backend.clone(), &config.jingle),
            backend,
            ducking: DuckingCoordinator::new(config.ducking.clone()),
            queue: PlayQueue::new(config.queue.clone()),
            autodj: AutoDj::new(config.autodj.clone(), config.queue.history_window),
            catalog: Catalog::default(),
            scheduler,
            analyser: None,
            bands: FrequencyBands::default(),
            recorder: VoiceRecorder::new(config.recording.clone()),
            mic: None,
            mic_detector: MicActivityDetector::new(&config.mic),
            emergency: EmergencyMode::Normal,
            emergency_restore: None,
            jingle_duck: false,
            was_active: false,
            last_position_at: Duration::ZERO,
            events: Vec::new(),
            on_error: None,
        }
    }

    /// Live analysis node for the music channel.
    pub fn set_analyser(&mut self, node: Box<dyn AnalysisNode + Send>) {
        self.analyser = Some(node);
    }

    /// Microphone used for mic-activity ducking and voice recording.
    pub fn attach_mic(&mut self, mic: MicInput) {
        self.mic = Some(mic);
    }

    pub fn on_error(&mut self, callback: impl FnMut(&StudioError) + Send + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    pub fn set_catalog(&mut self, tracks: Vec<Track>) {
        self.catalog.set_tracks(tracks);
        log::info!("Catalog loaded: {} tracks", self.catalog.len());
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn player(&self, channel: ChannelId) -> &AudioPlayer<B> {
        match channel {
            ChannelId::Music => &self.music,
            ChannelId::Jingle => &self.jingle,
        }
    }

    fn player_mut(&mut self, channel: ChannelId) -> &mut AudioPlayer<B> {
        match channel {
            ChannelId::Music => &mut self.music,
            ChannelId::Jingle => &mut self.jingle,
        }
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn autodj(&self) -> &AutoDj {
        &self.autodj
    }

    pub fn ducking(&self) -> &DuckingCoordinator {
        &self.ducking
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn emergency_mode(&self) -> EmergencyMode {
        self.emergency
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Anything audible on either channel.
    pub fn is_active(&self) -> bool {
        self.music.state().is_playing || self.jingle.state().is_playing
    }

    pub fn take_events(&mut self) -> Vec<StudioEvent> {
        std::mem::take(&mut self.events)
    }

    // ── Transport ─────────────────────────────────────────────────────────

    pub fn load_track(&mut self, channel: ChannelId, track_id: &str) -> bool {
        let Some(track) = self.lookup(track_id) else {
            return false;
        };
        let result = self.player_mut(channel).load_track(track);
        self.sync_jingle_duck();
        self.absorb(result)
    }

    pub fn play(&mut self, channel: ChannelId) -> bool {
        let was_playing = self.player(channel).state().is_playing;
        let result = self.player_mut(channel).play();
        let ok = self.absorb(result);
        if ok && !was_playing {
            self.note_started(channel);
        }
        self.sync_jingle_duck();
        ok
    }

    pub fn pause(&mut self, channel: ChannelId) {
        self.player_mut(channel).pause();
        self.sync_jingle_duck();
    }

    pub fn stop(&mut self, channel: ChannelId) {
        self.player_mut(channel).stop();
        self.sync_jingle_duck();
    }

    pub fn seek(&mut self, channel: ChannelId, seconds: f64) -> bool {
        let result = self.player_mut(channel).seek(seconds);
        self.absorb(result)
    }

    pub fn set_volume(&mut self, channel: ChannelId, volume: f32) {
        self.player_mut(channel).change_volume(volume);
    }

    pub fn toggle_mute(&mut self, channel: ChannelId) -> bool {
        self.player_mut(channel).toggle_mute()
    }

    pub fn toggle_loop(&mut self, channel: ChannelId) -> bool {
        self.player_mut(channel).toggle_loop()
    }

    pub fn toggle_shuffle(&mut self, channel: ChannelId) -> bool {
        self.player_mut(channel).toggle_shuffle()
    }

    pub fn fade_out(&mut self, channel: ChannelId, duration: Duration, curve: FadeCurve) -> bool {
        self.player_mut(channel).start_fade_out(duration, curve)
    }

    pub fn apply_effects(&mut self, channel: ChannelId, config: EffectsConfig) {
        self.player_mut(channel).apply_effects(config);
    }

    pub fn apply_preset(&mut self, channel: ChannelId, preset: EffectPreset) {
        log::info!("[{channel}] Effects preset {preset:?}");
        self.player_mut(channel).apply_effects(preset.config());
    }

    // ── Cues & loops ──────────────────────────────────────────────────────

    pub fn set_hot_cue(&mut self, channel: ChannelId, slot: usize, seconds: f64) -> Option<f64> {
        self.player_mut(channel).set_hot_cue(slot, seconds)
    }

    pub fn clear_hot_cue(&mut self, channel: ChannelId, slot: usize) {
        self.player_mut(channel).clear_hot_cue(slot);
    }

    pub fn jump_to_hot_cue(&mut self, channel: ChannelId, slot: usize) -> bool {
        let result = self.player_mut(channel).jump_to_hot_cue(slot);
        self.absorb(result)
    }

    pub fn set_loop_in(&mut self, channel: ChannelId, seconds: f64) -> Option<f64> {
        self.player_mut(channel).set_loop_in(seconds)
    }

    pub fn set_loop_out(&mut self, channel: ChannelId, seconds: f64) -> Option<f64> {
        self.player_mut(channel).set_loop_out(seconds)
    }

    pub fn exit_loop(&mut self, channel: ChannelId) {
        self.player_mut(channel).exit_loop();
    }

    pub fn set_quantize(&mut self, channel: ChannelId, settings: QuantizeSettings) {
        self.player_mut(channel).set_quantize(settings);
    }

    /// Estimate a beat grid for the loaded track from its audio. Only used
    /// when the catalog has no BPM for it.
    pub fn analyze_beat_grid(&mut self, channel: ChannelId) -> bool {
        let Some(track) = self.player(channel).current_track().cloned() else {
            self.report(StudioError::NoTrackLoaded);
            return false;
        };
        if track.beat_grid().is_some() {
            return true;
        }
        match beatgrid::analyze_file(std::path::Path::new(&track.file_location)) {
            Ok(Some(estimate)) => {
                log::info!(
                    "[{channel}] Estimated {:.1} BPM for '{}' (confidence {:.2})",
                    estimate.grid.bpm,
                    track.display_name(),
                    estimate.confidence
                );
                self.player_mut(channel).set_beat_grid(Some(estimate.grid));
                true
            }
            Ok(None) => {
                log::info!("[{channel}] '{}' too short for tempo analysis", track.display_name());
                false
            }
            Err(e) => {
                self.report(StudioError::load(track.file_location, e));
                false
            }
        }
    }

    // ── Jingles & ducking ─────────────────────────────────────────────────

    /// Fire a jingle; music stays ducked until it ends or is stopped.
    pub fn play_jingle(&mut self, track_id: &str) -> bool {
        self.load_track(ChannelId::Jingle, track_id) && self.play(ChannelId::Jingle)
    }

    /// Apply a TTS / sound-drop / mic start or end edge to the music channel.
    pub fn duck_trigger(&mut self, trigger: DuckTrigger) {
        if self.ducking.handle(trigger, &mut self.music) {
            self.note_duck_changed();
        }
    }

    pub fn toggle_manual_duck(&mut self) -> bool {
        let on = self.ducking.toggle_manual(&mut self.music);
        self.note_duck_changed();
        on
    }

    /// Re-enabling re-arms sources that are still live (a playing jingle, an
    /// active mic); their starts were dropped while ducking was off.
    pub fn set_ducking_enabled(&mut self, enabled: bool) {
        let was_enabled = self.ducking.config().enabled;
        let was = self.ducking.is_ducked();
        self.ducking.set_enabled(enabled, &mut self.music);
        if enabled && !was_enabled {
            let live = [
                (self.jingle_duck, DuckReason::SoundDrop),
                (self.mic_detector.is_active(), DuckReason::MicActive),
            ];
            for (_, reason) in live.into_iter().filter(|(on, _)| *on) {
                self.ducking.handle(DuckTrigger::Start(reason), &mut self.music);
            }
        }
        if was != self.ducking.is_ducked() {
            self.note_duck_changed();
        }
    }

    pub fn set_duck_level(&mut self, level: f32) {
        self.ducking.set_level(level, &mut self.music);
    }

    /// Hold a SoundDrop duck exactly while the jingle channel plays.
    fn sync_jingle_duck(&mut self) {
        let playing = self.jingle.state().is_playing;
        if playing == self.jingle_duck {
            return;
        }
        self.jingle_duck = playing;
        let trigger = if playing {
            DuckTrigger::Start(DuckReason::SoundDrop)
        } else {
            DuckTrigger::End(DuckReason::SoundDrop)
        };
        self.duck_trigger(trigger);
    }

    fn note_duck_changed(&mut self) {
        self.events.push(StudioEvent::DuckChanged {
            ducked: self.ducking.is_ducked(),
            reasons: self.ducking.active_reasons(),
        });
    }

    // ── Queue ─────────────────────────────────────────────────────────────

    pub fn add_to_queue(&mut self, track_id: &str) -> Option<u64> {
        let track = self.lookup(track_id)?;
        let id = self.queue.add_to_queue(track, QueueReason::Manual, 0.0);
        if id.is_none() {
            log::info!("{track_id} is already queued");
        }
        id
    }

    pub fn remove_from_queue(&mut self, entry_id: u64) -> bool {
        self.queue.remove_from_queue(entry_id).is_some()
    }

    pub fn move_to_front(&mut self, entry_id: u64) -> bool {
        self.queue.move_to_front(entry_id)
    }

    pub fn clear_queue(&mut self) {
        self.queue.clear_queue();
    }

    pub fn set_auto_advance(&mut self, enabled: bool) {
        self.queue.set_auto_advance(enabled);
    }

    /// Skip to the front of the queue now; the current track goes to History.
    pub fn play_next(&mut self) -> bool {
        let current = self.music.current_track().cloned();
        match self.queue.move_to_next(current) {
            Some(entry) => self.start_entry(entry),
            None => {
                log::info!("play_next: queue is empty");
                false
            }
        }
    }

    fn start_entry(&mut self, entry: QueueEntry) -> bool {
        let QueueEntry { id, track, reason, .. } = entry;
        let track_id = track.id.clone();
        log::info!("Advancing to '{}' ({})", track.display_name(), reason.as_str());
        self.events.push(StudioEvent::QueueAdvanced {
            entry_id: id,
            track_id,
            reason,
        });
        let result = self.music.load_track(track).and_then(|()| self.music.play());
        let ok = self.absorb(result);
        if ok {
            self.note_started(ChannelId::Music);
        }
        ok
    }

    /// Music ended naturally: record it and move on if auto-advance is on.
    fn advance_after(&mut self, finished: Track) {
        if !self.queue.auto_advance_enabled() {
            self.queue.push_history(finished);
            return;
        }
        match self.queue.move_to_next(Some(finished)) {
            Some(entry) => {
                self.start_entry(entry);
            }
            None => {
                log::info!("Queue exhausted; music stopped");
                self.events.push(StudioEvent::QueueExhausted);
            }
        }
    }

    // ── Auto-DJ ───────────────────────────────────────────────────────────

    pub fn set_autodj_enabled(&mut self, enabled: bool) {
        self.autodj.set_enabled(enabled);
    }

    pub fn update_autodj_settings(&mut self, patch: AutoDjSettingsPatch) {
        self.autodj.update_settings(patch);
    }

    pub fn accept_suggestion(&mut self) -> Option<String> {
        self.autodj.accept_suggestion(&mut self.queue)
    }

    pub fn skip_suggestion(&mut self) -> bool {
        let event = self
            .autodj
            .skip_suggestion(self.music.state(), &self.catalog, &mut self.queue);
        let skipped = event.is_some();
        self.push_autodj(event);
        skipped
    }

    pub fn lock_track(&mut self, track_id: &str) -> Option<u64> {
        match self.autodj.lock_custom_track(track_id, &self.catalog, &mut self.queue) {
            Ok(entry_id) => {
                self.events.push(StudioEvent::AutoDj(AutoDjEvent::LockQueued {
                    entry_id,
                    track_id: track_id.to_string(),
                }));
                Some(entry_id)
            }
            Err(e) => {
                self.report(e);
                None
            }
        }
    }

    pub fn unlock_track(&mut self) -> Option<String> {
        let released = self.autodj.unlock_custom_track()?;
        self.events.push(StudioEvent::AutoDj(AutoDjEvent::LockReleased {
            track_id: released.clone(),
        }));
        Some(released)
    }

    pub fn request_energy(&mut self, level: f32) {
        let event = self
            .autodj
            .request_energy(level, self.music.state(), &self.catalog, &mut self.queue);
        self.push_autodj(event);
    }

    fn push_autodj(&mut self, events: impl IntoIterator<Item = AutoDjEvent>) {
        self.events.extend(events.into_iter().map(StudioEvent::AutoDj));
    }

    // ── Emergency ─────────────────────────────────────────────────────────

    /// Enter an emergency mode. `Normal` is the same as `recover()`.
    pub fn emergency(&mut self, mode: EmergencyMode) {
        if mode == EmergencyMode::Normal {
            self.recover();
            return;
        }
        if self.emergency_restore.is_none() {
            self.emergency_restore = Some(self.capture_emergency());
        }
        match mode {
            EmergencyMode::Panic => {
                self.music.set_muted(true);
                self.jingle.set_muted(true);
            }
            EmergencyMode::Brb => self.music.change_volume(BRB_VOLUME),
            EmergencyMode::FadeOut => {
                if !self.music.start_fade_out(EMERGENCY_FADE, FadeCurve::Linear) {
                    log::info!("Emergency fade-out: music is not playing");
                }
            }
            EmergencyMode::Normal => {}
        }
        log::warn!("Emergency mode: {}", mode.as_str());
        self.set_emergency(mode);
    }

    /// Back to how things were before the first emergency mode.
    pub fn recover(&mut self) {
        let Some(snap) = self.emergency_restore.take() else {
            self.set_emergency(EmergencyMode::Normal);
            return;
        };
        self.music.change_volume(snap.music_volume);
        self.jingle.change_volume(snap.jingle_volume);
        self.music.set_muted(snap.music_muted);
        self.jingle.set_muted(snap.jingle_muted);

        let same_track = self.music.current_track().map(|t| t.id.as_str()) == snap.music_track_id.as_deref();
        if snap.music_playing && same_track && !self.music.state().is_playing {
            let result = self
                .music
                .seek(snap.music_position)
                .and_then(|()| self.music.play());
            if self.absorb(result) {
                self.note_started(ChannelId::Music);
            }
        }
        log::info!("Emergency cleared");
        self.set_emergency(EmergencyMode::Normal);
    }

    fn capture_emergency(&self) -> EmergencySnapshot {
        let music = self.music.state();
        EmergencySnapshot {
            music_volume: music.volume,
            jingle_volume: self.jingle.state().volume,
            music_muted: music.is_muted,
            jingle_muted: self.jingle.state().is_muted,
            music_track_id: music.current_track.as_ref().map(|t| t.id.clone()),
            music_playing: music.is_playing,
            music_position: music.playback_position_seconds,
        }
    }

    fn set_emergency(&mut self, mode: EmergencyMode) {
        if self.emergency != mode {
            self.emergency = mode;
            self.events.push(StudioEvent::EmergencyChanged { mode });
        }
    }

    // ── Recording ─────────────────────────────────────────────────────────

    /// Record the microphone; stops by itself at the configured cap.
    pub fn start_recording(&mut self) -> bool {
        let Some(mic) = self.mic.clone() else {
            self.report(StudioError::Recording("no microphone attached".into()));
            return false;
        };
        let (sample_rate, channels) = mic.format();
        match self.recorder.start(sample_rate, channels) {
            Ok(producer) => {
                mic.attach_capture(producer);
                let cap = self.recorder.config().max_duration();
                self.scheduler.schedule_once(RECORDING_TIMEOUT_TASK, cap);
                if let Some(path) = self.recorder.current_path().cloned() {
                    self.events.push(StudioEvent::RecordingStarted { path });
                }
                true
            }
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    pub fn stop_recording(&mut self) -> Option<RecordingSummary> {
        self.finish_recording(false)
    }

    fn finish_recording(&mut self, auto_stopped: bool) -> Option<RecordingSummary> {
        self.scheduler.cancel(RECORDING_TIMEOUT_TASK);
        if let Some(mic) = &self.mic {
            mic.detach_capture();
        }
        match self.recorder.stop(auto_stopped) {
            Ok(summary) => {
                self.events.push(if auto_stopped {
                    StudioEvent::RecordingAutoStopped(summary.clone())
                } else {
                    StudioEvent::RecordingStopped(summary.clone())
                });
                Some(summary)
            }
            Err(e) => {
                self.report(e);
                None
            }
        }
    }

    // ── Periodic work ─────────────────────────────────────────────────────

    /// Advance the studio clock by `dt` and run whatever came due.
    pub fn tick(&mut self, dt: Duration) -> TickOutput {
        let mut sync = None;
        for task in self.scheduler.advance(dt) {
            match task.as_str() {
                TASK_POSITION => self.run_position(),
                TASK_AUTODJ => self.run_autodj(),
                TASK_SYNC => sync = Some(self.sample_sync()),
                RECORDING_TIMEOUT_TASK => {
                    log::info!("Recording reached its length cap");
                    self.finish_recording(true);
                }
                other => log::debug!("No handler for task {other}"),
            }
        }

        let active = self.is_active();
        if active != self.was_active {
            self.was_active = active;
            self.scheduler.set_enabled(TASK_SYNC, active);
            self.scheduler.set_enabled(TASK_AUTODJ, active);
            log::debug!("Studio {}", if active { "active" } else { "idle" });
            if !active {
                // Last write so the overlay sees playback stop
                sync = Some(self.sample_sync());
            }
        }

        TickOutput {
            events: self.take_events(),
            sync,
        }
    }

    fn run_position(&mut self) {
        let now = self.scheduler.now();
        let dt = now.saturating_sub(self.last_position_at);
        self.last_position_at = now;

        for event in self.backend.poll_events() {
            for channel in ChannelId::ALL {
                let handled = self.player_mut(channel).handle_backend_event(&event);
                if let Some(ev) = handled {
                    self.on_player_event(channel, ev);
                }
            }
        }
        for channel in ChannelId::ALL {
            let events = self.player_mut(channel).update(dt);
            for ev in events {
                self.on_player_event(channel, ev);
            }
        }
        self.sync_jingle_duck();

        let peak = self.mic.as_ref().map(MicInput::take_peak);
        if let Some(trigger) = peak.and_then(|p| self.mic_detector.update(p, dt)) {
            self.duck_trigger(trigger);
        }
        if let Err(e) = self.recorder.pump() {
            self.report(e);
        }
    }

    fn on_player_event(&mut self, channel: ChannelId, event: PlayerEvent) {
        match event {
            PlayerEvent::TrackEnded { track } => {
                self.events.push(StudioEvent::TrackEnded {
                    channel,
                    track_id: track.id.clone(),
                });
                if channel == ChannelId::Music {
                    self.advance_after(track);
                }
            }
            PlayerEvent::Looped { track_id } => log::debug!("[{channel}] {track_id} looped"),
            PlayerEvent::PlayableLimitReached {
                track_id,
                limit_seconds,
            } => self.events.push(StudioEvent::PlayableLimitReached {
                track_id,
                limit_seconds,
            }),
            PlayerEvent::FadeOutComplete { track_id } => {
                self.events.push(StudioEvent::FadeOutComplete { channel, track_id });
            }
            PlayerEvent::PlaybackFailed { message } => self.report(StudioError::playback(channel, message)),
        }
    }

    fn run_autodj(&mut self) {
        let events = self.autodj.tick(self.music.state(), &self.catalog, &mut self.queue);
        self.push_autodj(events);
    }

    fn sample_sync(&mut self) -> PlaybackSnapshot {
        self.bands = if self.music.state().is_playing {
            analyze_frequency_bands(self.analyser.as_deref_mut().map(|a| a as &mut dyn AnalysisNode))
        } else {
            FrequencyBands::default()
        };
        self.snapshot()
    }

    /// Current playback row contents, using the last sampled bands.
    pub fn snapshot(&self) -> PlaybackSnapshot {
        let music = self.music.state();
        PlaybackSnapshot {
            position_seconds: music.playback_position_seconds,
            bands: self.bands,
            current_track_id: music.current_track.as_ref().map(|t| t.id.clone()),
            is_playing: music.is_playing,
            volume: music.volume,
            is_muted: music.is_muted,
            is_looping: music.is_looping,
            is_shuffling: music.is_shuffling,
            is_ducking: music.is_ducking,
            emergency_mode: self.emergency.as_str().to_string(),
        }
    }

    pub fn status(&self) -> StudioStatus {
        StudioStatus {
            music: self.music.state().clone(),
            jingle: self.jingle.state().clone(),
            queue: self.queue.entries().cloned().collect(),
            queue_stats: self.queue.queue_stats(),
            history: self.queue.history().cloned().collect(),
            auto_advance: self.queue.auto_advance_enabled(),
            autodj: self.autodj.settings().clone(),
            pending_suggestion: self.autodj.pending().cloned(),
            preview_track_id: self.autodj.preview().map(|s| s.track.id.clone()),
            duck_reasons: self.ducking.active_reasons(),
            emergency_mode: self.emergency,
            recording: self.recorder.is_recording(),
            bands: self.bands,
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────

    fn lookup(&mut self, track_id: &str) -> Option<Track> {
        let track = self.catalog.get(track_id).cloned();
        if track.is_none() {
            self.report(StudioError::UnknownTrack(track_id.to_string()));
        }
        track
    }

    fn note_started(&mut self, channel: ChannelId) {
        if let Some(track) = self.player(channel).current_track() {
            let track_id = track.id.clone();
            self.events.push(StudioEvent::PlaybackStarted { channel, track_id });
        }
    }

    /// Turn a result into success / failure, reporting the failure.
    fn absorb(&mut self, result: Result<(), StudioError>) -> bool {
        match result {
            Ok(()) => true,
            Err(e) => {
                self.report(e);
                false
            }
        }
    }

    fn report(&mut self, err: StudioError) {
        log::warn!("{err}");
        if let Some(callback) = self.on_error.as_mut() {
            callback(&err);
        }
        self.events.push(StudioEvent::Error {
            message: err.to_string(),
        });
    }
}
