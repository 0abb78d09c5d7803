use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{
    analyzer::quantize::{quantize, BeatGrid, QuantizeSettings},
    backend::{BackendEvent, PlaybackBackend},
    dsp::EffectsConfig,
    fade::{FadeCurve, FadeOut, FadeStep},
    ChannelId,
};
use crate::{db::Track, error::StudioError};

pub const HOT_CUE_SLOTS: usize = 8;

// ── State ────────────────────────────────────────────────────────────────────

/// Observable state of one playable channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub is_paused: bool,
    pub playback_position_seconds: f64,
    pub duration_seconds: f64,
    /// Base (pre-duck) volume 0.0 – 1.0
    pub volume: f32,
    pub is_muted: bool,
    pub is_looping: bool,
    pub is_shuffling: bool,
    pub is_ducking: bool,
    pub duck_level: f32,
    pub applied_effects: EffectsConfig,
}

impl PlayerState {
    fn new(volume: f32) -> Self {
        Self {
            current_track: None,
            is_playing: false,
            is_paused: false,
            playback_position_seconds: 0.0,
            duration_seconds: 0.0,
            volume,
            is_muted: false,
            is_looping: false,
            is_shuffling: false,
            is_ducking: false,
            duck_level: 0.0,
            applied_effects: EffectsConfig::default(),
        }
    }

    /// Gain actually sent to the output.
    pub fn output_volume(&self) -> f32 {
        if self.is_muted {
            return 0.0;
        }
        if self.is_ducking {
            self.volume * (1.0 - self.duck_level)
        } else {
            self.volume
        }
    }

    pub fn remaining_seconds(&self) -> f64 {
        (self.duration_seconds - self.playback_position_seconds).max(0.0)
    }

    /// Progress through the current track in [0, 1]; 0 when duration is unknown.
    pub fn progress(&self) -> f64 {
        if self.duration_seconds > 0.0 {
            (self.playback_position_seconds / self.duration_seconds).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Things the owner of a player needs to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    /// Playback reached the natural end of the track (not a stop).
    TrackEnded { track: Track },
    /// Loop flag was set; the track restarted instead of ending.
    Looped { track_id: String },
    /// Partial-use rights ran out and playback was paused.
    PlayableLimitReached { track_id: String, limit_seconds: f64 },
    FadeOutComplete { track_id: String },
    PlaybackFailed { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopRegion {
    pub start: Option<f64>,
    pub end: Option<f64>,
}

impl LoopRegion {
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if e > s => Some((s, e)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_volume: f32,
    /// Duration of the duck / unduck gain ramp
    pub duck_ramp_ms: u64,
    pub quantize: QuantizeSettings,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_volume: 0.7,
            duck_ramp_ms: 600,
            quantize: QuantizeSettings::default(),
        }
    }
}

// ── Player ───────────────────────────────────────────────────────────────────

/// Transport for one channel (music or jingle).
///
/// Every operation leaves `PlayerState` consistent even when the backend
/// fails; errors are logged here and returned so the owner can forward them.
pub struct AudioPlayer<B: PlaybackBackend> {
    channel: ChannelId,
    backend: B,
    state: PlayerState,
    /// Bumped by load/pause/stop/natural end; stale fade jobs compare against it
    generation: u64,
    fade: Option<FadeOut>,
    source_ready: bool,
    hot_cues: [Option<f64>; HOT_CUE_SLOTS],
    loop_region: LoopRegion,
    grid_override: Option<BeatGrid>,
    quantize: QuantizeSettings,
    duck_ramp: Duration,
}

impl<B: PlaybackBackend> AudioPlayer<B> {
    pub fn new(channel: ChannelId, backend: B, config: &PlayerConfig) -> Self {
        let player = Self {
            channel,
            backend,
            state: PlayerState::new(config.default_volume.clamp(0.0, 1.0)),
            generation: 0,
            fade: None,
            source_ready: false,
            hot_cues: [None; HOT_CUE_SLOTS],
            loop_region: LoopRegion::default(),
            grid_override: None,
            quantize: config.quantize,
            duck_ramp: Duration::from_millis(config.duck_ramp_ms),
        };
        player.push_gain(Duration::ZERO);
        player
    }

    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    pub fn state(&self) -> &PlayerState {
        &self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.state.current_track.as_ref()
    }

    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    // ── Transport ─────────────────────────────────────────────────────────

    /// Stop whatever is playing and load `track` at position 0.
    ///
    /// On failure the track stays current but cannot play.
    pub fn load_track(&mut self, track: Track) -> Result<(), StudioError> {
        if self.source_ready {
            self.backend.stop(self.channel);
        }
        self.cancel_fade();
        self.generation += 1;
        self.source_ready = false;
        self.hot_cues = [None; HOT_CUE_SLOTS];
        self.loop_region = LoopRegion::default();
        self.grid_override = None;
        self.state.is_playing = false;
        self.state.is_paused = false;
        self.state.playback_position_seconds = 0.0;
        self.state.duration_seconds = track.duration_seconds.max(0.0);

        let location = track.file_location.clone();
        let blocked = track.is_blocked();
        log::info!("[{}] Loading '{}' from {location}", self.channel, track.display_name());
        self.state.current_track = Some(track);

        if blocked {
            let err = StudioError::load(location, "blocked by usage policy");
            log::warn!("[{}] {err}", self.channel);
            return Err(err);
        }

        match self.backend.load(self.channel, &location) {
            Ok(source) => {
                if source.duration_seconds > 0.0 {
                    self.state.duration_seconds = source.duration_seconds;
                }
                self.source_ready = true;
                self.push_gain(Duration::ZERO);
                Ok(())
            }
            Err(e) => {
                log::warn!("[{}] Load failed: {e}", self.channel);
                Err(e)
            }
        }
    }

    /// Start or resume from the current position. No-op without a track.
    pub fn play(&mut self) -> Result<(), StudioError> {
        if self.state.current_track.is_none() {
            log::debug!("[{}] play() ignored: nothing loaded", self.channel);
            return Ok(());
        }
        if self.state.is_playing {
            return Ok(());
        }
        if !self.source_ready {
            self.state.is_playing = false;
            let err = StudioError::playback(self.channel, "source is not loaded");
            log::warn!("[{}] {err}", self.channel);
            return Err(err);
        }
        match self.backend.play(self.channel) {
            Ok(()) => {
                self.state.is_playing = true;
                self.state.is_paused = false;
                Ok(())
            }
            Err(e) => {
                self.state.is_playing = false;
                log::warn!("[{}] Play failed: {e}", self.channel);
                Err(e)
            }
        }
    }

    /// Pause, keeping the position.
    pub fn pause(&mut self) {
        if !self.state.is_playing {
            return;
        }
        self.backend.pause(self.channel);
        self.cancel_fade();
        self.generation += 1;
        self.refresh_position();
        self.state.is_playing = false;
        self.state.is_paused = true;
    }

    /// Stop and rewind to 0.
    pub fn stop(&mut self) {
        if self.source_ready {
            self.backend.stop(self.channel);
        }
        self.cancel_fade();
        self.generation += 1;
        self.state.is_playing = false;
        self.state.is_paused = false;
        self.state.playback_position_seconds = 0.0;
    }

    /// Seek within `[0, duration]`. Non-finite targets are ignored.
    pub fn seek(&mut self, seconds: f64) -> Result<(), StudioError> {
        if self.state.current_track.is_none() || !seconds.is_finite() {
            return Ok(());
        }
        let upper = if self.state.duration_seconds > 0.0 {
            self.state.duration_seconds
        } else {
            f64::MAX
        };
        let target = seconds.clamp(0.0, upper);
        if self.source_ready {
            self.backend.seek(self.channel, target).inspect_err(|e| {
                log::warn!("[{}] Seek failed: {e}", self.channel);
            })?;
        }
        self.state.playback_position_seconds = target;
        Ok(())
    }

    /// Set the base volume. While ducked, the duck is re-applied on top.
    pub fn change_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        self.cancel_fade();
        self.state.volume = volume.clamp(0.0, 1.0);
        self.push_gain(Duration::ZERO);
    }

    // ── Ducking ───────────────────────────────────────────────────────────

    /// Lower output to `volume * (1 - level)`. Repeated calls only change the
    /// level; the base volume is never touched.
    pub fn duck(&mut self, level: f32) {
        let level = if level.is_finite() { level.clamp(0.0, 1.0) } else { 0.0 };
        if self.state.is_ducking && (self.state.duck_level - level).abs() < f32::EPSILON {
            return;
        }
        self.state.is_ducking = true;
        self.state.duck_level = level;
        self.push_gain(self.duck_ramp);
    }

    /// Back to the base volume. No-op if not ducked.
    pub fn unduck(&mut self) {
        if !self.state.is_ducking {
            return;
        }
        self.state.is_ducking = false;
        self.state.duck_level = 0.0;
        self.push_gain(self.duck_ramp);
    }

    // ── Flags ─────────────────────────────────────────────────────────────

    pub fn toggle_mute(&mut self) -> bool {
        self.state.is_muted = !self.state.is_muted;
        self.push_gain(Duration::ZERO);
        self.state.is_muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        if self.state.is_muted != muted {
            self.toggle_mute();
        }
    }

    pub fn toggle_loop(&mut self) -> bool {
        self.state.is_looping = !self.state.is_looping;
        self.state.is_looping
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.state.is_shuffling = !self.state.is_shuffling;
        self.state.is_shuffling
    }

    pub fn apply_effects(&mut self, config: EffectsConfig) {
        let config = config.sanitized();
        self.state.applied_effects = config;
        self.backend.apply_effects(self.channel, &config);
    }

    // ── Fade-out ──────────────────────────────────────────────────────────

    /// Ramp the base volume to silence, then stop and restore the volume.
    /// Returns false when nothing is playing.
    pub fn start_fade_out(&mut self, duration: Duration, curve: FadeCurve) -> bool {
        let Some(track) = self.state.current_track.as_ref() else {
            return false;
        };
        if !self.state.is_playing {
            return false;
        }
        let start_volume = self.fade.as_ref().map_or(self.state.volume, |f| f.start_volume);
        self.fade = Some(FadeOut::new(curve, duration, start_volume, track.id.clone(), self.generation));
        log::info!("[{}] Fading out over {:.1}s", self.channel, duration.as_secs_f32());
        true
    }

    fn cancel_fade(&mut self) {
        if let Some(job) = self.fade.take() {
            log::debug!("[{}] Fade-out superseded", self.channel);
            self.state.volume = job.start_volume;
            self.push_gain(Duration::ZERO);
        }
    }

    fn tick_fade(&mut self, dt: Duration) -> Option<PlayerEvent> {
        let job = self.fade.as_mut()?;
        let current_id = self.state.current_track.as_ref().map(|t| t.id.as_str());
        if job.generation != self.generation || current_id != Some(job.track_id.as_str()) || !self.state.is_playing {
            self.cancel_fade();
            return None;
        }
        let step = job.advance(dt);
        let (start_volume, track_id) = (job.start_volume, job.track_id.clone());
        match step {
            FadeStep::Volume(v) => {
                self.state.volume = v;
                self.push_gain(Duration::ZERO);
                None
            }
            FadeStep::Done => {
                self.fade = None;
                self.stop();
                self.state.volume = start_volume;
                self.push_gain(Duration::ZERO);
                log::info!("[{}] Fade-out complete", self.channel);
                Some(PlayerEvent::FadeOutComplete { track_id })
            }
        }
    }

    // ── Cues & loops ──────────────────────────────────────────────────────

    pub fn set_quantize(&mut self, settings: QuantizeSettings) {
        self.quantize = settings;
    }

    pub fn quantize_settings(&self) -> QuantizeSettings {
        self.quantize
    }

    /// Use an analysed grid instead of the catalog BPM for this track.
    pub fn set_beat_grid(&mut self, grid: Option<BeatGrid>) {
        self.grid_override = grid;
    }

    pub fn beat_grid(&self) -> Option<BeatGrid> {
        self.grid_override
            .or_else(|| self.state.current_track.as_ref().and_then(Track::beat_grid))
    }

    fn place_marker(&self, seconds: f64) -> Option<f64> {
        if self.state.current_track.is_none() || !seconds.is_finite() {
            return None;
        }
        let grid = self.beat_grid();
        let t = quantize(seconds, grid.as_ref(), &self.quantize).max(0.0);
        Some(if self.state.duration_seconds > 0.0 {
            t.min(self.state.duration_seconds)
        } else {
            t
        })
    }

    /// Store a hot cue (quantized when enabled). Returns the stored time.
    pub fn set_hot_cue(&mut self, slot: usize, seconds: f64) -> Option<f64> {
        let t = self.place_marker(seconds)?;
        *self.hot_cues.get_mut(slot)? = Some(t);
        Some(t)
    }

    pub fn clear_hot_cue(&mut self, slot: usize) {
        if let Some(c) = self.hot_cues.get_mut(slot) {
            *c = None;
        }
    }

    pub fn hot_cues(&self) -> &[Option<f64>; HOT_CUE_SLOTS] {
        &self.hot_cues
    }

    pub fn jump_to_hot_cue(&mut self, slot: usize) -> Result<(), StudioError> {
        match self.hot_cues.get(slot).copied().flatten() {
            Some(t) => self.seek(t),
            None => Ok(()),
        }
    }

    pub fn set_loop_in(&mut self, seconds: f64) -> Option<f64> {
        let t = self.place_marker(seconds)?;
        self.loop_region.start = Some(t);
        Some(t)
    }

    pub fn set_loop_out(&mut self, seconds: f64) -> Option<f64> {
        let t = self.place_marker(seconds)?;
        self.loop_region.end = Some(t);
        Some(t)
    }

    pub fn exit_loop(&mut self) {
        self.loop_region = LoopRegion::default();
    }

    pub fn loop_region(&self) -> LoopRegion {
        self.loop_region
    }

    // ── Periodic work ─────────────────────────────────────────────────────

    /// Pull the playhead from the backend and run position-driven behaviour
    /// (loop region wrap, partial-use limit, fade-out).
    pub fn update(&mut self, dt: Duration) -> Vec<PlayerEvent> {
        let mut events = Vec::new();
        if self.state.is_playing {
            self.refresh_position();
            let pos = self.state.playback_position_seconds;

            if let Some((start, end)) = self.loop_region.bounds() {
                if pos >= end {
                    if let Err(e) = self.seek(start) {
                        events.push(PlayerEvent::PlaybackFailed { message: e.to_string() });
                    }
                }
            }

            let limit = self.state.current_track.as_ref().and_then(|t| t.playable_limit().map(|l| (t.id.clone(), l)));
            if let Some((track_id, limit_seconds)) = limit {
                if pos >= limit_seconds {
                    log::info!("[{}] Partial-use limit of {limit_seconds}s reached", self.channel);
                    self.pause();
                    events.push(PlayerEvent::PlayableLimitReached { track_id, limit_seconds });
                }
            }
        }
        if let Some(ev) = self.tick_fade(dt) {
            events.push(ev);
        }
        events
    }

    /// React to a backend notification addressed to this channel.
    pub fn handle_backend_event(&mut self, event: &BackendEvent) -> Option<PlayerEvent> {
        match event {
            BackendEvent::Ended { channel } if *channel == self.channel => {
                let track = self.state.current_track.clone()?;
                if self.state.is_looping {
                    self.state.playback_position_seconds = 0.0;
                    let restarted = self
                        .backend
                        .seek(self.channel, 0.0)
                        .and_then(|()| self.backend.play(self.channel));
                    return match restarted {
                        Ok(()) => {
                            self.state.is_playing = true;
                            Some(PlayerEvent::Looped { track_id: track.id })
                        }
                        Err(e) => {
                            self.state.is_playing = false;
                            log::warn!("[{}] Loop restart failed: {e}", self.channel);
                            Some(PlayerEvent::PlaybackFailed { message: e.to_string() })
                        }
                    };
                }
                self.cancel_fade();
                self.generation += 1;
                self.state.is_playing = false;
                self.state.is_paused = false;
                self.state.playback_position_seconds = self.state.duration_seconds;
                log::info!("[{}] '{}' ended", self.channel, track.display_name());
                Some(PlayerEvent::TrackEnded { track })
            }
            BackendEvent::Error { channel, message } if *channel == self.channel => {
                log::warn!("[{}] Playback error: {message}", self.channel);
                self.state.is_playing = false;
                Some(PlayerEvent::PlaybackFailed { message: message.clone() })
            }
            _ => None,
        }
    }

    // ── Private helpers ──────────────────────────────────────────────────

    fn refresh_position(&mut self) {
        let pos = self.backend.position(self.channel);
        if pos.is_finite() {
            self.state.playback_position_seconds = pos.max(0.0);
        }
    }

    fn push_gain(&self, ramp: Duration) {
        self.backend.set_gain(self.channel, self.state.output_volume(), ramp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::backend::mock::{Call, MockBackend};
    use crate::db::track::{CopyrightInfo, UsagePolicy};

    const CH: ChannelId = ChannelId::Music;

    fn player() -> (AudioPlayer<MockBackend>, MockBackend) {
        let backend = MockBackend::new();
        backend.set_duration("t1.mp3", 10.0);
        backend.set_duration("t2.mp3", 200.0);
        (AudioPlayer::new(CH, backend.clone(), &PlayerConfig::default()), backend)
    }

    fn t1() -> Track {
        Track::new("t1", "One", "t1.mp3").with_duration(10.0)
    }

    #[test]
    fn load_resets_position_and_does_not_play() {
        let (mut p, _b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        p.seek(4.0).unwrap();

        p.load_track(Track::new("t2", "Two", "t2.mp3")).unwrap();
        let s = p.state();
        assert_eq!(s.current_track.as_ref().map(|t| t.id.as_str()), Some("t2"));
        assert!(!s.is_playing);
        assert_eq!(s.playback_position_seconds, 0.0);
        assert_eq!(s.duration_seconds, 200.0, "backend duration wins");
    }

    #[test]
    fn unreachable_source_leaves_track_loaded_but_silent() {
        let (mut p, b) = player();
        b.make_unreachable("gone.mp3");
        assert!(p.load_track(Track::new("g", "Gone", "gone.mp3")).is_err());
        assert!(p.current_track().is_some());
        assert!(p.play().is_err());
        assert!(!p.state().is_playing);
    }

    #[test]
    fn play_without_track_is_noop() {
        let (mut p, b) = player();
        assert!(p.play().is_ok());
        assert!(!p.state().is_playing);
        assert!(!b.calls().iter().any(|c| matches!(c, Call::Play(_))));
    }

    #[test]
    fn failed_play_forces_not_playing() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        b.fail_play(true);
        assert!(p.play().is_err());
        assert!(!p.state().is_playing);
    }

    #[test]
    fn pause_keeps_position_stop_rewinds() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        b.set_position(CH, 3.5);
        p.pause();
        assert!(p.state().is_paused);
        assert_eq!(p.state().playback_position_seconds, 3.5);

        p.play().unwrap();
        p.stop();
        assert!(!p.state().is_playing && !p.state().is_paused);
        assert_eq!(p.state().playback_position_seconds, 0.0);
    }

    #[test]
    fn seek_clamps_to_duration() {
        let (mut p, _b) = player();
        p.load_track(t1()).unwrap();
        p.seek(25.0).unwrap();
        assert_eq!(p.state().playback_position_seconds, 10.0);
        p.seek(-2.0).unwrap();
        assert_eq!(p.state().playback_position_seconds, 0.0);
        p.seek(f64::NAN).unwrap();
        assert_eq!(p.state().playback_position_seconds, 0.0);
    }

    #[test]
    fn volume_clamps() {
        let (mut p, b) = player();
        p.change_volume(1.7);
        assert_eq!(p.state().volume, 1.0);
        p.change_volume(-0.2);
        assert_eq!(p.state().volume, 0.0);
        assert_eq!(b.gain(CH), 0.0);
    }

    #[test]
    fn duck_twice_then_unduck_restores_pre_duck_volume() {
        let (mut p, b) = player();
        p.change_volume(0.6);
        p.duck(0.5);
        p.duck(0.8);
        assert!(p.state().is_ducking);
        assert!((p.state().output_volume() - 0.6 * 0.2).abs() < 1e-6);
        assert!((b.gain(CH) - 0.6 * 0.2).abs() < 1e-6);

        p.unduck();
        assert!(!p.state().is_ducking);
        assert_eq!(p.state().volume, 0.6);
        assert_eq!(b.gain(CH), 0.6);
    }

    #[test]
    fn repeated_duck_cycles_do_not_drift() {
        let (mut p, b) = player();
        p.change_volume(0.73);
        for i in 0..500 {
            p.duck(0.1 + (i % 7) as f32 * 0.1);
            p.unduck();
        }
        assert_eq!(p.state().volume, 0.73);
        assert_eq!(b.gain(CH), 0.73);
    }

    #[test]
    fn unduck_when_not_ducked_is_noop() {
        let (mut p, b) = player();
        b.clear_calls();
        p.unduck();
        assert!(b.calls().is_empty());
    }

    #[test]
    fn volume_change_while_ducked_sets_base() {
        let (mut p, b) = player();
        p.duck(0.5);
        p.change_volume(0.4);
        assert!((b.gain(CH) - 0.2).abs() < 1e-6);
        p.unduck();
        assert_eq!(b.gain(CH), 0.4);
    }

    #[test]
    fn duck_uses_ramp() {
        let (mut p, b) = player();
        b.clear_calls();
        p.duck(0.3);
        assert!(b.calls().contains(&Call::Gain(CH, 0.7 * 0.7, Duration::from_millis(600))));
    }

    #[test]
    fn mute_zeroes_output_but_keeps_volume() {
        let (mut p, b) = player();
        assert!(p.toggle_mute());
        assert_eq!(b.gain(CH), 0.0);
        assert_eq!(p.state().volume, 0.7);
        assert!(!p.toggle_mute());
        assert_eq!(b.gain(CH), 0.7);
    }

    #[test]
    fn natural_end_reports_track_ended() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        b.finish(CH);
        let events: Vec<_> = b.poll_events().iter().filter_map(|e| p.handle_backend_event(e)).collect();
        assert_eq!(events, vec![PlayerEvent::TrackEnded { track: t1() }]);
        assert!(!p.state().is_playing);
    }

    #[test]
    fn looping_track_restarts_instead_of_ending() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.toggle_loop();
        p.play().unwrap();
        b.finish(CH);
        let ev = p.handle_backend_event(&BackendEvent::Ended { channel: CH });
        assert_eq!(ev, Some(PlayerEvent::Looped { track_id: "t1".into() }));
        assert!(p.state().is_playing);
        assert!(b.is_playing(CH));
    }

    #[test]
    fn events_for_other_channel_are_ignored() {
        let (mut p, _b) = player();
        p.load_track(t1()).unwrap();
        assert_eq!(p.handle_backend_event(&BackendEvent::Ended { channel: ChannelId::Jingle }), None);
    }

    #[test]
    fn fade_out_completes_and_restores_volume() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        assert!(p.start_fade_out(Duration::from_secs(2), FadeCurve::Linear));

        p.update(Duration::from_secs(1));
        assert!((p.state().volume - 0.35).abs() < 1e-6);
        assert!((b.gain(CH) - 0.35).abs() < 1e-6);

        let events = p.update(Duration::from_secs(1));
        assert_eq!(events, vec![PlayerEvent::FadeOutComplete { track_id: "t1".into() }]);
        assert!(!p.state().is_playing);
        assert_eq!(p.state().volume, 0.7);
    }

    #[test]
    fn pause_supersedes_fade() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        p.start_fade_out(Duration::from_secs(4), FadeCurve::Linear);
        p.update(Duration::from_secs(1));
        p.pause();
        assert!(!p.is_fading());
        assert_eq!(p.state().volume, 0.7);

        p.play().unwrap();
        p.update(Duration::from_secs(3));
        assert_eq!(p.state().volume, 0.7, "stale fade must not keep ramping");
        assert_eq!(b.gain(CH), 0.7);
    }

    #[test]
    fn track_change_supersedes_fade() {
        let (mut p, _b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        p.start_fade_out(Duration::from_secs(4), FadeCurve::Linear);
        p.load_track(Track::new("t2", "Two", "t2.mp3")).unwrap();
        p.play().unwrap();
        for _ in 0..10 {
            assert!(p.update(Duration::from_secs(1)).is_empty());
        }
        assert!(p.state().is_playing);
        assert_eq!(p.state().volume, 0.7);
    }

    #[test]
    fn hot_cue_snaps_to_beat_when_quantized() {
        let (mut p, _b) = player();
        p.load_track(t1().with_bpm(120.0)).unwrap();
        assert_eq!(p.set_hot_cue(0, 2.05), Some(2.05));

        p.set_quantize(QuantizeSettings {
            enabled: true,
            ..Default::default()
        });
        let t = p.set_hot_cue(1, 2.05).unwrap();
        assert!((t - 2.0).abs() < 1e-9);
        assert_eq!(p.set_hot_cue(HOT_CUE_SLOTS, 1.0), None);

        p.jump_to_hot_cue(1).unwrap();
        assert!((p.state().playback_position_seconds - 2.0).abs() < 1e-9);
    }

    #[test]
    fn loop_region_wraps_playhead() {
        let (mut p, b) = player();
        p.load_track(t1()).unwrap();
        p.play().unwrap();
        p.set_loop_in(2.0);
        p.set_loop_out(4.0);
        b.set_position(CH, 4.1);
        p.update(Duration::from_millis(50));
        assert_eq!(p.state().playback_position_seconds, 2.0);
    }

    #[test]
    fn partial_rights_pause_at_limit() {
        let (mut p, b) = player();
        let mut track = t1();
        track.copyright_info = Some(CopyrightInfo {
            usage_policy: UsagePolicy::Partial,
            playable_duration: Some(5.0),
            safe_for_streaming: None,
        });
        p.load_track(track).unwrap();
        p.play().unwrap();
        b.set_position(CH, 4.0);
        assert!(p.update(Duration::from_millis(50)).is_empty());
        b.set_position(CH, 5.0);
        let events = p.update(Duration::from_millis(50));
        assert!(matches!(events.as_slice(), [PlayerEvent::PlayableLimitReached { .. }]));
        assert!(p.state().is_paused);
    }

    #[test]
    fn blocked_track_refuses_to_load() {
        let (mut p, b) = player();
        let mut track = t1();
        track.copyright_info = Some(CopyrightInfo {
            usage_policy: UsagePolicy::Blocked,
            ..Default::default()
        });
        assert!(p.load_track(track).is_err());
        assert!(!b.calls().iter().any(|c| matches!(c, Call::Load(..))));
        assert!(p.play().is_err());
    }
}
