/// `commands` — The studio's command surface
///
/// Every operator action is a `StudioCommand`, usually arriving as one JSON
/// object per line (`{"type":"play","channel":"music"}`). `apply` routes each
/// to its handler; handlers answer with a JSON value or a short error string,
/// while the full error detail goes out as a `StudioEvent::Error`.
pub mod audio_commands;
pub mod mic_commands;
pub mod queue_commands;

use serde::Deserialize;
use serde_json::Value;

use crate::{
    audio::{
        analyzer::QuantizeSettings,
        dsp::{EffectPreset, EffectsConfig},
        ducking::DuckTrigger,
        fade::FadeCurve,
        ChannelId, PlaybackBackend,
    },
    scheduler::AutoDjSettingsPatch,
    state::{EmergencyMode, Studio},
};

fn default_fade_ms() -> u64 {
    3_000
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StudioCommand {
    // ── Transport ─────────────────────────────────────────────────────────
    LoadTrack {
        #[serde(default)]
        channel: ChannelId,
        track_id: String,
    },
    Play {
        #[serde(default)]
        channel: ChannelId,
    },
    Pause {
        #[serde(default)]
        channel: ChannelId,
    },
    Stop {
        #[serde(default)]
        channel: ChannelId,
    },
    Seek {
        #[serde(default)]
        channel: ChannelId,
        seconds: f64,
    },
    SetVolume {
        #[serde(default)]
        channel: ChannelId,
        volume: f32,
    },
    ToggleMute {
        #[serde(default)]
        channel: ChannelId,
    },
    ToggleLoop {
        #[serde(default)]
        channel: ChannelId,
    },
    ToggleShuffle {
        #[serde(default)]
        channel: ChannelId,
    },
    FadeOut {
        #[serde(default)]
        channel: ChannelId,
        #[serde(default = "default_fade_ms")]
        duration_ms: u64,
        #[serde(default)]
        curve: FadeCurve,
    },

    // ── Cues, loops, effects ──────────────────────────────────────────────
    SetHotCue {
        #[serde(default)]
        channel: ChannelId,
        slot: usize,
        seconds: f64,
    },
    ClearHotCue {
        #[serde(default)]
        channel: ChannelId,
        slot: usize,
    },
    JumpToHotCue {
        #[serde(default)]
        channel: ChannelId,
        slot: usize,
    },
    SetLoopIn {
        #[serde(default)]
        channel: ChannelId,
        seconds: f64,
    },
    SetLoopOut {
        #[serde(default)]
        channel: ChannelId,
        seconds: f64,
    },
    ExitLoop {
        #[serde(default)]
        channel: ChannelId,
    },
    SetQuantize {
        #[serde(default)]
        channel: ChannelId,
        settings: QuantizeSettings,
    },
    AnalyzeBeatGrid {
        #[serde(default)]
        channel: ChannelId,
    },
    BeatInfo {
        #[serde(default)]
        channel: ChannelId,
    },
    ApplyEffects {
        #[serde(default)]
        channel: ChannelId,
        config: EffectsConfig,
    },
    ApplyPreset {
        #[serde(default)]
        channel: ChannelId,
        preset: EffectPreset,
    },

    // ── Jingles, ducking, emergency ───────────────────────────────────────
    PlayJingle {
        track_id: String,
    },
    Duck {
        trigger: DuckTrigger,
    },
    ToggleManualDuck,
    SetDuckingEnabled {
        enabled: bool,
    },
    SetDuckLevel {
        level: f32,
    },
    Emergency {
        mode: EmergencyMode,
    },

    // ── Queue & Auto-DJ ───────────────────────────────────────────────────
    AddToQueue {
        track_id: String,
    },
    RemoveFromQueue {
        entry_id: u64,
    },
    MoveToFront {
        entry_id: u64,
    },
    ClearQueue,
    PlayNext,
    SetAutoAdvance {
        enabled: bool,
    },
    GetQueue,
    SetAutoDj {
        enabled: bool,
    },
    UpdateAutoDjSettings {
        settings: AutoDjSettingsPatch,
    },
    AcceptSuggestion,
    SkipSuggestion,
    LockTrack {
        track_id: String,
    },
    UnlockTrack,
    RequestEnergy {
        level: f32,
    },

    // ── Mic & recording ───────────────────────────────────────────────────
    ListInputDevices,
    StartRecording,
    StopRecording,

    /// Re-fetch the track library; handled by the driver, which owns the
    /// backend client
    ReloadCatalog,
    Status,
}

impl StudioCommand {
    pub fn parse(line: &str) -> Result<Self, String> {
        serde_json::from_str(line).map_err(|e| format!("Bad command: {e}"))
    }
}

/// Run one command against the studio.
pub fn apply<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, command: StudioCommand) -> Result<Value, String> {
    use audio_commands as audio;
    use mic_commands as mic;
    use queue_commands as queue;

    match command {
        StudioCommand::LoadTrack { channel, track_id } => audio::load_track(studio, channel, &track_id),
        StudioCommand::Play { channel } => audio::play(studio, channel),
        StudioCommand::Pause { channel } => audio::pause(studio, channel),
        StudioCommand::Stop { channel } => audio::stop(studio, channel),
        StudioCommand::Seek { channel, seconds } => audio::seek(studio, channel, seconds),
        StudioCommand::SetVolume { channel, volume } => audio::set_volume(studio, channel, volume),
        StudioCommand::ToggleMute { channel } => audio::toggle_mute(studio, channel),
        StudioCommand::ToggleLoop { channel } => audio::toggle_loop(studio, channel),
        StudioCommand::ToggleShuffle { channel } => audio::toggle_shuffle(studio, channel),
        StudioCommand::FadeOut {
            channel,
            duration_ms,
            curve,
        } => audio::fade_out(studio, channel, duration_ms, curve),

        StudioCommand::SetHotCue { channel, slot, seconds } => audio::set_hot_cue(studio, channel, slot, seconds),
        StudioCommand::ClearHotCue { channel, slot } => audio::clear_hot_cue(studio, channel, slot),
        StudioCommand::JumpToHotCue { channel, slot } => audio::jump_to_hot_cue(studio, channel, slot),
        StudioCommand::SetLoopIn { channel, seconds } => audio::set_loop_in(studio, channel, seconds),
        StudioCommand::SetLoopOut { channel, seconds } => audio::set_loop_out(studio, channel, seconds),
        StudioCommand::ExitLoop { channel } => audio::exit_loop(studio, channel),
        StudioCommand::SetQuantize { channel, settings } => audio::set_quantize(studio, channel, settings),
        StudioCommand::AnalyzeBeatGrid { channel } => audio::analyze_beat_grid(studio, channel),
        StudioCommand::BeatInfo { channel } => audio::beat_info(studio, channel),
        StudioCommand::ApplyEffects { channel, config } => audio::apply_effects(studio, channel, config),
        StudioCommand::ApplyPreset { channel, preset } => audio::apply_preset(studio, channel, preset),

        StudioCommand::PlayJingle { track_id } => audio::play_jingle(studio, &track_id),
        StudioCommand::Duck { trigger } => audio::duck(studio, trigger),
        StudioCommand::ToggleManualDuck => audio::toggle_manual_duck(studio),
        StudioCommand::SetDuckingEnabled { enabled } => audio::set_ducking_enabled(studio, enabled),
        StudioCommand::SetDuckLevel { level } => audio::set_duck_level(studio, level),
        StudioCommand::Emergency { mode } => audio::emergency(studio, mode),

        StudioCommand::AddToQueue { track_id } => queue::add_to_queue(studio, &track_id),
        StudioCommand::RemoveFromQueue { entry_id } => queue::remove_from_queue(studio, entry_id),
        StudioCommand::MoveToFront { entry_id } => queue::move_to_front(studio, entry_id),
        StudioCommand::ClearQueue => queue::clear_queue(studio),
        StudioCommand::PlayNext => queue::play_next(studio),
        StudioCommand::SetAutoAdvance { enabled } => queue::set_auto_advance(studio, enabled),
        StudioCommand::GetQueue => queue::get_queue(studio),
        StudioCommand::SetAutoDj { enabled } => queue::set_autodj(studio, enabled),
        StudioCommand::UpdateAutoDjSettings { settings } => queue::update_autodj_settings(studio, settings),
        StudioCommand::AcceptSuggestion => queue::accept_suggestion(studio),
        StudioCommand::SkipSuggestion => queue::skip_suggestion(studio),
        StudioCommand::LockTrack { track_id } => queue::lock_track(studio, &track_id),
        StudioCommand::UnlockTrack => queue::unlock_track(studio),
        StudioCommand::RequestEnergy { level } => queue::request_energy(studio, level),

        StudioCommand::ListInputDevices => mic::list_input_devices(),
        StudioCommand::StartRecording => mic::start_recording(studio),
        StudioCommand::StopRecording => mic::stop_recording(studio),

        StudioCommand::ReloadCatalog => Err("reload_catalog needs the backend client".into()),
        StudioCommand::Status => audio::status(studio),
    }
}

/// `Ok(null)` on success, a short message otherwise.
pub(crate) fn done(ok: bool, what: &str) -> Result<Value, String> {
    if ok {
        Ok(Value::Null)
    } else {
        Err(format!("{what} failed"))
    }
}

pub(crate) fn to_value(value: impl serde::Serialize) -> Result<Value, String> {
    serde_json::to_value(value).map_err(|e| e.to_string())
}
