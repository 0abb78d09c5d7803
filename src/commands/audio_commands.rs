use std::time::Duration;

use serde_json::{json, Value};

use super::{done, to_value};
use crate::{
    audio::{
        analyzer::{
            quantize::{
                beat_markers, beat_position, is_on_beat, quantize_backward, quantize_forward, time_until_next_beat,
                ON_BEAT_TOLERANCE_SECS,
            },
            BeatGrid, QuantizeSettings,
        },
        dsp::{EffectPreset, EffectsConfig},
        ducking::DuckTrigger,
        fade::FadeCurve,
        ChannelId, PlaybackBackend,
    },
    state::{EmergencyMode, Studio},
};

pub fn load_track<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    track_id: &str,
) -> Result<Value, String> {
    done(studio.load_track(channel, track_id), "load_track")
}

pub fn play<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    done(studio.play(channel), "play")
}

pub fn pause<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    studio.pause(channel);
    Ok(Value::Null)
}

pub fn stop<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    studio.stop(channel);
    Ok(Value::Null)
}

pub fn seek<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    seconds: f64,
) -> Result<Value, String> {
    done(studio.seek(channel, seconds), "seek")?;
    Ok(json!({ "position": studio.player(channel).state().playback_position_seconds }))
}

pub fn set_volume<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    volume: f32,
) -> Result<Value, String> {
    studio.set_volume(channel, volume);
    Ok(json!({ "volume": studio.player(channel).state().volume }))
}

pub fn toggle_mute<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    Ok(json!({ "muted": studio.toggle_mute(channel) }))
}

pub fn toggle_loop<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    Ok(json!({ "looping": studio.toggle_loop(channel) }))
}

pub fn toggle_shuffle<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
) -> Result<Value, String> {
    Ok(json!({ "shuffling": studio.toggle_shuffle(channel) }))
}

pub fn fade_out<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    duration_ms: u64,
    curve: FadeCurve,
) -> Result<Value, String> {
    if studio.fade_out(channel, Duration::from_millis(duration_ms), curve) {
        Ok(Value::Null)
    } else {
        Err(format!("Nothing playing on {channel}"))
    }
}

// ── Cues & loops ─────────────────────────────────────────────────────────────

/// Marker commands answer with the stored (possibly quantized) time.
fn placed(at: Option<f64>) -> Result<Value, String> {
    at.map(|t| json!({ "seconds": t }))
        .ok_or_else(|| "No track loaded or invalid marker".to_string())
}

pub fn set_hot_cue<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    slot: usize,
    seconds: f64,
) -> Result<Value, String> {
    placed(studio.set_hot_cue(channel, slot, seconds))
}

pub fn clear_hot_cue<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    slot: usize,
) -> Result<Value, String> {
    studio.clear_hot_cue(channel, slot);
    Ok(Value::Null)
}

pub fn jump_to_hot_cue<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    slot: usize,
) -> Result<Value, String> {
    done(studio.jump_to_hot_cue(channel, slot), "jump_to_hot_cue")
}

pub fn set_loop_in<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    seconds: f64,
) -> Result<Value, String> {
    placed(studio.set_loop_in(channel, seconds))
}

pub fn set_loop_out<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    seconds: f64,
) -> Result<Value, String> {
    placed(studio.set_loop_out(channel, seconds))
}

pub fn exit_loop<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    studio.exit_loop(channel);
    Ok(Value::Null)
}

pub fn set_quantize<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    settings: QuantizeSettings,
) -> Result<Value, String> {
    studio.set_quantize(channel, settings);
    Ok(Value::Null)
}

pub fn analyze_beat_grid<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
) -> Result<Value, String> {
    done(studio.analyze_beat_grid(channel), "analyze_beat_grid")?;
    to_value(studio.player(channel).beat_grid())
}

/// Where the playhead sits on the beat grid, plus the surrounding grid points
/// and every beat marker of the loaded track.
pub fn beat_info<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, channel: ChannelId) -> Result<Value, String> {
    let player = studio.player(channel);
    let grid = player
        .beat_grid()
        .filter(BeatGrid::is_valid)
        .ok_or_else(|| format!("No beat grid on {channel}"))?;
    let state = player.state();
    let t = state.playback_position_seconds;
    let pos = beat_position(t, &grid).ok_or_else(|| format!("No beat position on {channel}"))?;
    let settings = player.quantize_settings();
    Ok(json!({
        "bpm": grid.bpm,
        "position": t,
        "bar": pos.bar,
        "beat": pos.beat,
        "phase": pos.phase,
        "until_next_beat": time_until_next_beat(t, &grid),
        "on_beat": is_on_beat(t, &grid, ON_BEAT_TOLERANCE_SECS),
        "previous_grid_point": quantize_backward(t, Some(&grid), &settings),
        "next_grid_point": quantize_forward(t, Some(&grid), &settings),
        "markers": beat_markers(state.duration_seconds, &grid),
    }))
}

// ── Effects ──────────────────────────────────────────────────────────────────

pub fn apply_effects<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    config: EffectsConfig,
) -> Result<Value, String> {
    studio.apply_effects(channel, config);
    to_value(studio.player(channel).state().applied_effects)
}

pub fn apply_preset<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    channel: ChannelId,
    preset: EffectPreset,
) -> Result<Value, String> {
    studio.apply_preset(channel, preset);
    to_value(studio.player(channel).state().applied_effects)
}

// ── Jingles, ducking, emergency ──────────────────────────────────────────────

pub fn play_jingle<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, track_id: &str) -> Result<Value, String> {
    done(studio.play_jingle(track_id), "play_jingle")
}

pub fn duck<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, trigger: DuckTrigger) -> Result<Value, String> {
    studio.duck_trigger(trigger);
    Ok(json!({ "ducked": studio.ducking().is_ducked() }))
}

pub fn toggle_manual_duck<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    Ok(json!({ "manual": studio.toggle_manual_duck() }))
}

pub fn set_ducking_enabled<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    enabled: bool,
) -> Result<Value, String> {
    studio.set_ducking_enabled(enabled);
    Ok(Value::Null)
}

pub fn set_duck_level<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, level: f32) -> Result<Value, String> {
    studio.set_duck_level(level);
    Ok(json!({ "level": studio.ducking().config().level }))
}

pub fn emergency<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, mode: EmergencyMode) -> Result<Value, String> {
    studio.emergency(mode);
    Ok(json!({ "mode": studio.emergency_mode() }))
}

pub fn status<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    to_value(studio.status())
}
