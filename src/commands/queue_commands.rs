use serde_json::{json, Value};

use super::{done, to_value};
use crate::{
    audio::PlaybackBackend,
    scheduler::{queue::QueueEntry, AutoDjSettingsPatch},
    state::Studio,
};

// ── Play Queue ───────────────────────────────────────────────────────────────

pub fn add_to_queue<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, track_id: &str) -> Result<Value, String> {
    let entry_id = studio
        .add_to_queue(track_id)
        .ok_or_else(|| format!("Could not queue {track_id}"))?;
    Ok(json!({ "entry_id": entry_id }))
}

pub fn remove_from_queue<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, entry_id: u64) -> Result<Value, String> {
    done(studio.remove_from_queue(entry_id), "remove_from_queue")
}

pub fn move_to_front<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, entry_id: u64) -> Result<Value, String> {
    done(studio.move_to_front(entry_id), "move_to_front")
}

pub fn clear_queue<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    studio.clear_queue();
    Ok(Value::Null)
}

pub fn play_next<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    done(studio.play_next(), "play_next")
}

pub fn set_auto_advance<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, enabled: bool) -> Result<Value, String> {
    studio.set_auto_advance(enabled);
    Ok(Value::Null)
}

pub fn get_queue<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    let queue = studio.queue();
    let entries: Vec<&QueueEntry> = queue.entries().collect();
    Ok(json!({
        "entries": to_value(entries)?,
        "stats": to_value(queue.queue_stats())?,
        "version": queue.version(),
    }))
}

// ── Auto-DJ ──────────────────────────────────────────────────────────────────

pub fn set_autodj<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, enabled: bool) -> Result<Value, String> {
    studio.set_autodj_enabled(enabled);
    Ok(Value::Null)
}

pub fn update_autodj_settings<B: PlaybackBackend + Clone>(
    studio: &mut Studio<B>,
    patch: AutoDjSettingsPatch,
) -> Result<Value, String> {
    studio.update_autodj_settings(patch);
    to_value(studio.autodj().settings())
}

pub fn accept_suggestion<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    let track_id = studio
        .accept_suggestion()
        .ok_or_else(|| "No suggestion to accept".to_string())?;
    Ok(json!({ "track_id": track_id }))
}

pub fn skip_suggestion<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    done(studio.skip_suggestion(), "skip_suggestion")
}

pub fn lock_track<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, track_id: &str) -> Result<Value, String> {
    let entry_id = studio
        .lock_track(track_id)
        .ok_or_else(|| format!("Could not lock {track_id}"))?;
    Ok(json!({ "entry_id": entry_id }))
}

pub fn unlock_track<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    Ok(json!({ "released": studio.unlock_track() }))
}

pub fn request_energy<B: PlaybackBackend + Clone>(studio: &mut Studio<B>, level: f32) -> Result<Value, String> {
    studio.request_energy(level);
    Ok(json!({ "energy_target": studio.autodj().settings().energy_target }))
}
