/// `commands/mic_commands.rs` — Microphone and voice recording
use serde_json::Value;

use super::to_value;
use crate::{
    audio::{mic_input::list_input_devices as input_devices, PlaybackBackend},
    state::Studio,
};

/// All available audio input devices.
pub fn list_input_devices() -> Result<Value, String> {
    to_value(input_devices())
}

/// Start recording the host mic; stops by itself at the configured cap.
pub fn start_recording<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    if studio.start_recording() {
        Ok(Value::Null)
    } else {
        Err("Could not start recording".into())
    }
}

/// Finalize the WAV file and return its summary.
pub fn stop_recording<B: PlaybackBackend + Clone>(studio: &mut Studio<B>) -> Result<Value, String> {
    let summary = studio.stop_recording().ok_or_else(|| "Not recording".to_string())?;
    to_value(summary)
}
