use thiserror::Error;

use crate::audio::ChannelId;

/// Errors surfaced by the studio core.
///
/// None of these reach the operator as a hard failure: the `Studio` logs each
/// one and hands it to the registered error callback, then carries on in a
/// degraded state.
#[derive(Debug, Error)]
pub enum StudioError {
    #[error("failed to load {location}: {reason}")]
    Load { location: String, reason: String },

    #[error("playback error on {channel} channel: {reason}")]
    Playback { channel: ChannelId, reason: String },

    #[error("no track loaded")]
    NoTrackLoaded,

    #[error("unknown track: {0}")]
    UnknownTrack(String),

    #[error("playback sync failed: {0}")]
    Sync(String),

    #[error("recording error: {0}")]
    Recording(String),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StudioError {
    pub fn load(location: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            location: location.into(),
            reason: reason.to_string(),
        }
    }

    pub fn playback(channel: ChannelId, reason: impl std::fmt::Display) -> Self {
        Self::Playback {
            channel,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StudioError>;
