pub mod analyzer;
pub mod backend;
pub mod channel;
pub mod decoder;
pub mod dsp;
pub mod ducking;
pub mod engine;
pub mod fade;
pub mod loader;
pub mod mic_input;
pub mod mixer;
pub mod player;
pub mod recorder;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use backend::{BackendEvent, PlaybackBackend};
pub use ducking::{DuckReason, DuckTrigger, DuckingCoordinator};
pub use player::{AudioPlayer, PlayerEvent, PlayerState};

/// The two independent playable channels of the studio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelId {
    /// Background music, driven by the queue and Auto-DJ
    #[default]
    Music,
    /// Jingles and sound drops
    Jingle,
}

impl ChannelId {
    pub const ALL: [ChannelId; 2] = [ChannelId::Music, ChannelId::Jingle];

    pub fn as_str(self) -> &'static str {
        match self {
            ChannelId::Music => "music",
            ChannelId::Jingle => "jingle",
        }
    }

    /// Slot index used by the output engine.
    pub(crate) fn index(self) -> usize {
        match self {
            ChannelId::Music => 0,
            ChannelId::Jingle => 1,
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
