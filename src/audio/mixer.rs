use serde::{Deserialize, Serialize};

use super::ChannelId;

/// Per-channel trim on the master bus, applied after the player's own gain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelStrip {
    /// 0.0 – 1.0 (linear; 0 dB at 1.0)
    pub fader: f32,
}

impl Default for ChannelStrip {
    fn default() -> Self {
        Self { fader: 1.0 }
    }
}

/// Music + jingle → stereo master bus. Buffers are interleaved stereo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mixer {
    pub music: ChannelStrip,
    pub jingle: ChannelStrip,
    pub master_gain: f32,
}

impl Default for Mixer {
    fn default() -> Self {
        Self {
            music: ChannelStrip::default(),
            jingle: ChannelStrip::default(),
            master_gain: 1.0,
        }
    }
}

impl Mixer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strip(&self, id: ChannelId) -> &ChannelStrip {
        match id {
            ChannelId::Music => &self.music,
            ChannelId::Jingle => &self.jingle,
        }
    }

    pub fn strip_mut(&mut self, id: ChannelId) -> &mut ChannelStrip {
        match id {
            ChannelId::Music => &mut self.music,
            ChannelId::Jingle => &mut self.jingle,
        }
    }

    /// Overwrite `master` with the trimmed sum of both channels, hard-clipped
    /// to ±1.
    ///
    /// **Called on the real-time audio thread: no allocations.**
    pub fn mix_into(&self, master: &mut [f32], music: &[f32], jingle: &[f32]) {
        debug_assert_eq!(master.len(), music.len());
        debug_assert_eq!(master.len(), jingle.len());

        let (gm, gj, g) = (self.music.fader, self.jingle.fader, self.master_gain);
        for ((out, &m), &j) in master.iter_mut().zip(music).zip(jingle) {
            *out = ((m * gm + j * gj) * g).clamp(-1.0, 1.0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_channels_with_trim() {
        let mut mixer = Mixer::new();
        mixer.strip_mut(ChannelId::Jingle).fader = 0.5;
        let music = [0.25, -0.25, 0.25, -0.25];
        let jingle = [0.5, 0.5, 0.5, 0.5];
        let mut out = [9.0; 4];
        mixer.mix_into(&mut out, &music, &jingle);
        assert!((out[0] - 0.5).abs() < 1e-6);
        assert!(out[1].abs() < 1e-6);
    }

    #[test]
    fn output_is_clipped() {
        let mixer = Mixer {
            master_gain: 4.0,
            ..Mixer::default()
        };
        let mut out = [0.0; 2];
        mixer.mix_into(&mut out, &[0.5, -0.5], &[0.0, 0.0]);
        assert_eq!(out, [1.0, -1.0]);
    }
}
