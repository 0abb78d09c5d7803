use serde::{Deserialize, Serialize};

use super::{
    compressor::{Compressor, CompressorConfig},
    delay::DelayLine,
    eq::ToneShelves,
    reverb::Reverb,
};

/// Echo time used when `delay` is left at zero but `echo` is dialled in.
const DEFAULT_ECHO_SECONDS: f32 = 0.25;
const MAX_DELAY_SECONDS: f32 = 1.0;
const SHELF_RANGE_DB: f32 = 10.0;
const TREBLE_BOOST_DB: f32 = 6.0;

/// Per-channel effect settings as edited from the effects panel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EffectsConfig {
    /// Reverb amount 0..1
    pub reverb: f32,
    /// Echo amount 0..1
    pub echo: f32,
    /// Echo time in seconds 0..1
    pub delay: f32,
    /// Low shelf gain in dB (-10..10)
    pub bass_boost: f32,
    /// High shelf gain in dB (-10..10)
    pub treble: f32,
    /// Extra presence on top of `treble`, 0..1
    pub treble_boost: f32,
    pub distortion: f32,
    pub compression: f32,
}

impl EffectsConfig {
    /// Clamp every field into its documented range; non-finite values become 0.
    pub fn sanitized(self) -> Self {
        fn unit(v: f32) -> f32 {
            if v.is_finite() {
                v.clamp(0.0, 1.0)
            } else {
                0.0
            }
        }
        fn shelf(v: f32) -> f32 {
            if v.is_finite() {
                v.clamp(-SHELF_RANGE_DB, SHELF_RANGE_DB)
            } else {
                0.0
            }
        }
        Self {
            reverb: unit(self.reverb),
            echo: unit(self.echo),
            delay: unit(self.delay),
            bass_boost: shelf(self.bass_boost),
            treble: shelf(self.treble),
            treble_boost: unit(self.treble_boost),
            distortion: unit(self.distortion),
            compression: unit(self.compression),
        }
    }

    /// True when the chain would leave the signal untouched.
    pub fn is_bypass(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectPreset {
    Studio,
    Live,
    Radio,
    Club,
    Podcast,
}

impl EffectPreset {
    pub const ALL: [EffectPreset; 5] = [
        EffectPreset::Studio,
        EffectPreset::Live,
        EffectPreset::Radio,
        EffectPreset::Club,
        EffectPreset::Podcast,
    ];

    pub fn config(self) -> EffectsConfig {
        match self {
            EffectPreset::Studio => EffectsConfig {
                reverb: 0.1,
                compression: 0.3,
                ..Default::default()
            },
            EffectPreset::Live => EffectsConfig {
                reverb: 0.35,
                echo: 0.1,
                delay: 0.12,
                compression: 0.2,
                ..Default::default()
            },
            EffectPreset::Radio => EffectsConfig {
                bass_boost: 3.0,
                treble: 2.0,
                treble_boost: 0.3,
                compression: 0.7,
                ..Default::default()
            },
            EffectPreset::Club => EffectsConfig {
                reverb: 0.2,
                bass_boost: 8.0,
                treble: 1.0,
                compression: 0.5,
                ..Default::default()
            },
            EffectPreset::Podcast => EffectsConfig {
                bass_boost: -2.0,
                treble: 3.0,
                compression: 0.6,
                ..Default::default()
            },
        }
    }
}

// ── Chain ───────────────────────────────────────────────────────────────────

/// Tone shelves → compressor → distortion → echo → reverb.
///
/// Runs on the render thread; `configure` is cheap enough to call between
/// callbacks and never allocates.
pub struct EffectsChain {
    config: EffectsConfig,
    sample_rate: f32,
    tone_l: ToneShelves,
    tone_r: ToneShelves,
    compressor: Compressor,
    echo: DelayLine,
    reverb: Reverb,
    drive: f32,
    drive_norm: f32,
}

impl EffectsChain {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            config: EffectsConfig::default(),
            sample_rate,
            tone_l: ToneShelves::new(sample_rate),
            tone_r: ToneShelves::new(sample_rate),
            compressor: Compressor::new(sample_rate, CompressorConfig::from_amount(0.0)),
            echo: DelayLine::new(sample_rate, MAX_DELAY_SECONDS, DEFAULT_ECHO_SECONDS),
            reverb: Reverb::new(sample_rate),
            drive: 1.0,
            drive_norm: 1.0,
        }
    }

    pub fn config(&self) -> &EffectsConfig {
        &self.config
    }

    pub fn configure(&mut self, config: EffectsConfig) {
        let config = config.sanitized();
        let treble_db = config.treble + config.treble_boost * TREBLE_BOOST_DB;
        self.tone_l.set_gains(config.bass_boost, treble_db);
        self.tone_r.set_gains(config.bass_boost, treble_db);

        if (config.compression - self.config.compression).abs() > 1e-4 {
            self.compressor.reconfigure(CompressorConfig::from_amount(config.compression));
        }

        let echo_secs = if config.delay > 0.0 { config.delay } else { DEFAULT_ECHO_SECONDS };
        self.echo.set_delay_samples((echo_secs * self.sample_rate) as usize);
        self.echo.set_amount(config.echo);
        self.reverb.set_amount(config.reverb);

        self.drive = 1.0 + config.distortion * 20.0;
        self.drive_norm = self.drive.tanh().max(1e-6);
        self.config = config;
    }

    /// Process an interleaved stereo buffer (L R L R …) in place.
    pub fn process(&mut self, buf: &mut [f32]) {
        if self.config.is_bypass() {
            return;
        }
        let tone = !(self.tone_l.is_flat() && self.tone_r.is_flat());
        let compress = self.config.compression > 0.0;
        let distort = self.config.distortion > 0.0;
        let echo = self.echo.is_active();
        let reverb = self.reverb.is_active();

        for frame in buf.chunks_exact_mut(2) {
            let (mut l, mut r) = (frame[0], frame[1]);
            if tone {
                l = self.tone_l.process(l);
                r = self.tone_r.process(r);
            }
            if compress {
                (l, r) = self.compressor.process_frame(l, r);
            }
            if distort {
                l = (l * self.drive).tanh() / self.drive_norm;
                r = (r * self.drive).tanh() / self.drive_norm;
            }
            if echo {
                (l, r) = self.echo.process_frame(l, r);
            }
            if reverb {
                (l, r) = self.reverb.process_frame(l, r);
            }
            frame[0] = l;
            frame[1] = r;
        }
    }
}
