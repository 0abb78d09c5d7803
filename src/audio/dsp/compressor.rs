use serde::{Deserialize, Serialize};

use super::{db_to_linear, linear_to_db};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressorConfig {
    /// Compression threshold in dBFS
    pub threshold_db: f32,
    /// Compression ratio (e.g. 4.0 = 4:1)
    pub ratio: f32,
    /// Knee width in dB (0 = hard knee)
    pub knee_db: f32,
    pub attack_ms: f32,
    pub release_ms: f32,
    pub makeup_db: f32,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            threshold_db: -18.0,
            ratio: 3.0,
            knee_db: 6.0,
            attack_ms: 5.0,
            release_ms: 50.0,
            makeup_db: 0.0,
        }
    }
}

impl CompressorConfig {
    /// Map a 0..1 "compression amount" knob onto compressor settings.
    /// 0 leaves the signal untouched; 1 is a heavy broadcast squash.
    pub fn from_amount(amount: f32) -> Self {
        let a = amount.clamp(0.0, 1.0);
        Self {
            threshold_db: -6.0 - 24.0 * a,
            ratio: 1.0 + 7.0 * a,
            makeup_db: 6.0 * a,
            ..Default::default()
        }
    }
}

/// Stereo-linked peak compressor with soft knee.
pub struct Compressor {
    config: CompressorConfig,
    /// Smoothed detector level (linear)
    detector: f32,
    attack_coeff: f32,
    release_coeff: f32,
    makeup_gain: f32,
    sample_rate: f32,
}

impl Compressor {
    pub fn new(sample_rate: f32, config: CompressorConfig) -> Self {
        let mut c = Self {
            config: CompressorConfig::default(),
            detector: 0.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            makeup_gain: 1.0,
            sample_rate,
        };
        c.reconfigure(config);
        c
    }

    pub fn reconfigure(&mut self, config: CompressorConfig) {
        self.attack_coeff = time_coeff(config.attack_ms, self.sample_rate);
        self.release_coeff = time_coeff(config.release_ms, self.sample_rate);
        self.makeup_gain = db_to_linear(config.makeup_db);
        self.config = config;
    }

    /// Process one stereo frame; both sides share the detector.
    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let abs_in = left.abs().max(right.abs());
        let coeff = if abs_in > self.detector {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.detector = coeff * self.detector + (1.0 - coeff) * abs_in;

        let gain = db_to_linear(self.compute_gain_db(linear_to_db(self.detector))) * self.makeup_gain;
        (left * gain, right * gain)
    }

    /// Gain change in dB for a detector level; quadratic across the knee.
    #[inline]
    fn compute_gain_db(&self, level_db: f32) -> f32 {
        let slope = 1.0 / self.config.ratio.max(1.0) - 1.0;
        let over = level_db - self.config.threshold_db;
        let knee = self.config.knee_db.max(0.0);

        if 2.0 * over <= -knee {
            0.0
        } else if 2.0 * over.abs() < knee {
            let x = over + knee / 2.0;
            slope * x * x / (2.0 * knee)
        } else {
            slope * over
        }
    }
}

#[inline]
fn time_coeff(time_ms: f32, sample_rate: f32) -> f32 {
    if time_ms <= 0.0 {
        return 0.0;
    }
    let samples = (time_ms / 1000.0) * sample_rate;
    (-1.0_f32 / samples.max(1.0)).exp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_signal_untouched() {
        let mut comp = Compressor::new(44100.0, CompressorConfig::default());
        let (l, r) = comp.process_frame(0.01, -0.01);
        assert!((l - 0.01).abs() < 1e-6);
        assert!((r + 0.01).abs() < 1e-6);
    }

    #[test]
    fn loud_signal_reduced() {
        let cfg = CompressorConfig {
            threshold_db: -20.0,
            ratio: 10.0,
            knee_db: 0.0,
            attack_ms: 0.1,
            release_ms: 10.0,
            makeup_db: 0.0,
        };
        let mut comp = Compressor::new(44100.0, cfg);
        let mut out = 0.0;
        for _ in 0..2000 {
            out = comp.process_frame(0.9, 0.9).0;
        }
        assert!(out < 0.5, "expected gain reduction, got {out}");
    }

    #[test]
    fn zero_amount_is_unity_ratio() {
        let cfg = CompressorConfig::from_amount(0.0);
        assert!((cfg.ratio - 1.0).abs() < 1e-6);
        assert!(cfg.makeup_db.abs() < 1e-6);
    }
}
