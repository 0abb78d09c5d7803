use std::{f32::consts::PI, time::Duration};

use serde::{Deserialize, Serialize};

// ── FadeCurve ─────────────────────────────────────────────────────────────────

/// Fade-out curve shape.
///
/// `t` is fade progress in [0.0, 1.0]; 0.0 = full level, 1.0 = silent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    #[default]
    Linear,
    Exponential,
    SCurve,
    Logarithmic,
    ConstantPower,
}

impl FadeCurve {
    /// Remaining gain at fade progress `t`.
    pub fn apply(self, t: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential => (1.0 - t).powi(2),
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::Logarithmic => (1.0 + 9.0 * (1.0 - t)).log10(),
            FadeCurve::ConstantPower => (t * std::f32::consts::FRAC_PI_2).cos(),
        }
    }
}

// ── GainRamp ──────────────────────────────────────────────────────────────────

/// Per-frame linear gain smoother used by the render thread so gain changes
/// (duck, unduck, volume moves) never click.
#[derive(Debug, Clone, Copy)]
pub struct GainRamp {
    current: f32,
    target: f32,
    step: f32,
    remaining: u32,
}

impl GainRamp {
    pub fn new(gain: f32) -> Self {
        Self {
            current: gain,
            target: gain,
            step: 0.0,
            remaining: 0,
        }
    }

    /// Ramp to `target` over `frames` frames; 0 frames jumps immediately.
    pub fn set_target(&mut self, target: f32, frames: u32) {
        self.target = target;
        if frames == 0 {
            self.current = target;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.step = (target - self.current) / frames as f32;
            self.remaining = frames;
        }
    }

    #[inline]
    pub fn next_gain(&mut self) -> f32 {
        if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_settled(&self) -> bool {
        self.remaining == 0
    }
}

// ── FadeOut ───────────────────────────────────────────────────────────────────

/// A manual fade-out in progress on one player.
///
/// The job remembers which transport generation and track it was started
/// for; the owner must drop it when either no longer matches.
#[derive(Debug, Clone)]
pub struct FadeOut {
    pub curve: FadeCurve,
    pub duration: Duration,
    pub elapsed: Duration,
    /// Base volume when the fade started; restored after the stop
    pub start_volume: f32,
    pub track_id: String,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FadeStep {
    /// Keep fading; apply this base volume
    Volume(f32),
    /// Fade reached silence
    Done,
}

impl FadeOut {
    pub fn new(curve: FadeCurve, duration: Duration, start_volume: f32, track_id: String, generation: u64) -> Self {
        Self {
            curve,
            duration,
            elapsed: Duration::ZERO,
            start_volume,
            track_id,
            generation,
        }
    }

    pub fn advance(&mut self, dt: Duration) -> FadeStep {
        self.elapsed += dt;
        if self.duration.is_zero() || self.elapsed >= self.duration {
            return FadeStep::Done;
        }
        let t = self.elapsed.as_secs_f32() / self.duration.as_secs_f32();
        FadeStep::Volume(self.start_volume * self.curve.apply(t))
    }

    pub fn progress(&self) -> f32 {
        if self.duration.is_zero() {
            return 1.0;
        }
        (self.elapsed.as_secs_f32() / self.duration.as_secs_f32()).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    #[test]
    fn curves_span_full_to_silent() {
        for curve in [
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::SCurve,
            FadeCurve::Logarithmic,
            FadeCurve::ConstantPower,
        ] {
            assert!((curve.apply(0.0) - 1.0).abs() < EPS, "{curve:?} start");
            assert!(curve.apply(1.0).abs() < EPS, "{curve:?} end");
            let mid = curve.apply(0.5);
            assert!(mid > 0.0 && mid < 1.0, "{curve:?} mid {mid}");
        }
    }

    #[test]
    fn curves_are_monotonic() {
        for curve in [FadeCurve::Linear, FadeCurve::SCurve, FadeCurve::ConstantPower] {
            let mut prev = curve.apply(0.0);
            for i in 1..=50 {
                let g = curve.apply(i as f32 / 50.0);
                assert!(g <= prev + EPS, "{curve:?} rose at step {i}");
                prev = g;
            }
        }
    }

    #[test]
    fn ramp_reaches_target_exactly() {
        let mut ramp = GainRamp::new(1.0);
        ramp.set_target(0.3, 4);
        let gains: Vec<f32> = (0..6).map(|_| ramp.next_gain()).collect();
        assert!((gains[0] - 0.825).abs() < EPS);
        assert_eq!(gains[3], 0.3);
        assert_eq!(gains[5], 0.3);
        assert!(ramp.is_settled());
    }

    #[test]
    fn ramp_zero_frames_jumps() {
        let mut ramp = GainRamp::new(0.2);
        ramp.set_target(0.9, 0);
        assert_eq!(ramp.current(), 0.9);
        assert_eq!(ramp.next_gain(), 0.9);
    }

    #[test]
    fn fade_out_steps_then_completes() {
        let mut job = FadeOut::new(FadeCurve::Linear, Duration::from_secs(2), 0.8, "t1".into(), 3);
        match job.advance(Duration::from_secs(1)) {
            FadeStep::Volume(v) => assert!((v - 0.4).abs() < EPS, "v = {v}"),
            FadeStep::Done => panic!("finished early"),
        }
        assert!((job.progress() - 0.5).abs() < EPS);
        assert_eq!(job.advance(Duration::from_secs(1)), FadeStep::Done);
    }
}
