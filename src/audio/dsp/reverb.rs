/// `audio/dsp/reverb.rs` — Schroeder reverb for the channel effects chain
///
/// 4 parallel comb filters → 2 series allpass filters per side. Delay lengths
/// are tuned at 44.1 kHz and scaled to the running sample rate.

// Delay lengths in samples at 44100 Hz, offset per side for stereo spread.
const COMB_TUNINGS_L: [usize; 4] = [1116, 1188, 1277, 1356];
const COMB_TUNINGS_R: [usize; 4] = [1139, 1211, 1300, 1379];
const AP_TUNINGS_L: [usize; 2] = [556, 441];
const AP_TUNINGS_R: [usize; 2] = [579, 464];

struct CombFilter {
    buf: Vec<f32>,
    pos: usize,
    feedback: f32,
    damp: f32,
    filter_store: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buf: vec![0.0; size.max(1)],
            pos: 0,
            feedback: 0.5,
            damp: 0.5,
            filter_store: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let out = self.buf[self.pos];
        self.filter_store = out * (1.0 - self.damp) + self.filter_store * self.damp;
        self.buf[self.pos] = input + self.filter_store * self.feedback;
        self.pos = (self.pos + 1) % self.buf.len();
        out
    }
}

struct AllpassFilter {
    buf: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    const FEEDBACK: f32 = 0.5;

    fn new(size: usize) -> Self {
        Self {
            buf: vec![0.0; size.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buf_out = self.buf[self.pos];
        let v = input + buf_out * Self::FEEDBACK;
        self.buf[self.pos] = v;
        self.pos = (self.pos + 1) % self.buf.len();
        buf_out - v
    }
}

struct Side {
    combs: Vec<CombFilter>,
    allpasses: Vec<AllpassFilter>,
}

impl Side {
    fn new(sample_rate: f32, combs: &[usize], allpasses: &[usize]) -> Self {
        let scale = sample_rate / 44_100.0;
        let scaled = |n: usize| (n as f32 * scale).round() as usize;
        Self {
            combs: combs.iter().map(|&n| CombFilter::new(scaled(n))).collect(),
            allpasses: allpasses.iter().map(|&n| AllpassFilter::new(scaled(n))).collect(),
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let mut out: f32 = self.combs.iter_mut().map(|c| c.process(input)).sum();
        for ap in &mut self.allpasses {
            out = ap.process(out);
        }
        out
    }
}

/// Stereo Schroeder reverb driven by a single 0..1 amount.
pub struct Reverb {
    left: Side,
    right: Side,
    wet: f32,
}

impl Reverb {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            left: Side::new(sample_rate, &COMB_TUNINGS_L, &AP_TUNINGS_L),
            right: Side::new(sample_rate, &COMB_TUNINGS_R, &AP_TUNINGS_R),
            wet: 0.0,
        }
    }

    /// Larger amounts mean a bigger room and a wetter mix.
    pub fn set_amount(&mut self, amount: f32) {
        let a = amount.clamp(0.0, 1.0);
        self.wet = a * 0.5;
        let feedback = 0.7 + a * 0.26; // 0.70–0.96
        let damp = 0.6 - a * 0.35;
        for c in self.left.combs.iter_mut().chain(self.right.combs.iter_mut()) {
            c.feedback = feedback;
            c.damp = damp;
        }
    }

    pub fn is_active(&self) -> bool {
        self.wet > 0.0
    }

    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let input = (left + right) * 0.015;
        let out_l = self.left.process(input);
        let out_r = self.right.process(input);
        let dry = 1.0 - self.wet;
        (left * dry + out_l * self.wet, right * dry + out_r * self.wet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_follows_impulse() {
        let mut rv = Reverb::new(44100.0);
        rv.set_amount(0.8);
        rv.process_frame(1.0, 1.0);
        let tail: f32 = (0..4000).map(|_| rv.process_frame(0.0, 0.0).0.abs()).sum();
        assert!(tail > 0.0, "reverb should ring after an impulse");
    }

    #[test]
    fn zero_amount_is_dry() {
        let mut rv = Reverb::new(44100.0);
        rv.set_amount(0.0);
        assert!(!rv.is_active());
        let (l, r) = rv.process_frame(0.25, -0.5);
        assert!((l - 0.25).abs() < 1e-6 && (r + 0.5).abs() < 1e-6);
    }
}
