/// Feedback delay line used for both the short "echo" slap and the longer
/// "delay" repeat. Stereo, one buffer per side.
pub struct DelayLine {
    buf_l: Vec<f32>,
    buf_r: Vec<f32>,
    pos: usize,
    delay_samples: usize,
    feedback: f32,
    mix: f32,
}

impl DelayLine {
    /// `max_seconds` bounds the buffer; `delay_seconds` is clamped into it.
    pub fn new(sample_rate: f32, max_seconds: f32, delay_seconds: f32) -> Self {
        let len = ((sample_rate * max_seconds) as usize).max(1);
        let mut d = Self {
            buf_l: vec![0.0; len],
            buf_r: vec![0.0; len],
            pos: 0,
            delay_samples: 1,
            feedback: 0.0,
            mix: 0.0,
        };
        d.set_delay_samples((sample_rate * delay_seconds) as usize);
        d
    }

    pub fn set_delay_samples(&mut self, samples: usize) {
        self.delay_samples = samples.clamp(1, self.buf_l.len());
    }

    /// `amount` 0..1 drives both wet mix and feedback.
    pub fn set_amount(&mut self, amount: f32) {
        let a = amount.clamp(0.0, 1.0);
        self.mix = a * 0.5;
        self.feedback = a * 0.6;
    }

    pub fn is_active(&self) -> bool {
        self.mix > 0.0
    }

    #[inline]
    pub fn process_frame(&mut self, left: f32, right: f32) -> (f32, f32) {
        let len = self.buf_l.len();
        let read = (self.pos + len - self.delay_samples) % len;
        let wet_l = self.buf_l[read];
        let wet_r = self.buf_r[read];
        self.buf_l[self.pos] = left + wet_l * self.feedback;
        self.buf_r[self.pos] = right + wet_r * self.feedback;
        self.pos = (self.pos + 1) % len;
        (left + wet_l * self.mix, right + wet_r * self.mix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn impulse_repeats_after_delay() {
        let mut d = DelayLine::new(1000.0, 1.0, 0.1);
        d.set_amount(1.0);
        let mut outs = Vec::new();
        outs.push(d.process_frame(1.0, 1.0).0);
        for _ in 0..150 {
            outs.push(d.process_frame(0.0, 0.0).0);
        }
        assert!((outs[0] - 1.0).abs() < 1e-6);
        assert!(outs[50].abs() < 1e-6);
        assert!((outs[100] - 0.5).abs() < 1e-6, "echo = {}", outs[100]);
    }

    #[test]
    fn zero_amount_is_dry() {
        let mut d = DelayLine::new(1000.0, 1.0, 0.1);
        d.set_amount(0.0);
        assert!(!d.is_active());
        assert_eq!(d.process_frame(0.3, -0.3), (0.3, -0.3));
    }
}
