use std::sync::{
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
    Arc,
};

use ringbuf::traits::Consumer as _;
use serde::{Deserialize, Serialize};

use super::{
    analyzer::spectrum::AnalyserTap,
    decoder::DecoderHandle,
    dsp::{EffectsChain, EffectsConfig},
    fade::GainRamp,
    ChannelId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VoiceState {
    Idle,
    Ready,
    Playing,
    Paused,
    /// Played through to the end of the source
    Finished,
}

/// Lock-free readings the control thread can take without touching the
/// render thread's state.
#[derive(Debug, Default)]
pub struct ChannelMeters {
    frames_consumed: AtomicU64,
    sample_rate: AtomicU32,
    playing: AtomicBool,
    peak_left: AtomicU32,
    peak_right: AtomicU32,
}

impl ChannelMeters {
    pub fn position_seconds(&self) -> f64 {
        let sr = self.sample_rate.load(Ordering::Relaxed);
        if sr == 0 {
            return 0.0;
        }
        self.frames_consumed.load(Ordering::Relaxed) as f64 / sr as f64
    }

    pub fn is_playing(&self) -> bool {
        self.playing.load(Ordering::Relaxed)
    }

    /// Post-gain peak per side, linear 0..1.
    pub fn peaks(&self) -> (f32, f32) {
        (
            f32::from_bits(self.peak_left.load(Ordering::Relaxed)),
            f32::from_bits(self.peak_right.load(Ordering::Relaxed)),
        )
    }
}

/// One playable slot inside the output engine.
///
/// The voice owns no thread; the engine's render callback calls
/// `fill_buffer()` whenever it needs audio.
pub struct ChannelVoice {
    pub id: ChannelId,
    state: VoiceState,
    decoder: Option<DecoderHandle>,
    frames_consumed: u64,
    gain: GainRamp,
    effects: EffectsChain,
    tap: Option<AnalyserTap>,
    meters: Arc<ChannelMeters>,
}

impl ChannelVoice {
    pub fn new(id: ChannelId, sample_rate: u32, meters: Arc<ChannelMeters>, tap: Option<AnalyserTap>) -> Self {
        meters.sample_rate.store(sample_rate, Ordering::Relaxed);
        Self {
            id,
            state: VoiceState::Idle,
            decoder: None,
            frames_consumed: 0,
            gain: GainRamp::new(1.0),
            effects: EffectsChain::new(sample_rate as f32),
            tap,
            meters,
        }
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Swap in a freshly spawned decoder at `start_frame`.
    ///
    /// With `keep_state` the voice keeps playing or stays paused (seek);
    /// otherwise it becomes `Ready` (load / stop).
    pub fn attach(&mut self, decoder: DecoderHandle, start_frame: u64, keep_state: bool) {
        self.meters.sample_rate.store(decoder.info.sample_rate, Ordering::Relaxed);
        self.decoder = Some(decoder);
        self.frames_consumed = start_frame;
        self.publish_position();
        if !keep_state || self.state == VoiceState::Finished || self.state == VoiceState::Idle {
            self.set_state(VoiceState::Ready);
        }
    }

    pub fn play(&mut self) {
        if matches!(self.state, VoiceState::Ready | VoiceState::Paused) {
            self.set_state(VoiceState::Playing);
        }
    }

    pub fn pause(&mut self) {
        if self.state == VoiceState::Playing {
            self.set_state(VoiceState::Paused);
        }
    }

    pub fn set_gain(&mut self, gain: f32, ramp_frames: u32) {
        self.gain.set_target(gain.clamp(0.0, 1.0), ramp_frames);
    }

    pub fn set_effects(&mut self, config: EffectsConfig) {
        self.effects.configure(config);
    }

    /// Fill `output` with interleaved stereo samples.
    ///
    /// Returns true exactly once, on the callback where the source runs dry.
    ///
    /// **Called on the real-time audio thread: no allocations, no locks.**
    pub fn fill_buffer(&mut self, output: &mut [f32]) -> bool {
        if self.state != VoiceState::Playing {
            output.fill(0.0);
            self.store_peaks(0.0, 0.0);
            return false;
        }
        let Some(decoder) = self.decoder.as_mut() else {
            output.fill(0.0);
            return false;
        };

        let popped = decoder.consumer.pop_slice(output);
        output[popped..].fill(0.0);
        let drained = popped < output.len() && decoder.is_drained();
        self.frames_consumed += (popped / 2) as u64;

        self.effects.process(output);

        let (mut peak_l, mut peak_r) = (0.0_f32, 0.0_f32);
        for frame in output.chunks_exact_mut(2) {
            let g = self.gain.next_gain();
            frame[0] *= g;
            frame[1] *= g;
            peak_l = peak_l.max(frame[0].abs());
            peak_r = peak_r.max(frame[1].abs());
        }
        self.store_peaks(peak_l, peak_r);

        if let Some(tap) = self.tap.as_mut() {
            tap.push_interleaved(output, 2);
        }

        self.publish_position();
        if drained {
            self.set_state(VoiceState::Finished);
        }
        drained
    }

    fn set_state(&mut self, state: VoiceState) {
        self.state = state;
        self.meters.playing.store(state == VoiceState::Playing, Ordering::Relaxed);
    }

    fn publish_position(&self) {
        self.meters.frames_consumed.store(self.frames_consumed, Ordering::Relaxed);
    }

    fn store_peaks(&self, l: f32, r: f32) {
        self.meters.peak_left.store(l.to_bits(), Ordering::Relaxed);
        self.meters.peak_right.store(r.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_voice_outputs_silence() {
        let meters = Arc::new(ChannelMeters::default());
        let mut voice = ChannelVoice::new(ChannelId::Music, 44_100, Arc::clone(&meters), None);
        let mut buf = vec![1.0_f32; 64];
        assert!(!voice.fill_buffer(&mut buf));
        assert!(buf.iter().all(|&s| s == 0.0));
        assert_eq!(meters.position_seconds(), 0.0);
        assert!(!meters.is_playing());
    }

    #[test]
    fn play_without_source_does_nothing() {
        let meters = Arc::new(ChannelMeters::default());
        let mut voice = ChannelVoice::new(ChannelId::Jingle, 44_100, meters, None);
        voice.play();
        assert_eq!(voice.state(), VoiceState::Idle);
    }
}
