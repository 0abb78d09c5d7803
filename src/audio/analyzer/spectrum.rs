/// `audio/analyzer/spectrum.rs` — Live frequency analysis
///
/// The render thread pushes a mono downmix into an `AnalyserTap`; the paired
/// `SpectrumAnalyser` keeps the latest `fft_size` samples and produces a
/// smoothed, dB-normalised magnitude snapshot on demand. Band extraction
/// (`analyze_frequency_bands`) is a pure function over that snapshot.
use std::sync::Arc;

use ringbuf::{
    traits::{Consumer as _, Producer as _, Split},
    HeapRb,
};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FFT_SIZE: usize = 2048;
pub const DEFAULT_SMOOTHING: f32 = 0.8;
pub const MIN_DECIBELS: f32 = -100.0;
pub const MAX_DECIBELS: f32 = -30.0;

const BASS_HZ: (f32, f32) = (20.0, 250.0);
const MID_HZ: (f32, f32) = (250.0, 2_000.0);
const HIGH_HZ: (f32, f32) = (2_000.0, 20_000.0);

// ── Bands ───────────────────────────────────────────────────────────────────

/// Energy per band, each in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FrequencyBands {
    pub bass: f32,
    pub mid: f32,
    pub high: f32,
}

/// Frequency-domain view of the signal: one normalised magnitude per FFT bin.
#[derive(Debug, Clone, PartialEq)]
pub struct SpectrumSnapshot {
    /// Bin magnitudes in [0, 1]; bin `k` is centred on `k * bin_hz`
    pub magnitudes: Vec<f32>,
    pub bin_hz: f32,
}

/// Anything that can produce a spectrum snapshot of a live signal.
///
/// Returns `None` once the node is disposed or has nothing to analyse.
pub trait AnalysisNode {
    fn snapshot(&mut self) -> Option<SpectrumSnapshot>;
}

/// Sample a live node into bass/mid/high bands.
///
/// A missing or disposed node yields all-zero bands.
pub fn analyze_frequency_bands(node: Option<&mut dyn AnalysisNode>) -> FrequencyBands {
    match node.and_then(|n| n.snapshot()) {
        Some(snapshot) => bands_from_snapshot(&snapshot),
        None => FrequencyBands::default(),
    }
}

pub fn bands_from_snapshot(snapshot: &SpectrumSnapshot) -> FrequencyBands {
    if !snapshot.bin_hz.is_finite() || snapshot.bin_hz <= 0.0 || snapshot.magnitudes.is_empty() {
        return FrequencyBands::default();
    }
    FrequencyBands {
        bass: band_average(snapshot, BASS_HZ),
        mid: band_average(snapshot, MID_HZ),
        high: band_average(snapshot, HIGH_HZ),
    }
}

fn band_average(snapshot: &SpectrumSnapshot, (lo_hz, hi_hz): (f32, f32)) -> f32 {
    let len = snapshot.magnitudes.len();
    let lo = ((lo_hz / snapshot.bin_hz).ceil() as usize).min(len);
    let hi = ((hi_hz / snapshot.bin_hz).ceil() as usize).min(len);
    if hi <= lo {
        return 0.0;
    }
    let bins = &snapshot.magnitudes[lo..hi];
    let sum: f32 = bins
        .iter()
        .map(|m| if m.is_finite() { m.clamp(0.0, 1.0) } else { 0.0 })
        .sum();
    (sum / bins.len() as f32).clamp(0.0, 1.0)
}

// ── Tap / analyser pair ─────────────────────────────────────────────────────

/// Render-thread side: receives a mono downmix of whatever the channel plays.
pub struct AnalyserTap {
    producer: ringbuf::HeapProd<f32>,
}

impl AnalyserTap {
    /// Downmix interleaved frames to mono and push them. Drops samples when
    /// the analyser falls behind.
    ///
    /// **Called on the real-time audio thread — no allocations.**
    pub fn push_interleaved(&mut self, samples: &[f32], channels: usize) {
        let channels = channels.max(1);
        let scale = 1.0 / channels as f32;
        for frame in samples.chunks_exact(channels) {
            let mono = frame.iter().sum::<f32>() * scale;
            if self.producer.try_push(mono).is_err() {
                break;
            }
        }
    }
}

/// Control-thread side: FFT over the most recent window of samples.
pub struct SpectrumAnalyser {
    consumer: ringbuf::HeapCons<f32>,
    history: Vec<f32>,
    incoming: Vec<f32>,
    window: Vec<f32>,
    smoothed: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    fft: Arc<dyn Fft<f32>>,
    sample_rate: f32,
    smoothing: f32,
    disposed: bool,
}

/// Build a connected tap/analyser pair.
pub fn analyser_pair(sample_rate: u32, fft_size: usize) -> (AnalyserTap, SpectrumAnalyser) {
    let fft_size = fft_size.max(32).next_power_of_two();
    let rb = HeapRb::<f32>::new(fft_size * 4);
    let (producer, consumer) = rb.split();

    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(fft_size);

    let analyser = SpectrumAnalyser {
        consumer,
        history: vec![0.0; fft_size],
        incoming: vec![0.0; fft_size],
        window: blackman(fft_size),
        smoothed: vec![0.0; fft_size / 2],
        scratch: vec![Complex::new(0.0, 0.0); fft_size],
        fft,
        sample_rate: sample_rate as f32,
        smoothing: DEFAULT_SMOOTHING,
        disposed: false,
    };
    (AnalyserTap { producer }, analyser)
}

impl SpectrumAnalyser {
    pub fn fft_size(&self) -> usize {
        self.history.len()
    }

    pub fn set_smoothing(&mut self, smoothing: f32) {
        self.smoothing = smoothing.clamp(0.0, 0.99);
    }

    /// Detach from the signal; subsequent snapshots return `None`.
    pub fn dispose(&mut self) {
        self.disposed = true;
        self.smoothed.fill(0.0);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    fn drain(&mut self) {
        let n = self.history.len();
        loop {
            let got = self.consumer.pop_slice(&mut self.incoming);
            if got == 0 {
                break;
            }
            if got >= n {
                self.history.copy_from_slice(&self.incoming[got - n..got]);
            } else {
                self.history.copy_within(got.., 0);
                self.history[n - got..].copy_from_slice(&self.incoming[..got]);
            }
        }
    }
}

impl AnalysisNode for SpectrumAnalyser {
    fn snapshot(&mut self) -> Option<SpectrumSnapshot> {
        if self.disposed {
            return None;
        }
        self.drain();

        let n = self.history.len();
        for ((c, &s), &w) in self.scratch.iter_mut().zip(&self.history).zip(&self.window) {
            *c = Complex::new(s * w, 0.0);
        }
        self.fft.process(&mut self.scratch);

        let range = MAX_DECIBELS - MIN_DECIBELS;
        let mut magnitudes = Vec::with_capacity(n / 2);
        for (k, prev) in self.smoothed.iter_mut().enumerate() {
            let mag = self.scratch[k].norm() / n as f32;
            *prev = self.smoothing * *prev + (1.0 - self.smoothing) * mag;
            let db = 20.0 * prev.max(1e-12).log10();
            magnitudes.push(((db - MIN_DECIBELS) / range).clamp(0.0, 1.0));
        }

        Some(SpectrumSnapshot {
            magnitudes,
            bin_hz: self.sample_rate / n as f32,
        })
    }
}

fn blackman(n: usize) -> Vec<f32> {
    let denom = n as f32;
    (0..n)
        .map(|i| {
            let x = 2.0 * std::f32::consts::PI * i as f32 / denom;
            0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Disposed;

    impl AnalysisNode for Disposed {
        fn snapshot(&mut self) -> Option<SpectrumSnapshot> {
            None
        }
    }

    #[test]
    fn missing_node_yields_zero_bands() {
        assert_eq!(analyze_frequency_bands(None), FrequencyBands::default());
        let mut node = Disposed;
        let bands = analyze_frequency_bands(Some(&mut node));
        assert_eq!(bands, FrequencyBands { bass: 0.0, mid: 0.0, high: 0.0 });
    }

    #[test]
    fn disposed_analyser_yields_zero_bands() {
        let (_tap, mut analyser) = analyser_pair(44_100, DEFAULT_FFT_SIZE);
        analyser.dispose();
        assert_eq!(analyze_frequency_bands(Some(&mut analyser)), FrequencyBands::default());
    }

    #[test]
    fn snapshot_partitions_into_three_bands() {
        // 10 Hz bins: bass = bins 2..25, mid = 25..200, high = 200..
        let mut magnitudes = vec![0.0; 1024];
        for m in &mut magnitudes[2..25] {
            *m = 1.0;
        }
        for m in &mut magnitudes[25..200] {
            *m = 0.5;
        }
        let bands = bands_from_snapshot(&SpectrumSnapshot { magnitudes, bin_hz: 10.0 });
        assert!((bands.bass - 1.0).abs() < 1e-6, "bass = {}", bands.bass);
        assert!((bands.mid - 0.5).abs() < 1e-6, "mid = {}", bands.mid);
        assert!(bands.high.abs() < 1e-6, "high = {}", bands.high);
    }

    #[test]
    fn bad_values_are_clamped() {
        let bands = bands_from_snapshot(&SpectrumSnapshot {
            magnitudes: vec![f32::NAN, 7.0, -3.0, 1.0],
            bin_hz: 100.0,
        });
        assert!(bands.bass >= 0.0 && bands.bass <= 1.0);
        assert!(!bands.mid.is_nan());

        let bands = bands_from_snapshot(&SpectrumSnapshot {
            magnitudes: vec![1.0; 8],
            bin_hz: f32::NAN,
        });
        assert_eq!(bands, FrequencyBands::default());
    }

    #[test]
    fn low_sine_lands_in_bass() {
        let sr = 44_100;
        let (mut tap, mut analyser) = analyser_pair(sr, DEFAULT_FFT_SIZE);
        let stereo: Vec<f32> = (0..DEFAULT_FFT_SIZE)
            .flat_map(|i| {
                let s = 0.8 * (2.0 * std::f32::consts::PI * 100.0 * i as f32 / sr as f32).sin();
                [s, s]
            })
            .collect();
        tap.push_interleaved(&stereo, 2);

        let mut bands = FrequencyBands::default();
        for _ in 0..4 {
            bands = analyze_frequency_bands(Some(&mut analyser));
        }
        assert!(bands.bass > 0.1, "bass = {}", bands.bass);
        assert!(bands.bass > bands.high, "{bands:?}");
        assert!(bands.high < 0.05, "high = {}", bands.high);
    }
}
