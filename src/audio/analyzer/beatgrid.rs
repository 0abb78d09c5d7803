use std::{fs::File, path::Path};

use symphonia::core::{
    audio::{AudioBufferRef, Signal},
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::FormatOptions,
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::quantize::BeatGrid;

/// Onset envelope rate used for tempo estimation.
const ENVELOPE_HZ: f32 = 200.0;
const MIN_BPM: f32 = 70.0;
const MAX_BPM: f32 = 180.0;

/// Tempo estimate for a track that has no catalog BPM.
#[derive(Debug, Clone, Copy)]
pub struct GridEstimate {
    pub grid: BeatGrid,
    /// 0.0 = guess, 1.0 = perfectly periodic onsets
    pub confidence: f32,
}

/// Decode `path` and estimate its beat grid.
///
/// Returns `Ok(None)` when the file is too short to say anything useful.
pub fn analyze_file(path: &Path) -> Result<Option<GridEstimate>, String> {
    let (samples, sample_rate) = decode_mono(path)?;
    Ok(analyze_samples(&samples, sample_rate))
}

/// Estimate BPM by autocorrelating the onset curve, then pick the downbeat
/// phase with the most onset energy.
pub fn analyze_samples(samples: &[f32], sample_rate: u32) -> Option<GridEstimate> {
    if samples.len() < 2048 || sample_rate == 0 {
        return None;
    }

    let hop = ((sample_rate as f32 / ENVELOPE_HZ).round() as usize).max(1);
    let envelope: Vec<f32> = samples
        .chunks(hop)
        .map(|chunk| chunk.iter().fold(0.0_f32, |peak, s| peak.max(s.abs())))
        .collect();
    if envelope.len() < 64 {
        return None;
    }

    let onset: Vec<f32> = std::iter::once(0.0)
        .chain(envelope.windows(2).map(|w| (w[1] - w[0]).max(0.0)))
        .collect();

    let min_lag = (ENVELOPE_HZ * 60.0 / MAX_BPM).round().max(1.0) as usize;
    let max_lag = (ENVELOPE_HZ * 60.0 / MIN_BPM).round() as usize;

    let (best_lag, best_score) = (min_lag..=max_lag)
        .map(|lag| (lag, autocorr_at_lag(&onset, lag)))
        .fold((min_lag, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best });

    let best_phase = (0..best_lag)
        .map(|phase| (phase, onset.iter().skip(phase).step_by(best_lag).sum::<f32>()))
        .fold((0usize, f32::MIN), |best, cur| if cur.1 > best.1 { cur } else { best })
        .0;

    let bpm = (ENVELOPE_HZ * 60.0 / best_lag as f32).clamp(MIN_BPM, MAX_BPM);
    let energy = onset.iter().map(|v| v * v).sum::<f32>().max(1e-6);

    Some(GridEstimate {
        grid: BeatGrid::new(bpm as f64, (best_phase as f32 / ENVELOPE_HZ) as f64),
        confidence: (best_score / energy).clamp(0.0, 1.0),
    })
}

fn autocorr_at_lag(signal: &[f32], lag: usize) -> f32 {
    if lag == 0 || lag >= signal.len() {
        return 0.0;
    }
    signal[lag..]
        .iter()
        .zip(signal)
        .map(|(a, b)| a * b)
        .sum()
}

fn decode_mono(path: &Path) -> Result<(Vec<f32>, u32), String> {
    let file = File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mut probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Probe failed: {e}"))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?
        .clone();
    let stereo = track.codec_params.channels.map(|c| c.count()).unwrap_or(2) > 1;
    let sample_rate = track.codec_params.sample_rate.unwrap_or(44100);

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| format!("Codec init failed: {e}"))?;

    let mut out = Vec::<f32>::new();
    loop {
        let packet = match probed.format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(format!("Read packet failed: {e}")),
        };
        if packet.track_id() != track.id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => push_mono(decoded, stereo, &mut out),
            Err(SymphoniaError::DecodeError(_)) => continue,
            Err(e) => return Err(format!("Decode failed: {e}")),
        }
    }

    Ok((out, sample_rate))
}

fn push_mono(buf: AudioBufferRef<'_>, stereo: bool, out: &mut Vec<f32>) {
    macro_rules! downmix {
        ($b:expr, $to_f32:expr) => {{
            let c0 = $b.chan(0);
            let c1 = if stereo { $b.chan(1) } else { $b.chan(0) };
            out.extend(c0.iter().zip(c1).map(|(&l, &r)| ($to_f32(l) + $to_f32(r)) * 0.5));
        }};
    }

    match buf {
        AudioBufferRef::F32(b) => downmix!(b, |s: f32| s),
        AudioBufferRef::F64(b) => downmix!(b, |s: f64| s as f32),
        AudioBufferRef::S32(b) => downmix!(b, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(b) => downmix!(b, |s: i16| s as f32 / i16::MAX as f32),
        AudioBufferRef::U8(b) => downmix!(b, |s: u8| (s as f32 - 128.0) / 128.0),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn click_track(sample_rate: u32, bpm: f32, first_beat: f32, seconds: f32) -> Vec<f32> {
        let mut out = vec![0.0_f32; (sample_rate as f32 * seconds) as usize];
        let period = sample_rate as f32 * 60.0 / bpm;
        let mut t = sample_rate as f32 * first_beat;
        while (t as usize) < out.len() {
            let start = t as usize;
            for s in out.iter_mut().skip(start).take(20) {
                *s = 1.0;
            }
            t += period;
        }
        out
    }

    #[test]
    fn estimates_click_track_tempo_and_offset() {
        let samples = click_track(8_000, 120.0, 0.25, 8.0);
        let est = analyze_samples(&samples, 8_000).expect("estimate");
        assert!((est.grid.bpm - 120.0).abs() < 1.0, "bpm = {}", est.grid.bpm);
        assert!((est.grid.offset_seconds - 0.25).abs() < 0.011, "offset = {}", est.grid.offset_seconds);
        assert!(est.confidence > 0.5);
    }

    #[test]
    fn too_short_is_none() {
        assert!(analyze_samples(&[0.0; 1000], 44_100).is_none());
        assert!(analyze_samples(&[0.0; 4096], 0).is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(analyze_file(Path::new("/definitely/not/here.mp3")).is_err());
    }
}
