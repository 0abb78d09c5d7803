use std::{
    fs::File,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    thread,
};

use ringbuf::{
    traits::{Observer as _, Producer as _, Split},
    HeapRb,
};
use symphonia::core::{
    audio::{AudioBufferRef, Signal},
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, SeekMode, SeekTo},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
    units::Time,
};

/// Stereo f32 samples buffered ahead of the render thread (~3 s at 44.1 kHz)
const RING_CAPACITY: usize = 44_100 * 2 * 3;

/// What a probe learns about a file before any audio is decoded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub sample_rate: u32,
    pub channels: u32,
    /// 0.0 when the container carries no frame count
    pub duration_seconds: f64,
}

/// Consumer side of a decode thread, owned by a `ChannelVoice`.
pub struct DecoderHandle {
    pub consumer: ringbuf::HeapCons<f32>,
    pub info: SourceInfo,
    stop_flag: Arc<AtomicBool>,
    /// Set once the decode thread hit EOF or a fatal error
    done: Arc<AtomicBool>,
    frames_written: Arc<AtomicU64>,
}

impl DecoderHandle {
    /// True when the decode thread is finished and every sample was consumed.
    pub fn is_drained(&self) -> bool {
        self.done.load(Ordering::Acquire) && self.consumer.is_empty()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }
}

impl Drop for DecoderHandle {
    fn drop(&mut self) {
        // The thread exits on its own once it sees the flag
        self.stop_flag.store(true, Ordering::Relaxed);
    }
}

/// Read container metadata without starting a decode thread.
pub fn probe(path: &Path) -> Result<SourceInfo, String> {
    let (format, track_id) = open_format(path)?;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .ok_or("No audio track found")?;
    Ok(source_info(&track.codec_params))
}

/// Spawn a Symphonia decode thread for `path`, starting at `start_seconds`.
pub fn spawn_decoder(path: PathBuf, start_seconds: f64) -> Result<DecoderHandle, String> {
    let info = probe(&path)?;
    let (mut producer, consumer) = HeapRb::<f32>::new(RING_CAPACITY).split();

    let stop_flag = Arc::new(AtomicBool::new(false));
    let done = Arc::new(AtomicBool::new(false));
    let frames_written = Arc::new(AtomicU64::new(0));

    let handle = DecoderHandle {
        consumer,
        info,
        stop_flag: Arc::clone(&stop_flag),
        done: Arc::clone(&done),
        frames_written: Arc::clone(&frames_written),
    };

    let name = format!("dec:{}", path.file_name().unwrap_or_default().to_string_lossy());
    thread::Builder::new()
        .name(name)
        .spawn(move || {
            if let Err(e) = decode_loop(&path, start_seconds, &mut producer, &stop_flag, &frames_written) {
                log::warn!("Decoder for {} exited: {e}", path.display());
            }
            done.store(true, Ordering::Release);
        })
        .map_err(|e| format!("Failed to spawn decoder thread: {e}"))?;

    Ok(handle)
}

fn open_format(path: &Path) -> Result<(Box<dyn FormatReader>, u32), String> {
    let file = File::open(path).map_err(|e| format!("Cannot open {}: {e}", path.display()))?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }
    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| format!("Probe failed: {e}"))?;
    let track_id = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or("No audio track found")?
        .id;
    Ok((probed.format, track_id))
}

fn source_info(params: &symphonia::core::codecs::CodecParameters) -> SourceInfo {
    let sample_rate = params.sample_rate.unwrap_or(44_100);
    let duration_seconds = match params.n_frames {
        Some(n) if sample_rate > 0 => n as f64 / sample_rate as f64,
        _ => 0.0,
    };
    SourceInfo {
        sample_rate,
        channels: params.channels.map(|c| c.count() as u32).unwrap_or(2),
        duration_seconds,
    }
}

fn decode_loop(
    path: &Path,
    start_seconds: f64,
    producer: &mut ringbuf::HeapProd<f32>,
    stop_flag: &AtomicBool,
    frames_written: &AtomicU64,
) -> Result<(), String> {
    let (mut format, track_id) = open_format(path)?;
    let params = format
        .tracks()
        .iter()
        .find(|t| t.id == track_id)
        .ok_or("No audio track found")?
        .codec_params
        .clone();
    let stereo = params.channels.map(|c| c.count()).unwrap_or(2) > 1;

    let mut decoder = symphonia::default::get_codecs()
        .make(&params, &DecoderOptions::default())
        .map_err(|e| format!("Codec init: {e}"))?;

    if start_seconds > 0.0 {
        let seek = format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time: Time::from(start_seconds),
                track_id: Some(track_id),
            },
        );
        if let Err(e) = seek {
            log::warn!("Seek to {start_seconds:.2}s failed, decoding from start: {e}");
        }
    }

    while !stop_flag.load(Ordering::Relaxed) {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => {
                decoder.reset();
                continue;
            }
            Err(e) => return Err(format!("Format read: {e}")),
        };
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet) {
            Ok(decoded) => {
                let n = push_stereo(decoded, stereo, producer, stop_flag);
                frames_written.fetch_add(n as u64, Ordering::Relaxed);
            }
            Err(SymphoniaError::DecodeError(e)) => log::debug!("Decode error (skipped): {e}"),
            Err(e) => return Err(format!("Fatal decode: {e}")),
        }
    }
    Ok(())
}

/// Push one interleaved L/R pair, waiting for room for both so the stream
/// never gets out of step. Returns false when asked to stop.
fn push_frame(producer: &mut ringbuf::HeapProd<f32>, stop_flag: &AtomicBool, l: f32, r: f32) -> bool {
    loop {
        if stop_flag.load(Ordering::Relaxed) {
            return false;
        }
        if producer.vacant_len() >= 2 {
            let _ = producer.try_push(l);
            let _ = producer.try_push(r);
            return true;
        }
        thread::yield_now();
    }
}

/// Convert a decoded buffer to interleaved stereo f32. Returns frames pushed.
fn push_stereo(
    buf: AudioBufferRef<'_>,
    stereo: bool,
    producer: &mut ringbuf::HeapProd<f32>,
    stop_flag: &AtomicBool,
) -> usize {
    macro_rules! push_all {
        ($b:expr, $to_f32:expr) => {{
            let left = $b.chan(0);
            let right = if stereo { $b.chan(1) } else { $b.chan(0) };
            let mut written = 0;
            for (&l, &r) in left.iter().zip(right) {
                if !push_frame(producer, stop_flag, $to_f32(l), $to_f32(r)) {
                    break;
                }
                written += 1;
            }
            written
        }};
    }

    match buf {
        AudioBufferRef::F32(b) => push_all!(b, |s: f32| s),
        AudioBufferRef::F64(b) => push_all!(b, |s: f64| s as f32),
        AudioBufferRef::S32(b) => push_all!(b, |s: i32| s as f32 / i32::MAX as f32),
        AudioBufferRef::S16(b) => push_all!(b, |s: i16| s as f32 / i16::MAX as f32),
        AudioBufferRef::U8(b) => push_all!(b, |s: u8| (s as f32 - 128.0) / 128.0),
        other => {
            let frames = other.frames();
            (0..frames)
                .take_while(|_| push_frame(producer, stop_flag, 0.0, 0.0))
                .count()
        }
    }
}
