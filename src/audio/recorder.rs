use std::{
    fs::{self, File},
    io::BufWriter,
    path::PathBuf,
    time::Duration,
};

use chrono::{DateTime, Utc};
use hound::{SampleFormat, WavSpec, WavWriter};
use ringbuf::{
    traits::{Consumer as _, Split},
    HeapRb,
};
use serde::{Deserialize, Serialize};

use crate::error::StudioError;

/// Name of the one-shot scheduler task that enforces the length cap.
pub const RECORDING_TIMEOUT_TASK: &str = "recording-timeout";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    pub max_seconds: u64,
    pub output_dir: PathBuf,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_seconds: 30,
            output_dir: std::env::temp_dir().join("studio-recordings"),
        }
    }
}

impl RecordingConfig {
    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSummary {
    pub path: PathBuf,
    pub started_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub auto_stopped: bool,
}

struct ActiveRecording {
    writer: WavWriter<BufWriter<File>>,
    consumer: ringbuf::HeapCons<f32>,
    path: PathBuf,
    started_at: DateTime<Utc>,
    sample_rate: u32,
    channels: u16,
    scratch: Vec<f32>,
}

/// Voice capture to 32-bit float WAV.
///
/// Samples arrive through a ring buffer whose producer is handed to the
/// capture source; `pump()` moves them into the file on the control thread.
pub struct VoiceRecorder {
    config: RecordingConfig,
    active: Option<ActiveRecording>,
}

impl VoiceRecorder {
    pub fn new(config: RecordingConfig) -> Self {
        Self { config, active: None }
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    pub fn current_path(&self) -> Option<&PathBuf> {
        self.active.as_ref().map(|a| &a.path)
    }

    /// Open a new file and return the producer the capture source writes to.
    pub fn start(&mut self, sample_rate: u32, channels: u16) -> Result<ringbuf::HeapProd<f32>, StudioError> {
        if self.active.is_some() {
            return Err(StudioError::Recording("already recording".into()));
        }
        fs::create_dir_all(&self.config.output_dir)?;
        let started_at = Utc::now();
        let path = self
            .config
            .output_dir
            .join(format!("voice-{}.wav", started_at.format("%Y%m%d-%H%M%S%.3f")));

        let spec = WavSpec {
            channels: channels.max(1),
            sample_rate,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let writer = WavWriter::create(&path, spec).map_err(|e| StudioError::Recording(e.to_string()))?;

        // One second of headroom between pumps
        let capacity = (sample_rate as usize * spec.channels as usize).max(1024);
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        log::info!("Recording to {}", path.display());
        self.active = Some(ActiveRecording {
            writer,
            consumer,
            path,
            started_at,
            sample_rate,
            channels: spec.channels,
            scratch: vec![0.0; 4096],
        });
        Ok(producer)
    }

    /// Drain buffered samples into the file. Returns samples written.
    pub fn pump(&mut self) -> Result<usize, StudioError> {
        let Some(rec) = self.active.as_mut() else {
            return Ok(0);
        };
        let mut total = 0;
        loop {
            let n = rec.consumer.pop_slice(&mut rec.scratch);
            if n == 0 {
                break;
            }
            for &s in &rec.scratch[..n] {
                rec.writer
                    .write_sample(s)
                    .map_err(|e| StudioError::Recording(e.to_string()))?;
            }
            total += n;
        }
        Ok(total)
    }

    /// Finalize the file. `auto_stopped` marks a stop forced by the length cap.
    pub fn stop(&mut self, auto_stopped: bool) -> Result<RecordingSummary, StudioError> {
        self.pump()?;
        let rec = self
            .active
            .take()
            .ok_or_else(|| StudioError::Recording("not recording".into()))?;
        let samples = rec.writer.len() as f64;
        rec.writer
            .finalize()
            .map_err(|e| StudioError::Recording(e.to_string()))?;

        let frames = samples / rec.channels.max(1) as f64;
        let duration_seconds = if rec.sample_rate > 0 {
            frames / rec.sample_rate as f64
        } else {
            0.0
        };
        log::info!(
            "Recording {} finished ({duration_seconds:.1}s{})",
            rec.path.display(),
            if auto_stopped { ", length cap reached" } else { "" }
        );
        Ok(RecordingSummary {
            path: rec.path,
            started_at: rec.started_at,
            duration_seconds,
            auto_stopped,
        })
    }
}
