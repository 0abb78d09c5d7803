/// `audio/mic_input.rs` — Host microphone via CPAL
///
/// Captures the selected input device, keeps a running peak for metering and
/// the mic-activity duck trigger, and optionally forwards raw samples into a
/// recorder ring buffer.
use std::{
    sync::{
        atomic::{AtomicU32, Ordering},
        Arc, Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::Producer as _;
use serde::{Deserialize, Serialize};

use super::{
    dsp::db_to_linear,
    ducking::{DuckReason, DuckTrigger},
};
use crate::error::StudioError;

// ── MicConfig ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MicConfig {
    /// Open the input device at start-up
    pub enabled: bool,
    pub device_name: Option<String>,
    /// Peak level above which the host counts as talking
    pub activity_threshold_db: f32,
    /// How long the level must stay below threshold before the duck releases
    pub release_ms: u64,
}

impl Default for MicConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            device_name: None,
            activity_threshold_db: -40.0,
            release_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioDevice {
    pub name: String,
    pub is_default: bool,
}

pub fn list_input_devices() -> Vec<AudioDevice> {
    let host = cpal::default_host();
    let default_name = host.default_input_device().and_then(|d| d.name().ok());
    host.input_devices()
        .map(|devs| {
            devs.filter_map(|d| {
                d.name().ok().map(|name| {
                    let is_default = default_name.as_deref() == Some(name.as_str());
                    AudioDevice { name, is_default }
                })
            })
            .collect()
        })
        .unwrap_or_default()
}

// ── Activity detection ────────────────────────────────────────────────────────

/// Turns mic peak readings into `MicActive` duck edges with a release hold,
/// so short pauses between words do not pump the music.
#[derive(Debug, Clone)]
pub struct MicActivityDetector {
    threshold: f32,
    release: Duration,
    active: bool,
    quiet_for: Duration,
}

impl MicActivityDetector {
    pub fn new(config: &MicConfig) -> Self {
        Self {
            threshold: db_to_linear(config.activity_threshold_db),
            release: Duration::from_millis(config.release_ms),
            active: false,
            quiet_for: Duration::ZERO,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Feed the peak seen over the last `dt`.
    pub fn update(&mut self, peak: f32, dt: Duration) -> Option<DuckTrigger> {
        let loud = peak.is_finite() && peak >= self.threshold;
        if loud {
            self.quiet_for = Duration::ZERO;
            if !self.active {
                self.active = true;
                return Some(DuckTrigger::Start(DuckReason::MicActive));
            }
            return None;
        }
        if self.active {
            self.quiet_for += dt;
            if self.quiet_for >= self.release {
                self.active = false;
                self.quiet_for = Duration::ZERO;
                return Some(DuckTrigger::End(DuckReason::MicActive));
            }
        }
        None
    }
}

// ── MicInput ──────────────────────────────────────────────────────────────────

#[derive(Default)]
struct MicShared {
    stream: Mutex<Option<cpal::Stream>>,
    /// Max |sample| since the last `take_peak`, as f32 bits
    peak: AtomicU32,
    sample_rate: AtomicU32,
    channels: AtomicU32,
    capture: Mutex<Option<ringbuf::HeapProd<f32>>>,
}

/// Shared handle to the microphone.
#[derive(Clone, Default)]
pub struct MicInput {
    shared: Arc<MicShared>,
}

// SAFETY: cpal::Stream is !Send but we gate all access behind a Mutex.
unsafe impl Send for MicShared {}
unsafe impl Sync for MicShared {}

impl MicInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self, config: &MicConfig) -> Result<(), StudioError> {
        let host = cpal::default_host();
        let device = match &config.device_name {
            Some(name) => host
                .input_devices()
                .map_err(|e| StudioError::Device(e.to_string()))?
                .find(|d| d.name().ok().as_deref() == Some(name.as_str()))
                .ok_or_else(|| StudioError::Device(format!("Input device '{name}' not found")))?,
            None => host
                .default_input_device()
                .ok_or_else(|| StudioError::Device("No default input device found".into()))?,
        };
        let supported = device
            .default_input_config()
            .map_err(|e| StudioError::Device(e.to_string()))?;
        self.shared.sample_rate.store(supported.sample_rate().0, Ordering::Relaxed);
        self.shared.channels.store(supported.channels() as u32, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        let stream = device
            .build_input_stream(
                &supported.config(),
                move |data: &[f32], _info: &cpal::InputCallbackInfo| capture_callback(data, &shared),
                |e| log::error!("Mic input error: {e}"),
                None,
            )
            .map_err(|e| StudioError::Device(e.to_string()))?;
        stream.play().map_err(|e| StudioError::Device(e.to_string()))?;

        *lock(&self.shared.stream) = Some(stream);
        log::info!("Microphone input started");
        Ok(())
    }

    pub fn stop(&self) {
        if lock(&self.shared.stream).take().is_some() {
            log::info!("Microphone input stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.stream).is_some()
    }

    /// Peak since the previous call, linear.
    pub fn take_peak(&self) -> f32 {
        f32::from_bits(self.shared.peak.swap(0, Ordering::Relaxed))
    }

    /// (sample rate, channels) of the open device; defaults before `start`.
    pub fn format(&self) -> (u32, u16) {
        let sr = self.shared.sample_rate.load(Ordering::Relaxed);
        let ch = self.shared.channels.load(Ordering::Relaxed);
        (if sr == 0 { 44_100 } else { sr }, if ch == 0 { 1 } else { ch as u16 })
    }

    /// Forward raw input samples into `producer` until detached.
    pub fn attach_capture(&self, producer: ringbuf::HeapProd<f32>) {
        *lock(&self.shared.capture) = Some(producer);
    }

    pub fn detach_capture(&self) {
        *lock(&self.shared.capture) = None;
    }
}

fn capture_callback(data: &[f32], shared: &MicShared) {
    let peak = data.iter().fold(0.0_f32, |p, s| p.max(s.abs()));
    let _ = shared
        .peak
        .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            (peak > f32::from_bits(bits)).then_some(peak.to_bits())
        });

    // Never block the input thread on the recorder
    if let Ok(mut capture) = shared.capture.try_lock() {
        if let Some(producer) = capture.as_mut() {
            producer.push_slice(data);
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
