use std::{
    path::PathBuf,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    Device, Stream, StreamConfig,
};
use ringbuf::{
    traits::{Consumer as _, Producer as _, Split},
    HeapRb,
};
use serde::{Deserialize, Serialize};

use super::{
    analyzer::spectrum::{analyser_pair, SpectrumAnalyser, DEFAULT_FFT_SIZE},
    backend::{BackendEvent, LoadedSource, PlaybackBackend},
    channel::{ChannelMeters, ChannelVoice},
    decoder::{spawn_decoder, DecoderHandle, SourceInfo},
    dsp::EffectsConfig,
    loader::SourceLoader,
    mixer::Mixer,
    ChannelId,
};
use crate::error::StudioError;

const CMD_RING_SIZE: usize = 64;
const EVENT_RING_SIZE: usize = 16;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// `None` = system default output
    pub device_name: Option<String>,
    /// Where remote track files are cached
    pub cache_dir: PathBuf,
    pub download_timeout_secs: u64,
    pub fft_size: usize,
    pub mixer: Mixer,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_name: None,
            cache_dir: std::env::temp_dir().join("studio-audio-cache"),
            download_timeout_secs: 30,
            fft_size: DEFAULT_FFT_SIZE,
            mixer: Mixer::default(),
        }
    }
}

/// Main thread → render thread. Decoders are spawned on the caller's thread
/// and handed over ready to read.
enum EngineCmd {
    Attach {
        channel: ChannelId,
        decoder: DecoderHandle,
        start_frame: u64,
        keep_state: bool,
    },
    Play(ChannelId),
    Pause(ChannelId),
    SetGain {
        channel: ChannelId,
        gain: f32,
        ramp_frames: u32,
    },
    SetEffects {
        channel: ChannelId,
        config: EffectsConfig,
    },
}

#[derive(Default)]
struct SourceSlot {
    path: Option<PathBuf>,
    info: Option<SourceInfo>,
}

struct Shared {
    stream: Mutex<Option<Stream>>,
    cmd_tx: Mutex<ringbuf::HeapProd<EngineCmd>>,
    ended_rx: Mutex<ringbuf::HeapCons<ChannelId>>,
    /// Stream errors reported by cpal's error callback
    errors: Arc<Mutex<Vec<BackendEvent>>>,
    meters: [Arc<ChannelMeters>; 2],
    slots: Mutex<[SourceSlot; 2]>,
    analysers: Mutex<[Option<SpectrumAnalyser>; 2]>,
    loader: SourceLoader,
    sample_rate: u32,
}

// SAFETY: cpal::Stream is !Send on some platforms. It is only created and
// dropped behind the `stream` Mutex and never touched otherwise.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// Real output device backend: two channel voices mixed into one cpal stream.
///
/// Cheap to clone; every clone drives the same stream.
#[derive(Clone)]
pub struct OutputEngine {
    shared: Arc<Shared>,
}

/// State owned by the render callback.
struct RtState {
    voices: [ChannelVoice; 2],
    mixer: Mixer,
    music_buf: Vec<f32>,
    jingle_buf: Vec<f32>,
    master_buf: Vec<f32>,
    ended_tx: ringbuf::HeapProd<ChannelId>,
    device_channels: usize,
}

impl OutputEngine {
    /// Open the output device and start the stream.
    pub fn new(config: &OutputConfig) -> Result<Self, StudioError> {
        let host = cpal::default_host();
        let device = match &config.device_name {
            Some(name) => host
                .output_devices()
                .map_err(|e| StudioError::Device(e.to_string()))?
                .find(|d| d.name().ok().as_deref() == Some(name.as_str()))
                .ok_or_else(|| StudioError::Device(format!("Output device '{name}' not found")))?,
            None => host
                .default_output_device()
                .ok_or_else(|| StudioError::Device("No default audio output device found".into()))?,
        };
        let supported = device
            .default_output_config()
            .map_err(|e| StudioError::Device(format!("Default config error: {e}")))?;
        let sample_rate = supported.sample_rate().0;
        let device_channels = supported.channels() as usize;

        log::info!(
            "Audio device: {} | sample rate: {} | channels: {}",
            device.name().unwrap_or_default(),
            sample_rate,
            device_channels
        );

        let (cmd_tx, cmd_rx) = HeapRb::<EngineCmd>::new(CMD_RING_SIZE).split();
        let (ended_tx, ended_rx) = HeapRb::<ChannelId>::new(EVENT_RING_SIZE).split();
        let meters = [Arc::new(ChannelMeters::default()), Arc::new(ChannelMeters::default())];

        let (music_tap, music_analyser) = analyser_pair(sample_rate, config.fft_size);
        let (jingle_tap, jingle_analyser) = analyser_pair(sample_rate, config.fft_size);

        let rt = RtState {
            voices: [
                ChannelVoice::new(ChannelId::Music, sample_rate, Arc::clone(&meters[0]), Some(music_tap)),
                ChannelVoice::new(ChannelId::Jingle, sample_rate, Arc::clone(&meters[1]), Some(jingle_tap)),
            ],
            mixer: config.mixer.clone(),
            music_buf: Vec::new(),
            jingle_buf: Vec::new(),
            master_buf: Vec::new(),
            ended_tx,
            device_channels: device_channels.max(1),
        };

        let errors = Arc::new(Mutex::new(Vec::new()));
        let stream = build_stream(&device, &supported.into(), rt, cmd_rx, Arc::clone(&errors))?;
        stream
            .play()
            .map_err(|e| StudioError::Device(format!("Stream play error: {e}")))?;

        Ok(Self {
            shared: Arc::new(Shared {
                stream: Mutex::new(Some(stream)),
                cmd_tx: Mutex::new(cmd_tx),
                ended_rx: Mutex::new(ended_rx),
                errors,
                meters,
                slots: Mutex::new(Default::default()),
                analysers: Mutex::new([Some(music_analyser), Some(jingle_analyser)]),
                loader: SourceLoader::new(
                    config.cache_dir.clone(),
                    Duration::from_secs(config.download_timeout_secs),
                ),
                sample_rate,
            }),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Hand out the channel's analysis node. Only the first call gets it.
    pub fn take_analyser(&self, channel: ChannelId) -> Option<SpectrumAnalyser> {
        lock(&self.shared.analysers)[channel.index()].take()
    }

    /// Post-gain peak levels of a channel, linear.
    pub fn peaks(&self, channel: ChannelId) -> (f32, f32) {
        self.shared.meters[channel.index()].peaks()
    }

    /// Stop the output stream. Further commands are accepted but inaudible.
    pub fn shutdown(&self) {
        if lock(&self.shared.stream).take().is_some() {
            log::info!("Audio output stopped");
        }
    }

    // ── Private helpers ───────────────────────────────────────────────────

    fn send_cmd(&self, cmd: EngineCmd) -> Result<(), String> {
        lock(&self.shared.cmd_tx)
            .try_push(cmd)
            .map_err(|_| "Command queue full".to_string())
    }

    fn source_path(&self, channel: ChannelId) -> Option<(PathBuf, SourceInfo)> {
        let slots = lock(&self.shared.slots);
        let slot = &slots[channel.index()];
        Some((slot.path.clone()?, slot.info?))
    }

    fn reattach(&self, channel: ChannelId, seconds: f64, keep_state: bool) -> Result<(), String> {
        let Some((path, info)) = self.source_path(channel) else {
            return Err("nothing loaded".into());
        };
        let decoder = spawn_decoder(path, seconds)?;
        let start_frame = (seconds.max(0.0) * info.sample_rate as f64) as u64;
        self.send_cmd(EngineCmd::Attach {
            channel,
            decoder,
            start_frame,
            keep_state,
        })
    }
}

impl PlaybackBackend for OutputEngine {
    fn load(&self, channel: ChannelId, location: &str) -> Result<LoadedSource, StudioError> {
        let path = self
            .shared
            .loader
            .resolve(location)
            .map_err(|e| StudioError::load(location, e))?;
        let decoder = spawn_decoder(path.clone(), 0.0).map_err(|e| StudioError::load(location, e))?;
        let info = decoder.info;
        {
            let mut slots = lock(&self.shared.slots);
            slots[channel.index()] = SourceSlot {
                path: Some(path),
                info: Some(info),
            };
        }
        self.send_cmd(EngineCmd::Attach {
            channel,
            decoder,
            start_frame: 0,
            keep_state: false,
        })
        .map_err(|e| StudioError::load(location, e))?;
        Ok(LoadedSource {
            duration_seconds: info.duration_seconds,
        })
    }

    fn play(&self, channel: ChannelId) -> Result<(), StudioError> {
        if self.source_path(channel).is_none() {
            return Err(StudioError::playback(channel, "nothing loaded"));
        }
        if lock(&self.shared.stream).is_none() {
            return Err(StudioError::playback(channel, "output stream is closed"));
        }
        self.send_cmd(EngineCmd::Play(channel))
            .map_err(|e| StudioError::playback(channel, e))
    }

    fn pause(&self, channel: ChannelId) {
        if let Err(e) = self.send_cmd(EngineCmd::Pause(channel)) {
            log::warn!("[{channel}] pause dropped: {e}");
        }
    }

    fn stop(&self, channel: ChannelId) {
        if let Err(e) = self.send_cmd(EngineCmd::Pause(channel)) {
            log::warn!("[{channel}] stop dropped: {e}");
        }
        if let Err(e) = self.reattach(channel, 0.0, false) {
            log::debug!("[{channel}] rewind skipped: {e}");
        }
    }

    fn seek(&self, channel: ChannelId, seconds: f64) -> Result<(), StudioError> {
        self.reattach(channel, seconds, true)
            .map_err(|e| StudioError::playback(channel, format!("seek failed: {e}")))
    }

    fn set_gain(&self, channel: ChannelId, gain: f32, ramp: Duration) {
        let ramp_frames = (ramp.as_secs_f64() * self.shared.sample_rate as f64).round() as u32;
        if let Err(e) = self.send_cmd(EngineCmd::SetGain {
            channel,
            gain,
            ramp_frames,
        }) {
            log::warn!("[{channel}] gain change dropped: {e}");
        }
    }

    fn apply_effects(&self, channel: ChannelId, config: &EffectsConfig) {
        if let Err(e) = self.send_cmd(EngineCmd::SetEffects {
            channel,
            config: *config,
        }) {
            log::warn!("[{channel}] effects update dropped: {e}");
        }
    }

    fn position(&self, channel: ChannelId) -> f64 {
        self.shared.meters[channel.index()].position_seconds()
    }

    fn poll_events(&self) -> Vec<BackendEvent> {
        let mut events: Vec<BackendEvent> = lock(&self.shared.ended_rx)
            .pop_iter()
            .map(|channel| BackendEvent::Ended { channel })
            .collect();
        events.append(&mut lock(&self.shared.errors));
        events
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn build_stream(
    device: &Device,
    config: &StreamConfig,
    mut rt: RtState,
    mut cmd_rx: ringbuf::HeapCons<EngineCmd>,
    errors: Arc<Mutex<Vec<BackendEvent>>>,
) -> Result<Stream, StudioError> {
    let err_fn = move |e: cpal::StreamError| {
        log::error!("CPAL stream error: {e}");
        let mut pending = lock(&errors);
        for channel in ChannelId::ALL {
            pending.push(BackendEvent::Error {
                channel,
                message: e.to_string(),
            });
        }
    };

    device
        .build_output_stream(
            config,
            move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                rt.process_commands(&mut cmd_rx);
                rt.render(output);
            },
            err_fn,
            None,
        )
        .map_err(|e| StudioError::Device(format!("Build stream error: {e}")))
}

// ── Real-time render ─────────────────────────────────────────────────────────
//
// Runs on the cpal thread: no blocking locks, no I/O. Scratch buffers only
// grow on the first callback or a device buffer-size change.
impl RtState {
    fn process_commands(&mut self, cmd_rx: &mut ringbuf::HeapCons<EngineCmd>) {
        while let Some(cmd) = cmd_rx.try_pop() {
            match cmd {
                EngineCmd::Attach {
                    channel,
                    decoder,
                    start_frame,
                    keep_state,
                } => self.voices[channel.index()].attach(decoder, start_frame, keep_state),
                EngineCmd::Play(channel) => self.voices[channel.index()].play(),
                EngineCmd::Pause(channel) => self.voices[channel.index()].pause(),
                EngineCmd::SetGain {
                    channel,
                    gain,
                    ramp_frames,
                } => self.voices[channel.index()].set_gain(gain, ramp_frames),
                EngineCmd::SetEffects { channel, config } => self.voices[channel.index()].set_effects(config),
            }
        }
    }

    fn render(&mut self, output: &mut [f32]) {
        let frames = output.len() / self.device_channels;
        let stereo_len = frames * 2;
        if self.master_buf.len() != stereo_len {
            self.music_buf.resize(stereo_len, 0.0);
            self.jingle_buf.resize(stereo_len, 0.0);
            self.master_buf.resize(stereo_len, 0.0);
        }

        let [music, jingle] = &mut self.voices;
        if music.fill_buffer(&mut self.music_buf) {
            let _ = self.ended_tx.try_push(ChannelId::Music);
        }
        if jingle.fill_buffer(&mut self.jingle_buf) {
            let _ = self.ended_tx.try_push(ChannelId::Jingle);
        }
        self.mixer.mix_into(&mut self.master_buf, &self.music_buf, &self.jingle_buf);

        for (out, lr) in output
            .chunks_exact_mut(self.device_channels)
            .zip(self.master_buf.chunks_exact(2))
        {
            if out.len() == 1 {
                out[0] = (lr[0] + lr[1]) * 0.5;
            } else {
                out[0] = lr[0];
                out[1] = lr[1];
                out[2..].fill(0.0);
            }
        }
    }
}
