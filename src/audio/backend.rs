use std::time::Duration;

use super::{dsp::EffectsConfig, ChannelId};
use crate::error::StudioError;

/// Notifications raised by the playback primitive.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    /// The source played through to its natural end. Never raised for
    /// `stop()` or `pause()`.
    Ended { channel: ChannelId },
    /// Codec or output failure while playing.
    Error { channel: ChannelId, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoadedSource {
    /// 0.0 when the container does not say
    pub duration_seconds: f64,
}

/// The sound-producing side of a player: one slot per channel.
///
/// Handles are cheap clones of shared state so each player and the studio
/// can hold their own.
pub trait PlaybackBackend: Send {
    fn load(&self, channel: ChannelId, location: &str) -> Result<LoadedSource, StudioError>;
    fn play(&self, channel: ChannelId) -> Result<(), StudioError>;
    fn pause(&self, channel: ChannelId);
    /// Stop and rewind; the source stays loaded.
    fn stop(&self, channel: ChannelId);
    fn seek(&self, channel: ChannelId, seconds: f64) -> Result<(), StudioError>;
    /// Output gain, reached linearly over `ramp`.
    fn set_gain(&self, channel: ChannelId, gain: f32, ramp: Duration);
    fn apply_effects(&self, channel: ChannelId, config: &EffectsConfig);
    /// Current playhead in seconds.
    fn position(&self, channel: ChannelId) -> f64;
    /// Drain events raised since the last call.
    fn poll_events(&self) -> Vec<BackendEvent>;
}

#[cfg(test)]
pub(crate) mod mock {
    use std::{
        collections::{HashMap, HashSet},
        sync::{Arc, Mutex},
        time::Duration,
    };

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Load(ChannelId, String),
        Play(ChannelId),
        Pause(ChannelId),
        Stop(ChannelId),
        Seek(ChannelId, f64),
        Gain(ChannelId, f32, Duration),
        Effects(ChannelId),
    }

    #[derive(Default)]
    struct Slot {
        duration: f64,
        position: f64,
        playing: bool,
        gain: f32,
    }

    #[derive(Default)]
    struct Inner {
        slots: HashMap<ChannelId, Slot>,
        calls: Vec<Call>,
        durations: HashMap<String, f64>,
        unreachable: HashSet<String>,
        fail_play: bool,
        events: Vec<BackendEvent>,
    }

    /// Scriptable backend for tests. Clones share state.
    #[derive(Clone, Default)]
    pub struct MockBackend {
        inner: Arc<Mutex<Inner>>,
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_duration(&self, location: &str, seconds: f64) {
            self.inner.lock().unwrap().durations.insert(location.into(), seconds);
        }

        pub fn make_unreachable(&self, location: &str) {
            self.inner.lock().unwrap().unreachable.insert(location.into());
        }

        pub fn fail_play(&self, fail: bool) {
            self.inner.lock().unwrap().fail_play = fail;
        }

        pub fn set_position(&self, channel: ChannelId, seconds: f64) {
            self.inner.lock().unwrap().slots.entry(channel).or_default().position = seconds;
        }

        /// Play the channel to its end and raise the natural-end event.
        pub fn finish(&self, channel: ChannelId) {
            let mut inner = self.inner.lock().unwrap();
            let slot = inner.slots.entry(channel).or_default();
            slot.position = slot.duration;
            slot.playing = false;
            inner.events.push(BackendEvent::Ended { channel });
        }

        pub fn raise(&self, event: BackendEvent) {
            self.inner.lock().unwrap().events.push(event);
        }

        pub fn gain(&self, channel: ChannelId) -> f32 {
            self.inner.lock().unwrap().slots.get(&channel).map(|s| s.gain).unwrap_or(0.0)
        }

        pub fn is_playing(&self, channel: ChannelId) -> bool {
            self.inner.lock().unwrap().slots.get(&channel).is_some_and(|s| s.playing)
        }

        pub fn calls(&self) -> Vec<Call> {
            self.inner.lock().unwrap().calls.clone()
        }

        pub fn clear_calls(&self) {
            self.inner.lock().unwrap().calls.clear();
        }
    }

    impl PlaybackBackend for MockBackend {
        fn load(&self, channel: ChannelId, location: &str) -> Result<LoadedSource, StudioError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Load(channel, location.into()));
            if inner.unreachable.contains(location) {
                return Err(StudioError::load(location, "unreachable"));
            }
            let duration = inner.durations.get(location).copied().unwrap_or(0.0);
            let slot = inner.slots.entry(channel).or_default();
            slot.duration = duration;
            slot.position = 0.0;
            slot.playing = false;
            Ok(LoadedSource {
                duration_seconds: duration,
            })
        }

        fn play(&self, channel: ChannelId) -> Result<(), StudioError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Play(channel));
            if inner.fail_play {
                return Err(StudioError::playback(channel, "output device lost"));
            }
            inner.slots.entry(channel).or_default().playing = true;
            Ok(())
        }

        fn pause(&self, channel: ChannelId) {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Pause(channel));
            inner.slots.entry(channel).or_default().playing = false;
        }

        fn stop(&self, channel: ChannelId) {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Stop(channel));
            let slot = inner.slots.entry(channel).or_default();
            slot.playing = false;
            slot.position = 0.0;
        }

        fn seek(&self, channel: ChannelId, seconds: f64) -> Result<(), StudioError> {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Seek(channel, seconds));
            inner.slots.entry(channel).or_default().position = seconds;
            Ok(())
        }

        fn set_gain(&self, channel: ChannelId, gain: f32, ramp: Duration) {
            let mut inner = self.inner.lock().unwrap();
            inner.calls.push(Call::Gain(channel, gain, ramp));
            inner.slots.entry(channel).or_default().gain = gain;
        }

        fn apply_effects(&self, channel: ChannelId, _config: &EffectsConfig) {
            self.inner.lock().unwrap().calls.push(Call::Effects(channel));
        }

        fn position(&self, channel: ChannelId) -> f64 {
            self.inner.lock().unwrap().slots.get(&channel).map(|s| s.position).unwrap_or(0.0)
        }

        fn poll_events(&self) -> Vec<BackendEvent> {
            std::mem::take(&mut self.inner.lock().unwrap().events)
        }
    }
}
