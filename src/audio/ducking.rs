use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{backend::PlaybackBackend, player::AudioPlayer};

/// Why the music is being ducked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuckReason {
    /// Text-to-speech readout of a viewer question
    Tts,
    /// Jingle or sound drop on the jingle channel
    SoundDrop,
    /// Host microphone above the activity threshold
    MicActive,
    /// Operator pressed the duck button
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "edge", content = "reason", rename_all = "snake_case")]
pub enum DuckTrigger {
    Start(DuckReason),
    End(DuckReason),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckingConfig {
    /// Gates automatic triggers only; manual duck always works
    pub enabled: bool,
    /// Fraction of the volume removed while ducked
    pub level: f32,
    pub ramp_ms: u64,
}

impl Default for DuckingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            level: 0.3,
            ramp_ms: 600,
        }
    }
}

/// Layers duck requests from several sources onto one player.
///
/// Each reason is counted separately, so the player is restored only when
/// every start has seen its matching end.
#[derive(Debug)]
pub struct DuckingCoordinator {
    config: DuckingConfig,
    active: BTreeMap<DuckReason, u32>,
}

impl DuckingCoordinator {
    pub fn new(mut config: DuckingConfig) -> Self {
        config.level = sanitize_level(config.level);
        Self {
            config,
            active: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &DuckingConfig {
        &self.config
    }

    pub fn is_ducked(&self) -> bool {
        self.active.values().any(|&n| n > 0)
    }

    pub fn active_count(&self) -> u32 {
        self.active.values().sum()
    }

    pub fn active_reasons(&self) -> Vec<DuckReason> {
        self.active.iter().filter(|(_, n)| **n > 0).map(|(r, _)| *r).collect()
    }

    /// Apply one trigger edge. Returns true if the duck state changed.
    pub fn handle<B: PlaybackBackend>(&mut self, trigger: DuckTrigger, player: &mut AudioPlayer<B>) -> bool {
        let was_ducked = self.is_ducked();
        match trigger {
            DuckTrigger::Start(reason) => {
                if reason != DuckReason::Manual && !self.config.enabled {
                    log::debug!("Ducking disabled, ignoring {reason:?} start");
                    return false;
                }
                *self.active.entry(reason).or_insert(0) += 1;
            }
            DuckTrigger::End(reason) => match self.active.get_mut(&reason) {
                Some(n) if *n > 0 => *n -= 1,
                _ => {
                    log::debug!("Unmatched {reason:?} end ignored");
                    return false;
                }
            },
        }
        self.apply(player);
        was_ducked != self.is_ducked()
    }

    /// Manual duck button: a plain on/off toggle independent of `enabled`.
    pub fn toggle_manual<B: PlaybackBackend>(&mut self, player: &mut AudioPlayer<B>) -> bool {
        let on = self.active.get(&DuckReason::Manual).is_some_and(|&n| n > 0);
        self.active.insert(DuckReason::Manual, u32::from(!on));
        self.apply(player);
        !on
    }

    /// Turning automatic ducking off releases every automatic reason.
    pub fn set_enabled<B: PlaybackBackend>(&mut self, enabled: bool, player: &mut AudioPlayer<B>) {
        self.config.enabled = enabled;
        if !enabled {
            self.active.retain(|r, _| *r == DuckReason::Manual);
            self.apply(player);
        }
    }

    pub fn set_level<B: PlaybackBackend>(&mut self, level: f32, player: &mut AudioPlayer<B>) {
        self.config.level = sanitize_level(level);
        self.apply(player);
    }

    /// Forget every reason and restore the player.
    pub fn reset<B: PlaybackBackend>(&mut self, player: &mut AudioPlayer<B>) {
        self.active.clear();
        self.apply(player);
    }

    fn apply<B: PlaybackBackend>(&self, player: &mut AudioPlayer<B>) {
        if self.is_ducked() {
            player.duck(self.config.level);
        } else {
            player.unduck();
        }
    }
}

fn sanitize_level(level: f32) -> f32 {
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        DuckingConfig::default().level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        backend::mock::MockBackend,
        player::{AudioPlayer, PlayerConfig},
        ChannelId,
    };

    fn setup(enabled: bool) -> (DuckingCoordinator, AudioPlayer<MockBackend>, MockBackend) {
        let backend = MockBackend::new();
        let player = AudioPlayer::new(ChannelId::Music, backend.clone(), &PlayerConfig::default());
        let coord = DuckingCoordinator::new(DuckingConfig {
            enabled,
            level: 0.5,
            ramp_ms: 600,
        });
        (coord, player, backend)
    }

    #[test]
    fn overlapping_reasons_hold_duck_until_all_end() {
        let (mut c, mut p, b) = setup(true);
        c.handle(DuckTrigger::Start(DuckReason::Tts), &mut p);
        c.handle(DuckTrigger::Start(DuckReason::SoundDrop), &mut p);
        assert!((b.gain(ChannelId::Music) - 0.35).abs() < 1e-6);

        c.handle(DuckTrigger::End(DuckReason::SoundDrop), &mut p);
        assert!(p.state().is_ducking, "TTS still active");
        assert!((b.gain(ChannelId::Music) - 0.35).abs() < 1e-6);

        c.handle(DuckTrigger::End(DuckReason::Tts), &mut p);
        assert!(!p.state().is_ducking);
        assert_eq!(b.gain(ChannelId::Music), 0.7);
    }

    #[test]
    fn same_reason_twice_needs_two_ends() {
        let (mut c, mut p, _b) = setup(true);
        c.handle(DuckTrigger::Start(DuckReason::SoundDrop), &mut p);
        c.handle(DuckTrigger::Start(DuckReason::SoundDrop), &mut p);
        c.handle(DuckTrigger::End(DuckReason::SoundDrop), &mut p);
        assert!(p.state().is_ducking);
        c.handle(DuckTrigger::End(DuckReason::SoundDrop), &mut p);
        assert!(!p.state().is_ducking);
    }

    #[test]
    fn unmatched_end_is_ignored() {
        let (mut c, mut p, _b) = setup(true);
        c.handle(DuckTrigger::Start(DuckReason::Tts), &mut p);
        assert!(!c.handle(DuckTrigger::End(DuckReason::SoundDrop), &mut p));
        assert!(p.state().is_ducking);
        assert_eq!(c.active_reasons(), vec![DuckReason::Tts]);
    }

    #[test]
    fn disabled_ignores_automatic_but_not_manual() {
        let (mut c, mut p, _b) = setup(false);
        assert!(!c.handle(DuckTrigger::Start(DuckReason::Tts), &mut p));
        assert!(!p.state().is_ducking);

        assert!(c.toggle_manual(&mut p));
        assert!(p.state().is_ducking);
        assert!(!c.toggle_manual(&mut p));
        assert!(!p.state().is_ducking);
    }

    #[test]
    fn disabling_releases_automatic_reasons_only() {
        let (mut c, mut p, _b) = setup(true);
        c.handle(DuckTrigger::Start(DuckReason::MicActive), &mut p);
        c.toggle_manual(&mut p);
        c.set_enabled(false, &mut p);
        assert_eq!(c.active_reasons(), vec![DuckReason::Manual]);
        assert!(p.state().is_ducking);
    }

    #[test]
    fn level_change_reapplies_while_ducked() {
        let (mut c, mut p, b) = setup(true);
        c.handle(DuckTrigger::Start(DuckReason::Tts), &mut p);
        c.set_level(0.8, &mut p);
        assert!((b.gain(ChannelId::Music) - 0.7 * 0.2).abs() < 1e-6);
        c.reset(&mut p);
        assert_eq!(p.state().volume, 0.7);
        assert!(!c.is_ducked());
    }
}
