/// `config.rs` — Studio configuration
///
/// One JSON document, every section optional. The path comes from
/// `--config <path>` or `STUDIO_CONFIG`; backend credentials can be supplied
/// through the environment instead of the file.
use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{
    audio::{
        ducking::DuckingConfig, engine::OutputConfig, mic_input::MicConfig, player::PlayerConfig,
        recorder::RecordingConfig,
    },
    error::StudioError,
    gateway::BackendConfig,
    scheduler::{AutoDjSettings, QueueConfig, SchedulerConfig},
};

pub const CONFIG_ENV: &str = "STUDIO_CONFIG";
pub const BACKEND_URL_ENV: &str = "STUDIO_BACKEND_URL";
pub const BACKEND_KEY_ENV: &str = "STUDIO_BACKEND_KEY";
pub const PLAYBACK_ROW_ENV: &str = "STUDIO_PLAYBACK_ROW";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StudioConfig {
    pub backend: BackendConfig,
    pub output: OutputConfig,
    pub music: PlayerConfig,
    pub jingle: PlayerConfig,
    pub ducking: DuckingConfig,
    pub scheduler: SchedulerConfig,
    pub queue: QueueConfig,
    pub autodj: AutoDjSettings,
    pub recording: RecordingConfig,
    pub mic: MicConfig,
}

impl Default for StudioConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            output: OutputConfig::default(),
            music: PlayerConfig::default(),
            jingle: PlayerConfig {
                default_volume: 0.8,
                ..PlayerConfig::default()
            },
            ducking: DuckingConfig::default(),
            scheduler: SchedulerConfig::default(),
            queue: QueueConfig::default(),
            autodj: AutoDjSettings::default(),
            recording: RecordingConfig::default(),
            mic: MicConfig::default(),
        }
    }
}

impl StudioConfig {
    pub fn from_file(path: &Path) -> Result<Self, StudioError> {
        let text = fs::read_to_string(path)
            .map_err(|e| StudioError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&text).map_err(|e| StudioError::Config(format!("{}: {e}", path.display())))
    }

    /// Resolve the config file from CLI args / environment, fall back to
    /// defaults when neither names one, then apply env overrides.
    pub fn load(args: &[String]) -> Result<Self, StudioError> {
        let mut config = match config_path(args, std::env::var(CONFIG_ENV).ok()) {
            Some(path) => {
                log::info!("Loading config from {}", path.display());
                Self::from_file(&path)?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn apply_env(&mut self, get: impl Fn(&str) -> Option<String>) {
        if let Some(url) = get(BACKEND_URL_ENV) {
            self.backend.url = url;
        }
        if let Some(key) = get(BACKEND_KEY_ENV) {
            self.backend.api_key = key;
        }
        if let Some(row) = get(PLAYBACK_ROW_ENV) {
            self.backend.playback_row = row;
        }
    }
}

/// `--config <path>` / `--config=<path>` wins over the env var.
fn config_path(args: &[String], env: Option<String>) -> Option<PathBuf> {
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            return iter.next().map(PathBuf::from);
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(PathBuf::from(path));
        }
    }
    env.filter(|p| !p.is_empty()).map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn defaults_match_studio_conventions() {
        let c = StudioConfig::default();
        assert_eq!(c.music.default_volume, 0.7);
        assert_eq!(c.jingle.default_volume, 0.8);
        assert_eq!(c.ducking.level, 0.3);
        assert_eq!(c.scheduler.sync_interval_ms, 100);
        assert_eq!(c.queue.history_window, 20);
        assert_eq!(c.recording.max_seconds, 30);
        assert!(!c.backend.is_configured());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("studio.json");
        fs::write(
            &path,
            r#"{ "backend": { "url": "https://x.example.co" },
                 "autodj": { "enabled": true, "preset_mode": "chill" },
                 "queue": { "dedup": "by_track_id" } }"#,
        )
        .unwrap();
        let c = StudioConfig::from_file(&path).unwrap();
        assert_eq!(c.backend.url, "https://x.example.co");
        assert_eq!(c.backend.tracks_table, "music_library");
        assert!(c.autodj.enabled);
        assert_eq!(c.autodj.recency_limit, 10);
        assert_eq!(c.queue.dedup, crate::scheduler::DedupPolicy::ByTrackId);
        assert_eq!(c.jingle.default_volume, 0.8);
    }

    #[test]
    fn bad_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{ nope").unwrap();
        assert!(matches!(StudioConfig::from_file(&path), Err(StudioError::Config(_))));
        assert!(matches!(
            StudioConfig::from_file(&dir.path().join("missing.json")),
            Err(StudioError::Config(_))
        ));
    }

    #[test]
    fn cli_flag_beats_env() {
        assert_eq!(
            config_path(&args(&["studio-audio", "--config", "a.json"]), Some("b.json".into())),
            Some(PathBuf::from("a.json"))
        );
        assert_eq!(
            config_path(&args(&["studio-audio", "--config=c.json"]), None),
            Some(PathBuf::from("c.json"))
        );
        assert_eq!(config_path(&args(&["studio-audio"]), Some("b.json".into())), Some(PathBuf::from("b.json")));
        assert_eq!(config_path(&args(&["studio-audio"]), Some(String::new())), None);
    }

    #[test]
    fn env_overrides_backend() {
        let mut c = StudioConfig::default();
        c.apply_env(|key| match key {
            BACKEND_URL_ENV => Some("https://env.example.co".into()),
            PLAYBACK_ROW_ENV => Some("main".into()),
            _ => None,
        });
        assert_eq!(c.backend.url, "https://env.example.co");
        assert_eq!(c.backend.playback_row, "main");
        assert!(c.backend.api_key.is_empty());
    }
}
