/// `gateway/client.rs` — REST access to the shared backend store
///
/// The backend exposes each table under `/rest/v1/<table>` with row filters in
/// the query string. Only two calls matter to the audio core: reading the
/// track library and patching the single "current playback" row that the
/// overlay renderer watches.
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::sync::{PlaybackStore, PlaybackUpdate};
use crate::{db::Track, error::StudioError};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://project.example.co`; empty disables the backend
    pub url: String,
    pub api_key: String,
    pub tracks_table: String,
    pub playback_table: String,
    /// Primary key of the row the overlay reads
    pub playback_row: String,
    pub timeout_ms: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: String::new(),
            tracks_table: "music_library".into(),
            playback_table: "audio_playback_state".into(),
            playback_row: "1".into(),
            timeout_ms: 5_000,
        }
    }
}

impl BackendConfig {
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Clone)]
pub struct RestStore {
    http: reqwest::Client,
    config: BackendConfig,
}

impl RestStore {
    pub fn new(config: BackendConfig) -> Result<Self, StudioError> {
        if !config.is_configured() {
            return Err(StudioError::Config("backend url is not set".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(100)))
            .build()?;
        Ok(Self { http, config })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.config.url.trim_end_matches('/'), table)
    }

    fn tracks_url(&self) -> String {
        format!("{}?select=*", self.table_url(&self.config.tracks_table))
    }

    fn playback_url(&self) -> String {
        format!(
            "{}?id=eq.{}",
            self.table_url(&self.config.playback_table),
            urlencoding::encode(&self.config.playback_row)
        )
    }

    fn authed(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    /// Every row of the track library.
    pub async fn fetch_tracks(&self) -> Result<Vec<Track>, StudioError> {
        let tracks: Vec<Track> = self
            .authed(self.http.get(self.tracks_url()))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        log::info!("Fetched {} tracks from {}", tracks.len(), self.config.tracks_table);
        Ok(tracks)
    }

    pub async fn patch_playback(&self, update: &PlaybackUpdate) -> Result<(), StudioError> {
        let resp = self
            .authed(self.http.patch(self.playback_url()))
            .header("Prefer", "return=minimal")
            .json(update)
            .send()
            .await?;
        if resp.status().is_success() {
            Ok(())
        } else {
            Err(StudioError::Sync(format!("HTTP {}", resp.status())))
        }
    }
}

impl PlaybackStore for RestStore {
    async fn update_playback(&self, update: &PlaybackUpdate) -> Result<(), StudioError> {
        self.patch_playback(update).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(row: &str) -> RestStore {
        RestStore::new(BackendConfig {
            url: "https://studio.example.co/".into(),
            api_key: "anon".into(),
            playback_row: row.into(),
            ..BackendConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn builds_rest_urls() {
        let s = store("1");
        assert_eq!(s.tracks_url(), "https://studio.example.co/rest/v1/music_library?select=*");
        assert_eq!(
            s.playback_url(),
            "https://studio.example.co/rest/v1/audio_playback_state?id=eq.1"
        );
    }

    #[test]
    fn row_filter_is_escaped() {
        assert!(store("a b&c").playback_url().ends_with("id=eq.a%20b%26c"));
    }

    #[test]
    fn missing_url_is_a_config_error() {
        assert!(matches!(
            RestStore::new(BackendConfig::default()),
            Err(StudioError::Config(_))
        ));
    }
}
