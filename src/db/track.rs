use serde::{Deserialize, Deserializer, Serialize};

use crate::audio::analyzer::BeatGrid;

/// Map SQL NULL to the type's default.
fn null_as_default<'de, D, T>(d: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

// ── Enums ────────────────────────────────────────────────────────────────────

/// Which channel a catalog entry belongs on. Anything that is not a jingle
/// plays on the music channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "String")]
pub enum TrackCategory {
    #[default]
    Music,
    Jingle,
}

impl From<Option<String>> for TrackCategory {
    fn from(s: Option<String>) -> Self {
        match s.as_deref().map(str::trim) {
            Some(c) if c.eq_ignore_ascii_case("jingle") => TrackCategory::Jingle,
            _ => TrackCategory::Music,
        }
    }
}

impl From<TrackCategory> for String {
    fn from(c: TrackCategory) -> Self {
        match c {
            TrackCategory::Music => "music".into(),
            TrackCategory::Jingle => "jingle".into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LicenseType {
    RoyaltyFree,
    CreativeCommons,
    PublicDomain,
    Licensed,
    Copyrighted,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JingleType {
    Intro,
    Outro,
    Stinger,
    Sweeper,
    Bumper,
    #[serde(other)]
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsagePolicy {
    Full,
    Partial,
    Blocked,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Rights metadata attached by the importer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CopyrightInfo {
    pub usage_policy: UsagePolicy,
    /// Seconds that may be broadcast when the policy is `partial`
    pub playable_duration: Option<f64>,
    pub safe_for_streaming: Option<bool>,
}

// ── Track ────────────────────────────────────────────────────────────────────

/// A row of the backend's `music_library` table. Read-only to the playback core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    #[serde(default)]
    pub category: TrackCategory,
    #[serde(rename = "file_url")]
    pub file_location: String,
    #[serde(rename = "duration", default, deserialize_with = "null_as_default")]
    pub duration_seconds: f64,
    /// Catalog energy on a 1–10 scale
    #[serde(default)]
    pub energy_level: Option<f32>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_stream_safe: bool,
    #[serde(default)]
    pub license_type: Option<LicenseType>,
    #[serde(default)]
    pub jingle_type: Option<JingleType>,
    #[serde(default)]
    pub bpm: Option<f64>,
    #[serde(default)]
    pub musical_key: Option<String>,
    #[serde(default)]
    pub copyright_info: Option<CopyrightInfo>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, file_location: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            category: TrackCategory::Music,
            file_location: file_location.into(),
            duration_seconds: 0.0,
            energy_level: None,
            is_stream_safe: false,
            license_type: None,
            jingle_type: None,
            bpm: None,
            musical_key: None,
            copyright_info: None,
        }
    }

    pub fn with_duration(mut self, seconds: f64) -> Self {
        self.duration_seconds = seconds;
        self
    }

    pub fn with_energy(mut self, level: f32) -> Self {
        self.energy_level = Some(level);
        self
    }

    pub fn with_category(mut self, category: TrackCategory) -> Self {
        self.category = category;
        self
    }

    pub fn with_bpm(mut self, bpm: f64) -> Self {
        self.bpm = Some(bpm);
        self
    }

    pub fn with_license(mut self, license: LicenseType) -> Self {
        self.license_type = Some(license);
        self
    }

    pub fn is_jingle(&self) -> bool {
        self.category == TrackCategory::Jingle
    }

    /// Cleared for rebroadcast: flagged explicitly, or under a licence that
    /// allows it.
    pub fn is_stream_safe(&self) -> bool {
        self.is_stream_safe
            || matches!(
                self.license_type,
                Some(LicenseType::RoyaltyFree | LicenseType::CreativeCommons | LicenseType::PublicDomain)
            )
    }

    /// Energy normalised into [0, 1].
    pub fn energy_score(&self) -> Option<f32> {
        self.energy_level
            .filter(|e| e.is_finite())
            .map(|e| (e / 10.0).clamp(0.0, 1.0))
    }

    /// Catalog tempo as a beat grid anchored at 0 s.
    pub fn beat_grid(&self) -> Option<BeatGrid> {
        self.bpm.map(|bpm| BeatGrid::new(bpm, 0.0)).filter(BeatGrid::is_valid)
    }

    pub fn is_blocked(&self) -> bool {
        self.copyright_info
            .as_ref()
            .is_some_and(|c| c.usage_policy == UsagePolicy::Blocked)
    }

    /// How many seconds may be broadcast, when rights are partial.
    pub fn playable_limit(&self) -> Option<f64> {
        let info = self.copyright_info.as_ref()?;
        if info.usage_policy != UsagePolicy::Partial {
            return None;
        }
        info.playable_duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) if !artist.is_empty() => format!("{artist} - {}", self.title),
            _ => self.title.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_backend_row() {
        let row = r#"{
            "id": "7f1c", "title": "Night Drive", "artist": null, "category": "jingle",
            "file_url": "https://cdn.example/night.mp3", "duration": null,
            "energy_level": 7, "is_stream_safe": null, "license_type": "creative_commons",
            "jingle_type": "stinger", "bpm": 124, "musical_key": "8A",
            "copyright_info": {"usage_policy": "partial", "playable_duration": 30},
            "mood": "dark", "created_at": "2024-05-01T00:00:00Z"
        }"#;
        let t: Track = serde_json::from_str(row).unwrap();
        assert!(t.is_jingle());
        assert_eq!(t.duration_seconds, 0.0);
        assert!(!t.is_stream_safe);
        assert!(t.is_stream_safe(), "creative commons counts as stream-safe");
        assert_eq!(t.jingle_type, Some(JingleType::Stinger));
        assert_eq!(t.energy_score(), Some(0.7));
        assert_eq!(t.playable_limit(), Some(30.0));
        assert!(t.beat_grid().is_some());
    }

    #[test]
    fn unknown_enum_values_fall_back() {
        let row = r#"{"id": "a", "title": "b", "file_url": "c", "category": "background",
                      "license_type": "mystery", "jingle_type": "drop"}"#;
        let t: Track = serde_json::from_str(row).unwrap();
        assert_eq!(t.category, TrackCategory::Music);
        assert_eq!(t.license_type, Some(LicenseType::Unknown));
        assert_eq!(t.jingle_type, Some(JingleType::Custom));
        assert!(!t.is_stream_safe());
    }

    #[test]
    fn category_serializes_as_string() {
        let t = Track::new("a", "b", "c").with_category(TrackCategory::Jingle);
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["category"], "jingle");
        assert_eq!(v["file_url"], "c");
    }

    #[test]
    fn invalid_bpm_has_no_grid() {
        assert!(Track::new("a", "b", "c").with_bpm(0.0).beat_grid().is_none());
        assert!(Track::new("a", "b", "c").beat_grid().is_none());
    }

    #[test]
    fn blocked_policy() {
        let mut t = Track::new("a", "b", "c");
        t.copyright_info = Some(CopyrightInfo {
            usage_policy: UsagePolicy::Blocked,
            ..Default::default()
        });
        assert!(t.is_blocked());
        assert_eq!(t.playable_limit(), None);
    }
}
