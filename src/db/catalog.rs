use std::collections::HashMap;

use super::track::Track;

/// In-memory copy of the track library with derived views.
///
/// The music / stream-safe / jingle index lists are rebuilt only when the
/// track list changes, so toggling stream-safe mode is a view switch.
#[derive(Debug, Default)]
pub struct Catalog {
    tracks: Vec<Track>,
    by_id: HashMap<String, usize>,
    music: Vec<usize>,
    music_stream_safe: Vec<usize>,
    jingles: Vec<usize>,
    version: u64,
}

impl Catalog {
    pub fn new(tracks: Vec<Track>) -> Self {
        let mut c = Self::default();
        c.set_tracks(tracks);
        c
    }

    /// Replace the whole library. Later duplicates of an id win.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        let mut seen: HashMap<String, usize> = HashMap::with_capacity(tracks.len());
        let mut deduped: Vec<Track> = Vec::with_capacity(tracks.len());
        for t in tracks {
            match seen.get(&t.id) {
                Some(&i) => deduped[i] = t,
                None => {
                    seen.insert(t.id.clone(), deduped.len());
                    deduped.push(t);
                }
            }
        }
        self.tracks = deduped;
        self.rebuild();
    }

    /// Insert or replace one track.
    pub fn upsert(&mut self, track: Track) {
        match self.by_id.get(&track.id) {
            Some(&i) => self.tracks[i] = track,
            None => self.tracks.push(track),
        }
        self.rebuild();
    }

    pub fn remove(&mut self, id: &str) -> Option<Track> {
        let idx = *self.by_id.get(id)?;
        let removed = self.tracks.remove(idx);
        self.rebuild();
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Track> {
        self.by_id.get(id).map(|&i| &self.tracks[i])
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Bumped on every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Music tracks eligible for Auto-DJ under the given mode.
    pub fn candidates(&self, stream_safe_only: bool) -> impl Iterator<Item = &Track> + '_ {
        let view = if stream_safe_only {
            &self.music_stream_safe
        } else {
            &self.music
        };
        view.iter().map(move |&i| &self.tracks[i])
    }

    pub fn candidate_count(&self, stream_safe_only: bool) -> usize {
        if stream_safe_only {
            self.music_stream_safe.len()
        } else {
            self.music.len()
        }
    }

    pub fn jingles(&self) -> impl Iterator<Item = &Track> + '_ {
        self.jingles.iter().map(move |&i| &self.tracks[i])
    }

    fn rebuild(&mut self) {
        self.by_id.clear();
        self.music.clear();
        self.music_stream_safe.clear();
        self.jingles.clear();
        for (i, t) in self.tracks.iter().enumerate() {
            self.by_id.insert(t.id.clone(), i);
            if t.is_jingle() {
                self.jingles.push(i);
                continue;
            }
            self.music.push(i);
            if t.is_stream_safe() {
                self.music_stream_safe.push(i);
            }
        }
        self.version += 1;
        log::debug!(
            "Catalog rebuilt: {} music ({} stream-safe), {} jingles",
            self.music.len(),
            self.music_stream_safe.len(),
            self.jingles.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::track::{LicenseType, TrackCategory};

    fn library() -> Vec<Track> {
        vec![
            Track::new("a", "Alpha", "a.mp3"),
            Track::new("b", "Bravo", "b.mp3").with_license(LicenseType::RoyaltyFree),
            Track::new("c", "Charlie", "c.mp3").with_category(TrackCategory::Jingle),
            {
                let mut t = Track::new("d", "Delta", "d.mp3");
                t.is_stream_safe = true;
                t
            },
        ]
    }

    #[test]
    fn views_split_by_category_and_safety() {
        let cat = Catalog::new(library());
        let all: Vec<&str> = cat.candidates(false).map(|t| t.id.as_str()).collect();
        let safe: Vec<&str> = cat.candidates(true).map(|t| t.id.as_str()).collect();
        assert_eq!(all, ["a", "b", "d"]);
        assert_eq!(safe, ["b", "d"]);
        assert_eq!(cat.jingles().count(), 1);
    }

    #[test]
    fn mode_switch_does_not_rebuild() {
        let cat = Catalog::new(library());
        let v = cat.version();
        let _ = cat.candidates(true).count();
        let _ = cat.candidates(false).count();
        assert_eq!(cat.version(), v);
    }

    #[test]
    fn upsert_and_remove_keep_index_consistent() {
        let mut cat = Catalog::new(library());
        cat.upsert(Track::new("a", "Alpha v2", "a2.mp3"));
        assert_eq!(cat.get("a").map(|t| t.title.as_str()), Some("Alpha v2"));
        assert_eq!(cat.len(), 4);

        assert!(cat.remove("b").is_some());
        assert!(cat.get("b").is_none());
        assert_eq!(cat.get("d").map(|t| t.title.as_str()), Some("Delta"));
        assert_eq!(cat.candidate_count(true), 1);
        assert!(cat.remove("zzz").is_none());
    }

    #[test]
    fn duplicate_ids_collapse() {
        let cat = Catalog::new(vec![Track::new("x", "One", "1.mp3"), Track::new("x", "Two", "2.mp3")]);
        assert_eq!(cat.len(), 1);
        assert_eq!(cat.get("x").map(|t| t.title.as_str()), Some("Two"));
    }
}
