/// Candidate scoring for the Auto-DJ
///
/// Every component is on a 0–100 scale; the total is a weighted mean of
/// energy fit, recency and tempo compatibility.
use serde::{Deserialize, Serialize};

use crate::{audio::analyzer::quantize::tempos_match, db::Track};

/// Score given when a track has no energy / tempo metadata.
const NEUTRAL: f64 = 50.0;

/// How energy is allowed to move from one track to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PresetMode {
    /// Small steps, preferably upward
    #[default]
    Gradual,
    /// Deliberate jumps between high and low
    PeakValley,
    /// Hold a low, steady level
    Chill,
    /// Aim at the explicit energy target
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub energy: f64,
    pub recency: f64,
    pub tempo: f64,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredTrack {
    pub track: Track,
    pub score: ScoreBreakdown,
}

/// Everything a scoring pass reads besides the candidates themselves.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    pub current: Option<&'a Track>,
    /// Played track ids, most recent first
    pub recent: &'a [String],
    pub recency_limit: usize,
    pub energy_target: f32,
    pub mode: PresetMode,
    pub prefer_tempo_match: bool,
}

// ── Energy ───────────────────────────────────────────────────────────────────

/// Fit of a transition between two catalog energy levels (1–10) for a preset.
pub fn energy_flow_score(from: f32, to: f32, mode: PresetMode) -> f64 {
    let from = from.round() as i32;
    let to = to.round() as i32;
    let change = to - from;
    match mode {
        PresetMode::Gradual => gradual(change),
        PresetMode::PeakValley => peak_valley(change, from),
        PresetMode::Chill => chill(change, to),
        // Custom has no transition shape; callers score by target instead
        PresetMode::Custom => NEUTRAL,
    }
}

fn gradual(change: i32) -> f64 {
    match change {
        1 | 2 => 100.0,
        0 => 85.0,
        -1 => 70.0,
        3 | 4 => 60.0,
        -3 | -2 => 50.0,
        5 | 6 => 35.0,
        -5 | -4 => 30.0,
        c if c.abs() >= 7 => 10.0,
        _ => 40.0,
    }
}

fn peak_valley(change: i32, from: i32) -> f64 {
    match change.abs() {
        3..=5 => 100.0,
        2 => 80.0,
        n if n >= 6 => {
            if change > 0 && from >= 5 {
                90.0
            } else if change < 0 && from >= 8 {
                85.0
            } else {
                70.0
            }
        }
        1 => 60.0,
        0 => 40.0,
        _ => NEUTRAL,
    }
}

fn chill(change: i32, to: i32) -> f64 {
    let low_bonus = if (1..=5).contains(&to) { 20.0 } else { 0.0 };
    match change {
        c if c.abs() <= 1 => 100.0,
        -2 => 85.0 + low_bonus,
        2 => 70.0 + low_bonus,
        c if c.abs() == 3 => 50.0 + low_bonus,
        _ if to > 6 => (30.0 - f64::from(to - 6) * 5.0).max(0.0),
        _ => 30.0,
    }
}

/// Closeness of a track's energy (0–1) to the target (0–1).
pub fn energy_target_score(energy: Option<f32>, target: f32) -> f64 {
    match energy {
        Some(e) => 100.0 * (1.0 - f64::from((e - target.clamp(0.0, 1.0)).abs())),
        None => NEUTRAL,
    }
}

fn energy_fit(candidate: &Track, ctx: &ScoringContext<'_>) -> f64 {
    let from = ctx.current.and_then(|t| t.energy_level).filter(|e| e.is_finite());
    let to = candidate.energy_level.filter(|e| e.is_finite());
    match (ctx.mode, from, to) {
        (PresetMode::Custom, _, _) | (_, None, _) => energy_target_score(candidate.energy_score(), ctx.energy_target),
        (_, Some(_), None) => NEUTRAL,
        (mode, Some(from), Some(to)) => energy_flow_score(from, to, mode),
    }
}

// ── Recency ──────────────────────────────────────────────────────────────────

/// Penalty for tracks played recently. `recent` is most recent first, so the
/// first entry was played 1 track ago; the score climbs back to 80 at `limit`
/// plays ago and stays there.
pub fn recency_score(track_id: &str, recent: &[String], limit: usize) -> f64 {
    let Some(index) = recent.iter().position(|id| id == track_id) else {
        return 100.0;
    };
    match index + 1 {
        ..=2 => 0.0,
        ..=4 => 10.0,
        ..=9 => 50.0,
        plays_ago if plays_ago >= limit => 80.0,
        // 9 < plays_ago < limit, so limit - 9 >= 2
        plays_ago => 50.0 + (plays_ago - 9) as f64 / (limit - 9) as f64 * 30.0,
    }
}

// ── Tempo ────────────────────────────────────────────────────────────────────

pub fn tempo_score(current_bpm: Option<f64>, candidate_bpm: Option<f64>) -> f64 {
    match (current_bpm, candidate_bpm) {
        (Some(a), Some(b)) if a > 0.0 && b > 0.0 => {
            if tempos_match(a, b) {
                100.0
            } else if (a - b).abs() / a <= 0.08 {
                60.0
            } else {
                20.0
            }
        }
        _ => NEUTRAL,
    }
}

// ── Ranking ──────────────────────────────────────────────────────────────────

pub fn score_track(candidate: &Track, ctx: &ScoringContext<'_>) -> ScoreBreakdown {
    let energy = energy_fit(candidate, ctx);
    let recency = recency_score(&candidate.id, ctx.recent, ctx.recency_limit);
    let tempo = tempo_score(ctx.current.and_then(|t| t.bpm), candidate.bpm);
    let total = if ctx.prefer_tempo_match {
        energy * 0.5 + recency * 0.3 + tempo * 0.2
    } else {
        energy * 0.6 + recency * 0.4
    };
    ScoreBreakdown {
        energy,
        recency,
        tempo,
        total,
    }
}

/// Score every candidate, best first. Ties keep catalog order.
pub fn rank<'a>(candidates: impl IntoIterator<Item = &'a Track>, ctx: &ScoringContext<'_>) -> Vec<ScoredTrack> {
    let mut scored: Vec<ScoredTrack> = candidates
        .into_iter()
        .map(|t| ScoredTrack {
            score: score_track(t, ctx),
            track: t.clone(),
        })
        .collect();
    scored.sort_by(|a, b| {
        b.score
            .total
            .partial_cmp(&a.score.total)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx<'a>(current: Option<&'a Track>, recent: &'a [String], mode: PresetMode) -> ScoringContext<'a> {
        ScoringContext {
            current,
            recent,
            recency_limit: 10,
            energy_target: 0.5,
            mode,
            prefer_tempo_match: true,
        }
    }

    fn history(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("h{i}")).collect()
    }

    #[test]
    fn recency_curve() {
        let recent = history(20);
        assert_eq!(recency_score("new", &recent, 10), 100.0);
        // h0 was played 1 track ago, h9 ten tracks ago
        assert_eq!(recency_score("h0", &recent, 10), 0.0);
        assert_eq!(recency_score("h1", &recent, 10), 0.0);
        assert_eq!(recency_score("h2", &recent, 10), 10.0);
        assert_eq!(recency_score("h3", &recent, 10), 10.0);
        assert_eq!(recency_score("h4", &recent, 10), 50.0);
        assert_eq!(recency_score("h8", &recent, 10), 50.0);
        assert_eq!(recency_score("h9", &recent, 10), 80.0);
        assert_eq!(recency_score("h12", &recent, 10), 80.0);

        // 14 plays ago with a lookback of 19
        let at = recency_score("h13", &recent, 19);
        assert!((at - (50.0 + 5.0 / 10.0 * 30.0)).abs() < 1e-9, "{at}");
    }

    #[test]
    fn recency_small_lookback_keeps_fixed_steps() {
        let recent = history(20);
        assert_eq!(recency_score("h4", &recent, 3), 50.0);
        assert_eq!(recency_score("h9", &recent, 3), 80.0);
    }

    #[test]
    fn gradual_prefers_small_lifts() {
        assert_eq!(energy_flow_score(5.0, 6.0, PresetMode::Gradual), 100.0);
        assert_eq!(energy_flow_score(5.0, 5.0, PresetMode::Gradual), 85.0);
        assert_eq!(energy_flow_score(5.0, 4.0, PresetMode::Gradual), 70.0);
        assert_eq!(energy_flow_score(1.0, 9.0, PresetMode::Gradual), 10.0);
    }

    #[test]
    fn peak_valley_rewards_contrast() {
        assert_eq!(energy_flow_score(3.0, 7.0, PresetMode::PeakValley), 100.0);
        assert_eq!(energy_flow_score(5.0, 5.0, PresetMode::PeakValley), 40.0);
        assert_eq!(energy_flow_score(9.0, 2.0, PresetMode::PeakValley), 85.0);
        assert_eq!(energy_flow_score(2.0, 9.0, PresetMode::PeakValley), 70.0);
    }

    #[test]
    fn chill_stays_low() {
        assert_eq!(energy_flow_score(3.0, 3.0, PresetMode::Chill), 100.0);
        assert_eq!(energy_flow_score(5.0, 3.0, PresetMode::Chill), 105.0);
        assert_eq!(energy_flow_score(3.0, 8.0, PresetMode::Chill), 20.0);
        assert_eq!(energy_flow_score(8.0, 3.0, PresetMode::Chill), 30.0);
    }

    #[test]
    fn target_distance_and_missing_energy() {
        assert_eq!(energy_target_score(Some(0.5), 0.5), 100.0);
        assert!((energy_target_score(Some(0.2), 0.7) - 50.0).abs() < 1e-4);
        assert_eq!(energy_target_score(None, 0.9), NEUTRAL);
    }

    #[test]
    fn tempo_compatibility() {
        assert_eq!(tempo_score(Some(120.0), Some(121.5)), 100.0);
        assert_eq!(tempo_score(Some(128.0), Some(64.0)), 100.0);
        assert_eq!(tempo_score(Some(120.0), Some(127.0)), 60.0);
        assert_eq!(tempo_score(Some(120.0), Some(90.0)), 20.0);
        assert_eq!(tempo_score(None, Some(90.0)), NEUTRAL);
    }

    #[test]
    fn custom_mode_ranks_by_target() {
        let low = Track::new("low", "Low", "/l.mp3").with_energy(2.0);
        let mid = Track::new("mid", "Mid", "/m.mp3").with_energy(5.0);
        let high = Track::new("high", "High", "/h.mp3").with_energy(9.0);
        let recent = Vec::new();
        let mut c = ctx(None, &recent, PresetMode::Custom);
        c.energy_target = 0.9;
        let ranked = rank([&low, &mid, &high], &c);
        assert_eq!(ranked[0].track.id, "high");
        assert_eq!(ranked[2].track.id, "low");
    }

    #[test]
    fn recent_plays_sink_in_ranking() {
        let current = Track::new("cur", "Cur", "/c.mp3").with_energy(5.0);
        let a = Track::new("a", "A", "/a.mp3").with_energy(6.0);
        let b = Track::new("b", "B", "/b.mp3").with_energy(6.0);
        let recent = vec!["a".to_string()];
        let ranked = rank([&a, &b], &ctx(Some(&current), &recent, PresetMode::Gradual));
        assert_eq!(ranked[0].track.id, "b");
        assert_eq!(ranked[1].score.recency, 0.0);
    }
}
