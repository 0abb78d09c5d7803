/// `audio/analyzer/quantize.rs` — Beat-grid quantization for cue/loop placement
///
/// Grid resolutions are expressed as fractions of a bar. With the default
/// 4/4 grid, `1/4` is one beat and `1` is a full bar.
///
/// Every function degrades to identity (returns the requested time unchanged)
/// when quantize is off or the track's tempo metadata is missing or invalid.
use serde::{Deserialize, Serialize};

/// Default tolerance for `is_on_beat`, in seconds.
pub const ON_BEAT_TOLERANCE_SECS: f64 = 0.05;

/// Tempos within this many BPM are considered matched.
pub const BPM_MATCH_TOLERANCE: f64 = 2.0;

/// Fastest tempo a grid may carry; anything above is treated as bad metadata.
pub const MAX_BPM: f64 = 999.0;

// ── Grid resolution ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridResolution {
    #[serde(rename = "1/32")]
    ThirtySecond,
    #[serde(rename = "1/16")]
    Sixteenth,
    #[serde(rename = "1/8")]
    Eighth,
    #[serde(rename = "1/4")]
    Quarter,
    #[serde(rename = "1/2")]
    Half,
    #[serde(rename = "1")]
    Bar,
    #[serde(rename = "2")]
    TwoBars,
    #[serde(rename = "4")]
    FourBars,
}

impl GridResolution {
    pub const ALL: [GridResolution; 8] = [
        GridResolution::ThirtySecond,
        GridResolution::Sixteenth,
        GridResolution::Eighth,
        GridResolution::Quarter,
        GridResolution::Half,
        GridResolution::Bar,
        GridResolution::TwoBars,
        GridResolution::FourBars,
    ];

    /// Grid step length in bars.
    pub fn bars(self) -> f64 {
        match self {
            GridResolution::ThirtySecond => 1.0 / 32.0,
            GridResolution::Sixteenth => 1.0 / 16.0,
            GridResolution::Eighth => 1.0 / 8.0,
            GridResolution::Quarter => 0.25,
            GridResolution::Half => 0.5,
            GridResolution::Bar => 1.0,
            GridResolution::TwoBars => 2.0,
            GridResolution::FourBars => 4.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            GridResolution::ThirtySecond => "1/32",
            GridResolution::Sixteenth => "1/16",
            GridResolution::Eighth => "1/8",
            GridResolution::Quarter => "1/4",
            GridResolution::Half => "1/2",
            GridResolution::Bar => "1",
            GridResolution::TwoBars => "2",
            GridResolution::FourBars => "4",
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.label() == s.trim())
    }
}

impl Default for GridResolution {
    fn default() -> Self {
        GridResolution::Quarter
    }
}

// ── Beat grid ───────────────────────────────────────────────────────────────

/// Tempo metadata for one track: BPM plus the time of the first downbeat.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BeatGrid {
    pub bpm: f64,
    /// Seconds from track start to the first downbeat
    pub offset_seconds: f64,
    pub beats_per_bar: u32,
}

impl BeatGrid {
    pub fn new(bpm: f64, offset_seconds: f64) -> Self {
        Self {
            bpm,
            offset_seconds,
            beats_per_bar: 4,
        }
    }

    /// A grid is usable only with a tempo in `(0, MAX_BPM]` and a finite offset.
    pub fn is_valid(&self) -> bool {
        self.bpm.is_finite()
            && self.bpm > 0.0
            && self.bpm <= MAX_BPM
            && self.offset_seconds.is_finite()
            && self.beats_per_bar > 0
    }

    pub fn beat_seconds(&self) -> f64 {
        60.0 / self.bpm
    }

    pub fn bar_seconds(&self) -> f64 {
        self.beat_seconds() * self.beats_per_bar as f64
    }

    /// Length of one grid step in seconds.
    pub fn step_seconds(&self, resolution: GridResolution) -> f64 {
        self.bar_seconds() * resolution.bars()
    }
}

// ── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizeSettings {
    pub enabled: bool,
    pub resolution: GridResolution,
}

impl Default for QuantizeSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            resolution: GridResolution::Quarter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Snap {
    Nearest,
    Forward,
    Backward,
}

/// Returns the grid when quantization should be applied for this request.
fn active_grid<'a>(t: f64, grid: Option<&'a BeatGrid>, settings: &QuantizeSettings) -> Option<&'a BeatGrid> {
    if !settings.enabled || !t.is_finite() {
        return None;
    }
    grid.filter(|g| g.is_valid())
}

fn snap(t: f64, grid: Option<&BeatGrid>, settings: &QuantizeSettings, mode: Snap) -> f64 {
    let Some(g) = active_grid(t, grid, settings) else {
        return t;
    };
    let step = g.step_seconds(settings.resolution);
    if !step.is_finite() || step <= 0.0 {
        return t;
    }
    let steps = (t - g.offset_seconds) / step;
    let n = match mode {
        Snap::Nearest => steps.round(),
        Snap::Forward => steps.ceil(),
        Snap::Backward => steps.floor(),
    };
    let snapped = n * step + g.offset_seconds;
    if snapped.is_finite() {
        snapped.max(0.0)
    } else {
        t
    }
}

/// Snap `t` to the nearest grid point.
pub fn quantize(t: f64, grid: Option<&BeatGrid>, settings: &QuantizeSettings) -> f64 {
    snap(t, grid, settings, Snap::Nearest)
}

/// Snap `t` to the next grid point at or after `t`.
pub fn quantize_forward(t: f64, grid: Option<&BeatGrid>, settings: &QuantizeSettings) -> f64 {
    snap(t, grid, settings, Snap::Forward)
}

/// Snap `t` to the previous grid point at or before `t`.
pub fn quantize_backward(t: f64, grid: Option<&BeatGrid>, settings: &QuantizeSettings) -> f64 {
    snap(t, grid, settings, Snap::Backward)
}

// ── Beat helpers ────────────────────────────────────────────────────────────

/// Position of `t` on the grid: zero-based bar, beat within bar, and the
/// fractional progress through the current beat.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeatPosition {
    pub bar: i64,
    pub beat: u32,
    pub phase: f64,
}

pub fn beat_position(t: f64, grid: &BeatGrid) -> Option<BeatPosition> {
    if !grid.is_valid() || !t.is_finite() {
        return None;
    }
    let beats = (t - grid.offset_seconds) / grid.beat_seconds();
    let whole = beats.floor();
    let bpb = grid.beats_per_bar as i64;
    let whole_i = whole as i64;
    Some(BeatPosition {
        bar: whole_i.div_euclid(bpb),
        beat: whole_i.rem_euclid(bpb) as u32,
        phase: beats - whole,
    })
}

pub fn time_until_next_beat(t: f64, grid: &BeatGrid) -> Option<f64> {
    let pos = beat_position(t, grid)?;
    Some((1.0 - pos.phase) * grid.beat_seconds())
}

pub fn is_on_beat(t: f64, grid: &BeatGrid, tolerance: f64) -> bool {
    let Some(pos) = beat_position(t, grid) else {
        return false;
    };
    let beat = grid.beat_seconds();
    let dist = (pos.phase * beat).min((1.0 - pos.phase) * beat);
    dist <= tolerance
}

/// Every beat time in `[0, duration]`, starting from the grid offset.
pub fn beat_markers(duration: f64, grid: &BeatGrid) -> Vec<f64> {
    if !grid.is_valid() || !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }
    let beat = grid.beat_seconds();
    // First beat at or after 0
    let first = grid.offset_seconds - (grid.offset_seconds / beat).floor() * beat;
    let last = ((duration - first) / beat).floor();
    if last < 0.0 {
        return Vec::new();
    }
    (0..=last as usize).map(|i| first + i as f64 * beat).collect()
}

/// True when two tempos are within ±2 BPM, also accepting half/double time.
pub fn tempos_match(a: f64, b: f64) -> bool {
    if !(a.is_finite() && b.is_finite() && a > 0.0 && b > 0.0) {
        return false;
    }
    [b, b * 2.0, b / 2.0]
        .iter()
        .any(|candidate| (a - candidate).abs() <= BPM_MATCH_TOLERANCE)
}
