use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type, Q_BUTTERWORTH_F32};

/// Bass shelf corner frequency.
pub const BASS_SHELF_HZ: f32 = 200.0;
/// Treble shelf corner frequency.
pub const TREBLE_SHELF_HZ: f32 = 3_000.0;

/// Two-band tone control: low shelf (bass) → high shelf (treble).
/// One instance per stereo side.
pub struct ToneShelves {
    sample_rate: f32,
    bass_db: f32,
    treble_db: f32,
    low_shelf: DirectForm2Transposed<f32>,
    high_shelf: DirectForm2Transposed<f32>,
}

impl ToneShelves {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            bass_db: 0.0,
            treble_db: 0.0,
            low_shelf: DirectForm2Transposed::<f32>::new(unity_coeffs()),
            high_shelf: DirectForm2Transposed::<f32>::new(unity_coeffs()),
        }
    }

    /// Rebuild coefficients. No-op when the gains did not change.
    pub fn set_gains(&mut self, bass_db: f32, treble_db: f32) {
        if (bass_db - self.bass_db).abs() < 1e-3 && (treble_db - self.treble_db).abs() < 1e-3 {
            return;
        }
        self.bass_db = bass_db;
        self.treble_db = treble_db;
        let nyquist = self.sample_rate / 2.0 - 1.0;
        self.low_shelf
            .update_coefficients(shelf(Type::LowShelf(bass_db), self.sample_rate, BASS_SHELF_HZ.min(nyquist)));
        self.high_shelf
            .update_coefficients(shelf(Type::HighShelf(treble_db), self.sample_rate, TREBLE_SHELF_HZ.min(nyquist)));
    }

    pub fn is_flat(&self) -> bool {
        self.bass_db.abs() < 1e-3 && self.treble_db.abs() < 1e-3
    }

    #[inline]
    pub fn process(&mut self, sample: f32) -> f32 {
        let s = self.low_shelf.run(sample);
        self.high_shelf.run(s)
    }
}

fn shelf(kind: Type<f32>, sample_rate: f32, corner_hz: f32) -> Coefficients<f32> {
    Coefficients::<f32>::from_params(kind, sample_rate.hz(), corner_hz.hz(), Q_BUTTERWORTH_F32)
        .unwrap_or_else(|_| unity_coeffs())
}

/// Coefficients that pass audio unmodified
fn unity_coeffs() -> Coefficients<f32> {
    Coefficients {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    }
}
