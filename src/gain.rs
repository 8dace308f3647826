//! Fader law - fader position (0..100) ↔ decibels
//!
//! Piecewise-linear table matched to the console's fader. The breakpoints are
//! part of the saved-session format: changing them changes what stored fader
//! positions mean.

/// Fader position of 0 dB.
pub const UNITY_FADER: f64 = 74.3;

/// Top of the fader travel in dB.
pub const MAX_DB: f64 = 6.0;

/// Level treated as silence by [`db_to_fader`] and the bottom of the
/// sub-8.2 % segment.
pub const FLOOR_DB: f64 = -100.0;

/// (position %, dB)
const FADER_LAW: [(f64, f64); 11] = [
    (0.0, FLOOR_DB),
    (8.2, -40.0),
    (12.3, -30.0),
    (20.9, -20.0),
    (29.1, -15.0),
    (39.9, -10.0),
    (48.5, -6.0),
    (61.2, -3.0),
    (74.3, 0.0),
    (86.9, 3.0),
    (100.0, MAX_DB),
];

/// Fader position → dB. `<= 0` is silence (`-inf`), `>= 100` is +6 dB.
pub fn fader_to_db(position: f64) -> f64 {
    if position.is_nan() || position <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if position >= 100.0 {
        return MAX_DB;
    }
    for pair in FADER_LAW.windows(2) {
        let (p0, d0) = pair[0];
        let (p1, d1) = pair[1];
        if position <= p1 {
            return d0 + (position - p0) / (p1 - p0) * (d1 - d0);
        }
    }
    MAX_DB
}

/// dB → fader position, the inverse of [`fader_to_db`].
pub fn db_to_fader(db: f64) -> f64 {
    if db.is_nan() || db <= FLOOR_DB {
        return 0.0;
    }
    if db >= MAX_DB {
        return 100.0;
    }
    for pair in FADER_LAW.windows(2) {
        let (p0, d0) = pair[0];
        let (p1, d1) = pair[1];
        if db <= d1 {
            return p0 + (db - d0) / (d1 - d0) * (p1 - p0);
        }
    }
    100.0
}

/// dB → linear amplitude gain (`-inf` → 0).
pub fn db_to_gain(db: f64) -> f32 {
    if db == f64::NEG_INFINITY {
        return 0.0;
    }
    10f64.powf(db / 20.0) as f32
}

/// Linear amplitude gain → dB (`<= 0` → `-inf`).
pub fn gain_to_db(gain: f32) -> f64 {
    if gain <= 0.0 {
        return f64::NEG_INFINITY;
    }
    20.0 * f64::from(gain).log10()
}

/// Fader position → linear gain as sent to the engine.
pub fn fader_to_gain(position: f64) -> f32 {
    db_to_gain(fader_to_db(position))
}
