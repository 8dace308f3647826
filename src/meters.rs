//! Metering - level → meter fill, and the snapshot the UI reads
//!
//! The meter scale is its own table, not the fader law reused: meter
//! perception and fader feel are different curves.

use crate::graph::NodeId;

/// Bottom of the meter (0 % fill).
pub const METER_FLOOR_DB: f64 = -60.0;

/// Level helpers clamp to this ceiling; the meter itself is full at 0 dB.
pub const METER_CEILING_DB: f64 = 6.0;

/// (dB, fill %)
const METER_SCALE: [(f64, f64); 12] = [
    (-60.0, 0.0),
    (-48.0, 10.0),
    (-42.0, 18.0),
    (-36.0, 27.0),
    (-30.0, 36.0),
    (-24.0, 46.0),
    (-18.0, 58.0),
    (-12.0, 70.0),
    (-9.0, 78.0),
    (-6.0, 85.0),
    (-3.0, 93.0),
    (0.0, 100.0),
];

/// dB → meter fill, 0..=100.
pub fn db_to_meter_percent(db: f64) -> f64 {
    if db.is_nan() || db <= METER_FLOOR_DB {
        return 0.0;
    }
    if db >= 0.0 {
        return 100.0;
    }
    for pair in METER_SCALE.windows(2) {
        let (d0, m0) = pair[0];
        let (d1, m1) = pair[1];
        if db <= d1 {
            return m0 + (db - d0) / (d1 - d0) * (m1 - m0);
        }
    }
    100.0
}

/// Meter fill → dB, the inverse of [`db_to_meter_percent`] on -60..=0.
pub fn meter_percent_to_db(percent: f64) -> f64 {
    if percent.is_nan() || percent <= 0.0 {
        return METER_FLOOR_DB;
    }
    if percent >= 100.0 {
        return 0.0;
    }
    for pair in METER_SCALE.windows(2) {
        let (d0, m0) = pair[0];
        let (d1, m1) = pair[1];
        if percent <= m1 {
            return d0 + (percent - m0) / (m1 - m0) * (d1 - d0);
        }
    }
    0.0
}

/// Linear level (peak or RMS amplitude) → dB clamped to [-60, +6].
pub fn level_to_db(level: f32) -> f64 {
    if level.is_nan() || level <= 0.0 {
        return METER_FLOOR_DB;
    }
    (20.0 * f64::from(level).log10()).clamp(METER_FLOOR_DB, METER_CEILING_DB)
}

/// Linear level straight to meter fill.
pub fn level_to_meter_percent(level: f32) -> f64 {
    db_to_meter_percent(level_to_db(level))
}

/// Port meter (single channel), already scaled for display
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PortMeter {
    pub peak: f64,
    pub rms: Option<f64>,
}

impl PortMeter {
    /// Scale raw linear peak/RMS values.
    pub fn from_levels(peak: f32, rms: Option<f32>) -> Self {
        Self {
            peak: level_to_meter_percent(peak),
            rms: rms.map(level_to_meter_percent),
        }
    }
}

/// Node meter (all channels)
#[derive(Debug, Clone, PartialEq)]
pub struct NodeMeter {
    pub node: NodeId,
    pub channels: Vec<PortMeter>,
}

/// All meters for the graph
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeterSnapshot {
    pub nodes: Vec<NodeMeter>,
    /// Refresh counter, bumped on every publish
    pub sequence: u64,
}

impl MeterSnapshot {
    pub fn node(&self, id: NodeId) -> Option<&NodeMeter> {
        self.nodes.iter().find(|m| m.node == id)
    }
}
