//! Telemetry readers for the supported hardware sources
//!
//! - `oneplus`: phone rig GPS log (`.xml`, one fix per second)
//! - `waylens`: dashcam export (`.csv`, rows indexed by video frame)
//!
//! Both readers convert every speed to m/s while parsing so the rest of the
//! pipeline never sees vendor units.

pub mod oneplus;
pub mod waylens;

use std::path::PathBuf;
use thiserror::Error;

pub use oneplus::{GnssSample, GnssTrack};
pub use waylens::{WaylensLog, WaylensRow};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("cannot read telemetry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed XML telemetry: {0}")]
    Xml(String),
    #[error("line {line}: {reason}")]
    Row { line: usize, reason: String },
    #[error("missing telemetry column: {0}")]
    MissingColumn(String),
    #[error("telemetry file has no samples")]
    Empty,
}

/// Speed units found in vendor logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    MilesPerHour,
    KilometersPerHour,
    MetersPerSecond,
}

impl SpeedUnit {
    /// Multiplier to m/s.
    pub fn factor(self) -> f64 {
        match self {
            SpeedUnit::MilesPerHour => 0.44704,
            SpeedUnit::KilometersPerHour => 0.277778,
            SpeedUnit::MetersPerSecond => 1.0,
        }
    }

    pub fn to_mps(self, value: f64) -> f64 {
        value * self.factor()
    }

    /// Detects the unit from a value such as `"12.5 km/h"` or a column header
    /// such as `"speed(mph)"`.
    pub fn detect(text: &str) -> Option<SpeedUnit> {
        let t = text.to_ascii_lowercase();
        if t.contains("mp/h") || t.contains("mph") {
            Some(SpeedUnit::MilesPerHour)
        } else if t.contains("km/h") || t.contains("kph") || t.contains("kmh") {
            Some(SpeedUnit::KilometersPerHour)
        } else if t.contains("m/s") {
            Some(SpeedUnit::MetersPerSecond)
        } else {
            None
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedUnit::MilesPerHour => "mph",
            SpeedUnit::KilometersPerHour => "km/h",
            SpeedUnit::MetersPerSecond => "m/s",
        }
    }
}

fn read_to_string(path: &std::path::Path) -> Result<String, TelemetryError> {
    std::fs::read_to_string(path).map_err(|source| TelemetryError::Io { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kph_is_converted_to_mps() {
        let v = SpeedUnit::KilometersPerHour.to_mps(100.0);
        assert!((v - 27.7778).abs() < 1e-3, "{v}");
    }

    #[test]
    fn units_are_detected_from_values_and_headers() {
        assert_eq!(SpeedUnit::detect("12.5 mp/h"), Some(SpeedUnit::MilesPerHour));
        assert_eq!(SpeedUnit::detect("40 km/h"), Some(SpeedUnit::KilometersPerHour));
        assert_eq!(SpeedUnit::detect("3.1 m/s"), Some(SpeedUnit::MetersPerSecond));
        assert_eq!(SpeedUnit::detect("OBD Speed(kph)"), Some(SpeedUnit::KilometersPerHour));
        assert_eq!(SpeedUnit::detect("gnss speed(mph)"), Some(SpeedUnit::MilesPerHour));
        assert_eq!(SpeedUnit::detect("42"), None);
    }
}
