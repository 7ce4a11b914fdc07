//! OnePlus GPS logger track
//!
//! ```xml
//! <root>
//!   <position>
//!     <x_loc>52.5219</x_loc>
//!     <y_loc>13.4132</y_loc>
//!     <speed>12.5 km/h</speed>
//!     <date>2019-06-13 00:46:29</date>
//!   </position>
//!   ...
//! </root>
//! ```
//!
//! Dates carry second resolution and are read as UTC.

use chrono::NaiveDateTime;
use quick_xml::Reader as XmlReader;
use quick_xml::events::Event;
use std::path::Path;

use super::{SpeedUnit, TelemetryError, read_to_string};
use crate::records::LatLon;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq)]
pub struct GnssSample {
    /// Wall-clock time in microseconds since the epoch.
    pub utc_us: i64,
    pub location: LatLon,
    /// m/s
    pub speed: f64,
}

/// Fixes of one recording, in file order.
#[derive(Debug, Clone, Default)]
pub struct GnssTrack {
    pub samples: Vec<GnssSample>,
}

impl GnssTrack {
    pub fn read(path: &Path) -> Result<Self, TelemetryError> {
        let xml = read_to_string(path)?;
        Self::parse(&xml)
    }

    pub fn parse(xml: &str) -> Result<Self, TelemetryError> {
        let mut reader = XmlReader::from_str(xml);
        reader.trim_text(true);
        let mut buf = Vec::new();

        let mut samples = Vec::new();
        let mut current: Option<PositionFields> = None;
        let mut field: Option<Vec<u8>> = None;
        let mut position_index = 0usize;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => match e.name().as_ref() {
                    b"position" => current = Some(PositionFields::default()),
                    name if current.is_some() => field = Some(name.to_vec()),
                    _ => {}
                },
                Ok(Event::Text(ref t)) => {
                    if let (Some(pos), Some(name)) = (current.as_mut(), field.as_deref()) {
                        let text = t.unescape().map_err(|e| TelemetryError::Xml(e.to_string()))?;
                        pos.set(name, text.trim());
                    }
                }
                Ok(Event::End(ref e)) => match e.name().as_ref() {
                    b"position" => {
                        if let Some(pos) = current.take() {
                            match pos.finish() {
                                Ok(sample) => samples.push(sample),
                                Err(reason) => {
                                    tracing::warn!(position = position_index, %reason, "skipping GPS fix");
                                }
                            }
                            position_index += 1;
                        }
                    }
                    _ => field = None,
                },
                Ok(Event::Eof) => break,
                Err(e) => {
                    return Err(TelemetryError::Xml(format!(
                        "at byte {}: {e}",
                        reader.buffer_position()
                    )));
                }
                _ => {}
            }
            buf.clear();
        }

        if samples.is_empty() {
            return Err(TelemetryError::Empty);
        }
        Ok(Self { samples })
    }

    pub fn start_us(&self) -> Option<i64> {
        self.samples.first().map(|s| s.utc_us)
    }

    /// `(elapsed_us, sample)` pairs, elapsed time measured from the first fix.
    pub fn normalized(&self) -> impl Iterator<Item = (i64, &GnssSample)> {
        let start = self.start_us().unwrap_or_default();
        self.samples.iter().map(move |s| (s.utc_us - start, s))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Default)]
struct PositionFields {
    x: Option<String>,
    y: Option<String>,
    speed: Option<String>,
    date: Option<String>,
}

impl PositionFields {
    fn set(&mut self, name: &[u8], value: &str) {
        let slot = match name {
            b"x_loc" => &mut self.x,
            b"y_loc" => &mut self.y,
            b"speed" => &mut self.speed,
            b"date" => &mut self.date,
            _ => return,
        };
        *slot = Some(value.to_string());
    }

    fn finish(self) -> Result<GnssSample, String> {
        let lat = parse_coord(self.x.as_deref(), "x_loc")?;
        let lon = parse_coord(self.y.as_deref(), "y_loc")?;
        let date = self.date.ok_or("missing date")?;
        let utc = NaiveDateTime::parse_from_str(&date, DATE_FORMAT)
            .map_err(|e| format!("bad date '{date}': {e}"))?
            .and_utc();
        let speed = match self.speed.as_deref() {
            Some(raw) => parse_speed(raw)?,
            None => 0.0,
        };
        Ok(GnssSample { utc_us: utc.timestamp_micros(), location: [lat, lon], speed })
    }
}

fn parse_coord(value: Option<&str>, name: &str) -> Result<f64, String> {
    let raw = value.ok_or_else(|| format!("missing {name}"))?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("bad {name} '{raw}'"))
}

/// `"12.5 km/h"` → m/s. A bare number is taken as m/s.
pub fn parse_speed(raw: &str) -> Result<f64, String> {
    let number = raw.split_whitespace().next().unwrap_or_default();
    let value: f64 = number
        .parse()
        .ok()
        .filter(|v: &f64| v.is_finite())
        .ok_or_else(|| format!("bad speed '{raw}'"))?;
    let unit = SpeedUnit::detect(raw).unwrap_or(SpeedUnit::MetersPerSecond);
    Ok(unit.to_mps(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRACK: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root>
  <position>
    <x_loc>52.5219</x_loc>
    <y_loc>13.4132</y_loc>
    <speed>36 km/h</speed>
    <time>00:46:29</time>
    <date>2019-06-13 00:46:29</date>
  </position>
  <position>
    <x_loc>52.5220</x_loc>
    <y_loc>13.4135</y_loc>
    <speed>10 mp/h</speed>
    <date>2019-06-13 00:46:30</date>
  </position>
  <position>
    <x_loc>not-a-number</x_loc>
    <y_loc>13.4135</y_loc>
    <speed>1 m/s</speed>
    <date>2019-06-13 00:46:31</date>
  </position>
</root>"#;

    #[test]
    fn parses_positions_and_converts_speed() {
        let track = GnssTrack::parse(TRACK).unwrap();
        assert_eq!(track.len(), 2);
        assert_eq!(track.samples[0].location, [52.5219, 13.4132]);
        assert!((track.samples[0].speed - 10.0).abs() < 1e-3);
        assert!((track.samples[1].speed - 4.4704).abs() < 1e-9);
        assert_eq!(track.samples[0].utc_us, 1_560_386_789_000_000);
    }

    #[test]
    fn normalized_time_starts_at_zero() {
        let track = GnssTrack::parse(TRACK).unwrap();
        let elapsed: Vec<i64> = track.normalized().map(|(t, _)| t).collect();
        assert_eq!(elapsed, vec![0, 1_000_000]);
    }

    #[test]
    fn track_without_positions_is_empty() {
        assert!(matches!(GnssTrack::parse("<root></root>"), Err(TelemetryError::Empty)));
    }

    #[test]
    fn broken_xml_is_an_error() {
        assert!(matches!(GnssTrack::parse("<root><position></root>"), Err(TelemetryError::Xml(_))));
    }

    #[test]
    fn bare_speed_is_meters_per_second() {
        assert_eq!(parse_speed("3.5").unwrap(), 3.5);
        assert!(parse_speed("fast").is_err());
    }
}
