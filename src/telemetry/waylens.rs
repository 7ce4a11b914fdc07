//! Waylens dashcam export log
//!
//! Two preamble lines, a header line, then one comma separated row per
//! synchronized video frame. Speed columns come in either kph or mph
//! flavour; the header decides once per file. IMU acceleration is logged in
//! g and converted to m/s² here.

use nalgebra::Vector3;
use std::collections::HashMap;
use std::path::Path;

use super::{SpeedUnit, TelemetryError, read_to_string};
use crate::records::LatLon;

const PREAMBLE_LINES: usize = 2;

/// Standard gravity, g → m/s².
pub const STANDARD_GRAVITY: f64 = 9.80665;

pub const FRAME_INDEX: &str = "frame index";
pub const EPOCH_TIME: &str = "epoch time(s)";
pub const PLAY_TIME: &str = "play time(s)";
pub const GNSS_LAT: &str = "gps latitude";
pub const GNSS_LON: &str = "gps longitude";
pub const GNSS_HEADING: &str = "gps heading";
pub const GNSS_ERROR: &str = "gps position error(m)";
pub const GNSS_SPEED_KPH: &str = "gps speed(kph)";
pub const GNSS_SPEED_MPH: &str = "gps speed(mph)";
pub const IMU_ACC: [&str; 3] = ["acc x(g)", "acc y(g)", "acc z(g)"];
pub const IMU_GYRO: [&str; 3] = ["gyro x(dps)", "gyro y(dps)", "gyro z(dps)"];
pub const OBD_SPEED_KPH: &str = "obd speed(kph)";
pub const OBD_SPEED_MPH: &str = "obd speed(mph)";

#[derive(Debug, Clone, PartialEq)]
pub struct WaylensRow {
    pub frame_index: u64,
    pub epoch_sec: f64,
    pub play_sec: f64,
    pub location: LatLon,
    pub heading: Option<f64>,
    pub position_error: Option<f64>,
    /// m/s
    pub gnss_speed: f64,
    /// m/s²
    pub acc: Vector3<f64>,
    pub gyro: Vector3<f64>,
    /// m/s
    pub obd_speed: f64,
}

#[derive(Debug, Clone)]
pub struct WaylensLog {
    rows: Vec<WaylensRow>,
    pub gnss_unit: SpeedUnit,
    pub obd_unit: SpeedUnit,
}

struct Columns {
    frame: usize,
    epoch: usize,
    play: usize,
    lat: usize,
    lon: usize,
    heading: Option<usize>,
    error: Option<usize>,
    gnss_speed: usize,
    acc: [usize; 3],
    gyro: [usize; 3],
    obd_speed: usize,
}

fn find(header: &[String], name: &str) -> Option<usize> {
    header.iter().position(|h| h == name)
}

fn require(header: &[String], name: &str) -> Result<usize, TelemetryError> {
    find(header, name).ok_or_else(|| TelemetryError::MissingColumn(name.to_string()))
}

/// Picks the metric column if present, the imperial one otherwise.
fn speed_column(header: &[String], kph: &str, mph: &str) -> Result<(usize, SpeedUnit), TelemetryError> {
    if let Some(i) = find(header, kph) {
        Ok((i, SpeedUnit::KilometersPerHour))
    } else if let Some(i) = find(header, mph) {
        Ok((i, SpeedUnit::MilesPerHour))
    } else {
        Err(TelemetryError::MissingColumn(format!("{kph} or {mph}")))
    }
}

impl WaylensLog {
    pub fn read(path: &Path) -> Result<Self, TelemetryError> {
        let text = read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, TelemetryError> {
        let mut lines = text.lines().enumerate().skip(PREAMBLE_LINES);
        let (_, header_line) = lines.next().ok_or(TelemetryError::MissingColumn(FRAME_INDEX.to_string()))?;
        let header: Vec<String> = header_line.split(',').map(|h| h.trim().to_ascii_lowercase()).collect();

        let (gnss_speed, gnss_unit) = speed_column(&header, GNSS_SPEED_KPH, GNSS_SPEED_MPH)?;
        let (obd_speed, obd_unit) = speed_column(&header, OBD_SPEED_KPH, OBD_SPEED_MPH)?;
        let cols = Columns {
            frame: require(&header, FRAME_INDEX)?,
            epoch: require(&header, EPOCH_TIME)?,
            play: require(&header, PLAY_TIME)?,
            lat: require(&header, GNSS_LAT)?,
            lon: require(&header, GNSS_LON)?,
            heading: find(&header, GNSS_HEADING),
            error: find(&header, GNSS_ERROR),
            gnss_speed,
            acc: [require(&header, IMU_ACC[0])?, require(&header, IMU_ACC[1])?, require(&header, IMU_ACC[2])?],
            gyro: [require(&header, IMU_GYRO[0])?, require(&header, IMU_GYRO[1])?, require(&header, IMU_GYRO[2])?],
            obd_speed,
        };
        tracing::info!(gnss = gnss_unit.label(), obd = obd_unit.label(), "speed units");

        // later rows for an already seen frame replace the earlier one
        let mut rows: Vec<WaylensRow> = Vec::new();
        let mut seen: HashMap<u64, usize> = HashMap::new();
        for (n, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split(',').map(str::trim).collect();
            let parsed = if cells.len() == header.len() {
                parse_row(&cells, &cols, gnss_unit, obd_unit)
            } else {
                Err(format!("{} cells for {} columns", cells.len(), header.len()))
            };
            match parsed {
                Ok(row) => match seen.get(&row.frame_index) {
                    Some(&i) => rows[i] = row,
                    None => {
                        seen.insert(row.frame_index, rows.len());
                        rows.push(row);
                    }
                },
                Err(reason) => {
                    let err = TelemetryError::Row { line: n + 1, reason };
                    tracing::warn!(%err, "skipping telemetry row");
                }
            }
        }

        if rows.is_empty() {
            return Err(TelemetryError::Empty);
        }
        Ok(WaylensLog { rows, gnss_unit, obd_unit })
    }

    pub fn rows(&self) -> &[WaylensRow] {
        &self.rows
    }

    /// Wall-clock start of the recording in seconds since the epoch,
    /// derived from the earliest logged frame.
    ///
    /// When frame 0 is logged its epoch time is the start. Otherwise the
    /// row's play time is subtracted; if that is unusable the frame index
    /// over `fps` is used as the offset instead.
    pub fn recording_start_sec(&self, fps: f64) -> Option<f64> {
        let first = self.rows.iter().min_by_key(|r| r.frame_index)?;
        if first.frame_index == 0 {
            return Some(first.epoch_sec);
        }
        if first.play_sec.is_finite() && first.play_sec >= 0.0 {
            return Some(first.epoch_sec - first.play_sec);
        }
        if fps > 0.0 {
            return Some(first.epoch_sec - first.frame_index as f64 / fps);
        }
        None
    }

    /// `(play_sec, obd_speed)` pairs in play-time order.
    pub fn speed_profile(&self) -> Vec<(f64, f64)> {
        let mut profile: Vec<(f64, f64)> = self.rows.iter().map(|r| (r.play_sec, r.obd_speed)).collect();
        profile.sort_by(|a, b| a.0.total_cmp(&b.0));
        profile
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn cell<'a>(cells: &[&'a str], i: usize) -> Result<&'a str, String> {
    cells.get(i).copied().ok_or_else(|| format!("row has {} cells, column {i} missing", cells.len()))
}

fn number(cells: &[&str], i: usize) -> Result<f64, String> {
    let raw = cell(cells, i)?;
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| format!("column {i}: not a number '{raw}'"))
}

fn optional(cells: &[&str], i: Option<usize>) -> Option<f64> {
    i.and_then(|i| cells.get(i)).and_then(|raw| raw.parse::<f64>().ok()).filter(|v| v.is_finite())
}

fn vector(cells: &[&str], idx: [usize; 3]) -> Result<Vector3<f64>, String> {
    Ok(Vector3::new(number(cells, idx[0])?, number(cells, idx[1])?, number(cells, idx[2])?))
}

fn parse_row(
    cells: &[&str],
    cols: &Columns,
    gnss_unit: SpeedUnit,
    obd_unit: SpeedUnit,
) -> Result<WaylensRow, String> {
    let frame = number(cells, cols.frame)?;
    if frame < 0.0 {
        return Err(format!("negative frame index {frame}"));
    }
    Ok(WaylensRow {
        frame_index: frame as u64,
        epoch_sec: number(cells, cols.epoch)?,
        play_sec: number(cells, cols.play)?,
        location: [number(cells, cols.lat)?, number(cells, cols.lon)?],
        heading: optional(cells, cols.heading),
        position_error: optional(cells, cols.error),
        gnss_speed: gnss_unit.to_mps(number(cells, cols.gnss_speed)?),
        acc: vector(cells, cols.acc)? * STANDARD_GRAVITY,
        gyro: vector(cells, cols.gyro)?,
        obd_speed: obd_unit.to_mps(number(cells, cols.obd_speed)?),
    })
}
