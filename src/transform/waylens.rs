//! Waylens dashcam: video + frame-indexed CSV log
//!
//! Sequences follow wall-clock minutes. A frame with a log row carries GNSS,
//! IMU and vehicle readings next to its camera reading; other frames carry
//! the camera reading only and are marked unsynchronized.

use std::path::Path;

use super::{DiaryKeying, DriveSource, DriveTiming, SensorRig, WindowBuilder};
use crate::align::{IndexedAligner, MICROS_PER_SEC};
use crate::chunker::{ChunkPolicy, FrameWindow};
use crate::config::Hardware;
use crate::error::{Result, TransformError};
use crate::records::{GnssReading, ImuReading, LatLon, SensorPayload, VehicleReading};
use crate::telemetry::{WaylensLog, WaylensRow};
use crate::video::VideoInfo;

pub const VENDOR: &str = "Waylens";
pub const SENSOR_HZ: f64 = 10.0;
pub const DATA_FORMAT: &str = "mpeg";

#[derive(Debug, Clone)]
pub struct Waylens {
    rig: SensorRig,
}

impl Waylens {
    pub fn new() -> Self {
        Self { rig: SensorRig::new(VENDOR, SENSOR_HZ, SENSOR_HZ, SENSOR_HZ) }
    }
}

impl Default for Waylens {
    fn default() -> Self {
        Self::new()
    }
}

pub struct WaylensAligner {
    index: IndexedAligner<WaylensRow>,
    last_fix: Option<LatLon>,
}

impl DriveSource for Waylens {
    type Telemetry = WaylensLog;
    type Aligner = WaylensAligner;

    fn hardware(&self) -> Hardware {
        Hardware::Waylens
    }

    fn diary_keying(&self) -> DiaryKeying {
        DiaryKeying::ByDate
    }

    fn rig(&self) -> &SensorRig {
        &self.rig
    }

    fn data_format(&self) -> &'static str {
        DATA_FORMAT
    }

    fn load_telemetry(&self, path: &Path) -> Result<WaylensLog> {
        let log = WaylensLog::read(path)?;
        tracing::info!(rows = log.len(), "telemetry log loaded");
        Ok(log)
    }

    /// The exporter overwrites the container creation time, so the start is
    /// recovered from the log. The container time is only a last resort.
    fn timing(&self, video: &VideoInfo, telemetry: &WaylensLog) -> Result<DriveTiming> {
        let fps = video.fps;
        let start_sec = match telemetry.recording_start_sec(fps) {
            Some(sec) => sec,
            None => match video.creation_time {
                Some(created) => {
                    tracing::warn!(%created, "no usable start time in log, using container creation time");
                    created.timestamp_micros() as f64 / MICROS_PER_SEC
                }
                None => return Err(TransformError::Drive("cannot determine recording start time".into())),
            },
        };
        Ok(DriveTiming { fps, start_us: (start_sec * MICROS_PER_SEC).round() as i64 })
    }

    fn chunk_policy(&self, _chunk_size_sec: f64) -> ChunkPolicy {
        ChunkPolicy::WallClockMinute
    }

    fn aligner(&self, telemetry: &WaylensLog, _timing: &DriveTiming, windows: &[FrameWindow]) -> WaylensAligner {
        let frames: u64 = windows.iter().map(FrameWindow::frame_count).sum();
        let outside = telemetry.rows().iter().filter(|r| r.frame_index >= frames).count();
        if outside > 0 {
            tracing::warn!(rows = outside, frames, "log rows beyond the last video frame");
        }
        let index = IndexedAligner::new(telemetry.rows().iter().map(|r| (r.frame_index, r.clone())));
        tracing::debug!(rows = index.len(), windows = windows.len(), "frame index built");
        WaylensAligner { index, last_fix: None }
    }

    fn populate_window(&self, aligner: &mut WaylensAligner, cx: &mut WindowBuilder<'_>) -> Result<()> {
        for frame in cx.window.frames() {
            let (row, sync) = aligner.index.lookup(frame);
            if let Some(row) = row {
                aligner.last_fix = Some(row.location);
            }
            let data = cx.add_frame(frame, aligner.last_fix, sync)?;

            let Some(row) = row else { continue };
            let gnss = SensorPayload::Gnss(GnssReading {
                gnss_loc: row.location,
                gnss_speed: row.gnss_speed,
                gnss_heading: row.heading,
                gnss_loc_error: row.position_error,
            });
            let imu = SensorPayload::Imu(ImuReading {
                imu_acc: [row.acc.x, row.acc.y, row.acc.z],
                imu_gyro: [row.gyro.x, row.gyro.y, row.gyro.z],
            });
            let vehicle = SensorPayload::Vehicle(VehicleReading {
                vehicle_speed: row.obd_speed,
                vehicle_odometer: None,
                vehicle_steering_angle: None,
            });
            cx.add_reading(&data, &self.rig.gnss, gnss)?;
            cx.add_reading(&data, &self.rig.imu, imu)?;
            cx.add_reading(&data, &self.rig.vehicle, vehicle)?;
        }
        Ok(())
    }

    fn speed_profile(&self, telemetry: &WaylensLog) -> Vec<(f64, f64)> {
        telemetry.speed_profile()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{Modality, RecordGraph, RecordKind};
    use chrono::{TimeZone, Utc};

    const HEADER: &str = "Frame Index,Epoch Time(s),Play Time(s),GPS Latitude,GPS Longitude,GPS Heading,\
GPS Position Error(m),GPS Speed(kph),Acc X(g),Acc Y(g),Acc Z(g),Gyro X(dps),Gyro Y(dps),Gyro Z(dps),OBD Speed(kph)";

    fn log(rows: &[&str]) -> WaylensLog {
        let mut text = format!("Waylens export\nCamera: 2B17\n{HEADER}\n");
        for r in rows {
            text.push_str(r);
            text.push('\n');
        }
        WaylensLog::parse(&text).unwrap()
    }

    fn video(fps: f64, frames: u64) -> VideoInfo {
        VideoInfo {
            width: 1280,
            height: 720,
            fps,
            frame_count: frames,
            duration_sec: frames as f64 / fps,
            codec: "h264".into(),
            creation_time: None,
        }
    }

    #[test]
    fn start_is_recovered_from_play_time() {
        let log = log(&["30,1000.0,1.0,52.5,13.4,0,1,36,0,0,1,0,0,0,36"]);
        let timing = Waylens::new().timing(&video(30.0, 300), &log).unwrap();
        assert_eq!(timing.start_us, 999_000_000);
    }

    #[test]
    fn container_time_is_the_last_resort() {
        let log = log(&["30,1000.0,-1.0,52.5,13.4,0,1,36,0,0,1,0,0,0,36"]);
        assert!(Waylens::new().timing(&video(0.0, 0), &log).is_err());

        let mut v = video(0.0, 0);
        v.creation_time = Some(Utc.timestamp_opt(1_560_000_000, 0).unwrap());
        let timing = Waylens::new().timing(&v, &log).unwrap();
        assert_eq!(timing.start_us, 1_560_000_000_000_000);
    }

    #[test]
    fn frames_without_rows_are_unsynchronized_and_carry_the_last_fix() {
        let source = Waylens::new();
        let log = log(&[
            "0,1000.0,0.0,52.50,13.40,0,1,36,0,0,1,0,0,0,36",
            "2,1000.2,0.2,52.52,13.42,0,1,36,0,0,1,0,0,0,36",
        ]);
        let video = video(10.0, 4);
        let timing = source.timing(&video, &log).unwrap();
        let window = FrameWindow { index: 0, start_frame: 0, end_frame: 3 };

        let mut graph = RecordGraph::new();
        let diary = graph.add_diary("1970-01-01", "sally", "log.csv", "Berlin").unwrap();
        let drive = graph.add_drive(&diary, false).unwrap();
        let sequence = graph.add_sequence(&drive).unwrap();
        let camera = source.rig().camera(timing.fps);
        let mut aligner = source.aligner(&log, &timing, &[window]);
        let mut cx = WindowBuilder {
            graph: &mut graph,
            sequence: sequence.clone(),
            window,
            timing: &timing,
            video: &video,
            video_name: "drive.mp4",
            camera: &camera,
            data_format: DATA_FORMAT,
        };
        source.populate_window(&mut aligner, &mut cx).unwrap();

        let elements: Vec<_> =
            graph.sequence(&sequence).unwrap().element_tokens.iter().map(|t| graph.element(t).unwrap()).collect();
        assert_eq!(elements.iter().map(|e| e.sync).collect::<Vec<_>>(), vec![true, false, true, false]);
        assert_eq!(elements[1].element_location, Some([52.50, 13.40]));
        assert_eq!(elements[3].element_location, Some([52.52, 13.42]));

        // 4 camera readings + gnss/imu/vehicle for the two logged frames
        assert_eq!(graph.len(RecordKind::Sensor), 10);
        let data = graph.data(elements[0].data_token.as_ref().unwrap()).unwrap();
        let modalities: Vec<_> = data.sensor_tokens.iter().map(|t| graph.sensor(t).unwrap().modality()).collect();
        assert_eq!(modalities, vec![Modality::Camera, Modality::Gnss, Modality::Imu, Modality::Vehicle]);
        assert_eq!(data.data_format, "mpeg");
    }
}
