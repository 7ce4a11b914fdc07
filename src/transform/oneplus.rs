//! OnePlus phone rig: video + 1 Hz GPS track
//!
//! Frames are cut into fixed-duration windows. GPS fixes are bucketed into
//! the same windows by elapsed time; every fix becomes its own element and
//! every frame gets the location of the fix its index scales to.

use std::path::Path;

use super::{DiaryKeying, DriveSource, DriveTiming, SensorRig, WindowBuilder};
use crate::align::{FixedRateAligner, MICROS_PER_SEC};
use crate::chunker::{ChunkPolicy, FrameWindow};
use crate::config::Hardware;
use crate::error::Result;
use crate::records::{GnssReading, LatLon, SensorPayload};
use crate::telemetry::{GnssSample, GnssTrack, TelemetryError};
use crate::video::VideoInfo;

pub const VENDOR: &str = "OnePlus6T";
pub const GPS_HZ: f64 = 1.0;
pub const DATA_FORMAT: &str = "raw";

#[derive(Debug, Clone)]
pub struct OnePlus {
    rig: SensorRig,
}

impl OnePlus {
    pub fn new() -> Self {
        Self { rig: SensorRig::new(VENDOR, GPS_HZ, 0.0, 0.0) }
    }
}

impl Default for OnePlus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct OnePlusAligner {
    fixed: FixedRateAligner,
    buckets: Vec<Vec<GnssSample>>,
}

impl DriveSource for OnePlus {
    type Telemetry = GnssTrack;
    type Aligner = OnePlusAligner;

    fn hardware(&self) -> Hardware {
        Hardware::OnePlus
    }

    fn diary_keying(&self) -> DiaryKeying {
        DiaryKeying::Current
    }

    fn rig(&self) -> &SensorRig {
        &self.rig
    }

    fn data_format(&self) -> &'static str {
        DATA_FORMAT
    }

    fn load_telemetry(&self, path: &Path) -> Result<GnssTrack> {
        let track = GnssTrack::read(path)?;
        tracing::info!(fixes = track.len(), "GPS track loaded");
        Ok(track)
    }

    /// Frame 0 is pinned to the first GPS fix; the container time of these
    /// files is not trusted.
    fn timing(&self, video: &VideoInfo, telemetry: &GnssTrack) -> Result<DriveTiming> {
        let start_us = telemetry.start_us().ok_or(TelemetryError::Empty)?;
        Ok(DriveTiming { fps: video.reconciled_fps(), start_us })
    }

    fn chunk_policy(&self, chunk_size_sec: f64) -> ChunkPolicy {
        ChunkPolicy::FixedDuration { chunk_size_sec }
    }

    fn aligner(&self, telemetry: &GnssTrack, timing: &DriveTiming, windows: &[FrameWindow]) -> OnePlusAligner {
        let fixed = FixedRateAligner::new(windows, timing.fps);
        let buckets = fixed.bucket(telemetry.normalized().map(|(t, s)| (t, s.clone())));
        let empty = buckets.iter().filter(|b| b.is_empty()).count();
        if empty > 0 {
            tracing::warn!(windows = buckets.len(), empty, "some sequences have no GPS fixes");
        }
        OnePlusAligner { fixed, buckets }
    }

    fn populate_window(&self, aligner: &mut OnePlusAligner, cx: &mut WindowBuilder<'_>) -> Result<()> {
        let mut fixes = std::mem::take(&mut aligner.buckets[cx.window.index]);
        fixes.sort_by_key(|s| s.utc_us);
        let locations: Vec<LatLon> = fixes.iter().map(|s| s.location).collect();
        let frames = aligner.fixed.align_window(&cx.window, &locations);

        // interleave fixes and frames by timestamp so elements stay in time order
        let mut fixes = fixes.into_iter().peekable();
        for (offset, alignment) in frames.iter().enumerate() {
            let frame = cx.window.start_frame + offset as u64;
            let frame_ts = cx.timing.frame_timestamp(frame);
            while let Some(fix) = fixes.next_if(|s| s.utc_us <= frame_ts) {
                self.add_fix(cx, fix)?;
            }
            cx.add_frame(frame, Some(alignment.location), alignment.sync)?;
        }
        for fix in fixes {
            self.add_fix(cx, fix)?;
        }
        Ok(())
    }

    fn speed_profile(&self, telemetry: &GnssTrack) -> Vec<(f64, f64)> {
        let mut profile: Vec<(f64, f64)> =
            telemetry.normalized().map(|(t, s)| (t as f64 / MICROS_PER_SEC, s.speed)).collect();
        profile.sort_by(|a, b| a.0.total_cmp(&b.0));
        profile
    }
}

impl OnePlus {
    fn add_fix(&self, cx: &mut WindowBuilder<'_>, fix: GnssSample) -> Result<()> {
        let data = cx.add_instant(Some(fix.location), fix.utc_us, false, "")?;
        let payload = SensorPayload::Gnss(GnssReading {
            gnss_loc: fix.location,
            gnss_speed: fix.speed,
            gnss_heading: None,
            gnss_loc_error: None,
        });
        cx.add_reading(&data, &self.rig.gnss, payload)?;
        Ok(())
    }
}
