//! Drive → schema transformation
//!
//! [`DriveTransformer`] runs the steps shared by every hardware source:
//! probe the video, load telemetry, plan the sequence windows, build the
//! records of each window, validate them, cut the video segment and write
//! the sequence directory. What differs between sources (telemetry format,
//! timing, chunk policy, frame alignment) sits behind [`DriveSource`].

pub mod batch;
pub mod oneplus;
pub mod stats;
pub mod waylens;

use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

use crate::align::frame_offset_us;
use crate::chunker::{ChunkPolicy, FrameWindow};
use crate::config::Hardware;
use crate::error::{Result, TransformError};
use crate::layout::FileSystemLayout;
use crate::pairing::DrivePair;
use crate::records::graph::SensorSource;
use crate::records::{CameraReading, LatLon, RecordGraph, RecordKind, SensorPayload, Token};
use crate::schema::SchemaRegistry;
use crate::tables::{save_table, to_rows, validate_rows};
use crate::video::{SegmentReport, VideoInfo, VideoSplitter, VideoTool};

pub use batch::BatchTransformer;
pub use oneplus::OnePlus;
pub use stats::{DriveSummary, SummaryReport};
pub use waylens::Waylens;

/// How drives are attached to diaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiaryKeying {
    /// One diary per calendar date of the drive.
    ByDate,
    /// Every drive of the batch goes to the first diary created.
    Current,
}

/// Resolved timing of one drive.
#[derive(Debug, Clone, PartialEq)]
pub struct DriveTiming {
    pub fps: f64,
    /// Wall-clock time of frame 0, microseconds since the epoch.
    pub start_us: i64,
}

impl DriveTiming {
    pub fn frame_timestamp(&self, frame: u64) -> i64 {
        self.start_us + frame_offset_us(frame, self.fps)
    }

    pub fn start_sec(&self) -> f64 {
        self.start_us as f64 / crate::align::MICROS_PER_SEC
    }

    /// UTC calendar date of the drive start, `YYYY-MM-DD`.
    pub fn diary_date(&self) -> Result<String> {
        DateTime::<Utc>::from_timestamp_micros(self.start_us)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .ok_or_else(|| TransformError::Drive(format!("start time {} us is out of range", self.start_us)))
    }
}

/// Sensor identities shared by every reading of a batch.
#[derive(Debug, Clone)]
pub struct SensorRig {
    pub camera_vendor: String,
    pub camera_hardware: Token,
    pub gnss: SensorSource,
    pub imu: SensorSource,
    pub vehicle: SensorSource,
}

impl SensorRig {
    pub fn new(vendor: &str, gnss_hz: f64, imu_hz: f64, vehicle_hz: f64) -> Self {
        Self {
            camera_vendor: vendor.to_string(),
            camera_hardware: Token::generate(),
            gnss: SensorSource::new(vendor, gnss_hz),
            imu: SensorSource::new(vendor, imu_hz),
            vehicle: SensorSource::new(vendor, vehicle_hz),
        }
    }

    /// Camera source at the drive's frame rate.
    pub fn camera(&self, fps: f64) -> SensorSource {
        SensorSource {
            hardware: self.camera_hardware.clone(),
            vendor: self.camera_vendor.clone(),
            sampling_frequency: fps,
        }
    }
}

/// Hardware-specific half of a drive transformation.
pub trait DriveSource {
    type Telemetry;
    /// Per-drive alignment state, threaded through the windows in order.
    type Aligner;

    fn hardware(&self) -> Hardware;
    fn diary_keying(&self) -> DiaryKeying;
    fn rig(&self) -> &SensorRig;
    /// `data_format` of every data record.
    fn data_format(&self) -> &'static str;

    fn load_telemetry(&self, path: &Path) -> Result<Self::Telemetry>;
    fn timing(&self, video: &VideoInfo, telemetry: &Self::Telemetry) -> Result<DriveTiming>;
    fn chunk_policy(&self, chunk_size_sec: f64) -> ChunkPolicy;
    fn aligner(&self, telemetry: &Self::Telemetry, timing: &DriveTiming, windows: &[FrameWindow]) -> Self::Aligner;

    /// Adds the elements, data and sensor readings of one window to its sequence.
    fn populate_window(&self, aligner: &mut Self::Aligner, cx: &mut WindowBuilder<'_>) -> Result<()>;

    /// `(elapsed_sec, speed_mps)` samples used for the drive summary.
    fn speed_profile(&self, telemetry: &Self::Telemetry) -> Vec<(f64, f64)>;
}

/// Record construction helpers for one window of one drive.
pub struct WindowBuilder<'a> {
    pub graph: &'a mut RecordGraph,
    pub sequence: Token,
    pub window: FrameWindow,
    pub timing: &'a DriveTiming,
    pub video: &'a VideoInfo,
    pub video_name: &'a str,
    pub camera: &'a SensorSource,
    pub data_format: &'static str,
}

impl WindowBuilder<'_> {
    /// Element + data for one instant. Returns the data token.
    pub fn add_instant(
        &mut self,
        location: Option<LatLon>,
        timestamp: i64,
        sync: bool,
        blob: &str,
    ) -> Result<Token> {
        let element = self.graph.add_element(&self.sequence, location, timestamp, sync, None, None)?;
        Ok(self.graph.add_data(&element, location, timestamp, blob, self.data_format)?)
    }

    /// Element + data + camera reading for `frame`. Returns the data token.
    pub fn add_frame(&mut self, frame: u64, location: Option<LatLon>, sync: bool) -> Result<Token> {
        let timestamp = self.timing.frame_timestamp(frame);
        let blob = FileSystemLayout::segment_relative();
        let data = self.add_instant(location, timestamp, sync, &blob)?;
        let camera = SensorPayload::Camera(CameraReading {
            cam_codec: self.video.codec.clone(),
            cam_is_resized: false,
            cam_im_width: self.video.width,
            cam_im_height: self.video.height,
            cam_seq_number: Some(frame as i64),
            cam_time_stamp: frame_offset_us(frame, self.timing.fps),
            bsens_seq_filename: self.video_name.to_string(),
            bsens_seq_frame: frame as i64,
        });
        self.graph.add_sensor_reading(&data, self.camera, true, camera)?;
        Ok(data)
    }

    pub fn add_reading(&mut self, data: &Token, source: &SensorSource, payload: SensorPayload) -> Result<Token> {
        Ok(self.graph.add_sensor_reading(data, source, true, payload)?)
    }
}

/// Per-drive presentation settings.
#[derive(Debug, Clone)]
pub struct DriveSettings {
    pub vehicle_id: String,
    pub location: String,
    pub chunk_size_sec: f64,
    pub show_progress: bool,
    pub json_dump: bool,
}

/// Result of one successfully transformed drive.
#[derive(Debug, Clone)]
pub struct DriveOutcome {
    pub diary: Token,
    pub diary_date: String,
    pub drive: Token,
    pub drive_dir: PathBuf,
    pub segments: Vec<SegmentReport>,
    pub summary: DriveSummary,
}

pub struct DriveTransformer<'a, S: DriveSource> {
    source: S,
    tool: &'a dyn VideoTool,
    registry: &'a SchemaRegistry,
    layout: FileSystemLayout,
    settings: DriveSettings,
}

impl<'a, S: DriveSource> DriveTransformer<'a, S> {
    pub fn new(
        source: S,
        tool: &'a dyn VideoTool,
        registry: &'a SchemaRegistry,
        layout: FileSystemLayout,
        settings: DriveSettings,
    ) -> Self {
        Self { source, tool, registry, layout, settings }
    }

    pub fn layout(&self) -> &FileSystemLayout {
        &self.layout
    }

    pub fn settings(&self) -> &DriveSettings {
        &self.settings
    }

    /// Transforms one (video, telemetry) pair into a drive directory.
    ///
    /// On failure the drive is withdrawn from its diary and its directory is
    /// removed.
    pub fn transform(&self, graph: &mut RecordGraph, pair: &DrivePair) -> Result<DriveOutcome> {
        let telemetry = self.source.load_telemetry(&pair.telemetry)?;
        let video = self.tool.probe(&pair.video)?;
        let timing = self.source.timing(&video, &telemetry)?;
        let diary_date = timing.diary_date()?;

        tracing::info!(
            hardware = %self.source.hardware(),
            video = %pair.video.display(),
            width = video.width,
            height = video.height,
            fps = timing.fps,
            frames = video.frame_count,
            duration_sec = video.duration_sec,
            start = %diary_date,
            "input video"
        );

        let windows = self
            .source
            .chunk_policy(self.settings.chunk_size_sec)
            .plan(video.frame_count, timing.fps, timing.start_sec())?;

        let diary = self.diary_for(graph, &diary_date, pair)?;
        let drive = graph.add_drive(&diary, false)?;
        let date = graph.diary(&diary)?.diary_date.clone();
        let drive_dir = self.layout.drive_dir(&date, &diary, &self.settings.vehicle_id, &drive);

        let built =
            self.build_drive(graph, pair, &telemetry, &video, &timing, &windows, &diary, &drive, &drive_dir);
        if built.is_err() {
            graph.withdraw_drive(&diary, &drive)?;
            self.discard_drive_dir(&drive_dir);
        }
        built
    }

    /// Removes a failed drive's directory and any parent it leaves empty.
    fn discard_drive_dir(&self, drive_dir: &Path) {
        if let Err(e) = std::fs::remove_dir_all(drive_dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!(dir = %drive_dir.display(), error = %e, "could not remove partial drive");
            }
        }
        let mut dir = drive_dir.parent();
        while let Some(d) = dir {
            if d == self.layout.root() || std::fs::remove_dir(d).is_err() {
                break;
            }
            dir = d.parent();
        }
    }

    fn diary_for(&self, graph: &mut RecordGraph, date: &str, pair: &DrivePair) -> Result<Token> {
        if self.source.diary_keying() == DiaryKeying::Current {
            if let Some(diary) = graph.current_diary() {
                return Ok(diary.diary_token.clone());
            }
        }
        let log_path = pair.telemetry.display().to_string();
        Ok(graph.add_diary(date, &self.settings.vehicle_id, &log_path, &self.settings.location)?)
    }

    #[allow(clippy::too_many_arguments)]
    fn build_drive(
        &self,
        graph: &mut RecordGraph,
        pair: &DrivePair,
        telemetry: &S::Telemetry,
        video: &VideoInfo,
        timing: &DriveTiming,
        windows: &[FrameWindow],
        diary: &Token,
        drive: &Token,
        drive_dir: &Path,
    ) -> Result<DriveOutcome> {
        let date = graph.diary(diary)?.diary_date.clone();
        std::fs::create_dir_all(drive_dir).map_err(|e| TransformError::io(drive_dir, e))?;

        let video_name = pair.video.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let camera = self.source.rig().camera(timing.fps);
        let mut aligner = self.source.aligner(telemetry, timing, windows);
        let splitter = VideoSplitter::new(self.tool);

        let pb = if self.settings.show_progress {
            let pb = ProgressBar::new(windows.len() as u64);
            if let Ok(style) = ProgressStyle::with_template("{spinner} [{bar:40}] {pos}/{len} sequences {msg}") {
                pb.set_style(style.progress_chars("=> "));
            }
            pb
        } else {
            ProgressBar::hidden()
        };

        let mut segments = Vec::with_capacity(windows.len());
        for window in windows {
            let sequence = graph.add_sequence(drive)?;
            let mut cx = WindowBuilder {
                graph: &mut *graph,
                sequence: sequence.clone(),
                window: *window,
                timing,
                video,
                video_name: &video_name,
                camera: &camera,
                data_format: self.source.data_format(),
            };
            self.source.populate_window(&mut aligner, &mut cx)?;
            let report =
                self.persist_sequence(graph, &splitter, &pair.video, timing.fps, window, &sequence, drive_dir)?;
            segments.push(report);
            pb.inc(1);
        }
        pb.finish_and_clear();

        let drive_rows = validate_rows(self.registry, RecordKind::Drive, &to_rows([graph.drive(drive)?])?)?;
        save_table(self.registry, drive_dir, RecordKind::Drive, &drive_rows, self.settings.json_dump)?;

        let profile = self.source.speed_profile(telemetry);
        let summary = DriveSummary {
            vehicle: self.settings.vehicle_id.clone(),
            date: date.clone(),
            diary_token: diary.to_string(),
            drive_token: drive.to_string(),
            sequences: windows.len(),
            distance_km: stats::distance_km(&profile),
            duration_sec: stats::duration_sec(&profile),
            segment_mismatches: segments.iter().filter(|s| !s.matches()).count(),
        };
        tracing::info!(drive = %drive, sequences = windows.len(), dir = %drive_dir.display(), "drive written");

        Ok(DriveOutcome {
            diary: diary.clone(),
            diary_date: date,
            drive: drive.clone(),
            drive_dir: drive_dir.to_path_buf(),
            segments,
            summary,
        })
    }

    /// Validates the four tables of one sequence, cuts its video segment and
    /// writes everything to a fresh sequence directory.
    #[allow(clippy::too_many_arguments)]
    fn persist_sequence(
        &self,
        graph: &mut RecordGraph,
        splitter: &VideoSplitter<'_>,
        source_video: &Path,
        fps: f64,
        window: &FrameWindow,
        sequence: &Token,
        drive_dir: &Path,
    ) -> Result<SegmentReport> {
        let element_tokens = graph.sequence(sequence)?.element_tokens.clone();
        let data_tokens = graph.data_tokens(&element_tokens)?;
        let sensor_tokens = graph.sensor_tokens(&data_tokens)?;

        // camera readings now point into the segment, frames counted from 0
        let segment_name = FileSystemLayout::segment_relative();
        for token in &sensor_tokens {
            if let SensorPayload::Camera(cam) = &mut graph.sensor_mut(token)?.payload {
                let frame = cam.cam_seq_number.unwrap_or(cam.bsens_seq_frame);
                cam.bsens_seq_filename = segment_name.clone();
                cam.bsens_seq_frame = frame - window.start_frame as i64;
            }
        }

        let elements = element_tokens.iter().map(|t| Ok(graph.element(t)?)).collect::<Result<Vec<_>>>()?;
        let data = data_tokens.iter().map(|t| Ok(graph.data(t)?)).collect::<Result<Vec<_>>>()?;
        let sensors = sensor_tokens.iter().map(|t| Ok(graph.sensor(t)?)).collect::<Result<Vec<_>>>()?;

        let tables = [
            (RecordKind::Sequence, to_rows([graph.sequence(sequence)?])?),
            (RecordKind::Element, to_rows(elements)?),
            (RecordKind::Data, to_rows(data)?),
            (RecordKind::Sensor, to_rows(sensors)?),
        ];
        let mut validated = Vec::with_capacity(tables.len());
        for (kind, rows) in &tables {
            validated.push((*kind, validate_rows(self.registry, *kind, rows)?));
        }

        let seq_dir = FileSystemLayout::sequence_dir(drive_dir, window.index, sequence);
        if let Some(parent) = seq_dir.parent() {
            std::fs::create_dir_all(parent).map_err(|e| TransformError::io(parent, e))?;
        }
        std::fs::create_dir(&seq_dir).map_err(|e| TransformError::io(&seq_dir, e))?;

        let report = splitter.split(source_video, fps, window, &FileSystemLayout::segment_path(&seq_dir))?;

        for (kind, rows) in &validated {
            save_table(self.registry, &seq_dir, *kind, rows, self.settings.json_dump)?;
        }
        tracing::debug!(sequence = %sequence, dir = %seq_dir.display(), "sequence written");
        Ok(report)
    }
}

/// Object-safe view of a [`DriveTransformer`] so the batch can hold either source.
pub trait TransformDrive {
    fn transform(&self, graph: &mut RecordGraph, pair: &DrivePair) -> Result<DriveOutcome>;
    fn layout(&self) -> &FileSystemLayout;
    fn settings(&self) -> &DriveSettings;
}

impl<S: DriveSource> TransformDrive for DriveTransformer<'_, S> {
    fn transform(&self, graph: &mut RecordGraph, pair: &DrivePair) -> Result<DriveOutcome> {
        DriveTransformer::transform(self, graph, pair)
    }

    fn layout(&self) -> &FileSystemLayout {
        DriveTransformer::layout(self)
    }

    fn settings(&self) -> &DriveSettings {
        DriveTransformer::settings(self)
    }
}
