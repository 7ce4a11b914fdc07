//! Sensor readings: camera frame, GNSS fix, IMU sample, vehicle-bus sample

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{LatLon, Token};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modality {
    Camera,
    Gnss,
    Imu,
    Vehicle,
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Modality::Camera => "camera",
            Modality::Gnss => "gnss",
            Modality::Imu => "imu",
            Modality::Vehicle => "vehicle",
        };
        f.write_str(s)
    }
}

/// One sensor row. The modality-specific fields are flattened next to the
/// shared ones and discriminated by `sensor_modality_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub data_token: Token,
    pub sensor_token: Token,
    pub data_timestamp: i64,
    pub sensor_sampling_frequency: f64,
    pub sensor_vendor_info: String,
    pub sensor_hw_uuid: Token,
    pub sensor_available: bool,
    #[serde(flatten)]
    pub payload: SensorPayload,
}

impl SensorReading {
    pub fn modality(&self) -> Modality {
        self.payload.modality()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor_modality_type", rename_all = "lowercase")]
pub enum SensorPayload {
    Camera(CameraReading),
    Gnss(GnssReading),
    Imu(ImuReading),
    Vehicle(VehicleReading),
}

impl SensorPayload {
    pub fn modality(&self) -> Modality {
        match self {
            SensorPayload::Camera(_) => Modality::Camera,
            SensorPayload::Gnss(_) => Modality::Gnss,
            SensorPayload::Imu(_) => Modality::Imu,
            SensorPayload::Vehicle(_) => Modality::Vehicle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraReading {
    pub cam_codec: String,
    pub cam_is_resized: bool,
    pub cam_im_width: i64,
    pub cam_im_height: i64,
    /// Frame index in the source video.
    pub cam_seq_number: Option<i64>,
    /// Play time of the frame in microseconds.
    pub cam_time_stamp: i64,
    /// Video file holding the frame, relative to the sequence directory once split.
    pub bsens_seq_filename: String,
    /// Frame index inside `bsens_seq_filename`.
    pub bsens_seq_frame: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnssReading {
    pub gnss_loc: LatLon,
    /// m/s
    pub gnss_speed: f64,
    pub gnss_heading: Option<f64>,
    pub gnss_loc_error: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImuReading {
    /// m/s^2
    pub imu_acc: [f64; 3],
    /// deg/s
    pub imu_gyro: [f64; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VehicleReading {
    /// m/s
    pub vehicle_speed: f64,
    pub vehicle_odometer: Option<f64>,
    pub vehicle_steering_angle: Option<f64>,
}
