//! Record kinds of the drive data schema
//!
//! A drive recording is stored as a tree of six record kinds:
//!
//! - **Diary**: one vehicle on one calendar date
//! - **Drive**: one continuous recording (one video + its telemetry)
//! - **Sequence**: a bounded frame window of a drive
//! - **Element**: one timestamped observation instant
//! - **Data**: the payload bundle behind an element
//! - **SensorReading**: one modality-specific measurement
//!
//! Parents hold ordered lists of child tokens and children hold their parent
//! token. [`RecordGraph`] owns every record and keeps both directions in sync.

pub mod graph;
pub mod sensor;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;

pub use graph::{GraphError, RecordGraph};
pub use sensor::{
    CameraReading, GnssReading, ImuReading, Modality, SensorPayload, SensorReading, VehicleReading,
};

/// Latitude / longitude pair, serialized as a two element array.
pub type LatLon = [f64; 2];

/// Placeholder location used before any fix is known.
pub const UNKNOWN_LOCATION: LatLon = [-1.0, -1.0];

/// Process-unique record identifier (random 128-bit UUID in string form).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(String);

impl Token {
    pub fn generate() -> Self {
        Token(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Token {
    fn from(s: &str) -> Self {
        Token(s.to_string())
    }
}

/// The six record kinds, in root-to-leaf order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    Diary,
    Drive,
    Sequence,
    Element,
    Data,
    Sensor,
}

impl RecordKind {
    pub const ALL: [RecordKind; 6] = [
        RecordKind::Diary,
        RecordKind::Drive,
        RecordKind::Sequence,
        RecordKind::Element,
        RecordKind::Data,
        RecordKind::Sensor,
    ];

    /// Name used to look up the schema (`avro_<name>_data.avsc`).
    pub fn schema_name(self) -> &'static str {
        match self {
            RecordKind::Diary => "diary",
            RecordKind::Drive => "drive",
            RecordKind::Sequence => "sequence",
            RecordKind::Element => "element",
            RecordKind::Data => "data",
            RecordKind::Sensor => "sensor",
        }
    }

    /// Key of the row list inside a serialized table.
    pub fn table_name(self) -> &'static str {
        match self {
            RecordKind::Sensor => "sensor_data",
            other => other.schema_name(),
        }
    }

    fn file_stem(self) -> &'static str {
        match self {
            RecordKind::Diary => "drive_diary",
            other => other.schema_name(),
        }
    }

    /// Avro container the table is written to.
    pub fn file_name(self) -> String {
        format!("{}.avro", self.file_stem())
    }

    /// Optional JSON copy of the table.
    pub fn json_file_name(self) -> String {
        format!("{}.json", self.file_stem())
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.schema_name())
    }
}

/// Common view over the six record structs.
pub trait Record: Serialize {
    const KIND: RecordKind;

    fn token(&self) -> &Token;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diary {
    pub diary_token: Token,
    pub vehicle_id: String,
    pub diary_date: String,
    pub diary_log: String,
    pub location: String,
    pub drive_tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Drive {
    pub diary_token: Token,
    pub drive_token: Token,
    pub drive_locations: Vec<LatLon>,
    pub drive_count: u64,
    pub timestamp_start: Option<i64>,
    pub timestamp_stop: Option<i64>,
    pub sequence_tokens: Vec<Token>,
    pub is_mapping: bool,
    pub route_tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub drive_token: Token,
    pub sequence_token: Token,
    pub timestamp_start: Option<i64>,
    pub timestamp_stop: Option<i64>,
    pub sequence_loc_start: Option<LatLon>,
    pub sequence_loc_stop: Option<LatLon>,
    pub element_tokens: Vec<Token>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub sequence_token: Token,
    pub element_token: Token,
    pub autonomy_token: Option<String>,
    pub autonomous_engaged: bool,
    pub annotation_token: Option<String>,
    pub data_token: Option<Token>,
    pub timestamp: i64,
    pub element_location: Option<LatLon>,
    pub sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Data {
    pub element_token: Token,
    pub data_token: Token,
    pub timestamp: i64,
    pub data_loc: Option<LatLon>,
    pub data_blob: String,
    pub data_format: String,
    pub sensor_tokens: SmallVec<[Token; 4]>,
}

macro_rules! impl_record {
    ($ty:ty, $kind:expr, $field:ident) => {
        impl Record for $ty {
            const KIND: RecordKind = $kind;

            fn token(&self) -> &Token {
                &self.$field
            }
        }
    };
}

impl_record!(Diary, RecordKind::Diary, diary_token);
impl_record!(Drive, RecordKind::Drive, drive_token);
impl_record!(Sequence, RecordKind::Sequence, sequence_token);
impl_record!(Element, RecordKind::Element, element_token);
impl_record!(Data, RecordKind::Data, data_token);
impl_record!(SensorReading, RecordKind::Sensor, sensor_token);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_unique_uuids() {
        let a = Token::generate();
        let b = Token::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
        assert!(uuid::Uuid::parse_str(a.as_str()).is_ok());
    }

    #[test]
    fn token_serializes_as_plain_string() {
        let t = Token::from("abc");
        assert_eq!(serde_json::to_string(&t).unwrap(), "\"abc\"");
    }

    #[test]
    fn sensor_table_uses_legacy_table_name() {
        assert_eq!(RecordKind::Sensor.schema_name(), "sensor");
        assert_eq!(RecordKind::Sensor.table_name(), "sensor_data");
        assert_eq!(RecordKind::Diary.file_name(), "drive_diary.avro");
        assert_eq!(RecordKind::Sensor.file_name(), "sensor.avro");
        assert_eq!(RecordKind::Diary.json_file_name(), "drive_diary.json");
    }
}
