//! Token graph over the six record kinds
//!
//! Records live in one arena per kind (token → row, insertion ordered).
//! Parents keep append-only token lists; rollup fields on sequences and
//! drives are recomputed from their first/last child whenever an element is
//! appended and are never written from the outside.

use std::collections::HashMap;
use thiserror::Error;

use super::{
    Data, Diary, Drive, Element, LatLon, Modality, Record, RecordKind, SensorPayload, SensorReading, Sequence,
    Token,
};

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("{kind} record {token} not found")]
    NotFound { kind: RecordKind, token: Token },
    #[error("duplicate {kind} token {token}")]
    DuplicateToken { kind: RecordKind, token: Token },
    #[error("element {0} already has a data record")]
    DataAlreadyAssigned(Token),
    #[error("data {0} already carries a camera reading")]
    DuplicateCamera(Token),
}

type Result<T> = std::result::Result<T, GraphError>;

/// Insertion-ordered token → record store.
#[derive(Debug)]
struct Arena<R> {
    rows: Vec<R>,
    index: HashMap<Token, usize>,
}

impl<R: Record> Arena<R> {
    fn new() -> Self {
        Self { rows: Vec::new(), index: HashMap::new() }
    }

    fn insert(&mut self, row: R) -> Result<Token> {
        let token = row.token().clone();
        if self.index.contains_key(&token) {
            return Err(GraphError::DuplicateToken { kind: R::KIND, token });
        }
        self.index.insert(token.clone(), self.rows.len());
        self.rows.push(row);
        Ok(token)
    }

    fn get(&self, token: &Token) -> Result<&R> {
        self.index
            .get(token)
            .map(|&i| &self.rows[i])
            .ok_or_else(|| GraphError::NotFound { kind: R::KIND, token: token.clone() })
    }

    fn get_mut(&mut self, token: &Token) -> Result<&mut R> {
        match self.index.get(token) {
            Some(&i) => Ok(&mut self.rows[i]),
            None => Err(GraphError::NotFound { kind: R::KIND, token: token.clone() }),
        }
    }

    fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }

    fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Hardware identity shared by all readings of one sensor.
#[derive(Debug, Clone)]
pub struct SensorSource {
    pub hardware: Token,
    pub vendor: String,
    pub sampling_frequency: f64,
}

impl SensorSource {
    pub fn new(vendor: &str, sampling_frequency: f64) -> Self {
        Self { hardware: Token::generate(), vendor: vendor.to_string(), sampling_frequency }
    }
}

/// Registry of every record created during a batch run.
///
/// Diaries live for the whole batch; everything below a diary belongs to the
/// drive currently being transformed and is dropped by [`RecordGraph::reset_drive_records`].
#[derive(Debug)]
pub struct RecordGraph {
    diaries: Arena<Diary>,
    drives: Arena<Drive>,
    sequences: Arena<Sequence>,
    elements: Arena<Element>,
    data: Arena<Data>,
    sensors: Arena<SensorReading>,
}

impl Default for RecordGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordGraph {
    pub fn new() -> Self {
        Self {
            diaries: Arena::new(),
            drives: Arena::new(),
            sequences: Arena::new(),
            elements: Arena::new(),
            data: Arena::new(),
            sensors: Arena::new(),
        }
    }

    /// Returns the diary registered for `date`, creating it on first use.
    pub fn add_diary(&mut self, date: &str, vehicle_id: &str, log_path: &str, location: &str) -> Result<Token> {
        if let Some(existing) = self.diary_for_date(date) {
            return Ok(existing.diary_token.clone());
        }
        self.diaries.insert(Diary {
            diary_token: Token::generate(),
            vehicle_id: vehicle_id.to_string(),
            diary_date: date.to_string(),
            diary_log: log_path.to_string(),
            location: location.to_string(),
            drive_tokens: Vec::new(),
        })
    }

    pub fn diary_for_date(&self, date: &str) -> Option<&Diary> {
        self.diaries.rows.iter().find(|d| d.diary_date == date)
    }

    /// First diary of the batch, if any.
    pub fn current_diary(&self) -> Option<&Diary> {
        self.diaries.rows.first()
    }

    pub fn add_drive(&mut self, diary: &Token, is_mapping: bool) -> Result<Token> {
        let diary_token = self.diaries.get(diary)?.diary_token.clone();
        let token = self.drives.insert(Drive {
            diary_token,
            drive_token: Token::generate(),
            drive_locations: Vec::new(),
            drive_count: 0,
            timestamp_start: None,
            timestamp_stop: None,
            sequence_tokens: Vec::new(),
            is_mapping,
            route_tokens: Vec::new(),
        })?;
        self.diaries.get_mut(diary)?.drive_tokens.push(token.clone());
        Ok(token)
    }

    pub fn add_sequence(&mut self, drive: &Token) -> Result<Token> {
        let drive_token = self.drives.get(drive)?.drive_token.clone();
        let token = self.sequences.insert(Sequence {
            drive_token,
            sequence_token: Token::generate(),
            timestamp_start: None,
            timestamp_stop: None,
            sequence_loc_start: None,
            sequence_loc_stop: None,
            element_tokens: Vec::new(),
        })?;
        self.drives.get_mut(drive)?.sequence_tokens.push(token.clone());
        Ok(token)
    }

    pub fn add_element(
        &mut self,
        sequence: &Token,
        location: Option<LatLon>,
        timestamp: i64,
        sync: bool,
        autonomy_token: Option<String>,
        annotation_token: Option<String>,
    ) -> Result<Token> {
        let parent = self.sequences.get(sequence)?;
        let sequence_token = parent.sequence_token.clone();
        let drive_token = parent.drive_token.clone();

        let autonomous_engaged = autonomy_token.is_some();
        let token = self.elements.insert(Element {
            sequence_token,
            element_token: Token::generate(),
            autonomy_token,
            autonomous_engaged,
            annotation_token,
            data_token: None,
            timestamp,
            element_location: location,
            sync,
        })?;
        self.sequences.get_mut(sequence)?.element_tokens.push(token.clone());

        self.update_sequence_rollup(sequence)?;
        self.update_drive_rollup(&drive_token)?;
        Ok(token)
    }

    pub fn add_data(
        &mut self,
        element: &Token,
        location: Option<LatLon>,
        timestamp: i64,
        blob: &str,
        format: &str,
    ) -> Result<Token> {
        let parent = self.elements.get(element)?;
        if parent.data_token.is_some() {
            return Err(GraphError::DataAlreadyAssigned(element.clone()));
        }
        let token = self.data.insert(Data {
            element_token: parent.element_token.clone(),
            data_token: Token::generate(),
            timestamp,
            data_loc: location,
            data_blob: blob.to_string(),
            data_format: format.to_string(),
            sensor_tokens: Default::default(),
        })?;
        self.elements.get_mut(element)?.data_token = Some(token.clone());
        Ok(token)
    }

    /// Attaches a reading to `data`. GNSS fixes are also appended to the
    /// owning drive's location path.
    pub fn add_sensor_reading(
        &mut self,
        data: &Token,
        source: &SensorSource,
        available: bool,
        payload: SensorPayload,
    ) -> Result<Token> {
        let parent = self.data.get(data)?;
        if payload.modality() == Modality::Camera && self.has_camera_reading(parent)? {
            return Err(GraphError::DuplicateCamera(data.clone()));
        }
        let gnss_loc = match &payload {
            SensorPayload::Gnss(g) => Some(g.gnss_loc),
            _ => None,
        };
        let element_token = parent.element_token.clone();

        let token = self.sensors.insert(SensorReading {
            data_token: parent.data_token.clone(),
            sensor_token: Token::generate(),
            data_timestamp: parent.timestamp,
            sensor_sampling_frequency: source.sampling_frequency,
            sensor_vendor_info: source.vendor.clone(),
            sensor_hw_uuid: source.hardware.clone(),
            sensor_available: available,
            payload,
        })?;
        self.data.get_mut(data)?.sensor_tokens.push(token.clone());

        if let Some(loc) = gnss_loc {
            let drive_token = self.drive_of_element(&element_token)?;
            let drive = self.drives.get_mut(&drive_token)?;
            drive.drive_locations.push(loc);
            drive.drive_count = drive.drive_locations.len() as u64;
        }
        Ok(token)
    }

    fn has_camera_reading(&self, data: &Data) -> Result<bool> {
        for token in &data.sensor_tokens {
            if self.sensors.get(token)?.modality() == Modality::Camera {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn drive_of_element(&self, element: &Token) -> Result<Token> {
        let sequence_token = &self.elements.get(element)?.sequence_token;
        Ok(self.sequences.get(sequence_token)?.drive_token.clone())
    }

    fn update_sequence_rollup(&mut self, sequence: &Token) -> Result<()> {
        let seq = self.sequences.get(sequence)?;
        let (first, last) = match (seq.element_tokens.first(), seq.element_tokens.last()) {
            (Some(f), Some(l)) => (f.clone(), l.clone()),
            _ => return Ok(()),
        };
        let first = self.elements.get(&first)?;
        let (ts_start, loc_start) = (first.timestamp, first.element_location);
        let last = self.elements.get(&last)?;
        let (ts_stop, loc_stop) = (last.timestamp, last.element_location);

        let seq = self.sequences.get_mut(sequence)?;
        seq.timestamp_start = Some(ts_start);
        seq.sequence_loc_start = loc_start;
        seq.timestamp_stop = Some(ts_stop);
        seq.sequence_loc_stop = loc_stop;
        Ok(())
    }

    fn update_drive_rollup(&mut self, drive: &Token) -> Result<()> {
        let d = self.drives.get(drive)?;
        let (first, last) = match (d.sequence_tokens.first(), d.sequence_tokens.last()) {
            (Some(f), Some(l)) => (f.clone(), l.clone()),
            _ => return Ok(()),
        };
        let ts_start = self.sequences.get(&first)?.timestamp_start;
        let ts_stop = self.sequences.get(&last)?.timestamp_stop;

        let d = self.drives.get_mut(drive)?;
        d.timestamp_start = ts_start;
        d.timestamp_stop = ts_stop;
        Ok(())
    }

    /// Removes a drive from its diary's child list (drive failed, nothing persisted for it).
    pub fn withdraw_drive(&mut self, diary: &Token, drive: &Token) -> Result<()> {
        self.diaries.get_mut(diary)?.drive_tokens.retain(|t| t != drive);
        Ok(())
    }

    /// Drops every drive-level record. Diaries are kept for the rest of the batch.
    pub fn reset_drive_records(&mut self) {
        self.drives.clear();
        self.sequences.clear();
        self.elements.clear();
        self.data.clear();
        self.sensors.clear();
    }

    pub fn diary(&self, token: &Token) -> Result<&Diary> {
        self.diaries.get(token)
    }

    pub fn drive(&self, token: &Token) -> Result<&Drive> {
        self.drives.get(token)
    }

    pub fn sequence(&self, token: &Token) -> Result<&Sequence> {
        self.sequences.get(token)
    }

    pub fn element(&self, token: &Token) -> Result<&Element> {
        self.elements.get(token)
    }

    pub fn data(&self, token: &Token) -> Result<&Data> {
        self.data.get(token)
    }

    pub fn sensor(&self, token: &Token) -> Result<&SensorReading> {
        self.sensors.get(token)
    }

    pub fn sensor_mut(&mut self, token: &Token) -> Result<&mut SensorReading> {
        self.sensors.get_mut(token)
    }

    pub fn len(&self, kind: RecordKind) -> usize {
        match kind {
            RecordKind::Diary => self.diaries.len(),
            RecordKind::Drive => self.drives.len(),
            RecordKind::Sequence => self.sequences.len(),
            RecordKind::Element => self.elements.len(),
            RecordKind::Data => self.data.len(),
            RecordKind::Sensor => self.sensors.len(),
        }
    }

    /// Data tokens of the given elements, in element order.
    pub fn data_tokens(&self, elements: &[Token]) -> Result<Vec<Token>> {
        let mut out = Vec::with_capacity(elements.len());
        for token in elements {
            if let Some(d) = &self.elements.get(token)?.data_token {
                out.push(d.clone());
            }
        }
        Ok(out)
    }

    /// Sensor tokens of the given data records, flattened in order.
    pub fn sensor_tokens(&self, data: &[Token]) -> Result<Vec<Token>> {
        let mut out = Vec::new();
        for token in data {
            out.extend(self.data.get(token)?.sensor_tokens.iter().cloned());
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::{CameraReading, GnssReading, ImuReading};

    fn camera(frame: i64) -> SensorPayload {
        SensorPayload::Camera(CameraReading {
            cam_codec: "h264".into(),
            cam_is_resized: false,
            cam_im_width: 1920,
            cam_im_height: 1080,
            cam_seq_number: Some(frame),
            cam_time_stamp: frame * 33_333,
            bsens_seq_filename: "video/video.mp4".into(),
            bsens_seq_frame: frame,
        })
    }

    fn gnss(lat: f64, lon: f64) -> SensorPayload {
        SensorPayload::Gnss(GnssReading {
            gnss_loc: [lat, lon],
            gnss_speed: 1.0,
            gnss_heading: None,
            gnss_loc_error: None,
        })
    }

    fn drive_with_sequence(graph: &mut RecordGraph) -> (Token, Token, Token) {
        let diary = graph.add_diary("2019-06-13", "sally", "", "Berlin").unwrap();
        let drive = graph.add_drive(&diary, false).unwrap();
        let seq = graph.add_sequence(&drive).unwrap();
        (diary, drive, seq)
    }

    #[test]
    fn diary_is_reused_for_same_date() {
        let mut graph = RecordGraph::new();
        let a = graph.add_diary("2019-06-13", "sally", "", "Berlin").unwrap();
        let b = graph.add_diary("2019-06-13", "sally", "", "Berlin").unwrap();
        let c = graph.add_diary("2019-06-14", "sally", "", "Berlin").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(graph.len(RecordKind::Diary), 2);
        assert_eq!(graph.current_diary().unwrap().diary_token, a);
    }

    #[test]
    fn children_are_linked_both_ways() {
        let mut graph = RecordGraph::new();
        let (diary, drive, seq) = drive_with_sequence(&mut graph);
        let el = graph.add_element(&seq, Some([1.0, 2.0]), 100, true, None, None).unwrap();
        let data = graph.add_data(&el, Some([1.0, 2.0]), 100, "", "raw").unwrap();
        let sensor = graph.add_sensor_reading(&data, &SensorSource::new("cam", 30.0), true, camera(0)).unwrap();

        assert_eq!(graph.diary(&diary).unwrap().drive_tokens, vec![drive.clone()]);
        assert_eq!(graph.drive(&drive).unwrap().sequence_tokens, vec![seq.clone()]);
        assert_eq!(graph.sequence(&seq).unwrap().element_tokens, vec![el.clone()]);
        assert_eq!(graph.element(&el).unwrap().data_token, Some(data.clone()));
        assert_eq!(graph.data(&data).unwrap().sensor_tokens.as_slice(), &[sensor.clone()]);
        assert_eq!(graph.sensor(&sensor).unwrap().data_token, data);
        assert_eq!(graph.sensor(&sensor).unwrap().data_timestamp, 100);
    }

    #[test]
    fn sequence_and_drive_rollups_follow_first_and_last_child() {
        let mut graph = RecordGraph::new();
        let (_, drive, seq1) = drive_with_sequence(&mut graph);
        graph.add_element(&seq1, Some([1.0, 1.0]), 10, true, None, None).unwrap();
        let s = graph.sequence(&seq1).unwrap();
        assert_eq!((s.timestamp_start, s.timestamp_stop), (Some(10), Some(10)));
        assert_eq!(s.sequence_loc_start, s.sequence_loc_stop);

        graph.add_element(&seq1, Some([2.0, 2.0]), 20, true, None, None).unwrap();
        graph.add_element(&seq1, Some([3.0, 3.0]), 30, true, None, None).unwrap();
        let s = graph.sequence(&seq1).unwrap();
        assert_eq!((s.timestamp_start, s.timestamp_stop), (Some(10), Some(30)));
        assert_eq!(s.sequence_loc_start, Some([1.0, 1.0]));
        assert_eq!(s.sequence_loc_stop, Some([3.0, 3.0]));

        let seq2 = graph.add_sequence(&drive).unwrap();
        graph.add_element(&seq2, None, 40, false, None, None).unwrap();
        graph.add_element(&seq2, None, 55, false, None, None).unwrap();
        let d = graph.drive(&drive).unwrap();
        assert_eq!(d.timestamp_start, Some(10));
        assert_eq!(d.timestamp_stop, Some(55));
    }

    #[test]
    fn gnss_readings_extend_drive_path() {
        let mut graph = RecordGraph::new();
        let (_, drive, seq) = drive_with_sequence(&mut graph);
        let gps = SensorSource::new("OnePlus6T", 1.0);
        let imu = SensorSource::new("Waylens", 10.0);
        for i in 0..3 {
            let el = graph.add_element(&seq, None, i, false, None, None).unwrap();
            let data = graph.add_data(&el, None, i, "", "raw").unwrap();
            graph.add_sensor_reading(&data, &gps, true, gnss(i as f64, 0.0)).unwrap();
            graph
                .add_sensor_reading(
                    &data,
                    &imu,
                    true,
                    SensorPayload::Imu(ImuReading { imu_acc: [0.0; 3], imu_gyro: [0.0; 3] }),
                )
                .unwrap();
        }
        let d = graph.drive(&drive).unwrap();
        assert_eq!(d.drive_count, 3);
        assert_eq!(d.drive_locations, vec![[0.0, 0.0], [1.0, 0.0], [2.0, 0.0]]);
    }

    #[test]
    fn second_camera_reading_on_same_data_is_rejected() {
        let mut graph = RecordGraph::new();
        let (_, _, seq) = drive_with_sequence(&mut graph);
        let cam = SensorSource::new("cam", 30.0);
        let el = graph.add_element(&seq, None, 0, true, None, None).unwrap();
        let data = graph.add_data(&el, None, 0, "", "raw").unwrap();
        graph.add_sensor_reading(&data, &cam, true, camera(0)).unwrap();
        let err = graph.add_sensor_reading(&data, &cam, true, camera(1)).unwrap_err();
        assert!(matches!(err, GraphError::DuplicateCamera(_)));
    }

    #[test]
    fn element_accepts_a_single_data_record() {
        let mut graph = RecordGraph::new();
        let (_, _, seq) = drive_with_sequence(&mut graph);
        let el = graph.add_element(&seq, None, 0, true, None, None).unwrap();
        graph.add_data(&el, None, 0, "", "raw").unwrap();
        assert!(matches!(graph.add_data(&el, None, 0, "", "raw"), Err(GraphError::DataAlreadyAssigned(_))));
    }

    #[test]
    fn unknown_parent_is_not_found() {
        let mut graph = RecordGraph::new();
        let err = graph.add_sequence(&Token::from("missing")).unwrap_err();
        assert!(matches!(err, GraphError::NotFound { kind: RecordKind::Drive, .. }));
    }

    #[test]
    fn autonomy_token_sets_engaged_flag() {
        let mut graph = RecordGraph::new();
        let (_, _, seq) = drive_with_sequence(&mut graph);
        let a = graph.add_element(&seq, None, 0, true, Some("auto".into()), None).unwrap();
        let b = graph.add_element(&seq, None, 1, true, None, None).unwrap();
        assert!(graph.element(&a).unwrap().autonomous_engaged);
        assert!(!graph.element(&b).unwrap().autonomous_engaged);
    }

    #[test]
    fn reset_keeps_diaries_only() {
        let mut graph = RecordGraph::new();
        let (diary, drive, seq) = drive_with_sequence(&mut graph);
        graph.add_element(&seq, None, 0, true, None, None).unwrap();
        graph.withdraw_drive(&diary, &drive).unwrap();
        graph.reset_drive_records();
        assert_eq!(graph.len(RecordKind::Diary), 1);
        assert_eq!(graph.len(RecordKind::Drive), 0);
        assert_eq!(graph.len(RecordKind::Element), 0);
        assert!(graph.diary(&diary).unwrap().drive_tokens.is_empty());
    }
}
