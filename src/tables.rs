//! Table files: Avro object containers, one per record kind and directory
//!
//! A pretty `{"<table>": [rows]}` JSON copy can be written next to each
//! container for inspection.

use apache_avro::types::Value;
use apache_avro::{Reader, Writer};
use serde::Serialize;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{Result, TransformError};
use crate::records::RecordKind;
use crate::schema::SchemaRegistry;

pub fn to_rows<'a, R: Serialize + 'a>(records: impl IntoIterator<Item = &'a R>) -> Result<Vec<Value>> {
    records.into_iter().map(|r| apache_avro::to_value(r).map_err(TransformError::from)).collect()
}

/// Resolves `rows` against the schema of `kind`. Failures are logged with
/// the table name and the offending rows.
pub fn validate_rows(registry: &SchemaRegistry, kind: RecordKind, rows: &[Value]) -> Result<Vec<Value>> {
    registry.validate(kind, rows).map_err(|e| {
        tracing::error!(table = %e.table, row = e.row, reason = %e.reason, "schema validation failed");
        tracing::error!("offending rows:\n{}", e.dump);
        e.into()
    })
}

/// Writes already validated rows to the container `dir/<kind file name>`.
pub fn write_table(registry: &SchemaRegistry, dir: &Path, kind: RecordKind, rows: &[Value]) -> Result<PathBuf> {
    let path = dir.join(kind.file_name());
    let file = File::create(&path).map_err(|e| TransformError::io(&path, e))?;
    let mut writer = Writer::new(registry.get(kind), BufWriter::new(file));
    for row in rows {
        writer.append(row.clone())?;
    }
    writer.into_inner()?.flush().map_err(|e| TransformError::io(&path, e))?;
    tracing::debug!(file = %path.display(), rows = rows.len(), "saved table");
    Ok(path)
}

/// Writes the container of `kind` and, with `json`, its JSON copy.
pub fn save_table(
    registry: &SchemaRegistry,
    dir: &Path,
    kind: RecordKind,
    rows: &[Value],
    json: bool,
) -> Result<PathBuf> {
    let path = write_table(registry, dir, kind, rows)?;
    if json {
        write_json(dir, kind, rows)?;
    }
    Ok(path)
}

/// Writes the JSON copy of a table to `dir/<kind json file name>`.
pub fn write_json(dir: &Path, kind: RecordKind, rows: &[Value]) -> Result<PathBuf> {
    let path = dir.join(kind.json_file_name());
    let mut table = serde_json::Map::new();
    table.insert(kind.table_name().to_string(), serde_json::Value::Array(to_json(rows)?));
    let text = serde_json::to_string_pretty(&serde_json::Value::Object(table))?;
    std::fs::write(&path, text).map_err(|e| TransformError::io(&path, e))?;
    Ok(path)
}

/// Reads every row of a container written by [`write_table`].
pub fn read_table(path: &Path) -> Result<Vec<Value>> {
    let file = File::open(path).map_err(|e| TransformError::io(path, e))?;
    let reader = Reader::new(BufReader::new(file))?;
    reader.map(|row| row.map_err(TransformError::from)).collect()
}

/// Plain JSON view of resolved rows; unions collapse to their value.
pub fn to_json(rows: &[Value]) -> Result<Vec<serde_json::Value>> {
    rows.iter().map(|r| serde_json::Value::try_from(r.clone()).map_err(TransformError::from)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::RecordGraph;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::load(&Path::new(env!("CARGO_MANIFEST_DIR")).join("schemas")).unwrap()
    }

    #[test]
    fn write_then_read() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();
        let mut graph = RecordGraph::new();
        let diary = graph.add_diary("2019-06-13", "sally", "log.csv", "Berlin").unwrap();
        graph.add_drive(&diary, false).unwrap();

        let rows = to_rows([graph.diary(&diary).unwrap()]).unwrap();
        let rows = validate_rows(&registry, RecordKind::Diary, &rows).unwrap();
        let path = write_table(&registry, tmp.path(), RecordKind::Diary, &rows).unwrap();
        assert!(path.ends_with("drive_diary.avro"));

        let back = read_table(&path).unwrap();
        assert_eq!(back, rows);
        let json = to_json(&back).unwrap();
        assert_eq!(json[0]["vehicle_id"], "sally");
        assert_eq!(json[0]["drive_tokens"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn json_copy_is_keyed_by_table_name() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = registry();
        let mut graph = RecordGraph::new();
        let diary = graph.add_diary("2019-06-13", "sally", "log.csv", "Berlin").unwrap();
        let drive = graph.add_drive(&diary, false).unwrap();
        let rows = to_rows([graph.drive(&drive).unwrap()]).unwrap();
        let rows = validate_rows(&registry, RecordKind::Drive, &rows).unwrap();

        let path = write_json(tmp.path(), RecordKind::Drive, &rows).unwrap();
        assert!(path.ends_with("drive.json"));
        let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["drive"][0]["drive_token"], drive.as_str());
        assert!(raw["drive"][0]["timestamp_start"].is_null());
    }

    #[test]
    fn garbage_is_not_a_table() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.avro");
        std::fs::write(&path, b"{\"data\": []}").unwrap();
        assert!(read_table(&path).is_err());
    }
}
