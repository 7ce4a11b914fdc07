//! Record-kind schemas and table validation
//!
//! Schemas are Avro record definitions, one file per record kind, named
//! `avro_<kind>_data.avsc`. A table (the rows of one kind) is resolved
//! against its schema row by row before it is written.

use apache_avro::Schema;
use apache_avro::schema::RecordField;
use apache_avro::types::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::records::RecordKind;

/// Schema loading failures. Always fatal for the whole batch.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema directory {0} does not exist")]
    MissingDirectory(PathBuf),
    #[error("schema file {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("schema file {path} is not a valid Avro schema: {source}")]
    Invalid {
        path: PathBuf,
        #[source]
        source: apache_avro::Error,
    },
    #[error("schema file {0} does not define a record")]
    NotARecord(PathBuf),
}

/// A table failed its schema. Carries a dump of the offending rows.
#[derive(Debug, Error)]
#[error("table '{table}' row {row}: {reason}")]
pub struct ValidationError {
    pub table: String,
    pub row: usize,
    pub reason: String,
    pub dump: String,
}

/// Top-level fields of a record schema. Empty for anything else.
pub fn record_fields(schema: &Schema) -> &[RecordField] {
    match schema {
        Schema::Record(record) => &record.fields,
        _ => &[],
    }
}

/// First field of `row` the schema does not declare. Resolution drops such
/// fields silently, so they are looked for up front.
fn undeclared_field<'v>(row: &'v Value, fields: &[RecordField]) -> Option<&'v str> {
    let declared = |name: &str| fields.iter().any(|f| f.name == name);
    match row {
        Value::Record(items) => items.iter().map(|(k, _)| k.as_str()).find(|k| !declared(k)),
        Value::Map(items) => items.keys().map(String::as_str).find(|k| !declared(k)),
        _ => None,
    }
}

fn dump(rows: &[Value]) -> String {
    let json: Vec<serde_json::Value> =
        rows.iter().map(|r| serde_json::Value::try_from(r.clone()).unwrap_or(serde_json::Value::Null)).collect();
    serde_json::to_string_pretty(&json).unwrap_or_default()
}

/// Resolves every row of `table` against `schema` and returns the resolved
/// rows, ready to be appended to a container file.
pub fn conform(table: &str, rows: &[Value], schema: &Schema) -> Result<Vec<Value>, ValidationError> {
    let fields = record_fields(schema);
    let fail = |row: usize, reason: String| ValidationError {
        table: table.to_string(),
        row,
        reason,
        dump: dump(rows),
    };

    let mut resolved = Vec::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if let Some(name) = undeclared_field(row, fields) {
            return Err(fail(i, format!("field '{name}' is not declared in the schema")));
        }
        let value = row.clone().resolve(schema).map_err(|e| fail(i, e.to_string()))?;
        if !value.validate(schema) {
            return Err(fail(i, "resolved row does not match the schema".to_string()));
        }
        resolved.push(value);
    }
    Ok(resolved)
}

/// The six schemas of one schema version, loaded once per batch.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    dir: PathBuf,
    schemas: HashMap<RecordKind, Schema>,
}

impl SchemaRegistry {
    pub fn file_name(kind: RecordKind) -> String {
        format!("avro_{}_data.avsc", kind.schema_name())
    }

    pub fn load(dir: &Path) -> Result<Self, SchemaError> {
        if !dir.is_dir() {
            return Err(SchemaError::MissingDirectory(dir.to_path_buf()));
        }
        let mut schemas = HashMap::new();
        for kind in RecordKind::ALL {
            let path = dir.join(Self::file_name(kind));
            let text = std::fs::read_to_string(&path)
                .map_err(|source| SchemaError::Unreadable { path: path.clone(), source })?;
            let schema =
                Schema::parse_str(&text).map_err(|source| SchemaError::Invalid { path: path.clone(), source })?;
            if !matches!(schema, Schema::Record(_)) {
                return Err(SchemaError::NotARecord(path));
            }
            tracing::info!(kind = %kind, file = %path.display(), "loaded schema");
            schemas.insert(kind, schema);
        }
        Ok(Self { dir: dir.to_path_buf(), schemas })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, kind: RecordKind) -> &Schema {
        // load() guarantees every kind is present
        &self.schemas[&kind]
    }

    pub fn validate(&self, kind: RecordKind, rows: &[Value]) -> Result<Vec<Value>, ValidationError> {
        conform(kind.table_name(), rows, self.get(kind))
    }
}

/// Print the record kinds and their schema files
pub fn print_schema(registry: &SchemaRegistry) -> anyhow::Result<()> {
    println!("Drive data schema ({}):", registry.dir().display());
    println!("---------------------------------------------------------------");
    for kind in RecordKind::ALL {
        println!(
            "{:<10} {:<26} {:<18} {} fields",
            kind.schema_name(),
            SchemaRegistry::file_name(kind),
            kind.file_name(),
            record_fields(registry.get(kind)).len()
        );
    }
    Ok(())
}
