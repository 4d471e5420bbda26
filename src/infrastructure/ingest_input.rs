// Ingestion input files and resumption artifacts on disk
use crate::application::ingestion_service::{ArtifactSink, ResumeArtifact};
use crate::domain::error::InvalidRecord;
use crate::domain::telemetry::{RawTelemetryRecord, TelemetryRecord};
use anyhow::Context;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("input is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("input must be a JSON object mapping table names to record arrays")]
    NotATableMap,

    #[error("table {0:?} not found in input")]
    UnknownTable(String),

    #[error("input holds several tables ({}); choose one", .0.join(", "))]
    AmbiguousTable(Vec<String>),

    #[error("table {0:?} must be an array of records")]
    NotAnArray(String),

    #[error("{} invalid entries: {}", .0.len(), summarize(.0))]
    InvalidEntries(Vec<EntryError>),
}

#[derive(Debug, Error)]
#[error("entry {index}: {reason}")]
pub struct EntryError {
    pub index: usize,
    pub reason: String,
}

fn summarize(errors: &[EntryError]) -> String {
    const SHOWN: usize = 5;
    let mut text = errors
        .iter()
        .take(SHOWN)
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    if errors.len() > SHOWN {
        text.push_str(&format!("; and {} more", errors.len() - SHOWN));
    }
    text
}

/// Validated records of one table, in input order.
#[derive(Debug, Clone)]
pub struct IngestInput {
    pub table: String,
    pub records: Vec<TelemetryRecord>,
}

/// Parse `{table: [entry, ...]}`.
///
/// Entries are plain records or batch-write requests
/// (`{"PutRequest": {"Item": {...}}}`) whose attributes may be typed values
/// such as `{"S": "room_001"}`, `{"N": "5.5"}` or `{"NULL": true}`. Every
/// entry is validated before anything is returned.
pub fn parse_ingest_input(json: &str, table: Option<&str>) -> Result<IngestInput, InputError> {
    let root: Value = serde_json::from_str(json)?;
    let Value::Object(tables) = root else {
        return Err(InputError::NotATableMap);
    };

    let (name, entries) = select_table(tables, table)?;
    let Value::Array(entries) = entries else {
        return Err(InputError::NotAnArray(name));
    };

    let mut records = Vec::with_capacity(entries.len());
    let mut errors = Vec::new();
    for (index, entry) in entries.into_iter().enumerate() {
        match parse_entry(entry) {
            Ok(record) => records.push(record),
            Err(reason) => errors.push(EntryError { index, reason }),
        }
    }

    if !errors.is_empty() {
        return Err(InputError::InvalidEntries(errors));
    }
    Ok(IngestInput {
        table: name,
        records,
    })
}

fn select_table(
    mut tables: Map<String, Value>,
    wanted: Option<&str>,
) -> Result<(String, Value), InputError> {
    match wanted {
        Some(name) => tables
            .remove(name)
            .map(|entries| (name.to_string(), entries))
            .ok_or_else(|| InputError::UnknownTable(name.to_string())),
        None if tables.len() == 1 => tables
            .into_iter()
            .next()
            .ok_or(InputError::NotATableMap),
        None if tables.is_empty() => Err(InputError::NotATableMap),
        None => Err(InputError::AmbiguousTable(tables.keys().cloned().collect())),
    }
}

fn parse_entry(entry: Value) -> Result<TelemetryRecord, String> {
    let item = match entry {
        Value::Object(mut map) if map.contains_key("PutRequest") => map
            .remove("PutRequest")
            .and_then(|put| put.get("Item").cloned())
            .ok_or_else(|| "PutRequest without Item".to_string())?,
        other => other,
    };

    let Value::Object(attributes) = item else {
        return Err("entry is not an object".to_string());
    };
    let plain: Map<String, Value> = attributes
        .into_iter()
        .map(|(key, value)| (key, untype_attribute(value)))
        .collect();

    let raw: RawTelemetryRecord =
        serde_json::from_value(Value::Object(plain)).map_err(|e| e.to_string())?;
    raw.validate().map_err(|InvalidRecord(errors)| {
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    })
}

/// `{"S": s}` -> s, `{"N": "1.5"}` -> 1.5, `{"NULL": true}` -> null; anything else unchanged.
fn untype_attribute(value: Value) -> Value {
    let Value::Object(map) = &value else {
        return value;
    };
    if map.len() != 1 {
        return value;
    }

    match map.iter().next() {
        Some((tag, Value::String(s))) if tag == "S" => Value::String(s.clone()),
        Some((tag, Value::String(n))) if tag == "N" => n
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(value.clone()),
        Some((tag, Value::Bool(true))) if tag == "NULL" => Value::Null,
        _ => value.clone(),
    }
}

pub async fn read_ingest_input(path: &Path, table: Option<&str>) -> anyhow::Result<IngestInput> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_ingest_input(&json, table).with_context(|| format!("invalid input {}", path.display()))
}

pub async fn read_artifact(path: &Path) -> anyhow::Result<ResumeArtifact> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read artifact {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid artifact {}", path.display()))
}

/// Writes each artifact as pretty JSON into a directory.
#[derive(Debug, Clone)]
pub struct FileArtifactSink {
    dir: PathBuf,
}

impl FileArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn file_name(artifact: &ResumeArtifact) -> String {
        let table: String = artifact
            .table
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!(
            "failed_batch_{}_{:06}_offset_{}.json",
            table, artifact.batch_index, artifact.offset
        )
    }
}

#[async_trait]
impl ArtifactSink for FileArtifactSink {
    async fn persist(&self, artifact: &ResumeArtifact) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(Self::file_name(artifact));
        let json = serde_json::to_vec_pretty(artifact)?;
        tokio::fs::write(&path, json).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_records() {
        let input = parse_ingest_input(
            r#"{"IoTTelemetryTable": [
                {"device_id": "sensor_01", "room_id": "room_001",
                 "timestamp": "2025-08-01T00:00:00Z", "temperature": 5.1, "device_status": "ok"},
                {"device_id": "sensor_02", "room_id": "room_001",
                 "timestamp": "2025-08-01T00:00:01Z", "temperature": null,
                 "device_status": "sensor_error"}
            ]}"#,
            None,
        )
        .unwrap();

        assert_eq!(input.table, "IoTTelemetryTable");
        assert_eq!(input.records.len(), 2);
        assert_eq!(input.records[1].temperature(), None);
    }

    #[test]
    fn test_batch_write_requests_with_typed_attributes() {
        let input = parse_ingest_input(
            r#"{"IoTTelemetryTable": [
                {"PutRequest": {"Item": {
                    "device_id": {"S": "sensor_07"}, "room_id": {"S": "room_003"},
                    "timestamp": {"S": "2025-08-01T00:00:00Z"},
                    "temperature": {"N": "6.3"}, "device_status": {"S": "ok"}}}},
                {"PutRequest": {"Item": {
                    "device_id": {"S": "sensor_07"}, "room_id": {"S": "room_003"},
                    "timestamp": {"S": "2025-08-01T00:00:01Z"},
                    "temperature": {"NULL": true}, "device_status": {"S": "sensor_error"}}}}
            ]}"#,
            Some("IoTTelemetryTable"),
        )
        .unwrap();

        assert_eq!(input.records.len(), 2);
        assert_eq!(input.records[0].temperature(), Some(6.3));
        assert_eq!(input.records[0].room_id().as_str(), "room_003");
        assert_eq!(input.records[1].temperature(), None);
    }

    #[test]
    fn test_every_invalid_entry_is_reported() {
        let err = parse_ingest_input(
            r#"{"t": [
                {"device_id": "sensor01", "room_id": "room_001",
                 "timestamp": "2025-08-01T00:00:00Z", "temperature": 5.1, "device_status": "ok"},
                {"device_id": "sensor_1", "room_id": "room_001",
                 "timestamp": "2025-08-01T00:00:01Z", "temperature": 5.0, "device_status": "ok"},
                {"device_id": "sensor_1", "room_id": "room_001",
                 "timestamp": "2025-08-01T00:00:02Z", "temperature": 5.0,
                 "device_status": "sensor_error"},
                {"device_id": "sensor_1"}
            ]}"#,
            None,
        )
        .unwrap_err();

        let InputError::InvalidEntries(entries) = err else {
            panic!("expected invalid entries");
        };
        let indexes: Vec<usize> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indexes, vec![0, 2, 3]);
        assert!(entries[0].reason.contains("Invalid device_id: sensor01"));
    }

    #[test]
    fn test_table_selection() {
        let json = r#"{"a": [], "b": []}"#;
        assert!(matches!(
            parse_ingest_input(json, None),
            Err(InputError::AmbiguousTable(_))
        ));
        assert!(matches!(
            parse_ingest_input(json, Some("c")),
            Err(InputError::UnknownTable(_))
        ));
        assert_eq!(parse_ingest_input(json, Some("b")).unwrap().table, "b");
        assert!(matches!(
            parse_ingest_input("[1, 2]", None),
            Err(InputError::NotATableMap)
        ));
    }

    #[test]
    fn test_truncated_file_reports_json_position() {
        let err = parse_ingest_input(
            "{\"t\": [\n  {\"device_id\": \"sensor_1\",",
            None,
        )
        .unwrap_err();

        let InputError::Json(source) = &err else {
            panic!("expected a JSON error, got {err}");
        };
        assert!(source.is_eof());
        assert_eq!(source.line(), 2);
        assert!(err.to_string().contains("line 2"));
    }

    #[tokio::test]
    async fn test_artifact_round_trip_through_files() {
        let dir = tempfile::tempdir().unwrap();
        let sink = FileArtifactSink::new(dir.path().join("failed"));
        let records = parse_ingest_input(
            r#"{"t": [{"device_id": "sensor_1", "room_id": "room_001",
                "timestamp": "2025-08-01T00:00:00Z", "temperature": 4.5, "device_status": "ok"}]}"#,
            None,
        )
        .unwrap()
        .records;
        let artifact = ResumeArtifact {
            table: "IoT Table".to_string(),
            offset: 50,
            total: 51,
            batch_index: 2,
            failed_batch_size: 1,
            reason: "store unavailable: throttled".to_string(),
            records,
        };

        let path = sink.persist(&artifact).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "failed_batch_IoT_Table_000002_offset_50.json"
        );
        assert_eq!(read_artifact(&path).await.unwrap(), artifact);
    }
}
