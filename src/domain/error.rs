// Error taxonomy shared by the query and ingestion paths
use crate::domain::telemetry::DeviceStatus;
use thiserror::Error;

/// A single rejected identifier or parameter, carrying the raw input.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Invalid device_id: {0}")]
    InvalidDeviceId(String),

    #[error("Invalid room_id: {0}")]
    InvalidRoomId(String),

    #[error("Invalid {field}: {raw}")]
    InvalidTimestamp { field: &'static str, raw: String },

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Invalid temperature for status {status}: {temperature:?}")]
    InvalidReading {
        status: DeviceStatus,
        temperature: Option<f64>,
    },
}

/// Every validation failure found in one record.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid record: {}", join_errors(.0))]
pub struct InvalidRecord(pub Vec<ValidationError>);

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Failures reported by a storage adapter.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store query failed: {0}")]
    QueryFailed(String),

    #[error("batch write rejected: {0}")]
    WriteRejected(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(std::time::Duration),
}

/// Failures surfaced by the query resolver.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Validation failed")]
    Validation(Vec<ValidationError>),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => QueryError::StoreUnavailable(msg),
            StoreError::Timeout(after) => {
                QueryError::StoreUnavailable(format!("timed out after {after:?}"))
            }
            StoreError::QueryFailed(msg) | StoreError::WriteRejected(msg) => {
                QueryError::QueryFailed(msg)
            }
        }
    }
}

/// Failures that stop an ingestion run without a resumption artifact.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("start offset {offset} is past the end of the input ({total} records)")]
    OffsetOutOfRange { offset: usize, total: usize },

    #[error("batch size must be at least 1")]
    ZeroBatchSize,

    #[error("artifact holds {remaining} records from offset {offset} but claims {total} in total")]
    ArtifactMismatch {
        offset: usize,
        remaining: usize,
        total: usize,
    },

    #[error("failed to persist resumption artifact at offset {offset}: {source}")]
    Artifact {
        offset: usize,
        #[source]
        source: std::io::Error,
    },
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
