// Telemetry data domain models
use crate::domain::error::{InvalidRecord, ValidationError};
use crate::domain::validation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Wire format for record timestamps: second precision, literal `Z`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Device identifier such as `fridge_01`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(pub(super) String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        validation::validate_device_id(&raw)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

/// Room identifier such as `room_001`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomId(pub(super) String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for RoomId {
    type Error = ValidationError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        validation::validate_room_id(&raw)
    }
}

impl From<RoomId> for String {
    fn from(id: RoomId) -> Self {
        id.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    Ok,
    SensorError,
    Offline,
    Maintenance,
}

impl DeviceStatus {
    pub const ALL: [DeviceStatus; 4] = [
        DeviceStatus::Ok,
        DeviceStatus::SensorError,
        DeviceStatus::Offline,
        DeviceStatus::Maintenance,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Ok => "ok",
            DeviceStatus::SensorError => "sensor_error",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Maintenance => "maintenance",
        }
    }

    /// Whether a record with this status must carry a temperature reading.
    pub fn expects_temperature(&self) -> bool {
        !matches!(self, DeviceStatus::SensorError)
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One immutable device reading.
///
/// Fields are private so that a record can only exist once the status and
/// temperature agree: `sensor_error` carries no temperature, every other
/// status carries a finite one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTelemetryRecord", into = "RawTelemetryRecord")]
pub struct TelemetryRecord {
    device_id: DeviceId,
    room_id: RoomId,
    timestamp: DateTime<Utc>,
    temperature: Option<f64>,
    device_status: DeviceStatus,
}

impl TelemetryRecord {
    pub fn new(
        device_id: DeviceId,
        room_id: RoomId,
        timestamp: DateTime<Utc>,
        temperature: Option<f64>,
        device_status: DeviceStatus,
    ) -> Result<Self, ValidationError> {
        let consistent = match temperature {
            Some(t) => device_status.expects_temperature() && t.is_finite(),
            None => !device_status.expects_temperature(),
        };
        if !consistent {
            return Err(ValidationError::InvalidReading {
                status: device_status,
                temperature,
            });
        }

        Ok(Self {
            device_id,
            room_id,
            timestamp,
            temperature,
            device_status,
        })
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.device_status
    }
}

/// Unvalidated record shape as it appears in JSON input and storage rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTelemetryRecord {
    pub device_id: String,
    pub room_id: String,
    pub timestamp: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    pub device_status: String,
}

impl RawTelemetryRecord {
    /// Validate every field, reporting all failures rather than the first.
    pub fn validate(&self) -> Result<TelemetryRecord, InvalidRecord> {
        let mut errors = Vec::new();

        let device_id = validation::validate_device_id(&self.device_id)
            .map_err(|e| errors.push(e))
            .ok();
        let room_id = validation::validate_room_id(&self.room_id)
            .map_err(|e| errors.push(e))
            .ok();
        let timestamp = validation::validate_timestamp(&self.timestamp)
            .map_err(|e| errors.push(e))
            .ok();
        let status = validation::validate_status(&self.device_status)
            .map_err(|e| errors.push(e))
            .ok();

        match (device_id, room_id, timestamp, status) {
            (Some(device_id), Some(room_id), Some(timestamp), Some(status)) => {
                TelemetryRecord::new(device_id, room_id, timestamp, self.temperature, status)
                    .map_err(|e| InvalidRecord(vec![e]))
            }
            _ => Err(InvalidRecord(errors)),
        }
    }
}

impl TryFrom<RawTelemetryRecord> for TelemetryRecord {
    type Error = InvalidRecord;

    fn try_from(raw: RawTelemetryRecord) -> Result<Self, Self::Error> {
        raw.validate()
    }
}

impl From<TelemetryRecord> for RawTelemetryRecord {
    fn from(record: TelemetryRecord) -> Self {
        Self {
            device_id: record.device_id.0,
            room_id: record.room_id.0,
            timestamp: format_timestamp(&record.timestamp),
            temperature: record.temperature,
            device_status: record.device_status.as_str().to_string(),
        }
    }
}
