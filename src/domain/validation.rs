// Identifier and parameter validation
use crate::domain::error::ValidationError;
use crate::domain::telemetry::{DeviceId, DeviceStatus, RoomId, TIMESTAMP_FORMAT};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use regex::Regex;
use std::sync::LazyLock;

static DEVICE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9]+_([0-9]+)$").expect("device id pattern"));

static ROOM_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^room_[0-9]{3}$").expect("room id pattern"));

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z$")
        .expect("timestamp pattern")
});

/// Validate `<type>_<number>` where the number is a positive integer.
///
/// Zero-padded numbers (`fridge_01`) are accepted because the device fleet is
/// named that way; a number that is zero in value (`fridge_00`) is not.
pub fn validate_device_id(raw: &str) -> Result<DeviceId, ValidationError> {
    let positive = DEVICE_ID
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .is_some_and(|num| num.as_str().bytes().any(|b| b != b'0'));

    if positive {
        Ok(DeviceId(raw.to_string()))
    } else {
        Err(ValidationError::InvalidDeviceId(raw.to_string()))
    }
}

/// Validate `room_NNN` with NNN in 001..=999.
pub fn validate_room_id(raw: &str) -> Result<RoomId, ValidationError> {
    if ROOM_ID.is_match(raw) && raw != "room_000" {
        Ok(RoomId(raw.to_string()))
    } else {
        Err(ValidationError::InvalidRoomId(raw.to_string()))
    }
}

pub fn validate_timestamp(raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    parse_timestamp("timestamp", raw)
}

/// Parse a strict `YYYY-MM-DDTHH:MM:SSZ` instant, naming `field` on failure.
pub fn parse_timestamp(field: &'static str, raw: &str) -> Result<DateTime<Utc>, ValidationError> {
    let invalid = || ValidationError::InvalidTimestamp {
        field,
        raw: raw.to_string(),
    };

    if !TIMESTAMP.is_match(raw) {
        return Err(invalid());
    }

    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).map_err(|_| invalid())?;
    // chrono folds `:60` into the nanosecond field
    if naive.nanosecond() != 0 {
        return Err(invalid());
    }

    Ok(naive.and_utc())
}

/// Exact, case-sensitive match against the four status literals.
pub fn validate_status(raw: &str) -> Result<DeviceStatus, ValidationError> {
    DeviceStatus::ALL
        .into_iter()
        .find(|status| status.as_str() == raw)
        .ok_or_else(|| ValidationError::InvalidStatus(raw.to_string()))
}

/// Collects failures across several parameters so that each one is reported.
#[derive(Debug, Default)]
pub struct ParamValidator {
    errors: Vec<ValidationError>,
}

impl ParamValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn device_id(&mut self, raw: &str) -> Option<DeviceId> {
        self.check(validate_device_id(raw))
    }

    pub fn room_id(&mut self, raw: &str) -> Option<RoomId> {
        self.check(validate_room_id(raw))
    }

    /// An absent parameter is valid and yields `Some(None)`.
    pub fn timestamp(
        &mut self,
        field: &'static str,
        raw: Option<&str>,
    ) -> Option<Option<DateTime<Utc>>> {
        match raw {
            Some(raw) => self.check(parse_timestamp(field, raw)).map(Some),
            None => Some(None),
        }
    }

    pub fn status(&mut self, raw: Option<&str>) -> Option<Option<DeviceStatus>> {
        match raw {
            Some(raw) => self.check(validate_status(raw)).map(Some),
            None => Some(None),
        }
    }

    pub fn check<T>(&mut self, result: Result<T, ValidationError>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }
}
