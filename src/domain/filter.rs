// Time-range and status predicates over telemetry records
use crate::domain::telemetry::{DeviceStatus, TelemetryRecord};
use chrono::{DateTime, Utc};
use std::ops::Bound;

/// Inclusive time window; a missing bound is open on that side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|start| start <= ts) && self.end.is_none_or(|end| ts <= end)
    }

    /// True when `start > end`; no instant can match.
    pub fn is_empty(&self) -> bool {
        matches!((self.start, self.end), (Some(start), Some(end)) if start > end)
    }

    /// Bounds suitable for `BTreeMap::range`. Callers must check `is_empty` first.
    pub fn bounds(&self) -> (Bound<DateTime<Utc>>, Bound<DateTime<Utc>>) {
        (
            self.start.map_or(Bound::Unbounded, Bound::Included),
            self.end.map_or(Bound::Unbounded, Bound::Included),
        )
    }
}

/// Conjunction of an optional time range and an optional status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub range: TimeRange,
    pub status: Option<DeviceStatus>,
}

impl RecordFilter {
    pub fn new(range: TimeRange, status: Option<DeviceStatus>) -> Self {
        Self { range, status }
    }

    pub fn by_range(range: TimeRange) -> Self {
        Self {
            range,
            status: None,
        }
    }

    pub fn matches(&self, record: &TelemetryRecord) -> bool {
        self.range.contains(record.timestamp())
            && self
                .status
                .is_none_or(|status| record.device_status() == status)
    }

    /// Keep the matching records, preserving their order.
    pub fn apply(&self, mut records: Vec<TelemetryRecord>) -> Vec<TelemetryRecord> {
        records.retain(|record| self.matches(record));
        records
    }
}

/// Canonical emission order: timestamp, then device id, then room id.
pub fn normalize_order(records: &mut [TelemetryRecord]) {
    records.sort_by(|a, b| {
        a.timestamp()
            .cmp(&b.timestamp())
            .then_with(|| a.device_id().cmp(b.device_id()))
            .then_with(|| a.room_id().cmp(b.room_id()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::RawTelemetryRecord;
    use crate::domain::validation::validate_timestamp;

    fn record(
        device: &str,
        room: &str,
        ts: &str,
        temp: Option<f64>,
        status: &str,
    ) -> TelemetryRecord {
        RawTelemetryRecord {
            device_id: device.to_string(),
            room_id: room.to_string(),
            timestamp: ts.to_string(),
            temperature: temp,
            device_status: status.to_string(),
        }
        .validate()
        .unwrap()
    }

    fn at(ts: &str) -> DateTime<Utc> {
        validate_timestamp(ts).unwrap()
    }

    fn fridge_readings() -> Vec<TelemetryRecord> {
        vec![
            record("fridge_01", "room_001", "2024-12-01T10:00:00Z", Some(5.5), "ok"),
            record("fridge_01", "room_001", "2024-12-01T10:02:00Z", None, "sensor_error"),
            record("fridge_01", "room_001", "2024-12-01T10:04:00Z", Some(5.9), "ok"),
            record("fridge_01", "room_001", "2024-12-01T10:06:00Z", Some(6.1), "maintenance"),
        ]
    }

    #[test]
    fn test_range_is_inclusive_at_both_ends() {
        let range = TimeRange::new(
            Some(at("2024-12-01T10:00:00Z")),
            Some(at("2024-12-01T10:04:00Z")),
        );
        let kept = RecordFilter::by_range(range).apply(fridge_readings());
        let times: Vec<String> = kept
            .iter()
            .map(|r| crate::domain::telemetry::format_timestamp(&r.timestamp()))
            .collect();
        assert_eq!(
            times,
            vec![
                "2024-12-01T10:00:00Z",
                "2024-12-01T10:02:00Z",
                "2024-12-01T10:04:00Z"
            ]
        );
    }

    #[test]
    fn test_open_bounds() {
        let from = TimeRange::new(Some(at("2024-12-01T10:04:00Z")), None);
        assert_eq!(RecordFilter::by_range(from).apply(fridge_readings()).len(), 2);

        let until = TimeRange::new(None, Some(at("2024-12-01T10:02:00Z")));
        assert_eq!(RecordFilter::by_range(until).apply(fridge_readings()).len(), 2);

        assert_eq!(RecordFilter::default().apply(fridge_readings()).len(), 4);
    }

    #[test]
    fn test_inverted_range_is_empty() {
        let range = TimeRange::new(
            Some(at("2024-12-01T10:05:00Z")),
            Some(at("2024-12-01T10:00:00Z")),
        );
        assert!(range.is_empty());
        assert!(RecordFilter::by_range(range).apply(fridge_readings()).is_empty());
    }

    #[test]
    fn test_status_and_time_filters_commute() {
        let range = TimeRange::new(
            Some(at("2024-12-01T10:00:00Z")),
            Some(at("2024-12-01T10:05:00Z")),
        );
        let by_range = RecordFilter::by_range(range);
        let by_status = RecordFilter::new(TimeRange::unbounded(), Some(DeviceStatus::Ok));

        let status_then_time = by_range.apply(by_status.apply(fridge_readings()));
        let time_then_status = by_status.apply(by_range.apply(fridge_readings()));
        let combined = RecordFilter::new(range, Some(DeviceStatus::Ok)).apply(fridge_readings());

        assert_eq!(status_then_time, time_then_status);
        assert_eq!(status_then_time, combined);
        assert_eq!(combined.len(), 2);
        assert_eq!(combined[0].temperature(), Some(5.5));
        assert_eq!(combined[1].temperature(), Some(5.9));
    }

    #[test]
    fn test_normalize_order_breaks_ties_by_device_then_room() {
        let mut records = vec![
            record("sensor_2", "room_001", "2024-12-01T10:00:00Z", Some(1.0), "ok"),
            record("fridge_01", "room_002", "2024-12-01T10:00:00Z", Some(1.0), "ok"),
            record("fridge_01", "room_001", "2024-12-01T10:00:00Z", Some(1.0), "ok"),
            record("fridge_01", "room_001", "2024-12-01T09:00:00Z", Some(1.0), "ok"),
        ];
        normalize_order(&mut records);

        let keys: Vec<(&str, &str)> = records
            .iter()
            .map(|r| (r.device_id().as_str(), r.room_id().as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("fridge_01", "room_001"),
                ("fridge_01", "room_001"),
                ("fridge_01", "room_002"),
                ("sensor_2", "room_001"),
            ]
        );
        assert_eq!(records[0].timestamp(), at("2024-12-01T09:00:00Z"));
    }
}
