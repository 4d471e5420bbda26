// In-process telemetry store with a primary device partition and a room index
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::StoreError;
use crate::domain::filter::TimeRange;
use crate::domain::telemetry::{DeviceId, RoomId, TelemetryRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

/// Same atomic batch ceiling as DynamoDB's BatchWriteItem.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 25;

#[derive(Debug, Default)]
struct Tables {
    /// Primary table: device partition, timestamp sort key.
    by_device: BTreeMap<DeviceId, BTreeMap<DateTime<Utc>, TelemetryRecord>>,
    /// Secondary index: room partition, timestamp sort key, device ids per slot.
    by_room: BTreeMap<RoomId, BTreeMap<DateTime<Utc>, BTreeSet<DeviceId>>>,
}

impl Tables {
    fn put(&mut self, record: TelemetryRecord) {
        let device_id = record.device_id().clone();
        let room_id = record.room_id().clone();
        let timestamp = record.timestamp();

        let rows = self.by_device.entry(device_id.clone()).or_default();
        if let Some(previous) = rows.insert(timestamp, record) {
            if previous.room_id() != &room_id {
                self.unindex(&previous);
            }
        }

        self.by_room
            .entry(room_id)
            .or_default()
            .entry(timestamp)
            .or_default()
            .insert(device_id);
    }

    fn unindex(&mut self, record: &TelemetryRecord) {
        let Some(slots) = self.by_room.get_mut(record.room_id()) else {
            return;
        };
        if let Some(devices) = slots.get_mut(&record.timestamp()) {
            devices.remove(record.device_id());
            if devices.is_empty() {
                slots.remove(&record.timestamp());
            }
        }
        if slots.is_empty() {
            self.by_room.remove(record.room_id());
        }
    }

    fn device_rows(&self, device_id: &DeviceId, range: &TimeRange) -> Vec<TelemetryRecord> {
        if range.is_empty() {
            return Vec::new();
        }
        self.by_device
            .get(device_id)
            .map(|rows| rows.range(range.bounds()).map(|(_, r)| r.clone()).collect())
            .unwrap_or_default()
    }

    fn room_rows(&self, room_id: &RoomId, range: &TimeRange) -> Vec<TelemetryRecord> {
        if range.is_empty() {
            return Vec::new();
        }
        let Some(slots) = self.by_room.get(room_id) else {
            return Vec::new();
        };

        slots
            .range(range.bounds())
            .flat_map(|(timestamp, devices)| {
                devices.iter().filter_map(move |device_id| {
                    self.by_device
                        .get(device_id)
                        .and_then(|rows| rows.get(timestamp))
                        .cloned()
                })
            })
            .collect()
    }
}

#[derive(Debug)]
pub struct MemoryTelemetryStore {
    tables: RwLock<Tables>,
    max_batch_size: usize,
}

impl Default for MemoryTelemetryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTelemetryStore {
    pub fn new() -> Self {
        Self::with_max_batch_size(DEFAULT_MAX_BATCH_SIZE)
    }

    pub fn with_max_batch_size(max_batch_size: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            max_batch_size: max_batch_size.max(1),
        }
    }

    /// Number of stored records.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        let tables = self.tables.read().await;
        tables.by_device.values().map(BTreeMap::len).sum()
    }
}

#[async_trait]
impl TelemetryStore for MemoryTelemetryStore {
    fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    async fn scan(&self) -> Result<Vec<TelemetryRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .by_device
            .values()
            .flat_map(|rows| rows.values().cloned())
            .collect())
    }

    async fn scan_device_ids(&self) -> Result<Vec<DeviceId>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.by_device.keys().cloned().collect())
    }

    async fn scan_room_ids(&self) -> Result<Vec<RoomId>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.by_room.keys().cloned().collect())
    }

    async fn query_device(
        &self,
        device_id: &DeviceId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.device_rows(device_id, range))
    }

    async fn query_room(
        &self,
        room_id: &RoomId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.room_rows(room_id, range))
    }

    async fn write_batch(&self, records: &[TelemetryRecord]) -> Result<(), StoreError> {
        if records.len() > self.max_batch_size {
            return Err(StoreError::WriteRejected(format!(
                "batch of {} exceeds the limit of {}",
                records.len(),
                self.max_batch_size
            )));
        }

        // One write guard for the whole batch keeps it invisible until complete.
        let mut tables = self.tables.write().await;
        for record in records {
            tables.put(record.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::telemetry::RawTelemetryRecord;
    use crate::domain::validation::{validate_device_id, validate_room_id, validate_timestamp};

    fn record(device: &str, room: &str, ts: &str, temp: f64) -> TelemetryRecord {
        RawTelemetryRecord {
            device_id: device.to_string(),
            room_id: room.to_string(),
            timestamp: ts.to_string(),
            temperature: Some(temp),
            device_status: "ok".to_string(),
        }
        .validate()
        .unwrap()
    }

    #[tokio::test]
    async fn test_rewriting_a_key_overwrites() {
        let store = MemoryTelemetryStore::new();
        let batch = vec![
            record("fridge_01", "room_001", "2024-12-01T10:00:00Z", 5.5),
            record("fridge_01", "room_001", "2024-12-01T10:01:00Z", 5.6),
        ];
        store.write_batch(&batch).await.unwrap();
        store.write_batch(&batch).await.unwrap();

        assert_eq!(store.len().await, 2);
        let room = validate_room_id("room_001").unwrap();
        let rows = store.query_room(&room, &TimeRange::unbounded()).await.unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_room_change_moves_index_entry() {
        let store = MemoryTelemetryStore::new();
        store
            .write_batch(&[record("fridge_01", "room_001", "2024-12-01T10:00:00Z", 5.5)])
            .await
            .unwrap();
        store
            .write_batch(&[record("fridge_01", "room_002", "2024-12-01T10:00:00Z", 5.5)])
            .await
            .unwrap();

        let rooms = store.scan_room_ids().await.unwrap();
        assert_eq!(rooms, vec![validate_room_id("room_002").unwrap()]);
    }

    #[tokio::test]
    async fn test_range_lookups_are_inclusive() {
        let store = MemoryTelemetryStore::new();
        store
            .write_batch(&[
                record("fridge_01", "room_001", "2024-12-01T10:00:00Z", 5.5),
                record("fridge_01", "room_001", "2024-12-01T10:02:00Z", 5.6),
                record("fridge_01", "room_001", "2024-12-01T10:04:00Z", 5.7),
            ])
            .await
            .unwrap();

        let range = TimeRange::new(
            Some(validate_timestamp("2024-12-01T10:00:00Z").unwrap()),
            Some(validate_timestamp("2024-12-01T10:02:00Z").unwrap()),
        );
        let device = validate_device_id("fridge_01").unwrap();
        let room = validate_room_id("room_001").unwrap();

        assert_eq!(store.query_device(&device, &range).await.unwrap().len(), 2);
        assert_eq!(store.query_room(&room, &range).await.unwrap().len(), 2);

        let inverted = TimeRange::new(range.end, range.start);
        assert!(store.query_device(&device, &inverted).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_batch_is_rejected_whole() {
        let store = MemoryTelemetryStore::with_max_batch_size(1);
        let result = store
            .write_batch(&[
                record("fridge_01", "room_001", "2024-12-01T10:00:00Z", 5.5),
                record("fridge_01", "room_001", "2024-12-01T10:01:00Z", 5.6),
            ])
            .await;

        assert!(matches!(result, Err(StoreError::WriteRejected(_))));
        assert_eq!(store.len().await, 0);
    }
}
