// Store trait for telemetry data access
use crate::domain::error::StoreError;
use crate::domain::filter::TimeRange;
use crate::domain::telemetry::{DeviceId, RoomId, TelemetryRecord};
use async_trait::async_trait;

/// Partitioned, ordered record store.
///
/// Records are keyed by `(device_id, timestamp)` and indexed by
/// `(room_id, timestamp, device_id)`. Writing a record whose key already
/// exists replaces it, so replaying a committed batch is harmless.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Largest batch `write_batch` accepts as one atomic unit.
    fn max_batch_size(&self) -> usize;

    /// Every stored record. Expensive on large stores.
    async fn scan(&self) -> Result<Vec<TelemetryRecord>, StoreError>;

    /// Distinct device ids, using a key-only projection where the engine supports it.
    async fn scan_device_ids(&self) -> Result<Vec<DeviceId>, StoreError>;

    /// Distinct room ids, using a key-only projection where the engine supports it.
    async fn scan_room_ids(&self) -> Result<Vec<RoomId>, StoreError>;

    /// Primary-key lookup: one device's records within `range`.
    async fn query_device(
        &self,
        device_id: &DeviceId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError>;

    /// Secondary-index lookup: one room's records within `range`.
    async fn query_room(
        &self,
        room_id: &RoomId,
        range: &TimeRange,
    ) -> Result<Vec<TelemetryRecord>, StoreError>;

    /// Write all records or none of them.
    async fn write_batch(&self, records: &[TelemetryRecord]) -> Result<(), StoreError>;
}
