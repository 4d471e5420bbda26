// Query service - Device-centric and room-centric read paths
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::{QueryError, QueryResult, StoreError};
use crate::domain::filter::{RecordFilter, TimeRange, normalize_order};
use crate::domain::listing::{
    DeviceList, DeviceReadings, DeviceRoomReadings, DeviceRooms, Readings, RoomDeviceReadings,
    RoomDevices, RoomList, RoomReadings,
};
use crate::domain::telemetry::{DeviceId, RoomId, TelemetryRecord};
use crate::domain::validation::ParamValidator;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Raw time and status filters as supplied by a caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FilterParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub status: Option<String>,
}

/// Raw time filters for room-wide reads, which do not filter by status.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeParams {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

impl ParamValidator {
    fn range(&mut self, start: Option<&str>, end: Option<&str>) -> Option<TimeRange> {
        let start = self.timestamp("start_time", start);
        let end = self.timestamp("end_time", end);
        Some(TimeRange::new(start?, end?))
    }

    fn filter(&mut self, params: &FilterParams) -> Option<RecordFilter> {
        let range = self.range(params.start_time.as_deref(), params.end_time.as_deref());
        let status = self.status(params.status.as_deref());
        Some(RecordFilter::new(range?, status?))
    }
}

/// The two physical access paths.
///
/// For the same device, room and filter both methods must return the same
/// records once ordered with [`normalize_order`].
#[async_trait]
pub trait AccessPaths: Send + Sync {
    /// Primary-key lookup by device, optionally restricted to one room.
    async fn resolve_by_device(
        &self,
        device_id: &DeviceId,
        room_id: Option<&RoomId>,
        filter: &RecordFilter,
    ) -> Result<Vec<TelemetryRecord>, StoreError>;

    /// Room-index lookup, optionally restricted to one device.
    async fn resolve_by_room(
        &self,
        room_id: &RoomId,
        device_id: Option<&DeviceId>,
        filter: &RecordFilter,
    ) -> Result<Vec<TelemetryRecord>, StoreError>;
}

/// Access paths backed by a [`TelemetryStore`].
///
/// The time range is pushed down to the store's sort key; the room or device
/// restriction and the status test run in the filter engine.
#[derive(Clone)]
pub struct StoreAccessPaths {
    store: Arc<dyn TelemetryStore>,
}

impl StoreAccessPaths {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AccessPaths for StoreAccessPaths {
    async fn resolve_by_device(
        &self,
        device_id: &DeviceId,
        room_id: Option<&RoomId>,
        filter: &RecordFilter,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        tracing::debug!(device_id = %device_id, room_id = ?room_id, "device-centric lookup");
        let mut records = self.store.query_device(device_id, &filter.range).await?;
        if let Some(room_id) = room_id {
            records.retain(|r| r.room_id() == room_id);
        }
        let mut records = filter.apply(records);
        normalize_order(&mut records);
        Ok(records)
    }

    async fn resolve_by_room(
        &self,
        room_id: &RoomId,
        device_id: Option<&DeviceId>,
        filter: &RecordFilter,
    ) -> Result<Vec<TelemetryRecord>, StoreError> {
        tracing::debug!(room_id = %room_id, device_id = ?device_id, "room-centric lookup");
        let mut records = self.store.query_room(room_id, &filter.range).await?;
        if let Some(device_id) = device_id {
            records.retain(|r| r.device_id() == device_id);
        }
        let mut records = filter.apply(records);
        normalize_order(&mut records);
        Ok(records)
    }
}

/// Read-only query operations. Holds no per-request state.
#[derive(Clone)]
pub struct QueryService {
    store: Arc<dyn TelemetryStore>,
    paths: Arc<dyn AccessPaths>,
}

impl QueryService {
    pub fn new(store: Arc<dyn TelemetryStore>) -> Self {
        let paths = Arc::new(StoreAccessPaths::new(store.clone()));
        Self { store, paths }
    }

    /// Full table scan. Expensive; returns everything or fails.
    pub async fn get_all(&self) -> QueryResult<Readings> {
        let mut records = self.store.scan().await?;
        normalize_order(&mut records);
        Ok(Readings::new(records))
    }

    pub async fn list_devices(&self) -> QueryResult<DeviceList> {
        let devices = self.store.scan_device_ids().await?;
        Ok(DeviceList::new(sorted_unique(devices)))
    }

    pub async fn list_rooms(&self) -> QueryResult<RoomList> {
        let rooms = self.store.scan_room_ids().await?;
        Ok(RoomList::new(sorted_unique(rooms)))
    }

    pub async fn get_device(
        &self,
        device_id: &str,
        params: &FilterParams,
    ) -> QueryResult<DeviceReadings> {
        let mut v = ParamValidator::new();
        let device_id = v.device_id(device_id);
        let filter = v.filter(params);
        let (Some(device_id), Some(filter)) = (device_id, filter) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self.paths.resolve_by_device(&device_id, None, &filter).await?;
        Ok(DeviceReadings::new(device_id, records))
    }

    pub async fn get_device_rooms(&self, device_id: &str) -> QueryResult<DeviceRooms> {
        let mut v = ParamValidator::new();
        let Some(device_id) = v.device_id(device_id) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self
            .store
            .query_device(&device_id, &TimeRange::unbounded())
            .await?;
        let rooms = sorted_unique(records.iter().map(|r| r.room_id().clone()));
        Ok(DeviceRooms::new(device_id, rooms))
    }

    pub async fn get_device_room(
        &self,
        device_id: &str,
        room_id: &str,
        params: &FilterParams,
    ) -> QueryResult<DeviceRoomReadings> {
        let mut v = ParamValidator::new();
        let device_id = v.device_id(device_id);
        let room_id = v.room_id(room_id);
        let filter = v.filter(params);
        let (Some(device_id), Some(room_id), Some(filter)) = (device_id, room_id, filter) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self
            .paths
            .resolve_by_device(&device_id, Some(&room_id), &filter)
            .await?;
        Ok(DeviceRoomReadings::new(device_id, room_id, records))
    }

    /// Room-wide readings. Status filtering is not offered at this granularity.
    pub async fn get_room(&self, room_id: &str, params: &RangeParams) -> QueryResult<RoomReadings> {
        let mut v = ParamValidator::new();
        let room_id = v.room_id(room_id);
        let range = v.range(params.start_time.as_deref(), params.end_time.as_deref());
        let (Some(room_id), Some(range)) = (room_id, range) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self
            .paths
            .resolve_by_room(&room_id, None, &RecordFilter::by_range(range))
            .await?;
        Ok(RoomReadings::new(room_id, records))
    }

    pub async fn get_room_devices(&self, room_id: &str) -> QueryResult<RoomDevices> {
        let mut v = ParamValidator::new();
        let Some(room_id) = v.room_id(room_id) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self
            .store
            .query_room(&room_id, &TimeRange::unbounded())
            .await?;
        let devices = sorted_unique(records.iter().map(|r| r.device_id().clone()));
        Ok(RoomDevices::new(room_id, devices))
    }

    pub async fn get_room_device(
        &self,
        room_id: &str,
        device_id: &str,
        params: &FilterParams,
    ) -> QueryResult<RoomDeviceReadings> {
        let mut v = ParamValidator::new();
        let room_id = v.room_id(room_id);
        let device_id = v.device_id(device_id);
        let filter = v.filter(params);
        let (Some(room_id), Some(device_id), Some(filter)) = (room_id, device_id, filter) else {
            return Err(QueryError::Validation(v.into_errors()));
        };

        let records = self
            .paths
            .resolve_by_room(&room_id, Some(&device_id), &filter)
            .await?;
        Ok(RoomDeviceReadings::new(room_id, device_id, records))
    }
}

fn sorted_unique<T: Ord>(items: impl IntoIterator<Item = T>) -> Vec<T> {
    items.into_iter().collect::<BTreeSet<_>>().into_iter().collect()
}
