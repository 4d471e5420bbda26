// Result views returned by the query resolver
use crate::domain::telemetry::{DeviceId, RoomId, TelemetryRecord};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct Readings {
    pub data: Vec<TelemetryRecord>,
    pub count: usize,
}

impl Readings {
    pub fn new(data: Vec<TelemetryRecord>) -> Self {
        let count = data.len();
        Self { data, count }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceList {
    pub devices: Vec<DeviceId>,
    pub count: usize,
}

impl DeviceList {
    pub fn new(devices: Vec<DeviceId>) -> Self {
        let count = devices.len();
        Self { devices, count }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomList {
    pub rooms: Vec<RoomId>,
    pub count: usize,
}

impl RoomList {
    pub fn new(rooms: Vec<RoomId>) -> Self {
        let count = rooms.len();
        Self { rooms, count }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceReadings {
    pub device_id: DeviceId,
    pub data: Vec<TelemetryRecord>,
    pub count: usize,
}

impl DeviceReadings {
    pub fn new(device_id: DeviceId, data: Vec<TelemetryRecord>) -> Self {
        let count = data.len();
        Self {
            device_id,
            data,
            count,
        }
    }
}

/// Rooms a device has ever reported from.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRooms {
    pub device_id: DeviceId,
    pub rooms: Vec<RoomId>,
    pub count: usize,
}

impl DeviceRooms {
    pub fn new(device_id: DeviceId, rooms: Vec<RoomId>) -> Self {
        let count = rooms.len();
        Self {
            device_id,
            rooms,
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DeviceRoomReadings {
    pub device_id: DeviceId,
    pub room_id: RoomId,
    pub data: Vec<TelemetryRecord>,
    pub count: usize,
}

impl DeviceRoomReadings {
    pub fn new(device_id: DeviceId, room_id: RoomId, data: Vec<TelemetryRecord>) -> Self {
        let count = data.len();
        Self {
            device_id,
            room_id,
            data,
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomReadings {
    pub room_id: RoomId,
    pub data: Vec<TelemetryRecord>,
    pub count: usize,
}

impl RoomReadings {
    pub fn new(room_id: RoomId, data: Vec<TelemetryRecord>) -> Self {
        let count = data.len();
        Self {
            room_id,
            data,
            count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceRef {
    pub device_id: DeviceId,
}

/// Devices that have reported from a room, as `{device_id}` objects.
#[derive(Debug, Clone, Serialize)]
pub struct RoomDevices {
    pub room_id: RoomId,
    pub devices: Vec<DeviceRef>,
    pub count: usize,
}

impl RoomDevices {
    pub fn new(room_id: RoomId, devices: Vec<DeviceId>) -> Self {
        let devices: Vec<DeviceRef> = devices
            .into_iter()
            .map(|device_id| DeviceRef { device_id })
            .collect();
        let count = devices.len();
        Self {
            room_id,
            devices,
            count,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RoomDeviceReadings {
    pub room_id: RoomId,
    pub device_id: DeviceId,
    pub data: Vec<TelemetryRecord>,
    pub count: usize,
}

impl RoomDeviceReadings {
    pub fn new(room_id: RoomId, device_id: DeviceId, data: Vec<TelemetryRecord>) -> Self {
        let count = data.len();
        Self {
            room_id,
            device_id,
            data,
            count,
        }
    }
}
