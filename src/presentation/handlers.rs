// HTTP request handlers
use crate::application::query_service::{FilterParams, RangeParams};
use crate::domain::listing::{
    DeviceList, DeviceReadings, DeviceRoomReadings, DeviceRooms, Readings, RoomDeviceReadings,
    RoomDevices, RoomList, RoomReadings,
};
use crate::infrastructure::http_response::ApiError;
use crate::presentation::app_state::AppState;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// All records. Scans the whole store.
pub async fn list_all(State(state): State<Arc<AppState>>) -> ApiResult<Readings> {
    Ok(Json(state.query_service.get_all().await?))
}

pub async fn list_devices(State(state): State<Arc<AppState>>) -> ApiResult<DeviceList> {
    Ok(Json(state.query_service.list_devices().await?))
}

pub async fn device_detail(
    Path(device_id): Path<String>,
    Query(params): Query<FilterParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DeviceReadings> {
    Ok(Json(state.query_service.get_device(&device_id, &params).await?))
}

pub async fn device_rooms(
    Path(device_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DeviceRooms> {
    Ok(Json(state.query_service.get_device_rooms(&device_id).await?))
}

pub async fn device_room_detail(
    Path((device_id, room_id)): Path<(String, String)>,
    Query(params): Query<FilterParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<DeviceRoomReadings> {
    Ok(Json(
        state
            .query_service
            .get_device_room(&device_id, &room_id, &params)
            .await?,
    ))
}

pub async fn list_rooms(State(state): State<Arc<AppState>>) -> ApiResult<RoomList> {
    Ok(Json(state.query_service.list_rooms().await?))
}

/// Room readings; a `status` query parameter is ignored here.
pub async fn room_detail(
    Path(room_id): Path<String>,
    Query(params): Query<RangeParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<RoomReadings> {
    Ok(Json(state.query_service.get_room(&room_id, &params).await?))
}

pub async fn room_devices(
    Path(room_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<RoomDevices> {
    Ok(Json(state.query_service.get_room_devices(&room_id).await?))
}

pub async fn room_device_detail(
    Path((room_id, device_id)): Path<(String, String)>,
    Query(params): Query<FilterParams>,
    State(state): State<Arc<AppState>>,
) -> ApiResult<RoomDeviceReadings> {
    Ok(Json(
        state
            .query_service
            .get_room_device(&room_id, &device_id, &params)
            .await?,
    ))
}

pub async fn route_not_found() -> ApiError {
    ApiError::RouteNotFound
}
