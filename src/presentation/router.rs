// Route table for the read API
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    device_detail, device_room_detail, device_rooms, health_check, list_all, list_devices,
    list_rooms, room_detail, room_device_detail, room_devices, route_not_found,
};
use axum::{
    Router,
    http::{Method, header},
    routing::get,
};
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // Static segments (`rooms`, `devices`) take priority over the captures
    // at the same position.
    Router::new()
        .route("/", get(list_all))
        .route("/healthz", get(health_check))
        .route("/devices", get(list_devices))
        .route("/devices/:device_id", get(device_detail))
        .route("/devices/:device_id/rooms", get(device_rooms))
        .route("/devices/:device_id/:room_id", get(device_room_detail))
        .route("/rooms", get(list_rooms))
        .route("/rooms/:room_id", get(room_detail))
        .route("/rooms/:room_id/devices", get(room_devices))
        .route("/rooms/:room_id/:device_id", get(room_device_detail))
        .fallback(route_not_found)
        .layer(cors)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::query_service::QueryService;
    use crate::application::telemetry_store::{MockTelemetryStore, TelemetryStore};
    use crate::domain::error::StoreError;
    use crate::domain::telemetry::{RawTelemetryRecord, TelemetryRecord};
    use crate::infrastructure::memory_store::MemoryTelemetryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{Value, json};
    use tower::ServiceExt;

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

    async fn app() -> Router {
        let store = Arc::new(MemoryTelemetryStore::new());
        store
            .write_batch(&[
                record("fridge_01", "room_001", "2024-12-01T10:00:00Z", Some(5.5), "ok"),
                record("fridge_01", "room_001", "2024-12-01T10:02:00Z", None, "sensor_error"),
                record("fridge_01", "room_001", "2024-12-01T10:04:00Z", Some(5.9), "ok"),
                record("fridge_01", "room_002", "2024-12-01T11:00:00Z", Some(6.0), "offline"),
                record("sensor_42", "room_002", "2024-12-01T10:30:00Z", Some(21.0), "maintenance"),
            ])
            .await
            .unwrap();
        build_router(Arc::new(AppState {
            query_service: QueryService::new(store),
        }))
    }

    async fn get_json(app: &Router, uri: &str) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_root_returns_everything() {
        let (status, body) = get_json(&app().await, "/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 5);
        assert_eq!(body["data"].as_array().unwrap().len(), 5);
    }

    #[tokio::test]
    async fn test_listings() {
        let app = app().await;

        let (_, devices) = get_json(&app, "/devices").await;
        assert_eq!(devices, json!({"devices": ["fridge_01", "sensor_42"], "count": 2}));

        let (_, rooms) = get_json(&app, "/rooms").await;
        assert_eq!(rooms, json!({"rooms": ["room_001", "room_002"], "count": 2}));

        let (_, device_rooms) = get_json(&app, "/devices/fridge_01/rooms").await;
        assert_eq!(
            device_rooms,
            json!({"device_id": "fridge_01", "rooms": ["room_001", "room_002"], "count": 2})
        );

        let (_, room_devices) = get_json(&app, "/rooms/room_002/devices").await;
        assert_eq!(
            room_devices,
            json!({
                "room_id": "room_002",
                "devices": [{"device_id": "fridge_01"}, {"device_id": "sensor_42"}],
                "count": 2
            })
        );
    }

    #[tokio::test]
    async fn test_device_detail_with_filters() {
        let (status, body) = get_json(
            &app().await,
            concat!(
                "/devices/fridge_01",
                "?start_time=2024-12-01T10:00:00Z&end_time=2024-12-01T10:05:00Z&status=ok"
            ),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({
                "device_id": "fridge_01",
                "data": [
                    {"device_id": "fridge_01", "room_id": "room_001",
                     "timestamp": "2024-12-01T10:00:00Z", "temperature": 5.5,
                     "device_status": "ok"},
                    {"device_id": "fridge_01", "room_id": "room_001",
                     "timestamp": "2024-12-01T10:04:00Z", "temperature": 5.9,
                     "device_status": "ok"}
                ],
                "count": 2
            })
        );
    }

    #[tokio::test]
    async fn test_device_room_matches_room_device() {
        let app = app().await;
        let until = "end_time=2024-12-01T10:02:00Z";
        let by_device_uri = format!("/devices/fridge_01/room_001?{until}");
        let by_room_uri = format!("/rooms/room_001/fridge_01?{until}");
        let (_, by_device) = get_json(&app, &by_device_uri).await;
        let (_, by_room) = get_json(&app, &by_room_uri).await;

        assert_eq!(by_device["count"], 2);
        assert_eq!(by_device["data"], by_room["data"]);
        assert_eq!(by_device["room_id"], "room_001");
        assert_eq!(by_room["device_id"], "fridge_01");
    }

    #[tokio::test]
    async fn test_room_detail_ignores_status() {
        let (status, body) = get_json(&app().await, "/rooms/room_002?status=ok").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["count"], 2);
    }

    #[tokio::test]
    async fn test_unknown_but_valid_ids_are_empty() {
        let (status, body) = get_json(&app().await, "/devices/ghost_7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"device_id": "ghost_7", "data": [], "count": 0}));
    }

    #[tokio::test]
    async fn test_validation_failures_are_400_with_details() {
        let (status, body) = get_json(
            &app().await,
            "/rooms/room_1/sensor01?start_time=2024-02-30T00:00:00Z&status=error",
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body,
            json!({
                "error": "Validation failed",
                "details": [
                    "Invalid room_id: room_1",
                    "Invalid device_id: sensor01",
                    "Invalid start_time: 2024-02-30T00:00:00Z",
                    "Invalid status: error"
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_unmatched_route_is_404() {
        let (status, body) = get_json(&app().await, "/gateways").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"error": "Route not found"}));

        let (status, _) = get_json(&app().await, "/devices/fridge_01/room_001/extra").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_failure_is_500() {
        let mut store = MockTelemetryStore::new();
        store
            .expect_scan_room_ids()
            .returning(|| Err(StoreError::Unavailable("connection refused".to_string())));
        let app = build_router(Arc::new(AppState {
            query_service: QueryService::new(Arc::new(store)),
        }));

        let (status, body) = get_json(&app, "/rooms").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({"error": "Store unavailable: connection refused"}));
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = app()
            .await
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
