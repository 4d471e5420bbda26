// HTTP response utilities for JSON error bodies
use crate::domain::error::QueryError;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<String>>,
}

#[derive(Debug)]
pub enum ApiError {
    Query(QueryError),
    RouteNotFound,
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::Query(err)
    }
}

impl ApiError {
    fn status_and_body(&self) -> (StatusCode, ErrorBody) {
        match self {
            ApiError::Query(err @ QueryError::Validation(errors)) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: err.to_string(),
                    details: Some(errors.iter().map(ToString::to_string).collect()),
                },
            ),
            ApiError::Query(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: err.to_string(),
                    details: None,
                },
            ),
            ApiError::RouteNotFound => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "Route not found".to_string(),
                    details: None,
                },
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(error = %body.error, "request failed");
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ValidationError;

    #[test]
    fn test_validation_errors_list_details() {
        let err = ApiError::from(QueryError::Validation(vec![
            ValidationError::InvalidDeviceId("sensor01".to_string()),
            ValidationError::InvalidStatus("error".to_string()),
        ]));
        let (status, body) = err.status_and_body();

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body.error, "Validation failed");
        assert_eq!(
            body.details.unwrap(),
            vec!["Invalid device_id: sensor01", "Invalid status: error"]
        );
    }

    #[test]
    fn test_store_errors_are_500_without_details() {
        let err = ApiError::from(QueryError::StoreUnavailable("connection refused".to_string()));
        let (status, body) = err.status_and_body();

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Store unavailable: connection refused");
        assert!(body.details.is_none());
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"error": "Store unavailable: connection refused"})
        );
    }

    #[test]
    fn test_route_not_found() {
        let (status, body) = ApiError::RouteNotFound.status_and_body();
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error, "Route not found");
    }
}
