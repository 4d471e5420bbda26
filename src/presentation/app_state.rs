// Application state for HTTP handlers
use crate::application::query_service::QueryService;

#[derive(Clone)]
pub struct AppState {
    pub query_service: QueryService,
}
