// Presentation layer - HTTP read API
pub mod app_state;
pub mod handlers;
pub mod router;
