// Application layer - Use cases over the telemetry store
pub mod ingestion_service;
pub mod query_service;
pub mod telemetry_store;
