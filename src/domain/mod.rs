// Domain layer - Telemetry records, validation and filtering
pub mod error;
pub mod filter;
pub mod listing;
pub mod telemetry;
pub mod validation;
