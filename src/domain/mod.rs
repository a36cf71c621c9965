// Domain layer - Pure data models
pub mod dashboard;
pub mod filter;
pub mod telemetry;
