// Real-time metrics reconciliation engine for the telemetry dashboard
pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
