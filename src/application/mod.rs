// Application layer - Reconciliation use cases and provider traits
pub mod aggregate_adapter;
pub mod controller;
pub mod errors;
pub mod grouping;
pub mod live_buffer;
pub mod merge;
pub mod metrics_repository;
pub mod reconciler;
