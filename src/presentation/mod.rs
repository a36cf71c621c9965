// Presentation layer - HTTP surface over the controller outputs
pub mod app_state;
pub mod handlers;
