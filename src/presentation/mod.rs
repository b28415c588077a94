// Presentation layer - HTTP command surface over the connector service
pub mod app_state;
pub mod handlers;
