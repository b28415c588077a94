// Application layer - Fetch reassembly, the window cache and the service that owns them
pub mod connector;
pub mod connector_service;
pub mod events;
pub mod importer;
pub mod segmenter;
