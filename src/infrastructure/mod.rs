// Infrastructure layer - External dependencies and adapters
pub mod api_time;
pub mod cache_file;
pub mod config;
pub mod fingrid_importer;
pub mod fmi_importer;
pub mod http_transport;
pub mod xml_records;
