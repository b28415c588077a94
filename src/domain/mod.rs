// Domain layer - Pure data types shared by the engine and its adapters
pub mod data_set;
pub mod data_type;
pub mod series;
pub mod source;
pub mod telemetry;
