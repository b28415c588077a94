// Identity of an importable series
use super::data_type::DataType;
use serde::{Deserialize, Serialize};

/// One importable series: a single data type at a single location.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SourceKey {
    pub data_type: DataType,
    pub location: String,
}

impl SourceKey {
    pub fn new(data_type: DataType, location: impl Into<String>) -> Self {
        Self {
            data_type,
            location: location.into(),
        }
    }
}

/// Consumer-facing description of a selectable series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceDetails {
    pub source_name: String,
    pub location: String,
    pub series_name: String,
    pub importer_index: usize,
    pub data_type: DataType,
}

impl DataSourceDetails {
    pub fn new(
        source_name: impl Into<String>,
        importer_index: usize,
        data_type: DataType,
        location: impl Into<String>,
    ) -> Self {
        let location = location.into();
        Self {
            source_name: source_name.into(),
            series_name: series_name(data_type, &location),
            location,
            importer_index,
            data_type,
        }
    }

    pub fn key(&self) -> SourceKey {
        SourceKey::new(self.data_type, self.location.clone())
    }
}

/// "Wind Speed, Oulu"
pub fn series_name(data_type: DataType, location: &str) -> String {
    format!("{}, {}", data_type.name(), location)
}
