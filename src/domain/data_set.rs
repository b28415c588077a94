// Persisted snapshots of displayed series
use super::source::DataSourceDetails;
use super::telemetry::{DataPoint, Extent, TimeRange};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSet {
    pub source: DataSourceDetails,
    pub unit: String,
    pub points: Vec<DataPoint>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub magnitude: f64,
}

impl DataSet {
    pub fn extent(&self) -> Extent {
        Extent::from_bounds(self.min, self.max)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDataSets {
    pub window: TimeRange,
    pub data_sets: Vec<DataSet>,
}
