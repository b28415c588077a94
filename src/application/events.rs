// Events delivered to the display consumer
use crate::domain::source::DataSourceDetails;
use crate::domain::telemetry::{DataPoint, Extent};

#[derive(Debug, Clone, PartialEq)]
pub enum ConnectorEvent {
    /// A series is available in full for the current window.
    SeriesReady {
        name: String,
        unit: String,
        points: Vec<DataPoint>,
        extent: Extent,
        magnitude: f64,
    },
    /// Points to put before or after the displayed ones.
    PointsAdded {
        name: String,
        points: Vec<DataPoint>,
        add_before: bool,
    },
    /// Remove points `[0, index)` when `remove_before`, otherwise `[index, len)`.
    PointsRemoved {
        name: String,
        index: usize,
        remove_before: bool,
    },
    /// The series must be re-created from scratch, either because the window
    /// moved past its cache or because its first fetch timed out.
    SeriesRebuildRequired { source: DataSourceDetails },
    MetricsChanged {
        name: String,
        magnitude: f64,
        extent: Extent,
    },
    /// A source came back from a saved file and can be activated.
    SourceRestored { source: DataSourceDetails },
}
