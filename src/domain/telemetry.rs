// Telemetry data domain models
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub time: DateTime<Utc>,
    pub value: f64,
}

impl DataPoint {
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    pub fn contains(&self, time: DateTime<Utc>) -> bool {
        self.start <= time && time < self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Running min/max. Starts at the `(+inf, -inf)` sentinel until a value is seen.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min: f64,
    pub max: f64,
}

impl Extent {
    pub const EMPTY: Extent = Extent {
        min: f64::INFINITY,
        max: f64::NEG_INFINITY,
    };

    pub fn of_points(points: &[DataPoint]) -> Self {
        let mut extent = Self::EMPTY;
        for point in points {
            extent.observe(point.value);
        }
        extent
    }

    pub fn from_bounds(min: Option<f64>, max: Option<f64>) -> Self {
        match (min, max) {
            (Some(min), Some(max)) => Extent { min, max },
            _ => Self::EMPTY,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.min > self.max
    }

    pub fn observe(&mut self, value: f64) {
        self.min = self.min.min(value);
        self.max = self.max.max(value);
    }

    pub fn merge(self, other: Extent) -> Extent {
        Extent {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn bounds(&self) -> Option<(f64, f64)> {
        (!self.is_empty()).then_some((self.min, self.max))
    }
}

impl Default for Extent {
    fn default() -> Self {
        Self::EMPTY
    }
}

/// Sum of the values, used as the series magnitude.
pub fn magnitude(points: &[DataPoint]) -> f64 {
    points.iter().map(|p| p.value).sum()
}

/// Points of a time-ordered slice that fall inside `range`.
pub fn clip_points(points: &[DataPoint], range: &TimeRange) -> Vec<DataPoint> {
    let from = points.partition_point(|p| p.time < range.start);
    let to = points.partition_point(|p| p.time < range.end);
    points[from..to.max(from)].to_vec()
}
