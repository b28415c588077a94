// Cached and displayed series
use super::telemetry::{clip_points, magnitude, DataPoint, Extent, TimeRange};

/// Everything fetched so far for one source. `points` is strictly
/// time-ordered and lies inside `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedSeries {
    pub unit: String,
    pub importer_index: usize,
    pub range: TimeRange,
    pub points: Vec<DataPoint>,
    pub extent: Extent,
}

/// Points a merge actually added to a cached series.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergedPoints {
    pub front: Vec<DataPoint>,
    pub back: Vec<DataPoint>,
}

impl CachedSeries {
    /// `extent` is the min/max already gathered while the points arrived.
    pub fn new(
        unit: String,
        importer_index: usize,
        range: TimeRange,
        mut points: Vec<DataPoint>,
        extent: Extent,
    ) -> Self {
        let received = points.len();
        points.retain(|p| range.contains(p.time));
        let extent = if points.len() == received {
            extent
        } else {
            Extent::of_points(&points)
        };
        Self {
            unit,
            importer_index,
            range,
            points,
            extent,
        }
    }

    /// Merges a fetched range that touches or overlaps one end of the cache.
    /// Returns `None` when the range neither extends the front nor the back.
    pub fn merge(&mut self, range: TimeRange, points: &[DataPoint]) -> Option<MergedPoints> {
        let extends_front = range.start < self.range.start && range.end >= self.range.start;
        let extends_back = range.end > self.range.end && range.start <= self.range.end;
        if !extends_front && !extends_back {
            return None;
        }

        let mut merged = MergedPoints::default();
        if extends_front {
            merged.front = clip_points(points, &TimeRange::new(range.start, self.range.start));
            self.points.splice(0..0, merged.front.iter().copied());
            self.range.start = range.start;
        }
        if extends_back {
            merged.back = clip_points(points, &TimeRange::new(self.range.end, range.end));
            self.points.extend(merged.back.iter().copied());
            self.range.end = range.end;
        }
        self.extent = self
            .extent
            .merge(Extent::of_points(&merged.front))
            .merge(Extent::of_points(&merged.back));
        Some(merged)
    }

    pub fn clip(&self, window: &TimeRange) -> Vec<DataPoint> {
        clip_points(&self.points, window)
    }
}

/// The part of a cached series currently shown to the consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayedSeries {
    pub unit: String,
    pub points: Vec<DataPoint>,
    pub extent: Extent,
    pub magnitude: f64,
}

impl DisplayedSeries {
    pub fn new(unit: String, points: Vec<DataPoint>) -> Self {
        let mut series = Self {
            unit,
            points,
            extent: Extent::EMPTY,
            magnitude: 0.0,
        };
        series.recompute();
        series
    }

    pub fn prepend(&mut self, points: &[DataPoint]) {
        self.points.splice(0..0, points.iter().copied());
        self.recompute();
    }

    pub fn append(&mut self, points: &[DataPoint]) {
        self.points.extend_from_slice(points);
        self.recompute();
    }

    /// Drops points earlier than `time`; returns how many were dropped.
    pub fn remove_before(&mut self, time: chrono::DateTime<chrono::Utc>) -> usize {
        let count = self.points.partition_point(|p| p.time < time);
        self.points.drain(..count);
        self.recompute();
        count
    }

    /// Drops points at or after `time`; returns the index the removal started
    /// at, or `None` when nothing was dropped.
    pub fn remove_from(&mut self, time: chrono::DateTime<chrono::Utc>) -> Option<usize> {
        let index = self.points.partition_point(|p| p.time < time);
        if index == self.points.len() {
            return None;
        }
        self.points.truncate(index);
        self.recompute();
        Some(index)
    }

    fn recompute(&mut self) {
        self.extent = Extent::of_points(&self.points);
        self.magnitude = magnitude(&self.points);
    }
}
