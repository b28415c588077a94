// Segmenter - Reassembles segmented fetch replies into one series per logical fetch
use crate::domain::data_type::DataType;
use crate::domain::source::SourceKey;
use crate::domain::telemetry::{DataPoint, Extent, TimeRange};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// The reassembled result of one logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentedData {
    pub key: SourceKey,
    pub range: TimeRange,
    pub points: Vec<DataPoint>,
    pub extent: Extent,
}

/// One pending logical fetch waiting for all of its segments.
#[derive(Debug)]
struct SegmentReceptacle {
    key: SourceKey,
    range: TimeRange,
    segment_indices_per_url: HashMap<String, usize>,
    // `None` until the segment's reply has been seen
    segments: Vec<Option<Vec<DataPoint>>>,
    extent: Extent,
    opened_at: Instant,
}

impl SegmentReceptacle {
    fn is_filled(&self) -> bool {
        self.segments.iter().all(Option::is_some)
    }

    fn into_data(self) -> SegmentedData {
        let mut points: Vec<DataPoint> = self.segments.into_iter().flatten().flatten().collect();
        let received = points.len();
        // Providers may report a point on both sides of a segment boundary
        points.dedup_by(|next, previous| next.time == previous.time);
        let extent = if points.len() == received {
            self.extent
        } else {
            Extent::of_points(&points)
        };

        SegmentedData {
            key: self.key,
            range: self.range,
            points,
            extent,
        }
    }
}

type ReceptacleId = u64;

/// Registry of open receptacles, addressed by sub-request URL and data type.
#[derive(Debug, Default)]
pub struct Segmenter {
    next_id: ReceptacleId,
    receptacles: HashMap<ReceptacleId, SegmentReceptacle>,
    receptacles_per_url: HashMap<String, HashMap<DataType, ReceptacleId>>,
}

impl Segmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a receptacle expecting one segment per URL. `segment_urls` must be
    /// in chronological order of the sub-ranges they cover.
    pub fn open_receptacle(&mut self, key: SourceKey, range: TimeRange, segment_urls: &[String]) {
        if segment_urls.is_empty() {
            tracing::warn!("Refusing to open receptacle for {:?} without segments", key);
            return;
        }

        let id = self.next_id;
        self.next_id += 1;

        let mut segment_indices_per_url = HashMap::with_capacity(segment_urls.len());
        for (index, url) in segment_urls.iter().enumerate() {
            let per_type = self.receptacles_per_url.entry(url.clone()).or_default();
            if per_type.insert(key.data_type, id).is_some() {
                tracing::warn!(
                    "Replacing open receptacle for {} under {}",
                    key.data_type.name(),
                    url
                );
            }
            segment_indices_per_url.insert(url.clone(), index);
        }

        tracing::debug!(
            "Opened receptacle {} for {}, {} with {} segments",
            id,
            key.data_type.name(),
            key.location,
            segment_urls.len()
        );

        self.receptacles.insert(
            id,
            SegmentReceptacle {
                key,
                range,
                segment_indices_per_url,
                segments: vec![None; segment_urls.len()],
                extent: Extent::EMPTY,
                opened_at: Instant::now(),
            },
        );
    }

    /// Appends a point to the segment `url` holds for `data_type`. Points for
    /// URLs or types without an open receptacle are dropped.
    pub fn push_point(&mut self, url: &str, data_type: DataType, point: DataPoint) {
        let Some(id) = self
            .receptacles_per_url
            .get(url)
            .and_then(|per_type| per_type.get(&data_type))
        else {
            tracing::trace!("No receptacle for {} under {}", data_type.name(), url);
            return;
        };
        let Some(receptacle) = self.receptacles.get_mut(id) else {
            return;
        };
        let Some(&index) = receptacle.segment_indices_per_url.get(url) else {
            return;
        };

        receptacle.segments[index]
            .get_or_insert_with(Vec::new)
            .push(point);
        receptacle.extent.observe(point.value);
    }

    /// Marks the reply for `url` as received and returns every receptacle that
    /// is now complete. Segments of `url` that got no points count as empty.
    pub fn take_completed(&mut self, url: &str) -> Vec<SegmentedData> {
        let Some(per_type) = self.receptacles_per_url.remove(url) else {
            return Vec::new();
        };

        let mut ids: Vec<(DataType, ReceptacleId)> = per_type.into_iter().collect();
        ids.sort();

        let mut completed = Vec::new();
        for (_, id) in ids {
            let Some(receptacle) = self.receptacles.get_mut(&id) else {
                continue;
            };
            if let Some(&index) = receptacle.segment_indices_per_url.get(url) {
                receptacle.segments[index].get_or_insert_with(Vec::new);
            }
            if receptacle.is_filled() {
                if let Some(receptacle) = self.receptacles.remove(&id) {
                    tracing::debug!("Receptacle {} complete", id);
                    completed.push(receptacle.into_data());
                }
            }
        }

        completed
    }

    /// Drops receptacles that have been open for at least `max_age` and
    /// returns the source and range each one was fetching.
    pub fn evict_stale(&mut self, max_age: Duration) -> Vec<(SourceKey, TimeRange)> {
        let now = Instant::now();
        let stale: Vec<ReceptacleId> = self
            .receptacles
            .iter()
            .filter(|(_, r)| now.duration_since(r.opened_at) >= max_age)
            .map(|(id, _)| *id)
            .collect();
        if stale.is_empty() {
            return Vec::new();
        }

        for per_type in self.receptacles_per_url.values_mut() {
            per_type.retain(|_, id| !stale.contains(id));
        }
        self.receptacles_per_url.retain(|_, per_type| !per_type.is_empty());

        stale
            .into_iter()
            .filter_map(|id| self.receptacles.remove(&id))
            .map(|r| (r.key, r.range))
            .collect()
    }

    pub fn open_count(&self) -> usize {
        self.receptacles.len()
    }
}
