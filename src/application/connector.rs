// Connector - Window-scoped cache of fetched series and the window resize logic
use crate::application::events::ConnectorEvent;
use crate::application::importer::{FetchedData, Importer, TransportReply};
use crate::domain::data_set::{DataSet, SavedDataSets};
use crate::domain::data_type::DataType;
use crate::domain::series::{CachedSeries, DisplayedSeries};
use crate::domain::source::{DataSourceDetails, SourceKey};
use crate::domain::telemetry::{clip_points, TimeRange};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Error, PartialEq)]
pub enum ConnectorError {
    #[error("window {start} .. {end} is empty")]
    EmptyWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    #[error("no importer can fetch {}", .0.name())]
    Unsupported(DataType),
}

/// Current window and every displayed series, by series name.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub window: TimeRange,
    pub series: BTreeMap<String, DisplayedSeries>,
}

pub struct Connector {
    importers: Vec<Box<dyn Importer>>,
    events: UnboundedSender<ConnectorEvent>,
    // Everything fetched so far, per source
    all_data: HashMap<SourceKey, CachedSeries>,
    // What the consumer currently shows, per series name
    data: HashMap<String, DisplayedSeries>,
    active_sources: Vec<DataSourceDetails>,
    // Range of the outstanding first fetch of sources that have no cache yet
    pending: HashMap<SourceKey, TimeRange>,
    window: TimeRange,
}

impl Connector {
    pub fn new(
        importers: Vec<Box<dyn Importer>>,
        window: TimeRange,
        events: UnboundedSender<ConnectorEvent>,
    ) -> Self {
        Self {
            importers,
            events,
            all_data: HashMap::new(),
            data: HashMap::new(),
            active_sources: Vec::new(),
            pending: HashMap::new(),
            window,
        }
    }

    pub fn window(&self) -> TimeRange {
        self.window
    }

    pub fn active_sources(&self) -> &[DataSourceDetails] {
        &self.active_sources
    }

    pub fn cached(&self, key: &SourceKey) -> Option<&CachedSeries> {
        self.all_data.get(key)
    }

    pub fn is_pending(&self, key: &SourceKey) -> bool {
        self.pending.contains_key(key)
    }

    /// Every (importer, type, location) combination that can be activated.
    pub fn all_source_details(&self) -> Vec<DataSourceDetails> {
        let mut details = Vec::new();
        for (index, importer) in self.importers.iter().enumerate() {
            let locations = importer.available_locations();
            for data_type in importer.available_types().decompose() {
                for location in &locations {
                    details.push(DataSourceDetails::new(
                        importer.source_name(),
                        index,
                        data_type,
                        location.clone(),
                    ));
                }
            }
        }
        details
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            window: self.window,
            series: self
                .data
                .iter()
                .map(|(name, series)| (name.clone(), series.clone()))
                .collect(),
        }
    }

    pub fn activate(&mut self, details: DataSourceDetails) -> Result<(), ConnectorError> {
        let key = details.key();
        if let Some(active) = self.active_sources.iter().find(|d| d.key() == key).cloned() {
            // An active source with neither data nor a fetch in flight lost its fetch
            if !self.all_data.contains_key(&key) && !self.pending.contains_key(&key) {
                tracing::info!("Fetching {} again", active.series_name);
                self.show_or_fetch(&active, self.window);
            } else {
                tracing::debug!("{} is already active", active.series_name);
            }
            return Ok(());
        }
        if self.importer_for(details.data_type).is_none() {
            return Err(ConnectorError::Unsupported(details.data_type));
        }

        tracing::info!("Activating {}", details.series_name);
        self.active_sources.push(details.clone());
        self.show_or_fetch(&details, self.window);
        Ok(())
    }

    /// The cached series is kept so a later activation can reuse it.
    pub fn deactivate(&mut self, details: &DataSourceDetails) {
        let key = details.key();
        let Some(position) = self.active_sources.iter().position(|d| d.key() == key) else {
            tracing::debug!("{} was not active", details.series_name);
            return;
        };
        let removed = self.active_sources.remove(position);
        self.data.remove(&removed.series_name);
    }

    pub fn clear_all_active(&mut self) {
        self.active_sources.clear();
        self.data.clear();
    }

    pub fn resize_window(&mut self, window: TimeRange) -> Result<(), ConnectorError> {
        if window.is_empty() {
            return Err(ConnectorError::EmptyWindow {
                start: window.start,
                end: window.end,
            });
        }

        let old = self.window;
        let moved_away = !window.overlaps(&old);
        tracing::info!(
            "Resizing window {} .. {} -> {} .. {}",
            old.start,
            old.end,
            window.start,
            window.end
        );

        for details in self.active_sources.clone() {
            let key = details.key();
            let Some(cached_range) = self.all_data.get(&key).map(|c| c.range) else {
                // First fetch still in flight; make it cover the new window
                if self.pending.get(&key) != Some(&window) {
                    self.pending.insert(key.clone(), window);
                    self.request(&key, window);
                }
                continue;
            };

            if moved_away || !window.overlaps(&cached_range) {
                self.all_data.remove(&key);
                self.data.remove(&details.series_name);
                emit(
                    &self.events,
                    ConnectorEvent::SeriesRebuildRequired {
                        source: details.clone(),
                    },
                );
                self.show_or_fetch(&details, window);
            } else {
                self.patch_displayed(&details, old, window);
            }
        }

        self.window = window;
        Ok(())
    }

    pub fn on_reply(&mut self, reply: TransportReply) {
        let Some(importer) = self.importers.get_mut(reply.importer_index) else {
            tracing::warn!("Reply for unknown importer {}", reply.importer_index);
            return;
        };

        match importer.on_reply(&reply.url, reply.records) {
            Ok(fetched) => {
                for data in fetched {
                    self.on_data_fetched(data);
                }
            }
            Err(e) => tracing::warn!("Dropping reply from {}: {}", reply.url, e),
        }
    }

    /// Merges a completed fetch into the cache and updates the displayed series.
    pub fn on_data_fetched(&mut self, data: FetchedData) {
        let FetchedData {
            key,
            unit,
            importer_index,
            range,
            points,
            extent,
        } = data;

        let merged = match self.all_data.get_mut(&key) {
            None => {
                if self.pending.get(&key) != Some(&range) {
                    tracing::debug!(
                        "Discarding superseded fetch {} .. {} for {}, {}",
                        range.start,
                        range.end,
                        key.data_type.name(),
                        key.location
                    );
                    return;
                }
                self.pending.remove(&key);
                // First data for this source defines the window
                self.window = range;
                self.all_data.insert(
                    key.clone(),
                    CachedSeries::new(unit, importer_index, range, points, extent),
                );
                None
            }
            Some(cached) => match cached.merge(range, &points) {
                Some(merged) => Some(merged),
                None => {
                    tracing::warn!(
                        "Discarding fetch {} .. {} for {}, {}: does not extend cached {} .. {}",
                        range.start,
                        range.end,
                        key.data_type.name(),
                        key.location,
                        cached.range.start,
                        cached.range.end
                    );
                    return;
                }
            },
        };

        let Some(name) = self
            .active_sources
            .iter()
            .find(|d| d.key() == key)
            .map(|d| d.series_name.clone())
        else {
            return;
        };
        let window = self.window;

        match merged {
            Some(merged) if self.data.contains_key(&name) => {
                let Some(series) = self.data.get_mut(&name) else {
                    return;
                };
                let front = clip_points(&merged.front, &window);
                if !front.is_empty() {
                    series.prepend(&front);
                    emit(
                        &self.events,
                        ConnectorEvent::PointsAdded {
                            name: name.clone(),
                            points: front,
                            add_before: true,
                        },
                    );
                }
                let back = clip_points(&merged.back, &window);
                if !back.is_empty() {
                    series.append(&back);
                    emit(
                        &self.events,
                        ConnectorEvent::PointsAdded {
                            name: name.clone(),
                            points: back,
                            add_before: false,
                        },
                    );
                }
                emit(&self.events, metrics_changed(&name, series));
            }
            _ => {
                let Some(cached) = self.all_data.get(&key) else {
                    return;
                };
                let series = DisplayedSeries::new(cached.unit.clone(), cached.clip(&window));
                emit(&self.events, series_ready(&name, &series));
                self.data.insert(name, series);
            }
        }
    }

    /// Drops fetches that never completed so their sources can be fetched
    /// again. Active sources that lost their first fetch are reported as
    /// needing a rebuild; activating them again re-fetches the window.
    pub fn evict_stale(&mut self, max_age: Duration) {
        let mut evicted = Vec::new();
        for importer in self.importers.iter_mut() {
            evicted.extend(importer.evict_stale(max_age));
        }

        for (key, range) in evicted {
            tracing::warn!(
                "Fetch of {}, {} for {} .. {} timed out",
                key.data_type.name(),
                key.location,
                range.start,
                range.end
            );
            if self.pending.get(&key) != Some(&range) {
                continue;
            }
            self.pending.remove(&key);

            if let Some(source) = self.active_sources.iter().find(|d| d.key() == key) {
                emit(
                    &self.events,
                    ConnectorEvent::SeriesRebuildRequired {
                        source: source.clone(),
                    },
                );
            }
        }
    }

    pub fn export_data_sets(&self) -> SavedDataSets {
        let data_sets = self
            .active_sources
            .iter()
            .filter_map(|source| {
                let series = self.data.get(&source.series_name)?;
                let bounds = series.extent.bounds();
                Some(DataSet {
                    source: source.clone(),
                    unit: series.unit.clone(),
                    points: series.points.clone(),
                    min: bounds.map(|(min, _)| min),
                    max: bounds.map(|(_, max)| max),
                    magnitude: series.magnitude,
                })
            })
            .collect();

        SavedDataSets {
            window: self.window,
            data_sets,
        }
    }

    /// Replaces the active state with saved data sets. Each one re-enters
    /// through [`Connector::on_data_fetched`] as if it had just been fetched.
    pub fn import_data_sets(&mut self, saved: SavedDataSets) {
        if saved.data_sets.is_empty() {
            tracing::debug!("No data sets to load");
            return;
        }

        self.clear_all_active();
        self.window = saved.window;

        for data_set in saved.data_sets {
            let key = data_set.source.key();
            self.all_data.remove(&key);
            self.pending.insert(key.clone(), saved.window);

            let extent = data_set.extent();
            self.on_data_fetched(FetchedData {
                key,
                unit: data_set.unit,
                importer_index: data_set.source.importer_index,
                range: saved.window,
                extent,
                points: data_set.points,
            });
            emit(
                &self.events,
                ConnectorEvent::SourceRestored {
                    source: data_set.source,
                },
            );
        }
    }

    pub fn export_preferences(&self) -> Vec<DataSourceDetails> {
        self.active_sources.clone()
    }

    pub fn import_preferences(&mut self, sources: Vec<DataSourceDetails>) {
        if sources.is_empty() {
            return;
        }

        self.clear_all_active();
        for source in sources {
            emit(&self.events, ConnectorEvent::SourceRestored { source });
        }
    }

    fn importer_for(&self, data_type: DataType) -> Option<usize> {
        self.importers.iter().position(|i| i.can_fetch(data_type))
    }

    fn request(&mut self, key: &SourceKey, range: TimeRange) {
        if range.is_empty() {
            return;
        }
        let Some(index) = self.importer_for(key.data_type) else {
            tracing::warn!("No importer for {}", key.data_type.name());
            return;
        };

        tracing::debug!(
            "Fetching {}, {} for {} .. {}",
            key.data_type.name(),
            key.location,
            range.start,
            range.end
        );
        self.importers[index].fetch(key.data_type.into(), range, &key.location);
    }

    /// Shows whatever the cache holds for `window` and fetches what is missing.
    fn show_or_fetch(&mut self, details: &DataSourceDetails, window: TimeRange) {
        let key = details.key();
        let cached_range = match self.all_data.get(&key) {
            Some(cached) => cached.range,
            None => {
                if self.pending.get(&key) == Some(&window) {
                    tracing::debug!("{} is already being fetched", details.series_name);
                } else {
                    self.pending.insert(key.clone(), window);
                    self.request(&key, window);
                }
                return;
            }
        };

        if !cached_range.overlaps(&window) {
            tracing::debug!("Cache of {} is outside the window, refetching", details.series_name);
            self.all_data.remove(&key);
            self.pending.insert(key.clone(), window);
            self.request(&key, window);
            return;
        }

        if let Some(cached) = self.all_data.get(&key) {
            let series = DisplayedSeries::new(cached.unit.clone(), cached.clip(&window));
            emit(&self.events, series_ready(&details.series_name, &series));
            self.data.insert(details.series_name.clone(), series);
        }

        if window.start < cached_range.start {
            self.request(&key, TimeRange::new(window.start, cached_range.start));
        }
        if cached_range.end < window.end {
            self.request(&key, TimeRange::new(cached_range.end, window.end));
        }
    }

    /// Trims and extends a displayed series for a window that still overlaps
    /// both the old window and the cache.
    fn patch_displayed(
        &mut self,
        details: &DataSourceDetails,
        old: TimeRange,
        window: TimeRange,
    ) {
        let key = details.key();
        if !self.data.contains_key(&details.series_name) {
            self.show_or_fetch(details, window);
            return;
        }
        let (Some(cached), Some(series)) = (
            self.all_data.get(&key),
            self.data.get_mut(&details.series_name),
        ) else {
            return;
        };
        let name = &details.series_name;
        let mut changed = false;
        let mut missing = Vec::new();

        if window.start > old.start {
            let removed = series.remove_before(window.start);
            if removed > 0 {
                emit(
                    &self.events,
                    ConnectorEvent::PointsRemoved {
                        name: name.clone(),
                        index: removed,
                        remove_before: true,
                    },
                );
                changed = true;
            }
        }
        if window.end < old.end {
            if let Some(index) = series.remove_from(window.end) {
                emit(
                    &self.events,
                    ConnectorEvent::PointsRemoved {
                        name: name.clone(),
                        index,
                        remove_before: false,
                    },
                );
                changed = true;
            }
        }

        if window.start < old.start {
            let reused = cached.clip(&TimeRange::new(window.start, old.start.min(window.end)));
            if !reused.is_empty() {
                series.prepend(&reused);
                emit(
                    &self.events,
                    ConnectorEvent::PointsAdded {
                        name: name.clone(),
                        points: reused,
                        add_before: true,
                    },
                );
                changed = true;
            }
            if window.start < cached.range.start {
                missing.push(TimeRange::new(window.start, cached.range.start));
            }
        }
        if window.end > old.end {
            let reused = cached.clip(&TimeRange::new(old.end.max(window.start), window.end));
            if !reused.is_empty() {
                series.append(&reused);
                emit(
                    &self.events,
                    ConnectorEvent::PointsAdded {
                        name: name.clone(),
                        points: reused,
                        add_before: false,
                    },
                );
                changed = true;
            }
            if cached.range.end < window.end {
                missing.push(TimeRange::new(cached.range.end, window.end));
            }
        }

        if changed {
            emit(&self.events, metrics_changed(name, series));
        }
        for range in missing {
            self.request(&key, range);
        }
    }
}

fn emit(events: &UnboundedSender<ConnectorEvent>, event: ConnectorEvent) {
    if events.send(event).is_err() {
        tracing::trace!("No consumer listening for connector events");
    }
}

fn series_ready(name: &str, series: &DisplayedSeries) -> ConnectorEvent {
    ConnectorEvent::SeriesReady {
        name: name.to_string(),
        unit: series.unit.clone(),
        points: series.points.clone(),
        extent: series.extent,
        magnitude: series.magnitude,
    }
}

fn metrics_changed(name: &str, series: &DisplayedSeries) -> ConnectorEvent {
    ConnectorEvent::MetricsChanged {
        name: name.to_string(),
        magnitude: series.magnitude,
        extent: series.extent,
    }
}
