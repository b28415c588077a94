// FMI weather importer - One URL per stored query and sub-range, shared by every type in the query
use crate::application::importer::{
    split_range, FetchedData, ImportError, Importer, ReplyFormat, ReplyRecord, SegmentedImport,
    Transport,
};
use crate::domain::data_type::{DataType, TypeSet};
use crate::domain::source::SourceKey;
use crate::domain::telemetry::{DataPoint, TimeRange};
use crate::infrastructure::api_time::{format_api_time, parse_api_time, parse_api_value};
use crate::infrastructure::config::FmiSettings;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const FMI_SOURCE_NAME: &str = "Finnish Meteorological Institute";

const PLACES: [&str; 9] = [
    "Pirkkala",
    "Helsinki",
    "Kuopio",
    "Oulu",
    "Rovaniemi",
    "Vaasa",
    "Utsjoki",
    "Hanko",
    "Lappeenranta",
];

/// Types served by each stored query, with the query's URL parameters.
const QUERY_GROUPS: [(&[DataType], &str); 3] = [
    (
        &[DataType::Temperature, DataType::WindSpeed, DataType::CloudAmount],
        "&storedquery_id=fmi::observations::weather::simple",
    ),
    (
        &[
            DataType::PredictedTemperature,
            DataType::PredictedWindSpeed,
            DataType::PredictedCloudAmount,
        ],
        "&storedquery_id=fmi::forecast::hirlam::surface::point::simple",
    ),
    (
        &[
            DataType::AverageTemperature,
            DataType::AverageMinTemperature,
            DataType::AverageMaxTemperature,
        ],
        "&storedquery_id=fmi::observations::weather::hourly::simple&timestep=1440",
    ),
];

fn parameter_code(data_type: DataType) -> Option<&'static str> {
    match data_type {
        DataType::Temperature => Some("t2m"),
        DataType::WindSpeed => Some("ws_10min"),
        DataType::CloudAmount => Some("n_man"),
        DataType::PredictedTemperature => Some("temperature"),
        DataType::PredictedWindSpeed => Some("windspeedms"),
        DataType::PredictedCloudAmount => Some("totalcloudcover"),
        DataType::AverageTemperature => Some("TA_PT1H_AVG"),
        DataType::AverageMinTemperature => Some("TA_PT1H_MIN"),
        DataType::AverageMaxTemperature => Some("TA_PT1H_MAX"),
        _ => None,
    }
}

fn type_of_code(code: &str) -> Option<DataType> {
    DataType::ALL
        .iter()
        .copied()
        .find(|t| parameter_code(*t) == Some(code))
}

fn unit_of(data_type: DataType) -> &'static str {
    match data_type {
        DataType::WindSpeed | DataType::PredictedWindSpeed => "m/s",
        DataType::CloudAmount => "oktas",
        DataType::PredictedCloudAmount => "%",
        _ => "C",
    }
}

pub struct FmiImporter {
    import: SegmentedImport,
    base_url: String,
    max_span: chrono::Duration,
}

impl FmiImporter {
    pub fn new(
        importer_index: usize,
        settings: &FmiSettings,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            import: SegmentedImport::new(importer_index, ReplyFormat::Fmi, transport),
            base_url: settings.base_url.clone(),
            max_span: chrono::Duration::hours(settings.max_span_hours),
        }
    }

    fn request_url(
        &self,
        stored_query: &str,
        location: &str,
        range: &TimeRange,
        parameters: &str,
    ) -> String {
        format!(
            "{}{}&place={}&starttime={}&endtime={}&parameters={}",
            self.base_url,
            stored_query,
            urlencoding::encode(location),
            format_api_time(range.start),
            format_api_time(range.end),
            parameters
        )
    }
}

impl Importer for FmiImporter {
    fn source_name(&self) -> &str {
        FMI_SOURCE_NAME
    }

    fn available_types(&self) -> TypeSet {
        TypeSet::of(&DataType::ALL[..9])
    }

    fn available_locations(&self) -> Vec<String> {
        PLACES.iter().map(|p| p.to_string()).collect()
    }

    fn fetch(&mut self, types: TypeSet, range: TimeRange, location: &str) {
        let requested = types.intersect(self.available_types()).decompose();
        let sub_ranges = split_range(range, self.max_span);
        if requested.is_empty() || sub_ranges.is_empty() {
            tracing::debug!("Nothing to fetch from FMI for {} in {}", types.name(), location);
            return;
        }

        for (group_types, stored_query) in QUERY_GROUPS {
            let group: Vec<DataType> = requested
                .iter()
                .copied()
                .filter(|t| group_types.contains(t))
                .collect();
            if group.is_empty() {
                continue;
            }

            let parameters = group
                .iter()
                .filter_map(|t| parameter_code(*t))
                .collect::<Vec<_>>()
                .join(",");
            let urls: Vec<String> = sub_ranges
                .iter()
                .map(|r| self.request_url(stored_query, location, r, &parameters))
                .collect();

            for data_type in &group {
                self.import
                    .open(SourceKey::new(*data_type, location), range, &urls);
            }
            for url in &urls {
                self.import.send(url, &HashMap::new());
            }
        }
    }

    fn on_reply(
        &mut self,
        url: &str,
        records: Vec<ReplyRecord>,
    ) -> Result<Vec<FetchedData>, ImportError> {
        let mut skipped = 0usize;
        for record in records {
            let Some(data_type) = record.tag.as_deref().and_then(type_of_code) else {
                skipped += 1;
                continue;
            };
            match (parse_api_time(&record.time), parse_api_value(&record.value)) {
                (Some(time), Some(value)) => {
                    self.import.push(url, data_type, DataPoint::new(time, value))
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::trace!("Skipped {} FMI records from {}", skipped, url);
        }

        Ok(self.import.finish(url, |t| unit_of(t).to_string()))
    }

    fn evict_stale(&mut self, max_age: Duration) -> Vec<(SourceKey, TimeRange)> {
        self.import.evict_stale(max_age)
    }
}
