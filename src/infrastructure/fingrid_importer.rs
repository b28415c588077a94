// Fingrid electricity importer - One URL per variable and sub-range
use crate::application::importer::{
    split_range, FetchedData, ImportError, Importer, ReplyFormat, ReplyRecord, SegmentedImport,
    Transport,
};
use crate::domain::data_type::{DataType, TypeSet};
use crate::domain::source::SourceKey;
use crate::domain::telemetry::{DataPoint, TimeRange};
use crate::infrastructure::api_time::{format_api_time, parse_api_time, parse_api_value};
use crate::infrastructure::config::FingridSettings;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const FINGRID_SOURCE_NAME: &str = "Fingrid Oyj";
const API_KEY_HEADER: &str = "x-api-key";
const UNIT: &str = "MW";
const LOCATION: &str = "Finland";

const VARIABLES: [(DataType, &str); 8] = [
    (DataType::ElectricityConsumption, "193"),
    (DataType::ElectricityProduction, "192"),
    (DataType::NuclearPowerProduction, "188"),
    (DataType::HydroPowerProduction, "191"),
    (DataType::WindPowerProduction, "181"),
    (DataType::PredictedElectricityConsumption, "166"),
    (DataType::PredictedElectricityProduction, "242"),
    (DataType::PredictedWindPowerProduction, "245"),
];

fn variable_id(data_type: DataType) -> Option<&'static str> {
    VARIABLES
        .iter()
        .find(|(t, _)| *t == data_type)
        .map(|(_, id)| *id)
}

fn type_of_variable(id: &str) -> Option<DataType> {
    VARIABLES.iter().find(|(_, v)| *v == id).map(|(t, _)| *t)
}

pub struct FingridImporter {
    import: SegmentedImport,
    base_url: String,
    max_span: chrono::Duration,
    headers: HashMap<String, String>,
}

impl FingridImporter {
    pub fn new(
        importer_index: usize,
        settings: &FingridSettings,
        api_key: String,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            import: SegmentedImport::new(importer_index, ReplyFormat::Fingrid, transport),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            max_span: chrono::Duration::hours(settings.max_span_hours),
            headers: HashMap::from([(API_KEY_HEADER.to_string(), api_key)]),
        }
    }

    /// The variable id between the base URL and the next `/`.
    pub fn variable_id_from_url<'a>(&self, url: &'a str) -> Result<&'a str, ImportError> {
        let rest = url
            .strip_prefix(self.base_url.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(|| ImportError::MalformedUrl(url.to_string()))?;

        match rest.split_once('/') {
            Some((id, _)) if !id.is_empty() => Ok(id),
            _ => Err(ImportError::MalformedUrl(url.to_string())),
        }
    }
}

impl Importer for FingridImporter {
    fn source_name(&self) -> &str {
        FINGRID_SOURCE_NAME
    }

    fn available_types(&self) -> TypeSet {
        let types: Vec<DataType> = VARIABLES.iter().map(|(t, _)| *t).collect();
        TypeSet::of(&types)
    }

    fn available_locations(&self) -> Vec<String> {
        vec![LOCATION.to_string()]
    }

    /// Fingrid only covers the whole country, so `location` only names the
    /// resulting series.
    fn fetch(&mut self, types: TypeSet, range: TimeRange, location: &str) {
        let sub_ranges = split_range(range, self.max_span);
        if sub_ranges.is_empty() {
            return;
        }

        for data_type in types.decompose() {
            let Some(id) = variable_id(data_type) else {
                tracing::debug!("Fingrid has no variable for {}", data_type.name());
                continue;
            };

            let urls: Vec<String> = sub_ranges
                .iter()
                .map(|r| {
                    format!(
                        "{}/{}/events/xml?start_time={}&end_time={}",
                        self.base_url,
                        id,
                        format_api_time(r.start),
                        format_api_time(r.end)
                    )
                })
                .collect();

            self.import
                .open(SourceKey::new(data_type, location), range, &urls);
            for url in &urls {
                self.import.send(url, &self.headers);
            }
        }
    }

    fn on_reply(
        &mut self,
        url: &str,
        records: Vec<ReplyRecord>,
    ) -> Result<Vec<FetchedData>, ImportError> {
        let id = self.variable_id_from_url(url)?;
        let data_type =
            type_of_variable(id).ok_or_else(|| ImportError::UnknownVariable(id.to_string()))?;

        let mut skipped = 0usize;
        for record in records {
            match (parse_api_time(&record.time), parse_api_value(&record.value)) {
                (Some(time), Some(value)) => {
                    self.import.push(url, data_type, DataPoint::new(time, value))
                }
                _ => skipped += 1,
            }
        }
        if skipped > 0 {
            tracing::trace!("Skipped {} Fingrid records from {}", skipped, url);
        }

        Ok(self.import.finish(url, |_| UNIT.to_string()))
    }

    fn evict_stale(&mut self, max_age: Duration) -> Vec<(SourceKey, TimeRange)> {
        self.import.evict_stale(max_age)
    }
}
