// Importer capability and the shared segmented-fetch machinery
use crate::application::segmenter::Segmenter;
use crate::domain::data_type::{DataType, TypeSet};
use crate::domain::source::SourceKey;
use crate::domain::telemetry::{DataPoint, Extent, TimeRange};
use chrono::Duration;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// How the transport should turn a reply body into records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyFormat {
    Fmi,
    Fingrid,
}

/// One physical sub-request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub importer_index: usize,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub format: ReplyFormat,
}

/// One `(tag, time, value)` triple as found in a reply, still unparsed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplyRecord {
    pub tag: Option<String>,
    pub time: String,
    pub value: String,
}

/// A finished sub-request, tagged with the URL it was issued for.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportReply {
    pub importer_index: usize,
    pub url: String,
    pub records: Vec<ReplyRecord>,
}

/// Fire-and-forget network access. Replies come back as [`TransportReply`]s
/// through whatever channel the implementation was built with.
pub trait Transport: Send + Sync {
    fn issue_fetch(&self, request: FetchRequest);
}

/// The completed result of one logical fetch.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedData {
    pub key: SourceKey,
    pub unit: String,
    pub importer_index: usize,
    pub range: TimeRange,
    pub extent: Extent,
    pub points: Vec<DataPoint>,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("malformed request url: {0}")]
    MalformedUrl(String),
    #[error("unknown variable id {0}")]
    UnknownVariable(String),
}

/// A data provider.
pub trait Importer: Send {
    fn source_name(&self) -> &str;

    fn available_types(&self) -> TypeSet;

    fn available_locations(&self) -> Vec<String>;

    fn can_fetch(&self, data_type: DataType) -> bool {
        self.available_types().contains(data_type.into())
    }

    /// Splits `range` into provider-sized sub-requests for every supported
    /// type in `types` and issues them.
    fn fetch(&mut self, types: TypeSet, range: TimeRange, location: &str);

    /// Feeds one reply in and returns every logical fetch it completed.
    fn on_reply(
        &mut self,
        url: &str,
        records: Vec<ReplyRecord>,
    ) -> Result<Vec<FetchedData>, ImportError>;

    fn evict_stale(&mut self, max_age: std::time::Duration) -> Vec<(SourceKey, TimeRange)>;
}

/// Minimal ordered list of sub-ranges no longer than `max_span` that exactly
/// tile `range`.
pub fn split_range(range: TimeRange, max_span: Duration) -> Vec<TimeRange> {
    let total = range.duration().num_milliseconds();
    let span = max_span.num_milliseconds();
    if total <= 0 || span <= 0 {
        return Vec::new();
    }

    // Integer division rounded up
    let count = total / span + i64::from(total % span != 0);

    (0..count)
        .map(|i| {
            let start = range.start + Duration::milliseconds(span * i);
            let end = (start + max_span).min(range.end);
            TimeRange::new(start, end)
        })
        .collect()
}

/// Segmenter plus transport plumbing shared by every importer.
pub struct SegmentedImport {
    importer_index: usize,
    format: ReplyFormat,
    transport: Arc<dyn Transport>,
    segmenter: Segmenter,
}

impl SegmentedImport {
    pub fn new(importer_index: usize, format: ReplyFormat, transport: Arc<dyn Transport>) -> Self {
        Self {
            importer_index,
            format,
            transport,
            segmenter: Segmenter::new(),
        }
    }

    pub fn open(&mut self, key: SourceKey, range: TimeRange, segment_urls: &[String]) {
        self.segmenter.open_receptacle(key, range, segment_urls);
    }

    pub fn send(&self, url: &str, headers: &HashMap<String, String>) {
        self.transport.issue_fetch(FetchRequest {
            importer_index: self.importer_index,
            url: url.to_string(),
            headers: headers.clone(),
            format: self.format,
        });
    }

    pub fn push(&mut self, url: &str, data_type: DataType, point: DataPoint) {
        self.segmenter.push_point(url, data_type, point);
    }

    /// Closes the reply for `url` and converts completed receptacles into
    /// fetch results.
    pub fn finish(
        &mut self,
        url: &str,
        unit_of: impl Fn(DataType) -> String,
    ) -> Vec<FetchedData> {
        self.segmenter
            .take_completed(url)
            .into_iter()
            .map(|data| FetchedData {
                unit: unit_of(data.key.data_type),
                key: data.key,
                importer_index: self.importer_index,
                range: data.range,
                extent: data.extent,
                points: data.points,
            })
            .collect()
    }

    pub fn evict_stale(&mut self, max_age: std::time::Duration) -> Vec<(SourceKey, TimeRange)> {
        self.segmenter.evict_stale(max_age)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_split_range_uses_ceiling_division() {
        let parts = split_range(TimeRange::new(at(0), at(250)), Duration::seconds(100));
        assert_eq!(
            parts,
            vec![
                TimeRange::new(at(0), at(100)),
                TimeRange::new(at(100), at(200)),
                TimeRange::new(at(200), at(250)),
            ]
        );

        let exact = split_range(TimeRange::new(at(0), at(300)), Duration::seconds(100));
        assert_eq!(exact.len(), 3);
        assert_eq!(exact[2], TimeRange::new(at(200), at(300)));

        let short = split_range(TimeRange::new(at(0), at(30)), Duration::seconds(100));
        assert_eq!(short, vec![TimeRange::new(at(0), at(30))]);
    }

    #[test]
    fn test_split_range_empty_inputs() {
        assert!(split_range(TimeRange::new(at(10), at(10)), Duration::seconds(5)).is_empty());
        assert!(split_range(TimeRange::new(at(10), at(5)), Duration::seconds(5)).is_empty());
        assert!(split_range(TimeRange::new(at(0), at(10)), Duration::zero()).is_empty());
    }

    #[test]
    fn test_segmented_import_round_trip() {
        let transport = Arc::new(testing::RecordingTransport::default());
        let mut import = SegmentedImport::new(3, ReplyFormat::Fingrid, transport.clone());
        let key = SourceKey::new(DataType::WindPowerProduction, "Finland");
        let urls = vec!["u0".to_string(), "u1".to_string()];

        import.open(key.clone(), TimeRange::new(at(0), at(200)), &urls);
        for url in &urls {
            import.send(url, &HashMap::new());
        }
        let requests = transport.take();
        assert_eq!(requests.len(), 2);
        assert!(requests.iter().all(|r| r.importer_index == 3 && r.format == ReplyFormat::Fingrid));

        import.push("u1", DataType::WindPowerProduction, DataPoint::new(at(150), 900.0));
        assert!(import.finish("u1", |_| "MW".to_string()).is_empty());
        let done = import.finish("u0", |_| "MW".to_string());

        assert_eq!(done.len(), 1);
        assert_eq!(done[0].key, key);
        assert_eq!(done[0].unit, "MW");
        assert_eq!(done[0].importer_index, 3);
        assert_eq!(done[0].points, vec![DataPoint::new(at(150), 900.0)]);
    }
}
