// Connector service - One task owns the connector; handles talk to it over channels
use crate::application::connector::{Connector, ConnectorError, Snapshot};
use crate::application::importer::TransportReply;
use crate::domain::data_set::SavedDataSets;
use crate::domain::source::DataSourceDetails;
use crate::domain::telemetry::TimeRange;
use crate::infrastructure::cache_file::{self, CacheFileError};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

const COMMAND_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("connector service has stopped")]
    Stopped,
    #[error(transparent)]
    Connector(#[from] ConnectorError),
    #[error(transparent)]
    CacheFile(#[from] CacheFileError),
}

enum Command {
    Sources {
        reply: oneshot::Sender<Vec<DataSourceDetails>>,
    },
    ActiveSources {
        reply: oneshot::Sender<Vec<DataSourceDetails>>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
    Activate {
        source: DataSourceDetails,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
    Deactivate {
        source: DataSourceDetails,
        reply: oneshot::Sender<()>,
    },
    ClearAllActive {
        reply: oneshot::Sender<()>,
    },
    ResizeWindow {
        window: TimeRange,
        reply: oneshot::Sender<Result<(), ConnectorError>>,
    },
    ExportDataSets {
        reply: oneshot::Sender<SavedDataSets>,
    },
    ImportDataSets {
        saved: SavedDataSets,
        reply: oneshot::Sender<()>,
    },
    ExportPreferences {
        reply: oneshot::Sender<Vec<DataSourceDetails>>,
    },
    ImportPreferences {
        sources: Vec<DataSourceDetails>,
        reply: oneshot::Sender<()>,
    },
}

/// Cheap, cloneable access to the running [`ConnectorService`].
#[derive(Debug, Clone)]
pub struct ConnectorHandle {
    commands: mpsc::Sender<Command>,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Command::Sources { .. } => "Sources",
            Command::ActiveSources { .. } => "ActiveSources",
            Command::Snapshot { .. } => "Snapshot",
            Command::Activate { .. } => "Activate",
            Command::Deactivate { .. } => "Deactivate",
            Command::ClearAllActive { .. } => "ClearAllActive",
            Command::ResizeWindow { .. } => "ResizeWindow",
            Command::ExportDataSets { .. } => "ExportDataSets",
            Command::ImportDataSets { .. } => "ImportDataSets",
            Command::ExportPreferences { .. } => "ExportPreferences",
            Command::ImportPreferences { .. } => "ImportPreferences",
        };
        f.write_str(name)
    }
}

impl ConnectorHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, ServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(build(reply))
            .await
            .map_err(|_| ServiceError::Stopped)?;
        response.await.map_err(|_| ServiceError::Stopped)
    }

    pub async fn all_source_details(&self) -> Result<Vec<DataSourceDetails>, ServiceError> {
        self.call(|reply| Command::Sources { reply }).await
    }

    pub async fn active_sources(&self) -> Result<Vec<DataSourceDetails>, ServiceError> {
        self.call(|reply| Command::ActiveSources { reply }).await
    }

    pub async fn snapshot(&self) -> Result<Snapshot, ServiceError> {
        self.call(|reply| Command::Snapshot { reply }).await
    }

    pub async fn activate(&self, source: DataSourceDetails) -> Result<(), ServiceError> {
        Ok(self
            .call(|reply| Command::Activate { source, reply })
            .await??)
    }

    pub async fn deactivate(&self, source: DataSourceDetails) -> Result<(), ServiceError> {
        self.call(|reply| Command::Deactivate { source, reply }).await
    }

    pub async fn clear_all_active(&self) -> Result<(), ServiceError> {
        self.call(|reply| Command::ClearAllActive { reply }).await
    }

    pub async fn resize_window(&self, window: TimeRange) -> Result<(), ServiceError> {
        Ok(self
            .call(|reply| Command::ResizeWindow { window, reply })
            .await??)
    }

    /// Writes the displayed series to `path`; returns how many were saved.
    pub async fn save_data_sets(&self, path: &Path) -> Result<usize, ServiceError> {
        let saved = self.call(|reply| Command::ExportDataSets { reply }).await?;
        cache_file::write_data_sets(path, &saved).await?;
        Ok(saved.data_sets.len())
    }

    pub async fn load_data_sets(&self, path: &Path) -> Result<usize, ServiceError> {
        let saved = cache_file::read_data_sets(path).await?;
        let count = saved.data_sets.len();
        self.call(|reply| Command::ImportDataSets { saved, reply })
            .await?;
        Ok(count)
    }

    pub async fn save_preferences(&self, path: &Path) -> Result<usize, ServiceError> {
        let sources = self.call(|reply| Command::ExportPreferences { reply }).await?;
        cache_file::write_preferences(path, &sources).await?;
        Ok(sources.len())
    }

    pub async fn load_preferences(&self, path: &Path) -> Result<usize, ServiceError> {
        let sources = cache_file::read_preferences(path).await?;
        let count = sources.len();
        self.call(|reply| Command::ImportPreferences { sources, reply })
            .await?;
        Ok(count)
    }
}

pub struct ConnectorService {
    connector: Connector,
    commands: mpsc::Receiver<Command>,
    replies: mpsc::UnboundedReceiver<TransportReply>,
    stale_after: Duration,
    sweep_interval: Duration,
}

impl ConnectorService {
    pub fn new(
        connector: Connector,
        replies: mpsc::UnboundedReceiver<TransportReply>,
        stale_after: Duration,
        sweep_interval: Duration,
    ) -> (Self, ConnectorHandle) {
        let (tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let service = Self {
            connector,
            commands,
            replies,
            stale_after,
            sweep_interval,
        };
        (service, ConnectorHandle { commands: tx })
    }

    /// Runs until every handle is dropped.
    pub async fn run(mut self) {
        let mut sweep = tokio::time::interval(self.sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        sweep.tick().await;

        tracing::info!("Connector service started");
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                Some(reply) = self.replies.recv() => self.connector.on_reply(reply),
                _ = sweep.tick() => self.connector.evict_stale(self.stale_after),
            }
        }
        tracing::info!("Connector service stopped");
    }

    fn handle(&mut self, command: Command) {
        tracing::debug!("Handling {:?}", command);
        // A dropped receiver means the caller gave up waiting
        match command {
            Command::Sources { reply } => {
                let _ = reply.send(self.connector.all_source_details());
            }
            Command::ActiveSources { reply } => {
                let _ = reply.send(self.connector.active_sources().to_vec());
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.connector.snapshot());
            }
            Command::Activate { source, reply } => {
                let _ = reply.send(self.connector.activate(source));
            }
            Command::Deactivate { source, reply } => {
                self.connector.deactivate(&source);
                let _ = reply.send(());
            }
            Command::ClearAllActive { reply } => {
                self.connector.clear_all_active();
                let _ = reply.send(());
            }
            Command::ResizeWindow { window, reply } => {
                let _ = reply.send(self.connector.resize_window(window));
            }
            Command::ExportDataSets { reply } => {
                let _ = reply.send(self.connector.export_data_sets());
            }
            Command::ImportDataSets { saved, reply } => {
                self.connector.import_data_sets(saved);
                let _ = reply.send(());
            }
            Command::ExportPreferences { reply } => {
                let _ = reply.send(self.connector.export_preferences());
            }
            Command::ImportPreferences { sources, reply } => {
                self.connector.import_preferences(sources);
                let _ = reply.send(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::ConnectorEvent;
    use crate::application::importer::{FetchedData, ImportError, Importer, ReplyRecord};
    use crate::domain::data_type::{DataType, TypeSet};
    use crate::domain::source::SourceKey;
    use crate::domain::telemetry::{DataPoint, Extent};
    use chrono::{DateTime, TimeZone, Utc};
    use tokio::sync::mpsc::UnboundedSender;

    /// Answers every fetch at once with one point per hour of the range.
    struct EchoImporter {
        index: usize,
        replies: UnboundedSender<TransportReply>,
        pending: Vec<(String, SourceKey, TimeRange)>,
    }

    impl Importer for EchoImporter {
        fn source_name(&self) -> &str {
            "Echo"
        }

        fn available_types(&self) -> TypeSet {
            TypeSet::of(&[DataType::ElectricityConsumption])
        }

        fn available_locations(&self) -> Vec<String> {
            vec!["Finland".to_string()]
        }

        fn fetch(&mut self, types: TypeSet, range: TimeRange, location: &str) {
            for data_type in types.decompose() {
                let url = format!("echo://{}/{}", range.start.timestamp(), range.end.timestamp());
                self.pending
                    .push((url.clone(), SourceKey::new(data_type, location), range));

                let hours = range.duration().num_hours();
                let records = (0..hours)
                    .map(|h| ReplyRecord {
                        tag: None,
                        time: (range.start + chrono::Duration::hours(h)).to_rfc3339(),
                        value: h.to_string(),
                    })
                    .collect();
                self.replies
                    .send(TransportReply {
                        importer_index: self.index,
                        url,
                        records,
                    })
                    .unwrap();
            }
        }

        fn on_reply(
            &mut self,
            url: &str,
            records: Vec<ReplyRecord>,
        ) -> Result<Vec<FetchedData>, ImportError> {
            let position = self
                .pending
                .iter()
                .position(|(u, _, _)| u == url)
                .ok_or_else(|| ImportError::MalformedUrl(url.to_string()))?;
            let (_, key, range) = self.pending.remove(position);

            let points: Vec<DataPoint> = records
                .iter()
                .map(|r| {
                    DataPoint::new(
                        DateTime::parse_from_rfc3339(&r.time).unwrap().with_timezone(&Utc),
                        r.value.parse().unwrap(),
                    )
                })
                .collect();
            Ok(vec![FetchedData {
                key,
                unit: "MW".to_string(),
                importer_index: self.index,
                range,
                extent: Extent::of_points(&points),
                points,
            }])
        }

        fn evict_stale(&mut self, _max_age: Duration) -> Vec<(SourceKey, TimeRange)> {
            Vec::new()
        }
    }

    fn hours(start: i64, end: i64) -> TimeRange {
        TimeRange::new(
            Utc.timestamp_opt(start * 3600, 0).unwrap(),
            Utc.timestamp_opt(end * 3600, 0).unwrap(),
        )
    }

    fn start(window: TimeRange) -> (ConnectorHandle, mpsc::UnboundedReceiver<ConnectorEvent>) {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let importer = EchoImporter {
            index: 0,
            replies: reply_tx,
            pending: Vec::new(),
        };
        let connector = Connector::new(vec![Box::new(importer)], window, event_tx);
        let (service, handle) = ConnectorService::new(
            connector,
            reply_rx,
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        tokio::spawn(service.run());
        (handle, event_rx)
    }

    fn consumption() -> DataSourceDetails {
        DataSourceDetails::new("Echo", 0, DataType::ElectricityConsumption, "Finland")
    }

    #[tokio::test]
    async fn test_activation_round_trips_through_the_actor() {
        let (handle, mut events) = start(hours(0, 4));

        assert_eq!(handle.all_source_details().await.unwrap(), vec![consumption()]);
        handle.activate(consumption()).await.unwrap();

        match events.recv().await.unwrap() {
            ConnectorEvent::SeriesReady {
                name,
                points,
                magnitude,
                ..
            } => {
                assert_eq!(name, "Electricity Consumption, Finland");
                assert_eq!(points.len(), 4);
                assert_eq!(magnitude, 6.0);
            }
            other => panic!("unexpected event {:?}", other),
        }

        handle.resize_window(hours(2, 6)).await.unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectorEvent::PointsRemoved {
                index: 2,
                remove_before: true,
                ..
            }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectorEvent::MetricsChanged { .. }
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            ConnectorEvent::PointsAdded {
                add_before: false,
                ..
            }
        ));

        let snapshot = handle.snapshot().await.unwrap();
        assert_eq!(snapshot.window, hours(2, 6));
        assert_eq!(snapshot.series["Electricity Consumption, Finland"].points.len(), 4);
        assert_eq!(handle.active_sources().await.unwrap(), vec![consumption()]);
    }

    #[tokio::test]
    async fn test_errors_come_back_to_the_caller() {
        let (handle, _events) = start(hours(0, 4));

        assert!(matches!(
            handle.resize_window(hours(4, 4)).await,
            Err(ServiceError::Connector(ConnectorError::EmptyWindow { .. }))
        ));
        let unsupported = DataSourceDetails::new("Echo", 0, DataType::Temperature, "Oulu");
        assert!(matches!(
            handle.activate(unsupported).await,
            Err(ServiceError::Connector(ConnectorError::Unsupported(DataType::Temperature)))
        ));
        assert!(matches!(
            handle
                .load_preferences(Path::new("/nonexistent/preferences.json"))
                .await,
            Err(ServiceError::CacheFile(_))
        ));
    }

    #[tokio::test]
    async fn test_save_and_load_data_sets() {
        let (handle, mut events) = start(hours(0, 3));
        handle.activate(consumption()).await.unwrap();
        events.recv().await.unwrap();

        let path = std::env::temp_dir()
            .join(format!("connector-service-{}.json", std::process::id()));
        assert_eq!(handle.save_data_sets(&path).await.unwrap(), 1);
        assert_eq!(handle.save_preferences(&path.with_extension("prefs")).await.unwrap(), 1);

        let (restored, mut restored_events) = start(hours(100, 101));
        assert_eq!(restored.load_data_sets(&path).await.unwrap(), 1);
        assert_eq!(
            restored_events.recv().await.unwrap(),
            ConnectorEvent::SourceRestored {
                source: consumption()
            }
        );
        assert_eq!(restored.snapshot().await.unwrap().window, hours(0, 3));

        restored.activate(consumption()).await.unwrap();
        match restored_events.recv().await.unwrap() {
            ConnectorEvent::SeriesReady { points, .. } => assert_eq!(points.len(), 3),
            other => panic!("unexpected event {:?}", other),
        }

        assert_eq!(
            restored
                .load_preferences(&path.with_extension("prefs"))
                .await
                .unwrap(),
            1
        );
        assert!(restored.active_sources().await.unwrap().is_empty());

        std::fs::remove_file(&path).unwrap();
        std::fs::remove_file(path.with_extension("prefs")).unwrap();
    }
}
