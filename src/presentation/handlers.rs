// HTTP request handlers
use crate::application::connector::{ConnectorError, Snapshot};
use crate::application::connector_service::ServiceError;
use crate::domain::source::DataSourceDetails;
use crate::domain::telemetry::{DataPoint, TimeRange};
use crate::presentation::app_state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct WindowRequest {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct FileRequest {
    pub path: PathBuf,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct FileResult {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct SeriesView {
    pub name: String,
    pub unit: String,
    pub points: Vec<DataPoint>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub magnitude: f64,
}

#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub window: TimeRange,
    pub series: Vec<SeriesView>,
}

impl From<Snapshot> for SnapshotView {
    fn from(snapshot: Snapshot) -> Self {
        let series = snapshot
            .series
            .into_iter()
            .map(|(name, series)| {
                let bounds = series.extent.bounds();
                SeriesView {
                    name,
                    unit: series.unit,
                    points: series.points,
                    min: bounds.map(|(min, _)| min),
                    max: bounds.map(|(_, max)| max),
                    magnitude: series.magnitude,
                }
            })
            .collect();

        Self {
            window: snapshot.window,
            series,
        }
    }
}

/// Maps service failures onto status codes.
#[derive(Debug)]
pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(error: ServiceError) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::Stopped => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Connector(ConnectorError::EmptyWindow { .. }) => StatusCode::BAD_REQUEST,
            ServiceError::Connector(ConnectorError::Unsupported(_)) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            ServiceError::CacheFile(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!("Request failed: {}", self.0);
        (status, self.0.to_string()).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// Every source that can be activated
pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DataSourceDetails>>, ApiError> {
    Ok(Json(state.connector.all_source_details().await?))
}

/// Current window and displayed series
pub async fn get_series(
    State(state): State<Arc<AppState>>,
) -> Result<Json<SnapshotView>, ApiError> {
    Ok(Json(state.connector.snapshot().await?.into()))
}

pub async fn activate_series(
    State(state): State<Arc<AppState>>,
    Json(source): Json<DataSourceDetails>,
) -> Result<StatusCode, ApiError> {
    state.connector.activate(source).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn deactivate_series(
    State(state): State<Arc<AppState>>,
    Json(source): Json<DataSourceDetails>,
) -> Result<StatusCode, ApiError> {
    state.connector.deactivate(source).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn resize_window(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WindowRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .connector
        .resize_window(TimeRange::new(request.start, request.end))
        .await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn save_data_sets(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> Result<Json<FileResult>, ApiError> {
    let count = state.connector.save_data_sets(&request.path).await?;
    Ok(Json(FileResult { count }))
}

pub async fn load_data_sets(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> Result<Json<FileResult>, ApiError> {
    let count = state.connector.load_data_sets(&request.path).await?;
    Ok(Json(FileResult { count }))
}

pub async fn save_preferences(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> Result<Json<FileResult>, ApiError> {
    let count = state.connector.save_preferences(&request.path).await?;
    Ok(Json(FileResult { count }))
}

pub async fn load_preferences(
    State(state): State<Arc<AppState>>,
    Json(request): Json<FileRequest>,
) -> Result<Json<FileResult>, ApiError> {
    let count = state.connector.load_preferences(&request.path).await?;
    Ok(Json(FileResult { count }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::connector::Connector;
    use crate::application::connector_service::ConnectorService;
    use crate::application::importer::testing::RecordingTransport;
    use crate::domain::data_type::DataType;
    use crate::infrastructure::config::FmiSettings;
    use crate::infrastructure::fmi_importer::{FmiImporter, FMI_SOURCE_NAME};
    use chrono::TimeZone;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn state() -> (Arc<AppState>, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        let importer = FmiImporter::new(0, &FmiSettings::default(), transport.clone());
        let (_reply_tx, reply_rx) = mpsc::unbounded_channel();
        let (event_tx, _event_rx) = mpsc::unbounded_channel();
        let window = TimeRange::new(
            Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2021, 4, 2, 0, 0, 0).unwrap(),
        );
        let connector = Connector::new(vec![Box::new(importer)], window, event_tx);
        let (service, handle) = ConnectorService::new(
            connector,
            reply_rx,
            Duration::from_secs(300),
            Duration::from_secs(30),
        );
        tokio::spawn(service.run());
        (Arc::new(AppState { connector: handle }), transport)
    }

    #[tokio::test]
    async fn test_sources_and_activation() {
        let (state, transport) = state();

        let Json(sources) = list_sources(State(state.clone())).await.unwrap();
        assert_eq!(sources.len(), 81);
        assert!(sources.iter().all(|s| s.source_name == FMI_SOURCE_NAME));

        let source = DataSourceDetails::new(FMI_SOURCE_NAME, 0, DataType::Temperature, "Hanko");
        let status = activate_series(State(state.clone()), Json(source.clone()))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(transport.take().len(), 1);

        let Json(view) = get_series(State(state.clone())).await.unwrap();
        assert!(view.series.is_empty());

        let status = deactivate_series(State(state), Json(source)).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let (state, _) = state();
        let at = Utc.with_ymd_and_hms(2021, 4, 1, 0, 0, 0).unwrap();

        let error = resize_window(State(state.clone()), Json(WindowRequest { start: at, end: at }))
            .await
            .unwrap_err();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);

        let electricity =
            DataSourceDetails::new(FMI_SOURCE_NAME, 0, DataType::ElectricityProduction, "Finland");
        let error = activate_series(State(state.clone()), Json(electricity))
            .await
            .unwrap_err();
        assert_eq!(error.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let error = load_data_sets(
            State(state),
            Json(FileRequest {
                path: PathBuf::from("/nonexistent/data_sets.json"),
            }),
        )
        .await
        .unwrap_err();
        assert_eq!(error.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
