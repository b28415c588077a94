// Application state for HTTP handlers
use crate::application::connector_service::ConnectorHandle;

#[derive(Clone)]
pub struct AppState {
    pub connector: ConnectorHandle,
}
