use crate::domain::telemetry::TimeRange;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ConnectorConfig {
    pub server: ServerSettings,
    pub window: WindowSettings,
    pub fetch: FetchSettings,
    pub fmi: FmiSettings,
    pub fingrid: FingridSettings,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct WindowSettings {
    pub default_days: i64,
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self { default_days: 7 }
    }
}

impl WindowSettings {
    /// The last `default_days` days up to `now`.
    pub fn initial_window(&self, now: DateTime<Utc>) -> TimeRange {
        TimeRange::new(now - chrono::Duration::days(self.default_days), now)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FetchSettings {
    pub stale_after_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: 300,
            sweep_interval_secs: 30,
        }
    }
}

impl FetchSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        // tokio intervals panic on a zero period
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FmiSettings {
    pub base_url: String,
    pub max_span_hours: i64,
}

impl Default for FmiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://opendata.fmi.fi/wfs?request=getFeature&version=2.0.0".to_string(),
            max_span_hours: 6 * 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FingridSettings {
    pub base_url: String,
    pub max_span_hours: i64,
    pub api_key: Option<String>,
    pub api_key_path: Option<String>,
}

impl Default for FingridSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.fingrid.fi/v1/variable".to_string(),
            max_span_hours: 90 * 24,
            api_key: None,
            api_key_path: None,
        }
    }
}

impl FingridSettings {
    /// Inline key first, otherwise the first line of the key file.
    pub fn api_key(&self) -> anyhow::Result<String> {
        if let Some(key) = &self.api_key {
            return Ok(key.trim().to_string());
        }
        let Some(path) = &self.api_key_path else {
            tracing::warn!("No Fingrid API key configured, requests will be rejected");
            return Ok(String::new());
        };

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading Fingrid API key from {}", path))?;
        Ok(contents.lines().next().unwrap_or_default().trim().to_string())
    }
}

pub fn load_connector_config() -> anyhow::Result<ConnectorConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/connector").required(false))
        .add_source(
            config::Environment::with_prefix("CONNECTOR")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
