// JSON files for saved data sets and source preferences
use crate::domain::data_set::SavedDataSets;
use crate::domain::source::DataSourceDetails;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheFileError {
    #[error("cache file io: {0}")]
    Io(#[from] std::io::Error),
    #[error("cache file format: {0}")]
    Format(#[from] serde_json::Error),
}

pub async fn write_data_sets(path: &Path, saved: &SavedDataSets) -> Result<(), CacheFileError> {
    write_json(path, saved).await
}

pub async fn read_data_sets(path: &Path) -> Result<SavedDataSets, CacheFileError> {
    read_json(path).await
}

pub async fn write_preferences(
    path: &Path,
    sources: &[DataSourceDetails],
) -> Result<(), CacheFileError> {
    write_json(path, &sources).await
}

pub async fn read_preferences(path: &Path) -> Result<Vec<DataSourceDetails>, CacheFileError> {
    read_json(path).await
}

async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), CacheFileError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = serde_json::to_vec_pretty(value)?;
    tokio::fs::write(path, &body).await?;
    tracing::debug!("Wrote {} bytes to {}", body.len(), path.display());
    Ok(())
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, CacheFileError> {
    let body = tokio::fs::read(path).await?;
    Ok(serde_json::from_slice(&body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data_set::DataSet;
    use crate::domain::data_type::DataType;
    use crate::domain::telemetry::{DataPoint, TimeRange};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("weather-electric-{}-{}", name, std::process::id()))
    }

    #[tokio::test]
    async fn test_data_sets_survive_a_file() {
        let dir = scratch_dir("data-sets");
        let path = dir.join("nested").join("data_sets.json");
        let saved = SavedDataSets {
            window: TimeRange::new(
                Utc.timestamp_opt(0, 0).unwrap(),
                Utc.timestamp_opt(3600, 0).unwrap(),
            ),
            data_sets: vec![DataSet {
                source: DataSourceDetails::new(
                    "Fingrid",
                    1,
                    DataType::WindPowerProduction,
                    "Finland",
                ),
                unit: "MW".to_string(),
                points: vec![DataPoint::new(Utc.timestamp_opt(60, 0).unwrap(), 1200.5)],
                min: Some(1200.5),
                max: Some(1200.5),
                magnitude: 1200.5,
            }],
        };

        write_data_sets(&path, &saved).await.unwrap();
        let loaded = read_data_sets(&path).await.unwrap();
        assert_eq!(loaded, saved);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_series_keeps_missing_bounds() {
        let dir = scratch_dir("empty");
        let path = dir.join("data_sets.json");
        let saved = SavedDataSets {
            window: TimeRange::new(
                Utc.timestamp_opt(0, 0).unwrap(),
                Utc.timestamp_opt(10, 0).unwrap(),
            ),
            data_sets: vec![DataSet {
                source: DataSourceDetails::new("FMI", 0, DataType::Temperature, "Oulu"),
                unit: "C".to_string(),
                points: Vec::new(),
                min: None,
                max: None,
                magnitude: 0.0,
            }],
        };

        write_data_sets(&path, &saved).await.unwrap();
        let loaded = read_data_sets(&path).await.unwrap();
        assert!(loaded.data_sets[0].extent().is_empty());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn test_preferences_and_errors() {
        let dir = scratch_dir("preferences");
        let path = dir.join("preferences.json");
        let sources = vec![
            DataSourceDetails::new("FMI", 0, DataType::Temperature, "Helsinki"),
            DataSourceDetails::new("Fingrid", 1, DataType::NuclearPowerProduction, "Finland"),
        ];

        write_preferences(&path, &sources).await.unwrap();
        assert_eq!(read_preferences(&path).await.unwrap(), sources);

        assert!(matches!(
            read_preferences(&dir.join("missing.json")).await,
            Err(CacheFileError::Io(_))
        ));
        tokio::fs::write(&path, b"{not json").await.unwrap();
        assert!(matches!(
            read_preferences(&path).await,
            Err(CacheFileError::Format(_))
        ));

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }
}
