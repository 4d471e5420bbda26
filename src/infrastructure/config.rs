use crate::application::ingestion_service::IngestSettings;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub store: StoreSettings,
    pub influx: Option<InfluxSettings>,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct StoreSettings {
    #[serde(default)]
    pub backend: StoreBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
    #[serde(default = "default_influx_batch")]
    pub max_batch_size: usize,
}

fn default_measurement() -> String {
    "telemetry".to_string()
}

fn default_influx_batch() -> usize {
    5000
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_batch_delay_ms")]
    pub inter_batch_delay_ms: u64,
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_batch_delay_ms: default_inter_batch_delay_ms(),
            write_timeout_secs: default_write_timeout_secs(),
            artifact_dir: default_artifact_dir(),
        }
    }
}

fn default_batch_size() -> usize {
    25
}

fn default_inter_batch_delay_ms() -> u64 {
    100
}

fn default_write_timeout_secs() -> u64 {
    10
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("failed_batches")
}

impl IngestConfig {
    pub fn settings(&self) -> IngestSettings {
        IngestSettings {
            batch_size: self.batch_size,
            inter_batch_delay: Duration::from_millis(self.inter_batch_delay_ms),
            write_timeout: Duration::from_secs(self.write_timeout_secs),
        }
    }
}

/// Load `<path>.{toml,yaml,json}` if present, then `TELEMETRY__*` environment overrides.
pub fn load_app_config(path: &str) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("TELEMETRY")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = load_app_config("does/not/exist").unwrap();
        assert_eq!(config.server.bind, "0.0.0.0:8080");
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert!(config.influx.is_none());

        let settings = config.ingest.settings();
        assert_eq!(settings.batch_size, 25);
        assert_eq!(settings.inter_batch_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_file_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("telemetry.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[store]
backend = "influx"

[influx]
host = "http://localhost:8086/"
token = "secret"
database = "iot"
retention_policy = "autogen"

[ingest]
batch_size = 10
artifact_dir = "/tmp/failed"
"#
        )
        .unwrap();

        let base = path.with_extension("");
        let config = load_app_config(base.to_str().unwrap()).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Influx);

        let influx = config.influx.unwrap();
        assert_eq!(influx.measurement, "telemetry");
        assert_eq!(influx.max_batch_size, 5000);
        assert_eq!(config.ingest.batch_size, 10);
        assert_eq!(config.ingest.write_timeout_secs, 10);
        assert_eq!(config.ingest.artifact_dir, PathBuf::from("/tmp/failed"));
    }
}
