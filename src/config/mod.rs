use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use crate::obis_utils::{normalize_obis_code, validate_obis_code};
use crate::p1::definitions::default_metric_definitions;
use crate::p1::registry::MetricDefinition;

/// Environment variable pointing to the config file
pub const CONFIG_PATH_ENV: &str = "P1M_CONFIG";
const CONFIG_SEARCH_PATHS: [&str; 2] = ["config/p1meter.yaml", "p1meter.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read the config on {}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Unable to parse config file: {0}")]
    Parse(#[from] serde_yml::Error),
    #[error("No config found, looked at config/p1meter.yaml and p1meter.yaml")]
    NotFound,
    #[error("Interval {0} must be greater than zero")]
    ZeroInterval(&'static str),
    #[error("Metric {0} has an invalid OBIS code {1}")]
    InvalidObisCode(String, String),
    #[error("No metrics configured")]
    EmptyMetricList,
}

fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "p1meter".to_string() }
fn mqtt_root_topic_default() -> String { return "sensors/power/p1meter".to_string() }
fn mqtt_status_topic_default() -> String { return "hass/status".to_string() }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub pass: String,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
    /// Readings go to <root_topic>/<metric name>
    #[serde(default="mqtt_root_topic_default")]
    pub root_topic: String,
    #[serde(default="mqtt_status_topic_default")]
    pub status_topic: String,
    #[serde(default)]
    pub qos: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum P1Source {
    /// Serial device node, opened 8N1 at the given baud rate
    Serial {
        path: PathBuf,
        #[serde(default="p1_baud_rate_default")]
        baud_rate: u32,
    },
    /// Serial to network bridge like ser2net
    Tcp { host: String, port: u16 },
    Stdin,
}

fn p1_baud_rate_default() -> u32 { return 115_200 }
fn p1_update_interval_default() -> u64 { return 60_000 }
fn p1_full_refresh_interval_default() -> u64 { return 1_800_000 }
fn p1_poll_interval_default() -> u64 { return 50 }
fn p1_reconnect_delay_default() -> u64 { return 5_000 }
fn p1_metrics_default() -> Vec<MetricDefinition> { return default_metric_definitions() }

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct P1Config {
    pub source: P1Source,
    #[serde(default="p1_update_interval_default")]
    pub update_interval_ms: u64,
    #[serde(default="p1_full_refresh_interval_default")]
    pub full_refresh_interval_ms: u64,
    #[serde(default="p1_poll_interval_default")]
    pub poll_interval_ms: u64,
    #[serde(default="p1_reconnect_delay_default")]
    pub reconnect_delay_ms: u64,
    #[serde(default="p1_metrics_default")]
    pub metrics: Vec<MetricDefinition>,
}

impl P1Config {
    pub fn update_interval(&self) -> Duration { Duration::from_millis(self.update_interval_ms) }
    pub fn full_refresh_interval(&self) -> Duration { Duration::from_millis(self.full_refresh_interval_ms) }
    pub fn poll_interval(&self) -> Duration { Duration::from_millis(self.poll_interval_ms) }
    pub fn reconnect_delay(&self) -> Duration { Duration::from_millis(self.reconnect_delay_ms) }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub p1: P1Config,
}

impl Config {
    /// Loads the config from the path in P1M_CONFIG or one of the default locations.
    pub fn load() -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Self::load_from(Path::new(&path));
        }

        for path in CONFIG_SEARCH_PATHS {
            let path = Path::new(path);
            if path.exists() {
                return Self::load_from(path);
            }
            debug!("No config at {}", path.display());
        }

        Err(ConfigError::NotFound)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading config from {}", path.display());
        let contents = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::parse(&contents)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        let p1 = &mut self.p1;

        if p1.update_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("update_interval_ms"));
        }
        if p1.full_refresh_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("full_refresh_interval_ms"));
        }
        if p1.poll_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval("poll_interval_ms"));
        }
        if p1.full_refresh_interval_ms < p1.update_interval_ms {
            warn!("Full refresh every {}ms is shorter than the update interval of {}ms",
                  p1.full_refresh_interval_ms, p1.update_interval_ms);
        }

        if p1.metrics.is_empty() {
            return Err(ConfigError::EmptyMetricList);
        }
        for metric in p1.metrics.iter_mut() {
            metric.code = normalize_obis_code(&metric.code);
            if !validate_obis_code(&metric.code) {
                return Err(ConfigError::InvalidObisCode(metric.name.clone(), metric.code.clone()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
mqtt:
  host: 192.168.1.10
p1:
  source:
    type: tcp
    host: 192.168.1.20
    port: 2001
"#;

    #[test]
    fn test_defaults() {
        let config = Config::parse(MINIMAL).unwrap();

        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.client_name, "p1meter");
        assert_eq!(config.mqtt.root_topic, "sensors/power/p1meter");
        assert_eq!(config.mqtt.status_topic, "hass/status");
        assert_eq!(config.mqtt.qos, 0);
        assert!(config.mqtt.user.is_empty());

        assert_eq!(config.p1.source, P1Source::Tcp { host: "192.168.1.20".to_string(), port: 2001 });
        assert_eq!(config.p1.update_interval(), Duration::from_secs(60));
        assert_eq!(config.p1.full_refresh_interval(), Duration::from_secs(1800));
        assert_eq!(config.p1.metrics, default_metric_definitions());
    }

    #[test]
    fn test_custom_metrics() {
        let yaml = r#"
mqtt:
  host: broker
p1:
  source:
    type: stdin
  metrics:
    - name: consumption
      code: " 1-0:1.8.1 "
      end_delimiter: "*"
    - name: tariff
      code: "0-0:96.14.0"
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.p1.source, P1Source::Stdin);
        assert_eq!(config.p1.metrics, vec![
            MetricDefinition::with_unit("consumption", "1-0:1.8.1"),
            MetricDefinition::new("tariff", "0-0:96.14.0"),
        ]);
    }

    #[test]
    fn test_serial_source() {
        let yaml = "mqtt:\n  host: broker\np1:\n  source:\n    type: serial\n    path: /dev/ttyUSB0\n";
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.p1.source, P1Source::Serial { path: PathBuf::from("/dev/ttyUSB0"), baud_rate: 115_200 });

        let yaml = format!("{yaml}    baud_rate: 9600\n");
        let config = Config::parse(&yaml).unwrap();
        assert_eq!(config.p1.source, P1Source::Serial { path: PathBuf::from("/dev/ttyUSB0"), baud_rate: 9600 });
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let yaml = format!("{MINIMAL}  update_interval_ms: 0\n");
        assert!(matches!(Config::parse(&yaml), Err(ConfigError::ZeroInterval("update_interval_ms"))));
    }

    #[test]
    fn test_invalid_obis_code_is_rejected() {
        let yaml = format!("{MINIMAL}  metrics:\n    - name: broken\n      code: \"1-0:1.8\"\n");
        assert!(matches!(Config::parse(&yaml), Err(ConfigError::InvalidObisCode(_, _))));
    }

    #[test]
    fn test_storage_suffix_is_rejected() {
        let yaml = format!("{MINIMAL}  metrics:\n    - name: consumption\n      code: \"1-0:1.8.1*255\"\n");
        assert!(matches!(Config::parse(&yaml),
                         Err(ConfigError::InvalidObisCode(name, code)) if name == "consumption" && code == "1-0:1.8.1*255"));
    }

    #[test]
    fn test_empty_metrics_are_rejected() {
        let yaml = format!("{MINIMAL}  metrics: []\n");
        assert!(matches!(Config::parse(&yaml), Err(ConfigError::EmptyMetricList)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MINIMAL.as_bytes()).unwrap();

        let config = Config::load_from(file.path()).unwrap();
        assert_eq!(config.mqtt.host, "192.168.1.10");

        let missing = file.path().with_extension("missing");
        assert!(matches!(Config::load_from(&missing), Err(ConfigError::Io(_, _))));
    }
}
