use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/setct.yaml", "setct.yaml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Unable to read config file {0}: {1}")]
    Io(String, std::io::Error),
    #[error("Unable to parse config file {0}: {1}")]
    Yaml(String, serde_yml::Error),
}

fn mqtt_host_default() -> String { return "localhost".to_string() }
fn mqtt_port_default() -> u16 { return 1883 }
fn mqtt_client_name_default() -> String { return "setct".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct MqttConfig {
    #[serde(default="mqtt_host_default")]
    pub host: String,
    #[serde(default="mqtt_port_default")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub pass: Option<String>,
    #[serde(default="mqtt_client_name_default")]
    pub client_name: String,
}

fn gateway_topic_prefix_default() -> String { return "conectric".to_string() }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct GatewayConfig {
    #[serde(default="gateway_topic_prefix_default")]
    pub topic_prefix: String,
}

impl GatewayConfig {
    pub fn request_topic(&self) -> String {
        return format!("{}/rs485/request", self.topic_prefix);
    }

    pub fn message_topic(&self) -> String {
        return format!("{}/message", self.topic_prefix);
    }
}

fn provisioning_settle_delay_ms_default() -> u64 { return 2000 }

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct ProvisioningConfig {
    /* Pause before the identify message of every meter */
    #[serde(default="provisioning_settle_delay_ms_default")]
    pub settle_delay_ms: u64,
    /* Without a timeout a meter that never answers blocks the batch */
    #[serde(default)]
    pub step_timeout_secs: Option<u64>,
}

impl ProvisioningConfig {
    pub fn settle_delay(&self) -> Duration {
        return Duration::from_millis(self.settle_delay_ms);
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        return self.step_timeout_secs.map(Duration::from_secs);
    }
}

fn mqtt_default() -> MqttConfig {
    return MqttConfig {
        host: mqtt_host_default(),
        port: mqtt_port_default(),
        user: None,
        pass: None,
        client_name: mqtt_client_name_default(),
    }
}
fn gateway_default() -> GatewayConfig { return GatewayConfig { topic_prefix: gateway_topic_prefix_default() } }
fn provisioning_default() -> ProvisioningConfig {
    return ProvisioningConfig { settle_delay_ms: provisioning_settle_delay_ms_default(), step_timeout_secs: None }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct AppConfig {
    #[serde(default="mqtt_default")]
    pub mqtt: MqttConfig,
    #[serde(default="gateway_default")]
    pub gateway: GatewayConfig,
    #[serde(default="provisioning_default")]
    pub provisioning: ProvisioningConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        return AppConfig {
            mqtt: mqtt_default(),
            gateway: gateway_default(),
            provisioning: provisioning_default(),
        }
    }
}

impl AppConfig {
    /// Loads the given file, or the first of the default locations that does
    /// exist. No file at all means running with the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }

        for candidate in DEFAULT_CONFIG_PATHS {
            let candidate = Path::new(candidate);
            if candidate.exists() {
                return Self::from_file(candidate);
            }
        }

        info!("No config file found, using defaults");
        return Ok(AppConfig::default());
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let name = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io(name.clone(), e))?;
        let config: AppConfig = serde_yml::from_str(&contents).map_err(|e| ConfigError::Yaml(name.clone(), e))?;

        debug!("Config loaded from {name}");
        return Ok(config);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.provisioning.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.provisioning.step_timeout(), None);
        assert_eq!(config.gateway.request_topic(), "conectric/rs485/request");
        assert_eq!(config.gateway.message_topic(), "conectric/message");
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "mqtt:\n  host: broker.local\n  user: setct\n  pass: secret\nprovisioning:\n  step_timeout_secs: 30\n").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.mqtt.host, "broker.local");
        assert_eq!(config.mqtt.port, 1883);
        assert_eq!(config.mqtt.user.as_deref(), Some("setct"));
        assert_eq!(config.provisioning.settle_delay_ms, 2000);
        assert_eq!(config.provisioning.step_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.gateway, gateway_default());
    }

    #[test]
    fn test_explicit_missing_file_fails() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/setct.yaml")));
        assert!(matches!(result, Err(ConfigError::Io(_, _))));
    }

    #[test]
    fn test_broken_file_fails() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "mqtt: [not, a, map]\n").unwrap();
        assert!(matches!(AppConfig::from_file(file.path()), Err(ConfigError::Yaml(_, _))));
    }
}
