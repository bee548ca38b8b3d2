//! Configuration Vault – reads/writes `~/.lockscan/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lockscan_middleware::MqttConfig;
use lockscan_runtime::SessionConfig;
use lockscan_types::ParseFailurePolicy;
use zeroize::Zeroize;

/// Persisted scanner configuration stored in `~/.lockscan/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hostname of the MQTT broker.
    #[serde(default = "default_broker_host")]
    pub broker_host: String,

    /// Broker port (8883 is MQTT over TLS).
    #[serde(default = "default_broker_port")]
    pub broker_port: u16,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,

    /// Broker password (stored as plain text – the file is written owner-only).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,

    /// CA certificate (PEM) the broker certificate must chain to.  An empty
    /// path disables TLS.
    #[serde(default = "default_ca_cert")]
    pub ca_cert: PathBuf,

    /// Topic every scanned record is published to.
    #[serde(default = "default_topic")]
    pub topic: String,

    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// MQTT QoS level (0, 1 or 2).
    #[serde(default)]
    pub qos: u8,

    /// Add the `"state": true` active flag to published records.
    #[serde(default = "default_include_state")]
    pub include_state: bool,

    #[serde(default)]
    pub on_parse_error: ParseFailurePolicy,

    /// `device:<index|name>` for a live camera, otherwise a directory of
    /// frames or a single image file.
    #[serde(default = "default_camera_source")]
    pub camera_source: String,

    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("broker_host", &self.broker_host)
            .field("broker_port", &self.broker_port)
            .field("username", &self.username)
            .field(
                "password",
                if self.password.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("ca_cert", &self.ca_cert)
            .field("topic", &self.topic)
            .field("client_id", &self.client_id)
            .field("qos", &self.qos)
            .field("include_state", &self.include_state)
            .field("on_parse_error", &self.on_parse_error)
            .field("camera_source", &self.camera_source)
            .finish()
    }
}

impl Drop for Config {
    fn drop(&mut self) {
        self.password.zeroize();
    }
}

fn default_broker_host() -> String {
    "localhost".to_string()
}
fn default_broker_port() -> u16 {
    8883
}
fn default_ca_cert() -> PathBuf {
    PathBuf::from("cert.crt")
}
fn default_topic() -> String {
    "lockit".to_string()
}
fn default_client_id() -> String {
    "lockscan".to_string()
}
fn default_keep_alive_secs() -> u64 {
    60
}
fn default_include_state() -> bool {
    true
}
fn default_camera_source() -> String {
    "device:0".to_string()
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_connect_timeout_ms() -> u64 {
    5000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            broker_host: default_broker_host(),
            broker_port: default_broker_port(),
            username: String::new(),
            password: String::new(),
            ca_cert: default_ca_cert(),
            topic: default_topic(),
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive_secs(),
            qos: 0,
            include_state: default_include_state(),
            on_parse_error: ParseFailurePolicy::default(),
            camera_source: default_camera_source(),
            frame_interval_ms: default_frame_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl Config {
    /// Broker settings for [`lockscan_middleware::MqttPublisher::connect`].
    pub fn to_mqtt_config(&self) -> MqttConfig {
        let ca_cert = if self.ca_cert.as_os_str().is_empty() {
            None
        } else {
            Some(self.ca_cert.clone())
        };
        MqttConfig {
            host: self.broker_host.clone(),
            port: self.broker_port,
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            password: self.password.clone(),
            ca_cert,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
            qos: self.qos,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            ..MqttConfig::default()
        }
    }

    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            topic: self.topic.clone(),
            include_state: self.include_state,
            on_parse_error: self.on_parse_error,
            frame_interval: Duration::from_millis(self.frame_interval_ms),
        }
    }
}

/// Return the path to `~/.lockscan/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".lockscan").join("config.toml")
}

/// Load the config from disk with environment overrides applied.  Returns
/// `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    let mut cfg = load_from(&config_path())?;
    if let Some(cfg) = cfg.as_mut() {
        apply_env_overrides(cfg);
    }
    Ok(cfg)
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `LOCKSCAN_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `LOCKSCAN_BROKER_HOST` | `broker_host` |
/// | `LOCKSCAN_BROKER_PORT` | `broker_port` |
/// | `LOCKSCAN_USERNAME` | `username` |
/// | `LOCKSCAN_PASSWORD` | `password` |
/// | `LOCKSCAN_TOPIC` | `topic` |
/// | `LOCKSCAN_CA_CERT` | `ca_cert` |
/// | `LOCKSCAN_CAMERA_SOURCE` | `camera_source` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("LOCKSCAN_BROKER_HOST") {
        cfg.broker_host = v;
    }
    if let Ok(v) = std::env::var("LOCKSCAN_BROKER_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.broker_port = port;
    }
    if let Ok(v) = std::env::var("LOCKSCAN_USERNAME") {
        cfg.username = v;
    }
    if let Ok(v) = std::env::var("LOCKSCAN_PASSWORD") {
        cfg.password.zeroize();
        cfg.password = v;
    }
    if let Ok(v) = std::env::var("LOCKSCAN_TOPIC") {
        cfg.topic = v;
    }
    if let Ok(v) = std::env::var("LOCKSCAN_CA_CERT") {
        cfg.ca_cert = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("LOCKSCAN_CAMERA_SOURCE") {
        cfg.camera_source = v;
    }
}

/// Save the config to disk, creating `~/.lockscan/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}
