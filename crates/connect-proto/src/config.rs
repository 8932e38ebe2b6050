use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::platform;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

/// How the local device advertises itself in the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_name")]
    pub name: String,
    #[serde(default)]
    pub device_type: DeviceType,
    /// Stable 40-hex-char id.  Generated and persisted on first load.
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default = "default_volume_steps")]
    pub volume_steps: i32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    #[default]
    Computer,
    Tablet,
    Smartphone,
    Speaker,
    Tv,
    Avr,
    Stb,
    AudioDongle,
    GameConsole,
    Automobile,
}

impl DeviceType {
    /// Value of the `devices.DeviceType` protobuf enum.
    pub fn proto_value(self) -> i32 {
        match self {
            DeviceType::Computer => 1,
            DeviceType::Tablet => 2,
            DeviceType::Smartphone => 3,
            DeviceType::Speaker => 4,
            DeviceType::Tv => 5,
            DeviceType::Avr => 6,
            DeviceType::Stb => 7,
            DeviceType::AudioDongle => 8,
            DeviceType::GameConsole => 9,
            DeviceType::Automobile => 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_dealer_url")]
    pub dealer_url: String,
    #[serde(default = "default_spclient_url")]
    pub spclient_url: String,
    #[serde(default = "default_apresolve_url")]
    pub apresolve_url: String,
    /// Ask apresolve for dealer/spclient hosts on every connection attempt.
    #[serde(default = "default_resolve_endpoints")]
    pub resolve_endpoints: bool,
    /// Fixed delay between reconnection attempts.  No backoff growth.
    #[serde(default = "default_reconnect_delay_secs")]
    pub reconnect_delay_secs: u64,
    #[serde(default = "default_ping_interval_secs")]
    pub ping_interval_secs: u64,
    /// Account name, needed to recognise rootlist notifications.
    #[serde(default)]
    pub user_id: Option<String>,
}

impl SessionConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Bearer token.  `CONNECT_ACCESS_TOKEN` in the environment wins.
    #[serde(default)]
    pub access_token: Option<String>,
}

pub const ACCESS_TOKEN_ENV: &str = "CONNECT_ACCESS_TOKEN";

impl AuthConfig {
    pub fn resolve_token(&self) -> Option<String> {
        std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.access_token.clone().filter(|t| !t.trim().is_empty()))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_enabled")]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            device_type: DeviceType::default(),
            device_id: None,
            volume_steps: default_volume_steps(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dealer_url: default_dealer_url(),
            spclient_url: default_spclient_url(),
            apresolve_url: default_apresolve_url(),
            resolve_endpoints: default_resolve_endpoints(),
            reconnect_delay_secs: default_reconnect_delay_secs(),
            ping_interval_secs: default_ping_interval_secs(),
            user_id: None,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: default_http_enabled(),
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_device_name() -> String {
    "connectd".to_string()
}

fn default_volume_steps() -> i32 {
    64
}

fn default_dealer_url() -> String {
    "wss://dealer.spotify.com:443".to_string()
}

fn default_spclient_url() -> String {
    "https://spclient.wg.spotify.com:443".to_string()
}

fn default_apresolve_url() -> String {
    "https://apresolve.spotify.com".to_string()
}

fn default_resolve_endpoints() -> bool {
    true
}

fn default_reconnect_delay_secs() -> u64 {
    3
}

fn default_ping_interval_secs() -> u64 {
    25
}

fn default_http_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    platform::DEFAULT_API_PORT
}

/// 20 random bytes rendered as lowercase hex, the shape the backend expects.
pub fn generate_device_id() -> String {
    let bytes: [u8; 20] = rand::thread_rng().gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path())
    }

    /// Load from `path`, writing defaults when the file does not exist and
    /// persisting a freshly generated device id when none is configured.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            let mut config = Self::default();
            config.device.device_id = Some(generate_device_id());
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        if config.device.device_id.as_deref().map_or(true, str::is_empty) {
            config.device.device_id = Some(generate_device_id());
            config.save_to(path)?;
        }
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }

    pub fn device_id(&self) -> String {
        self.device
            .device_id
            .clone()
            .unwrap_or_else(generate_device_id)
    }
}
