//! Configuration for the tunnel client.
//!
//! JSON files with duration strings ("5s", "500ms", "2m"). Missing fields
//! fall back to defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::socks5::{Credentials, SocksError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid log level: {0}")]
    InvalidLogLevel(String),

    #[error("Invalid timeout: {0}")]
    InvalidTimeout(String),

    #[error("server_addr is empty")]
    MissingServer,

    #[error("Invalid server address: {0}")]
    InvalidServerAddr(String),

    #[error("username and password must be set together")]
    IncompleteCredentials,

    #[error("Invalid credentials: {0}")]
    Credentials(#[source] SocksError),
}

/// Helper trait for loading/saving configuration files.
pub trait FileConfig: Serialize + for<'de> Deserialize<'de> + Default + Sized {
    /// Load configuration from a JSON file.
    ///
    /// If the file doesn't exist, returns default config.
    /// If the file exists but is invalid, returns an error.
    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file.
    fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        let temp_path = path.as_ref().with_extension("tmp");
        std::fs::write(&temp_path, content)?;
        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError>;

    fn log_level(&self) -> &str;

    /// Get tracing::Level from log_level string.
    fn log_level_as_tracing(&self) -> tracing::Level {
        match self.log_level().to_lowercase().as_str() {
            "trace" => tracing::Level::TRACE,
            "debug" => tracing::Level::DEBUG,
            "info" => tracing::Level::INFO,
            "warn" => tracing::Level::WARN,
            "error" => tracing::Level::ERROR,
            _ => tracing::Level::INFO,
        }
    }
}

/// Tunnel client configuration loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientFileConfig {
    /// SOCKS5 server, "host:port" or "[v6]:port"
    pub server_addr: String,

    pub username: Option<String>,

    pub password: Option<String>,

    /// Bound on connect plus handshake (e.g., "5s")
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Log level: "trace", "debug", "info", "warn", "error"
    pub log_level: String,
}

impl Default for ClientFileConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:1080".to_string(),
            username: None,
            password: None,
            connect_timeout: Duration::from_secs(5),
            log_level: "info".to_string(),
        }
    }
}

impl ClientFileConfig {
    /// Split `server_addr` into host and port.
    pub fn server_endpoint(&self) -> Result<(String, u16), ConfigError> {
        parse_endpoint(&self.server_addr)
    }

    /// Credentials for the handshake, if both fields are configured.
    pub fn credentials(&self) -> Result<Option<Credentials>, ConfigError> {
        match (&self.username, &self.password) {
            (None, None) => Ok(None),
            (Some(user), Some(pass)) => Credentials::new(user.as_bytes(), pass.as_bytes())
                .map(Some)
                .map_err(ConfigError::Credentials),
            _ => Err(ConfigError::IncompleteCredentials),
        }
    }
}

impl FileConfig for ClientFileConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.server_endpoint()?;
        self.credentials()?;
        validate_log_level(&self.log_level)?;

        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout must be > 0".to_string(),
            ));
        }
        if self.connect_timeout.as_secs() > 300 {
            return Err(ConfigError::InvalidTimeout(
                "connect_timeout too long (max 300s)".to_string(),
            ));
        }
        Ok(())
    }

    fn log_level(&self) -> &str {
        &self.log_level
    }
}

fn validate_log_level(log_level: &str) -> Result<(), ConfigError> {
    match log_level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::InvalidLogLevel(log_level.to_string())),
    }
}

/// Parse "host:port" or "[v6]:port". Brackets are stripped from the host.
pub fn parse_endpoint(addr: &str) -> Result<(String, u16), ConfigError> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(ConfigError::MissingServer);
    }
    let invalid = || ConfigError::InvalidServerAddr(addr.to_string());

    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        let port = tail.strip_prefix(':').ok_or_else(invalid)?;
        (host, port)
    } else {
        let (host, port) = addr.rsplit_once(':').ok_or_else(invalid)?;
        if host.contains(':') {
            return Err(invalid());
        }
        (host, port)
    };

    if host.is_empty() {
        return Err(invalid());
    }
    let port: u16 = port.parse().map_err(|_| invalid())?;
    Ok((host.to_string(), port))
}

/// Module for Duration serialization/deserialization.
pub(crate) mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();
        if secs >= 60 && millis == 0 {
            serializer.serialize_str(&format!("{}s", secs))
        } else if secs >= 1 {
            serializer.serialize_str(&format!("{}.{:03}s", secs, millis))
        } else if millis >= 1 {
            serializer.serialize_str(&format!("{}ms", millis))
        } else {
            serializer.serialize_str("0s")
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }

    pub fn parse_duration(s: &str) -> Result<Duration, String> {
        let s = s.trim().to_lowercase();
        if let Some(num) = s.strip_suffix("ms") {
            let num = num.trim();
            let millis: u64 = num
                .parse()
                .map_err(|_| format!("invalid milliseconds: {}", num))?;
            return Ok(Duration::from_millis(millis));
        }
        if let Some(num) = s.strip_suffix('s') {
            let num = num.trim();
            if let Some((whole, frac)) = num.split_once('.') {
                let secs: u64 = whole
                    .parse()
                    .map_err(|_| format!("invalid seconds: {}", whole))?;
                let millis_str: String = frac.chars().take(3).collect();
                if millis_str.is_empty() || !millis_str.chars().all(|c| c.is_ascii_digit()) {
                    return Err(format!("invalid milliseconds: {}", frac));
                }
                let millis_str = format!("{:0<3}", millis_str);
                let millis: u32 = millis_str
                    .parse()
                    .map_err(|_| format!("invalid milliseconds: {}", millis_str))?;
                return Ok(Duration::new(secs, millis * 1_000_000));
            }
            let secs: u64 = num
                .parse()
                .map_err(|_| format!("invalid duration: {}", s))?;
            return Ok(Duration::from_secs(secs));
        }
        if let Some(num) = s.strip_suffix('m') {
            let num = num.trim();
            let mins: u64 = num
                .parse()
                .map_err(|_| format!("invalid minutes: {}", num))?;
            let secs = mins
                .checked_mul(60)
                .ok_or_else(|| format!("minutes out of range: {}", num))?;
            return Ok(Duration::from_secs(secs));
        }
        Err(format!("unknown duration format: {}", s))
    }
}

pub use duration_serde::parse_duration;
