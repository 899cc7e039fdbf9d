use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{BackupError, Result};
use crate::ssh::config::HostKeyPolicy;

pub const KEY_PATH: &str = "KEY_PATH";
pub const KEY_PASSPHRASE: &str = "KEY_PASSPHRASE";
pub const SERVER_IP: &str = "SERVER_IP";
pub const SERVER_HOST: &str = "SERVER_HOST";
pub const PORT: &str = "PORT";
pub const REMOTE_USERNAME: &str = "REMOTE_USERNAME";
pub const REMOTE_DIRECTORY: &str = "REMOTE_DIRECTORY";
pub const REMOTE_ZIP_FILE_NAME: &str = "REMOTE_ZIP_FILE_NAME";
pub const SAVE_DOWNLOAD_DIRECTORY: &str = "SAVE_DOWNLOAD_DIRECTORY";
pub const LOCAL_ZIP_FILE_NAME: &str = "LOCAL_ZIP_FILE_NAME";
pub const LOG_FILE: &str = "LOG_FILE";
pub const DATE_SUFFIX: &str = "DATE_SUFFIX";
pub const CONNECT_TIMEOUT: &str = "CONNECT_TIMEOUT";
pub const COMMAND_TIMEOUT: &str = "COMMAND_TIMEOUT";
pub const HOST_KEY_POLICY: &str = "HOST_KEY_POLICY";
pub const KNOWN_HOSTS: &str = "KNOWN_HOSTS";

/// Every key the loader recognizes. Environment variables are only consulted for these.
pub const KNOWN_KEYS: &[&str] = &[
    KEY_PATH,
    KEY_PASSPHRASE,
    SERVER_IP,
    SERVER_HOST,
    PORT,
    REMOTE_USERNAME,
    REMOTE_DIRECTORY,
    REMOTE_ZIP_FILE_NAME,
    SAVE_DOWNLOAD_DIRECTORY,
    LOCAL_ZIP_FILE_NAME,
    LOG_FILE,
    DATE_SUFFIX,
    CONNECT_TIMEOUT,
    COMMAND_TIMEOUT,
    HOST_KEY_POLICY,
    KNOWN_HOSTS,
];

pub const DEFAULT_PORT: u16 = 22;
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(3600);

/// Raw key/value settings gathered from a config file and the environment.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    values: HashMap<String, String>,
}

impl Settings {
    /// Parse a config file. `.yaml`/`.yml` files are read as YAML, anything else as dotenv.
    pub fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(BackupError::Configuration(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            let content = std::fs::read_to_string(path).map_err(|e| {
                BackupError::Configuration(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Self::from_yaml(&content)
        } else {
            Self::from_dotenv(path)
        }
    }

    fn from_dotenv(path: &Path) -> Result<Self> {
        let iter = dotenvy::from_path_iter(path).map_err(|e| {
            BackupError::Configuration(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let mut values = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                BackupError::Configuration(format!("Invalid config {}: {}", path.display(), e))
            })?;
            values.insert(key.to_uppercase(), value);
        }

        Ok(Self { values })
    }

    /// Parse a flat YAML mapping. Keys are case-insensitive (`server_ip` == `SERVER_IP`).
    pub fn from_yaml(content: &str) -> Result<Self> {
        let map: HashMap<String, serde_yaml::Value> = serde_yaml::from_str(content)
            .map_err(|e| BackupError::Configuration(format!("Invalid config: {}", e)))?;

        let mut values = HashMap::new();
        for (key, value) in map {
            let value = match value {
                serde_yaml::Value::Null => continue,
                serde_yaml::Value::String(s) => s,
                serde_yaml::Value::Number(n) => n.to_string(),
                serde_yaml::Value::Bool(b) => b.to_string(),
                _ => {
                    return Err(BackupError::Configuration(format!(
                        "Invalid config: '{}' must be a plain value",
                        key
                    )))
                }
            };
            values.insert(key.to_uppercase(), value);
        }

        Ok(Self { values })
    }

    /// Overlay values on top of the current ones. Later values win; empty values are ignored.
    pub fn overlay<I, K, V>(&mut self, pairs: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in pairs {
            let value = value.into();
            if !value.trim().is_empty() {
                self.values.insert(key.into().to_uppercase(), value);
            }
        }
    }

    /// Overlay recognized keys from the process environment.
    ///
    /// Environment variables take precedence over file values, like `load_dotenv`.
    pub fn overlay_env(&mut self) {
        let pairs = KNOWN_KEYS
            .iter()
            .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value)));
        self.overlay(pairs);
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// Redacted string for secrets that must not show up in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Everything one backup run needs to know.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub key_path: PathBuf,
    pub key_passphrase: Option<Secret>,
    pub remote_directory: String,
    pub remote_archive_base: String,
    pub local_directory: PathBuf,
    pub local_archive_base: String,
    pub date_suffix: bool,
    pub connect_timeout: Duration,
    pub command_timeout: Duration,
    pub host_key_policy: HostKeyPolicy,
    pub known_hosts: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

impl BackupConfig {
    /// Load from an optional config file, then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut settings = match path {
            Some(path) => Settings::from_file(path)?,
            None => Settings::default(),
        };
        settings.overlay_env();
        Self::from_settings(&settings)
    }

    /// Build and validate a configuration. Reports every missing required key at once.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| -> String {
            match settings.get(key) {
                Some(v) => v.to_string(),
                None => {
                    missing.push(key);
                    String::new()
                }
            }
        };

        let key_path = required(KEY_PATH);
        let username = required(REMOTE_USERNAME);
        let remote_directory = required(REMOTE_DIRECTORY);
        let remote_archive_base = required(REMOTE_ZIP_FILE_NAME);
        let local_directory = required(SAVE_DOWNLOAD_DIRECTORY);
        let local_archive_base = required(LOCAL_ZIP_FILE_NAME);

        let host = settings
            .get(SERVER_IP)
            .or_else(|| settings.get(SERVER_HOST))
            .map(str::to_string);
        if host.is_none() {
            missing.push(SERVER_IP);
        }

        if !missing.is_empty() {
            return Err(BackupError::Configuration(format!(
                "Missing required setting(s): {}",
                missing.join(", ")
            )));
        }

        let port = match settings.get(PORT) {
            Some(raw) => match raw.parse::<u16>() {
                Ok(port) if port > 0 => port,
                _ => {
                    return Err(BackupError::Configuration(format!(
                        "Invalid {} '{}'. Expected an integer between 1 and 65535",
                        PORT, raw
                    )))
                }
            },
            None => DEFAULT_PORT,
        };

        let date_suffix = match settings.get(DATE_SUFFIX) {
            Some(raw) => parse_bool(raw).ok_or_else(|| {
                BackupError::Configuration(format!(
                    "Invalid {} '{}'. Use true/false",
                    DATE_SUFFIX, raw
                ))
            })?,
            None => true,
        };

        let connect_timeout = duration_setting(settings, CONNECT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)?;
        let command_timeout = duration_setting(settings, COMMAND_TIMEOUT, DEFAULT_COMMAND_TIMEOUT)?;

        let host_key_policy = match settings.get(HOST_KEY_POLICY) {
            Some(raw) => raw.parse::<HostKeyPolicy>().map_err(|_| {
                BackupError::Configuration(format!(
                    "Invalid {} '{}'. Use accept-any, accept-new or strict",
                    HOST_KEY_POLICY, raw
                ))
            })?,
            None => HostKeyPolicy::default(),
        };

        let config = Self {
            host: host.unwrap_or_default(),
            port,
            username,
            key_path: expand_path(&key_path),
            key_passphrase: settings.get(KEY_PASSPHRASE).map(|p| Secret(p.to_string())),
            remote_directory,
            remote_archive_base,
            local_directory: expand_path(&local_directory),
            local_archive_base,
            date_suffix,
            connect_timeout,
            command_timeout,
            host_key_policy,
            known_hosts: settings.get(KNOWN_HOSTS).map(expand_path),
            log_file: settings.get(LOG_FILE).map(expand_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// Archive base names end up inside remote shell commands and local paths,
    /// so they must be plain file names.
    pub fn validate(&self) -> Result<()> {
        for (key, name) in [
            (REMOTE_ZIP_FILE_NAME, &self.remote_archive_base),
            (LOCAL_ZIP_FILE_NAME, &self.local_archive_base),
        ] {
            if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
                return Err(BackupError::Configuration(format!(
                    "Invalid {} '{}'. Expected a file name without directories",
                    key, name
                )));
            }
        }

        if self.command_timeout.is_zero() || self.connect_timeout.is_zero() {
            return Err(BackupError::Configuration(
                "Timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn duration_setting(settings: &Settings, key: &str, default: Duration) -> Result<Duration> {
    match settings.get(key) {
        Some(raw) => parse_duration(raw).ok_or_else(|| {
            BackupError::Configuration(format!(
                "Invalid {} '{}'. Use format like '2h', '30m', '45s' or '3600'",
                key, raw
            ))
        }),
        None => Ok(default),
    }
}

fn expand_path(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).as_ref())
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim().to_lowercase();

    if let Some(hours) = s.strip_suffix('h') {
        hours
            .parse::<u64>()
            .ok()
            .and_then(|h| h.checked_mul(3600))
            .map(Duration::from_secs)
    } else if let Some(minutes) = s.strip_suffix('m') {
        minutes
            .parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else if let Some(seconds) = s.strip_suffix('s') {
        seconds.parse::<u64>().ok().map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
