//! Configuration management using the prefer crate for file discovery.
//!
//! Settings come from, in order of priority: command-line flags (applied by
//! the CLI), environment variables, a config file, and built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::mfkessai::{Client, ClientError, DEFAULT_BASE_URL, DEFAULT_LOOKUP_WINDOW_MONTHS};
use crate::services::download::DEFAULT_CONCURRENCY;

/// Name used for config file discovery (`mfk.toml`, `mfk.yaml`, ...).
pub const CONFIG_NAME: &str = "mfk";

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "MFK_API_KEY";

/// Default request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {format} config {}: {message}", .path.display())]
    Parse {
        path: PathBuf,
        format: &'static str,
        message: String,
    },
    #[error("API key not provided: use --api-key flag or set MFK_API_KEY environment variable")]
    MissingApiKey,
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Contents of a config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    /// How far back single-invoice lookup searches.
    #[serde(default)]
    pub lookup_window_months: Option<u32>,
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer crate for discovery.
    /// Falls back to an empty config when no file is found or it is unreadable.
    pub async fn load() -> Self {
        match prefer::load(CONFIG_NAME).await {
            Ok(pref_config) => {
                if let Some(path) = pref_config.source_path() {
                    match Self::load_from_path(path).await {
                        Ok(config) => config,
                        Err(e) => {
                            tracing::warn!("Ignoring config file: {}", e);
                            Self::default()
                        }
                    }
                } else {
                    Self::default()
                }
            }
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports TOML, YAML and JSON based on file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let mut config = Self::parse(path, &contents)?;
        config.source_path = Some(path.to_path_buf());
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn parse(path: &Path, contents: &str) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            path: path.to_path_buf(),
            format,
            message,
        };

        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }
}

/// Effective settings after merging config, environment and flags.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    pub concurrency: usize,
    pub lookup_window_months: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            concurrency: DEFAULT_CONCURRENCY,
            lookup_window_months: DEFAULT_LOOKUP_WINDOW_MONTHS,
        }
    }
}

impl Settings {
    /// Apply values present in a config file.
    pub fn apply_config(&mut self, config: &Config) {
        if let Some(ref api_key) = config.api_key {
            self.api_key = Some(api_key.clone());
        }
        if let Some(ref base_url) = config.base_url {
            self.base_url = base_url.clone();
        }
        match config.request_timeout {
            Some(0) => tracing::warn!(
                "Ignoring request_timeout = 0 in config, using {}s",
                self.request_timeout
            ),
            Some(secs) => self.request_timeout = secs,
            None => {}
        }
        match config.concurrency {
            Some(0) => tracing::warn!(
                "Ignoring concurrency = 0 in config, using {}",
                self.concurrency
            ),
            Some(n) => self.concurrency = n,
            None => {}
        }
        if let Some(months) = config.lookup_window_months {
            self.lookup_window_months = months;
        }
    }

    /// Apply the API key from the environment, if set and non-empty.
    pub fn apply_env(&mut self) {
        if let Some(key) = std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()) {
            self.api_key = Some(key);
        }
    }

    /// The API key, or an error explaining how to provide one.
    pub fn require_api_key(&self) -> Result<&str, ConfigError> {
        self.api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(ConfigError::MissingApiKey)
    }

    /// Build an API client from these settings.
    pub fn create_client(&self) -> Result<Client, ConfigError> {
        let client = Client::builder(self.require_api_key()?)
            .base_url(self.base_url.clone())
            .timeout(Duration::from_secs(self.request_timeout))
            .lookup_window_months(self.lookup_window_months)
            .build()?;
        Ok(client)
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
}

/// Load settings from the config file and environment.
///
/// An explicit config path must exist and parse; a discovered one is
/// skipped with a warning when broken.
pub async fn load_settings(options: &LoadOptions) -> Result<Settings, ConfigError> {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await?,
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    settings.apply_config(&config);
    settings.apply_env();
    Ok(settings)
}

/// Resolve a user-supplied path.
/// - Paths starting with ~ are expanded
/// - Relative paths are resolved against `base_dir`
pub fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
    let expanded = shellexpand::tilde(path_str);
    let path = Path::new(expanded.as_ref());

    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base_dir.join(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml() {
        let config = Config::parse(
            Path::new("mfk.toml"),
            "api_key = \"secret\"\nconcurrency = 8\nlookup_window_months = 36\n",
        )
        .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("secret"));
        assert_eq!(config.concurrency, Some(8));
        assert_eq!(config.lookup_window_months, Some(36));
        assert_eq!(config.base_url, None);
    }

    #[test]
    fn test_parse_yaml_and_json() {
        let yaml = Config::parse(Path::new("mfk.yml"), "request_timeout: 10\n").unwrap();
        assert_eq!(yaml.request_timeout, Some(10));

        let json = Config::parse(
            Path::new("mfk.json"),
            r#"{"base_url": "https://sandbox.example.test"}"#,
        )
        .unwrap();
        assert_eq!(json.base_url.as_deref(), Some("https://sandbox.example.test"));
    }

    #[test]
    fn test_parse_error_names_format() {
        let err = Config::parse(Path::new("mfk.toml"), "concurrency = \"many\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { format: "TOML", .. }));
    }

    #[test]
    fn test_apply_config_keeps_defaults() {
        let mut settings = Settings::default();
        settings.apply_config(&Config {
            concurrency: Some(0),
            request_timeout: Some(5),
            ..Config::default()
        });
        assert_eq!(settings.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(settings.request_timeout, 5);
        assert_eq!(settings.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_apply_config_ignores_zero_timeout() {
        let mut settings = Settings::default();
        settings.apply_config(&Config {
            request_timeout: Some(0),
            ..Config::default()
        });
        assert_eq!(settings.request_timeout, DEFAULT_REQUEST_TIMEOUT);
    }

    #[test]
    fn test_require_api_key() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.require_api_key(),
            Err(ConfigError::MissingApiKey)
        ));
        settings.api_key = Some("  ".to_string());
        assert!(settings.require_api_key().is_err());
        settings.api_key = Some("key".to_string());
        assert_eq!(settings.require_api_key().unwrap(), "key");
    }

    #[test]
    fn test_resolve_path() {
        let base = Path::new("/work");
        assert_eq!(resolve_path("out", base), PathBuf::from("/work/out"));
        assert_eq!(resolve_path("/abs/out", base), PathBuf::from("/abs/out"));
    }

    #[tokio::test]
    async fn test_load_from_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mfk.toml");
        std::fs::write(&path, "base_url = \"http://localhost:9000\"\n").unwrap();

        let settings = load_settings(&LoadOptions {
            config_path: Some(path.clone()),
        })
        .await
        .unwrap();
        assert_eq!(settings.base_url, "http://localhost:9000");

        let missing = load_settings(&LoadOptions {
            config_path: Some(dir.path().join("absent.toml")),
        })
        .await;
        assert!(matches!(missing, Err(ConfigError::Read { .. })));
    }
}
