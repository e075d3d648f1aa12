//! Configuration management for mailwatch
//!
//! Configuration is loaded once at startup and is immutable afterwards. It
//! holds the processor records (the original sendmail config format is a
//! plain JSON array of them) plus the static watch settings.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::error::ConfigError;

/// Global configuration for mailwatch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Static watch settings
    #[serde(default)]
    pub watch: WatchSettings,
    /// Send a notification when a processor fails
    #[serde(default)]
    pub notify_failures: bool,
    /// Processor records, in dispatch order
    #[serde(default)]
    pub processors: Vec<ProcessorConfig>,
}

/// Directory settings that are not tied to a single processor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchSettings {
    /// Directories fed to the whole pipeline
    #[serde(default)]
    pub directories: Vec<PathBuf>,
    /// Default recursion for targets that do not set it
    #[serde(default = "default_recursive")]
    pub recursive: bool,
    /// File name suffixes treated as in-progress writes
    #[serde(default = "default_ignore_suffixes")]
    pub ignore_suffixes: Vec<String>,
}

/// One processor record. Keys other than the ones below are passed through
/// untouched to the processor variant named by `class`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessorConfig {
    pub class: String,
    pub enabled: bool,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recursive: Option<bool>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

fn default_recursive() -> bool {
    true
}

fn default_ignore_suffixes() -> Vec<String> {
    [".swp", ".swx", ".tmp", ".part", ".lock"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            directories: Vec::new(),
            recursive: default_recursive(),
            ignore_suffixes: default_ignore_suffixes(),
        }
    }
}

impl ProcessorConfig {
    pub fn new(class: &str, name: &str, enabled: bool) -> Self {
        Self {
            class: class.to_string(),
            enabled,
            name: name.to_string(),
            directory: None,
            recursive: None,
            options: Map::new(),
        }
    }

    pub fn with_directory<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn with_recursive(mut self, recursive: bool) -> Self {
        self.recursive = Some(recursive);
        self
    }

    pub fn with_option<V: Into<Value>>(mut self, key: &str, value: V) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    /// Deserialize the pass-through options into a variant's option struct.
    /// Unknown keys are ignored.
    pub fn parse_options<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConfigError> {
        serde_json::from_value(Value::Object(self.options.clone())).map_err(|err| {
            ConfigError::InvalidOptions {
                name: self.name.clone(),
                message: err.to_string(),
            }
        })
    }
}

/// Configuration loading and management
impl AppConfig {
    /// Configuration used when no file is given: a single notification
    /// processor for every watched directory.
    pub fn with_default_notifier() -> Self {
        Self {
            processors: vec![ProcessorConfig::new("NotifyProcessor", "notify", true)],
            ..Self::default()
        }
    }

    /// Load a config file. `.toml` files are read as TOML, everything else as JSON.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        tracing::info!("Load config \"{}\"...", path.display());

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("toml"));

        if is_toml {
            Self::from_toml_str(&content).map_err(|message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            })
        } else {
            Self::from_json_str(&content).map_err(|message| ConfigError::Parse {
                path: path.to_path_buf(),
                message,
            })
        }
    }

    /// Accepts either a bare array of processor records or a full object.
    pub fn from_json_str(content: &str) -> Result<Self, String> {
        let value: Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        if value.is_array() {
            let processors: Vec<ProcessorConfig> =
                serde_json::from_value(value).map_err(|e| e.to_string())?;
            Ok(Self {
                processors,
                ..Self::default()
            })
        } else {
            serde_json::from_value(value).map_err(|e| e.to_string())
        }
    }

    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| e.to_string())
    }

    /// Apply overrides from environment variables
    pub fn apply_env(&mut self) {
        self.apply_env_from(|key| std::env::var(key).ok());
    }

    /// Apply `MAILWATCH_*` overrides read through `lookup`.
    pub fn apply_env_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup("MAILWATCH_RECURSIVE") {
            if let Ok(recursive) = val.parse::<bool>() {
                self.watch.recursive = recursive;
            }
        }

        if let Some(val) = lookup("MAILWATCH_DIRS") {
            self.watch
                .directories
                .extend(std::env::split_paths(&val).filter(|p| !p.as_os_str().is_empty()));
        }

        if let Some(val) = lookup("MAILWATCH_NOTIFY_FAILURES") {
            if let Ok(enabled) = val.parse::<bool>() {
                self.notify_failures = enabled;
            }
        }
    }

    pub fn enabled_processors(&self) -> impl Iterator<Item = &ProcessorConfig> {
        self.processors.iter().filter(|p| p.enabled)
    }

    /// Validate configuration values that do not depend on the filesystem
    pub fn validate(&self) -> Result<(), ConfigError> {
        for processor in &self.processors {
            if processor.name.trim().is_empty() {
                return Err(ConfigError::InvalidOptions {
                    name: processor.class.clone(),
                    message: "processor name must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }
}
