use std::fs;
use std::path::{Path, PathBuf};

use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::settings::{Settings, SourceKind};

/// Configuration manager for flasher settings
/// Separates the schema of available options from the persisted values. Configuration is
/// stored in flasher.json in the working directory by default
pub struct ConfigManager {
    config_path: PathBuf,
    settings: Settings,
}

/// Available configuration options with validation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSchema {
    pub ingest: IngestConfigSchema,
    pub register: RegisterConfigSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfigSchema {
    pub source: ConfigOption<SourceKind>,
    pub controller_url: ConfigOption<String>,
    pub events_path: ConfigOption<String>,
    pub relevance_key: ConfigOption<String>,
    pub retry_interval_secs: ConfigOption<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterConfigSchema {
    pub pulse_unit_micros: ConfigOption<u64>,
    pub dry_run: ConfigOption<bool>,
}

/// Configuration option with validation and available choices
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigOption<T> {
    pub default: T,
    pub valid_range: Option<(T, T)>,
    pub valid_choices: Option<Vec<T>>,
    pub description: String,
}

/// Persisted configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    pub version: String,
    pub settings: Settings,
    pub created_at: String,
    pub modified_at: String,
}

impl ConfigManager {
    /// Create a new configuration manager
    /// If no path is provided, defaults to 'flasher.json' in the current working directory
    pub fn new(config_path: Option<PathBuf>) -> Self {
        let config_path = config_path.unwrap_or_else(|| PathBuf::from("flasher.json"));

        Self {
            config_path,
            settings: Settings::default(),
        }
    }

    /// Load settings from the configuration file, writing the defaults if it doesn't exist
    pub fn load(&mut self) -> Result<Settings, ConfigError> {
        if !self.config_path.exists() {
            log::info!(
                "No config at {}, writing defaults",
                self.config_path.display()
            );
            self.save()?;
            return Ok(self.settings.clone());
        }

        let content = fs::read_to_string(&self.config_path)
            .map_err(|e| ConfigError::ReadError(e.to_string()))?;

        let config_file: ConfigFile =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if config_file.version != env!("CARGO_PKG_VERSION") {
            log::warn!(
                "Config file version {} doesn't match application version {}. Using defaults for new settings.",
                config_file.version,
                env!("CARGO_PKG_VERSION")
            );
        }

        self.settings = config_file.settings;
        Ok(self.settings.clone())
    }

    /// Save current settings to configuration file
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            if parent != Path::new("") && parent != Path::new(".") {
                fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError(e.to_string()))?;
            }
        }

        let now = chrono::Utc::now().to_rfc3339();
        let config_file = ConfigFile {
            version: env!("CARGO_PKG_VERSION").to_string(),
            settings: self.settings.clone(),
            created_at: now.clone(),
            modified_at: now,
        };

        let content = serde_json::to_string_pretty(&config_file)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        fs::write(&self.config_path, content)
            .map_err(|e| ConfigError::WriteError(e.to_string()))?;

        Ok(())
    }

    /// Validate, then replace the settings and save to file
    pub fn update_settings(&mut self, settings: Settings) -> Result<(), ConfigError> {
        Self::validate_settings(&settings).map_err(ConfigError::ValidationError)?;
        self.settings = settings;
        self.save()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    /// Get configuration schema with available options
    pub fn schema() -> ConfigSchema {
        let defaults = Settings::default();
        ConfigSchema {
            ingest: IngestConfigSchema {
                source: ConfigOption {
                    default: defaults.source,
                    valid_range: None,
                    valid_choices: Some(vec![
                        SourceKind::File,
                        SourceKind::Stream,
                        SourceKind::Queue,
                    ]),
                    description: "Where show documents are read from".to_string(),
                },
                controller_url: ConfigOption {
                    default: defaults.controller_url,
                    valid_range: None,
                    valid_choices: None,
                    description: "Base URL of the web controller".to_string(),
                },
                events_path: ConfigOption {
                    default: defaults.events_path,
                    valid_range: None,
                    valid_choices: None,
                    description: "Path of the event stream below the controller URL".to_string(),
                },
                relevance_key: ConfigOption {
                    default: defaults.relevance_key,
                    valid_range: None,
                    valid_choices: None,
                    description: "Queue message property that marks a message for the flasher"
                        .to_string(),
                },
                retry_interval_secs: ConfigOption {
                    default: defaults.retry_interval_secs,
                    valid_range: Some((1, 3600)),
                    valid_choices: None,
                    description: "Seconds to wait before reconnecting after a source failure"
                        .to_string(),
                },
            },
            register: RegisterConfigSchema {
                pulse_unit_micros: ConfigOption {
                    default: defaults.pulse_unit_micros,
                    valid_range: Some((1, 1_000_000)),
                    valid_choices: None,
                    description: "Hold time of each clock and latch half-pulse in microseconds"
                        .to_string(),
                },
                dry_run: ConfigOption {
                    default: defaults.dry_run,
                    valid_range: None,
                    valid_choices: None,
                    description: "Drive a simulated board instead of the GPIO header".to_string(),
                },
            },
        }
    }

    /// Validate settings against schema
    pub fn validate_settings(settings: &Settings) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();
        let schema = Self::schema();

        if let Some((min, max)) = schema.ingest.retry_interval_secs.valid_range {
            if settings.retry_interval_secs < min || settings.retry_interval_secs > max {
                errors.push(format!(
                    "retry_interval_secs must be between {} and {}",
                    min, max
                ));
            }
        }

        if let Some((min, max)) = schema.register.pulse_unit_micros.valid_range {
            if settings.pulse_unit_micros < min || settings.pulse_unit_micros > max {
                errors.push(format!(
                    "pulse_unit_micros must be between {} and {}",
                    min, max
                ));
            }
        }

        if settings.relevance_key.trim().is_empty() {
            errors.push("relevance_key must not be empty".to_string());
        }

        match settings.source {
            SourceKind::Stream => {
                if let Err(e) = Url::parse(&settings.controller_url)
                    .and_then(|base| base.join(&settings.events_path))
                {
                    errors.push(format!("controller_url is not a valid URL: {}", e));
                }
            }
            SourceKind::Queue => {
                if settings.queue_partitions.is_empty() {
                    errors.push("queue_partitions must name at least one partition".to_string());
                }
                for (i, partition) in settings.queue_partitions.iter().enumerate() {
                    if settings.queue_partitions[..i].contains(partition) {
                        errors.push(format!("queue partition '{}' is listed twice", partition));
                    }
                }
            }
            SourceKind::File => {
                if settings.show_file.trim().is_empty() {
                    errors.push("show_file must not be empty".to_string());
                }
            }
        }

        if let Err(pin_errors) = settings.pins.validate() {
            errors.extend(pin_errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Reset settings to defaults
    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.settings = Settings::default();
        self.save()
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),
    #[error("Failed to write config file: {0}")]
    WriteError(String),
    #[error("Failed to parse config file: {0}")]
    ParseError(String),
    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
    #[error("Config validation errors: {}", .0.join(", "))]
    ValidationError(Vec<String>),
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_config_manager_new() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let manager = ConfigManager::new(Some(config_path.clone()));
        assert_eq!(manager.config_path(), config_path);
        assert_eq!(manager.settings(), &Settings::default());
    }

    #[test]
    fn test_load_writes_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nested").join("flasher.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));
        let settings = manager.load().unwrap();

        assert_eq!(settings, Settings::default());
        assert!(config_path.exists());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");

        let mut manager = ConfigManager::new(Some(config_path.clone()));

        let mut settings = Settings::default();
        settings.source = SourceKind::Queue;
        settings.pulse_unit_micros = 250;
        settings.pins.clock = 25;

        manager.update_settings(settings.clone()).unwrap();

        let mut manager2 = ConfigManager::new(Some(config_path));
        let loaded_settings = manager2.load().unwrap();

        assert_eq!(loaded_settings, settings);
    }

    #[test]
    fn test_update_rejects_invalid_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");
        let mut manager = ConfigManager::new(Some(config_path.clone()));

        let mut settings = Settings::default();
        settings.retry_interval_secs = 0;

        assert!(matches!(
            manager.update_settings(settings),
            Err(ConfigError::ValidationError(_))
        ));
        assert!(!config_path.exists());
    }

    #[test]
    fn test_reset_to_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.json");
        let mut manager = ConfigManager::new(Some(config_path.clone()));

        let mut settings = Settings::default();
        settings.source = SourceKind::File;
        settings.pulse_unit_micros = 500;
        manager.update_settings(settings).unwrap();

        manager.reset_to_defaults().unwrap();
        assert_eq!(manager.settings(), &Settings::default());

        let mut reloaded = ConfigManager::new(Some(config_path));
        assert_eq!(reloaded.load().unwrap(), Settings::default());
    }

    #[test]
    fn test_parse_error() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("broken.json");
        fs::write(&config_path, "{ not json").unwrap();

        let mut manager = ConfigManager::new(Some(config_path));
        assert!(matches!(manager.load(), Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_validation() {
        let mut settings = Settings::default();
        assert!(ConfigManager::validate_settings(&settings).is_ok());

        settings.pulse_unit_micros = 0;
        assert!(ConfigManager::validate_settings(&settings).is_err());

        settings.pulse_unit_micros = 1000;
        settings.pins.latch = settings.pins.clock;
        assert!(ConfigManager::validate_settings(&settings).is_err());

        settings.pins = Default::default();
        settings.controller_url = "not a url".to_string();
        assert!(ConfigManager::validate_settings(&settings).is_err());

        // The URL only matters for the stream source
        settings.source = SourceKind::File;
        assert!(ConfigManager::validate_settings(&settings).is_ok());

        settings.source = SourceKind::Queue;
        settings.queue_partitions = vec!["0".to_string(), "1".to_string(), "0".to_string()];
        let errors = ConfigManager::validate_settings(&settings).unwrap_err();
        assert_eq!(errors, vec!["queue partition '0' is listed twice".to_string()]);

        settings.source = SourceKind::File;
        settings.relevance_key = " ".to_string();
        let errors = ConfigManager::validate_settings(&settings).unwrap_err();
        assert_eq!(errors, vec!["relevance_key must not be empty".to_string()]);
    }

    #[test]
    fn test_schema_defaults_match_settings() {
        let schema = ConfigManager::schema();
        let defaults = Settings::default();

        assert_eq!(schema.ingest.source.default, defaults.source);
        assert_eq!(schema.ingest.events_path.default, "events");
        assert!(schema.register.pulse_unit_micros.valid_range.is_some());
        assert!(!schema.register.dry_run.description.is_empty());
    }
}
