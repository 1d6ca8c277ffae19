use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ingest::RELEVANCE_KEY;
use crate::register::PinConfig;

pub const DEFAULT_CONTROLLER_URL: &str = "https://ve8tn.sse.codesandbox.io/";

/// Where documents come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    File,
    Stream,
    Queue,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::File => write!(f, "file"),
            SourceKind::Stream => write!(f, "stream"),
            SourceKind::Queue => write!(f, "queue"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(SourceKind::File),
            "stream" => Ok(SourceKind::Stream),
            "queue" => Ok(SourceKind::Queue),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// Settings configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    // Ingestion
    pub source: SourceKind,
    pub show_file: String,
    pub controller_url: String,
    pub events_path: String,
    pub queue_partitions: Vec<String>,
    pub relevance_key: String,
    pub retry_interval_secs: u64,

    // Register
    pub pulse_unit_micros: u64,
    pub pins: PinConfig,
    pub dry_run: bool,
}

impl Settings {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn pulse_unit(&self) -> Duration {
        Duration::from_micros(self.pulse_unit_micros)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: SourceKind::Stream,
            show_file: "lightshow.xml".to_string(),
            controller_url: DEFAULT_CONTROLLER_URL.to_string(),
            events_path: "events".to_string(),
            queue_partitions: vec!["0".to_string(), "1".to_string()],
            relevance_key: RELEVANCE_KEY.to_string(),
            retry_interval_secs: 1,

            pulse_unit_micros: 1000,
            pins: PinConfig::default(),
            dry_run: !cfg!(feature = "rpi"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_kind_from_str() {
        assert_eq!("Stream".parse::<SourceKind>(), Ok(SourceKind::Stream));
        assert_eq!("queue".parse::<SourceKind>(), Ok(SourceKind::Queue));
        assert!("mqtt".parse::<SourceKind>().is_err());
    }

    #[test]
    fn test_partial_settings_fill_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"source":"file"}"#).unwrap();
        assert_eq!(settings.source, SourceKind::File);
        assert_eq!(settings.events_path, "events");
        assert_eq!(settings.retry_interval(), Duration::from_secs(1));
        assert_eq!(settings.pulse_unit(), Duration::from_millis(1));
    }
}
