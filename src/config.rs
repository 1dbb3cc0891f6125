use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, Level};

use crate::error::ConfigError;
use crate::object::Object;

/// Runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Working directory; records live under `<workdir>/store`
    #[serde(default = "default_workdir")]
    pub workdir: PathBuf,

    /// Size of the dispatch worker pool
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Events buffered before `submit` waits
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    /// Number of recent events kept for introspection
    #[serde(default = "default_recent_events")]
    pub recent_events: usize,

    /// tracing level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Give up waiting for a reply after this many seconds (console only)
    #[serde(default)]
    pub reply_timeout_secs: Option<u64>,
}

fn default_workdir() -> PathBuf {
    PathBuf::from(".opbot")
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    64
}

fn default_recent_events() -> usize {
    128
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: default_workdir(),
            workers: default_workers(),
            queue_depth: default_queue_depth(),
            recent_events: default_recent_events(),
            log_level: default_log_level(),
            reply_timeout_secs: None,
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::parse(&content)?;
        info!(workdir = %config.workdir.display(), workers = config.workers, "configuration loaded");
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Configured level, falling back to info
    pub fn level(&self) -> Level {
        Level::from_str(&self.log_level).unwrap_or(Level::INFO)
    }

    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_secs.map(Duration::from_secs)
    }

    /// Configuration as a record, for printing
    pub fn to_object(&self) -> Object {
        let mut obj = Object::new();
        obj.set("workdir", self.workdir.display().to_string());
        obj.set("workers", self.workers as i64);
        obj.set("queue_depth", self.queue_depth as i64);
        obj.set("recent_events", self.recent_events as i64);
        obj.set("log_level", self.log_level.as_str());
        if let Some(secs) = self.reply_timeout_secs {
            obj.set("reply_timeout_secs", secs as i64);
        }
        obj
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.workdir, PathBuf::from(".opbot"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.level(), Level::INFO);
        assert!(config.reply_timeout().is_none());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::parse("workdir = \"/tmp/bot\"\nworkers = 2\nreply_timeout_secs = 5\n").unwrap();
        assert_eq!(config.workdir, PathBuf::from("/tmp/bot"));
        assert_eq!(config.workers, 2);
        assert_eq!(config.recent_events, 128);
        assert_eq!(config.reply_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_parse_empty_toml_is_default() {
        assert_eq!(Config::parse("").unwrap(), Config::default());
    }

    #[test]
    fn test_parse_bad_toml() {
        assert!(matches!(Config::parse("workers = \"many\""), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_level_falls_back() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Config::default()
        };
        assert_eq!(config.level(), Level::INFO);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("opbot.toml");
        std::fs::write(&path, "log_level = \"debug\"\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.level(), Level::DEBUG);
    }

    #[test]
    fn test_to_object_printable() {
        let config = Config::default();
        assert_eq!(
            config.to_object().printable(Some("workers,log_level"), None),
            "workers=4 log_level=info"
        );
    }
}
