//! Startup configuration for the engine host.
//!
//! # Responsibility
//! - Declare logging options and the subscriptions to register at startup.
//! - Parse the JSON configuration file.
//!
//! # Invariants
//! - Parsing never validates conditions; `EventDispatcher::subscribe` does,
//!   so a malformed spec fails before any event is processed.

use crate::model::conditions::Conditions;
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// One `(record_type, namespace, conditions)` registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionConfig {
    pub record_type: String,
    pub namespace: String,
    #[serde(default)]
    pub conditions: Conditions,
}

/// Root configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// `trace|debug|info|warn|error`; defaults per build mode when absent.
    #[serde(default)]
    pub log_level: Option<String>,
    /// Absolute directory for rolling log files; file logging is off when absent.
    #[serde(default)]
    pub log_dir: Option<String>,
    #[serde(default)]
    pub subscriptions: Vec<SubscriptionConfig>,
}

impl SyncConfig {
    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(source).map_err(ConfigError::Parse)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.to_path_buf(),
            source: err,
        })?;
        Self::from_json_str(&source)
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, SyncConfig};
    use crate::model::conditions::ConditionOperator;

    #[test]
    fn parses_full_document() {
        let config = SyncConfig::from_json_str(
            r#"{
                "log_level": "debug",
                "subscriptions": [
                    {"record_type": "widget", "namespace": "widget_shadow"},
                    {
                        "record_type": "gadget",
                        "namespace": "gadget_shadow",
                        "conditions": {
                            "operator": "OR",
                            "clauses": [{"namespace": "color", "required_values": ["red"]}]
                        }
                    }
                ]
            }"#,
        )
        .expect("valid config");

        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert!(config.log_dir.is_none());
        assert_eq!(config.subscriptions.len(), 2);
        assert!(config.subscriptions[0].conditions.is_empty());
        assert_eq!(
            config.subscriptions[1].conditions.operator,
            ConditionOperator::Or
        );
    }

    #[test]
    fn rejects_unknown_root_fields() {
        let err = SyncConfig::from_json_str(r#"{"subscribers": []}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn reports_missing_file_path() {
        let err = SyncConfig::from_path("/nonexistent/shadowsync.json").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/shadowsync.json"));
    }
}
