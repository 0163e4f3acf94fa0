//! Engine configuration, owned by an external configuration collaborator
//! and consumed read-only by the engine.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// How untracked files are surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UntrackedMode {
    /// Untracked files join the working-tree group.
    Mixed,
    /// Untracked files form their own group.
    Separate,
    /// Untracked files are dropped entirely.
    Hidden,
}

/// What the scalar badge count includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgePolicy {
    /// Count every resource in the three primary groups.
    All,
    /// Count only tracked resources.
    Tracked,
    /// No badge count.
    Off,
}

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Path to the git executable.
    #[serde(default = "default_git_path")]
    pub git_path: PathBuf,
    /// Untracked-file handling mode.
    #[serde(default = "default_untracked_mode")]
    pub untracked_mode: UntrackedMode,
    /// Badge counting policy.
    #[serde(default = "default_badge_policy")]
    pub badge_policy: BadgePolicy,
    /// Maximum retry attempts for transient failures.
    #[serde(default = "default_retry_limit")]
    pub retry_limit: u32,
    /// Base delay for quadratic backoff, in milliseconds.
    #[serde(default = "default_retry_backoff_base_ms")]
    pub retry_backoff_base_ms: u64,
    /// Result cap for status enumeration; beyond it the engine reports a
    /// hit-limit flag instead of silently truncating.
    #[serde(default = "default_status_limit")]
    pub status_limit: usize,
    /// Whether filesystem changes trigger automatic reconciliation.
    #[serde(default = "default_true")]
    pub auto_refresh: bool,
    /// Debounce window for filesystem events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

fn default_git_path() -> PathBuf {
    PathBuf::from("git")
}

fn default_untracked_mode() -> UntrackedMode {
    UntrackedMode::Mixed
}

fn default_badge_policy() -> BadgePolicy {
    BadgePolicy::All
}

fn default_retry_limit() -> u32 {
    10
}

fn default_retry_backoff_base_ms() -> u64 {
    50
}

fn default_status_limit() -> usize {
    5000
}

fn default_true() -> bool {
    true
}

fn default_debounce_ms() -> u64 {
    500
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            git_path: default_git_path(),
            untracked_mode: default_untracked_mode(),
            badge_policy: default_badge_policy(),
            retry_limit: default_retry_limit(),
            retry_backoff_base_ms: default_retry_backoff_base_ms(),
            status_limit: default_status_limit(),
            auto_refresh: true,
            debounce_ms: default_debounce_ms(),
        }
    }
}

/// Loads an engine configuration from a JSON file.
pub fn load_config(path: impl AsRef<std::path::Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;
    load_config_from_str(&content)
}

/// Loads an engine configuration from a JSON string.
pub fn load_config_from_str(content: &str) -> Result<EngineConfig> {
    let config: EngineConfig = serde_json::from_str(content).map_err(ConfigError::ParseJson)?;
    if config.retry_limit == 0 {
        return Err(ConfigError::Validation {
            message: "retryLimit must be at least 1".to_string(),
        }
        .into());
    }
    if config.status_limit == 0 {
        return Err(ConfigError::Validation {
            message: "statusLimit must be at least 1".to_string(),
        }
        .into());
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.untracked_mode, UntrackedMode::Mixed);
        assert_eq!(config.badge_policy, BadgePolicy::All);
        assert_eq!(config.retry_limit, 10);
        assert_eq!(config.retry_backoff_base_ms, 50);
        assert_eq!(config.status_limit, 5000);
        assert!(config.auto_refresh);
    }

    #[test]
    fn test_load_from_str_partial() {
        let config =
            load_config_from_str(r#"{"untrackedMode": "separate", "badgePolicy": "off"}"#).unwrap();
        assert_eq!(config.untracked_mode, UntrackedMode::Separate);
        assert_eq!(config.badge_policy, BadgePolicy::Off);
        assert_eq!(config.status_limit, 5000);
    }

    #[test]
    fn test_load_rejects_zero_retry_limit() {
        assert!(load_config_from_str(r#"{"retryLimit": 0}"#).is_err());
    }

    #[test]
    fn test_load_rejects_zero_status_limit() {
        assert!(load_config_from_str(r#"{"statusLimit": 0}"#).is_err());
    }

    #[test]
    fn test_mode_serialization() {
        assert_eq!(
            serde_json::to_string(&UntrackedMode::Hidden).unwrap(),
            "\"hidden\""
        );
        assert_eq!(
            serde_json::to_string(&BadgePolicy::Tracked).unwrap(),
            "\"tracked\""
        );
    }
}
