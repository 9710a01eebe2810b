// SPDX-License-Identifier: MIT

//! Broker configuration, loaded once at startup from the environment.

use std::path::PathBuf;
use thiserror::Error;

const DEFAULT_PORT: u16 = 3001;
const DEFAULT_AGENT_COMMAND: &str = "claude";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set to an existing directory")]
    MissingScanRoot(&'static str),
    #[error("invalid port in {0}: {1}")]
    InvalidPort(&'static str, String),
}

/// Process-wide configuration, grounded on the teacher's `Config::load`
/// (`daemon/src/lifecycle.rs`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// Directory under which candidate project folders are discovered.
    pub scan_root: PathBuf,
    /// Directory holding `sessions.json` (orphan reaper records).
    pub config_dir: PathBuf,
    pub port: u16,
    /// Command used to spawn the agent child (argv\[0\]; e.g. `claude`).
    pub agent_command: String,
}

impl BrokerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `GUERIDON_SCAN_ROOT` (required): scan root, must exist.
    /// - `GUERIDON_PORT` (optional, default 3001 or 3002 per spec.md §6).
    /// - `GUERIDON_CONFIG_DIR` (optional, defaults to the OS config dir).
    /// - `GUERIDON_AGENT_COMMAND` (optional, default `claude`).
    pub fn from_env() -> Result<Self, ConfigError> {
        let scan_root = std::env::var_os("GUERIDON_SCAN_ROOT")
            .map(PathBuf::from)
            .ok_or(ConfigError::MissingScanRoot("GUERIDON_SCAN_ROOT"))?;

        let port = match std::env::var("GUERIDON_PORT") {
            Ok(s) => s
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort("GUERIDON_PORT", s))?,
            Err(_) => DEFAULT_PORT,
        };

        let config_dir = std::env::var_os("GUERIDON_CONFIG_DIR")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|d| d.join("gueridon")))
            .unwrap_or_else(|| PathBuf::from(".gueridon"));

        let agent_command = std::env::var("GUERIDON_AGENT_COMMAND")
            .unwrap_or_else(|_| DEFAULT_AGENT_COMMAND.to_string());

        Ok(Self {
            scan_root,
            config_dir,
            port,
            agent_command,
        })
    }

    /// Path to the orphan-reaper records file (spec.md §6).
    pub fn sessions_file(&self) -> PathBuf {
        self.config_dir.join("sessions.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Env vars are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn missing_scan_root_errors() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::remove_var("GUERIDON_SCAN_ROOT");
        let err = BrokerConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::MissingScanRoot(_)));
    }

    #[test]
    fn defaults_applied_when_only_scan_root_set() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("GUERIDON_SCAN_ROOT", "/tmp");
        std::env::remove_var("GUERIDON_PORT");
        std::env::remove_var("GUERIDON_AGENT_COMMAND");
        let cfg = BrokerConfig::from_env().unwrap();
        assert_eq!(cfg.port, DEFAULT_PORT);
        assert_eq!(cfg.agent_command, "claude");
        std::env::remove_var("GUERIDON_SCAN_ROOT");
    }
}
