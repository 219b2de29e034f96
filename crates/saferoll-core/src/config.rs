//! saferoll.toml configuration parser.
//!
//! Every field defaults to the reference gate constants, so an empty file
//! (or no file at all) reproduces the stock gating behaviour.

use std::net::SocketAddr;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SaferollConfig {
    pub server: ServerConfig,
    pub window: WindowConfig,
    pub gates: GateThresholds,
    pub rollback: RollbackThresholds,
    pub policy: PolicyConfig,
    pub store: StoreConfig,
    pub checkin: CheckinConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8000)),
        }
    }
}

/// Bounds of each per-ring health window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    /// Samples older than this (relative to now) are excluded.
    pub seconds: u64,
    /// Hard cap on retained samples; oldest evicted first.
    pub capacity: usize,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            seconds: 300,
            capacity: 1200,
        }
    }
}

/// Warn-tier SLO gates. Violations pause the rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateThresholds {
    pub boot_success_min: f64,
    pub crash_free_min: f64,
    pub checkin_ms_max: f64,
}

impl Default for GateThresholds {
    fn default() -> Self {
        Self {
            boot_success_min: 0.995,
            crash_free_min: 0.990,
            checkin_ms_max: 500.0,
        }
    }
}

/// Critical tier. Violations force a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RollbackThresholds {
    pub crash_free_critical: f64,
    pub boot_success_critical: f64,
}

impl Default for RollbackThresholds {
    fn default() -> Self {
        Self {
            crash_free_critical: 0.950,
            boot_success_critical: 0.970,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Minimum seconds between two promotions of the same rollout.
    pub promote_cooldown_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            promote_cooldown_secs: 120,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Per-rollout decision history length.
    pub decision_history: usize,
    /// Global decision log length.
    pub event_log_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            decision_history: 10,
            event_log_capacity: 10_000,
        }
    }
}

/// Advice returned to devices on every check-in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckinConfig {
    pub next_check_seconds: u64,
    pub backoff: String,
    pub max_retries: u32,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            next_check_seconds: 30,
            backoff: "exp-jitter".to_string(),
            max_retries: 5,
        }
    }
}

impl SaferollConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: SaferollConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject settings that would make the gates meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window.seconds == 0 {
            return Err(ConfigError::Invalid("window.seconds must be > 0".into()));
        }
        if self.window.capacity == 0 {
            return Err(ConfigError::Invalid("window.capacity must be > 0".into()));
        }
        if self.store.decision_history == 0 {
            return Err(ConfigError::Invalid("store.decision_history must be > 0".into()));
        }
        if self.store.event_log_capacity == 0 {
            return Err(ConfigError::Invalid("store.event_log_capacity must be > 0".into()));
        }

        let fractions = [
            ("gates.boot_success_min", self.gates.boot_success_min),
            ("gates.crash_free_min", self.gates.crash_free_min),
            ("rollback.crash_free_critical", self.rollback.crash_free_critical),
            ("rollback.boot_success_critical", self.rollback.boot_success_critical),
        ];
        for (name, value) in fractions {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!("{name} must be within [0, 1], got {value}")));
            }
        }
        if self.gates.checkin_ms_max < 0.0 {
            return Err(ConfigError::Invalid("gates.checkin_ms_max must be >= 0".into()));
        }

        // A critical breach must always also be a warn-tier breach.
        if self.rollback.crash_free_critical > self.gates.crash_free_min {
            return Err(ConfigError::Invalid(
                "rollback.crash_free_critical must not exceed gates.crash_free_min".into(),
            ));
        }
        if self.rollback.boot_success_critical > self.gates.boot_success_min {
            return Err(ConfigError::Invalid(
                "rollback.boot_success_critical must not exceed gates.boot_success_min".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_constants() {
        let config = SaferollConfig::default();
        assert_eq!(config.window.seconds, 300);
        assert_eq!(config.window.capacity, 1200);
        assert_eq!(config.gates.boot_success_min, 0.995);
        assert_eq!(config.gates.crash_free_min, 0.990);
        assert_eq!(config.gates.checkin_ms_max, 500.0);
        assert_eq!(config.rollback.crash_free_critical, 0.950);
        assert_eq!(config.rollback.boot_success_critical, 0.970);
        assert_eq!(config.policy.promote_cooldown_secs, 120);
        assert_eq!(config.store.decision_history, 10);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parse_empty_uses_defaults() {
        let config: SaferollConfig = toml::from_str("").unwrap();
        assert_eq!(config, SaferollConfig::default());
    }

    #[test]
    fn parse_partial_overrides() {
        let toml_str = r#"
[server]
listen = "127.0.0.1:9000"

[policy]
promote_cooldown_secs = 30

[window]
seconds = 60
"#;
        let config: SaferollConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.listen.port(), 9000);
        assert_eq!(config.policy.promote_cooldown_secs, 30);
        assert_eq!(config.window.seconds, 60);
        assert_eq!(config.window.capacity, 1200);
    }

    #[test]
    fn from_file_roundtrips_scaffold() {
        let config = SaferollConfig::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(config.to_toml_string().unwrap().as_bytes()).unwrap();
        let loaded = SaferollConfig::from_file(file.path()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn validate_rejects_lenient_critical_tier() {
        let mut config = SaferollConfig::default();
        config.rollback.crash_free_critical = 0.999;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_zero_capacity() {
        let mut config = SaferollConfig::default();
        config.window.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn from_file_reports_parse_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"[window\nseconds = ").unwrap();
        assert!(matches!(
            SaferollConfig::from_file(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
