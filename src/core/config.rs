//! Process configuration.
//!
//! Defaults mirror the production governance tables; every value can be
//! overridden from the environment (optionally via a `.env` file).

use crate::bus::config::{BusConfig, RedisBusConfig};
use crate::bus::BusType;
use crate::core::{Error, Result};
use crate::governance::risk::GovernancePolicy;
use crate::voting::coordinator::CoordinatorConfig;
use crate::voting::panel::DEFAULT_PANEL;
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;

/// Top-level configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Cost gate and risk tier tables
    pub governance: GovernancePolicy,
    /// Vote solicitation settings
    pub coordinator: CoordinatorConfig,
    /// Ordered voter panel
    pub panel: Vec<String>,
    /// Message bus selection
    pub bus: BusConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Fallback filter when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            governance: GovernancePolicy::default(),
            coordinator: CoordinatorConfig::default(),
            panel: DEFAULT_PANEL.iter().map(|name| name.to_string()).collect(),
            bus: BusConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the environment on top of the defaults.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from `lookup` on top of the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Config::default();
        let governance = &mut config.governance;

        if let Some(from) = parse_var(&lookup, "PENTARCHY_CRITICAL_FROM")? {
            governance.bands.critical_from = from;
        }
        // Tier bands follow the gate limits while that keeps them ordered
        if let Some(limit) = parse_var(&lookup, "PENTARCHY_HUMAN_REVIEW_LIMIT")? {
            governance.human_review_limit = limit;
            if limit < governance.bands.critical_from {
                governance.bands.high_from = limit;
            } else {
                tracing::debug!(limit, "Human-review limit at or above the critical band, HIGH band unchanged");
            }
        }
        if let Some(limit) = parse_var(&lookup, "PENTARCHY_AUTO_APPROVE_LIMIT")? {
            governance.auto_approve_limit = limit;
            if limit < governance.bands.high_from {
                governance.bands.medium_from = limit;
            } else {
                tracing::debug!(limit, "Auto-approve limit at or above the high band, MEDIUM band unchanged");
            }
        }

        if let Some(timeout_ms) = parse_var(&lookup, "PENTARCHY_VOTER_TIMEOUT_MS")? {
            config.coordinator.voter_timeout_ms = timeout_ms;
        }
        if let Some(score) = parse_var(&lookup, "PENTARCHY_FAILURE_SCORE")? {
            config.coordinator.failure_score = score;
        }
        if let Some(panel) = lookup("PENTARCHY_PANEL") {
            config.panel = panel
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect();
        }

        if let Some(backend) = parse_var::<BusType>(&lookup, "MESSAGE_BUS_TYPE")? {
            config.bus.backend = backend;
        }
        if let Some(agent_id) = lookup("MESSAGE_BUS_AGENT_ID") {
            config.bus.agent_id = agent_id;
        }
        if config.bus.backend == BusType::Redis {
            let mut redis = config.bus.redis.take().unwrap_or_default();
            if let Some(url) = lookup("REDIS_URL") {
                redis.url = url;
            }
            if let Some(stream) = lookup("MESSAGE_BUS_STREAM") {
                redis.stream = stream;
            }
            if let Some(maxlen) = parse_var(&lookup, "MESSAGE_BUS_MAXLEN")? {
                redis.max_len = maxlen;
            }
            if let Some(consumer) = lookup("MESSAGE_BUS_CONSUMER") {
                redis.consumer = Some(consumer);
            }
            config.bus.redis = Some(redis);
        }

        if let Some(level) = lookup("LOG_LEVEL") {
            config.logging.level = level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field consistency.
    pub fn validate(&self) -> Result<()> {
        self.governance.validate()?;
        self.coordinator.validate()?;
        if self.panel.is_empty() {
            return Err(Error::EmptyPanel);
        }
        if self.bus.backend == BusType::Redis && self.bus.redis.is_none() {
            return Err(Error::Config(
                "redis settings required for the redis bus".to_string(),
            ));
        }
        Ok(())
    }

    /// Redis settings, falling back to defaults.
    pub fn redis(&self) -> RedisBusConfig {
        self.bus.redis.clone().unwrap_or_default()
    }
}

fn parse_var<T: FromStr>(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Config(format!("{} has an invalid value: {:?}", key, raw))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.panel.len(), 5);
        assert_eq!(config.governance.auto_approve_limit, 50.0);
        assert_eq!(config.governance.human_review_limit, 100.0);
        assert_eq!(config.bus.backend, BusType::Memory);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_panel_rejected() {
        let config = Config {
            panel: Vec::new(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::EmptyPanel)));
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        let parsed: Result<Option<f64>> = parse_var(|_| Some("fifty".to_string()), "LIMIT");
        assert!(matches!(parsed, Err(Error::Config(_))));

        let parsed: Option<f64> = parse_var(|_| Some(" 75.5 ".to_string()), "LIMIT").unwrap();
        assert_eq!(parsed, Some(75.5));

        let missing: Option<f64> = parse_var(|_| None, "LIMIT").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_limits_move_bands() {
        let config = load(&[
            ("PENTARCHY_AUTO_APPROVE_LIMIT", "20"),
            ("PENTARCHY_HUMAN_REVIEW_LIMIT", "200"),
        ])
        .unwrap();
        assert_eq!(config.governance.auto_approve_limit, 20.0);
        assert_eq!(config.governance.bands.medium_from, 20.0);
        assert_eq!(config.governance.bands.high_from, 200.0);
        assert_eq!(config.governance.bands.critical_from, 1000.0);
    }

    #[test]
    fn test_review_limit_above_critical_band() {
        let config = load(&[("PENTARCHY_HUMAN_REVIEW_LIMIT", "1500")]).unwrap();
        assert_eq!(config.governance.human_review_limit, 1500.0);
        assert_eq!(config.governance.bands.high_from, 100.0);
        assert_eq!(config.governance.bands.critical_from, 1000.0);

        let config = load(&[
            ("PENTARCHY_HUMAN_REVIEW_LIMIT", "1500"),
            ("PENTARCHY_CRITICAL_FROM", "5000"),
        ])
        .unwrap();
        assert_eq!(config.governance.bands.high_from, 1500.0);
        assert_eq!(config.governance.bands.critical_from, 5000.0);
    }

    #[test]
    fn test_inconsistent_limits_rejected() {
        let loaded = load(&[
            ("PENTARCHY_AUTO_APPROVE_LIMIT", "300"),
            ("PENTARCHY_HUMAN_REVIEW_LIMIT", "200"),
        ]);
        assert!(matches!(loaded, Err(Error::Config(_))));
        assert!(load(&[("PENTARCHY_CRITICAL_FROM", "10")]).is_err());
    }

    #[test]
    fn test_redis_settings_from_lookup() {
        let config = load(&[
            ("MESSAGE_BUS_TYPE", "redis"),
            ("REDIS_URL", "redis://cache:6379"),
            ("MESSAGE_BUS_CONSUMER", "zeus-1"),
            ("PENTARCHY_PANEL", "athena, aegis"),
        ])
        .unwrap();
        assert_eq!(config.bus.backend, BusType::Redis);
        assert_eq!(config.redis().url, "redis://cache:6379");
        assert_eq!(config.redis().consumer.as_deref(), Some("zeus-1"));
        assert_eq!(config.panel, vec!["athena".to_string(), "aegis".to_string()]);
    }
}
