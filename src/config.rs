//! Layered application configuration.
//!
//! Values merge from a `wipr.toml` file, `WIPR_`-prefixed environment
//! variables, and serialized CLI overrides, in that order of precedence.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "wipr.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Use the in-memory discovery adapter instead of real devices.
    pub simulation: bool,
    pub verbose: bool,
    pub json_logs: bool,
    /// Milliseconds slept after each accounted file during a wipe.
    pub wipe_file_pace_ms: u64,
    /// Static configuration handed over by the external credential store.
    /// Carried only; the discovery and wipe engines never read it.
    pub enterprise: Option<EnterpriseConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnterpriseConfig {
    pub connection_key: String,
    pub remote_host: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            simulation: false,
            verbose: false,
            json_logs: false,
            wipe_file_pace_ms: 10,
            enterprise: None,
        }
    }
}

impl AppConfig {
    pub fn new<A: Serialize>(overrides: Option<&A>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed("WIPR_"));
        if let Some(overrides) = overrides {
            figment = figment.merge(Serialized::defaults(overrides));
        }

        let mut config: AppConfig = figment.extract().context("Failed to load configuration")?;
        if let Some(enterprise) = config.enterprise.as_mut() {
            enterprise.connection_key = normalize_connection_key(&enterprise.connection_key)?;
        }
        Ok(config)
    }

    pub fn file_pace(&self) -> Duration {
        Duration::from_millis(self.wipe_file_pace_ms)
    }
}

/// Connection keys arrive with incidental whitespace; strip it and require
/// exactly 16 characters.
fn normalize_connection_key(raw: &str) -> Result<String> {
    let key: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if key.is_empty() {
        bail!("enterprise connection key is empty");
    }
    if key.chars().count() != 16 {
        bail!("enterprise connection key must be of length 16");
    }
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Overrides {
        #[serde(skip_serializing_if = "Option::is_none")]
        simulation: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        wipe_file_pace_ms: Option<u64>,
    }

    #[test]
    fn defaults_apply_without_sources() {
        let config = AppConfig::new(None::<&Overrides>).unwrap();
        assert!(!config.simulation);
        assert_eq!(config.wipe_file_pace_ms, 10);
        assert!(config.enterprise.is_none());
    }

    #[test]
    fn cli_overrides_take_precedence() {
        let overrides = Overrides {
            simulation: Some(true),
            wipe_file_pace_ms: Some(0),
        };
        let config = AppConfig::new(Some(&overrides)).unwrap();
        assert!(config.simulation);
        assert_eq!(config.file_pace(), Duration::ZERO);
    }

    #[test]
    fn connection_key_whitespace_is_stripped() {
        assert_eq!(
            normalize_connection_key("abcd efgh ijkl mnop").unwrap(),
            "abcdefghijklmnop"
        );
    }

    #[test]
    fn short_connection_keys_are_rejected() {
        assert!(normalize_connection_key("too-short").is_err());
        assert!(normalize_connection_key("   ").is_err());
    }
}
