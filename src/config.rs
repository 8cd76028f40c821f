//! Configuration
//!
//! Layered the usual way: built-in defaults, then a TOML file
//! (`pscontrol.toml` in the working directory, or an explicit path), then
//! `PSCONTROL__SECTION__KEY` environment variables. A `.env` file is loaded
//! first when present.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::interpreter::errors::PsError;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub errors: ErrorPolicy,
    pub device: DeviceConfig,
}

/// Stack limits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_exec_depth: usize,
    pub exec_segment_size: usize,
    pub max_operand_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            max_exec_depth: 5000,
            exec_segment_size: 250,
            max_operand_depth: 800,
        }
    }
}

/// Which errors the trap may hand to an enclosing `stopped`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ErrorPolicy {
    /// Error names that always abort the job
    pub uncatchable: Vec<String>,
}

impl ErrorPolicy {
    pub fn is_catchable(&self, err: &PsError) -> bool {
        !err.is_interrupt() && !self.uncatchable.iter().any(|name| name == err.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Colorants the output device renders natively
    pub colorants: Vec<String>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            colorants: ["Cyan", "Magenta", "Yellow", "Black"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DeviceConfig {
    pub fn has_colorant(&self, name: &str) -> bool {
        self.colorants.iter().any(|c| c == name)
    }
}

/* ===================== Loading ===================== */

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config_path: Option<PathBuf>,
}

impl ConfigBuilder {
    pub fn config_path(mut self, path: Option<impl Into<PathBuf>>) -> Self {
        self.config_path = path.map(Into::into);
        self
    }

    pub fn build(self) -> Result<Config> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Config::default())?);

        builder = match &self.config_path {
            Some(path) => builder.add_source(config::File::from(path.as_path()).required(true)),
            None => builder.add_source(config::File::with_name("pscontrol").required(false)),
        };

        let settings = builder
            .add_source(config::Environment::with_prefix("PSCONTROL").separator("__"))
            .build()
            .context("Failed to load configuration")?;

        let config: Config = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }
}

impl Config {
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Defaults, `pscontrol.toml` and the environment
    pub fn load() -> Result<Config> {
        Config::builder()
            .config_path(std::env::var("PSCONTROL_CONFIG_PATH").ok())
            .build()
    }

    pub fn validate(&self) -> Result<()> {
        if self.engine.exec_segment_size == 0 {
            bail!("engine.exec_segment_size must be at least 1");
        }
        if self.engine.max_exec_depth < 16 {
            bail!(
                "engine.max_exec_depth must be at least 16, got {}",
                self.engine.max_exec_depth
            );
        }
        if self.engine.max_operand_depth == 0 {
            bail!("engine.max_operand_depth must be at least 1");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.engine.max_exec_depth, 5000);
        assert!(config.device.has_colorant("Black"));
        assert!(!config.device.has_colorant("Gold"));
    }

    #[test]
    fn test_policy_never_catches_interrupts() {
        let policy = ErrorPolicy {
            uncatchable: vec!["rangecheck".to_string()],
        };
        assert!(!policy.is_catchable(&PsError::NeedInput));
        assert!(!policy.is_catchable(&PsError::Quit));
        assert!(!policy.is_catchable(&PsError::RangeCheck));
        assert!(policy.is_catchable(&PsError::TypeCheck));
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = Config::default();
        config.engine.exec_segment_size = 8;
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validate_rejects_tiny_stack() {
        let mut config = Config::default();
        config.engine.max_exec_depth = 4;
        assert!(config.validate().is_err());
    }
}
