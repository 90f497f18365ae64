// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Engine configuration
//!
//! ```yaml
//! page_limit: 5000
//! synthesis:
//!   - source: hourly
//!     target: daily
//! ```

use crate::error::ConfigError;
use crate::period::PeriodType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Records the backend returns in one fetch
pub const VALUE_LIMIT: usize = 5000;

/// A source granularity that is composited into a coarser output granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SynthesisPairing {
    pub source: PeriodType,
    pub target: PeriodType,
}

fn default_page_limit() -> usize {
    VALUE_LIMIT
}

fn default_synthesis() -> Vec<SynthesisPairing> {
    vec![SynthesisPairing {
        source: PeriodType::Hourly,
        target: PeriodType::Daily,
    }]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Per-call record cap of the backend
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Granularity pairings for which per-bucket composites are built
    #[serde(default = "default_synthesis")]
    pub synthesis: Vec<SynthesisPairing>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            page_limit: default_page_limit(),
            synthesis: default_synthesis(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_limit == 0 {
            return Err(ConfigError::InvalidConfig(
                "page_limit must be greater than 0".to_string(),
            ));
        }
        for pairing in &self.synthesis {
            if !pairing.source.is_one_finer_than(pairing.target) {
                return Err(ConfigError::InvalidConfig(format!(
                    "synthesis source {} must be exactly one level finer than target {}",
                    pairing.source, pairing.target
                )));
            }
        }
        Ok(())
    }

    /// Whether data of `source` granularity is composited for `target` output
    #[must_use]
    pub fn synthesizes(&self, source: PeriodType, target: PeriodType) -> bool {
        source.is_one_finer_than(target)
            && self
                .synthesis
                .iter()
                .any(|p| p.source == source && p.target == target)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_yaml_ng::from_str(content)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

/// Load configuration from a YAML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let content = std::fs::read_to_string(&path).map_err(|e| {
        ConfigError::InvalidConfig(format!(
            "failed to read config file {}: {e}",
            path.as_ref().display()
        ))
    })?;
    EngineConfig::from_yaml(&content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.page_limit, 5000);
        assert!(config.synthesizes(PeriodType::Hourly, PeriodType::Daily));
        assert!(!config.synthesizes(PeriodType::Daily, PeriodType::Weekly));
        assert!(!config.synthesizes(PeriodType::Daily, PeriodType::Daily));
        assert_eq!(config.validate(), Ok(()));
    }

    #[test]
    fn test_yaml_overrides() -> Result<(), ConfigError> {
        let config = EngineConfig::from_yaml(
            "page_limit: 100\nsynthesis:\n  - source: daily\n    target: weekly\n",
        )?;
        assert_eq!(config.page_limit, 100);
        assert!(config.synthesizes(PeriodType::Daily, PeriodType::Weekly));
        assert!(!config.synthesizes(PeriodType::Hourly, PeriodType::Daily));
        Ok(())
    }

    #[test]
    fn test_empty_yaml_uses_defaults() -> Result<(), ConfigError> {
        assert_eq!(EngineConfig::from_yaml("{}")?, EngineConfig::default());
        Ok(())
    }

    #[test]
    fn test_invalid_configs() {
        assert!(matches!(
            EngineConfig::from_yaml("page_limit: 0"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml("synthesis:\n  - source: monthly\n    target: daily\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml("synthesis:\n  - source: hourly\n    target: weekly\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        assert!(matches!(
            EngineConfig::from_yaml("synthesis:\n  - source: daily\n    target: daily\n"),
            Err(ConfigError::InvalidConfig(_))
        ));
        let skipping = EngineConfig {
            synthesis: vec![SynthesisPairing {
                source: PeriodType::Hourly,
                target: PeriodType::Monthly,
            }],
            ..EngineConfig::default()
        };
        assert!(matches!(skipping.validate(), Err(ConfigError::InvalidConfig(_))));
        assert!(matches!(
            EngineConfig::from_yaml("page_size: 10"),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_load_config_from_file() -> Result<(), Box<dyn std::error::Error>> {
        let mut file = tempfile::NamedTempFile::new()?;
        writeln!(file, "page_limit: 250")?;
        let config = load_config(file.path())?;
        assert_eq!(config.page_limit, 250);
        assert!(load_config("/nonexistent/regionstats.yaml").is_err());
        Ok(())
    }
}
