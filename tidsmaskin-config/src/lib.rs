//! # Tidsmaskin Configuration System
//!
//! Describes which clock a process runs on and which redirect points it governs.
//!
//! ## Features
//! - **Argument Grammar**: `offset=5000,scaled=2,includesMethods=sleep:park`
//! - **Layered Files**: defaults, `config/tidsmaskin.yaml`, `TIDSMASKIN_*` environment
//! - **Validation**: malformed entries and unknown redirect points fail before any clock is built

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tidsmaskin_core::intercept::{CallSite, InterceptSet};
use tracing::{debug, warn};
use validator::Validate;

mod chain;
mod clock_spec;
mod error;
mod validation;

pub use chain::ClockChain;
pub use clock_spec::{ClockSpec, OffsetSpec};
pub use error::ConfigError;

const DEFAULT_CONFIG_FILE: &str = "config/tidsmaskin.yaml";
const INCLUDES_METHODS: &str = "includesMethods";

/// Clock chain and intercept allow-list, as configured.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ClockConfig {
    /// `key=value` clock parameters, applied in order on top of the system clock.
    #[serde(default)]
    #[validate(custom(function = validation::validate_chain))]
    pub chain: Vec<String>,

    /// Redirect points governed by the clock. All of them when absent.
    #[serde(default)]
    #[validate(custom(function = validation::validate_intercepts))]
    pub intercept: Option<Vec<String>>,
}

impl ClockConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values (system clock, every call site redirected)
    /// 2. `config/tidsmaskin.yaml`, if present
    /// 3. `TIDSMASKIN_*` environment variables
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(ClockConfig::default()));

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_FILE));
        } else {
            debug!("{DEFAULT_CONFIG_FILE} not found, using default configuration");
        }

        Self::extract(figment.merge(Env::prefixed("TIDSMASKIN_").split("__")))
    }

    /// Load configuration from a specific path, with environment overrides.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        Self::extract(
            Figment::from(Serialized::defaults(ClockConfig::default()))
                .merge(Yaml::file(path))
                .merge(Env::prefixed("TIDSMASKIN_").split("__")),
        )
    }

    /// Parses the comma-separated argument form.
    ///
    /// A key given twice keeps its first position and its last value.
    /// `includesMethods` takes a `:`-separated list of redirect points.
    pub fn from_args(args: &str) -> Result<Self, ConfigError> {
        let mut config = ClockConfig::default();
        for param in args.split(',').filter(|param| !param.is_empty()) {
            let (key, value) = param.split_once('=').unwrap_or((param, ""));
            if key == INCLUDES_METHODS {
                config.intercept = Some(
                    value
                        .split(':')
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                        .collect(),
                );
                continue;
            }
            let existing = config
                .chain
                .iter_mut()
                .find(|entry| entry.split_once('=').map_or(entry.as_str(), |(k, _)| k) == key);
            match existing {
                Some(entry) => *entry = param.to_string(),
                None => config.chain.push(param.to_string()),
            }
        }
        config.validate()?;
        Ok(config)
    }

    /// Parsed clock parameters. Unsupported keys are logged and skipped.
    pub fn specs(&self) -> Result<Vec<ClockSpec>, ConfigError> {
        let mut specs = Vec::with_capacity(self.chain.len());
        for entry in &self.chain {
            match entry.parse::<ClockSpec>() {
                Ok(spec) => specs.push(spec),
                Err(ConfigError::UnsupportedKey(key)) => {
                    warn!(%key, "unsupported clock parameter ignored");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(specs)
    }

    pub fn intercepts(&self) -> Result<InterceptSet, ConfigError> {
        let Some(names) = &self.intercept else {
            return Ok(InterceptSet::all());
        };
        names
            .iter()
            .map(|name| {
                name.parse::<CallSite>()
                    .map_err(|_| ConfigError::UnknownIntercept(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(InterceptSet::from_sites)
    }

    /// Builds the configured clock chain.
    pub fn build(&self) -> Result<ClockChain, ConfigError> {
        ClockChain::build(&self.specs()?, self.intercepts()?)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;
    use tidsmaskin_core::time::Clock;
    use tracing_test::traced_test;

    #[test]
    fn default_config_validation() {
        let config = ClockConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.intercepts().unwrap(), InterceptSet::all());
        assert_eq!(config.build().unwrap().to_string(), "SystemClock");
    }

    #[test]
    fn parses_argument_form() {
        let config = ClockConfig::from_args("offset=5000,scaled=2,includesMethods=sleep:park").unwrap();
        assert_eq!(config.chain, vec!["offset=5000", "scaled=2"]);
        assert_eq!(
            config.intercepts().unwrap(),
            InterceptSet::from_sites([CallSite::Sleep, CallSite::Park])
        );
        assert_eq!(
            config.specs().unwrap(),
            vec![ClockSpec::Offset(OffsetSpec::Millis(5000)), ClockSpec::Scaled(2.0)]
        );
    }

    #[test]
    fn repeated_keys_keep_first_position() {
        let config = ClockConfig::from_args("offset=1,scaled=2,offset=3").unwrap();
        assert_eq!(config.chain, vec!["offset=3", "scaled=2"]);
    }

    #[test]
    fn unknown_intercepts_are_rejected() {
        assert!(matches!(
            ClockConfig::from_args("includesMethods=sleep:yield"),
            Err(ConfigError::Validation(_))
        ));
        let config = ClockConfig {
            chain: Vec::new(),
            intercept: Some(vec!["yield".into()]),
        };
        assert!(matches!(config.intercepts(), Err(ConfigError::UnknownIntercept(name)) if name == "yield"));
    }

    #[traced_test]
    #[test]
    fn unsupported_keys_are_ignored() {
        let config = ClockConfig::from_args("frozen=1,offset=10").unwrap();
        assert_eq!(config.specs().unwrap(), vec![ClockSpec::Offset(OffsetSpec::Millis(10))]);
        assert!(logs_contain("unsupported clock parameter ignored"));
    }

    #[test]
    fn malformed_values_fail_the_build() {
        let config = ClockConfig::from_args("scaled=-1").unwrap();
        assert!(matches!(config.build(), Err(ConfigError::Clock(_))));
        let config = ClockConfig::from_args("offset=tomorrow").unwrap();
        assert!(matches!(config.build(), Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("absent.yaml");
        assert!(matches!(
            ClockConfig::load_from_path(&missing),
            Err(ConfigError::FileNotFound(path)) if path == missing
        ));
    }

    #[test]
    fn loads_file_and_environment() {
        Jail::expect_with(|jail| {
            jail.create_dir("config")?;
            jail.create_file(
                "config/tidsmaskin.yaml",
                r#"
chain:
  - manual=1000
  - offset=500
intercept: [currentTimeMillis, nanoTime]
"#,
            )?;
            let config = ClockConfig::load().map_err(|err| err.to_string())?;
            assert_eq!(config.chain, vec!["manual=1000", "offset=500"]);
            assert_eq!(
                config.intercepts().map_err(|err| err.to_string())?,
                InterceptSet::from_sites([CallSite::CurrentTimeMillis, CallSite::NanoTime])
            );

            jail.set_env("TIDSMASKIN_INTERCEPT", "[sleep]");
            let config = ClockConfig::load().map_err(|err| err.to_string())?;
            assert_eq!(config.intercept, Some(vec!["sleep".to_string()]));

            let chain = config.build().map_err(|err| err.to_string())?;
            assert_eq!(chain.clock().wall_millis(), 1_500);
            Ok(())
        });
    }
}
