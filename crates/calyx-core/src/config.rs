use std::collections::HashMap;

use anyhow::Result;
use config::{Config, ConfigBuilder, builder::DefaultState};
use serde::Deserialize;

use crate::error::{CoreError, CoreResult};

/// Default horizon for unbounded recurrences, in years.
pub const DEFAULT_MAX_YEARS: u32 = 10;

/// Default hard cap on materialized occurrences per master.
pub const DEFAULT_MAX_INSTANCES: usize = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub recurrence: RecurrenceConfig,
    pub logging: LoggingConfig,
}

/// What the save workflows do with a recurring event that expands to nothing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroInstancePolicy {
    /// Refuse the save.
    #[default]
    Reject,
    /// Strip the recurrence properties and store a single event.
    Demote,
}

/// Per-principal narrowing of the system bounds.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PrincipalLimits {
    pub max_years: Option<u32>,
    pub max_instances: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RecurrenceConfig {
    #[serde(default = "default_max_years")]
    pub max_years: u32,
    #[serde(default = "default_max_instances")]
    pub max_instances: usize,
    #[serde(default)]
    pub zero_instance_policy: ZeroInstancePolicy,
    /// Zone used when floating values must be compared with absolute ones.
    #[serde(default = "default_floating_timezone")]
    pub floating_timezone: String,
    #[serde(default)]
    pub principals: HashMap<String, PrincipalLimits>,
}

const fn default_max_years() -> u32 {
    DEFAULT_MAX_YEARS
}

const fn default_max_instances() -> usize {
    DEFAULT_MAX_INSTANCES
}

fn default_floating_timezone() -> String {
    "UTC".to_string()
}

impl Default for RecurrenceConfig {
    fn default() -> Self {
        Self {
            max_years: DEFAULT_MAX_YEARS,
            max_instances: DEFAULT_MAX_INSTANCES,
            zero_instance_policy: ZeroInstancePolicy::default(),
            floating_timezone: default_floating_timezone(),
            principals: HashMap::new(),
        }
    }
}

/// Effective expansion bounds for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpansionLimits {
    pub max_years: u32,
    pub max_instances: usize,
}

impl Default for ExpansionLimits {
    fn default() -> Self {
        Self {
            max_years: DEFAULT_MAX_YEARS,
            max_instances: DEFAULT_MAX_INSTANCES,
        }
    }
}

impl RecurrenceConfig {
    /// ## Summary
    /// Returns the bounds that apply to `principal`.
    ///
    /// Principal entries can only tighten the system bounds.
    #[must_use]
    pub fn limits_for(&self, principal: Option<&str>) -> ExpansionLimits {
        let system = ExpansionLimits {
            max_years: self.max_years,
            max_instances: self.max_instances,
        };

        let Some(entry) = principal.and_then(|name| self.principals.get(name)) else {
            return system;
        };

        ExpansionLimits {
            max_years: entry
                .max_years
                .map_or(system.max_years, |years| years.min(system.max_years)),
            max_instances: entry
                .max_instances
                .map_or(system.max_instances, |count| count.min(system.max_instances)),
        }
    }

    /// ## Summary
    /// Rejects bounds that would make expansion meaningless.
    ///
    /// ## Errors
    /// Returns `CoreError::LimitOutOfRange` for a zero system or principal bound.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_years == 0 {
            return Err(CoreError::LimitOutOfRange {
                name: "recurrence.max_years",
                value: 0,
            });
        }
        if self.max_instances == 0 {
            return Err(CoreError::LimitOutOfRange {
                name: "recurrence.max_instances",
                value: 0,
            });
        }
        for (name, limits) in &self.principals {
            if limits.max_years == Some(0) || limits.max_instances == Some(0) {
                return Err(CoreError::ConfigError(format!(
                    "principal {name} has a zero recurrence bound"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
}

impl Settings {
    fn builder() -> Result<ConfigBuilder<DefaultState>> {
        Ok(Config::builder()
            .set_default("logging.level", "debug")?
            .set_default("recurrence.max_years", i64::from(DEFAULT_MAX_YEARS))?
            .set_default(
                "recurrence.max_instances",
                i64::try_from(DEFAULT_MAX_INSTANCES)?,
            )?)
    }

    /// ## Summary
    /// Loads configuration from environment variables and an optional `config.toml`.
    ///
    /// Environment keys use the `CALYX_` prefix and `__` between sections,
    /// e.g. `CALYX_RECURRENCE__MAX_YEARS=5`.
    ///
    /// ## Errors
    /// Returns an error if building, deserializing or validating the configuration fails.
    pub fn load() -> Result<Self> {
        let settings = Self::builder()?
            .add_source(
                config::Environment::with_prefix("CALYX")
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .add_source(config::File::with_name("config.toml").required(false))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.recurrence.validate()?;
        Ok(settings)
    }

    /// ## Summary
    /// Builds settings from TOML text layered over the defaults.
    ///
    /// ## Errors
    /// Returns an error if the text is not valid TOML for `Settings` or fails validation.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let settings = Self::builder()?
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?
            .try_deserialize::<Settings>()?;
        settings.recurrence.validate()?;
        Ok(settings)
    }
}

/// ## Summary
/// Loads configuration from environment variables and `.env` file.
///
/// ## Errors
/// Returns an error if loading or deserializing the configuration fails.
pub fn load_config() -> Result<Settings> {
    dotenvy::dotenv().ok();

    let settings = Settings::load()?;
    tracing::debug!(
        max_years = settings.recurrence.max_years,
        max_instances = settings.recurrence.max_instances,
        "Recurrence limits loaded"
    );
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_without_recurrence_section() {
        let settings = Settings::from_toml_str("").expect("defaults are valid");
        assert_eq!(settings.logging.level, "debug");
        assert_eq!(settings.recurrence.max_years, DEFAULT_MAX_YEARS);
        assert_eq!(settings.recurrence.max_instances, DEFAULT_MAX_INSTANCES);
        assert_eq!(
            settings.recurrence.zero_instance_policy,
            ZeroInstancePolicy::Reject
        );
        assert_eq!(settings.recurrence.floating_timezone, "UTC");
    }

    #[test]
    fn principal_limits_only_narrow() {
        let settings = Settings::from_toml_str(
            r#"
            [recurrence]
            max_years = 5
            max_instances = 200
            zero_instance_policy = "demote"

            [recurrence.principals.alice]
            max_instances = 50

            [recurrence.principals.bob]
            max_years = 20
            "#,
        )
        .expect("valid settings");

        let recurrence = &settings.recurrence;
        assert_eq!(recurrence.zero_instance_policy, ZeroInstancePolicy::Demote);
        assert_eq!(
            recurrence.limits_for(Some("alice")),
            ExpansionLimits {
                max_years: 5,
                max_instances: 50
            }
        );
        assert_eq!(
            recurrence.limits_for(Some("bob")),
            ExpansionLimits {
                max_years: 5,
                max_instances: 200
            }
        );
        assert_eq!(
            recurrence.limits_for(Some("carol")),
            recurrence.limits_for(None)
        );
    }

    #[test]
    fn zero_bounds_are_rejected() {
        let err = Settings::from_toml_str("[recurrence]\nmax_instances = 0\n")
            .expect_err("zero instances is invalid");
        assert!(err.to_string().contains("max_instances"));

        let config = RecurrenceConfig {
            principals: HashMap::from([(
                "eve".to_string(),
                PrincipalLimits {
                    max_years: Some(0),
                    max_instances: None,
                },
            )]),
            ..RecurrenceConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::ConfigError(_))));
    }

    #[test]
    fn limits_deserialize_from_json() {
        let config: RecurrenceConfig =
            serde_json::from_str(r#"{"max_years": 2}"#).expect("partial config");
        assert_eq!(config.max_years, 2);
        assert_eq!(config.max_instances, DEFAULT_MAX_INSTANCES);
    }
}
