//! Configuration loading and management
//!
//! Handles parsing of `gantry.toml` configuration files kept in the data
//! directory. A changed nesting ceiling applies to future create/move
//! operations only; existing deeper trees are flagged by the next
//! validation pass, never truncated.

use std::path::Path;

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::aggregate::ConflictPolicy;
use crate::error::{Error, Result};

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE: &str = "gantry.toml";

/// Highest ceiling the engine accepts.
pub const MAX_CEILING: u32 = 100;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Depth limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Working-day calendar
    #[serde(default)]
    pub calendar: CalendarConfig,

    /// Duration rollup behavior
    #[serde(default)]
    pub aggregation: AggregationConfig,
}

/// Depth-limit configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Nesting ceiling: maximum depth (max level + 1), 1 to 100
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

fn default_max_depth() -> u32 {
    MAX_CEILING
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

/// Calendar configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// The weekly non-working day, by English weekday name
    #[serde(default = "default_rest_day")]
    pub rest_day: String,
}

fn default_rest_day() -> String {
    "sunday".to_string()
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            rest_day: default_rest_day(),
        }
    }
}

impl CalendarConfig {
    pub fn weekday(&self) -> Result<Weekday> {
        parse_weekday(&self.rest_day)
    }
}

/// Aggregation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// Conflict policy for divergent rollups
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

fn parse_weekday(value: &str) -> Result<Weekday> {
    match value.trim().to_ascii_lowercase().as_str() {
        "monday" | "mon" => Ok(Weekday::Mon),
        "tuesday" | "tue" => Ok(Weekday::Tue),
        "wednesday" | "wed" => Ok(Weekday::Wed),
        "thursday" | "thu" => Ok(Weekday::Thu),
        "friday" | "fri" => Ok(Weekday::Fri),
        "saturday" | "sat" => Ok(Weekday::Sat),
        "sunday" | "sun" => Ok(Weekday::Sun),
        other => Err(Error::InvalidConfig(format!(
            "calendar.rest_day: unknown weekday '{other}'"
        ))),
    }
}

impl Config {
    /// Load configuration from a `gantry.toml` file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the data directory, or return defaults
    pub fn load_from_dir(data_dir: &Path) -> Self {
        let config_path = data_dir.join(CONFIG_FILE);
        if config_path.exists() {
            Self::load(&config_path).unwrap_or_default()
        } else {
            Self::default()
        }
    }

    /// Save configuration to the data directory
    pub fn save_to_dir(&self, data_dir: &Path) -> Result<()> {
        self.validate()?;
        std::fs::create_dir_all(data_dir)?;
        let content = toml::to_string_pretty(self)?;
        std::fs::write(data_dir.join(CONFIG_FILE), content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.limits.max_depth == 0 || self.limits.max_depth > MAX_CEILING {
            return Err(Error::InvalidConfig(format!(
                "limits.max_depth must be between 1 and {MAX_CEILING}, got {}",
                self.limits.max_depth
            )));
        }
        self.calendar.weekday()?;
        Ok(())
    }
}
