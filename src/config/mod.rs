//! Engine configuration

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::decision::{REMEDIATION_BAN, REMEDIATION_BYPASS, REMEDIATION_CAPTCHA};
use crate::error::{ConfigError, Result};

/// Operating policy capping the maximum severity ever returned
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BouncingLevel {
    /// Everything resolves to bypass
    Disabled,
    /// At most a captcha challenge
    Flex,
    /// Unrestricted
    #[default]
    Normal,
}

impl BouncingLevel {
    /// The most severe remediation this level permits
    pub fn max_remediation(&self) -> &'static str {
        match self {
            BouncingLevel::Disabled => REMEDIATION_BYPASS,
            BouncingLevel::Flex => REMEDIATION_CAPTCHA,
            BouncingLevel::Normal => REMEDIATION_BAN,
        }
    }
}

/// Geolocation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeolocationConfig {
    /// Whether country-scope lookups are performed at all
    #[serde(default)]
    pub enabled: bool,

    /// How long a resolved country is cached, in seconds
    #[serde(default = "default_geolocation_cache_duration")]
    pub cache_duration: i64,

    /// Whether resolved countries are written back to the cache
    #[serde(default = "default_true")]
    pub save_result: bool,
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cache_duration: default_geolocation_cache_duration(),
            save_result: true,
        }
    }
}

/// Remediation engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remediation names ordered from most to least severe; `bypass` is
    /// always forced into last position by `validate`
    #[serde(default = "default_ordered_remediations")]
    pub ordered_remediations: Vec<String>,

    /// Substitute for decision types absent from `ordered_remediations`
    #[serde(default = "default_fallback_remediation")]
    pub fallback_remediation: String,

    /// Whether the cache is fed by a stream and considered authoritative
    #[serde(default = "default_true")]
    pub stream_mode: bool,

    /// Ceiling, in seconds, on the cache lifetime of non-bypass decisions
    /// outside stream mode
    #[serde(default = "default_bad_ip_cache_duration")]
    pub bad_ip_cache_duration: i64,

    /// Cache lifetime, in seconds, of a clean verdict outside stream mode
    #[serde(default = "default_clean_ip_cache_duration")]
    pub clean_ip_cache_duration: i64,

    #[serde(default)]
    pub bouncing_level: BouncingLevel,

    #[serde(default)]
    pub geolocation: GeolocationConfig,
}

fn default_ordered_remediations() -> Vec<String> {
    vec![
        REMEDIATION_BAN.to_string(),
        REMEDIATION_CAPTCHA.to_string(),
        REMEDIATION_BYPASS.to_string(),
    ]
}

fn default_fallback_remediation() -> String {
    REMEDIATION_BYPASS.to_string()
}

fn default_true() -> bool {
    true
}

fn default_bad_ip_cache_duration() -> i64 {
    120
}

fn default_clean_ip_cache_duration() -> i64 {
    60
}

fn default_geolocation_cache_duration() -> i64 {
    86_400
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ordered_remediations: default_ordered_remediations(),
            fallback_remediation: default_fallback_remediation(),
            stream_mode: true,
            bad_ip_cache_duration: default_bad_ip_cache_duration(),
            clean_ip_cache_duration: default_clean_ip_cache_duration(),
            bouncing_level: BouncingLevel::default(),
            geolocation: GeolocationConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Get the default config file path (~/.veto/config.yaml)
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".veto").join("config.yaml"))
    }

    /// Load configuration from a specific path and validate it
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;

        config.validate()
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Normalize and check the configuration.
    ///
    /// Removes duplicate remediations, forces `bypass` into last position,
    /// and requires the fallback to be `bypass` or a member of the ordered
    /// list. Durations must be positive.
    pub fn validate(mut self) -> Result<Self> {
        let mut ordered: Vec<String> = Vec::new();
        for remediation in self.ordered_remediations.drain(..) {
            if remediation.is_empty() {
                return Err(
                    ConfigError::Invalid("ordered_remediations cannot contain an empty name".to_string()).into(),
                );
            }
            if remediation != REMEDIATION_BYPASS && !ordered.contains(&remediation) {
                ordered.push(remediation);
            }
        }
        ordered.push(REMEDIATION_BYPASS.to_string());
        self.ordered_remediations = ordered;

        if self.fallback_remediation != REMEDIATION_BYPASS
            && !self.ordered_remediations.contains(&self.fallback_remediation)
        {
            return Err(ConfigError::Invalid(
                "fallback_remediation must belong to ordered_remediations".to_string(),
            )
            .into());
        }

        if self.bad_ip_cache_duration < 1
            || self.clean_ip_cache_duration < 1
            || self.geolocation.cache_duration < 1
        {
            return Err(
                ConfigError::Invalid("cache durations must be at least 1 second".to_string()).into(),
            );
        }

        Ok(self)
    }
}
