use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use asset_core::{ConfigurationError, ScoringWeights, DEFAULT_HAMMING_THRESHOLD};
use serde::{Deserialize, Serialize};

use crate::crawler::DEFAULT_USER_AGENTS;
use crate::providers::{SOURCE_PAGES_PROVIDER, WIKIPEDIA_PROVIDER, WIKIPEDIA_TEMPLATE};
use crate::section::DEFAULT_MAX_SECTION_IMAGES;

/// Environment variable naming a RON config file.
pub const CONFIG_PATH_ENV: &str = "HARVEST_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub weight: f64,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// Required for everything except the built-in `source_pages` provider.
    #[serde(default)]
    pub url_template: Option<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// Harvest configuration. Every field has a working default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Registry in priority order.
    pub providers: Vec<ProviderConfig>,
    pub rate_limit_interval_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub request_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub global_timeout_ms: u64,
    pub max_concurrent_providers: usize,
    pub max_section_images: usize,
    pub dedup_threshold: u32,
    pub max_body_bytes: u64,
    pub weights: ScoringWeights,
    pub user_agents: Vec<String>,
    pub blocked_hosts: Vec<String>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            providers: vec![
                ProviderConfig {
                    name: SOURCE_PAGES_PROVIDER.to_string(),
                    weight: 0.85,
                    enabled: true,
                    url_template: None,
                },
                ProviderConfig {
                    name: WIKIPEDIA_PROVIDER.to_string(),
                    weight: 0.70,
                    enabled: true,
                    url_template: Some(WIKIPEDIA_TEMPLATE.to_string()),
                },
            ],
            rate_limit_interval_ms: 1000,
            cache_ttl_secs: 7 * 24 * 60 * 60,
            cache_max_entries: 1024,
            request_timeout_ms: 15_000,
            max_attempts: 3,
            backoff_base_ms: 500,
            global_timeout_ms: 60_000,
            max_concurrent_providers: 4,
            max_section_images: DEFAULT_MAX_SECTION_IMAGES,
            dedup_threshold: DEFAULT_HAMMING_THRESHOLD,
            max_body_bytes: 8 * 1024 * 1024,
            weights: ScoringWeights::default(),
            user_agents: DEFAULT_USER_AGENTS.iter().map(|ua| ua.to_string()).collect(),
            blocked_hosts: Vec::new(),
        }
    }
}

impl HarvestConfig {
    /// Reads `path` (or `$HARVEST_CONFIG`, or nothing), applies environment
    /// overrides and validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let env_path = std::env::var(CONFIG_PATH_ENV).ok();
        let path = path.or(env_path.as_deref().map(Path::new));
        let mut config = match path {
            Some(path) => Self::from_ron_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(std::env::vars())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_ron_file(path: &Path) -> Result<Self, ConfigurationError> {
        let text = fs::read_to_string(path).map_err(|err| ConfigurationError::Read {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_ron_str(&text).map_err(|err| match err {
            ConfigurationError::Parse { message, .. } => ConfigurationError::Parse {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    pub fn from_ron_str(text: &str) -> Result<Self, ConfigurationError> {
        ron::from_str(text).map_err(|err| ConfigurationError::Parse {
            path: "<inline>".to_string(),
            message: err.to_string(),
        })
    }

    /// Applies `HARVEST_*` overrides from `vars`.
    pub fn apply_overrides<I>(&mut self, vars: I) -> Result<(), ConfigurationError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (name, value) in vars {
            let Some(key) = name.strip_prefix("HARVEST_") else {
                continue;
            };
            match key {
                "RATE_LIMIT_MS" => self.rate_limit_interval_ms = parse_env(&name, &value)?,
                "CACHE_TTL_SECS" => self.cache_ttl_secs = parse_env(&name, &value)?,
                "DEDUP_THRESHOLD" => self.dedup_threshold = parse_env(&name, &value)?,
                "GLOBAL_TIMEOUT_MS" => self.global_timeout_ms = parse_env(&name, &value)?,
                "MAX_CONCURRENCY" => self.max_concurrent_providers = parse_env(&name, &value)?,
                "REQUEST_TIMEOUT_MS" => self.request_timeout_ms = parse_env(&name, &value)?,
                _ => {
                    if let Some(provider) = key.strip_prefix("PROVIDER_") {
                        let enabled = parse_toggle(&name, &value)?;
                        let wanted = provider.to_ascii_lowercase();
                        if let Some(entry) = self
                            .providers
                            .iter_mut()
                            .find(|p| p.name.to_ascii_lowercase() == wanted)
                        {
                            entry.enabled = enabled;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.weights.validate()?;
        if self.dedup_threshold > 64 {
            return Err(ConfigurationError::Threshold(self.dedup_threshold));
        }
        let positive: [(&'static str, u64); 6] = [
            ("request_timeout_ms", self.request_timeout_ms),
            ("global_timeout_ms", self.global_timeout_ms),
            ("max_concurrent_providers", self.max_concurrent_providers as u64),
            ("max_section_images", self.max_section_images as u64),
            ("max_attempts", u64::from(self.max_attempts)),
            ("cache_max_entries", self.cache_max_entries as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigurationError::Zero { name });
            }
        }

        let mut seen = HashSet::new();
        for provider in &self.providers {
            if !seen.insert(provider.name.to_ascii_lowercase()) {
                return Err(ConfigurationError::DuplicateProvider(provider.name.clone()));
            }
            if !provider.weight.is_finite() || !(0.0..=1.0).contains(&provider.weight) {
                return Err(ConfigurationError::ProviderWeight {
                    name: provider.name.clone(),
                    weight: provider.weight,
                });
            }
            if provider.name != SOURCE_PAGES_PROVIDER {
                let usable = provider
                    .url_template
                    .as_deref()
                    .is_some_and(|t| t.contains("{title}") || t.contains("{slug}"));
                if !usable {
                    return Err(ConfigurationError::MissingTemplate(provider.name.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn rate_limit_interval(&self) -> Duration {
        Duration::from_millis(self.rate_limit_interval_ms)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn global_timeout(&self) -> Duration {
        Duration::from_millis(self.global_timeout_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigurationError> {
    value.trim().parse().map_err(|_| ConfigurationError::Env {
        name: name.to_string(),
        value: value.to_string(),
    })
}

fn parse_toggle(name: &str, value: &str) -> Result<bool, ConfigurationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "on" | "true" | "yes" => Ok(true),
        "0" | "off" | "false" | "no" => Ok(false),
        _ => Err(ConfigurationError::Env {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_are_valid() {
        HarvestConfig::default().validate().unwrap();
    }

    #[test]
    fn env_overrides_numbers_and_toggles() {
        let mut config = HarvestConfig::default();
        config
            .apply_overrides(vars(&[
                ("HARVEST_RATE_LIMIT_MS", "250"),
                ("HARVEST_DEDUP_THRESHOLD", "4"),
                ("HARVEST_PROVIDER_WIKIPEDIA", "off"),
                ("PATH", "/usr/bin"),
            ]))
            .unwrap();
        assert_eq!(config.rate_limit_interval_ms, 250);
        assert_eq!(config.dedup_threshold, 4);
        assert!(!config.providers[1].enabled);
        assert!(config.providers[0].enabled);
    }

    #[test]
    fn bad_env_value_is_a_configuration_error() {
        let mut config = HarvestConfig::default();
        let err = config
            .apply_overrides(vars(&[("HARVEST_MAX_CONCURRENCY", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigurationError::Env { .. }));
    }

    #[test]
    fn ron_fills_missing_fields_with_defaults() {
        let config = HarvestConfig::from_ron_str(
            r#"(
                dedup_threshold: 8,
                providers: [
                    (name: "source_pages", weight: 0.9),
                    (name: "publisher", weight: 0.6, url_template: Some("https://pub.example/{slug}")),
                ],
            )"#,
        )
        .unwrap();
        assert_eq!(config.dedup_threshold, 8);
        assert_eq!(config.providers.len(), 2);
        assert!(config.providers[1].enabled);
        assert_eq!(config.rate_limit_interval_ms, 1000);
        config.validate().unwrap();
    }

    #[test]
    fn invalid_values_fail_validation() {
        let mut config = HarvestConfig {
            dedup_threshold: 65,
            ..HarvestConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigurationError::Threshold(65)));

        config.dedup_threshold = 6;
        config.providers[1].weight = 1.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::ProviderWeight { .. })
        ));

        config.providers[1].weight = 0.5;
        config.providers[1].url_template = Some("https://static.example/".into());
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::MissingTemplate(_))
        ));

        let mut duplicated = HarvestConfig::default();
        duplicated.providers.push(duplicated.providers[0].clone());
        assert!(matches!(
            duplicated.validate(),
            Err(ConfigurationError::DuplicateProvider(_))
        ));
    }
}
