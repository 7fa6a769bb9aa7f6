use anyhow::{Context, Result, anyhow, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::{history::dynamodb::DEFAULT_TABLE_NAME, provider::ProviderId};

/// Configuration for a single provider (API key, endpoint overrides).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the provider's API base URL (the forecast host for Open-Meteo).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Open-Meteo only: overrides the geocoding host.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geocoding_url: Option<String>,
}

/// Where and how request history is written.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    pub table_name: String,
    pub timeout_secs: u64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { table_name: DEFAULT_TABLE_NAME.to_string(), timeout_secs: 2 }
    }
}

/// Top-level configuration.
///
/// The Lambda builds it from the environment ([`Config::from_env`]); the CLI
/// keeps it as TOML on disk ([`Config::load`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider id tried first, e.g. "weatherapi".
    pub primary_provider: String,

    /// Provider id tried when the primary fails, e.g. "open-meteo".
    pub secondary_provider: String,

    /// Timeout of a single upstream HTTP request.
    pub provider_timeout_secs: u64,

    /// Budget shared by the primary and secondary attempts.
    pub total_timeout_secs: u64,

    /// Observations older than this count as failures. `0` disables the check.
    pub max_observation_age_secs: u64,

    /// Example TOML:
    /// [providers.weatherapi]
    /// api_key = "..."
    pub providers: HashMap<String, ProviderConfig>,

    pub history: HistoryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            primary_provider: ProviderId::WeatherApi.to_string(),
            secondary_provider: ProviderId::OpenMeteo.to_string(),
            provider_timeout_secs: 5,
            total_timeout_secs: 12,
            max_observation_age_secs: 6 * 60 * 60,
            providers: HashMap::new(),
            history: HistoryConfig::default(),
        }
    }
}

impl Config {
    pub fn primary_provider_id(&self) -> Result<ProviderId> {
        ProviderId::try_from(self.primary_provider.as_str()).context("Invalid primary provider")
    }

    pub fn secondary_provider_id(&self) -> Result<ProviderId> {
        ProviderId::try_from(self.secondary_provider.as_str()).context("Invalid secondary provider")
    }

    /// Primary and secondary provider, in the order they are tried.
    pub fn provider_order(&self) -> Result<(ProviderId, ProviderId)> {
        let primary = self.primary_provider_id()?;
        let secondary = self.secondary_provider_id()?;

        if primary == secondary {
            bail!("Primary and secondary providers must differ (both are '{primary}').");
        }

        Ok((primary, secondary))
    }

    /// Make `id` the primary provider. When `id` was the secondary, the two swap.
    pub fn set_primary_provider(&mut self, id: ProviderId) {
        if self.secondary_provider_id().ok() == Some(id) {
            self.secondary_provider = self.primary_provider.clone();
        }
        self.primary_provider = id.as_str().to_string();
    }

    pub fn provider_config(&self, id: ProviderId) -> Option<&ProviderConfig> {
        self.providers.get(id.as_str())
    }

    fn provider_entry(&mut self, id: ProviderId) -> &mut ProviderConfig {
        self.providers.entry(id.as_str().to_string()).or_default()
    }

    /// Set/replace a provider API key.
    pub fn upsert_provider_api_key(&mut self, provider_id: ProviderId, api_key: String) {
        self.provider_entry(provider_id).api_key = Some(api_key);
    }

    /// Returns API key for a provider, if present.
    pub fn provider_api_key(&self, provider_id: ProviderId) -> Option<&str> {
        self.provider_config(provider_id)
            .and_then(|cfg| cfg.api_key.as_deref())
            .filter(|key| !key.is_empty())
    }

    pub fn is_provider_configured(&self, provider_id: ProviderId) -> bool {
        !provider_id.requires_api_key() || self.provider_api_key(provider_id).is_some()
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }

    pub fn total_timeout(&self) -> Duration {
        Duration::from_secs(self.total_timeout_secs)
    }

    pub fn max_observation_age(&self) -> Option<Duration> {
        (self.max_observation_age_secs > 0).then(|| Duration::from_secs(self.max_observation_age_secs))
    }

    pub fn history_timeout(&self) -> Duration {
        Duration::from_secs(self.history.timeout_secs)
    }

    /// Reject settings no lookup could succeed with.
    ///
    /// Unlike the observation age, the timeouts have no "disabled" value: zero
    /// would expire before the first byte arrives.
    pub fn validate(&self) -> Result<()> {
        self.provider_order()?;

        for (key, secs) in [
            ("provider_timeout_secs", self.provider_timeout_secs),
            ("total_timeout_secs", self.total_timeout_secs),
            ("history.timeout_secs", self.history.timeout_secs),
        ] {
            if secs == 0 {
                bail!("{key} must be at least 1 second");
            }
        }

        Ok(())
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Self::default();
        cfg.apply_env(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Overlay values looked up by environment variable name.
    ///
    /// Recognised keys: `WEATHER_API_KEY`, `WEATHER_PRIMARY_PROVIDER`,
    /// `WEATHER_SECONDARY_PROVIDER`, `WEATHER_PROVIDER_TIMEOUT_SECS`,
    /// `WEATHER_TOTAL_TIMEOUT_SECS`, `WEATHER_MAX_OBSERVATION_AGE_SECS`,
    /// `HISTORY_TABLE_NAME`, `HISTORY_TIMEOUT_SECS`, `WEATHERAPI_BASE_URL`,
    /// `OPEN_METEO_BASE_URL`, `OPEN_METEO_GEOCODING_URL`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(key) = var("WEATHER_API_KEY") {
            self.upsert_provider_api_key(ProviderId::WeatherApi, key);
        }
        if let Some(id) = var("WEATHER_PRIMARY_PROVIDER") {
            self.primary_provider = ProviderId::try_from(id.as_str())?.to_string();
        }
        if let Some(id) = var("WEATHER_SECONDARY_PROVIDER") {
            self.secondary_provider = ProviderId::try_from(id.as_str())?.to_string();
        }
        if let Some(v) = var("WEATHER_PROVIDER_TIMEOUT_SECS") {
            self.provider_timeout_secs = parse_secs("WEATHER_PROVIDER_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("WEATHER_TOTAL_TIMEOUT_SECS") {
            self.total_timeout_secs = parse_secs("WEATHER_TOTAL_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("WEATHER_MAX_OBSERVATION_AGE_SECS") {
            self.max_observation_age_secs = parse_secs("WEATHER_MAX_OBSERVATION_AGE_SECS", &v)?;
        }
        if let Some(table) = var("HISTORY_TABLE_NAME") {
            self.history.table_name = table;
        }
        if let Some(v) = var("HISTORY_TIMEOUT_SECS") {
            self.history.timeout_secs = parse_secs("HISTORY_TIMEOUT_SECS", &v)?;
        }
        if let Some(url) = var("WEATHERAPI_BASE_URL") {
            self.provider_entry(ProviderId::WeatherApi).base_url = Some(url);
        }
        if let Some(url) = var("OPEN_METEO_BASE_URL") {
            self.provider_entry(ProviderId::OpenMeteo).base_url = Some(url);
        }
        if let Some(url) = var("OPEN_METEO_GEOCODING_URL") {
            self.provider_entry(ProviderId::OpenMeteo).geocoding_url = Some(url);
        }

        Ok(())
    }

    /// Load config from disk, or return the defaults if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "city-weather", "weather")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn parse_secs(key: &str, value: &str) -> Result<u64> {
    value
        .parse::<u64>()
        .with_context(|| format!("Invalid value for {key}: '{value}' (expected whole seconds)"))
}
