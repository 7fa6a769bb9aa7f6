use crate::{
    Config,
    error::{ParseError, ProviderError},
    model::RawProviderResponse,
    provider::{openmeteo::OpenMeteoProvider, weatherapi::WeatherApiProvider},
};
use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde_json::Value;
use std::{convert::TryFrom, fmt::Debug, sync::Arc};

pub mod openmeteo;
pub mod weatherapi;

const USER_AGENT: &str = concat!("city-weather/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderId {
    WeatherApi,
    OpenMeteo,
}

impl ProviderId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderId::WeatherApi => "weatherapi",
            ProviderId::OpenMeteo => "open-meteo",
        }
    }

    pub const fn all() -> &'static [ProviderId] {
        &[ProviderId::WeatherApi, ProviderId::OpenMeteo]
    }

    pub fn requires_api_key(&self) -> bool {
        matches!(self, ProviderId::WeatherApi)
    }
}

impl std::fmt::Display for ProviderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "weatherapi" | "weather-api" => Ok(ProviderId::WeatherApi),
            "open-meteo" | "openmeteo" => Ok(ProviderId::OpenMeteo),
            _ => Err(anyhow::anyhow!(
                "Unknown provider '{value}'. Supported providers: weatherapi, open-meteo."
            )),
        }
    }
}

/// One upstream weather API. Implementations issue the HTTP calls only; no
/// retries and no normalization.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    fn id(&self) -> ProviderId;

    async fn fetch(&self, city: &str) -> Result<RawProviderResponse, ProviderError>;
}

/// Build the HTTP client shared by every provider. The per-request timeout
/// comes from `provider_timeout_secs`.
pub fn build_http_client(config: &Config) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(config.provider_timeout())
        .user_agent(USER_AGENT)
        .build()
        .context("Failed to build HTTP client for weather providers")
}

/// Construct a provider from config and explicit ProviderId.
pub fn provider_from_config(
    id: ProviderId,
    config: &Config,
    http: Client,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let settings = config.provider_config(id);
    let base_url = settings.and_then(|cfg| cfg.base_url.as_deref());

    let provider: Arc<dyn WeatherProvider> = match id {
        ProviderId::WeatherApi => {
            let api_key = config.provider_api_key(id).ok_or_else(|| {
                anyhow::anyhow!(
                    "No API key configured for provider '{id}'.\n\
                     Hint: set WEATHER_API_KEY or run `weather configure {id}` and enter your API key."
                )
            })?;
            let base_url = base_url.unwrap_or(weatherapi::DEFAULT_BASE_URL);
            Arc::new(WeatherApiProvider::with_base_url(api_key.to_owned(), base_url, http))
        }
        ProviderId::OpenMeteo => {
            let forecast_url = base_url.unwrap_or(openmeteo::DEFAULT_FORECAST_URL);
            let geocoding_url = settings
                .and_then(|cfg| cfg.geocoding_url.as_deref())
                .unwrap_or(openmeteo::DEFAULT_GEOCODING_URL);
            Arc::new(OpenMeteoProvider::with_endpoints(forecast_url, geocoding_url, http))
        }
    };

    Ok(provider)
}

/// Read status and body, mapping transport failures to `Network`.
async fn read_response(res: Response) -> Result<(StatusCode, String), ProviderError> {
    let status = res.status();
    let body = res.text().await.map_err(ProviderError::network)?;
    Ok((status, body))
}

fn parse_json(body: &str) -> Result<Value, ProviderError> {
    serde_json::from_str(body).map_err(|err| ParseError::InvalidJson(err.to_string()).into())
}

fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_owned()
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}
