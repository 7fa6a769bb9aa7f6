use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::{
    error::ProviderError,
    model::{RawProviderResponse, validate_city},
};

use super::{ProviderId, WeatherProvider, parse_json, read_response, trim_base_url, truncate_body};

pub const DEFAULT_BASE_URL: &str = "https://api.weatherapi.com";

/// WeatherAPI's error code for "No matching location found."
const LOCATION_NOT_FOUND_CODE: i64 = 1006;

/// WeatherAPI.com client: direct city lookup against `current.json`.
#[derive(Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String, http: Client) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL, http)
    }

    pub fn with_base_url(api_key: String, base_url: &str, http: Client) -> Self {
        Self { api_key, base_url: trim_base_url(base_url), http }
    }
}

impl std::fmt::Debug for WeatherApiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeatherApiProvider")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::WeatherApi
    }

    async fn fetch(&self, city: &str) -> Result<RawProviderResponse, ProviderError> {
        let city = validate_city(city)?;
        let url = format!("{}/v1/current.json", self.base_url);
        debug!(provider = %self.id(), city, "requesting current weather");

        let res = self
            .http
            .get(&url)
            .query(&[("key", self.api_key.as_str()), ("q", city)])
            .send()
            .await
            .map_err(ProviderError::network)?;

        let (status, body) = read_response(res).await?;

        if !status.is_success() {
            if error_code(&body) == Some(LOCATION_NOT_FOUND_CODE) {
                return Err(ProviderError::NotFound { city: city.to_owned() });
            }
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        Ok(RawProviderResponse::new(parse_json(&body)?))
    }
}

fn error_code(body: &str) -> Option<i64> {
    let value: Value = serde_json::from_str(body).ok()?;
    value.get("error")?.get("code")?.as_i64()
}
