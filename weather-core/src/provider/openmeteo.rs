use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::debug;

use crate::{
    error::{ParseError, ProviderError},
    model::{RawProviderResponse, validate_city},
};

use super::{ProviderId, WeatherProvider, parse_json, read_response, trim_base_url, truncate_body};

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com";
pub const DEFAULT_GEOCODING_URL: &str = "https://geocoding-api.open-meteo.com";

const CURRENT_VARIABLES: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,weather_code";

/// Open-Meteo client: resolves the city with the geocoding API, then asks the
/// forecast API for current conditions at those coordinates.
///
/// The raw payload is `{ "location": <geocoding hit>, "forecast": <forecast body> }`.
#[derive(Debug, Clone)]
pub struct OpenMeteoProvider {
    forecast_url: String,
    geocoding_url: String,
    http: Client,
}

impl OpenMeteoProvider {
    pub fn new(http: Client) -> Self {
        Self::with_endpoints(DEFAULT_FORECAST_URL, DEFAULT_GEOCODING_URL, http)
    }

    pub fn with_endpoints(forecast_url: &str, geocoding_url: &str, http: Client) -> Self {
        Self {
            forecast_url: trim_base_url(forecast_url),
            geocoding_url: trim_base_url(geocoding_url),
            http,
        }
    }

    async fn geocode(&self, city: &str) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/search", self.geocoding_url);
        debug!(provider = %self.id(), city, "geocoding city");

        let res = self
            .http
            .get(&url)
            .query(&[("name", city), ("count", "1"), ("language", "en"), ("format", "json")])
            .send()
            .await
            .map_err(ProviderError::network)?;

        let (status, body) = read_response(res).await?;
        if !status.is_success() {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let mut parsed = parse_json(&body)?;
        let hit = parsed
            .get_mut("results")
            .and_then(Value::as_array_mut)
            .filter(|results| !results.is_empty())
            .map(|results| results.swap_remove(0));

        hit.ok_or_else(|| ProviderError::NotFound { city: city.to_owned() })
    }

    async fn current_conditions(&self, latitude: f64, longitude: f64) -> Result<Value, ProviderError> {
        let url = format!("{}/v1/forecast", self.forecast_url);
        let (latitude, longitude) = (latitude.to_string(), longitude.to_string());
        debug!(provider = %self.id(), %latitude, %longitude, "requesting current conditions");

        let res = self
            .http
            .get(&url)
            .query(&[
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("current", CURRENT_VARIABLES),
                ("timezone", "GMT"),
            ])
            .send()
            .await
            .map_err(ProviderError::network)?;

        let (status, body) = read_response(res).await?;
        if !status.is_success() {
            return Err(ProviderError::Upstream {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        parse_json(&body)
    }
}

#[async_trait]
impl WeatherProvider for OpenMeteoProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenMeteo
    }

    async fn fetch(&self, city: &str) -> Result<RawProviderResponse, ProviderError> {
        let city = validate_city(city)?;
        let location = self.geocode(city).await?;

        let latitude = coordinate(&location, "latitude")
            .ok_or(ParseError::MissingField("location.latitude"))?;
        let longitude = coordinate(&location, "longitude")
            .ok_or(ParseError::MissingField("location.longitude"))?;

        let forecast = self.current_conditions(latitude, longitude).await?;

        Ok(RawProviderResponse::new(json!({
            "location": location,
            "forecast": forecast,
        })))
    }
}

fn coordinate(location: &Value, field: &str) -> Option<f64> {
    location.get(field).and_then(Value::as_f64)
}
