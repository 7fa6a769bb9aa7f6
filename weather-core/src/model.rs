use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

/// A validated lookup request for one city.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherQuery {
    city: String,
}

impl WeatherQuery {
    /// Trim `city` and reject it when nothing is left.
    pub fn new(city: &str) -> Result<Self, ValidationError> {
        let city = validate_city(city)?;
        Ok(Self { city: city.to_owned() })
    }

    pub fn city(&self) -> &str {
        &self.city
    }
}

pub(crate) fn validate_city(city: &str) -> Result<&str, ValidationError> {
    let city = city.trim();
    if city.is_empty() { Err(ValidationError) } else { Ok(city) }
}

/// Untyped provider payload, as returned by a provider client.
#[derive(Debug, Clone, PartialEq)]
pub struct RawProviderResponse(Value);

impl RawProviderResponse {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }
}

/// Canonical weather record: Celsius, km/h and percent regardless of source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedWeather {
    pub city: String,
    pub temperature_celsius: f64,
    pub condition: String,
    pub humidity_percent: Option<f64>,
    pub wind_speed_kph: Option<f64>,
    pub source_provider: String,
    pub observed_at: DateTime<Utc>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
