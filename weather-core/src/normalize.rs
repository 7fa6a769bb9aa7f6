//! Mapping of provider payloads onto [`NormalizedWeather`].
//!
//! Each provider gets a typed view of its payload. Temperature, condition and
//! city name are required; humidity, wind and coordinates fall back to `None`.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;

use crate::{
    condition::WeatherCondition,
    error::ParseError,
    model::{NormalizedWeather, RawProviderResponse},
    provider::ProviderId,
    units,
};

/// Normalize `raw`, interpreting it with the shape of `provider`.
pub fn normalize(raw: &RawProviderResponse, provider: ProviderId) -> Result<NormalizedWeather, ParseError> {
    match provider {
        ProviderId::WeatherApi => normalize_weatherapi(raw),
        ProviderId::OpenMeteo => normalize_open_meteo(raw),
    }
}

#[derive(Debug, Deserialize)]
struct WaPayload {
    location: WaLocation,
    current: WaCurrent,
}

#[derive(Debug, Deserialize)]
struct WaLocation {
    name: Option<String>,
    lat: Option<f64>,
    lon: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WaCurrent {
    last_updated_epoch: Option<i64>,
    temp_c: Option<f64>,
    temp_f: Option<f64>,
    condition: Option<WaCondition>,
    wind_kph: Option<f64>,
    wind_mph: Option<f64>,
    humidity: Option<f64>,
}

fn normalize_weatherapi(raw: &RawProviderResponse) -> Result<NormalizedWeather, ParseError> {
    let parsed = WaPayload::deserialize(raw.as_value()).map_err(|err| ParseError::Shape(err.to_string()))?;
    let current = parsed.current;

    let temperature_celsius = match (current.temp_c, current.temp_f) {
        (Some(c), _) => c,
        (None, Some(f)) => units::fahrenheit_to_celsius(f),
        (None, None) => return Err(ParseError::MissingField("current.temp_c")),
    };
    let temperature_celsius = finite("current.temp_c", temperature_celsius)?;

    let condition_text = current
        .condition
        .and_then(|c| c.text)
        .filter(|text| !text.trim().is_empty())
        .ok_or(ParseError::MissingField("current.condition.text"))?;

    let wind_speed_kph = current.wind_kph.or_else(|| current.wind_mph.map(units::mph_to_kph));

    let observed_at = match current.last_updated_epoch {
        Some(epoch) => DateTime::from_timestamp(epoch, 0).ok_or_else(|| ParseError::InvalidValue {
            field: "current.last_updated_epoch",
            value: epoch.to_string(),
        })?,
        None => Utc::now(),
    };

    Ok(NormalizedWeather {
        city: required_name("location.name", parsed.location.name)?,
        temperature_celsius,
        condition: WeatherCondition::from_description(&condition_text).to_string(),
        humidity_percent: optional_finite(current.humidity),
        wind_speed_kph: optional_finite(wind_speed_kph),
        source_provider: ProviderId::WeatherApi.to_string(),
        observed_at,
        latitude: parsed.location.lat,
        longitude: parsed.location.lon,
    })
}

#[derive(Debug, Deserialize)]
struct OmPayload {
    location: OmLocation,
    forecast: OmForecast,
}

#[derive(Debug, Deserialize)]
struct OmLocation {
    name: Option<String>,
    latitude: Option<f64>,
    longitude: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OmForecast {
    latitude: Option<f64>,
    longitude: Option<f64>,
    #[serde(default)]
    current_units: OmUnits,
    current: Option<OmCurrent>,
}

#[derive(Debug, Default, Deserialize)]
struct OmUnits {
    temperature_2m: Option<String>,
    wind_speed_10m: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OmCurrent {
    time: Option<String>,
    temperature_2m: Option<f64>,
    relative_humidity_2m: Option<f64>,
    wind_speed_10m: Option<f64>,
    weather_code: Option<i64>,
}

fn normalize_open_meteo(raw: &RawProviderResponse) -> Result<NormalizedWeather, ParseError> {
    let parsed = OmPayload::deserialize(raw.as_value()).map_err(|err| ParseError::Shape(err.to_string()))?;
    let forecast = parsed.forecast;
    let current = forecast.current.ok_or(ParseError::MissingField("forecast.current"))?;

    let temperature = current
        .temperature_2m
        .ok_or(ParseError::MissingField("forecast.current.temperature_2m"))?;
    let temperature_celsius = finite(
        "forecast.current.temperature_2m",
        temperature_to_celsius(forecast.current_units.temperature_2m.as_deref(), temperature)?,
    )?;

    let code = current
        .weather_code
        .ok_or(ParseError::MissingField("forecast.current.weather_code"))?;

    let wind_speed_kph = current
        .wind_speed_10m
        .map(|speed| wind_to_kph(forecast.current_units.wind_speed_10m.as_deref(), speed))
        .transpose()?;

    let observed_at = match current.time.as_deref() {
        Some(time) => NaiveDateTime::parse_from_str(time, "%Y-%m-%dT%H:%M")
            .map(|naive| naive.and_utc())
            .map_err(|_| ParseError::InvalidValue {
                field: "forecast.current.time",
                value: time.to_owned(),
            })?,
        None => Utc::now(),
    };

    Ok(NormalizedWeather {
        city: required_name("location.name", parsed.location.name)?,
        temperature_celsius,
        condition: WeatherCondition::from_wmo_code(code).to_string(),
        humidity_percent: optional_finite(current.relative_humidity_2m),
        wind_speed_kph: optional_finite(wind_speed_kph),
        source_provider: ProviderId::OpenMeteo.to_string(),
        observed_at,
        latitude: parsed.location.latitude.or(forecast.latitude),
        longitude: parsed.location.longitude.or(forecast.longitude),
    })
}

/// Open-Meteo reports `°C` by default and `°F` with `temperature_unit=fahrenheit`.
fn temperature_to_celsius(unit: Option<&str>, value: f64) -> Result<f64, ParseError> {
    match unit.map(str::trim) {
        None | Some("°C") | Some("celsius") => Ok(value),
        Some("°F") | Some("fahrenheit") => Ok(units::fahrenheit_to_celsius(value)),
        Some(other) => Err(ParseError::UnsupportedUnit {
            field: "forecast.current.temperature_2m",
            unit: other.to_owned(),
        }),
    }
}

fn wind_to_kph(unit: Option<&str>, value: f64) -> Result<f64, ParseError> {
    match unit.map(str::trim) {
        None | Some("km/h") | Some("kmh") => Ok(value),
        Some("mp/h") | Some("mph") => Ok(units::mph_to_kph(value)),
        Some("m/s") | Some("ms") => Ok(units::mps_to_kph(value)),
        Some("kn") | Some("knots") => Ok(units::knots_to_kph(value)),
        Some(other) => Err(ParseError::UnsupportedUnit {
            field: "forecast.current.wind_speed_10m",
            unit: other.to_owned(),
        }),
    }
}

fn required_name(field: &'static str, name: Option<String>) -> Result<String, ParseError> {
    name.map(|n| n.trim().to_owned())
        .filter(|n| !n.is_empty())
        .ok_or(ParseError::MissingField(field))
}

fn finite(field: &'static str, value: f64) -> Result<f64, ParseError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ParseError::InvalidValue { field, value: value.to_string() })
    }
}

fn optional_finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn weatherapi_raw() -> RawProviderResponse {
        RawProviderResponse::new(json!({
            "location": {
                "name": "Paris",
                "region": "Ile-de-France",
                "country": "France",
                "lat": 48.87,
                "lon": 2.33,
                "localtime_epoch": 1717243500
            },
            "current": {
                "last_updated_epoch": 1717243200,
                "temp_c": 18.4,
                "temp_f": 65.1,
                "condition": { "text": "Partly cloudy", "code": 1003 },
                "wind_mph": 6.9,
                "wind_kph": 11.2,
                "humidity": 62
            }
        }))
    }

    fn open_meteo_raw(current_units: serde_json::Value) -> RawProviderResponse {
        RawProviderResponse::new(json!({
            "location": { "name": "Paris", "country": "France", "latitude": 48.85341, "longitude": 2.3488 },
            "forecast": {
                "latitude": 48.86,
                "longitude": 2.3399997,
                "current_units": current_units,
                "current": {
                    "time": "2024-06-01T12:00",
                    "interval": 900,
                    "temperature_2m": 98.6,
                    "relative_humidity_2m": 40,
                    "wind_speed_10m": 10.0,
                    "weather_code": 61
                }
            }
        }))
    }

    #[test]
    fn weatherapi_payload_is_mapped() {
        let weather = normalize(&weatherapi_raw(), ProviderId::WeatherApi).expect("valid payload");

        assert_eq!(weather.city, "Paris");
        assert_eq!(weather.temperature_celsius, 18.4);
        assert_eq!(weather.condition, "Partially Cloudy");
        assert_eq!(weather.humidity_percent, Some(62.0));
        assert_eq!(weather.wind_speed_kph, Some(11.2));
        assert_eq!(weather.source_provider, "weatherapi");
        assert_eq!(weather.observed_at.timestamp(), 1717243200);
        assert_eq!(weather.latitude, Some(48.87));
    }

    #[test]
    fn weatherapi_falls_back_to_imperial_fields() {
        let mut raw = weatherapi_raw().into_value();
        let current = raw["current"].as_object_mut().unwrap();
        current.remove("temp_c");
        current.remove("wind_kph");
        current.insert("temp_f".into(), json!(98.6));
        current.insert("wind_mph".into(), json!(10.0));

        let weather = normalize(&RawProviderResponse::new(raw), ProviderId::WeatherApi).unwrap();
        assert!((weather.temperature_celsius - 37.0).abs() < 1e-6);
        assert!((weather.wind_speed_kph.unwrap() - 16.09344).abs() < 1e-6);
    }

    #[test]
    fn weatherapi_missing_temperature_is_a_parse_error() {
        let mut raw = weatherapi_raw().into_value();
        let current = raw["current"].as_object_mut().unwrap();
        current.remove("temp_c");
        current.remove("temp_f");

        let err = normalize(&RawProviderResponse::new(raw), ProviderId::WeatherApi).unwrap_err();
        assert_eq!(err, ParseError::MissingField("current.temp_c"));
    }

    #[test]
    fn weatherapi_missing_condition_is_a_parse_error() {
        let mut raw = weatherapi_raw().into_value();
        raw["current"].as_object_mut().unwrap().remove("condition");

        let err = normalize(&RawProviderResponse::new(raw), ProviderId::WeatherApi).unwrap_err();
        assert_eq!(err, ParseError::MissingField("current.condition.text"));
    }

    #[test]
    fn weatherapi_missing_optional_fields_become_none() {
        let mut raw = weatherapi_raw().into_value();
        let current = raw["current"].as_object_mut().unwrap();
        current.remove("humidity");
        current.remove("wind_kph");
        current.remove("wind_mph");

        let weather = normalize(&RawProviderResponse::new(raw), ProviderId::WeatherApi).unwrap();
        assert_eq!(weather.humidity_percent, None);
        assert_eq!(weather.wind_speed_kph, None);
    }

    #[test]
    fn open_meteo_fahrenheit_payload_is_converted() {
        let raw = open_meteo_raw(json!({ "temperature_2m": "°F", "wind_speed_10m": "mp/h" }));
        let weather = normalize(&raw, ProviderId::OpenMeteo).expect("valid payload");

        assert!((weather.temperature_celsius - 37.0).abs() < 1e-6);
        assert!((weather.wind_speed_kph.unwrap() - 16.09344).abs() < 1e-6);
        assert_eq!(weather.condition, "Light Rain");
        assert_eq!(weather.humidity_percent, Some(40.0));
        assert_eq!(weather.source_provider, "open-meteo");
        assert_eq!(weather.observed_at.to_rfc3339(), "2024-06-01T12:00:00+00:00");
        assert_eq!(weather.latitude, Some(48.85341));
    }

    #[test]
    fn open_meteo_without_units_assumes_metric() {
        let raw = open_meteo_raw(json!({}));
        let weather = normalize(&raw, ProviderId::OpenMeteo).unwrap();
        assert_eq!(weather.temperature_celsius, 98.6);
        assert_eq!(weather.wind_speed_kph, Some(10.0));
    }

    #[test]
    fn open_meteo_unknown_unit_is_rejected() {
        let raw = open_meteo_raw(json!({ "temperature_2m": "K" }));
        let err = normalize(&raw, ProviderId::OpenMeteo).unwrap_err();
        assert!(matches!(err, ParseError::UnsupportedUnit { .. }));
    }

    #[test]
    fn open_meteo_missing_weather_code_is_a_parse_error() {
        let mut raw = open_meteo_raw(json!({})).into_value();
        raw["forecast"]["current"].as_object_mut().unwrap().remove("weather_code");

        let err = normalize(&RawProviderResponse::new(raw), ProviderId::OpenMeteo).unwrap_err();
        assert_eq!(err, ParseError::MissingField("forecast.current.weather_code"));
    }

    #[test]
    fn payload_of_the_other_provider_is_a_shape_error() {
        let err = normalize(&weatherapi_raw(), ProviderId::OpenMeteo).unwrap_err();
        assert!(matches!(err, ParseError::Shape(_)));
    }

    #[test]
    fn normalization_is_deterministic() {
        let raw = weatherapi_raw();
        let first = serde_json::to_string(&normalize(&raw, ProviderId::WeatherApi).unwrap()).unwrap();
        let second = serde_json::to_string(&normalize(&raw, ProviderId::WeatherApi).unwrap()).unwrap();
        assert_eq!(first, second);
    }
}
