//! Primary/secondary provider fallback.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use reqwest::Client;
use tokio::time::Instant;
use tracing::{info, warn};

use crate::{
    Config,
    error::{AggregateError, ProviderError, ProviderFailure},
    model::{NormalizedWeather, WeatherQuery},
    normalize::normalize,
    provider::{ProviderId, WeatherProvider, provider_from_config},
};

/// Outcome of [`FallbackOrchestrator::resolve`].
#[derive(Debug, Clone)]
pub enum Resolution {
    /// The primary provider answered.
    Primary(NormalizedWeather),
    /// The primary provider failed and the secondary answered.
    Fallback {
        weather: NormalizedWeather,
        primary_failure: ProviderFailure,
    },
    /// Both providers failed.
    Exhausted(AggregateError),
}

impl Resolution {
    pub fn weather(&self) -> Option<&NormalizedWeather> {
        match self {
            Resolution::Primary(weather) | Resolution::Fallback { weather, .. } => Some(weather),
            Resolution::Exhausted(_) => None,
        }
    }

    pub fn into_result(self) -> Result<NormalizedWeather, AggregateError> {
        match self {
            Resolution::Primary(weather) | Resolution::Fallback { weather, .. } => Ok(weather),
            Resolution::Exhausted(err) => Err(err),
        }
    }
}

/// Tries the primary provider, then the secondary exactly once if the primary
/// fails for any reason. Provider order never changes.
#[derive(Debug, Clone)]
pub struct FallbackOrchestrator {
    primary: Arc<dyn WeatherProvider>,
    secondary: Arc<dyn WeatherProvider>,
    total_timeout: Option<Duration>,
    max_observation_age: Option<Duration>,
}

impl FallbackOrchestrator {
    pub fn new(primary: Arc<dyn WeatherProvider>, secondary: Arc<dyn WeatherProvider>) -> Self {
        Self { primary, secondary, total_timeout: None, max_observation_age: None }
    }

    /// Deadline shared by both attempts, measured from the start of `resolve`.
    pub fn with_total_timeout(mut self, timeout: Duration) -> Self {
        self.total_timeout = Some(timeout);
        self
    }

    /// Reject observations older than `age` as stale.
    pub fn with_max_observation_age(mut self, age: Duration) -> Self {
        self.max_observation_age = Some(age);
        self
    }

    /// Build both providers from `config`, sharing one HTTP client.
    pub fn from_config(config: &Config, http: Client) -> anyhow::Result<Self> {
        config.validate()?;
        let (primary, secondary) = config.provider_order()?;

        let mut orchestrator = Self::new(
            provider_from_config(primary, config, http.clone())?,
            provider_from_config(secondary, config, http)?,
        )
        .with_total_timeout(config.total_timeout());

        if let Some(age) = config.max_observation_age() {
            orchestrator = orchestrator.with_max_observation_age(age);
        }

        Ok(orchestrator)
    }

    pub fn primary_id(&self) -> ProviderId {
        self.primary.id()
    }

    pub fn secondary_id(&self) -> ProviderId {
        self.secondary.id()
    }

    pub async fn resolve(&self, query: &WeatherQuery) -> Resolution {
        let deadline = self.total_timeout.map(|timeout| Instant::now() + timeout);

        let primary_failure = match self.attempt(self.primary.as_ref(), query, deadline).await {
            Ok(weather) => {
                info!(provider = %self.primary.id(), city = query.city(), "resolved by primary provider");
                return Resolution::Primary(weather);
            }
            Err(error) => {
                warn!(
                    provider = %self.primary.id(),
                    city = query.city(),
                    kind = error.kind(),
                    %error,
                    "primary provider failed, falling back"
                );
                ProviderFailure::new(self.primary.id(), error)
            }
        };

        match self.attempt(self.secondary.as_ref(), query, deadline).await {
            Ok(weather) => {
                info!(provider = %self.secondary.id(), city = query.city(), "resolved by secondary provider");
                Resolution::Fallback { weather, primary_failure }
            }
            Err(error) => {
                warn!(
                    provider = %self.secondary.id(),
                    city = query.city(),
                    kind = error.kind(),
                    %error,
                    "secondary provider failed"
                );
                Resolution::Exhausted(AggregateError {
                    primary: primary_failure,
                    secondary: ProviderFailure::new(self.secondary.id(), error),
                })
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn WeatherProvider,
        query: &WeatherQuery,
        deadline: Option<Instant>,
    ) -> Result<NormalizedWeather, ProviderError> {
        let raw = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, provider.fetch(query.city()))
                .await
                .map_err(|_| ProviderError::deadline_exceeded())??,
            None => provider.fetch(query.city()).await?,
        };

        let weather = normalize(&raw, provider.id())?;
        self.check_freshness(&weather)?;

        Ok(weather)
    }

    fn check_freshness(&self, weather: &NormalizedWeather) -> Result<(), ProviderError> {
        let Some(max_age) = self.max_observation_age else {
            return Ok(());
        };

        let max_age_secs = max_age.as_secs();
        let age_secs = (Utc::now() - weather.observed_at).num_seconds();
        if age_secs > i64::try_from(max_age_secs).unwrap_or(i64::MAX) {
            return Err(ProviderError::Stale { observed_at: weather.observed_at, max_age_secs });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ParseError, model::RawProviderResponse};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct FakeProvider {
        id: ProviderId,
        outcome: Result<RawProviderResponse, ProviderError>,
        delay: Option<Duration>,
        calls: AtomicUsize,
    }

    impl FakeProvider {
        fn ok(id: ProviderId, city: &str) -> Arc<Self> {
            Self::ok_observed(id, city, Utc::now().timestamp())
        }

        fn ok_observed(id: ProviderId, city: &str, epoch: i64) -> Arc<Self> {
            Arc::new(Self { id, outcome: Ok(payload(id, city, epoch)), delay: None, calls: AtomicUsize::new(0) })
        }

        fn failing(id: ProviderId, error: ProviderError) -> Arc<Self> {
            Arc::new(Self { id, outcome: Err(error), delay: None, calls: AtomicUsize::new(0) })
        }

        fn slow(id: ProviderId, city: &str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                id,
                outcome: Ok(payload(id, city, Utc::now().timestamp())),
                delay: Some(delay),
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for FakeProvider {
        fn id(&self) -> ProviderId {
            self.id
        }

        async fn fetch(&self, _city: &str) -> Result<RawProviderResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.outcome.clone()
        }
    }

    fn payload(id: ProviderId, city: &str, epoch: i64) -> RawProviderResponse {
        match id {
            ProviderId::WeatherApi => RawProviderResponse::new(json!({
                "location": { "name": city, "lat": 48.87, "lon": 2.33 },
                "current": {
                    "last_updated_epoch": epoch,
                    "temp_c": 21.0,
                    "condition": { "text": "Sunny" },
                    "wind_kph": 7.2,
                    "humidity": 50
                }
            })),
            ProviderId::OpenMeteo => {
                let time = chrono::DateTime::from_timestamp(epoch, 0)
                    .unwrap()
                    .format("%Y-%m-%dT%H:%M")
                    .to_string();
                RawProviderResponse::new(json!({
                    "location": { "name": city, "latitude": 48.85, "longitude": 2.35 },
                    "forecast": {
                        "current_units": { "temperature_2m": "°C", "wind_speed_10m": "km/h" },
                        "current": {
                            "time": time,
                            "temperature_2m": 20.5,
                            "relative_humidity_2m": 55,
                            "wind_speed_10m": 9.0,
                            "weather_code": 2
                        }
                    }
                }))
            }
        }
    }

    fn all_failure_kinds() -> Vec<ProviderError> {
        vec![
            ProviderError::Network("connection refused".into()),
            ProviderError::Upstream { status: 500, body: "boom".into() },
            ProviderError::NotFound { city: "Paris".into() },
            ProviderError::Parse(ParseError::InvalidJson("expected value".into())),
        ]
    }

    fn query(city: &str) -> WeatherQuery {
        WeatherQuery::new(city).unwrap()
    }

    #[tokio::test]
    async fn primary_success_never_calls_secondary() {
        let primary = FakeProvider::ok(ProviderId::WeatherApi, "Paris");
        let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
        let orchestrator = FallbackOrchestrator::new(primary.clone(), secondary.clone());

        let resolution = orchestrator.resolve(&query("Paris")).await;

        assert!(matches!(resolution, Resolution::Primary(_)));
        assert_eq!(resolution.weather().unwrap().source_provider, "weatherapi");
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn every_primary_failure_kind_calls_secondary_once() {
        for error in all_failure_kinds() {
            let kind = error.kind();
            let primary = FakeProvider::failing(ProviderId::WeatherApi, error);
            let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
            let orchestrator = FallbackOrchestrator::new(primary.clone(), secondary.clone());

            let resolution = orchestrator.resolve(&query("Paris")).await;

            assert_eq!(secondary.calls(), 1, "kind: {kind}");
            match resolution {
                Resolution::Fallback { weather, primary_failure } => {
                    assert_eq!(weather.source_provider, "open-meteo");
                    assert_eq!(primary_failure.provider, ProviderId::WeatherApi);
                    assert_eq!(primary_failure.error.kind(), kind);
                }
                other => panic!("expected fallback for {kind}, got {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn unparseable_primary_payload_falls_back() {
        // Open-Meteo shaped payload under the WeatherAPI id fails normalization.
        let primary = Arc::new(FakeProvider {
            id: ProviderId::WeatherApi,
            outcome: Ok(payload(ProviderId::OpenMeteo, "Paris", Utc::now().timestamp())),
            delay: None,
            calls: AtomicUsize::new(0),
        });
        let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
        let orchestrator = FallbackOrchestrator::new(primary, secondary.clone());

        let resolution = orchestrator.resolve(&query("Paris")).await;

        match resolution {
            Resolution::Fallback { primary_failure, .. } => assert_eq!(primary_failure.error.kind(), "parse"),
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn both_failures_are_preserved() {
        let primary = FakeProvider::failing(ProviderId::WeatherApi, ProviderError::NotFound { city: "Atlantis".into() });
        let secondary = FakeProvider::failing(ProviderId::OpenMeteo, ProviderError::NotFound { city: "Atlantis".into() });
        let orchestrator = FallbackOrchestrator::new(primary, secondary);

        let err = orchestrator.resolve(&query("Atlantis")).await.into_result().unwrap_err();

        assert_eq!(err.primary.provider, ProviderId::WeatherApi);
        assert_eq!(err.secondary.provider, ProviderId::OpenMeteo);
        assert!(matches!(err.primary.error, ProviderError::NotFound { .. }));
        assert!(matches!(err.secondary.error, ProviderError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_primary_observation_falls_back() {
        let seven_hours_ago = Utc::now().timestamp() - 7 * 60 * 60;
        let primary = FakeProvider::ok_observed(ProviderId::WeatherApi, "Paris", seven_hours_ago);
        let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
        let orchestrator = FallbackOrchestrator::new(primary, secondary)
            .with_max_observation_age(Duration::from_secs(6 * 60 * 60));

        match orchestrator.resolve(&query("Paris")).await {
            Resolution::Fallback { primary_failure, .. } => {
                assert!(matches!(primary_failure.error, ProviderError::Stale { max_age_secs: 21_600, .. }));
            }
            other => panic!("expected fallback, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn old_observation_is_accepted_without_age_limit() {
        let last_week = Utc::now().timestamp() - 7 * 24 * 60 * 60;
        let primary = FakeProvider::ok_observed(ProviderId::WeatherApi, "Paris", last_week);
        let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
        let orchestrator = FallbackOrchestrator::new(primary, secondary.clone());

        assert!(matches!(orchestrator.resolve(&query("Paris")).await, Resolution::Primary(_)));
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn slow_primary_hits_deadline_and_secondary_answers() {
        let primary = FakeProvider::slow(ProviderId::WeatherApi, "Paris", Duration::from_secs(30));
        let secondary = FakeProvider::ok(ProviderId::OpenMeteo, "Paris");
        let orchestrator =
            FallbackOrchestrator::new(primary, secondary.clone()).with_total_timeout(Duration::from_millis(50));

        match orchestrator.resolve(&query("Paris")).await {
            Resolution::Fallback { weather, primary_failure } => {
                assert_eq!(weather.source_provider, "open-meteo");
                assert_eq!(primary_failure.error.to_string(), "network error: deadline exceeded");
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        assert_eq!(secondary.calls(), 1);
    }

    #[tokio::test]
    async fn deadline_is_shared_by_both_attempts() {
        let primary = FakeProvider::slow(ProviderId::WeatherApi, "Paris", Duration::from_secs(30));
        let secondary = FakeProvider::slow(ProviderId::OpenMeteo, "Paris", Duration::from_secs(30));
        let orchestrator =
            FallbackOrchestrator::new(primary, secondary).with_total_timeout(Duration::from_millis(50));

        let err = orchestrator.resolve(&query("Paris")).await.into_result().unwrap_err();
        assert_eq!(err.primary.error.kind(), "network");
        assert_eq!(err.secondary.error.kind(), "network");
    }

    #[test]
    fn from_config_orders_providers() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".into());
        cfg.set_primary_provider(ProviderId::OpenMeteo);

        let orchestrator = FallbackOrchestrator::from_config(&cfg, Client::new()).expect("valid config");
        assert_eq!(orchestrator.primary_id(), ProviderId::OpenMeteo);
        assert_eq!(orchestrator.secondary_id(), ProviderId::WeatherApi);
    }

    #[test]
    fn from_config_rejects_zero_total_timeout() {
        let mut cfg = Config::default();
        cfg.upsert_provider_api_key(ProviderId::WeatherApi, "KEY".into());
        cfg.total_timeout_secs = 0;

        let err = FallbackOrchestrator::from_config(&cfg, Client::new()).unwrap_err();
        assert!(err.to_string().contains("total_timeout_secs"));
    }
}
