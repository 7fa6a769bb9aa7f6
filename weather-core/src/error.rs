//! Error taxonomy shared by the provider clients, the orchestrator and the
//! history recorder.

use std::{error::Error as _, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::provider::ProviderId;

/// The inbound query did not carry a usable city name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("missing or empty 'city' parameter")]
pub struct ValidationError;

/// A provider payload could not be mapped onto [`crate::NormalizedWeather`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("response body is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("unexpected response shape: {0}")]
    Shape(String),

    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("unsupported unit '{unit}' for `{field}`")]
    UnsupportedUnit { field: &'static str, unit: String },

    #[error("invalid value for `{field}`: {value}")]
    InvalidValue { field: &'static str, value: String },
}

/// Failure of a single provider attempt. Absorbed by the orchestrator unless
/// every provider fails.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("network error: {0}")]
    Network(String),

    #[error("upstream returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("no match found for city '{city}'")]
    NotFound { city: String },

    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("observation from {observed_at} is older than {max_age_secs}s")]
    Stale {
        observed_at: DateTime<Utc>,
        max_age_secs: u64,
    },
}

impl ProviderError {
    /// Short machine-friendly name of the error kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            ProviderError::Validation(_) => "validation",
            ProviderError::Network(_) => "network",
            ProviderError::Upstream { .. } => "upstream",
            ProviderError::NotFound { .. } => "not_found",
            ProviderError::Parse(_) => "parse",
            ProviderError::Stale { .. } => "stale",
        }
    }

    /// Wrap a transport error. The request URL is dropped because it carries
    /// the provider API key.
    pub(crate) fn network(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return ProviderError::Network("request timed out".to_string());
        }

        let err = err.without_url();
        let mut message = err.to_string();
        let mut source = err.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }

        ProviderError::Network(message)
    }

    pub(crate) fn deadline_exceeded() -> Self {
        ProviderError::Network("deadline exceeded".to_string())
    }
}

/// A provider error tagged with the provider that produced it.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {error}")]
pub struct ProviderFailure {
    pub provider: ProviderId,
    #[source]
    pub error: ProviderError,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, error: ProviderError) -> Self {
        Self { provider, error }
    }
}

/// Both providers failed; carries both causes.
#[derive(Debug, Clone, Error)]
#[error("all weather providers failed (primary {primary}; secondary {secondary})")]
pub struct AggregateError {
    pub primary: ProviderFailure,
    pub secondary: ProviderFailure,
}

impl AggregateError {
    /// One human-readable line per provider, primary first.
    pub fn details(&self) -> [String; 2] {
        [self.primary.to_string(), self.secondary.to_string()]
    }
}

/// Writing a history record failed.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("history store request failed: {0}")]
    Backend(String),

    #[error("history record for {client_ip} at {timestamp_ms} already exists")]
    Conflict { client_ip: String, timestamp_ms: i64 },

    #[error("history write timed out after {0:?}")]
    Timeout(Duration),
}
