//! Core library for the city weather endpoint.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Clients for the upstream weather providers (WeatherAPI, Open-Meteo)
//! - Normalization of provider payloads into one canonical record
//! - The primary/secondary fallback orchestrator
//! - Per-client request history (DynamoDB-backed)
//!
//! It is used by `weather-lambda` and `weather-cli`.

pub mod condition;
pub mod config;
pub mod error;
pub mod fallback;
pub mod history;
pub mod model;
pub mod normalize;
pub mod provider;
pub mod units;

pub use condition::WeatherCondition;
pub use config::{Config, HistoryConfig, ProviderConfig};
pub use error::{AggregateError, ParseError, ProviderError, ProviderFailure, StorageError, ValidationError};
pub use fallback::{FallbackOrchestrator, Resolution};
pub use history::{HistoryRecord, HistoryRecorder, HistoryStore};
pub use model::{NormalizedWeather, RawProviderResponse, WeatherQuery};
pub use normalize::normalize;
pub use provider::{ProviderId, WeatherProvider};
