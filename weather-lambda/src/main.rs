//! AWS Lambda entry point for the city weather endpoint.
//!
//! The HTTP client, the provider chain and the DynamoDB client are built once
//! per cold start and handed to every invocation through [`AppState`].

use std::sync::Arc;

use lambda_http::{Error, run, service_fn};
use tracing::info;
use tracing_subscriber::EnvFilter;
use weather_core::{
    Config, FallbackOrchestrator, HistoryRecorder,
    history::DynamoHistoryStore,
    provider::build_http_client,
};

mod http_handler;

use http_handler::{AppState, function_handler};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_current_span(false)
        .with_ansi(false)
        .init();

    let config = Config::from_env().map_err(|e| Error::from(format!("invalid configuration: {e:#}")))?;
    let http = build_http_client(&config).map_err(|e| Error::from(format!("{e:#}")))?;
    let orchestrator = FallbackOrchestrator::from_config(&config, http)
        .map_err(|e| Error::from(format!("failed to configure weather providers: {e:#}")))?;

    let aws = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let store = DynamoHistoryStore::new(aws_sdk_dynamodb::Client::new(&aws), config.history.table_name.clone());

    info!(
        primary = %orchestrator.primary_id(),
        secondary = %orchestrator.secondary_id(),
        table_name = store.table_name(),
        total_timeout_secs = config.total_timeout_secs,
        "initialising weather lookup runtime"
    );

    let state = Arc::new(AppState::new(
        orchestrator,
        HistoryRecorder::new(Arc::new(store)),
        config.history_timeout(),
    ));

    run(service_fn(move |event| {
        let state = state.clone();
        async move { function_handler(&state, event).await }
    }))
    .await
}
