use std::{any::Any, panic::AssertUnwindSafe, time::Duration};

use futures::FutureExt;
use lambda_http::{
    Body, Error, Request, RequestExt, Response,
    http::{StatusCode, header::CONTENT_TYPE},
    request::RequestContext,
};
use serde_json::{Value, json};
use tracing::{error, info, warn};
use weather_core::{
    AggregateError, FallbackOrchestrator, HistoryRecorder, NormalizedWeather, StorageError, WeatherQuery,
};

const INTERNAL_ERROR: &str = "internal error";
const UPSTREAM_ERROR: &str = "all weather providers failed";
const REQUEST_ID_HEADER: &str = "x-request-id";

/// Dependencies shared by every invocation.
#[derive(Debug)]
pub(crate) struct AppState {
    orchestrator: FallbackOrchestrator,
    history: HistoryRecorder,
    history_timeout: Duration,
}

impl AppState {
    pub(crate) fn new(orchestrator: FallbackOrchestrator, history: HistoryRecorder, history_timeout: Duration) -> Self {
        Self { orchestrator, history, history_timeout }
    }
}

/// Handles `GET ?city=<name>`.
///
/// 200 carries the normalized weather, 400 a missing city, 502 the failures of
/// both providers and 500 anything unexpected. History is written for every
/// validated request and never affects the response.
pub(crate) async fn function_handler(state: &AppState, event: Request) -> Result<Response<Body>, Error> {
    let request_id = event.lambda_context_ref().map(|ctx| ctx.request_id.clone());
    let reply = match AssertUnwindSafe(handle(state, &event)).catch_unwind().await {
        Ok(reply) => reply,
        Err(panic) => {
            error!(panic = panic_message(panic.as_ref()), "request handler panicked");
            Reply::internal()
        }
    };

    match reply.to_response(request_id.as_deref()) {
        Ok(response) => Ok(response),
        Err(err) => {
            error!(error = %err, "failed to build response");
            Ok(Reply::internal().to_response(None)?)
        }
    }
}

async fn handle(state: &AppState, event: &Request) -> Reply {
    let city = event
        .query_string_parameters_ref()
        .and_then(|params| params.first("city"))
        .unwrap_or_default();

    let query = match WeatherQuery::new(city) {
        Ok(query) => query,
        Err(err) => {
            info!("rejecting request: {err}");
            return Reply::error(StatusCode::BAD_REQUEST, err.to_string());
        }
    };

    let client_ip = client_ip(event);
    info!(city = query.city(), client_ip = client_ip.as_deref(), "weather lookup");

    let reply = match state.orchestrator.resolve(&query).await.into_result() {
        Ok(weather) => Reply::weather(&weather),
        Err(err) => Reply::upstream(&err),
    };

    record_history(state, client_ip.as_deref(), &query, reply.status.is_success()).await;

    reply
}

async fn record_history(state: &AppState, client_ip: Option<&str>, query: &WeatherQuery, success: bool) {
    let Some(client_ip) = client_ip else {
        warn!(city = query.city(), "no client IP on request, skipping history record");
        return;
    };

    let write = state.history.record(client_ip, query, success);
    let result = match tokio::time::timeout(state.history_timeout, write).await {
        Ok(result) => result,
        Err(_) => Err(StorageError::Timeout(state.history_timeout)),
    };

    if let Err(err) = result {
        warn!(client_ip, city = query.city(), error = %err, "failed to record request history");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Source IP as reported by API Gateway, else the first `X-Forwarded-For` hop.
fn client_ip(event: &Request) -> Option<String> {
    let from_context = match event.request_context_ref() {
        Some(RequestContext::ApiGatewayV2(ctx)) => ctx.http.source_ip.clone(),
        Some(RequestContext::ApiGatewayV1(ctx)) => ctx.identity.source_ip.clone(),
        _ => None,
    };

    from_context.filter(|ip| !ip.is_empty()).or_else(|| {
        event
            .headers()
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
            .map(str::to_owned)
    })
}

struct Reply {
    status: StatusCode,
    body: Value,
}

impl Reply {
    fn weather(weather: &NormalizedWeather) -> Self {
        match serde_json::to_value(weather) {
            Ok(body) => Self { status: StatusCode::OK, body },
            Err(err) => {
                error!(error = %err, "failed to serialize weather record");
                Self::internal()
            }
        }
    }

    fn upstream(err: &AggregateError) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            body: json!({ "error": UPSTREAM_ERROR, "details": err.details() }),
        }
    }

    fn error(status: StatusCode, message: String) -> Self {
        Self { status, body: json!({ "error": message }) }
    }

    fn internal() -> Self {
        Self::error(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR.to_string())
    }

    fn to_response(&self, request_id: Option<&str>) -> Result<Response<Body>, Error> {
        let mut builder = Response::builder()
            .status(self.status)
            .header(CONTENT_TYPE, "application/json");
        if let Some(request_id) = request_id {
            builder = builder.header(REQUEST_ID_HEADER, request_id);
        }

        Ok(builder.body(Body::Text(self.body.to_string()))?)
    }
}
