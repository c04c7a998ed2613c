use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::logging::{RelayRecord, SharedJournal};
use crate::proxy::{self, RelayResult};
use crate::router::SmartRouter;
use crate::translate::Dialect;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use futures::stream::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

const DEFAULT_JOURNAL_LIMIT: usize = 50;

pub struct AppState {
    pub config: BridgeConfig,
    pub client: reqwest::Client,
    pub journal: SharedJournal,
    pub router: SmartRouter,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/v1/messages", post(handle_messages))
        .route("/v1/chat/completions", post(handle_chat))
        .route("/v1/responses", post(handle_responses))
        .route("/health", get(handle_health))
        .route("/v1/models", get(handle_models))
        .route("/journal/recent", get(handle_journal))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn handle_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_dialect(state, Dialect::Messages, headers, body).await
}

async fn handle_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_dialect(state, Dialect::Chat, headers, body).await
}

async fn handle_responses(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_dialect(state, Dialect::Responses, headers, body).await
}

async fn handle_dialect(
    state: Arc<AppState>,
    dialect: Dialect,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();

    let routed = match state.router.route(dialect, &body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!(request_id = %request_id, dialect = %dialect, error = %e, "rejected request");
            let record = RelayRecord::new(&request_id, dialect, dialect, "");
            state.journal.record(record.failed(e.status_code(), e.to_string()));
            return error_response(&e, dialect);
        }
    };

    tracing::info!(
        request_id = %request_id,
        source = %routed.source,
        backend = %routed.backend,
        model = %routed.model,
        stream = routed.stream,
        "routing request"
    );

    let req_headers = reqwest_headers_from_axum(&headers);
    match proxy::relay(&state, routed, &req_headers, &request_id).await {
        Ok(result) => relay_response(result),
        Err(e) => {
            tracing::error!(request_id = %request_id, error = %e, "relay failed");
            error_response(&e, dialect)
        }
    }
}

fn relay_response(result: RelayResult) -> Response {
    match result {
        RelayResult::Json { status, body } => Response::builder()
            .status(status_or_bad_gateway(status))
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        RelayResult::Events(events) => {
            let events = events.map(|result| -> Result<Event, Infallible> {
                match result {
                    Ok(sse) => {
                        let event = Event::default().data(sse.data);
                        Ok(match sse.event {
                            Some(name) => event.event(name),
                            None => event,
                        })
                    }
                    Err(_) => Ok(Event::default().event("error").data("{}")),
                }
            });
            Sse::new(events)
                .keep_alive(KeepAlive::default())
                .into_response()
        }
        RelayResult::Passthrough {
            status,
            content_type,
            body,
        } => {
            let mut builder = Response::builder()
                .status(status_or_bad_gateway(status))
                .header("content-type", content_type.as_str());
            if content_type.contains("text/event-stream") {
                builder = builder.header("cache-control", "no-cache");
            }
            builder
                .body(Body::from_stream(body))
                .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response())
        }
    }
}

fn error_response(err: &BridgeError, dialect: Dialect) -> Response {
    let status = status_or_bad_gateway(err.status_code());
    (status, Json(err.to_body(dialect))).into_response()
}

fn status_or_bad_gateway(status: u16) -> StatusCode {
    StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_GATEWAY)
}

async fn handle_health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Models named in the config: mapped names plus smart-routed ones.
async fn handle_models(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    let mut names: Vec<&String> = state
        .config
        .models
        .keys()
        .chain(state.config.smart_routing.responses_models.iter())
        .collect();
    names.sort();
    names.dedup();

    let models: Vec<serde_json::Value> = names
        .into_iter()
        .map(|name| {
            serde_json::json!({
                "id": name,
                "object": "model",
                "owned_by": state.config.channel.name,
            })
        })
        .collect();

    Json(serde_json::json!({ "data": models, "object": "list" }))
}

#[derive(Deserialize)]
struct JournalQuery {
    limit: Option<usize>,
}

async fn handle_journal(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JournalQuery>,
) -> Json<serde_json::Value> {
    let records = state
        .journal
        .recent(query.limit.unwrap_or(DEFAULT_JOURNAL_LIMIT));
    Json(serde_json::json!({ "data": records }))
}

fn reqwest_headers_from_axum(headers: &HeaderMap) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (key, value) in headers.iter() {
        if let Ok(name) = reqwest::header::HeaderName::from_bytes(key.as_str().as_bytes()) {
            if let Ok(val) = reqwest::header::HeaderValue::from_bytes(value.as_bytes()) {
                out.insert(name, val);
            }
        }
    }
    out
}
