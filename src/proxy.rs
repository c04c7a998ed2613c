use crate::error::{BridgeError, Result};
use crate::logging::{Outcome, RelayRecord, SharedJournal};
use crate::router::RoutedRequest;
use crate::server::AppState;
use crate::translate::context::{ConversionContext, OriginalRequest};
use crate::translate::normalize::sanitize_bytes;
use crate::translate::response::{
    builtin_tool_calls, extract_output_text, responses_to_chat, responses_to_messages,
};
use crate::translate::responses_types::{ResponsesError, ResponsesResponse};
use crate::translate::streaming::{ResponsesStreamMapper, SseEvent};
use crate::translate::usage::reconcile;
use crate::translate::Dialect;

use bytes::Bytes;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::Stream;
use futures::StreamExt;
use std::pin::Pin;

const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";

/// Outcome of relaying one request
pub enum RelayResult {
    /// A complete JSON body in the caller's dialect.
    Json { status: u16, body: Bytes },
    /// A translated event stream.
    Events(SseStream),
    /// A native backend response forwarded as it arrives.
    Passthrough {
        status: u16,
        content_type: String,
        body: ByteStream,
    },
}

/// Stream of SSE events in the caller's dialect
pub type SseStream = Pin<Box<dyn Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send>>;

pub type ByteStream = Pin<Box<dyn Stream<Item = std::result::Result<Bytes, reqwest::Error>> + Send>>;

/// Send a routed request to the channel and hand back the caller's response.
pub async fn relay(
    state: &AppState,
    routed: RoutedRequest,
    headers: &reqwest::header::HeaderMap,
    request_id: &str,
) -> Result<RelayResult> {
    let mut record = RelayRecord::new(request_id, routed.source, routed.backend, &routed.model);
    record.upstream_model = routed.upstream_model.clone();
    record.converted = routed.is_converted();
    record.fallback_reason = routed.fallback_reason.clone();
    record.stream = routed.stream;

    let response = match send(state, &routed, headers).await {
        Ok(r) => r,
        Err(e) => {
            state.journal.record(record.failed(e.status_code(), e.to_string()));
            return Err(e);
        }
    };

    let status = response.status().as_u16();
    record.status = status;

    match routed.context {
        Some(ctx) if routed.stream && status < 400 => {
            tracing::debug!(request_id, "relaying translated stream");
            let guard = StreamGuard {
                mapper: ResponsesStreamMapper::new(ctx, state.router.counter()),
                record: Some(record),
                journal: state.journal.clone(),
            };
            Ok(RelayResult::Events(Box::pin(translate_stream(response, guard))))
        }
        Some(ctx) => relay_converted(state, response, ctx, record).await,
        None => Ok(relay_native(state, response, record)),
    }
}

async fn send(
    state: &AppState,
    routed: &RoutedRequest,
    headers: &reqwest::header::HeaderMap,
) -> Result<reqwest::Response> {
    let api_key = state.config.resolve_api_key()?;
    let base_url = state.config.effective_base_url()?;
    let url = format!("{}{}", base_url, routed.backend.endpoint());

    tracing::info!(
        url = %url,
        model = %routed.upstream_model,
        stream = routed.stream,
        converted = routed.is_converted(),
        "POST"
    );

    let mut req_builder = state
        .client
        .post(&url)
        .header("Content-Type", "application/json");

    if routed.backend == Dialect::Messages {
        let version = headers
            .get("anthropic-version")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_ANTHROPIC_VERSION)
            .to_string();
        req_builder = req_builder
            .header("x-api-key", &api_key)
            .header("anthropic-version", version);
        if let Some(beta) = headers.get("anthropic-beta") {
            req_builder = req_builder.header("anthropic-beta", beta);
        }
    } else {
        req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
    }

    req_builder
        .body(routed.body.clone())
        .send()
        .await
        .map_err(|e| BridgeError::transport(format!("Request failed: {}", e)))
}

/// Translated, non-streaming, or a streaming request the backend refused.
async fn relay_converted(
    state: &AppState,
    response: reqwest::Response,
    mut ctx: ConversionContext,
    mut record: RelayRecord,
) -> Result<RelayResult> {
    let status = response.status().as_u16();
    let raw = match response.bytes().await {
        Ok(b) => b,
        Err(e) => {
            let err = BridgeError::transport(format!("Failed to read response body: {}", e));
            state.journal.record(record.failed(err.status_code(), err.to_string()));
            return Err(err);
        }
    };
    let body = sanitize_bytes(&raw);

    tracing::debug!(status, body_len = body.len(), "backend responded");

    if status >= 400 {
        let err = upstream_error(status, &body);
        state.journal.record(record.failed(status, err.to_string()));
        return Err(err);
    }

    let resp: ResponsesResponse = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            let err = BridgeError::conversion(
                format!(
                    "Failed to parse backend response. Body: {}",
                    truncate(&String::from_utf8_lossy(&body), 300)
                ),
                e,
            );
            state.journal.record(record.failed(502, err.to_string()));
            return Err(err);
        }
    };

    if let Some(usage) = &resp.usage {
        ctx.usage.absorb(usage);
    }
    ctx.output_text = extract_output_text(&resp);
    ctx.builtin_tool_calls = builtin_tool_calls(&resp);

    let reply = match &ctx.original {
        OriginalRequest::Chat(original) => serde_json::to_vec(&responses_to_chat(&resp, original)),
        OriginalRequest::Messages(original) => {
            serde_json::to_vec(&responses_to_messages(&resp, original))
        }
    }
    .map_err(|e| BridgeError::conversion("failed to encode reply", e))?;
    let status = error_status(&resp);

    record.status = status;
    if let Some(err) = &resp.error {
        record = record.failed(status, err.message.clone());
    } else {
        record.usage = Some(reconcile(&ctx, state.router.counter().as_ref()));
    }
    record.builtin_tool_calls = std::mem::take(&mut ctx.builtin_tool_calls);
    state.journal.record(record);

    Ok(RelayResult::Json {
        status,
        body: Bytes::from(sanitize_bytes(&reply).into_owned()),
    })
}

/// A backend error object inside a successful response is reported as a
/// server error.
fn error_status(resp: &ResponsesResponse) -> u16 {
    if resp.error.is_some() {
        500
    } else {
        200
    }
}

#[derive(serde::Deserialize)]
struct ErrorEnvelope {
    error: ResponsesError,
}

fn upstream_error(status: u16, body: &[u8]) -> BridgeError {
    match serde_json::from_slice::<ErrorEnvelope>(body) {
        Ok(envelope) => {
            tracing::warn!(status, message = %envelope.error.message, "backend error");
            BridgeError::upstream(status, envelope.error.kind(), envelope.error.message)
        }
        Err(_) => BridgeError::upstream(
            status,
            "upstream_error",
            format!(
                "Backend returned status {}: {}",
                status,
                truncate(&String::from_utf8_lossy(body), 500)
            ),
        ),
    }
}

fn relay_native(state: &AppState, response: reqwest::Response, record: RelayRecord) -> RelayResult {
    let status = response.status().as_u16();
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let record = if status >= 400 {
        record.failed(status, format!("Backend returned status {}", status))
    } else {
        record
    };
    state.journal.record(record);

    RelayResult::Passthrough {
        status,
        content_type,
        body: Box::pin(response.bytes_stream()),
    }
}

/// Owns the mapper for one translated stream. Dropping it, on a normal end,
/// a backend error or a caller disconnect, reconciles usage and writes the
/// journal record.
struct StreamGuard {
    mapper: ResponsesStreamMapper,
    record: Option<RelayRecord>,
    journal: SharedJournal,
}

impl StreamGuard {
    fn fail(&mut self, error: String) {
        if let Some(record) = self.record.as_mut() {
            record.outcome = Outcome::Failed;
            record.error = Some(error);
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        let terminated = self.mapper.is_done();
        let usage = self.mapper.finish();
        if let Some(mut record) = self.record.take() {
            let ctx = self.mapper.context();
            if !terminated && record.outcome == Outcome::Completed {
                record.outcome = Outcome::Truncated;
            }
            record.usage = Some(usage);
            record.malformed_frames = ctx.malformed_frames;
            record.builtin_tool_calls = ctx.builtin_tool_calls.clone();
            self.journal.record(record);
        }
    }
}

/// Parse the backend SSE stream and map each frame to the caller's events.
/// One frame is mapped and yielded before the next is read.
fn translate_stream(
    response: reqwest::Response,
    guard: StreamGuard,
) -> impl Stream<Item = std::result::Result<SseEvent, std::io::Error>> + Send + 'static {
    async_stream::stream! {
        let mut guard = guard;
        let frames = response.bytes_stream().eventsource();
        tokio::pin!(frames);

        while let Some(frame) = frames.next().await {
            let frame = match frame {
                Ok(f) => f,
                Err(EventStreamError::Transport(e)) => {
                    tracing::error!(error = %e, "backend stream error");
                    guard.fail(e.to_string());
                    break;
                }
                Err(e) => {
                    // Utf8 and parser errors only lose the frame they hit.
                    guard.mapper.skip_malformed(&e.to_string());
                    continue;
                }
            };

            for event in guard.mapper.process_frame(&frame.data) {
                match event.to_sse() {
                    Ok(sse) => yield Ok(sse),
                    Err(e) => tracing::warn!(error = %e, "failed to encode stream event"),
                }
            }
        }

        tracing::debug!("backend stream ended");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_error_keeps_status_and_kind() {
        let err = upstream_error(
            429,
            br#"{"error":{"type":"rate_limit_exceeded","message":"Too many requests"}}"#,
        );
        assert_eq!(err.status_code(), 429);
        let body = err.to_body(Dialect::Chat);
        assert_eq!(body["error"]["type"], "rate_limit_exceeded");
        assert_eq!(body["error"]["message"], "Too many requests");
    }

    #[test]
    fn test_upstream_error_without_envelope() {
        let err = upstream_error(503, b"<html>unavailable</html>");
        assert_eq!(err.status_code(), 503);
        assert!(err.to_string().contains("unavailable"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
