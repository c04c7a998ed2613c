//! Decide, per request, whether to relay natively or translate to Responses.
//!
//! A request is translated when the channel only speaks Responses, or when
//! smart routing claims its model. When translation fails the router can
//! fall back to native handling so the request is still served.

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use crate::config::{BridgeConfig, SmartRoutingConfig};
use crate::error::{BridgeError, Result};
use crate::translate::chat_types::ChatCompletionRequest;
use crate::translate::context::{ConversionContext, OriginalRequest};
use crate::translate::messages_types::MessagesRequest;
use crate::translate::normalize::sanitize_bytes;
use crate::translate::request::{chat_to_responses, messages_to_responses, responses_passthrough};
use crate::translate::responses_types::ResponsesRequest;
use crate::translate::usage::{estimate_prompt_tokens, TokenCounter};
use crate::translate::Dialect;

/// A request ready to be sent to the channel.
#[derive(Debug)]
pub struct RoutedRequest {
    /// Dialect the caller spoke.
    pub source: Dialect,
    /// Dialect of the backend endpoint the body is sent to.
    pub backend: Dialect,
    pub model: String,
    pub upstream_model: String,
    pub stream: bool,
    pub body: Bytes,
    /// Present only for translated requests.
    pub context: Option<ConversionContext>,
    /// Why translation was abandoned, when the router fell back to native.
    pub fallback_reason: Option<String>,
}

impl RoutedRequest {
    pub fn is_converted(&self) -> bool {
        self.context.is_some()
    }
}

pub struct SmartRouter {
    channel: Dialect,
    smart_routing: SmartRoutingConfig,
    models: HashMap<String, String>,
    counter: Arc<dyn TokenCounter>,
}

impl std::fmt::Debug for SmartRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmartRouter")
            .field("channel", &self.channel)
            .field("smart_routing", &self.smart_routing)
            .field("models", &self.models)
            .finish_non_exhaustive()
    }
}

impl SmartRouter {
    pub fn new(
        channel: Dialect,
        smart_routing: SmartRoutingConfig,
        models: HashMap<String, String>,
        counter: Arc<dyn TokenCounter>,
    ) -> Self {
        Self {
            channel,
            smart_routing,
            models,
            counter,
        }
    }

    pub fn from_config(config: &BridgeConfig, counter: Arc<dyn TokenCounter>) -> Result<Self> {
        Ok(Self::new(
            config.channel_dialect()?,
            config.smart_routing.clone(),
            config.models.clone(),
            counter,
        ))
    }

    pub fn channel(&self) -> Dialect {
        self.channel
    }

    pub fn counter(&self) -> Arc<dyn TokenCounter> {
        Arc::clone(&self.counter)
    }

    fn upstream_model(&self, requested: &str) -> String {
        self.models
            .get(requested)
            .cloned()
            .unwrap_or_else(|| requested.to_string())
    }

    /// Backend dialect for a request in `source` for `model`.
    pub fn plan(&self, source: Dialect, model: &str) -> Dialect {
        let claimed = self.smart_routing.claims(model);
        if source == Dialect::Responses {
            return Dialect::Responses;
        }
        if self.channel == source && !claimed {
            return source;
        }
        if self.channel == Dialect::Responses || claimed {
            return Dialect::Responses;
        }
        source
    }

    /// Decode a caller body and turn it into the request for the channel.
    pub fn route(&self, source: Dialect, body: &[u8]) -> Result<RoutedRequest> {
        let cleaned = sanitize_bytes(body);
        if cleaned.iter().all(u8::is_ascii_whitespace) {
            return Err(BridgeError::input("request body is empty"));
        }
        let value: Value = serde_json::from_slice(&cleaned)
            .map_err(|e| BridgeError::input(format!("invalid request body: {e}")))?;

        let model = value
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
        let upstream_model = self.upstream_model(&model);
        let backend = self.plan(source, &model);

        if backend == Dialect::Responses && source != Dialect::Responses {
            match self.translate(source, &value, &upstream_model) {
                Ok((body, context)) => {
                    tracing::debug!(
                        source = %source,
                        model = %model,
                        upstream_model = %upstream_model,
                        prompt_tokens = context.prompt_tokens,
                        "translating request to responses"
                    );
                    return Ok(RoutedRequest {
                        source,
                        backend,
                        model,
                        upstream_model,
                        stream,
                        body,
                        context: Some(context),
                        fallback_reason: None,
                    });
                }
                Err(e) if e.is_translation_failure() && self.smart_routing.fallback_on_error => {
                    tracing::warn!(
                        source = %source,
                        model = %model,
                        error = %e,
                        "request translation failed, falling back to native handling"
                    );
                    let body = native_body(source, value, &upstream_model)?;
                    return Ok(RoutedRequest {
                        source,
                        backend: source,
                        model,
                        upstream_model,
                        stream,
                        body,
                        context: None,
                        fallback_reason: Some(e.to_string()),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let body = native_body(source, value, &upstream_model)?;
        Ok(RoutedRequest {
            source,
            backend,
            model,
            upstream_model,
            stream,
            body,
            context: None,
            fallback_reason: None,
        })
    }

    fn translate(
        &self,
        source: Dialect,
        value: &Value,
        upstream_model: &str,
    ) -> Result<(Bytes, ConversionContext)> {
        if value.is_null() {
            return Err(BridgeError::input("request is null"));
        }

        let (responses_req, original) = match source {
            Dialect::Messages => {
                let req: MessagesRequest = decode(value)?;
                (messages_to_responses(&req, upstream_model)?, OriginalRequest::Messages(req))
            }
            Dialect::Chat => {
                let req: ChatCompletionRequest = decode(value)?;
                (chat_to_responses(&req, upstream_model)?, OriginalRequest::Chat(req))
            }
            Dialect::Responses => {
                return Err(BridgeError::input("responses requests are not translated"));
            }
        };

        let prompt_tokens = estimate_prompt_tokens(&responses_req, self.counter.as_ref());
        let body = serde_json::to_vec(&responses_req)
            .map_err(|e| BridgeError::conversion("failed to encode responses request", e))?;
        let context = ConversionContext::new(original, upstream_model, prompt_tokens);
        Ok((Bytes::from(body), context))
    }
}

fn decode<T: serde::de::DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|e| BridgeError::conversion("failed to decode request", e))
}

/// Body for a native route: the caller's request with only its model mapped.
/// Anything else, a null payload included, is left for the channel to judge.
fn native_body(source: Dialect, mut value: Value, upstream_model: &str) -> Result<Bytes> {
    let body = if source == Dialect::Responses {
        let req: ResponsesRequest = serde_json::from_value(value)
            .map_err(|e| BridgeError::input(format!("invalid responses request: {e}")))?;
        serde_json::to_vec(&responses_passthrough(req, upstream_model)?)?
    } else {
        if let Some(obj) = value.as_object_mut() {
            if obj.get("model").and_then(Value::as_str).is_some_and(|m| !m.is_empty()) {
                obj.insert("model".to_string(), Value::String(upstream_model.to_string()));
            }
        }
        serde_json::to_vec(&value)?
    };
    Ok(Bytes::from(body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::responses_types::ResponsesInput;

    struct WordCounter;

    impl TokenCounter for WordCounter {
        fn count_tokens(&self, text: &str, _model: &str) -> u64 {
            text.split_whitespace().count() as u64
        }
    }

    fn router(channel: Dialect, responses_models: &[&str], fallback_on_error: bool) -> SmartRouter {
        SmartRouter::new(
            channel,
            SmartRoutingConfig {
                enabled: !responses_models.is_empty(),
                responses_models: responses_models.iter().map(|m| m.to_string()).collect(),
                fallback_on_error,
            },
            HashMap::from([("claude-3-opus".to_string(), "gpt-5".to_string())]),
            Arc::new(WordCounter),
        )
    }

    #[test]
    fn test_plan() {
        let responses = router(Dialect::Responses, &[], true);
        assert_eq!(responses.plan(Dialect::Chat, "gpt-5"), Dialect::Responses);
        assert_eq!(responses.plan(Dialect::Messages, "claude"), Dialect::Responses);
        assert_eq!(responses.plan(Dialect::Responses, "gpt-5"), Dialect::Responses);

        let messages = router(Dialect::Messages, &["claude-3-opus"], true);
        assert_eq!(messages.plan(Dialect::Messages, "claude-3-opus"), Dialect::Responses);
        assert_eq!(messages.plan(Dialect::Messages, "claude-sonnet-4"), Dialect::Messages);
        assert_eq!(messages.plan(Dialect::Chat, "gpt-4o"), Dialect::Chat);

        let chat = router(Dialect::Chat, &[], true);
        assert_eq!(chat.plan(Dialect::Chat, "gpt-4o"), Dialect::Chat);
        assert_eq!(chat.plan(Dialect::Messages, "claude"), Dialect::Messages);
    }

    #[test]
    fn test_chat_is_translated_for_responses_channel() {
        let body = br#"{"model":"gpt-5","stream":true,"messages":[{"role":"system","content":"be nice"},{"role":"user","content":"hi there"}]}"#;
        let routed = router(Dialect::Responses, &[], true)
            .route(Dialect::Chat, body)
            .unwrap();

        assert!(routed.is_converted());
        assert!(routed.stream);
        assert_eq!(routed.backend, Dialect::Responses);

        let ctx = routed.context.as_ref().unwrap();
        assert_eq!(ctx.converted_from(), Dialect::Chat);
        assert_eq!(ctx.upstream_model, "gpt-5");
        assert_eq!(ctx.prompt_tokens, 4);

        let sent: ResponsesRequest = serde_json::from_slice(&routed.body).unwrap();
        assert_eq!(sent.instructions.as_deref(), Some("be nice"));
        assert!(matches!(sent.input, Some(ResponsesInput::Items(ref items)) if items.len() == 1));
    }

    #[test]
    fn test_smart_routing_claims_messages_model() {
        let body = br#"{"model":"claude-3-opus","max_tokens":64,"messages":[{"role":"user","content":"hi"}]}"#;
        let routed = router(Dialect::Messages, &["claude-3-opus"], true)
            .route(Dialect::Messages, body)
            .unwrap();

        assert!(routed.is_converted());
        assert_eq!(routed.upstream_model, "gpt-5");
        let sent: ResponsesRequest = serde_json::from_slice(&routed.body).unwrap();
        assert_eq!(sent.model, "gpt-5");
        assert_eq!(sent.max_output_tokens, Some(64));
    }

    #[test]
    fn test_unclaimed_model_is_native() {
        let body = br#"{"model":"claude-3-opus","max_tokens":64,"messages":[],"anthropic_beta":["x"]}"#;
        let routed = router(Dialect::Messages, &[], true)
            .route(Dialect::Messages, body)
            .unwrap();

        assert!(!routed.is_converted());
        assert_eq!(routed.backend, Dialect::Messages);
        let sent: Value = serde_json::from_slice(&routed.body).unwrap();
        assert_eq!(sent["model"], "gpt-5");
        assert_eq!(sent["anthropic_beta"], serde_json::json!(["x"]));
    }

    #[test]
    fn test_null_payload_falls_back_to_native() {
        let routed = router(Dialect::Responses, &[], true)
            .route(Dialect::Chat, b"null")
            .unwrap();
        assert!(!routed.is_converted());
        assert_eq!(routed.backend, Dialect::Chat);
        assert!(routed.fallback_reason.unwrap().contains("request is null"));
        assert_eq!(&routed.body[..], b"null");
    }

    #[test]
    fn test_undecodable_request_falls_back_to_native() {
        let body = br#"{"model":"claude-3-opus","messages":"not a list"}"#;
        let routed = router(Dialect::Messages, &["claude-3-opus"], true)
            .route(Dialect::Messages, body)
            .unwrap();
        assert!(!routed.is_converted());
        assert_eq!(routed.backend, Dialect::Messages);
        assert!(routed.fallback_reason.is_some());
    }

    #[test]
    fn test_fallback_disabled_surfaces_translation_error() {
        let body = br#"{"model":"claude-3-opus","messages":"not a list"}"#;
        let err = router(Dialect::Messages, &["claude-3-opus"], false)
            .route(Dialect::Messages, body)
            .unwrap_err();
        assert!(err.is_translation_failure());
    }

    #[test]
    fn test_null_and_empty_bodies_are_input_errors() {
        let r = router(Dialect::Responses, &[], false);
        assert!(matches!(r.route(Dialect::Chat, b"").unwrap_err(), BridgeError::Input { .. }));
        assert!(matches!(r.route(Dialect::Chat, b"  \n").unwrap_err(), BridgeError::Input { .. }));
        assert!(matches!(r.route(Dialect::Chat, b"null").unwrap_err(), BridgeError::Input { .. }));
        assert!(matches!(r.route(Dialect::Chat, b"{oops").unwrap_err(), BridgeError::Input { .. }));
    }

    #[test]
    fn test_invalid_bytes_removed_before_translation() {
        let body = b"{\"model\":\"gpt-5\",\"messages\":[{\"role\":\"system\",\"content\":\"be\xc3 nice\x07\"},{\"role\":\"user\",\"content\":\"hi\"}]}";
        let routed = router(Dialect::Responses, &[], true)
            .route(Dialect::Chat, body)
            .unwrap();
        let sent: ResponsesRequest = serde_json::from_slice(&routed.body).unwrap();
        assert_eq!(sent.instructions.as_deref(), Some("be nice"));
    }

    #[test]
    fn test_responses_requests_pass_through() {
        let body = br#"{"model":"claude-3-opus","input":"hello","store":false}"#;
        let routed = router(Dialect::Messages, &[], true)
            .route(Dialect::Responses, body)
            .unwrap();
        assert!(!routed.is_converted());
        assert_eq!(routed.backend, Dialect::Responses);
        let sent: Value = serde_json::from_slice(&routed.body).unwrap();
        assert_eq!(sent["model"], "gpt-5");
        assert_eq!(sent["store"], false);
    }
}
