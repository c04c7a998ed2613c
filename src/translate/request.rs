//! Translate Messages and Chat Completions requests into Responses requests.
//!
//! System content becomes `instructions`, every other turn becomes a
//! `message` input item. Tools and tool choice are carried as opaque JSON.
//! Parameters with no Responses equivalent (`stop`, `stop_sequences`,
//! `response_format`, `top_k`) are dropped, never mis-mapped.
//!
//! The inverse translators at the bottom rebuild Chat and Messages requests
//! from a Responses request.

use serde_json::json;

use super::chat_types::{ChatCompletionRequest, ChatMessage};
use super::content::{BlockDirection, MessageContent, Role};
use super::messages_types::{Message, MessagesRequest};
use super::normalize::{ensure_valid_value, sanitize, sanitize_bytes};
use super::responses_types::{InputItem, Reasoning, ResponsesInput, ResponsesRequest};
use crate::error::{BridgeError, Result};

/// Translate a Messages request into a Responses request for `target_model`.
/// An empty `target_model` keeps the requested model.
pub fn messages_to_responses(req: &MessagesRequest, target_model: &str) -> Result<ResponsesRequest> {
    if req.model.is_empty() {
        return Err(BridgeError::input("model is required"));
    }

    let system = req.system.as_ref().or_else(|| {
        req.messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| &m.content)
    });
    let instructions = match system {
        Some(content) => instructions_from(content)?,
        None => None,
    };

    let mut items = Vec::with_capacity(req.messages.len());
    for msg in req.messages.iter().filter(|m| m.role != Role::System) {
        items.push(InputItem::message(
            msg.role.as_str(),
            Some(input_content(&msg.content)?),
        ));
    }

    let user = req
        .metadata
        .as_ref()
        .and_then(|m| m.get("user_id"))
        .and_then(|u| u.as_str())
        .map(String::from);

    log_dropped(&[
        ("stop_sequences", req.stop_sequences.is_some()),
        ("top_k", req.top_k.is_some()),
    ]);

    Ok(ResponsesRequest {
        model: upstream_model(&req.model, target_model),
        input: (!items.is_empty()).then_some(ResponsesInput::Items(items)),
        instructions,
        max_output_tokens: req.max_tokens.or(req.max_tokens_to_sample),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        user,
        reasoning: reasoning(req.reasoning_effort.as_deref()),
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        parallel_tool_calls: None,
        metadata: req.metadata.clone(),
        extra: Default::default(),
    })
}

/// Translate a Chat Completions request into a Responses request for
/// `target_model`. An empty `target_model` keeps the requested model.
pub fn chat_to_responses(
    req: &ChatCompletionRequest,
    target_model: &str,
) -> Result<ResponsesRequest> {
    if req.model.is_empty() {
        return Err(BridgeError::input("model is required"));
    }

    let instructions = match req
        .messages
        .iter()
        .find(|m| m.role == "system")
        .and_then(|m| m.content.as_ref())
    {
        Some(content) => instructions_from(content)?,
        None => None,
    };

    let mut items = Vec::with_capacity(req.messages.len());
    for msg in req.messages.iter().filter(|m| m.role != "system") {
        let content = match &msg.content {
            Some(content) => Some(input_content(content)?),
            None => None,
        };
        items.push(InputItem::message(&msg.role, content));
    }

    log_dropped(&[
        ("stop", req.stop.is_some()),
        ("response_format", req.response_format.is_some()),
        ("stream_options", req.stream_options.is_some()),
    ]);

    Ok(ResponsesRequest {
        model: upstream_model(&req.model, target_model),
        input: (!items.is_empty()).then_some(ResponsesInput::Items(items)),
        instructions,
        max_output_tokens: req.max_tokens.or(req.max_completion_tokens),
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        user: req.user.clone(),
        reasoning: reasoning(req.reasoning_effort.as_deref()),
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        parallel_tool_calls: req.parallel_tool_calls.clone(),
        metadata: None,
        extra: Default::default(),
    })
}

/// A native Responses request only gets its model mapped.
pub fn responses_passthrough(mut req: ResponsesRequest, target_model: &str) -> Result<ResponsesRequest> {
    if req.model.is_empty() {
        return Err(BridgeError::input("model is required"));
    }
    req.model = upstream_model(&req.model, target_model);
    Ok(req)
}

fn upstream_model(requested: &str, target: &str) -> String {
    if target.is_empty() {
        requested.to_string()
    } else {
        target.to_string()
    }
}

fn reasoning(effort: Option<&str>) -> Option<Reasoning> {
    effort.filter(|e| !e.is_empty()).map(|e| Reasoning {
        effort: e.to_string(),
        summary: None,
    })
}

fn log_dropped(params: &[(&str, bool)]) {
    for (name, present) in params {
        if *present {
            tracing::debug!(param = *name, "dropping parameter with no Responses equivalent");
        }
    }
}

/// Plain text is sanitized. Structured content is encoded as JSON text and
/// the encoded bytes sanitized. Empty content yields no instructions.
fn instructions_from(content: &MessageContent) -> Result<Option<String>> {
    let text = match content {
        MessageContent::Text(t) => sanitize(t).into_owned(),
        MessageContent::Blocks(blocks) if blocks.is_empty() => String::new(),
        MessageContent::Blocks(blocks) => {
            let encoded = serde_json::to_vec(blocks)
                .map_err(|e| BridgeError::conversion("failed to encode system content", e))?;
            String::from_utf8(sanitize_bytes(&encoded).into_owned())
                .map_err(|_| BridgeError::encoding("system content is not valid UTF-8"))?
        }
    };
    Ok((!text.is_empty()).then_some(text))
}

/// String content is sanitized. Block content has its type tags rewritten
/// and must then pass the strict check; it is never rewritten in place.
fn input_content(content: &MessageContent) -> Result<MessageContent> {
    match content {
        MessageContent::Text(t) => Ok(MessageContent::Text(sanitize(t).into_owned())),
        MessageContent::Blocks(_) => {
            let retagged = content.retagged(BlockDirection::ToResponses);
            let value = serde_json::to_value(&retagged)
                .map_err(|e| BridgeError::conversion("failed to encode message content", e))?;
            ensure_valid_value(&value)?;
            Ok(retagged)
        }
    }
}

// ---------------------------------------------------------------------------
// Responses -> Chat / Messages
// ---------------------------------------------------------------------------

fn output_content(content: &MessageContent) -> MessageContent {
    content.retagged(BlockDirection::FromResponses)
}

fn input_items(req: &ResponsesRequest) -> Vec<InputItem> {
    match &req.input {
        Some(ResponsesInput::Text(t)) => vec![InputItem::message(
            "user",
            Some(MessageContent::Text(t.clone())),
        )],
        Some(ResponsesInput::Items(items)) => items.iter().filter(|i| i.is_message()).cloned().collect(),
        None => Vec::new(),
    }
}

/// Rebuild a Chat Completions request from a Responses request.
pub fn responses_to_chat(req: &ResponsesRequest) -> Result<ChatCompletionRequest> {
    if req.model.is_empty() {
        return Err(BridgeError::input("model is required"));
    }

    let mut messages = Vec::new();
    if let Some(instructions) = req.instructions.as_deref().filter(|i| !i.is_empty()) {
        messages.push(ChatMessage::new("system", instructions));
    }
    for item in input_items(req) {
        messages.push(ChatMessage {
            role: item.role.unwrap_or_else(|| "user".to_string()),
            content: item.content.as_ref().map(output_content),
            name: None,
        });
    }

    Ok(ChatCompletionRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_output_tokens,
        temperature: req.temperature,
        top_p: req.top_p,
        stream: req.stream,
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        parallel_tool_calls: req.parallel_tool_calls.clone(),
        reasoning_effort: req.reasoning.as_ref().map(|r| r.effort.clone()),
        user: req.user.clone(),
        ..Default::default()
    })
}

/// Rebuild a Messages request from a Responses request. System and developer
/// items fill `system` when there are no instructions; items with roles the
/// Messages dialect cannot express are skipped.
pub fn responses_to_messages(req: &ResponsesRequest) -> Result<MessagesRequest> {
    if req.model.is_empty() {
        return Err(BridgeError::input("model is required"));
    }

    let mut system = req
        .instructions
        .as_deref()
        .filter(|i| !i.is_empty())
        .map(|i| MessageContent::Text(i.to_string()));
    let mut messages = Vec::new();

    for item in input_items(req) {
        let Some(content) = item.content.as_ref().map(output_content) else {
            continue;
        };
        match item.role.as_deref() {
            Some("user") => messages.push(Message {
                role: Role::User,
                content,
            }),
            Some("assistant") => messages.push(Message {
                role: Role::Assistant,
                content,
            }),
            Some("system" | "developer") => {
                if system.is_none() {
                    system = Some(content);
                }
            }
            other => {
                tracing::debug!(role = ?other, "skipping input item with no Messages role");
            }
        }
    }

    let metadata = match (&req.metadata, &req.user) {
        (Some(m), _) => Some(m.clone()),
        (None, Some(user)) => Some(json!({ "user_id": user })),
        (None, None) => None,
    };

    Ok(MessagesRequest {
        model: req.model.clone(),
        messages,
        max_tokens: req.max_output_tokens,
        system,
        stream: req.stream,
        temperature: req.temperature,
        top_p: req.top_p,
        tools: req.tools.clone(),
        tool_choice: req.tool_choice.clone(),
        metadata,
        reasoning_effort: req.reasoning.as_ref().map(|r| r.effort.clone()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translate::content::ContentBlock;
    use serde_json::Value;

    fn chat_request(messages: Vec<ChatMessage>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "gpt-5".to_string(),
            messages,
            ..Default::default()
        }
    }

    fn items(req: &ResponsesRequest) -> &[InputItem] {
        match &req.input {
            Some(ResponsesInput::Items(items)) => items,
            other => panic!("expected input items, got {other:?}"),
        }
    }

    #[test]
    fn test_system_becomes_instructions() {
        let req = chat_request(vec![
            ChatMessage::new("system", "be nice"),
            ChatMessage::new("user", "hi"),
        ]);

        let result = chat_to_responses(&req, "").unwrap();
        assert_eq!(result.model, "gpt-5");
        assert_eq!(result.instructions.as_deref(), Some("be nice"));

        let items = items(&result);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type.as_deref(), Some("message"));
        assert_eq!(items[0].role.as_deref(), Some("user"));
        assert_eq!(items[0].content, Some(MessageContent::Text("hi".to_string())));

        let wire = serde_json::to_value(&result).unwrap();
        assert_eq!(
            wire["input"],
            serde_json::json!([{"type": "message", "role": "user", "content": "hi"}])
        );
    }

    #[test]
    fn test_messages_system_field_wins_over_system_message() {
        let req = MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            system: Some(MessageContent::Text("from field".to_string())),
            messages: vec![
                Message::new(Role::System, "from message"),
                Message::new(Role::User, "hello"),
                Message::new(Role::Assistant, "hi!"),
            ],
            max_tokens: Some(256),
            ..Default::default()
        };

        let result = messages_to_responses(&req, "gpt-5").unwrap();
        assert_eq!(result.model, "gpt-5");
        assert_eq!(result.instructions.as_deref(), Some("from field"));
        assert_eq!(result.max_output_tokens, Some(256));

        let roles: Vec<_> = items(&result).iter().map(|i| i.role.as_deref()).collect();
        assert_eq!(roles, vec![Some("user"), Some("assistant")]);
    }

    #[test]
    fn test_control_characters_removed_from_system() {
        let req = chat_request(vec![
            ChatMessage::new("system", "be\u{0} nice\u{1b}"),
            ChatMessage::new("user", "hi\u{7}"),
        ]);
        let result = chat_to_responses(&req, "").unwrap();
        assert_eq!(result.instructions.as_deref(), Some("be nice"));
        assert_eq!(
            items(&result)[0].content,
            Some(MessageContent::Text("hi".to_string()))
        );
    }

    #[test]
    fn test_invalid_bytes_never_reach_instructions() {
        // A body carrying invalid UTF-8 is cleaned before it is decoded; what
        // is left of the system text arrives intact.
        let raw = b"{\"model\":\"gpt-5\",\"messages\":[{\"role\":\"system\",\"content\":\"ok\xff\x01!\"}]}";
        let cleaned = sanitize_bytes(raw);
        let req: ChatCompletionRequest = serde_json::from_slice(&cleaned).unwrap();
        let result = chat_to_responses(&req, "").unwrap();
        assert_eq!(result.instructions.as_deref(), Some("ok!"));
    }

    #[test]
    fn test_structured_system_is_encoded_as_json() {
        let req = MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            system: Some(MessageContent::Blocks(vec![ContentBlock::text("rules")])),
            messages: vec![Message::new(Role::User, "hi")],
            ..Default::default()
        };
        let result = messages_to_responses(&req, "").unwrap();
        let instructions = result.instructions.unwrap();
        let decoded: Value = serde_json::from_str(&instructions).unwrap();
        assert_eq!(decoded, serde_json::json!([{"type": "text", "text": "rules"}]));
    }

    #[test]
    fn test_empty_system_yields_no_instructions() {
        let req = chat_request(vec![
            ChatMessage::new("system", ""),
            ChatMessage::new("user", "hi"),
        ]);
        let result = chat_to_responses(&req, "").unwrap();
        assert!(result.instructions.is_none());
        let wire = serde_json::to_value(&result).unwrap();
        assert!(wire.get("instructions").is_none());
    }

    #[test]
    fn test_block_content_is_retagged() {
        let blocks: Vec<ContentBlock> = serde_json::from_value(serde_json::json!([
            {"type": "text", "text": "what is this?"},
            {"type": "image", "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"}}
        ]))
        .unwrap();
        let req = MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            messages: vec![Message {
                role: Role::User,
                content: MessageContent::Blocks(blocks),
            }],
            ..Default::default()
        };

        let result = messages_to_responses(&req, "").unwrap();
        let Some(MessageContent::Blocks(out)) = &items(&result)[0].content else {
            panic!("expected block content");
        };
        assert_eq!(out[0].block_type(), Some("input_text"));
        assert_eq!(out[1].block_type(), Some("input_image"));
        assert_eq!(out[1].0["source"]["data"], "AAAA");
    }

    #[test]
    fn test_invalid_block_content_is_an_encoding_error() {
        let req = chat_request(vec![ChatMessage {
            role: "user".to_string(),
            content: Some(MessageContent::Blocks(vec![ContentBlock::text("bad\u{2}")])),
            name: None,
        }]);
        let err = chat_to_responses(&req, "").unwrap_err();
        assert!(matches!(err, BridgeError::Encoding { .. }));
    }

    #[test]
    fn test_missing_model_is_an_input_error() {
        let err = chat_to_responses(&ChatCompletionRequest::default(), "gpt-5").unwrap_err();
        assert!(matches!(err, BridgeError::Input { .. }));

        let err = messages_to_responses(&MessagesRequest::default(), "gpt-5").unwrap_err();
        assert!(matches!(err, BridgeError::Input { .. }));

        let err = responses_passthrough(ResponsesRequest::default(), "gpt-5").unwrap_err();
        assert!(err.is_translation_failure());
    }

    #[test]
    fn test_token_limit_falls_back_to_completion_limit() {
        let mut req = chat_request(vec![ChatMessage::new("user", "hi")]);
        req.max_completion_tokens = Some(512);
        assert_eq!(chat_to_responses(&req, "").unwrap().max_output_tokens, Some(512));

        req.max_tokens = Some(64);
        assert_eq!(chat_to_responses(&req, "").unwrap().max_output_tokens, Some(64));

        let legacy = MessagesRequest {
            model: "claude-2".to_string(),
            max_tokens_to_sample: Some(300),
            messages: vec![Message::new(Role::User, "hi")],
            ..Default::default()
        };
        assert_eq!(
            messages_to_responses(&legacy, "").unwrap().max_output_tokens,
            Some(300)
        );
    }

    #[test]
    fn test_parameters_without_equivalent_are_dropped() {
        let req: ChatCompletionRequest = serde_json::from_value(serde_json::json!({
            "model": "gpt-5",
            "messages": [{"role": "user", "content": "hi"}],
            "stop": ["\n"],
            "response_format": {"type": "json_object"},
            "temperature": 0.2,
            "reasoning_effort": "high",
            "user": "u-1"
        }))
        .unwrap();

        let result = chat_to_responses(&req, "").unwrap();
        let wire = serde_json::to_value(&result).unwrap();
        assert!(wire.get("stop").is_none());
        assert!(wire.get("response_format").is_none());
        assert_eq!(wire["temperature"], 0.2);
        assert_eq!(wire["reasoning"]["effort"], "high");
        assert_eq!(wire["user"], "u-1");
    }

    #[test]
    fn test_tools_pass_through_opaquely() {
        let tools = serde_json::json!([{
            "type": "function",
            "function": {"name": "lookup", "parameters": {"type": "object"}}
        }]);
        let mut req = chat_request(vec![ChatMessage::new("user", "hi")]);
        req.tools = Some(tools.clone());
        req.tool_choice = Some(Value::String("auto".to_string()));
        req.parallel_tool_calls = Some(Value::Bool(false));

        let result = chat_to_responses(&req, "").unwrap();
        assert_eq!(result.tools, Some(tools));
        assert_eq!(result.tool_choice, Some(Value::String("auto".to_string())));
        assert_eq!(result.parallel_tool_calls, Some(Value::Bool(false)));
    }

    #[test]
    fn test_messages_metadata_user_id_becomes_user() {
        let req = MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            messages: vec![Message::new(Role::User, "hi")],
            metadata: Some(serde_json::json!({"user_id": "abc"})),
            stop_sequences: Some(vec!["END".to_string()]),
            top_k: Some(5),
            ..Default::default()
        };
        let result = messages_to_responses(&req, "").unwrap();
        assert_eq!(result.user.as_deref(), Some("abc"));
        assert_eq!(result.metadata, Some(serde_json::json!({"user_id": "abc"})));
    }

    #[test]
    fn test_plain_text_survives_round_trip_through_chat() {
        let texts = ["hi", "multi\nline\ttext", "unicode 世界 🚀", ""];
        for text in texts {
            let req = chat_request(vec![
                ChatMessage::new("system", "be nice"),
                ChatMessage::new("user", text),
                ChatMessage::new("assistant", "ok"),
            ]);
            let back = responses_to_chat(&chat_to_responses(&req, "").unwrap()).unwrap();
            assert_eq!(back.messages, req.messages);
        }
    }

    #[test]
    fn test_plain_text_survives_round_trip_through_messages() {
        let req = MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            system: Some(MessageContent::Text("be nice".to_string())),
            messages: vec![
                Message::new(Role::User, "hello there"),
                Message::new(Role::Assistant, "general kenobi"),
            ],
            max_tokens: Some(100),
            ..Default::default()
        };
        let back = responses_to_messages(&messages_to_responses(&req, "").unwrap()).unwrap();
        assert_eq!(back.system, req.system);
        assert_eq!(back.messages, req.messages);
        assert_eq!(back.max_tokens, Some(100));
    }

    #[test]
    fn test_inverse_restores_block_names() {
        let req = ResponsesRequest {
            model: "gpt-5".to_string(),
            input: Some(ResponsesInput::Items(vec![InputItem::message(
                "user",
                Some(MessageContent::Blocks(vec![
                    ContentBlock::text("x").retagged(BlockDirection::ToResponses),
                ])),
            )])),
            ..Default::default()
        };
        let chat = responses_to_chat(&req).unwrap();
        let Some(MessageContent::Blocks(blocks)) = &chat.messages[0].content else {
            panic!("expected block content");
        };
        assert_eq!(blocks[0].block_type(), Some("text"));
    }

    #[test]
    fn test_passthrough_maps_model_and_keeps_unknown_fields() {
        let req: ResponsesRequest = serde_json::from_value(serde_json::json!({
            "model": "alias",
            "input": "hello",
            "store": false
        }))
        .unwrap();
        let result = responses_passthrough(req, "gpt-5").unwrap();
        assert_eq!(result.model, "gpt-5");
        assert_eq!(result.extra.get("store"), Some(&Value::Bool(false)));
    }
}
