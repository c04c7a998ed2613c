use std::collections::BTreeMap;

use super::chat_types::{
    ChatCompletionRequest, ChatCompletionResponse, ChatError, Choice, ChoiceMessage,
};
use super::messages_types::{
    ErrorResponse, MessagesReply, MessagesRequest, MessagesResponse, ResponseContentBlock, Usage,
};
use super::responses_types::{builtin_tool_for_item, ResponsesResponse};
use super::usage::UsageCounter;

/// Map a Responses `status` to a Chat `finish_reason`.
pub fn map_status_to_finish_reason(status: &str) -> &'static str {
    match status {
        "incomplete" => "length",
        "failed" => "error",
        _ => "stop",
    }
}

/// Map a Responses `status` to a Messages `stop_reason`.
pub fn map_status_to_stop_reason(status: &str) -> &'static str {
    match status {
        "incomplete" => "max_tokens",
        "failed" => "error",
        _ => "end_turn",
    }
}

/// Messages ids carry a `msg_` prefix; the Responses id is reused under it.
/// A missing id gets a fresh uuid.
pub fn message_id(response_id: &str) -> String {
    match response_id.trim_start_matches("resp_") {
        "" => format!("msg_{}", uuid::Uuid::new_v4().simple()),
        suffix => format!("msg_{}", suffix),
    }
}

/// Concatenated text of every assistant `message` item.
pub fn extract_output_text(resp: &ResponsesResponse) -> String {
    resp.output
        .iter()
        .filter(|item| item.item_type == "message" && item.role.as_deref().unwrap_or("assistant") == "assistant")
        .flat_map(|item| item.content.iter())
        .filter(|c| c.content_type == "output_text" || c.content_type == "text")
        .filter_map(|c| c.text.as_deref())
        .collect()
}

/// Built-in tool invocations in a finished response, keyed by tool type.
pub fn builtin_tool_calls(resp: &ResponsesResponse) -> BTreeMap<String, u64> {
    let mut calls = BTreeMap::new();
    for item in &resp.output {
        if let Some(tool) = builtin_tool_for_item(&item.item_type) {
            *calls.entry(tool.to_string()).or_insert(0) += 1;
        }
    }
    calls
}

fn created_at(resp: &ResponsesResponse) -> i64 {
    if resp.created_at > 0 {
        resp.created_at
    } else {
        chrono::Utc::now().timestamp()
    }
}

fn reply_model<'a>(requested: &'a str, resp: &'a ResponsesResponse) -> &'a str {
    if requested.is_empty() {
        &resp.model
    } else {
        requested
    }
}

fn usage_of(resp: &ResponsesResponse) -> UsageCounter {
    let mut usage = resp
        .usage
        .as_ref()
        .map(UsageCounter::from_responses)
        .unwrap_or_default();
    usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
    usage
}

/// Assemble a Chat Completions response from a finished Responses response.
/// A backend error object becomes a Chat response carrying `error`.
pub fn responses_to_chat(
    resp: &ResponsesResponse,
    original: &ChatCompletionRequest,
) -> ChatCompletionResponse {
    let id = if resp.id.is_empty() {
        format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
    } else {
        resp.id.clone()
    };
    let model = reply_model(&original.model, resp).to_string();

    if let Some(err) = &resp.error {
        return ChatCompletionResponse {
            id,
            object: "chat.completion".to_string(),
            created: created_at(resp),
            model,
            choices: Vec::new(),
            usage: None,
            error: Some(ChatError {
                message: err.message.clone(),
                error_type: err.kind(),
                code: err.code.clone(),
            }),
        };
    }

    ChatCompletionResponse {
        id,
        object: "chat.completion".to_string(),
        created: created_at(resp),
        model,
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: Some(extract_output_text(resp)),
            },
            finish_reason: Some(map_status_to_finish_reason(&resp.status).to_string()),
        }],
        usage: Some(usage_of(resp).to_chat()),
        error: None,
    }
}

/// Assemble a Messages response from a finished Responses response.
/// A backend error object becomes a Messages error envelope.
pub fn responses_to_messages(resp: &ResponsesResponse, original: &MessagesRequest) -> MessagesReply {
    if let Some(err) = &resp.error {
        return MessagesReply::Error(ErrorResponse::from_kind(&err.kind(), err.message.clone()));
    }

    let text = extract_output_text(resp);
    // Callers expect at least one content block
    let content = vec![ResponseContentBlock::Text { text }];

    let usage = usage_of(resp);
    MessagesReply::Message(MessagesResponse {
        id: message_id(&resp.id),
        response_type: "message".to_string(),
        role: "assistant".to_string(),
        content,
        model: reply_model(&original.model, resp).to_string(),
        stop_reason: Some(map_status_to_stop_reason(&resp.status).to_string()),
        stop_sequence: None,
        usage: Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cache_creation_input_tokens: None,
            cache_read_input_tokens: (usage.cached_tokens > 0).then_some(usage.cached_tokens),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_response(value: serde_json::Value) -> ResponsesResponse {
        serde_json::from_value(value).unwrap()
    }

    fn completed(status: &str) -> ResponsesResponse {
        make_response(serde_json::json!({
            "id": "resp_abc",
            "object": "response",
            "created_at": 1_700_000_000,
            "model": "gpt-5-2025",
            "status": status,
            "output": [
                {"type": "reasoning", "id": "rs_1", "summary": []},
                {"type": "message", "id": "msg_1", "role": "assistant", "status": "completed",
                 "content": [
                    {"type": "output_text", "text": "Hello", "annotations": []},
                    {"type": "output_text", "text": " world", "annotations": []}
                 ]}
            ],
            "usage": {"input_tokens": 9, "output_tokens": 2, "total_tokens": 11,
                      "input_tokens_details": {"cached_tokens": 3}}
        }))
    }

    fn chat_request() -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "my-gpt".to_string(),
            ..Default::default()
        }
    }

    fn messages_request() -> MessagesRequest {
        MessagesRequest {
            model: "claude-sonnet-4".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_simple_text_response_to_chat() {
        let result = responses_to_chat(&completed("completed"), &chat_request());
        assert_eq!(result.id, "resp_abc");
        assert_eq!(result.object, "chat.completion");
        assert_eq!(result.created, 1_700_000_000);
        assert_eq!(result.model, "my-gpt");
        assert_eq!(result.choices.len(), 1);
        assert_eq!(result.choices[0].message.content.as_deref(), Some("Hello world"));
        assert_eq!(result.choices[0].finish_reason.as_deref(), Some("stop"));

        let usage = result.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 9);
        assert_eq!(usage.completion_tokens, 2);
        assert_eq!(usage.total_tokens, 11);
        assert_eq!(usage.prompt_tokens_details.unwrap().cached_tokens, 3);
    }

    #[test]
    fn test_simple_text_response_to_messages() {
        let MessagesReply::Message(msg) = responses_to_messages(&completed("completed"), &messages_request())
        else {
            panic!("expected a message");
        };
        assert_eq!(msg.id, "msg_abc");
        assert_eq!(msg.model, "claude-sonnet-4");
        assert_eq!(
            msg.content,
            vec![ResponseContentBlock::Text {
                text: "Hello world".to_string()
            }]
        );
        assert_eq!(msg.stop_reason.as_deref(), Some("end_turn"));
        assert_eq!(msg.usage.input_tokens, 9);
        assert_eq!(msg.usage.output_tokens, 2);
        assert_eq!(msg.usage.cache_read_input_tokens, Some(3));
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            ("completed", "stop", "end_turn"),
            ("incomplete", "length", "max_tokens"),
            ("failed", "error", "error"),
            ("cancelled", "stop", "end_turn"),
            ("in_progress", "stop", "end_turn"),
        ];
        for (status, finish, stop) in cases {
            assert_eq!(map_status_to_finish_reason(status), finish, "{status}");
            assert_eq!(map_status_to_stop_reason(status), stop, "{status}");
        }
    }

    #[test]
    fn test_incomplete_response_maps_to_length_limits() {
        let chat = responses_to_chat(&completed("incomplete"), &chat_request());
        assert_eq!(chat.choices[0].finish_reason.as_deref(), Some("length"));

        let MessagesReply::Message(msg) = responses_to_messages(&completed("incomplete"), &messages_request())
        else {
            panic!("expected a message");
        };
        assert_eq!(msg.stop_reason.as_deref(), Some("max_tokens"));
    }

    #[test]
    fn test_error_object_becomes_error_envelope() {
        let resp = make_response(serde_json::json!({
            "id": "resp_err",
            "status": "failed",
            "error": {"code": "rate_limit_exceeded", "message": "Too many requests"}
        }));

        let chat = responses_to_chat(&resp, &chat_request());
        assert!(chat.choices.is_empty());
        let err = chat.error.unwrap();
        assert_eq!(err.error_type, "rate_limit_exceeded");
        assert_eq!(err.message, "Too many requests");

        let MessagesReply::Error(envelope) = responses_to_messages(&resp, &messages_request()) else {
            panic!("expected an error envelope");
        };
        let wire = serde_json::to_value(&envelope).unwrap();
        assert_eq!(wire["type"], "error");
        assert_eq!(wire["error"]["type"], "rate_limit_error");
        assert_eq!(wire["error"]["message"], "Too many requests");
    }

    #[test]
    fn test_empty_output_still_has_one_block() {
        let resp = make_response(serde_json::json!({"id": "resp_e", "status": "completed", "output": []}));
        let MessagesReply::Message(msg) = responses_to_messages(&resp, &messages_request()) else {
            panic!("expected a message");
        };
        assert_eq!(msg.content.len(), 1);
        assert_eq!(msg.usage.input_tokens, 0);
    }

    #[test]
    fn test_missing_response_id_gets_generated_message_id() {
        let resp = make_response(serde_json::json!({"status": "completed", "output": []}));
        let MessagesReply::Message(first) = responses_to_messages(&resp, &messages_request()) else {
            panic!("expected a message");
        };
        let MessagesReply::Message(second) = responses_to_messages(&resp, &messages_request()) else {
            panic!("expected a message");
        };
        assert!(first.id.starts_with("msg_"));
        assert!(first.id.len() > "msg_".len());
        assert_ne!(first.id, second.id);
        assert_eq!(message_id("resp_abc"), "msg_abc");
    }

    #[test]
    fn test_total_tokens_is_recomputed() {
        let resp = make_response(serde_json::json!({
            "id": "resp_u",
            "status": "completed",
            "output": [],
            "usage": {"input_tokens": 4, "output_tokens": 3, "total_tokens": 99}
        }));
        let usage = responses_to_chat(&resp, &chat_request()).usage.unwrap();
        assert_eq!(usage.total_tokens, 7);
    }

    #[test]
    fn test_builtin_tool_calls_are_counted() {
        let resp = make_response(serde_json::json!({
            "id": "resp_t",
            "status": "completed",
            "output": [
                {"type": "web_search_call", "id": "ws_1", "status": "completed"},
                {"type": "web_search_call", "id": "ws_2", "status": "completed"},
                {"type": "function_call", "id": "fc_1"},
                {"type": "message", "role": "assistant", "content": [{"type": "output_text", "text": "found it"}]}
            ]
        }));
        let calls = builtin_tool_calls(&resp);
        assert_eq!(calls.get("web_search_preview"), Some(&2));
        assert_eq!(calls.len(), 1);
        assert_eq!(extract_output_text(&resp), "found it");
    }
}
