//! Demonstrate the translation layer without a server.
//!
//! Usage:
//!   `cargo run --example translate_only`

use responses_bridge::translate::content::{MessageContent, Role};
use responses_bridge::translate::context::{ConversionContext, OriginalRequest};
use responses_bridge::translate::messages_types::{Message, MessagesRequest};
use responses_bridge::translate::request::messages_to_responses;
use responses_bridge::translate::response::responses_to_messages;
use responses_bridge::translate::responses_types::ResponsesResponse;
use responses_bridge::translate::streaming::ResponsesStreamMapper;
use responses_bridge::translate::usage::{estimate_prompt_tokens, TiktokenCounter};
use std::sync::Arc;

fn main() -> anyhow::Result<()> {
    // A Messages request, as a Messages client would send it
    let request = MessagesRequest {
        model: "claude-sonnet-4".to_string(),
        max_tokens: Some(1024),
        messages: vec![
            Message::new(Role::User, "What is the capital of France?"),
            Message::new(Role::Assistant, "The capital of France is Paris."),
            Message::new(Role::User, "And Germany?"),
        ],
        system: Some(MessageContent::Text(
            "You are a geography expert. Be concise.".to_string(),
        )),
        stream: Some(true),
        temperature: Some(0.7),
        ..Default::default()
    };

    let translated = messages_to_responses(&request, "gpt-5")?;

    println!("=== Translated Request (Responses dialect) ===");
    println!("{}", serde_json::to_string_pretty(&translated)?);

    // A backend reply, assembled back into a Messages response
    let backend_reply: ResponsesResponse = serde_json::from_str(
        r#"{
            "id": "resp_demo",
            "object": "response",
            "model": "gpt-5",
            "status": "completed",
            "output": [{
                "type": "message",
                "role": "assistant",
                "content": [{"type": "output_text", "text": "The capital of Germany is Berlin."}]
            }],
            "usage": {"input_tokens": 42, "output_tokens": 8, "total_tokens": 50}
        }"#,
    )?;

    println!();
    println!("=== Assembled Response (Messages dialect) ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&responses_to_messages(&backend_reply, &request))?
    );

    // The same reply, streamed
    println!();
    println!("=== Streaming Translation Demo ===");

    let counter = Arc::new(TiktokenCounter);
    let prompt_tokens = estimate_prompt_tokens(&translated, counter.as_ref());
    let ctx = ConversionContext::new(OriginalRequest::Messages(request), "gpt-5", prompt_tokens);
    let mut mapper = ResponsesStreamMapper::new(ctx, counter);

    let frames = [
        r#"{"type":"response.created","response":{"id":"resp_demo","status":"in_progress"}}"#,
        r#"{"type":"response.output_text.delta","delta":"The capital"}"#,
        r#"{"type":"response.output_text.delta","delta":" is Berlin."}"#,
        r#"{"type":"response.completed","response":{"id":"resp_demo","status":"completed"}}"#,
    ];

    for (i, frame) in frames.iter().enumerate() {
        for event in mapper.process_frame(frame) {
            print!("  frame {} -> {}", i, event.to_sse()?.encode());
        }
    }

    // No usage from the backend: the completion is counted locally
    let usage = mapper.finish();
    println!(
        "Reconciled usage: prompt={} completion={} total={}",
        usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
    );

    println!();
    println!("Done! The translation layer works without any network calls.");
    Ok(())
}
