//! State machine for translating a Responses event stream into Messages or
//! Chat Completions stream events.
//!
//! The [`ResponsesStreamMapper`] takes backend `data:` frames one at a time
//! and emits the caller's events for each, in order, without buffering.
//! The caller's dialect comes from the [`ConversionContext`] it owns:
//!
//! * Messages starts eagerly: `message_start` and `content_block_start` go
//!   out with the first event that carries a response id.
//! * Chat starts lazily: the role chunk goes out when the assistant output
//!   item is added, or with the first text delta if that comes first. The
//!   stream is closed with `data: [DONE]`.

use std::sync::Arc;

use super::chat_types::{ChatCompletionChunk, ChunkChoice, ChunkDelta};
use super::context::{ConversionContext, StreamPhase, CONTENT_BLOCK_INDEX};
use super::messages_types::{
    Delta, DeltaUsage, MessageDeltaBody, MessagesResponse, ResponseContentBlock, StreamEvent, Usage,
};
use super::response::{map_status_to_finish_reason, map_status_to_stop_reason, message_id};
use super::responses_types::{StreamEvent as ResponsesEvent, StreamEventKind};
use super::usage::{reconcile, TokenCounter, UsageCounter};
use super::Dialect;

/// One event written to the caller.
#[derive(Debug, Clone)]
pub enum TargetEvent {
    Messages(StreamEvent),
    Chat(ChatCompletionChunk),
    /// The `data: [DONE]` sentinel that ends a Chat stream.
    ChatDone,
}

/// A single server-sent event, ready to be framed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: Option<String>,
    pub data: String,
}

impl SseEvent {
    /// Wire form: `event: <name>\ndata: <json>\n\n`, or just the `data:`
    /// line for unnamed events.
    pub fn encode(&self) -> String {
        match &self.event {
            Some(name) => format!("event: {}\ndata: {}\n\n", name, self.data),
            None => format!("data: {}\n\n", self.data),
        }
    }
}

impl TargetEvent {
    pub fn to_sse(&self) -> serde_json::Result<SseEvent> {
        Ok(match self {
            TargetEvent::Messages(event) => SseEvent {
                event: Some(event.event_name().to_string()),
                data: serde_json::to_string(event)?,
            },
            TargetEvent::Chat(chunk) => SseEvent {
                event: None,
                data: serde_json::to_string(chunk)?,
            },
            TargetEvent::ChatDone => SseEvent {
                event: None,
                data: "[DONE]".to_string(),
            },
        })
    }
}

/// Translates one backend Responses stream for one caller.
///
/// Usage:
///   let mut mapper = ResponsesStreamMapper::new(ctx, counter);
///   for frame in backend_frames {
///       let events = mapper.process_frame(&frame);
///       // send each event as SSE
///   }
///   let usage = mapper.finish();
pub struct ResponsesStreamMapper {
    ctx: ConversionContext,
    counter: Arc<dyn TokenCounter>,
    fallback_id: String,
    created: i64,
}

impl std::fmt::Debug for ResponsesStreamMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponsesStreamMapper")
            .field("ctx", &self.ctx)
            .field("created", &self.created)
            .finish_non_exhaustive()
    }
}

impl ResponsesStreamMapper {
    pub fn new(ctx: ConversionContext, counter: Arc<dyn TokenCounter>) -> Self {
        Self {
            ctx,
            counter,
            fallback_id: format!("resp_{}", uuid::Uuid::new_v4().simple()),
            created: chrono::Utc::now().timestamp(),
        }
    }

    pub fn context(&self) -> &ConversionContext {
        &self.ctx
    }

    pub fn is_done(&self) -> bool {
        self.ctx.phase == StreamPhase::Done
    }

    /// Process the payload of one backend `data:` frame. Frames that do not
    /// decode are counted and skipped.
    pub fn process_frame(&mut self, data: &str) -> Vec<TargetEvent> {
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            return Vec::new();
        }
        match ResponsesEvent::parse(data) {
            Ok(event) => self.process_event(&event),
            Err(e) => {
                self.skip_malformed(&e.to_string());
                Vec::new()
            }
        }
    }

    /// Count a frame that could not be decoded.
    pub fn skip_malformed(&mut self, error: &str) {
        self.ctx.malformed_frames += 1;
        tracing::warn!(
            error,
            malformed_frames = self.ctx.malformed_frames,
            "skipping malformed stream frame"
        );
    }

    pub fn process_event(&mut self, event: &ResponsesEvent) -> Vec<TargetEvent> {
        let mut events = Vec::new();

        if let Some(id) = event.response_id() {
            if self.ctx.response_id.is_none() {
                self.ctx.response_id = Some(id.to_string());
            }
            if self.target() == Dialect::Messages && !self.ctx.message_start_sent && !self.is_done() {
                self.start(&mut events);
            }
        }

        match &event.kind {
            StreamEventKind::Created | StreamEventKind::InProgress => {}
            StreamEventKind::OutputItemAdded => {
                let is_assistant = event
                    .item
                    .as_ref()
                    .is_some_and(|item| item.item_type == "message" && item.role.as_deref() == Some("assistant"));
                if is_assistant && self.target() == Dialect::Chat && !self.is_done() {
                    self.start(&mut events);
                }
            }
            StreamEventKind::OutputTextDelta => {
                if let Some(text) = event.delta.as_deref().filter(|t| !t.is_empty()) {
                    self.text_delta(text, &mut events);
                }
            }
            StreamEventKind::OutputItemDone => {
                if let Some(item) = &event.item {
                    if !self.ctx.record_tool_call(&item.item_type) && item.item_type.ends_with("_call") {
                        tracing::debug!(item_type = %item.item_type, "ignoring non-billable tool call item");
                    }
                }
            }
            StreamEventKind::Done | StreamEventKind::Completed => {
                if let Some(usage) = event.response.as_ref().and_then(|r| r.usage.as_ref()) {
                    self.ctx.usage.absorb(usage);
                }
                if !self.is_done() {
                    let status = event
                        .response
                        .as_ref()
                        .map(|r| r.status.as_str())
                        .unwrap_or("completed");
                    self.close(status, &mut events);
                }
            }
            StreamEventKind::Unhandled(event_type) => {
                tracing::trace!(event_type = %event_type, "ignoring stream event");
            }
        }

        events
    }

    /// Mark the stream finished and return its reconciled usage. A stream
    /// that ended without a terminal event gets no closing events.
    pub fn finish(&mut self) -> UsageCounter {
        if !self.is_done() {
            tracing::debug!(
                response_id = ?self.ctx.response_id,
                "stream ended without a terminal event"
            );
            self.ctx.phase = StreamPhase::Done;
        }
        reconcile(&self.ctx, self.counter.as_ref())
    }

    fn target(&self) -> Dialect {
        self.ctx.converted_from()
    }

    fn response_id(&self) -> &str {
        self.ctx.response_id.as_deref().unwrap_or(&self.fallback_id)
    }

    fn start(&mut self, events: &mut Vec<TargetEvent>) {
        if self.ctx.message_start_sent {
            return;
        }
        match self.target() {
            Dialect::Messages => {
                events.push(TargetEvent::Messages(StreamEvent::MessageStart {
                    message: MessagesResponse {
                        id: message_id(self.response_id()),
                        response_type: "message".to_string(),
                        role: "assistant".to_string(),
                        content: Vec::new(),
                        model: self.ctx.upstream_model.clone(),
                        stop_reason: None,
                        stop_sequence: None,
                        usage: Usage::default(),
                    },
                }));
                events.push(TargetEvent::Messages(StreamEvent::ContentBlockStart {
                    index: CONTENT_BLOCK_INDEX,
                    content_block: ResponseContentBlock::Text {
                        text: String::new(),
                    },
                }));
            }
            Dialect::Chat | Dialect::Responses => {
                events.push(TargetEvent::Chat(self.chunk(
                    ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: Some(String::new()),
                    },
                    None,
                )));
            }
        }
        self.ctx.message_start_sent = true;
        self.ctx.phase = StreamPhase::Started;
    }

    fn text_delta(&mut self, text: &str, events: &mut Vec<TargetEvent>) {
        if self.is_done() {
            return;
        }
        self.start(events);
        self.ctx.output_text.push_str(text);
        self.ctx.phase = StreamPhase::Streaming;

        events.push(match self.target() {
            Dialect::Messages => TargetEvent::Messages(StreamEvent::ContentBlockDelta {
                index: CONTENT_BLOCK_INDEX,
                delta: Delta::TextDelta {
                    text: text.to_string(),
                },
            }),
            Dialect::Chat | Dialect::Responses => TargetEvent::Chat(self.chunk(
                ChunkDelta {
                    role: None,
                    content: Some(text.to_string()),
                },
                None,
            )),
        });
    }

    fn close(&mut self, status: &str, events: &mut Vec<TargetEvent>) {
        self.start(events);
        let usage = reconcile(&self.ctx, self.counter.as_ref());

        match self.target() {
            Dialect::Messages => {
                events.push(TargetEvent::Messages(StreamEvent::ContentBlockStop {
                    index: CONTENT_BLOCK_INDEX,
                }));
                events.push(TargetEvent::Messages(StreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(map_status_to_stop_reason(status).to_string()),
                        stop_sequence: None,
                    },
                    usage: DeltaUsage {
                        output_tokens: usage.completion_tokens,
                    },
                }));
                events.push(TargetEvent::Messages(StreamEvent::MessageStop));
            }
            Dialect::Chat | Dialect::Responses => {
                let mut chunk = self.chunk(
                    ChunkDelta::default(),
                    Some(map_status_to_finish_reason(status)),
                );
                chunk.usage = Some(usage.to_chat());
                events.push(TargetEvent::Chat(chunk));
                events.push(TargetEvent::ChatDone);
            }
        }
        self.ctx.phase = StreamPhase::Done;
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<&str>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: format!("chatcmpl-{}", self.response_id().trim_start_matches("resp_")),
            object: "chat.completion.chunk".to_string(),
            created: self.created,
            model: self.ctx.upstream_model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason: finish_reason.map(String::from),
            }],
            usage: None,
        }
    }
}
