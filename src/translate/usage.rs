//! Token accounting for translated exchanges.
//!
//! Backend usage is trusted when it is there. When a stream ends without it,
//! completion tokens are counted locally over the accumulated text.

use serde::{Deserialize, Serialize};
use tiktoken_rs::{tokenizer, CoreBPE};

use super::chat_types::{ChatUsage, PromptTokensDetails};
use super::content::MessageContent;
use super::context::ConversionContext;
use super::responses_types::{ResponsesInput, ResponsesRequest, ResponsesUsage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounter {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cached_tokens: u64,
}

impl UsageCounter {
    pub fn from_responses(usage: &ResponsesUsage) -> Self {
        Self {
            prompt_tokens: usage.input_tokens,
            completion_tokens: usage.output_tokens,
            total_tokens: usage.total_tokens,
            cached_tokens: usage
                .input_tokens_details
                .as_ref()
                .map_or(0, |d| d.cached_tokens),
        }
    }

    /// Fold in a backend usage report. Zero fields never overwrite a value
    /// from an earlier report.
    pub fn absorb(&mut self, usage: &ResponsesUsage) {
        if usage.input_tokens != 0 {
            self.prompt_tokens = usage.input_tokens;
        }
        if usage.output_tokens != 0 {
            self.completion_tokens = usage.output_tokens;
        }
        if usage.total_tokens != 0 {
            self.total_tokens = usage.total_tokens;
        }
        if let Some(cached) = usage.input_tokens_details.as_ref().map(|d| d.cached_tokens) {
            if cached != 0 {
                self.cached_tokens = cached;
            }
        }
    }

    pub fn to_chat(&self) -> ChatUsage {
        ChatUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: self.total_tokens,
            prompt_tokens_details: (self.cached_tokens > 0).then_some(PromptTokensDetails {
                cached_tokens: self.cached_tokens,
            }),
        }
    }
}

/// Counts tokens for text produced or consumed by a model.
pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, text: &str, model: &str) -> u64;
}

/// [`TokenCounter`] backed by the tiktoken BPE matching the model, falling
/// back to `cl100k_base` for models tiktoken does not know.
#[derive(Debug, Clone, Copy, Default)]
pub struct TiktokenCounter;

fn bpe_for_model(model: &str) -> &'static CoreBPE {
    match tokenizer::get_tokenizer(model) {
        Some(tokenizer::Tokenizer::O200kBase) => tiktoken_rs::o200k_base_singleton(),
        Some(tokenizer::Tokenizer::O200kHarmony) => tiktoken_rs::o200k_harmony_singleton(),
        Some(tokenizer::Tokenizer::P50kBase) => tiktoken_rs::p50k_base_singleton(),
        Some(tokenizer::Tokenizer::P50kEdit) => tiktoken_rs::p50k_edit_singleton(),
        Some(tokenizer::Tokenizer::R50kBase | tokenizer::Tokenizer::Gpt2) => {
            tiktoken_rs::r50k_base_singleton()
        }
        _ => tiktoken_rs::cl100k_base_singleton(),
    }
}

impl TokenCounter for TiktokenCounter {
    fn count_tokens(&self, text: &str, model: &str) -> u64 {
        if text.is_empty() {
            return 0;
        }
        bpe_for_model(model).encode_with_special_tokens(text).len() as u64
    }
}

/// Final usage for a translated exchange.
///
/// Non-zero backend completion tokens win; otherwise the accumulated output
/// text is counted. A missing prompt count falls back to the estimate taken
/// from the request. The total is always recomputed.
pub fn reconcile(ctx: &ConversionContext, counter: &dyn TokenCounter) -> UsageCounter {
    let mut usage = ctx.usage;

    if usage.completion_tokens == 0 && !ctx.output_text.is_empty() {
        usage.completion_tokens = counter.count_tokens(&ctx.output_text, &ctx.upstream_model);
    }

    if usage.prompt_tokens == 0 && usage.completion_tokens != 0 {
        usage.prompt_tokens = ctx.prompt_tokens;
    }

    usage.total_tokens = usage.prompt_tokens + usage.completion_tokens;
    usage
}

/// Estimate the prompt size of a backend request from its instructions and
/// the text of its input items.
pub fn estimate_prompt_tokens(req: &ResponsesRequest, counter: &dyn TokenCounter) -> u64 {
    let mut parts: Vec<String> = req.instructions.iter().cloned().collect();

    match &req.input {
        Some(ResponsesInput::Text(t)) => parts.push(t.clone()),
        Some(ResponsesInput::Items(items)) => {
            parts.extend(items.iter().filter_map(|i| i.content.as_ref()).map(MessageContent::joined_text));
        }
        None => {}
    }

    counter.count_tokens(&parts.join("\n"), &req.model)
}
