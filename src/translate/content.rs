//! Message content shared by every dialect.
//!
//! Content is either a plain string or an ordered list of typed blocks. The
//! dialects disagree on block type names (`text` vs `input_text`, `image` vs
//! `input_image`), so a block is kept as an opaque JSON object and only its
//! `type` tag is ever rewritten.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A typed unit of content. Every field other than `type` is carried verbatim.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ContentBlock(pub Map<String, Value>);

/// Which way a block's type tag is being rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockDirection {
    /// Messages/Chat block names into Responses input names.
    ToResponses,
    /// Responses names back into Messages/Chat names.
    FromResponses,
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert("type".to_string(), Value::String("text".to_string()));
        map.insert("text".to_string(), Value::String(text.into()));
        Self(map)
    }

    pub fn block_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Value::as_str)
    }

    pub fn text_value(&self) -> Option<&str> {
        self.0.get("text").and_then(Value::as_str)
    }

    /// Copy of this block with its type tag rewritten for `direction`.
    /// Unknown types pass through unchanged.
    pub fn retagged(&self, direction: BlockDirection) -> Self {
        let renamed = match (direction, self.block_type()) {
            (BlockDirection::ToResponses, Some("text")) => Some("input_text"),
            (BlockDirection::ToResponses, Some("image")) => Some("input_image"),
            (BlockDirection::FromResponses, Some("input_text" | "output_text")) => Some("text"),
            (BlockDirection::FromResponses, Some("input_image")) => Some("image"),
            _ => None,
        };

        let mut block = self.clone();
        if let Some(renamed) = renamed {
            block
                .0
                .insert("type".to_string(), Value::String(renamed.to_string()));
        }
        block
    }
}

impl MessageContent {
    /// Concatenated text of the content: the string itself, or every block
    /// that carries a `text` field.
    pub fn joined_text(&self) -> String {
        match self {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(ContentBlock::text_value)
                .collect::<Vec<_>>()
                .join(""),
        }
    }

    pub fn retagged(&self, direction: BlockDirection) -> Self {
        match self {
            MessageContent::Text(t) => MessageContent::Text(t.clone()),
            MessageContent::Blocks(blocks) => MessageContent::Blocks(
                blocks.iter().map(|b| b.retagged(direction)).collect(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(value: Value) -> ContentBlock {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_retag_preserves_other_fields() {
        let image = block(serde_json::json!({
            "type": "image",
            "source": {"type": "base64", "media_type": "image/png", "data": "AAAA"},
            "cache_control": {"type": "ephemeral"}
        }));

        let out = image.retagged(BlockDirection::ToResponses);
        assert_eq!(out.block_type(), Some("input_image"));
        assert_eq!(out.0["source"]["media_type"], "image/png");
        assert_eq!(out.0["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn test_unknown_block_types_pass_through() {
        let tool_use = block(serde_json::json!({
            "type": "tool_use", "id": "toolu_1", "name": "search", "input": {}
        }));
        assert_eq!(tool_use.retagged(BlockDirection::ToResponses), tool_use);
        assert_eq!(tool_use.retagged(BlockDirection::FromResponses), tool_use);
    }

    #[test]
    fn test_content_deserializes_as_text_or_blocks() {
        let text: MessageContent = serde_json::from_str("\"hi\"").unwrap();
        assert_eq!(text, MessageContent::Text("hi".to_string()));

        let blocks: MessageContent =
            serde_json::from_str(r#"[{"type":"text","text":"a"},{"type":"text","text":"b"}]"#)
                .unwrap();
        assert_eq!(blocks.joined_text(), "ab");
    }
}
