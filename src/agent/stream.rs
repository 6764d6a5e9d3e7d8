//! Assembles streamed events into a complete assistant message

use std::collections::BTreeMap;

use serde_json::Value;

use crate::llm::{
    ContentBlock, ContentBlockStart, ContentDelta, StopReason, StreamEvent, Usage,
};

/// What a delta event contributed, for forwarding to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum StreamDelta {
    Text(String),
    Thinking(String),
}

/// A fully received assistant response
#[derive(Debug, Clone, Default)]
pub struct StreamedResponse {
    pub message_id: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: Option<StopReason>,
    pub usage: Usage,
}

impl StreamedResponse {
    /// `(id, name, input)` of every tool use, in request order
    pub fn tool_uses(&self) -> Vec<(String, String, Value)> {
        self.content
            .iter()
            .filter_map(|block| block.as_tool_use())
            .map(|(id, name, input)| (id.to_string(), name.to_string(), input.clone()))
            .collect()
    }
}

enum PartialBlock {
    Text(String),
    Thinking { thinking: String, signature: String },
    RedactedThinking(String),
    ToolUse { id: String, name: String, json: String },
}

impl PartialBlock {
    fn finish(self) -> Option<ContentBlock> {
        match self {
            PartialBlock::Text(text) if text.is_empty() => None,
            PartialBlock::Text(text) => Some(ContentBlock::text(text)),
            PartialBlock::Thinking { thinking, signature } => {
                Some(ContentBlock::Thinking { thinking, signature })
            }
            PartialBlock::RedactedThinking(data) => Some(ContentBlock::RedactedThinking { data }),
            PartialBlock::ToolUse { id, name, json } => {
                let input = if json.trim().is_empty() {
                    Value::Object(Default::default())
                } else {
                    serde_json::from_str(&json).unwrap_or_else(|e| {
                        tracing::warn!(tool = %name, error = %e, "Tool input is not valid JSON");
                        Value::Object(Default::default())
                    })
                };
                Some(ContentBlock::ToolUse { id, name, input })
            }
        }
    }
}

/// Accumulates stream events by block index
#[derive(Default)]
pub struct StreamAccumulator {
    message_id: String,
    open: BTreeMap<usize, PartialBlock>,
    done: BTreeMap<usize, ContentBlock>,
    stop_reason: Option<StopReason>,
    usage: Usage,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one event, returning any text to forward
    pub fn apply(&mut self, event: StreamEvent) -> Option<StreamDelta> {
        match event {
            StreamEvent::MessageStart(start) => {
                self.message_id = start.message.id;
                self.usage = start.message.usage;
            }
            StreamEvent::ContentBlockStart(start) => {
                let block = match start.content_block {
                    ContentBlockStart::Text { text } => PartialBlock::Text(text),
                    ContentBlockStart::Thinking { thinking } => PartialBlock::Thinking {
                        thinking,
                        signature: String::new(),
                    },
                    ContentBlockStart::RedactedThinking { data } => {
                        PartialBlock::RedactedThinking(data)
                    }
                    ContentBlockStart::ToolUse { id, name } => PartialBlock::ToolUse {
                        id,
                        name,
                        json: String::new(),
                    },
                };
                self.open.insert(start.index, block);
            }
            StreamEvent::ContentBlockDelta(delta) => {
                let Some(block) = self.open.get_mut(&delta.index) else {
                    tracing::warn!(index = delta.index, "Delta for unknown content block");
                    return None;
                };
                match (block, delta.delta) {
                    (PartialBlock::Text(text), ContentDelta::TextDelta { text: more }) => {
                        text.push_str(&more);
                        return Some(StreamDelta::Text(more));
                    }
                    (
                        PartialBlock::Thinking { thinking, .. },
                        ContentDelta::ThinkingDelta { thinking: more },
                    ) => {
                        thinking.push_str(&more);
                        return Some(StreamDelta::Thinking(more));
                    }
                    (
                        PartialBlock::Thinking { signature, .. },
                        ContentDelta::SignatureDelta { signature: more },
                    ) => signature.push_str(&more),
                    (
                        PartialBlock::ToolUse { json, .. },
                        ContentDelta::InputJsonDelta { partial_json },
                    ) => json.push_str(&partial_json),
                    (_, other) => {
                        tracing::warn!(index = delta.index, ?other, "Mismatched content delta");
                    }
                }
            }
            StreamEvent::ContentBlockStop(stop) => {
                if let Some(block) = self.open.remove(&stop.index).and_then(PartialBlock::finish) {
                    self.done.insert(stop.index, block);
                }
            }
            StreamEvent::MessageDelta(delta) => {
                self.stop_reason = delta.delta.stop_reason;
                self.usage.output_tokens = delta.usage.output_tokens;
            }
            StreamEvent::MessageStop | StreamEvent::Ping => {}
            StreamEvent::Error(details) => {
                tracing::error!(error_type = %details.error_type, message = %details.message, "Stream error event");
            }
        }
        None
    }

    /// Complete response; blocks left open are closed as they are
    pub fn finish(mut self) -> StreamedResponse {
        for (index, block) in std::mem::take(&mut self.open) {
            if let Some(block) = block.finish() {
                self.done.insert(index, block);
            }
        }
        StreamedResponse {
            message_id: self.message_id,
            content: self.done.into_values().collect(),
            stop_reason: self.stop_reason,
            usage: self.usage,
        }
    }
}
