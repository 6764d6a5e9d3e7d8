//! Scripted provider for tests

use anyhow::Result;
use futures::stream;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::error::ApiRequestError;
use super::provider::{EventStream, LlmProvider};
use super::types::*;

/// One scripted model reply
pub enum ScriptedReply {
    Blocks { blocks: Vec<ContentBlock>, usage: Usage },
    Error(ApiRequestError),
    /// A stream that never yields
    Hang,
}

/// A request the provider received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
}

#[derive(Default)]
struct Script {
    replies: VecDeque<ScriptedReply>,
    text_replies: VecDeque<String>,
    requests: Vec<RecordedRequest>,
}

/// Provider that replays queued replies in order
///
/// Variants share the same script so a fallback swap keeps consuming it.
#[derive(Clone)]
pub struct ScriptedProvider {
    model: String,
    script: Arc<Mutex<Script>>,
}

impl ScriptedProvider {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            script: Arc::new(Mutex::new(Script::default())),
        }
    }

    pub fn push_blocks(&self, blocks: Vec<ContentBlock>) -> &Self {
        self.push_blocks_with_usage(
            blocks,
            Usage {
                input_tokens: 10,
                output_tokens: 5,
                ..Default::default()
            },
        )
    }

    pub fn push_blocks_with_usage(&self, blocks: Vec<ContentBlock>, usage: Usage) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(ScriptedReply::Blocks { blocks, usage });
        self
    }

    pub fn push_text(&self, text: &str) -> &Self {
        self.push_blocks(vec![ContentBlock::text(text)])
    }

    pub fn push_error(&self, err: ApiRequestError) -> &Self {
        self.script
            .lock()
            .unwrap()
            .replies
            .push_back(ScriptedReply::Error(err));
        self
    }

    pub fn push_hang(&self) -> &Self {
        self.script.lock().unwrap().replies.push_back(ScriptedReply::Hang);
        self
    }

    /// Queue a reply for `send_message`
    pub fn push_message_reply(&self, text: &str) -> &Self {
        self.script
            .lock()
            .unwrap()
            .text_replies
            .push_back(text.to_string());
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.script.lock().unwrap().requests.clone()
    }

    fn record(&self, messages: &[Message], tools: &[ToolDefinition]) -> usize {
        let mut script = self.script.lock().unwrap();
        script.requests.push(RecordedRequest {
            model: self.model.clone(),
            messages: messages.to_vec(),
            tools: tools.iter().map(|t| t.name.clone()).collect(),
        });
        script.requests.len()
    }

    fn next_reply(&self) -> Result<ScriptedReply> {
        self.script
            .lock()
            .unwrap()
            .replies
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script exhausted"))
    }
}

fn events_for(id: String, model: String, blocks: Vec<ContentBlock>, usage: Usage) -> Vec<StreamEvent> {
    let mut events = vec![StreamEvent::MessageStart(MessageStartEvent {
        message: MessageStartData {
            id,
            model,
            usage: usage.clone(),
        },
    })];
    let mut stop_reason = StopReason::EndTurn;

    for (index, block) in blocks.into_iter().enumerate() {
        match block {
            ContentBlock::Text { text, .. } => {
                events.push(StreamEvent::ContentBlockStart(ContentBlockStartEvent {
                    index,
                    content_block: ContentBlockStart::Text {
                        text: String::new(),
                    },
                }));
                events.push(StreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                    index,
                    delta: ContentDelta::TextDelta { text },
                }));
            }
            ContentBlock::ToolUse { id, name, input } => {
                stop_reason = StopReason::ToolUse;
                events.push(StreamEvent::ContentBlockStart(ContentBlockStartEvent {
                    index,
                    content_block: ContentBlockStart::ToolUse { id, name },
                }));
                events.push(StreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                    index,
                    delta: ContentDelta::InputJsonDelta {
                        partial_json: input.to_string(),
                    },
                }));
            }
            ContentBlock::Thinking {
                thinking,
                signature,
            } => {
                events.push(StreamEvent::ContentBlockStart(ContentBlockStartEvent {
                    index,
                    content_block: ContentBlockStart::Thinking {
                        thinking: String::new(),
                    },
                }));
                events.push(StreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                    index,
                    delta: ContentDelta::ThinkingDelta { thinking },
                }));
                events.push(StreamEvent::ContentBlockDelta(ContentBlockDeltaEvent {
                    index,
                    delta: ContentDelta::SignatureDelta { signature },
                }));
            }
            other => panic!("unsupported scripted block: {:?}", other),
        }
        events.push(StreamEvent::ContentBlockStop(ContentBlockStopEvent { index }));
    }

    events.push(StreamEvent::MessageDelta(MessageDeltaEvent {
        delta: MessageDeltaData {
            stop_reason: Some(stop_reason),
            stop_sequence: None,
        },
        usage: DeltaUsage {
            output_tokens: usage.output_tokens,
        },
    }));
    events.push(StreamEvent::MessageStop);
    events
}

#[async_trait::async_trait]
impl LlmProvider for ScriptedProvider {
    async fn send_message(
        &self,
        user_message: &str,
        conversation_history: &[Message],
        _system_prompt: Option<&str>,
    ) -> Result<String> {
        let mut messages = conversation_history.to_vec();
        messages.push(Message::user(user_message));
        self.record(&messages, &[]);
        self.script
            .lock()
            .unwrap()
            .text_replies
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted message reply"))
    }

    async fn send_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        _system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        _thinking: Option<ThinkingConfig>,
    ) -> Result<MessageResponse> {
        let n = self.record(&messages, &tools);
        match self.next_reply()? {
            ScriptedReply::Blocks { blocks, usage } => Ok(MessageResponse {
                id: format!("msg_{}", n),
                response_type: "message".into(),
                role: "assistant".into(),
                content: blocks,
                model: self.model.clone(),
                stop_reason: Some(StopReason::EndTurn),
                stop_sequence: None,
                usage,
            }),
            ScriptedReply::Error(err) => Err(anyhow::Error::new(err)),
            ScriptedReply::Hang => std::future::pending().await,
        }
    }

    async fn stream_with_tools_and_system(
        &self,
        messages: Vec<Message>,
        _system: Option<SystemPrompt>,
        tools: Vec<ToolDefinition>,
        _thinking: Option<ThinkingConfig>,
    ) -> Result<EventStream> {
        let n = self.record(&messages, &tools);
        match self.next_reply()? {
            ScriptedReply::Blocks { blocks, usage } => {
                let events = events_for(format!("msg_{}", n), self.model.clone(), blocks, usage);
                Ok(Box::pin(stream::iter(events.into_iter().map(Ok))))
            }
            ScriptedReply::Error(err) => Err(anyhow::Error::new(err)),
            ScriptedReply::Hang => Ok(Box::pin(stream::pending())),
        }
    }

    fn model(&self) -> String {
        self.model.clone()
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn create_variant(&self, model: &str, _max_tokens: u32) -> Arc<dyn LlmProvider> {
        Arc::new(Self {
            model: model.to_string(),
            script: self.script.clone(),
        })
    }
}
