//! SSE stream creation and chunk state machine for OpenAI-compatible
//! chat completions.
//!
//! The wire protocol sends one `chat.completion.chunk` JSON object per
//! `data:` line and terminates with `data: [DONE]`. Text arrives as deltas
//! and is re-emitted as cumulative [`StreamEvent::Update`] snapshots.
//!
//! Tool calls arrive as fragments keyed by `index`; usually the first
//! fragment of an index carries the call id and function name, later ones
//! append to the JSON arguments. A call is announced with `ToolStarted` as
//! soon as it has an id and completed with `ToolFinished` once
//! `finish_reason` is `tool_calls`.

use std::collections::{BTreeMap, BTreeSet};
use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};

use parley_types::chat::{ToolCall, ToolFunction};
use parley_types::llm::{LlmError, ResponseMeta, StreamEvent};

use super::check_status;
use super::types::ChatChunk;

/// Terminal `data:` payload of an OpenAI-compatible stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Per-request state carried across chunks.
pub(crate) struct StreamState {
    text: String,
    tools: BTreeMap<u32, ToolCall>,
    /// Indexes already reported with `ToolStarted`.
    announced: BTreeSet<u32>,
    meta: ResponseMeta,
    saw_finish: bool,
}

impl StreamState {
    pub(crate) fn new(status: u16) -> Self {
        Self {
            text: String::new(),
            tools: BTreeMap::new(),
            announced: BTreeSet::new(),
            meta: ResponseMeta {
                status,
                ..ResponseMeta::ok()
            },
            saw_finish: false,
        }
    }

    /// Fold one chunk into the state, returning the events it produces.
    pub(crate) fn process_chunk(&mut self, chunk: ChatChunk) -> Result<Vec<StreamEvent>, LlmError> {
        if let Some(error) = chunk.error {
            return Err(LlmError::Provider {
                message: error
                    .message
                    .unwrap_or_else(|| "error reported mid-stream".to_string()),
            });
        }

        if chunk.id.is_some() {
            self.meta.id = chunk.id;
        }
        if chunk.model.is_some() {
            self.meta.model = chunk.model;
        }
        if let Some(usage) = chunk.usage {
            self.meta.usage = usage.into();
        }

        let mut events = Vec::new();
        for choice in chunk.choices {
            if let Some(content) = choice.delta.content {
                if !content.is_empty() {
                    self.text.push_str(&content);
                    events.push(StreamEvent::Update {
                        text: self.text.clone(),
                    });
                }
            }

            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let function = delta.function.unwrap_or_default();
                let arguments = function.arguments.unwrap_or_default();

                let call = self.tools.entry(delta.index).or_insert_with(|| ToolCall {
                    id: String::new(),
                    index: Some(delta.index),
                    kind: Some("function".to_string()),
                    function: Some(ToolFunction {
                        name: String::new(),
                        arguments: None,
                    }),
                    content: None,
                    is_error: false,
                    error_msg: None,
                });
                if let Some(id) = delta.id.filter(|id| !id.is_empty()) {
                    call.id = id;
                }
                if let Some(kind) = delta.kind.filter(|k| !k.is_empty()) {
                    call.kind = Some(kind);
                }
                if let Some(f) = call.function.as_mut() {
                    if let Some(name) = function.name.filter(|n| !n.is_empty()) {
                        f.name = name;
                    }
                    f.arguments.get_or_insert_with(String::new).push_str(&arguments);
                }

                // Announce once the call has an id to be tracked by.
                if !call.id.is_empty() && self.announced.insert(delta.index) {
                    events.push(StreamEvent::ToolStarted(call.clone()));
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.saw_finish = true;
                if reason == "tool_calls" {
                    let finished = std::mem::take(&mut self.tools);
                    self.announced.clear();
                    events.extend(finished.into_values().map(StreamEvent::ToolFinished));
                }
            }
        }

        Ok(events)
    }

    /// The terminal event for a stream that ended cleanly.
    pub(crate) fn finish(self) -> StreamEvent {
        StreamEvent::Finished {
            text: self.text,
            meta: self.meta,
        }
    }
}

/// Send a streaming chat completion and adapt the SSE body to
/// [`StreamEvent`]s.
///
/// Dropping the returned stream drops the HTTP response, which aborts the
/// request.
pub fn create_openrouter_stream(
    request: reqwest::RequestBuilder,
) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>> {
    Box::pin(async_stream::try_stream! {
        let response = request.send().await.map_err(|e| LlmError::Provider {
            message: format!("HTTP request failed: {e}"),
        })?;
        let response = check_status(response).await?;

        let mut state = StreamState::new(response.status().as_u16());
        let mut events = response.bytes_stream().eventsource();
        let mut done = false;

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| LlmError::Stream(format!("SSE read failed: {e}")))?;
            let data = event.data.trim();
            if data.is_empty() {
                continue;
            }
            if data == DONE_SENTINEL {
                done = true;
                break;
            }

            let chunk: ChatChunk = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("stream chunk: {e}")))?;
            for ev in state.process_chunk(chunk)? {
                yield ev;
            }
        }

        if !done && !state.saw_finish {
            Err::<(), _>(LlmError::Stream(
                "connection closed before completion".to_string(),
            ))?;
        }

        tracing::debug!(
            chars = state.text.len(),
            input_tokens = state.meta.usage.input_tokens,
            output_tokens = state.meta.usage.output_tokens,
            "openrouter stream finished"
        );
        yield state.finish();
    })
}
