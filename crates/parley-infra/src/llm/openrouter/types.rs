//! OpenAI-compatible chat completion wire types.
//!
//! These are the request/response shapes spoken by OpenRouter's
//! `/chat/completions` endpoint. They are NOT the generic LLM types from
//! parley-types -- those are provider-agnostic.

use serde::{Deserialize, Serialize};

use parley_types::chat::{ContentPart, TurnContent};
use parley_types::llm::{CompletionRequest, Message, Usage};

/// Request body for `POST /chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl ChatRequest {
    pub fn from_completion(request: &CompletionRequest, stream: bool) -> Self {
        Self {
            model: request.model.clone(),
            messages: request.messages.iter().map(WireMessage::from).collect(),
            stream,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WireMessage {
    pub role: String,
    pub content: WireContent,
}

impl From<&Message> for WireMessage {
    fn from(message: &Message) -> Self {
        let content = match &message.content {
            TurnContent::Text(text) => WireContent::Text(text.clone()),
            TurnContent::Parts(parts) => {
                WireContent::Parts(parts.iter().map(WirePart::from).collect())
            }
        };
        Self {
            role: message.role.to_string(),
            content,
        }
    }
}

/// Plain string content, or an array of content parts for multimodal turns.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum WireContent {
    Text(String),
    Parts(Vec<WirePart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WirePart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

impl From<&ContentPart> for WirePart {
    fn from(part: &ContentPart) -> Self {
        match part {
            ContentPart::Text { text } => WirePart::Text { text: text.clone() },
            ContentPart::ImageUrl { url } => WirePart::ImageUrl {
                image_url: ImageUrl { url: url.clone() },
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Streaming chunk payloads (`data:` lines of the SSE stream)
// ---------------------------------------------------------------------------

/// One `chat.completion.chunk` object.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatChunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallDelta>>,
}

/// A fragment of a streamed tool call. Fragments sharing an `index`
/// belong to the same call; only the first carries `id` and `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallDelta {
    pub index: u32,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub function: Option<FunctionDelta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FunctionDelta {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WireUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(usage: WireUsage) -> Self {
        Usage {
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
        }
    }
}

/// Error object OpenRouter may embed in a 200 response or mid-stream.
#[derive(Debug, Clone, Deserialize)]
pub struct WireError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

// ---------------------------------------------------------------------------
// Non-streaming response
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
    #[serde(default)]
    pub usage: Option<WireUsage>,
    #[serde(default)]
    pub error: Option<WireError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_types::chat::Turn;

    #[test]
    fn test_request_serialization_plain_text() {
        let turns = vec![Turn::system("be brief"), Turn::user("Hello")];
        let request = CompletionRequest::from_turns("openai/gpt-4o-mini", &turns, true)
            .with_temperature(0.5);

        let json = serde_json::to_value(ChatRequest::from_completion(&request, true)).unwrap();
        assert_eq!(json["model"], "openai/gpt-4o-mini");
        assert_eq!(json["stream"], true);
        assert_eq!(json["temperature"], 0.5);
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert!(json.get("max_tokens").is_none());
    }

    #[test]
    fn test_multimodal_turn_serializes_as_parts() {
        let mut turn = Turn::user("");
        turn.content = TurnContent::Parts(vec![
            ContentPart::Text {
                text: "what is this?".to_string(),
            },
            ContentPart::ImageUrl {
                url: "https://example.com/cat.png".to_string(),
            },
        ]);
        let request = CompletionRequest::from_turns("m", &[turn], false);

        let json = serde_json::to_value(ChatRequest::from_completion(&request, false)).unwrap();
        let parts = &json["messages"][0]["content"];
        assert_eq!(parts[0]["type"], "text");
        assert_eq!(parts[0]["text"], "what is this?");
        assert_eq!(parts[1]["type"], "image_url");
        assert_eq!(parts[1]["image_url"]["url"], "https://example.com/cat.png");
    }

    #[test]
    fn test_chunk_deserialization_with_tool_call() {
        let json = r#"{
            "id": "gen-1",
            "object": "chat.completion.chunk",
            "model": "openai/gpt-4o",
            "choices": [{
                "index": 0,
                "delta": {
                    "tool_calls": [{
                        "index": 0,
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "search", "arguments": "{\"q\":"}
                    }]
                },
                "finish_reason": null
            }]
        }"#;
        let chunk: ChatChunk = serde_json::from_str(json).unwrap();
        let calls = chunk.choices[0].delta.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].index, 0);
        assert_eq!(calls[0].id.as_deref(), Some("call_1"));
        assert_eq!(
            calls[0].function.as_ref().unwrap().arguments.as_deref(),
            Some("{\"q\":")
        );
    }

    #[test]
    fn test_usage_only_chunk() {
        let json = r#"{"id":"gen-1","choices":[],"usage":{"prompt_tokens":12,"completion_tokens":3}}"#;
        let chunk: ChatChunk = serde_json::from_str(json).unwrap();
        assert!(chunk.choices.is_empty());
        let usage: Usage = chunk.usage.unwrap().into();
        assert_eq!(usage.input_tokens, 12);
        assert_eq!(usage.output_tokens, 3);
    }

    #[test]
    fn test_non_stream_response_deserialization() {
        let json = r#"{
            "id": "gen-2",
            "model": "openai/gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Rust Tips"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 2}
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content.as_deref(), Some("Rust Tips"));
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
    }
}
