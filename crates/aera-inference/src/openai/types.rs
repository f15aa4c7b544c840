//! OpenAI-compatible API request and response types.

use serde::{Deserialize, Serialize};

// =============================================================================
// EMBEDDING TYPES
// =============================================================================

/// Request body for the embeddings endpoint.
#[derive(Debug, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encoding_format: Option<String>,
}

/// Response from the embeddings endpoint.
#[derive(Debug, Deserialize)]
pub struct EmbeddingResponse {
    pub data: Vec<EmbeddingData>,
    #[serde(default)]
    pub model: Option<String>,
}

/// Single embedding data point.
#[derive(Debug, Deserialize)]
pub struct EmbeddingData {
    pub embedding: Vec<f32>,
    pub index: usize,
}

// =============================================================================
// CHAT COMPLETION TYPES
// =============================================================================

/// Request body for chat completions endpoint.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

/// A single outbound chat message.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: MessageContent::Text(content.into()),
        }
    }
}

/// Plain text, or a list of typed parts for multimodal requests.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One part of a multimodal message.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: String },
}

/// Response from chat completions endpoint.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: Option<String>,
    pub choices: Vec<ChatChoice>,
}

/// Single chat completion choice.
#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub index: usize,
    pub message: ResponseMessage,
    pub finish_reason: Option<String>,
}

/// Assistant message as returned by the API.
#[derive(Debug, Deserialize)]
pub struct ResponseMessage {
    pub role: String,
    #[serde(default)]
    pub content: Option<String>,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Error response from an OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub struct OpenAIErrorResponse {
    pub error: OpenAIError,
}

/// Detailed error information.
#[derive(Debug, Deserialize)]
pub struct OpenAIError {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

/// Mistral sometimes reports errors as a flat `{"message": ..}` object.
#[derive(Debug, Deserialize)]
pub struct FlatErrorResponse {
    pub message: String,
    #[serde(rename = "type", default)]
    pub error_type: Option<String>,
}

/// Extract `(message, error_type)` from an error body of either shape.
pub fn parse_error_body(body: &str) -> (String, String) {
    if let Ok(parsed) = serde_json::from_str::<OpenAIErrorResponse>(body) {
        return (
            parsed.error.message,
            parsed.error.error_type.unwrap_or_default(),
        );
    }
    if let Ok(parsed) = serde_json::from_str::<FlatErrorResponse>(body) {
        return (parsed.message, parsed.error_type.unwrap_or_default());
    }
    let message = if body.trim().is_empty() {
        "Unknown error".to_string()
    } else {
        body.chars().take(500).collect()
    };
    (message, String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedding_request_serialization() {
        let request = EmbeddingRequest {
            model: "mistral-embed".to_string(),
            input: vec!["hello".to_string(), "world".to_string()],
            encoding_format: Some("float".to_string()),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "mistral-embed");
        assert_eq!(json["input"][1], "world");
        assert_eq!(json["encoding_format"], "float");
    }

    #[test]
    fn test_embedding_response_deserialization() {
        let json = r#"{
            "data": [
                {"embedding": [0.1, 0.2, 0.3], "index": 0}
            ],
            "model": "mistral-embed",
            "usage": {"prompt_tokens": 2, "total_tokens": 2}
        }"#;

        let response: EmbeddingResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.data.len(), 1);
        assert_eq!(response.data[0].embedding, vec![0.1, 0.2, 0.3]);
    }

    #[test]
    fn test_chat_request_with_options() {
        let request = ChatCompletionRequest {
            model: "mistral-small-latest".to_string(),
            messages: vec![
                ChatMessage::text("system", "You are helpful."),
                ChatMessage::text("user", "Hello"),
            ],
            temperature: Some(0.3),
            max_tokens: Some(1000),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["content"], "Hello");
        assert_eq!(json["max_tokens"], 1000);
    }

    #[test]
    fn test_chat_request_omits_unset_options() {
        let request = ChatCompletionRequest {
            model: "m".to_string(),
            messages: vec![ChatMessage::text("user", "x")],
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
    }

    #[test]
    fn test_multimodal_parts_serialization() {
        let message = ChatMessage {
            role: "user".to_string(),
            content: MessageContent::Parts(vec![
                ContentPart::Text {
                    text: "Describe".to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: "data:image/png;base64,AAAA".to_string(),
                },
            ]),
        };

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["content"][0]["type"], "text");
        assert_eq!(json["content"][1]["type"], "image_url");
        assert_eq!(json["content"][1]["image_url"], "data:image/png;base64,AAAA");
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{
            "id": "cmpl-1",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }]
        }"#;

        let response: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hello!"));
    }

    #[test]
    fn test_parse_error_body_shapes() {
        let nested = r#"{"error": {"message": "Invalid API key", "type": "invalid_request_error"}}"#;
        assert_eq!(
            parse_error_body(nested),
            ("Invalid API key".to_string(), "invalid_request_error".to_string())
        );

        let flat = r#"{"message": "Requests rate limit exceeded", "type": "rate_limited"}"#;
        assert_eq!(parse_error_body(flat).0, "Requests rate limit exceeded");

        assert_eq!(parse_error_body("").0, "Unknown error");
        assert_eq!(parse_error_body("upstream timeout").0, "upstream timeout");
    }
}
