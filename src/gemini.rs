//! Gemini API client
//!
//! Implements [`ChatModel`] over the `generateContent` REST endpoint with
//! function calling. Uses a long-lived reqwest::Client for connection pooling.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::error::AgentError;
use crate::llm::{ChatModel, ClientMessage, ClientReply, ClientToolCall, FunctionDeclaration};

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash-latest";

/// Reusable Gemini client (connection-pooled)
pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> crate::Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(8)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    pub fn from_config(config: &AppConfig) -> crate::Result<Self> {
        Ok(Self::new(
            config.gemini_api_key.clone(),
            config.gemini_model.clone(),
            config.http_timeout,
        )?
        .with_base_url(&config.gemini_base_url))
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ChatModel for GeminiClient {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn provider(&self) -> &str {
        "google"
    }

    async fn invoke(
        &self,
        messages: &[ClientMessage],
        tools: &[FunctionDeclaration],
    ) -> crate::Result<ClientReply> {
        if self.api_key.is_empty() {
            return Err(AgentError::ConfigError(
                "GEMINI_API_KEY not configured".to_string(),
            ));
        }

        let request = build_request(messages, tools);

        info!(
            model = %self.model,
            messages = messages.len(),
            tools = tools.len(),
            "Calling Gemini API"
        );

        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                error!("Gemini API request failed: {}", e);
                AgentError::LlmError(format!("Gemini API error: {}", e))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!(%status, "Gemini API error response: {}", error_text);
            return Err(AgentError::LlmError(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GeminiResponse = response.json().await.map_err(|e| {
            error!("Failed to parse Gemini response: {}", e);
            AgentError::LlmError(format!("Gemini parse error: {}", e))
        })?;

        if let Some(usage) = &gemini_response.usage_metadata {
            debug!(
                prompt_tokens = usage.prompt_token_count,
                candidate_tokens = usage.candidates_token_count,
                "Gemini token usage"
            );
        }

        let reply = parse_reply(gemini_response)?;

        info!(
            content_len = reply.content.len(),
            tool_calls = reply.tool_calls.len(),
            "Gemini response received"
        );

        Ok(reply)
    }
}

/// Map client messages onto Gemini's request shape.
///
/// System messages are merged into `systemInstruction`; human turns become
/// `user` contents and AI turns become `model` contents, in order.
fn build_request(messages: &[ClientMessage], tools: &[FunctionDeclaration]) -> GeminiRequest {
    let mut system_parts = Vec::new();
    let mut contents = Vec::with_capacity(messages.len());

    for message in messages {
        match message {
            ClientMessage::System(text) => system_parts.push(Part::text(text)),
            ClientMessage::Human(text) => contents.push(Content {
                role: Some("user".to_string()),
                parts: vec![Part::text(text)],
            }),
            ClientMessage::Ai(text) => contents.push(Content {
                role: Some("model".to_string()),
                parts: vec![Part::text(text)],
            }),
        }
    }

    GeminiRequest {
        contents,
        system_instruction: if system_parts.is_empty() {
            None
        } else {
            Some(SystemInstruction {
                parts: system_parts,
            })
        },
        tools: if tools.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: tools.to_vec(),
            }]
        },
        generation_config: GenerationConfig {
            temperature: 0.3,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 1024,
        },
    }
}

fn parse_reply(response: GeminiResponse) -> crate::Result<ClientReply> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| AgentError::LlmError("No response from Gemini API".to_string()))?;

    if let Some(reason) = candidate.finish_reason.as_deref() {
        debug!(finish_reason = reason, "Gemini candidate finished");
    }

    let mut reply = ClientReply::default();
    for part in candidate.content.parts {
        if let Some(text) = part.text {
            reply.content.push_str(&text);
        }
        if let Some(call) = part.function_call {
            reply.tool_calls.push(ClientToolCall {
                name: call.name,
                args: call.args,
            });
        }
    }

    Ok(reply)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSet>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
}

impl Part {
    fn text(text: &str) -> Self {
        Self {
            text: Some(text.to_string()),
            function_call: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolSet {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: i32,
    max_output_tokens: i32,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: i32,
    #[serde(default)]
    candidates_token_count: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_request_serialization() {
        let request = build_request(
            &[
                ClientMessage::System("You are a financial advisor".to_string()),
                ClientMessage::Human("What is RSI?".to_string()),
                ClientMessage::Ai("An oscillator.".to_string()),
            ],
            &[FunctionDeclaration {
                name: "get_stock_market_overview".to_string(),
                description: "Quote lookup".to_string(),
                parameters: json!({"type": "object"}),
            }],
        );

        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are a financial advisor"
        );
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "What is RSI?");
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(
            json["tools"][0]["functionDeclarations"][0]["name"],
            "get_stock_market_overview"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
    }

    #[test]
    fn test_request_without_tools_or_system_omits_fields() {
        let request = build_request(&[ClientMessage::Human("hi".to_string())], &[]);
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("tools").is_none());
        assert!(json.get("systemInstruction").is_none());
    }

    #[tokio::test]
    async fn test_invoke_parses_text_and_function_calls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/models/gemini-test:generateContent"))
            .and(query_param("key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [
                            {"text": "Looking that up."},
                            {"functionCall": {"name": "get_stock_market_overview", "args": {"symbol": "TCS"}}}
                        ]
                    },
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4}
            })))
            .mount(&server)
            .await;

        let client = GeminiClient::new(
            "test-key".to_string(),
            "gemini-test".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(&server.uri());

        let reply = client
            .invoke(&[ClientMessage::Human("TCS?".to_string())], &[])
            .await
            .unwrap();

        assert_eq!(reply.content, "Looking that up.");
        assert_eq!(reply.tool_calls.len(), 1);
        assert_eq!(reply.tool_calls[0].name, "get_stock_market_overview");
        assert_eq!(reply.tool_calls[0].args["symbol"], "TCS");
    }

    #[tokio::test]
    async fn test_invoke_surfaces_http_errors() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let client = GeminiClient::new(
            "test-key".to_string(),
            "gemini-test".to_string(),
            Duration::from_secs(5),
        )
        .unwrap()
        .with_base_url(&server.uri());

        let err = client
            .invoke(&[ClientMessage::Human("hi".to_string())], &[])
            .await
            .unwrap_err();

        assert!(matches!(err, AgentError::LlmError(_)));
        assert!(err.to_string().contains("overloaded"));
    }

    #[tokio::test]
    async fn test_missing_api_key() {
        let client = GeminiClient::new(
            String::new(),
            DEFAULT_MODEL.to_string(),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .invoke(&[ClientMessage::Human("hi".to_string())], &[])
            .await
            .unwrap_err();

        assert!(err.to_string().to_lowercase().contains("gemini_api_key"));
    }
}
