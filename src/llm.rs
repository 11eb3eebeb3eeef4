//! Language-model client seam
//!
//! `ChatModel` is the narrow contract every LLM backend implements. It speaks
//! the client-side message kinds (human / AI / system) and returns text plus
//! any function calls the model asked for.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::Result;

/// Message kinds understood by LLM clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ClientMessage {
    Human(String),
    Ai(String),
    System(String),
}

impl ClientMessage {
    pub fn text(&self) -> &str {
        match self {
            ClientMessage::Human(text) | ClientMessage::Ai(text) | ClientMessage::System(text) => {
                text
            }
        }
    }
}

/// Function exposed to the model for tool calling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// A function call descriptor as returned by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientToolCall {
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

/// Raw client reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientReply {
    pub content: String,
    #[serde(default)]
    pub tool_calls: Vec<ClientToolCall>,
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Model identifier, e.g. `gemini-1.5-flash-latest`.
    fn model_id(&self) -> &str;

    /// Provider name, e.g. `google`.
    fn provider(&self) -> &str;

    async fn invoke(
        &self,
        messages: &[ClientMessage],
        tools: &[FunctionDeclaration],
    ) -> Result<ClientReply>;
}
