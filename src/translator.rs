//! Message translation between the transcript and an LLM client
//!
//! The transcript speaks [`ChatMessage`] (user / assistant / system); clients
//! speak [`ClientMessage`] (human / AI / system). [`ModelAdapter`] maps one
//! onto the other, makes a single client call and packages the result as a
//! [`ModelReply`].

use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::debug;

use crate::llm::{ChatModel, ClientMessage, ClientToolCall, FunctionDeclaration};
use crate::models::{ChatMessage, ChatRole, ModelReply, ToolInvocation};
use crate::Result;

pub fn to_client_message(message: &ChatMessage) -> ClientMessage {
    let content = message.content.clone();
    match message.role {
        ChatRole::User => ClientMessage::Human(content),
        ChatRole::Assistant => ClientMessage::Ai(content),
        ChatRole::System => ClientMessage::System(content),
    }
}

pub fn to_client_messages(messages: &[ChatMessage]) -> Vec<ClientMessage> {
    messages.iter().map(to_client_message).collect()
}

pub fn from_client_message(message: &ClientMessage) -> ChatMessage {
    match message {
        ClientMessage::Human(text) => ChatMessage::user(text.clone()),
        ClientMessage::Ai(text) => ChatMessage::assistant(text.clone()),
        ClientMessage::System(text) => ChatMessage::system(text.clone()),
    }
}

/// One invocation per call, unpaused, name and arguments forwarded as-is.
/// Non-object arguments are forwarded as an empty mapping.
pub fn tool_invocations(calls: Vec<ClientToolCall>) -> Vec<ToolInvocation> {
    calls
        .into_iter()
        .map(|call| ToolInvocation {
            tool_name: call.name,
            arguments: match call.args {
                Value::Object(map) => map,
                _ => Map::new(),
            },
            paused: false,
        })
        .collect()
}

/// Adapts a [`ChatModel`] to the transcript's message types.
#[derive(Clone)]
pub struct ModelAdapter {
    model: Arc<dyn ChatModel>,
}

impl ModelAdapter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    pub fn provider(&self) -> &str {
        self.model.provider()
    }

    /// Translate `messages`, call the model once and package its reply.
    ///
    /// An empty sequence returns [`ModelReply::Empty`] without a model call.
    /// Client errors are returned unchanged; there is no retry.
    pub async fn respond(
        &self,
        messages: &[ChatMessage],
        tools: &[FunctionDeclaration],
    ) -> Result<ModelReply> {
        if messages.is_empty() {
            debug!("No messages to send, returning empty reply");
            return Ok(ModelReply::Empty);
        }

        let client_messages = to_client_messages(messages);
        let reply = self.model.invoke(&client_messages, tools).await?;

        Ok(ModelReply::Generated {
            content: reply.content,
            tool_invocations: tool_invocations(reply.tool_calls),
            created_at: Utc::now(),
        })
    }
}
