//! Core data models for the finance chat agent

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

//
// ================= Roles =================
//

/// Role of a chat message author.
///
/// The set is closed: anything that is not recognised resolves to `User`.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

impl ChatRole {
    /// Parse a free-form role tag. `agent` is an alias for `assistant`.
    pub fn parse_lossy(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "user" => ChatRole::User,
            "assistant" | "agent" => ChatRole::Assistant,
            "system" => ChatRole::System,
            _ => ChatRole::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
            ChatRole::System => "system",
        }
    }
}

impl<'de> Deserialize<'de> for ChatRole {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(ChatRole::parse_lossy(&raw))
    }
}

impl fmt::Display for ChatRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//
// ================= Chat =================
//

/// A single entry of a chat transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(ChatRole::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(ChatRole::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(ChatRole::System, content)
    }
}

//
// ================= Model Replies =================
//

/// A function call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub tool_name: String,
    pub arguments: Map<String, Value>,
    #[serde(default)]
    pub paused: bool,
}

/// Outcome of one model call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ModelReply {
    /// Produced without contacting the model when there was nothing to send.
    Empty,
    Generated {
        content: String,
        tool_invocations: Vec<ToolInvocation>,
        created_at: DateTime<Utc>,
    },
}

impl ModelReply {
    pub fn content(&self) -> &str {
        match self {
            ModelReply::Empty => "",
            ModelReply::Generated { content, .. } => content,
        }
    }

    pub fn tool_invocations(&self) -> &[ToolInvocation] {
        match self {
            ModelReply::Empty => &[],
            ModelReply::Generated {
                tool_invocations, ..
            } => tool_invocations,
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        match self {
            ModelReply::Empty => None,
            ModelReply::Generated { created_at, .. } => Some(*created_at),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ModelReply::Empty)
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_invocations().is_empty()
    }
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    pub parameters: Value,
}

impl From<&ToolInvocation> for ToolInput {
    fn from(invocation: &ToolInvocation) -> Self {
        Self {
            tool_name: invocation.tool_name.clone(),
            parameters: Value::Object(invocation.arguments.clone()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub success: bool,
    pub data: Value,
    pub error: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            success: false,
            data: serde_json::json!({ "error": message }),
            error: Some(message),
        }
    }
}
