//! Message domain types.
//!
//! These are the value objects that flow through every phase of a turn:
//! an inbound message enters the cycle, contributors reshape the outgoing
//! list, the backend appends an assistant reply, and tool results are
//! threaded back in for the next call.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a message sender in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (identity, rules)
    System,
    /// An end user or room participant
    User,
    /// The generation backend
    Assistant,
    /// Tool execution result
    Tool,
}

impl Role {
    /// Display label used when a list is flattened into a transcript.
    pub fn label(&self) -> &'static str {
        match self {
            Role::System => "System",
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::Tool => "Tool",
        }
    }
}

/// A capability invocation requested by the backend inside an assistant
/// message. Only the backend produces these.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique ID for this call (matched by the tool result's `tool_call_id`)
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

impl ToolCallRequest {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// The metadata bag attached to every message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageMeta {
    /// Where this message came from (contributor name, channel, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Disabled messages never reach the backend; the consistency filter
    /// removes them (and any tool-result run they anchor) before each call.
    #[serde(default)]
    pub disabled: bool,

    /// Provider-specific extras
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for MessageMeta {
    fn default() -> Self {
        Self {
            source: None,
            created_at: Utc::now(),
            disabled: false,
            extra: serde_json::Map::new(),
        }
    }
}

/// A single message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID
    pub id: String,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Optional display name / speaker tag (multi-participant rooms)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Tool calls requested by the backend (only meaningful on Assistant)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// If this is a tool result, which tool call it responds to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// Metadata bag (source, timestamp, disabled flag, extras)
    #[serde(default)]
    pub meta: MessageMeta,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            name: None,
            tool_calls: Vec::new(),
            tool_call_id: None,
            meta: MessageMeta::default(),
        }
    }

    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Create a tool result message answering the given call.
    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    /// Set the display name / speaker tag.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the source tag in the metadata bag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    /// Attach tool call requests (backend replies only).
    pub fn with_tool_calls(mut self, calls: Vec<ToolCallRequest>) -> Self {
        self.tool_calls = calls;
        self
    }

    /// Mark this message as disabled.
    pub fn disabled(mut self) -> Self {
        self.meta.disabled = true;
        self
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == Role::Tool
    }

    /// True for an assistant message carrying at least one pending call.
    pub fn requests_tools(&self) -> bool {
        self.role == Role::Assistant && !self.tool_calls.is_empty()
    }

    pub fn is_disabled(&self) -> bool {
        self.meta.disabled
    }

    /// The label shown when the message is rendered into a flat transcript:
    /// the speaker tag if present, the role label otherwise.
    pub fn speaker_label(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.role.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn create_user_message() {
        let msg = Message::user("Hello, room!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.content, "Hello, room!");
        assert!(msg.tool_calls.is_empty());
        assert!(!msg.is_disabled());
    }

    #[test]
    fn tool_result_carries_call_id() {
        let msg = Message::tool_result("call_1", "42");
        assert!(msg.is_tool_result());
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_with_calls_requests_tools() {
        let msg = Message::assistant("").with_tool_calls(vec![ToolCallRequest::new(
            "call_1",
            "lookup",
            json!({"q": "weather"}),
        )]);
        assert!(msg.requests_tools());
        assert!(!Message::assistant("plain").requests_tools());
        // tool_calls are only meaningful on Assistant
        let mut user = Message::user("hi");
        user.tool_calls = vec![ToolCallRequest::new("x", "y", json!({}))];
        assert!(!user.requests_tools());
    }

    #[test]
    fn speaker_label_prefers_name() {
        let msg = Message::user("hi").with_name("Ada");
        assert_eq!(msg.speaker_label(), "Ada");
        assert_eq!(Message::user("hi").speaker_label(), "User");
    }

    #[test]
    fn message_serialization_roundtrip() {
        let msg = Message::assistant("Test")
            .with_source("persona")
            .with_tool_calls(vec![ToolCallRequest::new("c1", "echo", json!({"t": 1}))]);
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn disabled_builder_sets_flag() {
        let msg = Message::system("hidden").disabled();
        assert!(msg.is_disabled());
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(Message::user("a").id, Message::user("a").id);
    }
}
