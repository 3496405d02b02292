//! Backend trait: the abstraction over the language-generation service.
//!
//! The engine calls `complete()` or `stream()` without knowing which
//! backend is behind the trait; everything else about generation (model
//! choice, sampling, retries) belongs to the caller's implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::BackendError;
use crate::message::{Message, ToolCallRequest};
use crate::tool::ToolDefinition;

/// The outgoing conversation, either as a structured list or flattened
/// into one delimited transcript string (see [`crate::format::FormatScheme`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptPayload {
    Messages { messages: Vec<Message> },
    Flattened { text: String },
}

impl TranscriptPayload {
    pub fn is_flattened(&self) -> bool {
        matches!(self, TranscriptPayload::Flattened { .. })
    }

    /// Number of structured messages, 0 for a flattened payload.
    pub fn message_count(&self) -> usize {
        match self {
            TranscriptPayload::Messages { messages } => messages.len(),
            TranscriptPayload::Flattened { .. } => 0,
        }
    }
}

/// One generation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendRequest {
    /// The conversation to continue
    pub payload: TranscriptPayload,

    /// Tools the backend may request
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

/// A complete (non-streaming) response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendReply {
    /// The generated assistant message
    pub message: Message,

    /// Backend-specific metadata
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl BackendReply {
    pub fn new(message: Message) -> Self {
        Self {
            message,
            metadata: serde_json::Map::new(),
        }
    }
}

/// A single chunk in a streaming response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamChunk {
    /// Partial content delta
    #[serde(default)]
    pub content: Option<String>,

    /// Tool call requests (typically complete, in the final chunks)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// Whether this is the final chunk
    #[serde(default)]
    pub done: bool,
}

/// The core Backend trait.
#[async_trait]
pub trait Backend: Send + Sync {
    /// A human-readable name for this backend.
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: BackendRequest) -> Result<BackendReply, BackendError>;

    /// Send a request and get a stream of response chunks.
    ///
    /// Default implementation calls `complete()` and wraps the result as a
    /// single final chunk.
    async fn stream(
        &self,
        request: BackendRequest,
    ) -> Result<
        tokio::sync::mpsc::Receiver<Result<StreamChunk, BackendError>>,
        BackendError,
    > {
        let reply = self.complete(request).await?;
        let (tx, rx) = tokio::sync::mpsc::channel(1);
        let _ = tx
            .send(Ok(StreamChunk {
                content: Some(reply.message.content),
                tool_calls: reply.message.tool_calls,
                done: true,
            }))
            .await;
        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedBackend;

    #[async_trait]
    impl Backend for FixedBackend {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: BackendRequest) -> Result<BackendReply, BackendError> {
            Ok(BackendReply::new(Message::assistant("hello")))
        }
    }

    #[tokio::test]
    async fn default_stream_wraps_complete() {
        let backend = FixedBackend;
        let request = BackendRequest {
            payload: TranscriptPayload::Messages { messages: vec![] },
            tools: vec![],
        };
        let mut rx = backend.stream(request).await.unwrap();
        let chunk = rx.recv().await.unwrap().unwrap();
        assert_eq!(chunk.content.as_deref(), Some("hello"));
        assert!(chunk.done);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn payload_message_count() {
        let structured = TranscriptPayload::Messages {
            messages: vec![Message::user("hi")],
        };
        assert_eq!(structured.message_count(), 1);
        assert!(!structured.is_flattened());

        let flat = TranscriptPayload::Flattened {
            text: "User: hi".into(),
        };
        assert_eq!(flat.message_count(), 0);
        assert!(flat.is_flattened());
    }
}
