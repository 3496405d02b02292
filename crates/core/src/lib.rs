//! # Parley Core
//!
//! Domain types, traits, and error definitions for the Parley
//! conversational turn engine. This crate defines the model that the
//! engine crate implements against: messages and their insertion anchors,
//! the contributor hook protocol and its priority ordering, the tool and
//! backend seams, turn state, and domain events.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here (backend, tool,
//! contributor). Implementations live with the caller. This enables:
//! - Swapping the generation backend without touching the cycle
//! - Per-turn capability registration with no persistent registry
//! - Easy testing with scripted/mock implementations

pub mod backend;
pub mod contributor;
pub mod error;
pub mod event;
pub mod format;
pub mod message;
pub mod placement;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use backend::{Backend, BackendReply, BackendRequest, StreamChunk, TranscriptPayload};
pub use contributor::{Contributor, ReplyOutcome, SortDirection, order_by_priority};
pub use error::{BackendError, ConfigError, Error, Result, ToolError};
pub use event::{DomainEvent, EventBus};
pub use format::FormatScheme;
pub use message::{Message, MessageMeta, Role, ToolCallRequest};
pub use placement::{InsertLocation, PositionableMessage};
pub use state::TurnState;
pub use tool::{Tool, ToolCatalog, ToolDefinition, ToolOutput};
