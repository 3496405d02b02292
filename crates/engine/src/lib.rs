//! # Parley Engine
//!
//! The control core of the Parley conversational runtime: for each
//! inbound message it decides which contributor hooks run and in what
//! order, how the outgoing message list is assembled and repaired between
//! backend calls, when a round of tool execution is required, and when
//! the round must repeat because a participant asked for it.
//!
//! The pieces, leaves first:
//! - [`insertion`]: folds a batch of location-tagged contributions into
//!   the working list.
//! - [`repair`]: the consistency filter run before every backend call.
//! - [`invoker`]: resolves and executes requested tools, downgrading
//!   per-call failures to in-band error results.
//! - [`turn`]: the state machine that sequences everything, including
//!   the tool-round and repeat-round back-edges.

pub mod insertion;
pub mod invoker;
pub mod repair;
pub mod turn;

pub use insertion::insert_contributions;
pub use invoker::{ERROR_MARKER, execute_tool_round};
pub use repair::repair;
pub use turn::{TurnEngine, TurnOutput, TurnPhase, TurnRequest};
