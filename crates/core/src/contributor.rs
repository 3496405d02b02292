//! Contributor protocol: pluggable participants exposing optional
//! lifecycle hooks around the turn cycle.
//!
//! Every hook has a default no-op (or identity) implementation, so a
//! contributor implements only the phases it cares about. Contributors are
//! supplied by the caller for the duration of one turn; the core never
//! owns them across turns.
//!
//! Ordering: each phase sorts contributors by priority, ascending for the
//! context-setting phases before the backend call and descending for the
//! reacting phases after it, so hooks that need the freshest context act
//! first when reacting to output. The sort is stable: contributors with
//! equal priority retain their registration order.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::message::Message;
use crate::placement::PositionableMessage;
use crate::state::TurnState;
use crate::tool::Tool;

/// What a contributor's `on_reply` hook produced. Results from all
/// contributors are merged in contributor order; absent results (`None`
/// from the hook) are filtered out.
#[derive(Debug, Clone, Default)]
pub struct ReplyOutcome {
    /// Extra messages to append to the turn's output.
    pub messages: Vec<Message>,

    /// Ask the engine to run another backend round after this reply.
    pub repeat: bool,
}

impl ReplyOutcome {
    /// An outcome that only requests a repeat round.
    pub fn repeat() -> Self {
        Self {
            messages: Vec::new(),
            repeat: true,
        }
    }

    /// An outcome that only appends messages.
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            repeat: false,
        }
    }
}

/// A pluggable turn participant.
///
/// Hooks run in the phase order documented on each method; a hook error
/// always propagates and aborts the turn. During concurrent phases the
/// engine hands every contributor a read-only snapshot of the state at
/// phase entry and merges results only after the full set completes.
#[async_trait]
pub trait Contributor: Send + Sync {
    /// Name used in logs and error context.
    fn name(&self) -> &str;

    /// Relative ordering within a phase. Default 0, may be negative.
    fn priority(&self) -> i32 {
        0
    }

    /// Offer tools for this turn's catalog. Ascending order, concurrent.
    async fn provide_tools(&self, _state: &TurnState) -> Result<Vec<Arc<dyn Tool>>> {
        Ok(Vec::new())
    }

    /// One-time setup at turn start. Ascending order, concurrent.
    async fn initialize_turn(&self, _state: &TurnState) -> Result<()> {
        Ok(())
    }

    /// Runs before the first backend call of the turn. Ascending order,
    /// concurrent.
    async fn before_call(&self, _state: &TurnState) -> Result<()> {
        Ok(())
    }

    /// Sequential pipeline over the working list: each contributor
    /// consumes the prior contributor's output. Ascending order.
    async fn transform_history(&self, working: Vec<Message>) -> Result<Vec<Message>> {
        Ok(working)
    }

    /// Contribute location-tagged messages; all contributions are
    /// concatenated in contributor order and batch-inserted into the
    /// working list. Ascending order, each contributor called
    /// independently.
    async fn contribute_messages(&self, _state: &TurnState) -> Result<Vec<PositionableMessage>> {
        Ok(Vec::new())
    }

    /// Observe the exact repaired list about to be sent to the backend.
    /// Descending order, concurrent, read-only.
    async fn inspect_call_messages(&self, _messages: &[Message]) -> Result<()> {
        Ok(())
    }

    /// React to a plain (non-tool) assistant reply. Descending order,
    /// concurrent; outcomes are merged in contributor order.
    async fn on_reply(
        &self,
        _reply: &Message,
        _state: &TurnState,
    ) -> Result<Option<ReplyOutcome>> {
        Ok(None)
    }

    /// Rework the tool-result messages of a round before they join the
    /// lists. Descending order, strictly sequential: each contributor may
    /// mutate the list in place before the next runs.
    async fn on_tool_messages(&self, _tool_messages: &mut Vec<Message>) -> Result<()> {
        Ok(())
    }

    /// Turn teardown. Descending order, concurrent. Not invoked when the
    /// turn is cancelled mid-stream.
    async fn on_turn_complete(&self, _state: &TurnState) -> Result<()> {
        Ok(())
    }
}

/// Which way a phase orders contributors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Low priority first (context-setting phases).
    Ascending,
    /// High priority first (reacting phases).
    Descending,
}

/// The single ordering routine used by every phase.
///
/// `Vec::sort_by` is stable, so contributors with equal priority keep
/// their registration order in both directions; the tests below pin that
/// guarantee down rather than assuming it.
pub fn order_by_priority(
    contributors: &[Arc<dyn Contributor>],
    direction: SortDirection,
) -> Vec<Arc<dyn Contributor>> {
    let mut ordered = contributors.to_vec();
    ordered.sort_by(|a, b| match direction {
        SortDirection::Ascending => a.priority().cmp(&b.priority()),
        SortDirection::Descending => b.priority().cmp(&a.priority()),
    });
    ordered
}
