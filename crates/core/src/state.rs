//! Turn state: the mutable record threaded through every phase of one
//! turn cycle.

use serde::{Deserialize, Serialize};

use crate::format::FormatScheme;
use crate::message::Message;

/// The state of one in-flight turn.
///
/// Created once per inbound message and mutated in place by every phase.
/// `history` and `new_messages` are the only output handed back to the
/// caller when the turn ends; the working list is call-scoped and is
/// rebuilt from history on each repeat. Contributors receive `&TurnState`
/// snapshots during concurrent phases and must not retain any part of it
/// beyond the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnState {
    /// The outgoing sequence for the next backend call.
    pub working_list: Vec<Message>,

    /// The persisted-scope sequence; evolves across repeats.
    pub history: Vec<Message>,

    /// Messages produced this turn only (replies, tool results,
    /// reply-merge contributions). Excludes the inbound message, which the
    /// caller already owns.
    pub new_messages: Vec<Message>,

    /// Repeat round index, incremented once per repeat.
    pub reply_count: u32,

    /// Set when a contributor asks for another round; cleared when the
    /// repeat edge is taken.
    pub repeat_requested: bool,

    /// Optional delimiter scheme; non-trivial schemes flatten the outgoing
    /// list before the backend call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FormatScheme>,
}

impl TurnState {
    /// Seed the turn: working list = history plus the new inbound message,
    /// which also joins history.
    pub fn new(mut history: Vec<Message>, inbound: Message, format: Option<FormatScheme>) -> Self {
        history.push(inbound);
        Self {
            working_list: history.clone(),
            history,
            new_messages: Vec::new(),
            reply_count: 0,
            repeat_requested: false,
            format,
        }
    }

    /// Record a message produced by this turn in all three sequences.
    pub fn push_produced(&mut self, message: Message) {
        self.working_list.push(message.clone());
        self.history.push(message.clone());
        self.new_messages.push(message);
    }

    /// Record a whole round of produced messages, preserving order.
    pub fn extend_produced(&mut self, messages: Vec<Message>) {
        for message in messages {
            self.push_produced(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeding_appends_inbound_to_both_lists() {
        let history = vec![Message::system("identity"), Message::user("earlier")];
        let state = TurnState::new(history, Message::user("hi"), None);

        assert_eq!(state.history.len(), 3);
        assert_eq!(state.working_list.len(), 3);
        assert_eq!(state.working_list.last().unwrap().content, "hi");
        assert!(state.new_messages.is_empty());
        assert_eq!(state.reply_count, 0);
        assert!(!state.repeat_requested);
    }

    #[test]
    fn push_produced_hits_all_three_lists() {
        let mut state = TurnState::new(vec![], Message::user("hi"), None);
        state.push_produced(Message::assistant("hello"));

        assert_eq!(state.working_list.len(), 2);
        assert_eq!(state.history.len(), 2);
        assert_eq!(state.new_messages.len(), 1);
        assert_eq!(state.new_messages[0].content, "hello");
    }
}
