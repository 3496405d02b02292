//! Positionable messages: contributions tagged with a symbolic insertion
//! location instead of an absolute index.
//!
//! These exist only during the contribute-messages phase: the insertion
//! engine folds a batch of them into the working list, then they are gone.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// Where a contributed message is inserted into the working list.
///
/// Anchors are resolved against the list as it stands when the insertion
/// happens, so each insertion in a batch sees the result of the previous
/// ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "anchor", rename_all = "snake_case")]
pub enum InsertLocation {
    /// Prepend, before everything.
    AbsoluteFirst,

    /// Immediately after the first system-role message; prepend when the
    /// list holds no system message.
    AfterAgentIdentity,

    /// After the leading contiguous block of system-role messages. Distinct
    /// from `AfterAgentIdentity`, which anchors on the first one only.
    AfterInstructions,

    /// At the given offset from the front, clamped to the list bounds.
    OffsetFromFront { offset: usize },

    /// At `len - offset`, clamped to the list bounds. An offset of 0 is
    /// equivalent to `Last`.
    OffsetFromEnd { offset: usize },

    /// Append, after everything.
    Last,
}

/// A message paired with its symbolic insertion location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionableMessage {
    pub location: InsertLocation,
    pub message: Message,
}

impl PositionableMessage {
    pub fn new(location: InsertLocation, message: Message) -> Self {
        Self { location, message }
    }

    /// Shorthand for the most common contribution: append at the end.
    pub fn last(message: Message) -> Self {
        Self::new(InsertLocation::Last, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_serialization_roundtrip() {
        let loc = InsertLocation::OffsetFromEnd { offset: 2 };
        let json = serde_json::to_string(&loc).unwrap();
        let back: InsertLocation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }

    #[test]
    fn last_shorthand() {
        let pm = PositionableMessage::last(Message::user("hi"));
        assert_eq!(pm.location, InsertLocation::Last);
    }
}
