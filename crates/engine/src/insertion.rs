//! Message insertion engine: folds a batch of location-tagged messages
//! into the working list.
//!
//! The batch arrives in ascending contributor-priority order and is folded
//! left to right: each insertion resolves its anchor against the list as
//! the earlier insertions left it. After the fold, inserted messages whose
//! `disabled` flag is set are dropped so disabled content never reaches
//! the backend.

use parley_core::message::{Message, Role};
use parley_core::placement::{InsertLocation, PositionableMessage};

/// Resolve the insertion index for a location against the current list.
fn resolve_index(list: &[Message], location: InsertLocation) -> usize {
    match location {
        InsertLocation::AbsoluteFirst => 0,

        // Right after the first system message; no system message means
        // the list has no identity statement yet, so prepend.
        InsertLocation::AfterAgentIdentity => list
            .iter()
            .position(|m| m.role == Role::System)
            .map(|i| i + 1)
            .unwrap_or(0),

        // After the whole leading run of system messages.
        InsertLocation::AfterInstructions => {
            list.iter().take_while(|m| m.role == Role::System).count()
        }

        InsertLocation::OffsetFromFront { offset } => offset.min(list.len()),

        InsertLocation::OffsetFromEnd { offset } => list.len().saturating_sub(offset),

        InsertLocation::Last => list.len(),
    }
}

/// Fold a contribution batch into the working list.
pub fn insert_contributions(working: &mut Vec<Message>, batch: Vec<PositionableMessage>) {
    let mut disabled_ids: Vec<String> = Vec::new();

    for positioned in batch {
        if positioned.message.is_disabled() {
            disabled_ids.push(positioned.message.id.clone());
        }
        let index = resolve_index(working, positioned.location);
        working.insert(index, positioned.message);
    }

    if !disabled_ids.is_empty() {
        working.retain(|m| !disabled_ids.contains(&m.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parley_core::message::Message;

    fn base() -> Vec<Message> {
        vec![
            Message::system("identity"),
            Message::system("rules"),
            Message::user("hi"),
        ]
    }

    fn contents(list: &[Message]) -> Vec<&str> {
        list.iter().map(|m| m.content.as_str()).collect()
    }

    #[test]
    fn absolute_first_prepends() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::AbsoluteFirst,
                Message::system("preamble"),
            )],
        );
        assert_eq!(contents(&working), vec!["preamble", "identity", "rules", "hi"]);
    }

    #[test]
    fn after_agent_identity_follows_first_system_message() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::AfterAgentIdentity,
                Message::system("persona"),
            )],
        );
        assert_eq!(contents(&working), vec!["identity", "persona", "rules", "hi"]);
    }

    #[test]
    fn after_agent_identity_without_system_prepends() {
        let mut working = vec![Message::user("hi")];
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::AfterAgentIdentity,
                Message::system("persona"),
            )],
        );
        assert_eq!(contents(&working), vec!["persona", "hi"]);
    }

    #[test]
    fn after_instructions_skips_the_whole_leading_block() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::AfterInstructions,
                Message::system("addendum"),
            )],
        );
        // Distinct from AfterAgentIdentity: lands after "rules", not after
        // "identity".
        assert_eq!(contents(&working), vec!["identity", "rules", "addendum", "hi"]);
    }

    #[test]
    fn offset_from_front_clamps_to_append() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::OffsetFromFront { offset: 99 },
                Message::user("tail"),
            )],
        );
        assert_eq!(contents(&working), vec!["identity", "rules", "hi", "tail"]);
    }

    #[test]
    fn offset_from_front_inserts_at_index() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::OffsetFromFront { offset: 1 },
                Message::system("wedge"),
            )],
        );
        assert_eq!(contents(&working), vec!["identity", "wedge", "rules", "hi"]);
    }

    #[test]
    fn offset_from_end_zero_is_last() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![PositionableMessage::new(
                InsertLocation::OffsetFromEnd { offset: 0 },
                Message::user("tail"),
            )],
        );
        assert_eq!(contents(&working), vec!["identity", "rules", "hi", "tail"]);
    }

    #[test]
    fn offset_from_end_counts_backwards_and_clamps() {
        let mut working = base();
        insert_contributions(
            &mut working,
            vec![
                PositionableMessage::new(
                    InsertLocation::OffsetFromEnd { offset: 1 },
                    Message::user("penultimate"),
                ),
                PositionableMessage::new(
                    InsertLocation::OffsetFromEnd { offset: 99 },
                    Message::system("front"),
                ),
            ],
        );
        assert_eq!(
            contents(&working),
            vec!["front", "identity", "rules", "penultimate", "hi"]
        );
    }

    #[test]
    fn last_insertions_preserve_batch_order() {
        let mut working = vec![Message::user("L")];
        insert_contributions(
            &mut working,
            vec![
                PositionableMessage::last(Message::user("A")),
                PositionableMessage::last(Message::user("B")),
            ],
        );
        insert_contributions(
            &mut working,
            vec![PositionableMessage::last(Message::user("C"))],
        );
        assert_eq!(contents(&working), vec!["L", "A", "B", "C"]);
    }

    #[test]
    fn each_insertion_sees_earlier_insertions() {
        let mut working = vec![Message::user("hi")];
        insert_contributions(
            &mut working,
            vec![
                PositionableMessage::new(
                    InsertLocation::AbsoluteFirst,
                    Message::system("identity"),
                ),
                // Resolves against the list that already contains the
                // identity message inserted above.
                PositionableMessage::new(
                    InsertLocation::AfterAgentIdentity,
                    Message::system("persona"),
                ),
            ],
        );
        assert_eq!(contents(&working), vec!["identity", "persona", "hi"]);
    }

    #[test]
    fn disabled_insertions_are_dropped_after_the_fold() {
        let mut working = vec![Message::user("hi")];
        insert_contributions(
            &mut working,
            vec![
                PositionableMessage::last(Message::user("kept")),
                PositionableMessage::last(Message::user("hidden").disabled()),
            ],
        );
        assert_eq!(contents(&working), vec!["hi", "kept"]);
    }

    #[test]
    fn pre_existing_disabled_messages_are_left_for_the_filter() {
        // The insertion engine only drops what it inserted; the
        // consistency filter owns the rest of the list.
        let mut working = vec![Message::user("old").disabled()];
        insert_contributions(
            &mut working,
            vec![PositionableMessage::last(Message::user("new"))],
        );
        assert_eq!(contents(&working), vec!["old", "new"]);
    }
}
