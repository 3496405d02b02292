//! Transcript flattening: the optional caller-supplied delimiter scheme.
//!
//! When a non-trivial scheme is present on the turn, the outgoing list is
//! rendered as a single delimited string instead of a structured list
//! before the backend call.

use serde::{Deserialize, Serialize};

use crate::message::Message;

/// A delimiter scheme for rendering a message list as one transcript string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatScheme {
    /// Separator inserted between rendered messages (e.g. `"\n"`).
    pub turn_separator: String,

    /// Suffix appended to the speaker label (e.g. `":"`).
    pub name_suffix: String,
}

impl FormatScheme {
    pub fn new(turn_separator: impl Into<String>, name_suffix: impl Into<String>) -> Self {
        Self {
            turn_separator: turn_separator.into(),
            name_suffix: name_suffix.into(),
        }
    }

    /// A trivial scheme leaves the outgoing list structured.
    pub fn is_trivial(&self) -> bool {
        self.turn_separator.is_empty() && self.name_suffix.is_empty()
    }

    /// Render the list as one delimited transcript string. Each message
    /// becomes `<speaker><suffix> <content>`, joined by the separator.
    pub fn render(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| format!("{}{} {}", m.speaker_label(), self.name_suffix, m.content))
            .collect::<Vec<_>>()
            .join(&self.turn_separator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trivial_scheme_detected() {
        assert!(FormatScheme::new("", "").is_trivial());
        assert!(!FormatScheme::new("\n", ":").is_trivial());
        assert!(!FormatScheme::new("\n", "").is_trivial());
    }

    #[test]
    fn render_uses_speaker_labels_and_separator() {
        let scheme = FormatScheme::new("\n", ":");
        let messages = vec![
            Message::system("Be concise."),
            Message::user("hi").with_name("Ada"),
            Message::assistant("hello"),
        ];
        let text = scheme.render(&messages);
        assert_eq!(text, "System: Be concise.\nAda: hi\nAssistant: hello");
    }

    #[test]
    fn render_empty_list_is_empty() {
        let scheme = FormatScheme::new("\n", ":");
        assert_eq!(scheme.render(&[]), "");
    }
}
