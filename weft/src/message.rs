//! Chat message and content fragment types.
//!
//! These are the wire-facing values handed to a [`ChatClient`](crate::ChatClient):
//! an ordered list of [`ChatMessage`]s, each holding the content fragments that
//! were pending in the transcript when the message was packed.

use serde::{Deserialize, Serialize};

/// Role of a packed chat message.
///
/// The enumeration is closed: packing dispatches exhaustively over it, so an
/// unsupported role is unrepresentable rather than a runtime error.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Developer,
}

/// Detail hint for image fragments, controlling how the model processes the
/// image. `Auto` lets the service pick based on input size.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageDetail {
    #[default]
    Auto,
    Low,
    High,
}

/// One content fragment inside a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Plain text.
    Text { text: String },
    /// Image referenced by URI.
    ImageUri { uri: String, detail: ImageDetail },
    /// Inline image bytes with their media type.
    ImageBytes {
        bytes: Vec<u8>,
        media_type: String,
        detail: ImageDetail,
    },
}

impl ContentPart {
    /// Text fragment constructor.
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }
}

/// A finalized message: a role plus the fragments that were pending at pack
/// time, in order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    /// Concatenated text of all text fragments, ignoring non-text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_text_concatenates_text_parts_only() {
        let message = ChatMessage {
            role: Role::User,
            content: vec![
                ContentPart::text("a"),
                ContentPart::ImageUri {
                    uri: "https://example.com/x.png".to_string(),
                    detail: ImageDetail::Auto,
                },
                ContentPart::text("b"),
            ],
        };
        assert_eq!(message.text(), "ab");
    }

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Developer).unwrap(), "\"developer\"");
    }
}
