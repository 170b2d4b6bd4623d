//! Message accumulator for one compile pass.
//!
//! A fresh [`Transcript`] is created per pass. Leaf elements push pending
//! fragments; message elements pack everything pending into one finalized
//! message tagged with their role. Fragments still pending when the pass ends
//! never reach the client, and messages whose fragment list ended up empty are
//! dropped by [`Transcript::finish`].

use tracing::trace;

use crate::message::{ChatMessage, ContentPart, Role};

/// Ordered buffer of pending fragments plus the messages packed so far.
#[derive(Clone, Debug, Default)]
pub struct Transcript {
    pending: Vec<ContentPart>,
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the pending buffer.
    pub fn push(&mut self, part: ContentPart) {
        self.pending.push(part);
    }

    /// Drain all pending fragments into one finalized message of `role`.
    pub fn pack(&mut self, role: Role) {
        // Closed enumeration: a new role variant must be handled here before
        // it can be packed.
        match role {
            Role::System | Role::User | Role::Assistant | Role::Developer => {}
        }
        let content = std::mem::take(&mut self.pending);
        trace!(?role, fragments = content.len(), "pack message");
        self.messages.push(ChatMessage { role, content });
    }

    /// Messages packed so far, in order.
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Fragments pushed but not yet packed.
    pub fn pending(&self) -> &[ContentPart] {
        &self.pending
    }

    /// Finish the pass: the ordered message list with empty messages dropped.
    pub fn finish(self) -> Vec<ChatMessage> {
        self.messages
            .into_iter()
            .filter(|message| !message.content.is_empty())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_drains_pending_in_order() {
        let mut transcript = Transcript::new();
        transcript.push(ContentPart::text("a"));
        transcript.push(ContentPart::text("b"));
        transcript.pack(Role::User);

        assert!(transcript.pending().is_empty());
        assert_eq!(transcript.messages().len(), 1);
        assert_eq!(transcript.messages()[0].role, Role::User);
        assert_eq!(transcript.messages()[0].text(), "ab");
    }

    #[test]
    fn pack_with_nothing_pending_produces_an_empty_message() {
        let mut transcript = Transcript::new();
        transcript.pack(Role::System);
        assert_eq!(transcript.messages().len(), 1);
        assert!(transcript.messages()[0].content.is_empty());
    }

    #[test]
    fn finish_drops_empty_messages_and_trailing_pending() {
        let mut transcript = Transcript::new();
        transcript.pack(Role::System);
        transcript.push(ContentPart::text("kept"));
        transcript.pack(Role::User);
        transcript.push(ContentPart::text("never packed"));

        let messages = transcript.finish();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text(), "kept");
    }
}
