//! Scripted chat client for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::{ChatClient, Completion, RespondOptions};
use crate::error::WeftError;
use crate::message::ChatMessage;

/// Chat client that replays scripted completions in order and records every
/// request it receives.
///
/// [`MockClient::push_gate`] queues a gate for the next call: the call records
/// its request, then parks until the returned [`Notify`] handle is notified.
/// Useful for observing the session lock from the outside.
#[derive(Default)]
pub struct MockClient {
    replies: Mutex<VecDeque<Completion>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
    gates: Mutex<VecDeque<Arc<Notify>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a completion to return for a future call.
    pub async fn push_reply(&self, completion: Completion) {
        self.replies.lock().await.push_back(completion);
    }

    /// Queue a plain-text completion.
    pub async fn push_text(&self, text: &str) {
        self.push_reply(Completion::from_text(text)).await;
    }

    /// Queue a gate: the next call blocks after recording its request until
    /// the returned handle is notified.
    pub async fn push_gate(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates.lock().await.push_back(gate.clone());
        gate
    }

    /// All message lists received so far, in call order.
    pub async fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl ChatClient for MockClient {
    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        _options: &RespondOptions,
    ) -> Result<Completion, WeftError> {
        self.requests.lock().await.push(messages.to_vec());
        let gate = self.gates.lock().await.pop_front();
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.replies
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| WeftError::client("mock client has no scripted reply left"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn replies_are_returned_in_fifo_order() {
        let client = MockClient::new();
        client.push_text("one").await;
        client.push_text("two").await;

        let options = RespondOptions::default();
        assert_eq!(client.complete_chat(&[], &options).await.unwrap().text(), "one");
        assert_eq!(client.complete_chat(&[], &options).await.unwrap().text(), "two");
        assert!(matches!(
            client.complete_chat(&[], &options).await,
            Err(WeftError::Client(_))
        ));
    }
}
