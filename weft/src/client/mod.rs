//! Chat client abstraction.
//!
//! The session talks to the language-model service exclusively through the
//! [`ChatClient`] trait; the crate ships no wire implementation. [`MockClient`]
//! provides a scripted implementation for tests.
//!
//! # Streaming
//!
//! Streaming follows the chunk-sender shape: `complete_chat_streaming` accepts
//! an `mpsc::Sender<CompletionDelta>` and still returns the complete
//! [`Completion`] at the end. The default implementation calls
//! `complete_chat` and forwards the full text as a single delta.

mod mock;

pub use mock::MockClient;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WeftError;
use crate::message::{ChatMessage, ContentPart};

/// Constraint on the shape of the model response.
#[derive(Clone, Debug, PartialEq)]
pub enum ResponseFormat {
    /// Request a response constrained to the given JSON schema.
    JsonSchema { name: String, schema: Value },
}

impl ResponseFormat {
    pub fn json_schema(name: impl Into<String>, schema: Value) -> Self {
        ResponseFormat::JsonSchema {
            name: name.into(),
            schema,
        }
    }
}

/// Per-call options, passed through to the client boundary.
///
/// `cancel` is opaque to the core: the session never inspects it, it only
/// hands it to the client, which may abort the outward call.
#[derive(Clone, Debug, Default)]
pub struct RespondOptions {
    pub response_format: Option<ResponseFormat>,
    pub cancel: Option<CancellationToken>,
}

/// Response from one chat completion.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Completion {
    pub content: Vec<ContentPart>,
}

impl Completion {
    pub fn from_text(text: impl Into<String>) -> Self {
        Completion {
            content: vec![ContentPart::text(text)],
        }
    }

    /// Concatenated text of all text fragments.
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

/// One incremental content delta of a streaming completion.
#[derive(Clone, Debug)]
pub struct CompletionDelta {
    pub content: String,
}

/// Chat client: given an ordered message list, returns a completion.
///
/// External failures (network, quota, malformed output) are reported as
/// [`WeftError::Client`] and propagate to the caller of `respond` untouched;
/// the core neither retries nor recovers.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One-shot completion.
    async fn complete_chat(
        &self,
        messages: &[ChatMessage],
        options: &RespondOptions,
    ) -> Result<Completion, WeftError>;

    /// Streaming variant: send content deltas through `delta_tx` as they
    /// arrive, then return the complete response.
    ///
    /// Default implementation performs a one-shot call and forwards the full
    /// text as a single delta (skipped when empty).
    async fn complete_chat_streaming(
        &self,
        messages: &[ChatMessage],
        options: &RespondOptions,
        delta_tx: mpsc::Sender<CompletionDelta>,
    ) -> Result<Completion, WeftError> {
        let completion = self.complete_chat(messages, options).await?;
        let text = completion.text();
        if !text.is_empty() {
            let _ = delta_tx.send(CompletionDelta { content: text }).await;
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubClient {
        content: String,
    }

    #[async_trait]
    impl ChatClient for StubClient {
        async fn complete_chat(
            &self,
            _messages: &[ChatMessage],
            _options: &RespondOptions,
        ) -> Result<Completion, WeftError> {
            Ok(Completion::from_text(self.content.clone()))
        }
    }

    #[tokio::test]
    async fn default_streaming_sends_single_delta() {
        let client = StubClient {
            content: "hello".to_string(),
        };
        let (tx, mut rx) = mpsc::channel(2);
        let completion = client
            .complete_chat_streaming(&[], &RespondOptions::default(), tx)
            .await
            .unwrap();
        assert_eq!(completion.text(), "hello");
        let delta = rx.recv().await.expect("one delta");
        assert_eq!(delta.content, "hello");
    }

    #[tokio::test]
    async fn default_streaming_skips_delta_for_empty_content() {
        let client = StubClient {
            content: String::new(),
        };
        let (tx, mut rx) = mpsc::channel(2);
        let completion = client
            .complete_chat_streaming(&[], &RespondOptions::default(), tx)
            .await
            .unwrap();
        assert!(completion.text().is_empty());
        assert!(rx.try_recv().is_err());
    }
}
