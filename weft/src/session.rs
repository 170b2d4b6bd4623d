//! Top-level conversation session.
//!
//! A [`Session`] owns the live element tree behind a single async lock. Each
//! `respond` call takes the lock for its whole cycle: reconcile the root
//! against the current root prompt, run one compile pass, send the resulting
//! messages to the chat client, return the completion. Overlapping calls
//! queue on the lock; reconciliation of the second call starts only after the
//! first releases it.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::debug;

use crate::client::{ChatClient, Completion, CompletionDelta, RespondOptions};
use crate::error::WeftError;
use crate::prompt::Prompt;
use crate::tree::pass::Pass;
use crate::tree::Tree;

/// Everything a pass mutates, kept together behind the session lock.
pub(crate) struct SessionState {
    pub(crate) tree: Tree,
    pub(crate) root_prompt: Prompt,
    pub(crate) data: HashMap<String, serde_json::Value>,
}

impl SessionState {
    pub(crate) fn new(root_prompt: Prompt) -> Self {
        SessionState {
            tree: Tree::new(),
            root_prompt,
            data: HashMap::new(),
        }
    }
}

/// A long-lived conversation bound to a root prompt and a chat client.
///
/// The root element is mounted lazily on the first respond and persists
/// across calls, so consecutive responds reconcile incrementally instead of
/// rebuilding the tree.
pub struct Session {
    client: Arc<dyn ChatClient>,
    state: Mutex<SessionState>,
}

impl Session {
    pub fn new(root: Prompt, client: Arc<dyn ChatClient>) -> Self {
        Session {
            client,
            state: Mutex::new(SessionState::new(root)),
        }
    }

    /// Run one full respond cycle and return the model's completion.
    pub async fn respond(&self, options: RespondOptions) -> Result<Completion, WeftError> {
        let mut state = self.state.lock().await;
        let mut pass = Pass {
            state: &mut *state,
            client: self.client.as_ref(),
        };
        pass.sync_root().await?;
        let messages = pass.assemble().await?;
        debug!(messages = messages.len(), "respond");
        self.client.complete_chat(&messages, &options).await
    }

    /// Streaming variant of [`Session::respond`]: content deltas are sent
    /// through `delta_tx` as they arrive, and the complete completion is
    /// still returned at the end.
    pub async fn respond_streaming(
        &self,
        options: RespondOptions,
        delta_tx: mpsc::Sender<CompletionDelta>,
    ) -> Result<Completion, WeftError> {
        let mut state = self.state.lock().await;
        let mut pass = Pass {
            state: &mut *state,
            client: self.client.as_ref(),
        };
        pass.sync_root().await?;
        let messages = pass.assemble().await?;
        debug!(messages = messages.len(), "respond (streaming)");
        self.client
            .complete_chat_streaming(&messages, &options, delta_tx)
            .await
    }

    /// Whether a respond cycle currently holds the session lock.
    pub fn is_running(&self) -> bool {
        self.state.try_lock().is_err()
    }

    /// Replace the root prompt. Takes effect on the next respond, which
    /// reconciles the mounted root against it (updating in place when
    /// similar, otherwise unmounting and remounting).
    pub async fn set_root(&self, root: Prompt) {
        self.state.lock().await.root_prompt = root;
    }

    /// Set an ambient data value, readable from build functions.
    pub async fn insert_data(&self, key: impl Into<String>, value: serde_json::Value) {
        self.state.lock().await.data.insert(key.into(), value);
    }

    /// Read an ambient data value.
    pub async fn data(&self, key: &str) -> Option<serde_json::Value> {
        self.state.lock().await.data.get(key).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::MockClient;
    use crate::message::Role;

    #[tokio::test]
    async fn respond_groups_fragments_into_messages() {
        let client = Arc::new(MockClient::new());
        client.push_text("ok").await;

        let root = Prompt::sequence(vec![
            Prompt::system(vec![Prompt::line("be terse")]),
            Prompt::user(vec![Prompt::text("a"), Prompt::text("b")]),
        ]);
        let session = Session::new(root, client.clone());

        let completion = session.respond(RespondOptions::default()).await.unwrap();
        assert_eq!(completion.text(), "ok");

        let requests = client.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].len(), 2);
        assert_eq!(requests[0][0].role, Role::System);
        assert_eq!(requests[0][0].text(), "be terse\n");
        assert_eq!(requests[0][1].role, Role::User);
        assert_eq!(requests[0][1].text(), "ab");
    }

    #[tokio::test]
    async fn consecutive_responds_reuse_the_root_element() {
        let client = Arc::new(MockClient::new());
        client.push_text("one").await;
        client.push_text("two").await;

        let session = Session::new(Prompt::user(vec![Prompt::text("hi")]), client.clone());
        session.respond(RespondOptions::default()).await.unwrap();
        session.respond(RespondOptions::default()).await.unwrap();

        let requests = client.requests().await;
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0], requests[1]);
    }

    #[tokio::test]
    async fn set_root_reconciles_on_the_next_respond() {
        let client = Arc::new(MockClient::new());
        client.push_text("one").await;
        client.push_text("two").await;

        let session = Session::new(Prompt::user(vec![Prompt::text("first")]), client.clone());
        session.respond(RespondOptions::default()).await.unwrap();

        session
            .set_root(Prompt::user(vec![Prompt::text("second")]))
            .await;
        session.respond(RespondOptions::default()).await.unwrap();

        let requests = client.requests().await;
        assert_eq!(requests[1][0].text(), "second");
    }

    #[tokio::test]
    async fn predicate_sees_the_transcript_prefix_and_final_request_sees_its_child() {
        let client = Arc::new(MockClient::new());
        client.push_text(r#"{"result": true}"#).await;
        client.push_text("done").await;

        let root = Prompt::sequence(vec![
            Prompt::system(vec![Prompt::line("sys")]),
            Prompt::predicate("Is the sky blue?", |result| {
                Some(Prompt::assistant(vec![Prompt::text(if result {
                    "yes"
                } else {
                    "no"
                })]))
            }),
            Prompt::user(vec![Prompt::text("so?")]),
        ]);
        let session = Session::new(root, client.clone());
        session.respond(RespondOptions::default()).await.unwrap();

        let requests = client.requests().await;
        assert_eq!(requests.len(), 2);

        // Nested request: the prefix compiled so far plus the question, but
        // never the later sibling.
        let nested = &requests[0];
        assert_eq!(nested.len(), 2);
        assert_eq!(nested[0].role, Role::System);
        assert_eq!(nested[1].role, Role::User);
        assert_eq!(
            nested[1].text(),
            "Answer this question with true or false: Is the sky blue?\n"
        );

        // Final request: the predicate's child in place, question gone.
        let full = &requests[1];
        assert_eq!(full.len(), 3);
        assert_eq!(full[1].role, Role::Assistant);
        assert_eq!(full[1].text(), "yes");
        assert_eq!(full[2].role, Role::User);
        assert_eq!(full[2].text(), "so?");
    }

    #[tokio::test]
    async fn out_of_range_choice_fails_the_whole_respond() {
        let client = Arc::new(MockClient::new());
        client.push_text(r#"{"choice": 5}"#).await;

        let root = Prompt::select(
            "pick a color",
            vec!["red".to_string(), "green".to_string(), "blue".to_string()],
            |index| Some(Prompt::user(vec![Prompt::text(format!("picked {index}"))])),
        );
        let session = Session::new(root, client.clone());

        let err = session.respond(RespondOptions::default()).await.unwrap_err();
        assert!(matches!(
            err,
            WeftError::ChoiceOutOfRange { index: 5, count: 3 }
        ));
    }

    #[tokio::test]
    async fn multi_select_passes_all_validated_indices() {
        let client = Arc::new(MockClient::new());
        client.push_text(r#"{"choices": [2, 0]}"#).await;
        client.push_text("done").await;

        let root = Prompt::multi_select(
            "pick flavors",
            vec!["salt".to_string(), "sour".to_string(), "sweet".to_string()],
            |indices| {
                Some(Prompt::user(vec![Prompt::text(format!(
                    "picked {indices:?}"
                ))]))
            },
        );
        let session = Session::new(root, client.clone());
        session.respond(RespondOptions::default()).await.unwrap();

        let requests = client.requests().await;
        assert_eq!(requests[1][0].text(), "picked [2, 0]");
    }

    #[tokio::test]
    async fn overlapping_responds_serialize_on_the_session_lock() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let client = Arc::new(MockClient::new());
        let gate = client.push_gate().await;
        client.push_text("one").await;
        client.push_text("two").await;

        let builds = Arc::new(AtomicUsize::new(0));
        let counter = builds.clone();
        let root = Prompt::builder(move |_cx| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Some(Prompt::user(vec![Prompt::text("hi")])))
        });
        let session = Arc::new(Session::new(root, client.clone()));

        let first = tokio::spawn({
            let session = session.clone();
            async move { session.respond(RespondOptions::default()).await }
        });
        // Wait for the first call to reach the (gated) client.
        while client.requests().await.is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(session.is_running());
        assert_eq!(builds.load(Ordering::SeqCst), 1);

        let second = tokio::spawn({
            let session = session.clone();
            async move { session.respond(RespondOptions::default()).await }
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        // The second call's reconciliation has not started: it is queued on
        // the lock, not past it.
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert_eq!(client.requests().await.len(), 1);

        gate.notify_one();
        assert_eq!(first.await.unwrap().unwrap().text(), "one");
        assert_eq!(second.await.unwrap().unwrap().text(), "two");
        assert_eq!(builds.load(Ordering::SeqCst), 2);
        assert_eq!(client.requests().await.len(), 2);
        assert!(!session.is_running());
    }

    #[tokio::test]
    async fn builders_read_ambient_session_data() {
        let client = Arc::new(MockClient::new());
        client.push_text("ok").await;

        let root = Prompt::builder(|cx| {
            let name = cx
                .data("user_name")
                .and_then(|value| value.as_str().map(str::to_string))
                .ok_or_else(|| WeftError::Build("user_name not set".to_string()))?;
            Ok(Some(Prompt::user(vec![Prompt::text(format!("I am {name}."))])))
        });
        let session = Session::new(root, client.clone());
        session
            .insert_data("user_name", serde_json::json!("Ada"))
            .await;

        session.respond(RespondOptions::default()).await.unwrap();
        assert_eq!(client.requests().await[0][0].text(), "I am Ada.");
    }

    #[tokio::test]
    async fn respond_streaming_forwards_deltas() {
        let client = Arc::new(MockClient::new());
        client.push_text("streamed").await;

        let session = Session::new(Prompt::user(vec![Prompt::text("hi")]), client);
        let (tx, mut rx) = mpsc::channel(2);
        let completion = session
            .respond_streaming(RespondOptions::default(), tx)
            .await
            .unwrap();

        assert_eq!(completion.text(), "streamed");
        assert_eq!(rx.recv().await.unwrap().content, "streamed");
    }
}
