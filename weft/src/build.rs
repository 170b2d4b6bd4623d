//! Build context handed to build functions.
//!
//! [`BuildCx`] is the capability object a build function sees: ancestor
//! lookup over the non-owning parent links, the session's ambient data, and —
//! for async builds running inside a compile pass — the nested-response
//! operation.
//!
//! # Nested responses
//!
//! [`BuildCx::respond`] runs *inside* an already-locked compile pass and
//! deliberately does NOT touch the session lock; re-acquiring it there would
//! deadlock against the very call that triggered the build. The only
//! synchronization is the per-element `frozen` flag, which keeps the calling
//! element's own compile hook from re-entering while the round trip is
//! pending.

use async_trait::async_trait;
use std::sync::Arc;

use crate::client::{Completion, RespondOptions};
use crate::error::WeftError;
use crate::prompt::Prompt;
use crate::transcript::Transcript;
use crate::tree::pass::Pass;
use crate::tree::ElementId;

/// Stateless build closure, run at mount and on every update.
pub type BuildFn =
    Arc<dyn Fn(&BuildCx<'_, '_>) -> Result<Option<Prompt>, WeftError> + Send + Sync>;

/// Async build hook for control-flow nodes: re-invoked on every compile pass
/// with the build context (which carries the pass's live transcript).
///
/// The build may call [`BuildCx::respond`] any number of times before
/// returning; it must not touch the tree other than through its return value.
#[async_trait]
pub trait AsyncBuild: Send + Sync {
    async fn build(&self, cx: &mut BuildCx<'_, '_>) -> Result<Option<Prompt>, WeftError>;
}

/// Capability object passed to build functions.
pub struct BuildCx<'a, 'p> {
    pass: &'a mut Pass<'p>,
    element: ElementId,
    transcript: Option<&'a mut Transcript>,
}

impl<'a, 'p> BuildCx<'a, 'p> {
    pub(crate) fn new(
        pass: &'a mut Pass<'p>,
        element: ElementId,
        transcript: Option<&'a mut Transcript>,
    ) -> Self {
        BuildCx {
            pass,
            element,
            transcript,
        }
    }

    /// Walk the parent links upward and return the first ancestor prompt
    /// `select` accepts.
    pub fn find_ancestor<T>(&self, mut select: impl FnMut(&Prompt) -> Option<T>) -> Option<T> {
        let mut current = self.pass.state.tree.get(self.element).parent;
        while let Some(id) = current {
            let element = self.pass.state.tree.get(id);
            if let Some(found) = element.prompt.as_ref().and_then(&mut select) {
                return Some(found);
            }
            current = element.parent;
        }
        None
    }

    /// Read an ambient session data value.
    ///
    /// The data map is single-writer by convention: it is only protected by
    /// the session lock being held for the duration of a respond cycle.
    pub fn data(&self, key: &str) -> Option<serde_json::Value> {
        self.pass.state.data.get(key).cloned()
    }

    /// Write an ambient session data value.
    pub fn set_data(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.pass.state.data.insert(key.into(), value);
    }

    /// The pass's transcript so far, when building inside a compile pass.
    /// `None` for builds running at mount or update time.
    pub fn transcript(&self) -> Option<&Transcript> {
        self.transcript.as_deref()
    }

    /// Ask the model a question mid-build.
    ///
    /// Freezes the calling element, snapshots the messages accumulated so far
    /// in the current pass (already-packed messages plus this element's own
    /// pending fragments), optionally mounts `continuation` as an extra leaf
    /// under the caller and compiles it into the snapshot — so a trailing
    /// prompt can be appended without a permanent tree mutation — then sends
    /// the snapshot to the chat client. The element is unfrozen on the way
    /// out, on the error path too. Messages already packed are never
    /// reordered; the snapshot is prefix-consistent.
    pub async fn respond(
        &mut self,
        continuation: Option<Prompt>,
        options: RespondOptions,
    ) -> Result<Completion, WeftError> {
        let snapshot = match &self.transcript {
            Some(transcript) => (**transcript).clone(),
            None => Transcript::new(),
        };
        self.pass
            .nested_respond(self.element, continuation, snapshot, &options)
            .await
    }
}
