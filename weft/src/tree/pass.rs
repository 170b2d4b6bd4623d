//! One reconciliation/compile pass over the element tree.
//!
//! A [`Pass`] borrows the session state for the duration of one respond cycle
//! and carries the chat client so async builds can issue nested responses.
//! The recursive walks return boxed futures; recursion depth equals tree
//! depth, which is caller-controlled.

use futures::future::BoxFuture;
use tracing::{debug, trace};

use crate::build::BuildCx;
use crate::client::{ChatClient, Completion, RespondOptions};
use crate::control;
use crate::error::WeftError;
use crate::message::{ChatMessage, ContentPart};
use crate::prompt::{Prompt, PromptKind};
use crate::session::SessionState;
use crate::state::StateCell;
use crate::transcript::Transcript;
use crate::tree::{Body, ElementId, Phase};

pub(crate) struct Pass<'p> {
    pub(crate) state: &'p mut SessionState,
    pub(crate) client: &'p dyn ChatClient,
}

impl<'p> Pass<'p> {
    /// Reconcile the root element against the session's root prompt, mounting
    /// it on the first pass.
    pub(crate) async fn sync_root(&mut self) -> Result<(), WeftError> {
        let prompt = self.state.root_prompt.clone();
        match self.state.tree.root() {
            None => {
                let root = self.mount(prompt, None).await?;
                self.state.tree.set_root(root);
            }
            Some(root) => {
                let similar = self
                    .state
                    .tree
                    .get(root)
                    .prompt
                    .as_ref()
                    .is_some_and(|bound| Prompt::similar(bound, &prompt));
                if similar {
                    self.update(root, prompt).await?;
                } else {
                    self.unmount(root).await?;
                    let root = self.mount(prompt, None).await?;
                    self.state.tree.set_root(root);
                }
            }
        }
        Ok(())
    }

    /// Run one compile pass over the root and return the finished message
    /// list.
    pub(crate) async fn assemble(&mut self) -> Result<Vec<ChatMessage>, WeftError> {
        let root = self.state.tree.root().ok_or(WeftError::NoRoot)?;
        let mut transcript = Transcript::new();
        self.compile(root, &mut transcript).await?;
        let messages = transcript.finish();
        debug!(messages = messages.len(), "compile pass assembled");
        Ok(messages)
    }

    /// Allocate and mount an element for `prompt`.
    pub(crate) async fn mount(
        &mut self,
        prompt: Prompt,
        parent: Option<ElementId>,
    ) -> Result<ElementId, WeftError> {
        let id = self.state.tree.alloc(&prompt, parent);
        self.mount_element(id, prompt).await?;
        Ok(id)
    }

    /// Mount an allocated element: bind the prompt, run the kind's mount
    /// hook, then flip the phase. Fails unless the element is freshly
    /// created, which also rules out remounting.
    pub(crate) fn mount_element<'a>(
        &'a mut self,
        id: ElementId,
        prompt: Prompt,
    ) -> BoxFuture<'a, Result<(), WeftError>> {
        Box::pin(async move {
            {
                let element = self.state.tree.get_mut(id);
                if element.phase != Phase::Created {
                    return Err(WeftError::AlreadyMounted);
                }
                element.prompt = Some(prompt.clone());
            }
            trace!(element = id.index(), kind = prompt.kind_name(), "mount");

            match prompt.kind.clone() {
                PromptKind::Text(_) | PromptKind::Image(_) => {
                    let parts = prompt.leaf_parts();
                    self.set_cached_parts(id, parts);
                }
                PromptKind::Sequence(children) | PromptKind::Message { children, .. } => {
                    let mut ids = Vec::with_capacity(children.len());
                    for child in children {
                        ids.push(self.mount(child, Some(id)).await?);
                    }
                    self.set_multi_children(id, ids);
                }
                PromptKind::Visibility { child, .. } => {
                    if let Some(child) = child {
                        let child_id = self.mount(*child, Some(id)).await?;
                        self.set_child_slot(id, Some(child_id));
                    }
                }
                PromptKind::Builder(build) => {
                    let built = {
                        let cx = BuildCx::new(&mut *self, id, None);
                        build(&cx)?
                    };
                    if let Some(built) = built {
                        let child_id = self.mount(built, Some(id)).await?;
                        self.set_child_slot(id, Some(child_id));
                    }
                }
                PromptKind::Stateful(factory) => {
                    let mut cell = StateCell::new(factory());
                    cell.mount(&prompt).await?;
                    let built = {
                        let mut cx = BuildCx::new(&mut *self, id, None);
                        cell.build(&mut cx).await
                    };
                    self.put_state_cell(id, cell);
                    if let Some(built) = built? {
                        let child_id = self.mount(built, Some(id)).await?;
                        self.set_child_slot(id, Some(child_id));
                    }
                }
                // Async kinds build at compile time, not at mount.
                PromptKind::Async(_)
                | PromptKind::Predicate(_)
                | PromptKind::Select(_)
                | PromptKind::MultiSelect(_) => {}
            }

            self.state.tree.get_mut(id).phase = Phase::Mounted;
            Ok(())
        })
    }

    /// Update a mounted element in place with a similar prompt. Similarity is
    /// checked before any mutation, so a failed update leaves the element
    /// untouched.
    pub(crate) fn update<'a>(
        &'a mut self,
        id: ElementId,
        new_prompt: Prompt,
    ) -> BoxFuture<'a, Result<(), WeftError>> {
        Box::pin(async move {
            let old_prompt = {
                let element = self.state.tree.get(id);
                if element.phase != Phase::Mounted {
                    return Err(WeftError::NotMounted);
                }
                let bound = element.prompt.as_ref().ok_or(WeftError::NotMounted)?;
                if !Prompt::similar(bound, &new_prompt) {
                    return Err(WeftError::DissimilarPrompt);
                }
                bound.clone()
            };
            trace!(element = id.index(), kind = new_prompt.kind_name(), "update");

            match new_prompt.kind.clone() {
                PromptKind::Text(_) | PromptKind::Image(_) => {
                    if !Prompt::leaf_eq(&old_prompt, &new_prompt) {
                        let parts = new_prompt.leaf_parts();
                        self.set_cached_parts(id, parts);
                    }
                }
                PromptKind::Sequence(children) | PromptKind::Message { children, .. } => {
                    let old_children = self.multi_children(id);
                    let new_children = self.update_children(old_children, children, id).await?;
                    self.set_multi_children(id, new_children);
                }
                PromptKind::Visibility { child, .. } => {
                    let old_child = self.child_slot(id);
                    let new_child = self
                        .update_child(old_child, child.map(|child| *child), id)
                        .await?;
                    self.set_child_slot(id, new_child);
                }
                PromptKind::Builder(build) => {
                    let built = {
                        let cx = BuildCx::new(&mut *self, id, None);
                        build(&cx)?
                    };
                    let old_child = self.child_slot(id);
                    let new_child = self.update_child(old_child, built, id).await?;
                    self.set_child_slot(id, new_child);
                }
                PromptKind::Stateful(_) => {
                    // The state survives; its build does not re-run. The
                    // child slot is reconciled against the incoming
                    // descriptor itself, so re-building on update is the
                    // state's own move, never implicit.
                    let mut cell = self.take_state_cell(id);
                    let updated = cell.update(&new_prompt).await;
                    self.put_state_cell(id, cell);
                    updated?;
                    let old_child = self.child_slot(id);
                    let new_child = self
                        .update_child(old_child, Some(new_prompt.clone()), id)
                        .await?;
                    self.set_child_slot(id, new_child);
                }
                // Async kinds rebuild on the next compile pass anyway.
                PromptKind::Async(_)
                | PromptKind::Predicate(_)
                | PromptKind::Select(_)
                | PromptKind::MultiSelect(_) => {}
            }

            self.state.tree.get_mut(id).prompt = Some(new_prompt);
            Ok(())
        })
    }

    /// Unmount a mounted element and its subtree. Terminal: the element can
    /// never be mounted again.
    pub(crate) fn unmount<'a>(&'a mut self, id: ElementId) -> BoxFuture<'a, Result<(), WeftError>> {
        Box::pin(async move {
            if self.state.tree.get(id).phase != Phase::Mounted {
                return Err(WeftError::NotMounted);
            }
            trace!(element = id.index(), "unmount");

            if matches!(self.state.tree.get(id).body, Body::Stateful { .. }) {
                let mut cell = self.take_state_cell(id);
                let unmounted = cell.unmount().await;
                self.put_state_cell(id, cell);
                unmounted?;
            }
            for child in self.body_children(id) {
                self.unmount(child).await?;
            }

            let element = self.state.tree.get_mut(id);
            element.prompt = None;
            element.phase = Phase::Unmounted;
            Ok(())
        })
    }

    /// Compile a mounted element into the transcript. Frozen elements are
    /// skipped without error.
    pub(crate) fn compile<'a>(
        &'a mut self,
        id: ElementId,
        transcript: &'a mut Transcript,
    ) -> BoxFuture<'a, Result<(), WeftError>> {
        Box::pin(async move {
            let kind = {
                let element = self.state.tree.get(id);
                if element.phase != Phase::Mounted {
                    return Err(WeftError::NotMounted);
                }
                if element.frozen {
                    return Ok(());
                }
                let prompt = element.prompt.as_ref().ok_or(WeftError::NotMounted)?;
                prompt.kind.clone()
            };

            match kind {
                PromptKind::Text(_) | PromptKind::Image(_) => {
                    for part in self.cached_parts(id) {
                        transcript.push(part);
                    }
                }
                PromptKind::Sequence(_) => {
                    for child in self.multi_children(id) {
                        self.compile(child, &mut *transcript).await?;
                    }
                }
                PromptKind::Message { role, .. } => {
                    for child in self.multi_children(id) {
                        self.compile(child, &mut *transcript).await?;
                    }
                    transcript.pack(role);
                }
                PromptKind::Visibility { visible, .. } => {
                    if visible {
                        if let Some(child) = self.child_slot(id) {
                            self.compile(child, &mut *transcript).await?;
                        }
                    }
                }
                PromptKind::Builder(_) | PromptKind::Stateful(_) => {
                    if let Some(child) = self.child_slot(id) {
                        self.compile(child, &mut *transcript).await?;
                    }
                }
                kind @ (PromptKind::Async(_)
                | PromptKind::Predicate(_)
                | PromptKind::Select(_)
                | PromptKind::MultiSelect(_)) => {
                    self.compile_async(id, kind, transcript).await?;
                }
            }
            Ok(())
        })
    }

    /// Compile an async-build element: run the build (which may issue nested
    /// responses against the transcript so far), reconcile the child slot
    /// against its result, then compile the child.
    async fn compile_async(
        &mut self,
        id: ElementId,
        kind: PromptKind,
        transcript: &mut Transcript,
    ) -> Result<(), WeftError> {
        let built = {
            let mut cx = BuildCx::new(&mut *self, id, Some(&mut *transcript));
            match kind {
                PromptKind::Async(build) => build.build(&mut cx).await?,
                PromptKind::Predicate(node) => control::build_predicate(&node, &mut cx).await?,
                PromptKind::Select(node) => control::build_select(&node, &mut cx).await?,
                PromptKind::MultiSelect(node) => {
                    control::build_multi_select(&node, &mut cx).await?
                }
                _ => unreachable!("compile_async dispatched with a non-async kind"),
            }
        };
        let old_child = self.child_slot(id);
        let new_child = self.update_child(old_child, built, id).await?;
        self.set_child_slot(id, new_child);
        if let Some(child) = new_child {
            self.compile(child, transcript).await?;
        }
        Ok(())
    }

    /// Issue a model call on behalf of `caller` mid-pass, against a snapshot
    /// of the transcript so far. The caller stays frozen for the duration so
    /// its own compile hook cannot re-enter; it is unfrozen on the error path
    /// too. The session lock is not touched here.
    pub(crate) async fn nested_respond(
        &mut self,
        caller: ElementId,
        continuation: Option<Prompt>,
        snapshot: Transcript,
        options: &RespondOptions,
    ) -> Result<Completion, WeftError> {
        self.state.tree.get_mut(caller).frozen = true;
        let result = self
            .nested_exchange(caller, continuation, snapshot, options)
            .await;
        self.state.tree.get_mut(caller).frozen = false;
        result
    }

    async fn nested_exchange(
        &mut self,
        caller: ElementId,
        continuation: Option<Prompt>,
        mut snapshot: Transcript,
        options: &RespondOptions,
    ) -> Result<Completion, WeftError> {
        if let Some(continuation) = continuation {
            // The continuation is mounted under the caller but never wired
            // into a body slot: it compiles into the snapshot only, leaving
            // the durable tree untouched.
            let child = self.mount(continuation, Some(caller)).await?;
            self.compile(child, &mut snapshot).await?;
        }
        let messages = snapshot.finish();
        debug!(
            caller = caller.index(),
            messages = messages.len(),
            "nested respond"
        );
        self.client.complete_chat(&messages, options).await
    }

    // Body accessors. The body variant is fixed by the prompt kind at
    // allocation, so a mismatch is impossible by construction.

    fn cached_parts(&self, id: ElementId) -> Vec<ContentPart> {
        match &self.state.tree.get(id).body {
            Body::Leaf { parts } => parts.clone(),
            _ => unreachable!("leaf body expected"),
        }
    }

    fn set_cached_parts(&mut self, id: ElementId, parts: Vec<ContentPart>) {
        match &mut self.state.tree.get_mut(id).body {
            Body::Leaf { parts: slot } => *slot = parts,
            _ => unreachable!("leaf body expected"),
        }
    }

    pub(crate) fn multi_children(&self, id: ElementId) -> Vec<ElementId> {
        match &self.state.tree.get(id).body {
            Body::Multi { children } => children.clone(),
            _ => unreachable!("multi-child body expected"),
        }
    }

    fn set_multi_children(&mut self, id: ElementId, children: Vec<ElementId>) {
        match &mut self.state.tree.get_mut(id).body {
            Body::Multi { children: slot } => *slot = children,
            _ => unreachable!("multi-child body expected"),
        }
    }

    pub(crate) fn child_slot(&self, id: ElementId) -> Option<ElementId> {
        match &self.state.tree.get(id).body {
            Body::Single { child } | Body::Built { child } | Body::Async { child } => *child,
            Body::Stateful { child, .. } => *child,
            _ => unreachable!("single-child body expected"),
        }
    }

    fn set_child_slot(&mut self, id: ElementId, child: Option<ElementId>) {
        match &mut self.state.tree.get_mut(id).body {
            Body::Single { child: slot }
            | Body::Built { child: slot }
            | Body::Async { child: slot } => *slot = child,
            Body::Stateful { child: slot, .. } => *slot = child,
            _ => unreachable!("single-child body expected"),
        }
    }

    fn body_children(&self, id: ElementId) -> Vec<ElementId> {
        match &self.state.tree.get(id).body {
            Body::Leaf { .. } => Vec::new(),
            Body::Multi { children } => children.clone(),
            Body::Single { child } | Body::Built { child } | Body::Async { child } => {
                child.iter().copied().collect()
            }
            Body::Stateful { child, .. } => child.iter().copied().collect(),
        }
    }

    fn take_state_cell(&mut self, id: ElementId) -> StateCell {
        match &mut self.state.tree.get_mut(id).body {
            Body::Stateful { cell, .. } => match cell.take() {
                Some(cell) => cell,
                None => unreachable!("state cell taken re-entrantly"),
            },
            _ => unreachable!("stateful body expected"),
        }
    }

    fn put_state_cell(&mut self, id: ElementId, cell: StateCell) {
        match &mut self.state.tree.get_mut(id).body {
            Body::Stateful { cell: slot, .. } => *slot = Some(cell),
            _ => unreachable!("stateful body expected"),
        }
    }
}
