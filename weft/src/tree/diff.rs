//! Child reconciliation: matching live elements against freshly declared
//! prompts.
//!
//! Reuse is driven by similarity (kind plus key), never structural equality.
//! Multi-child lists are matched by a first-fit scan with one-to-one
//! consumption: each old element can satisfy at most one new prompt, and
//! whatever is left over is unmounted.

use crate::error::WeftError;
use crate::prompt::Prompt;
use crate::tree::pass::Pass;
use crate::tree::ElementId;

impl Pass<'_> {
    /// Reconcile a single child slot against an optional new prompt.
    pub(crate) async fn update_child(
        &mut self,
        old: Option<ElementId>,
        new: Option<Prompt>,
        parent: ElementId,
    ) -> Result<Option<ElementId>, WeftError> {
        match (old, new) {
            (None, None) => Ok(None),
            (None, Some(prompt)) => Ok(Some(self.mount(prompt, Some(parent)).await?)),
            (Some(old), None) => {
                self.unmount(old).await?;
                Ok(None)
            }
            (Some(old), Some(prompt)) => {
                if self.bound_similar(old, &prompt) {
                    self.update(old, prompt).await?;
                    Ok(Some(old))
                } else {
                    self.unmount(old).await?;
                    Ok(Some(self.mount(prompt, Some(parent)).await?))
                }
            }
        }
    }

    /// Reconcile an ordered child list against freshly declared prompts.
    ///
    /// For each new prompt, the first unconsumed similar old element is
    /// updated and moved to the prompt's position; prompts with no match
    /// mount new elements. Old elements left unconsumed are unmounted.
    pub(crate) async fn update_children(
        &mut self,
        old: Vec<ElementId>,
        new: Vec<Prompt>,
        parent: ElementId,
    ) -> Result<Vec<ElementId>, WeftError> {
        let mut consumed = vec![false; old.len()];
        let mut result = Vec::with_capacity(new.len());

        for prompt in new {
            let matched = old
                .iter()
                .enumerate()
                .find(|(index, id)| !consumed[*index] && self.bound_similar(**id, &prompt))
                .map(|(index, id)| (index, *id));
            match matched {
                Some((index, id)) => {
                    consumed[index] = true;
                    self.update(id, prompt).await?;
                    result.push(id);
                }
                None => result.push(self.mount(prompt, Some(parent)).await?),
            }
        }

        for (index, id) in old.into_iter().enumerate() {
            if !consumed[index] {
                self.unmount(id).await?;
            }
        }
        Ok(result)
    }

    fn bound_similar(&self, id: ElementId, prompt: &Prompt) -> bool {
        self.state
            .tree
            .get(id)
            .prompt
            .as_ref()
            .is_some_and(|bound| Prompt::similar(bound, prompt))
    }
}
