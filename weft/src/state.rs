//! State containers for stateful nodes.
//!
//! A [`State`] is memory that outlives individual descriptor replacements: it
//! is created once when its element mounts, updated in place as similar
//! prompts replace each other, and unmounted exactly once with the element.
//! Build logic runs once at mount; updates never re-invoke it — re-building is
//! the state's own responsibility, not an implicit side effect.

use async_trait::async_trait;
use std::sync::Arc;

use crate::build::BuildCx;
use crate::error::WeftError;
use crate::prompt::Prompt;

/// Factory creating the state container for a stateful prompt at mount time.
pub type StateFactory = Arc<dyn Fn() -> Box<dyn State> + Send + Sync>;

/// User-defined state bound to a stateful element for its whole lifetime.
///
/// All hooks default to no-ops; `build` defaults to no child.
#[async_trait]
pub trait State: Send {
    /// Invoked once when the state is bound to its first prompt.
    async fn on_mount(&mut self, prompt: &Prompt) -> Result<(), WeftError> {
        let _ = prompt;
        Ok(())
    }

    /// Invoked when a similar prompt replaces the bound one.
    async fn on_update(&mut self, new_prompt: &Prompt) -> Result<(), WeftError> {
        let _ = new_prompt;
        Ok(())
    }

    /// Invoked once when the owning element unmounts.
    async fn on_unmount(&mut self) -> Result<(), WeftError> {
        Ok(())
    }

    /// Describe the content of the node. Runs once, at mount.
    async fn build(&mut self, cx: &mut BuildCx<'_, '_>) -> Result<Option<Prompt>, WeftError> {
        let _ = cx;
        Ok(None)
    }
}

/// Container tracking a state's lifecycle and bound prompt.
///
/// Mirrors the element contract: mounted at most once, updated only with a
/// similar prompt, unmount terminal.
pub(crate) struct StateCell {
    state: Box<dyn State>,
    mounted: bool,
    prompt: Option<Prompt>,
}

impl StateCell {
    pub(crate) fn new(state: Box<dyn State>) -> Self {
        StateCell {
            state,
            mounted: false,
            prompt: None,
        }
    }

    pub(crate) async fn mount(&mut self, prompt: &Prompt) -> Result<(), WeftError> {
        if self.mounted {
            return Err(WeftError::StateAlreadyMounted);
        }
        self.state.on_mount(prompt).await?;
        self.prompt = Some(prompt.clone());
        self.mounted = true;
        Ok(())
    }

    pub(crate) async fn update(&mut self, new_prompt: &Prompt) -> Result<(), WeftError> {
        if !self.mounted {
            return Err(WeftError::StateNotMounted);
        }
        let bound = self.prompt.as_ref().ok_or(WeftError::StateNotMounted)?;
        if !Prompt::similar(bound, new_prompt) {
            return Err(WeftError::DissimilarPrompt);
        }
        self.state.on_update(new_prompt).await?;
        self.prompt = Some(new_prompt.clone());
        Ok(())
    }

    pub(crate) async fn unmount(&mut self) -> Result<(), WeftError> {
        if !self.mounted {
            return Err(WeftError::StateNotMounted);
        }
        self.state.on_unmount().await?;
        self.prompt = None;
        self.mounted = false;
        Ok(())
    }

    pub(crate) async fn build(
        &mut self,
        cx: &mut BuildCx<'_, '_>,
    ) -> Result<Option<Prompt>, WeftError> {
        self.state.build(cx).await
    }
}
