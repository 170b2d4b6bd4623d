//! Live element tree: the mutable instances bound to prompt descriptors.
//!
//! Elements live in an arena owned by the session and refer to each other by
//! index. Ownership runs strictly downward (parents hold child ids in their
//! bodies); the `parent` back-reference is a plain index used only for upward
//! queries, never an ownership edge. Unmounted elements stay allocated for
//! the session's lifetime — the lifecycle is terminal, an element never
//! remounts.

pub(crate) mod diff;
pub(crate) mod pass;

use crate::prompt::{Prompt, PromptKind};
use crate::state::StateCell;

/// Arena index of an element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ElementId(usize);

impl ElementId {
    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle phase: created → mounted → unmounted, terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Created,
    Mounted,
    Unmounted,
}

/// Kind-shaped storage of an element.
pub(crate) enum Body {
    /// Cached content fragments of a leaf kind.
    Leaf { parts: Vec<crate::message::ContentPart> },
    /// Single child slot (visibility).
    Single { child: Option<ElementId> },
    /// Ordered child list (sequence, message).
    Multi { children: Vec<ElementId> },
    /// Child produced by a stateless build closure.
    Built { child: Option<ElementId> },
    /// State container plus the child its build produced. The cell is taken
    /// out while its hooks run, so it sits behind an `Option`.
    Stateful {
        cell: Option<StateCell>,
        child: Option<ElementId>,
    },
    /// Child reconciled on every compile by an async build.
    Async { child: Option<ElementId> },
}

impl Body {
    fn for_kind(kind: &PromptKind) -> Body {
        match kind {
            PromptKind::Text(_) | PromptKind::Image(_) => Body::Leaf { parts: Vec::new() },
            PromptKind::Sequence(_) | PromptKind::Message { .. } => {
                Body::Multi { children: Vec::new() }
            }
            PromptKind::Visibility { .. } => Body::Single { child: None },
            PromptKind::Builder(_) => Body::Built { child: None },
            PromptKind::Stateful(_) => Body::Stateful {
                cell: None,
                child: None,
            },
            PromptKind::Async(_)
            | PromptKind::Predicate(_)
            | PromptKind::Select(_)
            | PromptKind::MultiSelect(_) => Body::Async { child: None },
        }
    }
}

/// One live instance bound to a prompt descriptor.
pub(crate) struct Element {
    pub(crate) phase: Phase,
    /// Set while a nested response issued on this element's behalf is
    /// pending; a frozen element's compile is a no-op.
    pub(crate) frozen: bool,
    pub(crate) parent: Option<ElementId>,
    /// Bound descriptor; `Some` exactly while mounted (and during mount).
    pub(crate) prompt: Option<Prompt>,
    pub(crate) body: Body,
}

/// Arena of elements plus the root, owned by the session behind its lock.
#[derive(Default)]
pub(crate) struct Tree {
    elements: Vec<Element>,
    root: Option<ElementId>,
}

impl Tree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn alloc(&mut self, prompt: &Prompt, parent: Option<ElementId>) -> ElementId {
        let id = ElementId(self.elements.len());
        self.elements.push(Element {
            phase: Phase::Created,
            frozen: false,
            parent,
            prompt: None,
            body: Body::for_kind(&prompt.kind),
        });
        id
    }

    pub(crate) fn get(&self, id: ElementId) -> &Element {
        &self.elements[id.0]
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> &mut Element {
        &mut self.elements[id.0]
    }

    pub(crate) fn root(&self) -> Option<ElementId> {
        self.root
    }

    pub(crate) fn set_root(&mut self, id: ElementId) {
        self.root = Some(id);
    }
}
