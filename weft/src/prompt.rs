//! Prompt descriptors: the immutable values a conversation tree is declared
//! with.
//!
//! A [`Prompt`] describes one node — its kind, configuration, and an optional
//! identity [`Key`]. Descriptors are cheap to clone and never mutated; on each
//! respond the session reconciles the live element tree against the freshly
//! declared descriptors, reusing elements bound to *similar* prompts (same
//! kind, equal or absent key) and replacing the rest. Identity, not structural
//! equality, drives reuse, exactly like keyed-list diffing in retained-mode UI
//! runtimes.

use std::fmt;
use std::sync::Arc;

use crate::build::{AsyncBuild, BuildCx, BuildFn};
use crate::control::{MultiSelect, Predicate, Select};
use crate::error::WeftError;
use crate::message::{ContentPart, ImageDetail, Role};
use crate::state::{State, StateFactory};

/// Identity key for reconciliation. Two prompts of the same kind with equal
/// keys (or both without keys) are similar and update the same element.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

/// Text leaf configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextPrompt {
    pub content: String,
}

/// Image leaf source: by URI or inline bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageSource {
    Uri { uri: String },
    Bytes { bytes: Vec<u8>, media_type: String },
}

/// Image leaf configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePrompt {
    pub source: ImageSource,
    pub detail: ImageDetail,
}

impl ImagePrompt {
    pub fn uri(uri: impl Into<String>) -> Self {
        ImagePrompt {
            source: ImageSource::Uri { uri: uri.into() },
            detail: ImageDetail::Auto,
        }
    }

    /// Inline bytes. `media_type` must be a valid image MIME type; models
    /// tend to tolerate a mismatched one but may not identify the content.
    pub fn bytes(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        ImagePrompt {
            source: ImageSource::Bytes {
                bytes,
                media_type: media_type.into(),
            },
            detail: ImageDetail::Auto,
        }
    }

    /// Inline JPEG bytes, the default media type.
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        ImagePrompt::bytes(bytes, "image/jpeg")
    }

    pub fn with_detail(mut self, detail: ImageDetail) -> Self {
        self.detail = detail;
        self
    }

    pub(crate) fn to_part(&self) -> ContentPart {
        match &self.source {
            ImageSource::Uri { uri } => ContentPart::ImageUri {
                uri: uri.clone(),
                detail: self.detail,
            },
            ImageSource::Bytes { bytes, media_type } => ContentPart::ImageBytes {
                bytes: bytes.clone(),
                media_type: media_type.clone(),
                detail: self.detail,
            },
        }
    }
}

/// The concrete kind of a prompt node.
///
/// Kinds are tagged variants; the tree dispatches them to shared single-child
/// and multi-child diff routines instead of per-kind inheritance. Closure and
/// trait-object kinds (`Builder`, `Stateful`, `Async`) compare similar within
/// their variant — use keys to keep unrelated instances apart.
#[derive(Clone)]
pub enum PromptKind {
    /// Text leaf.
    Text(TextPrompt),
    /// Image leaf.
    Image(ImagePrompt),
    /// Ordered grouping of children.
    Sequence(Vec<Prompt>),
    /// Grouping that packs everything pending into one message of `role`
    /// after its children compile.
    Message { role: Role, children: Vec<Prompt> },
    /// Single child whose compile is skipped while `visible` is false. The
    /// child's lifecycle is unaffected by visibility; only the model's view
    /// is gated.
    Visibility {
        visible: bool,
        child: Option<Box<Prompt>>,
    },
    /// Stateless wrapper: the build closure runs once at mount and again on
    /// every update.
    Builder(BuildFn),
    /// Stateful wrapper: the factory creates a state container that outlives
    /// descriptor replacement.
    Stateful(StateFactory),
    /// Async-build node: the build runs on every compile pass and may issue
    /// nested responds.
    Async(Arc<dyn AsyncBuild>),
    /// Boolean control-flow node.
    Predicate(Predicate),
    /// Single-choice control-flow node.
    Select(Select),
    /// Multiple-choice control-flow node.
    MultiSelect(MultiSelect),
}

/// Immutable descriptor of one conversation-tree node.
#[derive(Clone)]
pub struct Prompt {
    pub key: Option<Key>,
    pub kind: PromptKind,
}

impl Prompt {
    fn new(kind: PromptKind) -> Self {
        Prompt { key: None, kind }
    }

    /// Attach an identity key.
    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Plain text leaf.
    pub fn text(content: impl Into<String>) -> Self {
        Prompt::new(PromptKind::Text(TextPrompt {
            content: content.into(),
        }))
    }

    /// A sentence: text followed by a separating space.
    pub fn sentence(content: impl Into<String>) -> Self {
        Prompt::text(format!("{} ", content.into()))
    }

    /// A line: text followed by a newline.
    pub fn line(content: impl Into<String>) -> Self {
        Prompt::text(format!("{}\n", content.into()))
    }

    /// A paragraph: text followed by a blank line.
    pub fn paragraph(content: impl Into<String>) -> Self {
        Prompt::text(format!("{}\n\n", content.into()))
    }

    /// Image leaf.
    pub fn image(image: ImagePrompt) -> Self {
        Prompt::new(PromptKind::Image(image))
    }

    /// Image leaf referenced by URI, detail `Auto`.
    pub fn image_uri(uri: impl Into<String>) -> Self {
        Prompt::image(ImagePrompt::uri(uri))
    }

    /// Image leaf with inline bytes, detail `Auto`.
    pub fn image_bytes(bytes: Vec<u8>, media_type: impl Into<String>) -> Self {
        Prompt::image(ImagePrompt::bytes(bytes, media_type))
    }

    /// Ordered grouping of children.
    pub fn sequence(children: Vec<Prompt>) -> Self {
        Prompt::new(PromptKind::Sequence(children))
    }

    /// Message grouping with an explicit role.
    pub fn message(role: Role, children: Vec<Prompt>) -> Self {
        Prompt::new(PromptKind::Message { role, children })
    }

    pub fn system(children: Vec<Prompt>) -> Self {
        Prompt::message(Role::System, children)
    }

    pub fn user(children: Vec<Prompt>) -> Self {
        Prompt::message(Role::User, children)
    }

    pub fn assistant(children: Vec<Prompt>) -> Self {
        Prompt::message(Role::Assistant, children)
    }

    pub fn developer(children: Vec<Prompt>) -> Self {
        Prompt::message(Role::Developer, children)
    }

    /// Visibility gate around an optional child.
    pub fn visibility(visible: bool, child: impl Into<Option<Prompt>>) -> Self {
        Prompt::new(PromptKind::Visibility {
            visible,
            child: child.into().map(Box::new),
        })
    }

    /// Stateless wrapper around a build closure.
    pub fn builder(
        build: impl Fn(&BuildCx<'_, '_>) -> Result<Option<Prompt>, WeftError> + Send + Sync + 'static,
    ) -> Self {
        Prompt::new(PromptKind::Builder(Arc::new(build)))
    }

    /// Stateful wrapper; `factory` creates the state container at mount.
    pub fn stateful(factory: impl Fn() -> Box<dyn State> + Send + Sync + 'static) -> Self {
        Prompt::new(PromptKind::Stateful(Arc::new(factory)))
    }

    /// Async-build node from an [`AsyncBuild`] implementation.
    pub fn async_build(node: impl AsyncBuild + 'static) -> Self {
        Prompt::new(PromptKind::Async(Arc::new(node)))
    }

    /// Boolean predicate node: asks the model `question` mid-compile and
    /// builds the child from the answer.
    pub fn predicate(
        question: impl Into<String>,
        child: impl Fn(bool) -> Option<Prompt> + Send + Sync + 'static,
    ) -> Self {
        Prompt::new(PromptKind::Predicate(Predicate {
            question: question.into(),
            child: Arc::new(child),
        }))
    }

    /// Single-choice node: the model picks one of `choices` and the child is
    /// built from the validated index.
    pub fn select(
        instruction: impl Into<String>,
        choices: Vec<String>,
        child: impl Fn(usize) -> Option<Prompt> + Send + Sync + 'static,
    ) -> Self {
        Prompt::new(PromptKind::Select(Select {
            instruction: instruction.into(),
            choices,
            child: Arc::new(child),
        }))
    }

    /// Multiple-choice node: the model picks any number of `choices`.
    pub fn multi_select(
        instruction: impl Into<String>,
        choices: Vec<String>,
        child: impl Fn(&[usize]) -> Option<Prompt> + Send + Sync + 'static,
    ) -> Self {
        Prompt::new(PromptKind::MultiSelect(MultiSelect {
            instruction: instruction.into(),
            choices,
            child: Arc::new(child),
        }))
    }

    /// Whether an element bound to `old` may be updated in place with `new`:
    /// identical kind and equal (or both absent) keys.
    pub fn similar(old: &Prompt, new: &Prompt) -> bool {
        std::mem::discriminant(&old.kind) == std::mem::discriminant(&new.kind)
            && old.key == new.key
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match &self.kind {
            PromptKind::Text(_) => "text",
            PromptKind::Image(_) => "image",
            PromptKind::Sequence(_) => "sequence",
            PromptKind::Message { .. } => "message",
            PromptKind::Visibility { .. } => "visibility",
            PromptKind::Builder(_) => "builder",
            PromptKind::Stateful(_) => "stateful",
            PromptKind::Async(_) => "async",
            PromptKind::Predicate(_) => "predicate",
            PromptKind::Select(_) => "select",
            PromptKind::MultiSelect(_) => "multi_select",
        }
    }

    /// Content fragments of a leaf kind; empty for composite kinds.
    pub(crate) fn leaf_parts(&self) -> Vec<ContentPart> {
        match &self.kind {
            PromptKind::Text(text) => vec![ContentPart::Text {
                text: text.content.clone(),
            }],
            PromptKind::Image(image) => vec![image.to_part()],
            _ => Vec::new(),
        }
    }

    /// Whether two similar leaf prompts carry identical content, so the
    /// cached fragments can be kept on update.
    pub(crate) fn leaf_eq(old: &Prompt, new: &Prompt) -> bool {
        match (&old.kind, &new.kind) {
            (PromptKind::Text(a), PromptKind::Text(b)) => a == b,
            (PromptKind::Image(a), PromptKind::Image(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Prompt");
        out.field("kind", &self.kind_name());
        if let Some(key) = &self.key {
            out.field("key", key);
        }
        out.finish()
    }
}
