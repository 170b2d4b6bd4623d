//! Error type shared across the crate.
//!
//! Lifecycle misuse (mounting twice, updating a dissimilar prompt, compiling
//! before mount) is a programmer error and always fatal: the error aborts the
//! whole respond cycle and is never retried internally. Chat client failures
//! are passed through opaquely via [`WeftError::Client`].

use thiserror::Error;

/// Errors surfaced by sessions, elements, and build functions.
#[derive(Debug, Error)]
pub enum WeftError {
    /// An element can be mounted at most once in its lifetime; this covers
    /// both double-mount and mount-after-unmount.
    #[error("element has already been mounted")]
    AlreadyMounted,
    /// The operation requires a mounted element.
    #[error("element is not mounted")]
    NotMounted,
    /// An element can only be updated with a similar prompt (same kind,
    /// equal or absent key).
    #[error("element cannot be updated with a dissimilar prompt (kind and key must match)")]
    DissimilarPrompt,
    /// A state container can be mounted at most once.
    #[error("state has already been mounted")]
    StateAlreadyMounted,
    /// The operation requires a mounted state container.
    #[error("state is not mounted")]
    StateNotMounted,
    /// A compile pass was requested before the root element was mounted.
    #[error("session has no mounted root element")]
    NoRoot,
    /// A selection node received a choice index outside its choice list.
    /// Never clamped or retried.
    #[error("choice index {index} is out of range for {count} choices")]
    ChoiceOutOfRange { index: i64, count: usize },
    /// A structured model response did not parse against the expected shape.
    #[error("structured response could not be parsed: {0}")]
    MalformedResponse(#[from] serde_json::Error),
    /// A user build function failed.
    #[error("build function failed: {0}")]
    Build(String),
    /// Opaque chat client failure (network, quota, refusal). Propagated to
    /// the caller of `respond` unchanged.
    #[error("chat client error: {0}")]
    Client(String),
}

impl WeftError {
    /// Wrap an arbitrary client-side failure.
    pub fn client(err: impl std::fmt::Display) -> Self {
        WeftError::Client(err.to_string())
    }
}
