//! Declarative prompt trees for chat models, reconciled like a retained-mode
//! UI.
//!
//! A conversation is declared as a tree of immutable [`Prompt`] descriptors.
//! The [`Session`] keeps a live element for each descriptor across respond
//! calls and reconciles instead of rebuilding: descriptors of the same kind
//! with an equal (or absent) [`Key`] update their element in place, everything
//! else is unmounted and replaced. Each respond runs one compile pass over the
//! tree, accumulating content fragments into a [`Transcript`] and packing them
//! into role-tagged messages for the [`ChatClient`].
//!
//! Control-flow nodes ([`Prompt::predicate`], [`Prompt::select`],
//! [`Prompt::multi_select`], or any [`AsyncBuild`]) may ask the model
//! structured questions mid-compile through [`BuildCx::respond`]; the answer
//! decides their subtree before the pass continues.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weft::{MockClient, Prompt, RespondOptions, Session};
//!
//! # async fn run() -> Result<(), weft::WeftError> {
//! let client = Arc::new(MockClient::new());
//! client.push_text("Hi there!").await;
//!
//! let root = Prompt::sequence(vec![
//!     Prompt::system(vec![Prompt::line("You are a concise assistant.")]),
//!     Prompt::user(vec![Prompt::text("Say hello.")]),
//! ]);
//! let session = Session::new(root, client);
//!
//! let completion = session.respond(RespondOptions::default()).await?;
//! println!("{}", completion.text());
//! # Ok(())
//! # }
//! ```

mod tree;

pub mod build;
pub mod client;
pub mod control;
pub mod error;
pub mod message;
pub mod prompt;
pub mod session;
pub mod state;
pub mod transcript;

pub use build::{AsyncBuild, BuildCx, BuildFn};
pub use client::{
    ChatClient, Completion, CompletionDelta, MockClient, RespondOptions, ResponseFormat,
};
pub use control::{MultiSelect, Predicate, Select};
pub use error::WeftError;
pub use message::{ChatMessage, ContentPart, ImageDetail, Role};
pub use prompt::{ImagePrompt, ImageSource, Key, Prompt, PromptKind, TextPrompt};
pub use session::Session;
pub use state::{State, StateFactory};
pub use transcript::Transcript;
