//! Common types for the Aktivi identity and sign-in stack.
//!
//! This crate holds the pieces every other crate leans on: validated
//! identifiers ([`types::did::Did`], [`types::handle::Handle`],
//! [`types::ident::ActorIdentifier`]), the [`types::did_doc::DidDocument`]
//! model, the [`http_client::HttpClient`] transport seam and the
//! [`store::KeyValueStore`] persistence seam used for state that has to
//! survive a full-page redirect.

#![warn(missing_docs)]
pub use smol_str;
pub use url;

pub mod error;
/// HTTP client abstraction used by the aktivi crates.
pub mod http_client;
/// Key-value persistence for state that outlives a single page load.
pub mod store;
/// Baseline identifier and document types.
pub mod types;

pub use types::did::Did;
pub use types::did_doc::DidDocument;
pub use types::handle::Handle;
pub use types::ident::ActorIdentifier;
