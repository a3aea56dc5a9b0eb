use crate::types::did::Did;
use crate::types::handle::Handle;
use crate::types::string::AtStrError;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An actor identifier: either a handle or a DID, never both.
///
/// Strings starting with `did:` are always parsed as DIDs, so a malformed DID
/// is rejected rather than silently treated as a handle.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize, Hash)]
#[serde(untagged)]
pub enum ActorIdentifier {
    #[allow(missing_docs)]
    Did(Did),
    #[allow(missing_docs)]
    Handle(Handle),
}

impl ActorIdentifier {
    /// Fallible constructor, validates
    pub fn new(ident: impl AsRef<str>) -> Result<Self, AtStrError> {
        let ident = ident.as_ref().trim();
        let bare = ident.strip_prefix("at://").unwrap_or(ident);
        if bare.starts_with("did:") {
            Did::new(bare).map(ActorIdentifier::Did)
        } else {
            Handle::new(ident).map(ActorIdentifier::Handle)
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> &str {
        match self {
            ActorIdentifier::Did(did) => did.as_str(),
            ActorIdentifier::Handle(handle) => handle.as_str(),
        }
    }

    /// The DID, if this identifier already is one
    pub fn as_did(&self) -> Option<&Did> {
        match self {
            ActorIdentifier::Did(did) => Some(did),
            ActorIdentifier::Handle(_) => None,
        }
    }

    /// The handle, if this identifier is one
    pub fn as_handle(&self) -> Option<&Handle> {
        match self {
            ActorIdentifier::Handle(handle) => Some(handle),
            ActorIdentifier::Did(_) => None,
        }
    }
}

impl From<Did> for ActorIdentifier {
    fn from(did: Did) -> Self {
        ActorIdentifier::Did(did)
    }
}

impl From<Handle> for ActorIdentifier {
    fn from(handle: Handle) -> Self {
        ActorIdentifier::Handle(handle)
    }
}

impl FromStr for ActorIdentifier {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl fmt::Display for ActorIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for ActorIdentifier {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
