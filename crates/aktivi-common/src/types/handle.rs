use std::fmt;
use std::sync::LazyLock;
use std::{ops::Deref, str::FromStr};

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, de::Error};
use smol_str::{SmolStr, SmolStrBuilder};

use crate::types::string::AtStrError;

/// A domain-name handle such as `alice.example`.
///
/// Handles are case-insensitive; the stored form is lowercased so that
/// comparisons against `alsoKnownAs` entries and DNS answers are stable.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Hash)]
#[serde(transparent)]
pub struct Handle(SmolStr);

/// Regex for handle syntax: dot-separated DNS labels, final label starts with a letter.
pub static HANDLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?$").unwrap()
});

const MAX_HANDLE_LEN: usize = 253;

impl Handle {
    /// Fallible constructor, validates.
    ///
    /// Accepts (and strips) a preceding `@` or `at://`.
    pub fn new(handle: impl AsRef<str>) -> Result<Self, AtStrError> {
        let handle = handle.as_ref();
        let handle = handle
            .strip_prefix("at://")
            .or_else(|| handle.strip_prefix('@'))
            .unwrap_or(handle);
        if handle.is_empty() {
            Err(AtStrError::empty("handle"))
        } else if handle.len() > MAX_HANDLE_LEN {
            Err(AtStrError::too_long(
                "handle",
                handle,
                MAX_HANDLE_LEN,
                handle.len(),
            ))
        } else if !HANDLE_REGEX.is_match(handle) {
            Err(AtStrError::regex(
                "handle",
                handle,
                SmolStr::new_static("invalid"),
            ))
        } else {
            let mut lowered = SmolStrBuilder::new();
            for c in handle.chars() {
                lowered.push(c.to_ascii_lowercase());
            }
            Ok(Self(lowered.finish()))
        }
    }

    #[allow(missing_docs)]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Handle {
    type Err = AtStrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value: std::borrow::Cow<'de, str> = Deserialize::deserialize(deserializer)?;
        Self::new(value.as_ref()).map_err(D::Error::custom)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

impl From<Handle> for String {
    fn from(value: Handle) -> Self {
        value.0.to_string()
    }
}

impl AsRef<str> for Handle {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Handle {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_handles() {
        assert!(Handle::new("alice.example").is_ok());
        assert!(Handle::new("a.b.c.example.com").is_ok());
        assert!(Handle::new("xn--ls8h.test").is_ok());
    }

    #[test]
    fn strips_prefixes_and_lowercases() {
        assert_eq!(Handle::new("@Alice.Example").unwrap().as_str(), "alice.example");
        assert_eq!(Handle::new("at://alice.example").unwrap().as_str(), "alice.example");
    }

    #[test]
    fn rejects_invalid() {
        assert!(Handle::new("").is_err());
        assert!(Handle::new("alice").is_err());
        assert!(Handle::new("alice..example").is_err());
        assert!(Handle::new("-alice.example").is_err());
        assert!(Handle::new("alice.example.1").is_err());
        assert!(Handle::new("did:plc:abc123").is_err());
    }
}
