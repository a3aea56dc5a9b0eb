mod client_metadata;
mod metadata;
mod request;
mod response;

pub use self::client_metadata::*;
pub use self::metadata::*;
pub use self::request::*;
pub use self::response::*;

use serde::Deserialize;
use smol_str::SmolStr;

/// Parameters the authorization server sends back to the callback route.
///
/// Carried in the URL fragment (`response_mode=fragment`). On failure the
/// server sends `error` and optionally `error_description` instead of `code`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CallbackParams {
    pub code: Option<SmolStr>,
    pub state: Option<SmolStr>,
    /// Issuer identifier (RFC 9207)
    pub iss: Option<SmolStr>,
    pub error: Option<SmolStr>,
    pub error_description: Option<SmolStr>,
}

impl CallbackParams {
    /// Parse a `k=v&...` string, as found after `#` on the callback URL.
    pub fn from_encoded(encoded: &str) -> Result<Self, serde_html_form::de::Error> {
        serde_html_form::from_str(encoded.trim_start_matches(['#', '?']))
    }

    /// Parameters from the fragment of `url`. The query is ignored; a URL
    /// without a fragment yields no parameters.
    pub fn from_url(url: &url::Url) -> Result<Self, serde_html_form::de::Error> {
        Self::from_encoded(url.fragment().unwrap_or_default())
    }
}
