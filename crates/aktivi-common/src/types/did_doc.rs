use crate::types::did::Did;
use crate::types::handle::Handle;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smol_str::SmolStr;
use std::collections::BTreeMap;
use url::Url;

/// Service type of the hosting endpoint in an atproto DID document
pub const PDS_SERVICE_TYPE: &str = "AtprotoPersonalDataServer";
/// Fragment id of the hosting endpoint service
pub const PDS_SERVICE_ID: &str = "#atproto_pds";

/// DID Document representation.
///
/// Only the fields the resolver stack reads are modeled explicitly; the rest
/// is kept in `extra_data` so a document survives a serialize round trip.
///
/// Example
/// ```
/// use aktivi_common::types::did_doc::DidDocument;
/// use serde_json::json;
/// let doc: DidDocument = serde_json::from_value(json!({
///   "id": "did:plc:alice",
///   "alsoKnownAs": ["at://alice.example"],
///   "service": [{"id":"#atproto_pds","type":"AtprotoPersonalDataServer","serviceEndpoint":"https://pds.example"}],
/// })).unwrap();
/// assert_eq!(doc.id.as_str(), "did:plc:alice");
/// assert!(doc.pds_endpoint().is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    /// Document identifier (e.g., `did:plc:...` or `did:web:...`)
    pub id: Did,

    /// Alternate identifiers for the subject, such as at://<handle>
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub also_known_as: Option<Vec<SmolStr>>,

    /// Verification methods (keys) for this DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_method: Option<Vec<VerificationMethod>>,

    /// Services associated with this DID (e.g., AtprotoPersonalDataServer)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<Vec<Service>>,

    /// Forward‑compatible capture of unmodeled fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

impl DidDocument {
    /// Extract validated handles from `alsoKnownAs` entries like `at://<handle>`.
    pub fn handles(&self) -> Vec<Handle> {
        self.also_known_as
            .as_ref()
            .map(|v| {
                v.iter()
                    .filter_map(|s| s.strip_prefix("at://"))
                    .filter_map(|h| Handle::new(h).ok())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether `alsoKnownAs` claims the given handle.
    pub fn claims_handle(&self, handle: &Handle) -> bool {
        self.handles().iter().any(|h| h == handle)
    }

    /// Extract the first Multikey `publicKeyMultibase` value from verification methods.
    pub fn atproto_multikey(&self) -> Option<SmolStr> {
        self.verification_method.as_ref().and_then(|methods| {
            methods.iter().find_map(|m| {
                if m.r#type.as_str() == "Multikey" {
                    m.public_key_multibase.clone()
                } else {
                    None
                }
            })
        })
    }

    /// Extract the AtprotoPersonalDataServer service endpoint as a `Url`.
    ///
    /// Accepts endpoint as string or object (string preferred). Only absolute
    /// `http`/`https` URLs count; anything else is treated as absent.
    pub fn pds_endpoint(&self) -> Option<Url> {
        self.service.as_ref().and_then(|services| {
            services.iter().find_map(|s| {
                if s.r#type.as_str() != PDS_SERVICE_TYPE {
                    return None;
                }
                let raw = match &s.service_endpoint {
                    Some(Value::String(strv)) => Some(strv.as_str()),
                    // Some documents may include structured endpoints; try common fields
                    Some(Value::Object(obj)) => obj.get("url").and_then(Value::as_str),
                    _ => None,
                }?;
                Url::parse(raw)
                    .ok()
                    .filter(|url| matches!(url.scheme(), "http" | "https") && url.has_host())
            })
        })
    }
}

/// Verification method (key) entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Identifier for this key material within the document
    pub id: SmolStr,
    /// Key type (e.g., `Multikey`)
    #[serde(rename = "type")]
    pub r#type: SmolStr,
    /// Optional controller DID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<SmolStr>,
    /// Multikey `publicKeyMultibase` (base58btc)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key_multibase: Option<SmolStr>,

    /// Forward‑compatible capture of unmodeled fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

/// Service entry in a DID Document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Builder)]
#[builder(start_fn = new)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    /// Service identifier
    pub id: SmolStr,
    /// Service type (e.g., `AtprotoPersonalDataServer`)
    #[serde(rename = "type")]
    pub r#type: SmolStr,
    /// String or object; kept as raw JSON
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_endpoint: Option<Value>,

    /// Forward‑compatible capture of unmodeled fields
    #[serde(flatten)]
    #[builder(default)]
    pub extra_data: BTreeMap<SmolStr, Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> DidDocument {
        serde_json::from_value(json!({
            "@context": ["https://www.w3.org/ns/did/v1"],
            "id": "did:plc:abc123",
            "alsoKnownAs": ["at://Alice.Example"],
            "verificationMethod": [{
                "id": "did:plc:abc123#atproto",
                "type": "Multikey",
                "controller": "did:plc:abc123",
                "publicKeyMultibase": "zQ3shXjHeiBuRCKmM36cuYnm7YEMzhGnCmCyW92sRJ9pribSF"
            }],
            "service": [{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": "https://pds.example"
            }]
        }))
        .expect("parse doc")
    }

    #[test]
    fn parse_sample_doc_and_helpers() {
        let doc = sample();
        assert_eq!(doc.id.as_str(), "did:plc:abc123");
        assert_eq!(
            doc.pds_endpoint().expect("pds").as_str(),
            "https://pds.example/"
        );
        assert!(doc.claims_handle(&Handle::new("alice.example").unwrap()));
        assert!(doc.atproto_multikey().unwrap().starts_with('z'));
        assert!(doc.extra_data.contains_key("@context"));
    }

    #[test]
    fn structured_endpoint() {
        let doc: DidDocument = serde_json::from_value(json!({
            "id": "did:web:example.com",
            "service": [{
                "id": "#atproto_pds",
                "type": "AtprotoPersonalDataServer",
                "serviceEndpoint": {"url": "https://pds.example"}
            }]
        }))
        .unwrap();
        assert!(doc.pds_endpoint().is_some());
    }

    #[test]
    fn unusable_endpoints_are_absent() {
        for endpoint in [json!("not a url"), json!("ftp://pds.example"), json!(42)] {
            let doc: DidDocument = serde_json::from_value(json!({
                "id": "did:plc:abc123",
                "service": [{
                    "id": "#atproto_pds",
                    "type": "AtprotoPersonalDataServer",
                    "serviceEndpoint": endpoint
                }]
            }))
            .unwrap();
            assert!(doc.pds_endpoint().is_none());
        }
        let bare: DidDocument = serde_json::from_value(json!({"id": "did:plc:abc123"})).unwrap();
        assert!(bare.pds_endpoint().is_none());
    }
}
