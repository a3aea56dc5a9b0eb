//! Handle → DID strategies.
//!
//! - [`DohJsonHandleResolver`]: `_atproto.{handle}` TXT via a DNS-over-HTTPS
//!   JSON endpoint, usable anywhere an HTTP client is.
//! - [`WellKnownHandleResolver`]: `https://{handle}/.well-known/atproto-did`.
//! - `SystemDnsHandleResolver` (feature `dns`): TXT via the OS resolver.

use std::time::Duration;

use aktivi_common::http_client::HttpClient;
use aktivi_common::{Did, Handle};
use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use crate::did::fetch;
use crate::error::{IdentityError, Result};
use crate::resolver::{CompositeHandleResolver, HandleResolver};
use crate::{HandleStep, ResolverOptions};

const TXT_RECORD_TYPE: u16 = 16;

/// Pick the single `did=` value out of TXT record strings.
///
/// Zero matches is "no record"; more than one is ambiguous and rejected.
pub fn did_from_txt_records<I, S>(handle: &Handle, strategy: &'static str, records: I) -> Result<Did>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let candidates: Vec<String> = records
        .into_iter()
        .filter_map(|txt| txt.as_ref().trim().strip_prefix("did=").map(str::to_owned))
        .collect();
    match candidates.as_slice() {
        [] => Err(IdentityError::NoHandleRecord {
            handle: handle.clone(),
            strategy,
        }),
        [did] => Ok(Did::new(did.trim())?),
        many => Err(IdentityError::AmbiguousHandleRecord {
            handle: handle.clone(),
            count: many.len(),
        }),
    }
}

/// Undo the presentation quoting of a TXT answer.
///
/// DoH JSON renders TXT data as one or more quoted character-strings
/// (`"did=did:plc:" "abc"`); the record value is their concatenation.
fn unquote_txt(data: &str) -> String {
    if !data.contains('"') {
        return data.to_owned();
    }
    data.split('"').skip(1).step_by(2).collect()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DohResponse {
    #[serde(default)]
    status: u32,
    #[serde(default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type", default)]
    record_type: Option<u16>,
    data: String,
}

/// TXT lookup through a DNS-over-HTTPS JSON endpoint.
#[derive(Clone, Debug)]
pub struct DohJsonHandleResolver<C> {
    http: C,
    doh_url: Url,
    timeout: Duration,
}

impl<C> DohJsonHandleResolver<C> {
    /// Resolver querying `doh_url` (e.g. `https://mozilla.cloudflare-dns.com/dns-query`).
    pub fn new(http: C, doh_url: Url, timeout: Duration) -> Self {
        Self {
            http,
            doh_url,
            timeout,
        }
    }

    /// `{doh_url}?name=_atproto.{handle}&type=TXT`
    pub fn query_url(&self, handle: &Handle) -> Url {
        let mut url = self.doh_url.clone();
        url.query_pairs_mut()
            .append_pair("name", &format!("_atproto.{}", handle.as_str()))
            .append_pair("type", "TXT");
        url
    }
}

#[async_trait]
impl<C> HandleResolver for DohJsonHandleResolver<C>
where
    C: HttpClient + Send + Sync,
{
    fn name(&self) -> &'static str {
        "dns-over-https"
    }

    async fn resolve(&self, handle: &Handle) -> Result<Did> {
        let url = self.query_url(handle);
        let (body, status) = fetch(&self.http, &url, "application/dns-json", self.timeout).await?;
        if !status.is_success() {
            return Err(IdentityError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let response: DohResponse = serde_json::from_slice(&body)?;
        // NOERROR is 0; NXDOMAIN and friends mean there is nothing to read
        if response.status != 0 {
            return Err(IdentityError::NoHandleRecord {
                handle: handle.clone(),
                strategy: self.name(),
            });
        }
        let records = response
            .answer
            .iter()
            .filter(|a| a.record_type.is_none_or(|t| t == TXT_RECORD_TYPE))
            .map(|a| unquote_txt(&a.data));
        did_from_txt_records(handle, self.name(), records)
    }
}

/// Handle → DID via `https://{handle}/.well-known/atproto-did`.
#[derive(Clone, Debug)]
pub struct WellKnownHandleResolver<C> {
    http: C,
    timeout: Duration,
}

impl<C> WellKnownHandleResolver<C> {
    #[allow(missing_docs)]
    pub fn new(http: C, timeout: Duration) -> Self {
        Self { http, timeout }
    }

    fn well_known_url(handle: &Handle) -> Result<Url> {
        Ok(Url::parse(&format!(
            "https://{}/.well-known/atproto-did",
            handle.as_str()
        ))?)
    }
}

/// The first non-empty line must be a DID; anything after it is ignored.
pub fn parse_atproto_did_body(body: &str) -> Result<Did> {
    let line = body
        .lines()
        .find(|l| !l.trim().is_empty())
        .ok_or(IdentityError::InvalidWellKnown)?;
    Did::new(line.trim()).map_err(|_| IdentityError::InvalidWellKnown)
}

#[async_trait]
impl<C> HandleResolver for WellKnownHandleResolver<C>
where
    C: HttpClient + Send + Sync,
{
    fn name(&self) -> &'static str {
        "https-well-known"
    }

    async fn resolve(&self, handle: &Handle) -> Result<Did> {
        let url = Self::well_known_url(handle)?;
        let (body, status) = fetch(&self.http, &url, "text/plain", self.timeout).await?;
        if status != http::StatusCode::OK {
            return Err(IdentityError::HttpStatus {
                url: url.to_string(),
                status,
            });
        }
        let text = std::str::from_utf8(&body).map_err(|_| IdentityError::InvalidWellKnown)?;
        parse_atproto_did_body(text)
    }
}

#[cfg(all(feature = "dns", not(target_family = "wasm")))]
pub use system_dns::SystemDnsHandleResolver;

#[cfg(all(feature = "dns", not(target_family = "wasm")))]
mod system_dns {
    use std::sync::Arc;

    use aktivi_common::{Did, Handle};
    use async_trait::async_trait;
    use hickory_resolver::TokioAsyncResolver;
    use hickory_resolver::config::{ResolverConfig, ResolverOpts};

    use super::did_from_txt_records;
    use crate::error::Result;
    use crate::resolver::HandleResolver;

    /// TXT lookup through the operating system's resolver configuration.
    #[derive(Clone)]
    pub struct SystemDnsHandleResolver {
        dns: Arc<TokioAsyncResolver>,
    }

    impl SystemDnsHandleResolver {
        /// Resolver using the default upstream configuration.
        pub fn new() -> Self {
            Self {
                dns: Arc::new(TokioAsyncResolver::tokio(
                    ResolverConfig::default(),
                    ResolverOpts::default(),
                )),
            }
        }
    }

    impl Default for SystemDnsHandleResolver {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl HandleResolver for SystemDnsHandleResolver {
        fn name(&self) -> &'static str {
            "system-dns"
        }

        async fn resolve(&self, handle: &Handle) -> Result<Did> {
            let fqdn = format!("_atproto.{}.", handle.as_str());
            let response = self.dns.txt_lookup(fqdn).await?;
            let mut records = Vec::new();
            for txt in response.iter() {
                let joined: String = txt
                    .txt_data()
                    .iter()
                    .map(|data| String::from_utf8_lossy(data))
                    .collect();
                records.push(joined);
            }
            did_from_txt_records(handle, self.name(), records)
        }
    }
}

/// Build the composite from `opts.handle_order`.
///
/// `HandleStep::SystemDns` is skipped when the `dns` feature is off.
pub fn handle_resolver_for<C>(http: C, opts: &ResolverOptions) -> CompositeHandleResolver
where
    C: HttpClient + Clone + Send + Sync + 'static,
{
    let mut composite = CompositeHandleResolver::new();
    for step in &opts.handle_order {
        composite = match step {
            HandleStep::DohTxt => composite.with_strategy(DohJsonHandleResolver::new(
                http.clone(),
                opts.doh_url.clone(),
                opts.timeout,
            )),
            HandleStep::HttpsWellKnown => {
                composite.with_strategy(WellKnownHandleResolver::new(http.clone(), opts.timeout))
            }
            #[cfg(all(feature = "dns", not(target_family = "wasm")))]
            HandleStep::SystemDns => composite.with_strategy(SystemDnsHandleResolver::new()),
            #[cfg(not(all(feature = "dns", not(target_family = "wasm"))))]
            HandleStep::SystemDns => composite,
        };
    }
    composite
}
