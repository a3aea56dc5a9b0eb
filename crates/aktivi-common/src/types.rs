/// Decentralized identifiers
pub mod did;
/// DID documents
pub mod did_doc;
/// Human-readable, domain-based handles
pub mod handle;
/// Handle-or-DID actor identifiers
pub mod ident;
/// Identifier parse errors
pub mod string;
