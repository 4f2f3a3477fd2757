//! PKCS12 import and short-lived credential files for outbound TLS calls
//! to the AEAT SII web service.

pub mod materializer;
pub mod pkcs12;

#[cfg(test)]
mod test_support;

pub use materializer::{CredentialFiles, CredentialMaterializer};
pub use pkcs12::{parse_bundle, ParsedBundle, Pkcs12Importer};
