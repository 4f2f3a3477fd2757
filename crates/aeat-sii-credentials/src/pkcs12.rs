use std::fmt;

use aeat_sii_core::{
    storage::{CompanyId, CompanyRepository, SecretCipher},
    CredentialError,
};
use aeat_sii_storage::credential_store::CredentialStore;
use openssl::{error::ErrorStack, pkcs12::Pkcs12};
use tracing::{debug, info, instrument};

/// Leaf certificate and private key extracted from a PKCS12 bundle.
pub struct ParsedBundle {
    /// PEM-encoded X.509 leaf certificate.
    pub certificate: Vec<u8>,
    /// Unencrypted PKCS8 PEM private key.
    pub private_key: Vec<u8>,
    /// Number of additional CA certificates that were dropped.
    pub discarded_chain: usize,
}

impl fmt::Debug for ParsedBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsedBundle")
            .field("certificate_len", &self.certificate.len())
            .field("discarded_chain", &self.discarded_chain)
            .finish_non_exhaustive()
    }
}

/// Unlock a DER PKCS12 bundle with `password` and serialize its contents to PEM.
///
/// Only the leaf certificate matching the private key is kept; any CA
/// certificates in the bundle are counted and discarded.
pub fn parse_bundle(pfx: &[u8], password: &str) -> Result<ParsedBundle, CredentialError> {
    let parsed = Pkcs12::from_der(pfx)
        .and_then(|p12| p12.parse2(password))
        .map_err(import_error)?;

    let pkey = parsed.pkey.ok_or_else(|| CredentialError::Import {
        message: "bundle contains no private key".into(),
    })?;
    let cert = parsed.cert.ok_or_else(|| CredentialError::Import {
        message: "bundle contains no certificate".into(),
    })?;

    Ok(ParsedBundle {
        certificate: cert.to_pem().map_err(import_error)?,
        private_key: pkey.private_key_to_pem_pkcs8().map_err(import_error)?,
        discarded_chain: parsed.ca.as_ref().map_or(0, |ca| ca.len()),
    })
}

/// Imports PKCS12 bundles into a company's credential set.
pub struct Pkcs12Importer<'a, R: CompanyRepository, C: SecretCipher> {
    store: &'a CredentialStore<R, C>,
}

impl<'a, R: CompanyRepository, C: SecretCipher> Pkcs12Importer<'a, R, C> {
    pub fn new(store: &'a CredentialStore<R, C>) -> Self {
        Self { store }
    }

    /// Replace the company's certificate and private key with the bundle's.
    /// Nothing is persisted unless both can be written.
    #[instrument(skip(self, pfx, password), fields(company = %id))]
    pub fn import_bundle(&self, id: CompanyId, pfx: &[u8], password: &str) -> Result<(), CredentialError> {
        let bundle = parse_bundle(pfx, password).inspect_err(|err| {
            debug!(%err, "cryptographic error loading pkcs12");
        })?;
        if bundle.discarded_chain > 0 {
            debug!(count = bundle.discarded_chain, "ignoring additional certificates");
        }

        let company = self
            .store
            .store_credentials(id, &bundle.certificate, &bundle.private_key)?;
        info!("Correctly loaded SSL credentials for company {}", company.name);
        Ok(())
    }
}

fn import_error(stack: ErrorStack) -> CredentialError {
    CredentialError::Import {
        message: import_message(&stack),
    }
}

/// Comma-separated reasons from the OpenSSL error stack; empty when OpenSSL
/// reported none.
fn import_message(stack: &ErrorStack) -> String {
    stack
        .errors()
        .iter()
        .filter_map(|err| err.reason())
        .collect::<Vec<_>>()
        .join(", ")
}
