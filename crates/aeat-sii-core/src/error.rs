use std::fmt;

use thiserror::Error;

use crate::storage::CompanyId;

/// Problems with the process-wide symmetric key configuration.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// No key is configured at all.
    #[error("Missing symmetric key configuration")]
    MissingSecret,
    /// A key is configured but cannot be used (bad base64, wrong length).
    #[error("invalid symmetric key configuration: {reason}")]
    InvalidSecret { reason: String },
    /// The OS keyring could not be queried.
    #[error("keyring error: {reason}")]
    Keyring { reason: String },
}

/// Which half of a credential set is absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingCredential {
    Certificate,
    PrivateKey,
}

impl fmt::Display for MissingCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingCredential::Certificate => f.write_str("Missing PEM certificate"),
            MissingCredential::PrivateKey => f.write_str("Missing private key"),
        }
    }
}

/// Errors surfaced by the credential subsystem. All of them reach the caller
/// synchronously; none are retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CredentialError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Stored ciphertext is unreadable with the current key (rotated key,
    /// corruption or tampering).
    #[error("unable to decrypt private key: {reason}")]
    Decryption { reason: String },
    /// The PKCS12 bundle could not be loaded. `message` comes from the
    /// underlying parser and may be empty.
    #[error("error loading PKCS12 bundle: {message}")]
    Import { message: String },
    #[error("{0}; load the company's PKCS12 credentials first")]
    MissingCredential(MissingCredential),
    #[error("company not found: {id}")]
    CompanyNotFound { id: CompanyId },
    #[error("storage failure: {reason}")]
    Storage { reason: String },
}

impl CredentialError {
    /// Flatten any displayable failure into a storage error.
    pub fn storage<E: ToString>(err: E) -> Self {
        CredentialError::Storage {
            reason: err.to_string(),
        }
    }

    pub fn decryption<E: ToString>(err: E) -> Self {
        CredentialError::Decryption {
            reason: err.to_string(),
        }
    }
}
