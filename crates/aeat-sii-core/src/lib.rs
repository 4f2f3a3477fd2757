//! Core contracts for the AEAT SII credential subsystem: the error taxonomy,
//! the company record and the repository and cipher seams the storage crate implements.

pub mod error;
pub mod storage;

pub use error::{CredentialError, MissingCredential};
