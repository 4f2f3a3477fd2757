//! Concrete storage for company credentials with the private key encrypted at rest.
//! Uses AES-GCM with a single process key sourced from configuration (or test doubles).

pub mod credential_store;
pub mod file_repository;
pub mod key_cipher;
pub mod key_provider;
