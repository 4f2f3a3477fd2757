//! Persistence and encryption seams for company credentials.

mod cipher;
mod company;
mod private_key;

pub use cipher::SecretCipher;
pub use company::{Company, CompanyId, CompanyRepository, InMemoryCompanyRepository};
pub use private_key::{PrivateKeyField, PrivateKeyMode};
