use std::{
    collections::BTreeMap,
    fmt,
    sync::{Arc, Mutex},
};

use crate::CredentialError;

/// Identifier of a company record in the host system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompanyId(pub u64);

impl fmt::Display for CompanyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for CompanyId {
    fn from(value: u64) -> Self {
        CompanyId(value)
    }
}

/// Company record holding at most one credential set.
///
/// `encrypted_private_key` is ciphertext produced by a [`crate::storage::SecretCipher`];
/// `pem_certificate` is stored as is.
#[derive(Clone, PartialEq, Eq)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    pub pem_certificate: Option<Vec<u8>>,
    pub encrypted_private_key: Option<Vec<u8>>,
}

impl Company {
    pub fn new(id: impl Into<CompanyId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            pem_certificate: None,
            encrypted_private_key: None,
        }
    }
}

// Keep ciphertext and certificate bodies out of debug logs.
impl fmt::Debug for Company {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Company")
            .field("id", &self.id)
            .field("name", &self.name)
            .field(
                "pem_certificate",
                &self.pem_certificate.as_ref().map(Vec::len),
            )
            .field(
                "encrypted_private_key",
                &self.encrypted_private_key.as_ref().map(Vec::len),
            )
            .finish()
    }
}

/// Persistence contract for company records.
///
/// `save` writes the whole record in one step; callers rely on that for
/// all-or-nothing credential updates.
pub trait CompanyRepository: Send + Sync {
    fn get(&self, id: CompanyId) -> Result<Company, CredentialError>;

    /// Create or overwrite the record.
    fn save(&self, company: &Company) -> Result<(), CredentialError>;

    fn list(&self) -> Result<Vec<Company>, CredentialError>;
}

impl<R: CompanyRepository + ?Sized> CompanyRepository for Arc<R> {
    fn get(&self, id: CompanyId) -> Result<Company, CredentialError> {
        (**self).get(id)
    }

    fn save(&self, company: &Company) -> Result<(), CredentialError> {
        (**self).save(company)
    }

    fn list(&self) -> Result<Vec<Company>, CredentialError> {
        (**self).list()
    }
}

/// In-memory repository for tests and smoke runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCompanyRepository {
    inner: Arc<Mutex<BTreeMap<CompanyId, Company>>>,
}

impl InMemoryCompanyRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanyRepository for InMemoryCompanyRepository {
    fn get(&self, id: CompanyId) -> Result<Company, CredentialError> {
        let map = self
            .inner
            .lock()
            .map_err(|err| CredentialError::storage(format!("lock poisoned: {err}")))?;

        map.get(&id)
            .cloned()
            .ok_or(CredentialError::CompanyNotFound { id })
    }

    fn save(&self, company: &Company) -> Result<(), CredentialError> {
        let mut map = self
            .inner
            .lock()
            .map_err(|err| CredentialError::storage(format!("lock poisoned: {err}")))?;
        map.insert(company.id, company.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<Company>, CredentialError> {
        let map = self
            .inner
            .lock()
            .map_err(|err| CredentialError::storage(format!("lock poisoned: {err}")))?;
        Ok(map.values().cloned().collect())
    }
}
