use std::collections::BTreeMap;

use aeat_sii_core::{
    storage::{Company, CompanyId, CompanyRepository, PrivateKeyField, PrivateKeyMode, SecretCipher},
    CredentialError,
};
use tracing::{debug, instrument};

/// Per-company credential accessors. The private key only reaches the
/// repository encrypted; the certificate is public and passes through as is.
pub struct CredentialStore<R: CompanyRepository, C: SecretCipher> {
    repo: R,
    cipher: C,
}

impl<R: CompanyRepository, C: SecretCipher> CredentialStore<R, C> {
    pub fn new(repo: R, cipher: C) -> Self {
        Self { repo, cipher }
    }

    pub fn repository(&self) -> &R {
        &self.repo
    }

    pub fn company(&self, id: CompanyId) -> Result<Company, CredentialError> {
        self.repo.get(id)
    }

    /// Decrypted PEM private key, or `None` when nothing is stored. The
    /// cipher is not touched in the `None` case.
    #[instrument(skip(self))]
    pub fn private_key(&self, id: CompanyId) -> Result<Option<Vec<u8>>, CredentialError> {
        let company = self.repo.get(id)?;
        self.private_key_of(&company)
    }

    /// Batch read of the virtual private-key field.
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    pub fn private_key_field(
        &self,
        ids: &[CompanyId],
        mode: PrivateKeyMode,
    ) -> Result<BTreeMap<CompanyId, PrivateKeyField>, CredentialError> {
        ids.iter()
            .map(|&id| -> Result<_, CredentialError> {
                let key = self.private_key(id)?;
                Ok((id, PrivateKeyField::from_key(mode, key)))
            })
            .collect()
    }

    /// Store or clear the private key. `None` and empty input both clear it.
    #[instrument(skip(self, key))]
    pub fn set_private_key(&self, id: CompanyId, key: Option<&[u8]>) -> Result<(), CredentialError> {
        let mut company = self.repo.get(id)?;
        company.encrypted_private_key = self.encrypt_optional(key)?;
        self.repo.save(&company)?;
        debug!(cleared = company.encrypted_private_key.is_none(), "private key updated");
        Ok(())
    }

    pub fn certificate(&self, id: CompanyId) -> Result<Option<Vec<u8>>, CredentialError> {
        Ok(self.repo.get(id)?.pem_certificate)
    }

    pub fn set_certificate(&self, id: CompanyId, certificate: Option<&[u8]>) -> Result<(), CredentialError> {
        let mut company = self.repo.get(id)?;
        company.pem_certificate = non_empty(certificate).map(<[u8]>::to_vec);
        self.repo.save(&company)
    }

    /// Replace certificate and private key together. Encryption happens
    /// before anything is written and both fields go out in a single save,
    /// so either both change or neither does.
    #[instrument(skip(self, certificate, private_key))]
    pub fn store_credentials(
        &self,
        id: CompanyId,
        certificate: &[u8],
        private_key: &[u8],
    ) -> Result<Company, CredentialError> {
        let mut company = self.repo.get(id)?;
        let encrypted = self.encrypt_optional(Some(private_key))?;

        company.pem_certificate = non_empty(Some(certificate)).map(<[u8]>::to_vec);
        company.encrypted_private_key = encrypted;
        self.repo.save(&company)?;
        Ok(company)
    }

    /// Decrypted private key of an already loaded record.
    pub fn private_key_of(&self, company: &Company) -> Result<Option<Vec<u8>>, CredentialError> {
        match non_empty(company.encrypted_private_key.as_deref()) {
            Some(token) => self.cipher.decrypt(token).map(Some),
            None => Ok(None),
        }
    }

    fn encrypt_optional(&self, key: Option<&[u8]>) -> Result<Option<Vec<u8>>, CredentialError> {
        non_empty(key).map(|k| self.cipher.encrypt(k)).transpose()
    }
}

fn non_empty(bytes: Option<&[u8]>) -> Option<&[u8]> {
    bytes.filter(|b| !b.is_empty())
}
