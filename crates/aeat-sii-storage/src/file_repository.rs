use std::{
    fs::{self, File},
    io::{Read, Write},
    path::{Path, PathBuf},
};

use aeat_sii_core::{
    storage::{Company, CompanyId, CompanyRepository},
    CredentialError,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::instrument;

/// File-backed company repository: one JSON document per company under
/// `<root>/companies`. Every save replaces the document atomically, so a
/// record is never observed half-written.
pub struct FileCompanyRepository {
    root: PathBuf,
}

impl FileCompanyRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn dir(&self) -> PathBuf {
        self.root.join("companies")
    }

    fn path_for(&self, id: CompanyId) -> PathBuf {
        self.dir().join(format!("{id}.json"))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredCompany {
    id: u64,
    name: String,
    #[serde(default)]
    pem_certificate: Option<String>,
    #[serde(default)]
    encrypted_private_key: Option<String>,
}

impl From<&Company> for StoredCompany {
    fn from(company: &Company) -> Self {
        Self {
            id: company.id.0,
            name: company.name.clone(),
            pem_certificate: company.pem_certificate.as_ref().map(|b| STANDARD.encode(b)),
            encrypted_private_key: company
                .encrypted_private_key
                .as_ref()
                .map(|b| STANDARD.encode(b)),
        }
    }
}

impl TryFrom<StoredCompany> for Company {
    type Error = CredentialError;

    fn try_from(stored: StoredCompany) -> Result<Self, Self::Error> {
        Ok(Company {
            id: CompanyId(stored.id),
            name: stored.name,
            pem_certificate: decode_field(stored.pem_certificate)?,
            encrypted_private_key: decode_field(stored.encrypted_private_key)?,
        })
    }
}

impl CompanyRepository for FileCompanyRepository {
    #[instrument(skip(self))]
    fn get(&self, id: CompanyId) -> Result<Company, CredentialError> {
        let stored = read_record(&self.path_for(id))?.ok_or(CredentialError::CompanyNotFound { id })?;
        Company::try_from(stored)
    }

    #[instrument(skip_all, fields(company = %company.id))]
    fn save(&self, company: &Company) -> Result<(), CredentialError> {
        write_record(&self.path_for(company.id), &StoredCompany::from(company))
    }

    #[instrument(skip(self))]
    fn list(&self) -> Result<Vec<Company>, CredentialError> {
        let entries = match fs::read_dir(self.dir()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(CredentialError::storage(err)),
        };

        let mut companies = Vec::new();
        for entry in entries {
            let path = entry.map_err(CredentialError::storage)?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stored) = read_record(&path)? {
                companies.push(Company::try_from(stored)?);
            }
        }
        companies.sort_by_key(|c| c.id);
        Ok(companies)
    }
}

fn write_record(path: &Path, record: &StoredCompany) -> Result<(), CredentialError> {
    let parent = path
        .parent()
        .ok_or_else(|| CredentialError::storage("invalid storage path"))?;
    fs::create_dir_all(parent).map_err(CredentialError::storage)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(CredentialError::storage)?;
    let json = serde_json::to_vec_pretty(record).map_err(CredentialError::storage)?;
    tmp.write_all(&json).map_err(CredentialError::storage)?;
    tmp.flush().map_err(CredentialError::storage)?;
    tmp.persist(path)
        .map_err(|e| CredentialError::storage(e.error))?;
    Ok(())
}

fn read_record(path: &Path) -> Result<Option<StoredCompany>, CredentialError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(CredentialError::storage(err)),
    };

    let mut buf = Vec::new();
    file.read_to_end(&mut buf).map_err(CredentialError::storage)?;
    serde_json::from_slice(&buf)
        .map(Some)
        .map_err(|e| CredentialError::storage(format!("{}: {e}", path.display())))
}

fn decode_field(field: Option<String>) -> Result<Option<Vec<u8>>, CredentialError> {
    field
        .map(|encoded| {
            STANDARD
                .decode(encoded)
                .map_err(|e| CredentialError::storage(format!("field decode failed: {e}")))
        })
        .transpose()
}
