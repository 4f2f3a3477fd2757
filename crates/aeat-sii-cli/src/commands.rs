use std::{
    fs,
    path::{Path, PathBuf},
    process::{self, ExitStatus},
};

use aeat_sii_core::storage::{
    Company, CompanyId, CompanyRepository, PrivateKeyField, PrivateKeyMode, SecretCipher,
};
use aeat_sii_credentials::{CredentialMaterializer, Pkcs12Importer};
use aeat_sii_storage::credential_store::CredentialStore;
use color_eyre::{eyre::eyre, Result};
use tracing::info;

/// Environment variable consulted when `import` gets no `--password`.
pub const PFX_PASSWORD_ENV: &str = "AEAT_SII_PFX_PASSWORD";
pub const CERT_FILE_ENV: &str = "AEAT_SII_CERT_FILE";
pub const KEY_FILE_ENV: &str = "AEAT_SII_KEY_FILE";

pub fn add_company<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
    id: u64,
    name: String,
) -> Result<()> {
    store.repository().save(&Company::new(id, name))?;
    Ok(())
}

/// One-line-per-field credential summary. The private key is read in size
/// mode so its bytes are never printed.
pub fn describe_company<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
    id: u64,
) -> Result<String> {
    let id = CompanyId(id);
    let company = store.company(id)?;
    let fields = store.private_key_field(&[id], PrivateKeyMode::Size)?;

    let certificate = match company.pem_certificate.as_deref() {
        Some(cert) if !cert.is_empty() => format!("present ({} bytes)", cert.len()),
        _ => "missing".to_string(),
    };
    let private_key = match fields.get(&id) {
        Some(PrivateKeyField::Size(len)) if *len > 0 => format!("present ({len} bytes)"),
        _ => "missing".to_string(),
    };

    Ok(format!(
        "company {id}: {}\n  certificate: {certificate}\n  private key: {private_key}",
        company.name
    ))
}

pub fn list_companies<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
) -> Result<Vec<String>> {
    Ok(store
        .repository()
        .list()?
        .into_iter()
        .map(|c| format!("{} {}", c.id, c.name))
        .collect())
}

pub fn import<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
    company: u64,
    pfx: &Path,
    password: Option<String>,
) -> Result<()> {
    let password = password
        .or_else(|| std::env::var(PFX_PASSWORD_ENV).ok())
        .ok_or_else(|| eyre!("no bundle password given; use --password or {PFX_PASSWORD_ENV}"))?;
    let bytes = fs::read(pfx)?;
    Pkcs12Importer::new(store).import_bundle(CompanyId(company), &bytes, &password)?;
    Ok(())
}

pub fn clear_key<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
    company: u64,
) -> Result<()> {
    store.set_private_key(CompanyId(company), None)?;
    info!(company, "private key cleared");
    Ok(())
}

/// Run `command` while the company's credential files exist. The files are
/// gone by the time this returns.
pub fn exec<R: CompanyRepository, C: SecretCipher>(
    store: &CredentialStore<R, C>,
    company: u64,
    tmp_dir: Option<PathBuf>,
    command: &[String],
) -> Result<ExitStatus> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| eyre!("no command given"))?;

    let mut materializer = CredentialMaterializer::new(store);
    if let Some(dir) = tmp_dir {
        materializer = materializer.with_tmp_dir(dir);
    }

    materializer.with_credential_files(CompanyId(company), |files| -> Result<ExitStatus> {
        let status = process::Command::new(program)
            .args(args)
            .env(CERT_FILE_ENV, files.certificate_path())
            .env(KEY_FILE_ENV, files.private_key_path())
            .status()?;
        Ok(status)
    })
}
