use std::{
    io::Write,
    path::{Path, PathBuf},
};

use aeat_sii_core::{
    storage::{CompanyId, CompanyRepository, SecretCipher},
    CredentialError, MissingCredential,
};
use aeat_sii_storage::credential_store::CredentialStore;
use tempfile::{Builder, TempPath};
use tracing::{debug, instrument};

/// Certificate and private key written to temporary files. Both files are
/// removed when this value is dropped.
#[derive(Debug)]
pub struct CredentialFiles {
    certificate: TempPath,
    private_key: TempPath,
}

impl CredentialFiles {
    pub fn certificate_path(&self) -> &Path {
        &self.certificate
    }

    pub fn private_key_path(&self) -> &Path {
        &self.private_key
    }

    /// Delete both files now, reporting any failure instead of ignoring it.
    pub fn close(self) -> Result<(), CredentialError> {
        let cert = self.certificate.close();
        let key = self.private_key.close();
        cert.and(key).map_err(CredentialError::storage)
    }
}

/// Exports a company's stored credentials to short-lived files for a TLS client.
pub struct CredentialMaterializer<'a, R: CompanyRepository, C: SecretCipher> {
    store: &'a CredentialStore<R, C>,
    tmp_dir: Option<PathBuf>,
}

impl<'a, R: CompanyRepository, C: SecretCipher> CredentialMaterializer<'a, R, C> {
    pub fn new(store: &'a CredentialStore<R, C>) -> Self {
        Self {
            store,
            tmp_dir: None,
        }
    }

    /// Create files in `dir` instead of the system temp directory.
    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }

    /// Write the certificate and decrypted key to fresh, uniquely named files.
    ///
    /// The key is decrypted before any file exists, and a failure while
    /// writing the second file removes the first.
    #[instrument(skip(self), fields(company = %id))]
    pub fn materialize(&self, id: CompanyId) -> Result<CredentialFiles, CredentialError> {
        let company = self.store.company(id)?;
        let certificate = company
            .pem_certificate
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(CredentialError::MissingCredential(MissingCredential::Certificate))?;
        let private_key = self
            .store
            .private_key_of(&company)?
            .ok_or(CredentialError::MissingCredential(MissingCredential::PrivateKey))?;

        let certificate = self.write_temp(certificate, ".crt")?;
        let private_key = self.write_temp(&private_key, ".pem")?;
        debug!(
            certificate = %certificate.display(),
            private_key = %private_key.display(),
            "credential files ready"
        );
        Ok(CredentialFiles {
            certificate,
            private_key,
        })
    }

    /// Run `body` with the credential files in place. The files are removed
    /// when the scope ends, whether `body` returns `Ok`, `Err` or panics.
    pub fn with_credential_files<T, E, F>(&self, id: CompanyId, body: F) -> Result<T, E>
    where
        F: FnOnce(&CredentialFiles) -> Result<T, E>,
        E: From<CredentialError>,
    {
        let files = self.materialize(id)?;
        let outcome = body(&files);
        drop(files);
        outcome
    }

    fn write_temp(&self, contents: &[u8], suffix: &str) -> Result<TempPath, CredentialError> {
        let mut builder = Builder::new();
        builder.prefix("aeat-sii-").suffix(suffix);
        let mut file = match &self.tmp_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(CredentialError::storage)?;

        file.write_all(contents).map_err(CredentialError::storage)?;
        file.flush().map_err(CredentialError::storage)?;
        Ok(file.into_temp_path())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        panic::{self, AssertUnwindSafe},
    };

    use aeat_sii_core::storage::{Company, CompanyRepository, InMemoryCompanyRepository};
    use aeat_sii_storage::{key_cipher::KeyCipher, key_provider::generate_key};

    use super::*;
    use crate::{
        pkcs12::Pkcs12Importer,
        test_support::{bundle, self_signed, store, PASSWORD},
    };

    #[derive(Debug)]
    enum CallError {
        Credential(CredentialError),
        Remote(&'static str),
    }

    impl From<CredentialError> for CallError {
        fn from(err: CredentialError) -> Self {
            CallError::Credential(err)
        }
    }

    fn imported_store() -> (
        InMemoryCompanyRepository,
        CredentialStore<InMemoryCompanyRepository, KeyCipher>,
    ) {
        let (repo, store) = store();
        let (pkey, cert) = self_signed("Acme SL");
        let pfx = bundle(&pkey, &cert, Vec::new(), PASSWORD);
        Pkcs12Importer::new(&store)
            .import_bundle(CompanyId(1), &pfx, PASSWORD)
            .expect("import");
        (repo, store)
    }

    fn dir_is_empty(dir: &Path) -> bool {
        fs::read_dir(dir).expect("read dir").next().is_none()
    }

    #[test]
    fn files_hold_credentials_and_vanish_after_scope() {
        let (_repo, store) = imported_store();
        let tmp = tempfile::tempdir().expect("tempdir");
        let materializer = CredentialMaterializer::new(&store).with_tmp_dir(tmp.path());

        let (cert_path, key_path) = materializer
            .with_credential_files(CompanyId(1), |files| {
                let cert = fs::read(files.certificate_path()).map_err(CredentialError::storage)?;
                let key = fs::read(files.private_key_path()).map_err(CredentialError::storage)?;
                assert_eq!(Some(cert), store.certificate(CompanyId(1))?);
                assert_eq!(Some(key), store.private_key(CompanyId(1))?);
                Ok::<_, CredentialError>((
                    files.certificate_path().to_path_buf(),
                    files.private_key_path().to_path_buf(),
                ))
            })
            .expect("scope");

        assert_eq!(cert_path.extension().and_then(|e| e.to_str()), Some("crt"));
        assert_eq!(key_path.extension().and_then(|e| e.to_str()), Some("pem"));
        assert!(!cert_path.exists());
        assert!(!key_path.exists());
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn missing_certificate_is_reported_before_any_file() {
        let (_repo, store) = store();
        let tmp = tempfile::tempdir().expect("tempdir");
        let err = CredentialMaterializer::new(&store)
            .with_tmp_dir(tmp.path())
            .materialize(CompanyId(1))
            .expect_err("no certificate");
        assert_eq!(
            err,
            CredentialError::MissingCredential(MissingCredential::Certificate)
        );
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn certificate_without_key_is_reported() {
        let (_repo, store) = store();
        store
            .set_certificate(CompanyId(1), Some(&b"-----BEGIN CERTIFICATE-----"[..]))
            .expect("set cert");
        let err = CredentialMaterializer::new(&store)
            .materialize(CompanyId(1))
            .expect_err("no key");
        assert_eq!(
            err,
            CredentialError::MissingCredential(MissingCredential::PrivateKey)
        );
    }

    #[test]
    fn rotated_key_aborts_without_leaving_files() {
        let (repo, _store) = imported_store();
        let rotated = CredentialStore::new(repo, KeyCipher::new(&generate_key()));
        let tmp = tempfile::tempdir().expect("tempdir");

        let mut body_ran = false;
        let err = CredentialMaterializer::new(&rotated)
            .with_tmp_dir(tmp.path())
            .with_credential_files(CompanyId(1), |_files| {
                body_ran = true;
                Ok::<_, CredentialError>(())
            })
            .expect_err("rotated key");

        assert!(matches!(err, CredentialError::Decryption { .. }));
        assert!(!body_ran);
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn failing_body_still_cleans_up() {
        let (_repo, store) = imported_store();
        let tmp = tempfile::tempdir().expect("tempdir");
        let mut seen = Vec::new();

        let err = CredentialMaterializer::new(&store)
            .with_tmp_dir(tmp.path())
            .with_credential_files(CompanyId(1), |files| {
                seen.push(files.certificate_path().to_path_buf());
                seen.push(files.private_key_path().to_path_buf());
                Err::<(), _>(CallError::Remote("connection reset"))
            })
            .expect_err("body fails");

        assert!(matches!(err, CallError::Remote("connection reset")));
        assert_eq!(seen.len(), 2);
        assert!(seen.iter().all(|p| !p.exists()));
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn credential_errors_convert_into_caller_error() {
        let (_repo, store) = store();
        let err = CredentialMaterializer::new(&store)
            .with_credential_files(CompanyId(5), |_files| Ok::<_, CallError>(()))
            .expect_err("unknown company");
        assert!(matches!(
            err,
            CallError::Credential(CredentialError::CompanyNotFound { .. })
        ));
    }

    #[test]
    fn panicking_body_still_cleans_up() {
        let (_repo, store) = imported_store();
        let tmp = tempfile::tempdir().expect("tempdir");
        let materializer = CredentialMaterializer::new(&store).with_tmp_dir(tmp.path());

        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            materializer.with_credential_files(CompanyId(1), |_files| -> Result<(), CredentialError> {
                panic!("tls client crashed");
            })
        }));

        assert!(result.is_err());
        assert!(dir_is_empty(tmp.path()));
    }

    #[test]
    fn repeated_scopes_use_distinct_files() {
        let (_repo, store) = imported_store();
        let materializer = CredentialMaterializer::new(&store);
        let first = materializer.materialize(CompanyId(1)).expect("first");
        let second = materializer.materialize(CompanyId(1)).expect("second");

        assert_ne!(first.certificate_path(), second.certificate_path());
        assert_ne!(first.private_key_path(), second.private_key_path());

        let key_path = first.private_key_path().to_path_buf();
        first.close().expect("close");
        assert!(!key_path.exists());
        assert!(second.private_key_path().exists());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let (_repo, store) = imported_store();
        let files = CredentialMaterializer::new(&store)
            .materialize(CompanyId(1))
            .expect("materialize");
        let mode = fs::metadata(files.private_key_path())
            .expect("metadata")
            .permissions()
            .mode();
        assert_eq!(mode & 0o077, 0);
    }

    #[test]
    fn empty_certificate_counts_as_missing() {
        let (repo, store) = store();
        let mut company = Company::new(1, "Acme SL");
        company.pem_certificate = Some(Vec::new());
        repo.save(&company).expect("save");

        let err = CredentialMaterializer::new(&store)
            .materialize(CompanyId(1))
            .expect_err("empty cert");
        assert_eq!(
            err,
            CredentialError::MissingCredential(MissingCredential::Certificate)
        );
    }
}
