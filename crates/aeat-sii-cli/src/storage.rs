use std::path::PathBuf;

use aeat_sii_storage::{
    credential_store::CredentialStore,
    file_repository::FileCompanyRepository,
    key_cipher::LazyKeyCipher,
    key_provider::{ConfigKeyProvider, KeyProvider, KeyringProvider},
};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

use crate::config::Config;

pub type AppCipher = LazyKeyCipher<Box<dyn KeyProvider>>;
pub type AppStore = CredentialStore<FileCompanyRepository, AppCipher>;

/// Resolve the default data directory.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("aeat-sii"))
}

/// Pick the key source: an explicit key wins, then the keyring, otherwise
/// a provider that reports the key as missing.
pub fn key_provider_from_config(config: &Config) -> Box<dyn KeyProvider> {
    if let Some(key) = config.crypto_key() {
        return Box::new(ConfigKeyProvider::new(Some(key)));
    }
    if let Some(keyring) = &config.keyring {
        debug!(service = %keyring.service, "reading symmetric key from keyring");
        return Box::new(KeyringProvider::new(&keyring.service, &keyring.account));
    }
    Box::new(ConfigKeyProvider::new(None))
}

pub fn cipher_from_config(config: &Config) -> AppCipher {
    LazyKeyCipher::new(key_provider_from_config(config))
}

/// Build the credential store using config overrides.
pub fn store_from_config(config: &Config) -> Result<AppStore> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    debug!(?root, "initializing credential store");
    Ok(CredentialStore::new(
        FileCompanyRepository::new(root),
        cipher_from_config(config),
    ))
}

#[cfg(test)]
mod tests {
    use aeat_sii_core::{error::ConfigurationError, storage::SecretCipher, CredentialError};
    use aeat_sii_storage::key_provider::{encode_key, generate_key};

    use super::*;
    use crate::config::CryptographyConfig;

    #[test]
    fn configured_key_is_used() {
        let config = Config {
            cryptography: Some(CryptographyConfig {
                key: Some(encode_key(&generate_key())),
            }),
            ..Config::default()
        };
        let cipher = cipher_from_config(&config);
        let token = cipher.encrypt(b"probe").expect("encrypt");
        assert_eq!(cipher.decrypt(&token).expect("decrypt"), b"probe");
    }

    #[test]
    fn file_store_uses_configured_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config {
            data_dir: Some(dir.path().to_path_buf()),
            ..Config::default()
        };
        let store = store_from_config(&config).expect("store");
        assert!(aeat_sii_core::storage::CompanyRepository::list(store.repository())
            .expect("list")
            .is_empty());
    }

    #[test]
    fn invalid_key_is_a_configuration_error() {
        let config = Config {
            cryptography: Some(CryptographyConfig {
                key: Some("too-short".into()),
            }),
            ..Config::default()
        };
        let err = cipher_from_config(&config)
            .encrypt(b"probe")
            .expect_err("bad key");
        assert!(matches!(
            err,
            CredentialError::Configuration(ConfigurationError::InvalidSecret { .. })
        ));
    }
}
