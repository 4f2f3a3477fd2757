use std::fmt;

use aeat_sii_core::error::ConfigurationError;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE},
    Engine as _,
};
use rand::{rngs::OsRng, RngCore};

/// Key material used for encryption at rest.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// Identifier for logging (never log key bytes).
    pub id: String,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// Source of the process-wide symmetric key. Providers only read; none of
/// them create or persist a key.
pub trait KeyProvider: Send + Sync {
    fn load(&self) -> Result<KeyMaterial, ConfigurationError>;
}

impl<P: KeyProvider + ?Sized> KeyProvider for Box<P> {
    fn load(&self) -> Result<KeyMaterial, ConfigurationError> {
        (**self).load()
    }
}

/// Key supplied as a base64 string from the configuration file or environment.
#[derive(Clone, Default)]
pub struct ConfigKeyProvider {
    secret: Option<String>,
}

impl ConfigKeyProvider {
    pub fn new(secret: Option<String>) -> Self {
        Self { secret }
    }
}

impl KeyProvider for ConfigKeyProvider {
    fn load(&self) -> Result<KeyMaterial, ConfigurationError> {
        match self.secret.as_deref().map(str::trim) {
            Some(secret) if !secret.is_empty() => decode_key(secret),
            _ => Err(ConfigurationError::MissingSecret),
        }
    }
}

/// OS keyring-backed provider. Looks the key up with the `keyring` crate;
/// an absent entry is a missing secret, not a reason to generate one.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl KeyProvider for KeyringProvider {
    fn load(&self) -> Result<KeyMaterial, ConfigurationError> {
        let entry = keyring::Entry::new(&self.service, &self.account).map_err(|e| {
            ConfigurationError::Keyring {
                reason: e.to_string(),
            }
        })?;

        match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            Err(keyring::Error::NoEntry) => Err(ConfigurationError::MissingSecret),
            Err(err) => Err(ConfigurationError::Keyring {
                reason: err.to_string(),
            }),
        }
    }
}

/// In-memory key provider for tests. The default instance has no key.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    material: Option<KeyMaterial>,
}

impl InMemoryKeyProvider {
    pub fn new(material: KeyMaterial) -> Self {
        Self {
            material: Some(material),
        }
    }

    /// Provider holding a freshly generated random key.
    pub fn generated() -> Self {
        Self::new(generate_key())
    }
}

impl KeyProvider for InMemoryKeyProvider {
    fn load(&self) -> Result<KeyMaterial, ConfigurationError> {
        self.material
            .clone()
            .ok_or(ConfigurationError::MissingSecret)
    }
}

pub fn generate_key() -> KeyMaterial {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    KeyMaterial {
        id: "default".to_string(),
        bytes,
    }
}

/// Encode a key the way the configuration expects it (URL-safe base64).
pub fn encode_key(material: &KeyMaterial) -> String {
    URL_SAFE.encode(material.bytes)
}

/// Decode a configured key. Both base64 alphabets are accepted so existing
/// Fernet-style keys keep loading.
pub fn decode_key(secret: &str) -> Result<KeyMaterial, ConfigurationError> {
    let secret = secret.trim();
    let bytes = URL_SAFE
        .decode(secret)
        .or_else(|_| STANDARD.decode(secret))
        .map_err(|e| ConfigurationError::InvalidSecret {
            reason: e.to_string(),
        })?;

    if bytes.len() != 32 {
        return Err(ConfigurationError::InvalidSecret {
            reason: format!("expected 32 bytes, got {}", bytes.len()),
        });
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(KeyMaterial {
        id: "default".to_string(),
        bytes: out,
    })
}
