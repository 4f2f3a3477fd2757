use std::{fmt, sync::OnceLock, time::Duration};

use aeat_sii_core::{storage::SecretCipher, CredentialError};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE, Engine as _};
use chrono::{DateTime, Utc};
use tracing::error;

use crate::key_provider::{KeyMaterial, KeyProvider};

const TOKEN_VERSION: u8 = 0x80;
const HEADER_LEN: usize = 1 + 8;
const NONCE_LEN: usize = 12;
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// AES-256-GCM token cipher for private keys at rest.
///
/// Tokens are URL-safe base64 of `version || issued_at || nonce || ciphertext`.
/// The version byte and the big-endian unix timestamp are authenticated as
/// associated data, so any modification fails decryption.
pub struct KeyCipher {
    key_id: String,
    cipher: Aes256Gcm,
}

impl fmt::Debug for KeyCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCipher")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

impl KeyCipher {
    pub fn new(material: &KeyMaterial) -> Self {
        Self {
            key_id: material.id.clone(),
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&material.bytes)),
        }
    }

    pub fn from_provider<P: KeyProvider + ?Sized>(provider: &P) -> Result<Self, CredentialError> {
        let material = provider.load()?;
        Ok(Self::new(&material))
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        self.seal(plaintext, now_secs())
    }

    pub fn decrypt(&self, token: &[u8]) -> Result<Vec<u8>, CredentialError> {
        self.open(token).map(|(_, plaintext)| plaintext)
    }

    /// Decrypt, additionally rejecting tokens older than `ttl` or stamped
    /// too far in the future.
    pub fn decrypt_with_ttl(&self, token: &[u8], ttl: Duration) -> Result<Vec<u8>, CredentialError> {
        let (issued_at, plaintext) = self.open(token)?;
        let now = now_secs();
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);

        if issued_at > now.saturating_add(MAX_CLOCK_SKEW_SECS) {
            return Err(CredentialError::decryption("token timestamp is in the future"));
        }
        if now.saturating_sub(issued_at) > ttl {
            return Err(CredentialError::decryption("token has expired"));
        }
        Ok(plaintext)
    }

    /// Authenticated issue time of a token.
    pub fn issued_at(&self, token: &[u8]) -> Result<DateTime<Utc>, CredentialError> {
        let (issued_at, _) = self.open(token)?;
        DateTime::<Utc>::from_timestamp(issued_at, 0)
            .ok_or_else(|| CredentialError::decryption("token timestamp out of range"))
    }

    fn seal(&self, plaintext: &[u8], issued_at: i64) -> Result<Vec<u8>, CredentialError> {
        let mut header = [0u8; HEADER_LEN];
        header[0] = TOKEN_VERSION;
        header[1..].copy_from_slice(&issued_at.max(0).to_be_bytes());

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext,
                    aad: &header,
                },
            )
            .map_err(|e| CredentialError::storage(format!("encrypt failed: {e}")))?;

        let mut raw = Vec::with_capacity(HEADER_LEN + NONCE_LEN + ciphertext.len());
        raw.extend_from_slice(&header);
        raw.extend_from_slice(nonce.as_slice());
        raw.extend_from_slice(&ciphertext);
        Ok(URL_SAFE.encode(raw).into_bytes())
    }

    fn open(&self, token: &[u8]) -> Result<(i64, Vec<u8>), CredentialError> {
        let raw = URL_SAFE
            .decode(token)
            .map_err(|e| CredentialError::decryption(format!("token decode failed: {e}")))?;

        if raw.len() < HEADER_LEN + NONCE_LEN {
            return Err(CredentialError::decryption("token too short"));
        }
        let (header, rest) = raw.split_at(HEADER_LEN);
        if header[0] != TOKEN_VERSION {
            return Err(CredentialError::decryption("unknown token version"));
        }
        let (nonce, ciphertext) = rest.split_at(NONCE_LEN);

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(nonce),
                Payload {
                    msg: ciphertext,
                    aad: header,
                },
            )
            .map_err(|_| CredentialError::decryption("invalid token or wrong key"))?;

        let mut stamp = [0u8; 8];
        stamp.copy_from_slice(&header[1..]);
        Ok((i64::from_be_bytes(stamp), plaintext))
    }
}

impl SecretCipher for KeyCipher {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        KeyCipher::encrypt(self, plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        KeyCipher::decrypt(self, ciphertext)
    }
}

/// Cipher whose key is read from a [`KeyProvider`] on first use and kept for
/// the rest of the process. A missing key is not cached, so fixing the
/// configuration takes effect on the next call.
pub struct LazyKeyCipher<P: KeyProvider> {
    provider: P,
    cipher: OnceLock<KeyCipher>,
}

impl<P: KeyProvider> LazyKeyCipher<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            cipher: OnceLock::new(),
        }
    }

    pub fn resolve(&self) -> Result<&KeyCipher, CredentialError> {
        if let Some(cipher) = self.cipher.get() {
            return Ok(cipher);
        }
        let material = self.provider.load().map_err(|err| {
            error!(%err, "symmetric key unavailable");
            CredentialError::from(err)
        })?;
        Ok(self.cipher.get_or_init(|| KeyCipher::new(&material)))
    }
}

impl<P: KeyProvider> SecretCipher for LazyKeyCipher<P> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        self.resolve()?.encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        self.resolve()?.decrypt(ciphertext)
    }
}

fn now_secs() -> i64 {
    Utc::now().timestamp()
}
