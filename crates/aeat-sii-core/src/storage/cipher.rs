use crate::CredentialError;

/// Symmetric authenticated encryption used for private keys at rest.
///
/// Implementations must fail `decrypt` on foreign or modified ciphertext
/// instead of returning altered plaintext.
pub trait SecretCipher: Send + Sync {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError>;

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError>;
}

impl<C: SecretCipher + ?Sized> SecretCipher for std::sync::Arc<C> {
    fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        (**self).encrypt(plaintext)
    }

    fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CredentialError> {
        (**self).decrypt(ciphertext)
    }
}
