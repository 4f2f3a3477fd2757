/// How the virtual private-key field is read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PrivateKeyMode {
    /// Decrypted PEM bytes.
    #[default]
    Content,
    /// Only the decrypted length. Saves UI callers from holding the secret,
    /// but the key is still decrypted to measure it.
    Size,
}

/// Value of the virtual private-key field for one company.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrivateKeyField {
    Content(Option<Vec<u8>>),
    /// Zero when no key is stored.
    Size(usize),
}

impl PrivateKeyField {
    pub fn from_key(mode: PrivateKeyMode, key: Option<Vec<u8>>) -> Self {
        match mode {
            PrivateKeyMode::Content => PrivateKeyField::Content(key),
            PrivateKeyMode::Size => PrivateKeyField::Size(key.map_or(0, |k| k.len())),
        }
    }
}
