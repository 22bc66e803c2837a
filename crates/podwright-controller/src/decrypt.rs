//! Secret decryption boundary
//!
//! Decrypted values only live in [`DecryptedSecret`], which zeroizes them on
//! drop and never prints them.

use std::fmt;

use async_trait::async_trait;
use base64::Engine;
use zeroize::Zeroizing;

#[cfg(test)]
use mockall::automock;

use podwright_common::{EncryptedRecord, EncryptionConfig, Error, Result};

/// Provider handled by [`Base64Decryptor`]
pub const BASE64_PROVIDER: &str = "base64";

/// Decrypted key/value pairs, in record order
#[derive(Default, Clone)]
pub struct DecryptedSecret {
    values: Vec<(String, Zeroizing<String>)>,
}

impl DecryptedSecret {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value; a repeated key replaces the earlier value in place
    pub fn insert(&mut self, key: impl Into<String>, value: String) {
        let key = key.into();
        let value = Zeroizing::new(value);
        match self.values.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = value,
            None => self.values.push((key, value)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entry decrypted from the first record
    pub fn first(&self) -> Option<(&str, &str)> {
        self.iter().next()
    }

    /// Entries in record order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Debug for DecryptedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecryptedSecret")
            .field("keys", &self.values.iter().map(|(k, _)| k).collect::<Vec<_>>())
            .finish()
    }
}

/// External decryption backend
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Decryptor: Send + Sync {
    /// Decrypt every record; fails with [`Error::Decryption`] on bad
    /// ciphertext or configuration
    async fn decrypt(
        &self,
        config: &EncryptionConfig,
        records: &[EncryptedRecord],
    ) -> Result<DecryptedSecret>;
}

/// Decryptor for base64-encoded records, for local use
#[derive(Clone, Copy, Debug, Default)]
pub struct Base64Decryptor;

#[async_trait]
impl Decryptor for Base64Decryptor {
    async fn decrypt(
        &self,
        config: &EncryptionConfig,
        records: &[EncryptedRecord],
    ) -> Result<DecryptedSecret> {
        if config.provider != BASE64_PROVIDER {
            return Err(Error::decryption(
                records.first().map(|r| r.key.as_str()).unwrap_or_default(),
                format!("unsupported provider '{}'", config.provider),
            ));
        }

        let mut secret = DecryptedSecret::new();
        for record in records {
            let bytes = Zeroizing::new(
                base64::engine::general_purpose::STANDARD
                    .decode(record.ciphertext.trim())
                    .map_err(|e| Error::decryption(&record.key, format!("invalid base64: {e}")))?,
            );
            let value = String::from_utf8(bytes.to_vec())
                .map_err(|_| Error::decryption(&record.key, "value is not valid UTF-8"))?;
            secret.insert(&record.key, value);
        }
        Ok(secret)
    }
}
