//! Project environment variable decryption.
//!
//! Values are stored as `hex(iv || ciphertext)`, encrypted with AES in CFB
//! mode. The key size (128, 192 or 256 bits) follows from the key length.

use aes::{Aes128, Aes192, Aes256};
use async_trait::async_trait;
use cfb_mode::Decryptor;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use deployio_core::secret::SecretMaterializer;
use deployio_core::{ProjectId, Result};
use deployio_db::ProjectRepo;
use std::sync::Arc;
use tracing::debug;

use crate::{BuildError, BuildResult};

const IV_LEN: usize = 16;

/// Decrypt one stored value.
pub fn decrypt_value(key: &[u8], encoded: &str) -> std::result::Result<String, String> {
    let raw = hex::decode(encoded.trim()).map_err(|e| format!("not hex: {e}"))?;
    if raw.len() < IV_LEN {
        return Err(format!(
            "ciphertext is {} bytes, shorter than the {IV_LEN}-byte IV",
            raw.len()
        ));
    }

    let (iv, ciphertext) = raw.split_at(IV_LEN);
    let mut buf = ciphertext.to_vec();
    let bad_key = |e: cfb_mode::cipher::InvalidLength| e.to_string();
    match key.len() {
        16 => Decryptor::<Aes128>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt(&mut buf),
        24 => Decryptor::<Aes192>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt(&mut buf),
        32 => Decryptor::<Aes256>::new_from_slices(key, iv)
            .map_err(bad_key)?
            .decrypt(&mut buf),
        n => return Err(format!("key must be 16, 24 or 32 bytes, got {n}")),
    }

    String::from_utf8(buf).map_err(|_| "plaintext is not valid UTF-8".to_string())
}

/// Materializes a project's variables from the database with a static key.
pub struct EncryptedEnvMaterializer {
    projects: Arc<dyn ProjectRepo>,
    key: Vec<u8>,
}

impl EncryptedEnvMaterializer {
    pub fn new(projects: Arc<dyn ProjectRepo>, key: Vec<u8>) -> Self {
        Self { projects, key }
    }

    fn decrypt(&self, name: &str, value: &str) -> BuildResult<String> {
        decrypt_value(&self.key, value).map_err(|message| BuildError::Secret {
            key: name.to_string(),
            message,
        })
    }
}

#[async_trait]
impl SecretMaterializer for EncryptedEnvMaterializer {
    async fn materialize(&self, project_id: ProjectId) -> Result<Vec<(String, String)>> {
        let records = self.projects.list_environment(project_id).await?;
        debug!(project_id = %project_id, count = records.len(), "Decrypting environment");

        records
            .into_iter()
            .map(|record| -> Result<(String, String)> {
                let value = self.decrypt(&record.key, &record.value)?;
                Ok((record.key, value))
            })
            .collect()
    }
}
