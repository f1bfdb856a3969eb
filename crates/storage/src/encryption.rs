// Key Vault: VAPID keypair generation and at-rest encryption of site private keys.
// Uses AES-256-GCM keyed by a process-wide secret (VAPID_ENCRYPTION_KEY).
// Ciphertext format is "hex(iv):hex(ciphertext+tag)", self-contained per value.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD as BASE64URL, Engine};
use p256::ecdsa::SigningKey;
use p256::elliptic_curve::rand_core::OsRng;
use rand::RngCore;
use std::sync::Arc;

const IV_SIZE: usize = 12;
const KEY_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum KeyVaultError {
    /// The process secret is missing or not 32 hex-encoded bytes
    #[error("invalid vault key: {0}")]
    InvalidKey(String),

    /// Stored value is not in `iv:ciphertext` hex form
    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    /// Authentication failed (wrong key or corrupted data)
    #[error("decryption failed (wrong key or corrupted data)")]
    Decrypt,

    #[error("encryption failed")]
    Encrypt,
}

/// Freshly generated VAPID keypair, both halves base64url without padding.
#[derive(Debug, Clone)]
pub struct VapidKeypair {
    /// Uncompressed SEC1 point (65 bytes decoded), sent to browsers.
    pub public_key: String,
    /// Raw 32-byte P-256 scalar, the format `web-push` signs with.
    pub private_key: String,
}

/// Symmetric vault for site signing keys. Cheap to clone and share across tasks.
#[derive(Clone)]
pub struct KeyVault {
    cipher: Arc<Aes256Gcm>,
}

impl std::fmt::Debug for KeyVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyVault").finish_non_exhaustive()
    }
}

impl KeyVault {
    /// Create from a 64-char hex secret.
    pub fn new(key_hex: &str) -> Result<Self, KeyVaultError> {
        let key_bytes = hex::decode(key_hex.trim())
            .map_err(|e| KeyVaultError::InvalidKey(format!("not hex: {e}")))?;

        if key_bytes.len() != KEY_SIZE {
            return Err(KeyVaultError::InvalidKey(format!(
                "key must be {} bytes, got {}",
                KEY_SIZE,
                key_bytes.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key_bytes)
            .map_err(|e| KeyVaultError::InvalidKey(e.to_string()))?;

        Ok(Self {
            cipher: Arc::new(cipher),
        })
    }

    /// Create from the VAPID_ENCRYPTION_KEY environment variable.
    pub fn from_env() -> Result<Self, KeyVaultError> {
        let key = std::env::var("VAPID_ENCRYPTION_KEY").map_err(|_| {
            KeyVaultError::InvalidKey("VAPID_ENCRYPTION_KEY environment variable not set".into())
        })?;
        Self::new(&key)
    }

    /// Generate a fresh P-256 keypair for signed push messages. Called once per site.
    pub fn generate_keypair() -> VapidKeypair {
        let signing_key = SigningKey::random(&mut OsRng);
        let public_point = signing_key.verifying_key().to_encoded_point(false);

        VapidKeypair {
            public_key: BASE64URL.encode(public_point.as_bytes()),
            private_key: BASE64URL.encode(signing_key.to_bytes().as_slice()),
        }
    }

    pub fn encrypt(&self, private_key: &str) -> Result<String, KeyVaultError> {
        let mut iv = [0u8; IV_SIZE];
        rand::thread_rng().fill_bytes(&mut iv);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&iv), private_key.as_bytes())
            .map_err(|_| KeyVaultError::Encrypt)?;

        Ok(format!("{}:{}", hex::encode(iv), hex::encode(ciphertext)))
    }

    pub fn decrypt(&self, ciphertext: &str) -> Result<String, KeyVaultError> {
        let (iv_hex, data_hex) = ciphertext
            .split_once(':')
            .ok_or_else(|| KeyVaultError::MalformedCiphertext("missing ':' separator".into()))?;

        let iv = hex::decode(iv_hex)
            .map_err(|e| KeyVaultError::MalformedCiphertext(format!("iv: {e}")))?;
        if iv.len() != IV_SIZE {
            return Err(KeyVaultError::MalformedCiphertext(format!(
                "iv must be {} bytes, got {}",
                IV_SIZE,
                iv.len()
            )));
        }

        let data = hex::decode(data_hex)
            .map_err(|e| KeyVaultError::MalformedCiphertext(format!("data: {e}")))?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&iv), data.as_ref())
            .map_err(|_| KeyVaultError::Decrypt)?;

        String::from_utf8(plaintext).map_err(|_| KeyVaultError::Decrypt)
    }
}

/// Generate a new random vault secret (64 hex chars).
pub fn generate_encryption_key() -> String {
    let mut key = [0u8; KEY_SIZE];
    rand::thread_rng().fill_bytes(&mut key);
    hex::encode(key)
}
