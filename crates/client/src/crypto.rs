//! AES-256-GCM account payload decryption.
//!
//! The broker encrypts each account as `base64(nonce ‖ ciphertext ‖ tag)`
//! under a key derived from a secret both sides share: the SHA-256 digest of
//! the secret string. The plaintext is a JSON envelope `{"account": {...}}`.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use poolkeeper_core::{DecryptError, PayloadDecryptor};
use poolkeeper_types::Account;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Nonce length in bytes.
const NONCE_LEN: usize = 12;

/// Authentication tag length in bytes.
const TAG_LEN: usize = 16;

#[derive(Serialize)]
struct EnvelopeRef<'a> {
    account: &'a Account,
}

#[derive(Deserialize)]
struct Envelope {
    account: Account,
}

/// Decrypts account payloads with a key shared with the broker.
#[derive(Clone)]
pub struct AesGcmDecryptor {
    cipher: Aes256Gcm,
}

impl AesGcmDecryptor {
    /// Derive the key from the shared secret.
    pub fn from_shared_secret(secret: &str) -> Self {
        let digest = Sha256::digest(secret.as_bytes());
        let key = Key::<Aes256Gcm>::from_slice(digest.as_slice());
        Self {
            cipher: Aes256Gcm::new(key),
        }
    }

    /// Encrypt an account the way the broker does. Used by tests and tooling
    /// that stand in for the broker.
    pub fn seal(&self, account: &Account) -> Result<String, DecryptError> {
        let plaintext = serde_json::to_vec(&EnvelopeRef { account })
            .map_err(|e| DecryptError::Payload(e.to_string()))?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_slice())
            .map_err(|_| DecryptError::Authentication)?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(sealed))
    }
}

impl PayloadDecryptor for AesGcmDecryptor {
    fn decrypt(&self, payload: &str) -> Result<Account, DecryptError> {
        let sealed = STANDARD
            .decode(payload.trim())
            .map_err(|e| DecryptError::Encoding(e.to_string()))?;
        if sealed.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptError::Encoding(format!(
                "payload is {} bytes, need at least {}",
                sealed.len(),
                NONCE_LEN + TAG_LEN
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecryptError::Authentication)?;

        let envelope: Envelope = serde_json::from_slice(&plaintext)
            .map_err(|e| DecryptError::Payload(e.to_string()))?;
        Ok(envelope.account)
    }
}

impl fmt::Debug for AesGcmDecryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AesGcmDecryptor").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account::new("pool-7@example.com", "1//refresh").with_project_id("proj-7")
    }

    #[test]
    fn test_seal_then_decrypt() {
        let decryptor = AesGcmDecryptor::from_shared_secret("shared secret");
        let sealed = decryptor.seal(&account()).unwrap();

        assert_eq!(decryptor.decrypt(&sealed).unwrap(), account());
    }

    #[test]
    fn test_nonces_differ_per_seal() {
        let decryptor = AesGcmDecryptor::from_shared_secret("shared secret");
        assert_ne!(
            decryptor.seal(&account()).unwrap(),
            decryptor.seal(&account()).unwrap()
        );
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        let sealed = AesGcmDecryptor::from_shared_secret("right")
            .seal(&account())
            .unwrap();
        let err = AesGcmDecryptor::from_shared_secret("wrong")
            .decrypt(&sealed)
            .unwrap_err();
        assert_eq!(err, DecryptError::Authentication);
    }

    #[test]
    fn test_tampered_payload_fails_authentication() {
        let decryptor = AesGcmDecryptor::from_shared_secret("shared secret");
        let mut raw = STANDARD.decode(decryptor.seal(&account()).unwrap()).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;

        let err = decryptor.decrypt(&STANDARD.encode(raw)).unwrap_err();
        assert_eq!(err, DecryptError::Authentication);
    }

    #[test]
    fn test_short_or_garbled_payload_is_encoding_error() {
        let decryptor = AesGcmDecryptor::from_shared_secret("shared secret");
        assert!(matches!(
            decryptor.decrypt("not base64!"),
            Err(DecryptError::Encoding(_))
        ));
        assert!(matches!(
            decryptor.decrypt(&STANDARD.encode([0u8; 20])),
            Err(DecryptError::Encoding(_))
        ));
    }

    #[test]
    fn test_plaintext_without_envelope_is_payload_error() {
        let decryptor = AesGcmDecryptor::from_shared_secret("shared secret");
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = decryptor
            .cipher
            .encrypt(&nonce, br#"{"email":"bare@example.com"}"#.as_slice())
            .unwrap();
        let mut raw = nonce.to_vec();
        raw.extend_from_slice(&ciphertext);

        assert!(matches!(
            decryptor.decrypt(&STANDARD.encode(raw)),
            Err(DecryptError::Payload(_))
        ));
    }
}
