/// AEAD providers: AES-GCM (128/192/256) and ChaCha20-Poly1305.
///
/// Every encryption draws a fresh 96-bit nonce from the OS RNG, so a nonce is
/// never deliberately reused under the same key. The 16-byte tag is appended
/// to the ciphertext.
use std::marker::PhantomData;
use std::sync::Arc;

use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, KeyInit, Nonce, Payload};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm};
use chacha20poly1305::ChaCha20Poly1305;
use rand::RngCore;

use super::AeadProvider;
use crate::error::{CryptoError, Result};

pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

pub type Aes192Gcm = AesGcm<Aes192, U12>;

/// Generate a random 96-bit nonce.
pub fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

/// A RustCrypto AEAD cipher with a 96-bit nonce under a fixed algorithm id.
pub struct AeadCipher<C> {
    id: &'static str,
    key_len: usize,
    _cipher: PhantomData<fn() -> C>,
}

impl<C> AeadCipher<C> {
    pub fn new(id: &'static str, key_len: usize) -> Self {
        Self {
            id,
            key_len,
            _cipher: PhantomData,
        }
    }
}

impl<C> AeadCipher<C>
where
    C: KeyInit + Aead<NonceSize = U12>,
{
    fn cipher(&self, key: &[u8]) -> Result<C> {
        if key.len() != self.key_len {
            return Err(CryptoError::Provider(format!(
                "{}: invalid key length {} (expected {})",
                self.id,
                key.len(),
                self.key_len
            )));
        }
        C::new_from_slice(key)
            .map_err(|_| CryptoError::Provider(format!("{}: key rejected", self.id)))
    }
}

impl<C> AeadProvider for AeadCipher<C>
where
    C: KeyInit + Aead<NonceSize = U12>,
{
    fn algorithm_id(&self) -> &str {
        self.id
    }

    fn key_len(&self) -> usize {
        self.key_len
    }

    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        let cipher = self.cipher(key)?;
        let nonce_bytes = generate_nonce();
        let nonce = Nonce::<C>::from_slice(&nonce_bytes);

        let payload = Payload {
            msg: plaintext,
            aad,
        };

        let ciphertext = cipher
            .encrypt(nonce, payload)
            .map_err(|_| CryptoError::Provider(format!("{}: encryption failed", self.id)))?;

        Ok((nonce_bytes.to_vec(), ciphertext))
    }

    fn decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        let cipher = self.cipher(key)?;
        if nonce.len() != NONCE_LEN || ciphertext.len() < TAG_LEN {
            return Err(CryptoError::AuthenticationFailure);
        }
        let nonce = Nonce::<C>::from_slice(nonce);

        let payload = Payload {
            msg: ciphertext,
            aad,
        };

        cipher
            .decrypt(nonce, payload)
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

pub fn builtin_providers() -> Vec<Arc<dyn AeadProvider>> {
    vec![
        Arc::new(AeadCipher::<Aes128Gcm>::new("AES-128-GCM", 16)),
        Arc::new(AeadCipher::<Aes192Gcm>::new("AES-192-GCM", 24)),
        Arc::new(AeadCipher::<Aes256Gcm>::new("AES-256-GCM", 32)),
        Arc::new(AeadCipher::<ChaCha20Poly1305>::new("ChaCha20-Poly1305", 32)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sensitive::SensitiveVec;

    fn providers() -> Vec<Arc<dyn AeadProvider>> {
        builtin_providers()
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip_all_lengths() {
        for p in providers() {
            let key = SensitiveVec::random(p.key_len());
            for len in [0usize, 1, 4096] {
                let plaintext = vec![0x5A; len];
                let (nonce, ct) = p.encrypt(key.as_bytes(), &plaintext, b"aad").unwrap();
                assert_eq!(nonce.len(), NONCE_LEN);
                assert_eq!(ct.len(), len + TAG_LEN);
                let pt = p.decrypt(key.as_bytes(), &nonce, &ct, b"aad").unwrap();
                assert_eq!(pt, plaintext, "{} len {}", p.algorithm_id(), len);
            }
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        for p in providers() {
            let key = SensitiveVec::random(p.key_len());
            let (n1, c1) = p.encrypt(key.as_bytes(), b"same", b"").unwrap();
            let (n2, c2) = p.encrypt(key.as_bytes(), b"same", b"").unwrap();
            assert_ne!(n1, n2);
            assert_ne!(c1, c2);
        }
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        for p in providers() {
            let key = SensitiveVec::random(p.key_len());
            let (nonce, mut ct) = p.encrypt(key.as_bytes(), b"secret", b"").unwrap();
            ct[0] ^= 0xFF;
            let err = p.decrypt(key.as_bytes(), &nonce, &ct, b"").unwrap_err();
            assert!(matches!(err, CryptoError::AuthenticationFailure));
        }
    }

    #[test]
    fn test_wrong_aad_fails() {
        let p = AeadCipher::<Aes256Gcm>::new("AES-256-GCM", 32);
        let key = SensitiveVec::random(32);
        let (nonce, ct) = p.encrypt(key.as_bytes(), b"secret", b"correct").unwrap();
        assert!(p.decrypt(key.as_bytes(), &nonce, &ct, b"wrong").is_err());
    }

    #[test]
    fn test_wrong_key_length_rejected() {
        let p = AeadCipher::<Aes128Gcm>::new("AES-128-GCM", 16);
        let err = p.encrypt(&[0u8; 32], b"x", b"").unwrap_err();
        assert!(matches!(err, CryptoError::Provider(_)));
    }

    #[test]
    fn test_short_nonce_is_auth_failure() {
        let p = AeadCipher::<ChaCha20Poly1305>::new("ChaCha20-Poly1305", 32);
        let key = SensitiveVec::random(32);
        let (_, ct) = p.encrypt(key.as_bytes(), b"x", b"").unwrap();
        let err = p.decrypt(key.as_bytes(), &[0u8; 8], &ct, b"").unwrap_err();
        assert!(matches!(err, CryptoError::AuthenticationFailure));
    }
}
