/// Asymmetric confidentiality: RSA-OAEP with SHA-256.
///
/// Key-agreement key types (X25519, X448, NIST curves) are registered in the
/// asymmetric category but have no provider here, so encrypt/decrypt with them
/// resolves to `UnsupportedAlgorithm`.
use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::AsymmetricCipherProvider;
use crate::error::{CryptoError, Result};

pub struct RsaOaep {
    id: &'static str,
    bits: usize,
}

impl RsaOaep {
    pub fn new(id: &'static str, bits: usize) -> Self {
        Self { id, bits }
    }

    /// Largest plaintext accepted: k - 2*hLen - 2.
    pub fn max_plaintext_len(&self) -> usize {
        self.bits / 8 - 2 * 32 - 2
    }
}

impl AsymmetricCipherProvider for RsaOaep {
    fn algorithm_id(&self) -> &str {
        self.id
    }

    fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > self.max_plaintext_len() {
            return Err(CryptoError::Provider(format!(
                "{}: plaintext exceeds {} bytes",
                self.id,
                self.max_plaintext_len()
            )));
        }
        let public_key = RsaPublicKey::from_public_key_der(public_key)
            .map_err(|_| CryptoError::Provider(format!("{}: invalid public key", self.id)))?;
        public_key
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|_| CryptoError::Provider(format!("{}: encryption failed", self.id)))
    }

    fn decrypt(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        let private_key = RsaPrivateKey::from_pkcs8_der(private_key)
            .map_err(|_| CryptoError::Provider(format!("{}: invalid private key", self.id)))?;
        private_key
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}

pub fn builtin_providers() -> Vec<Arc<dyn AsymmetricCipherProvider>> {
    vec![
        Arc::new(RsaOaep::new("RSA-OAEP-2048", 2048)),
        Arc::new(RsaOaep::new("RSA-OAEP-3072", 3072)),
        Arc::new(RsaOaep::new("RSA-OAEP-4096", 4096)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keygen::{generate, KeySpec};

    #[test]
    fn test_oaep_roundtrip() {
        let pair = generate(KeySpec::parse("RSA-OAEP-2048").unwrap())
            .unwrap()
            .into_pair()
            .unwrap();
        let p = RsaOaep::new("RSA-OAEP-2048", 2048);

        let ct = p.encrypt(&pair.public_key, b"session key").unwrap();
        assert_eq!(ct.len(), 256);
        assert_eq!(p.decrypt(pair.private_key.as_bytes(), &ct).unwrap(), b"session key");

        let mut tampered = ct.clone();
        tampered[10] ^= 0x01;
        assert!(matches!(
            p.decrypt(pair.private_key.as_bytes(), &tampered),
            Err(CryptoError::AuthenticationFailure)
        ));

        let too_long = vec![0u8; p.max_plaintext_len() + 1];
        assert!(p.encrypt(&pair.public_key, &too_long).is_err());
    }

    #[test]
    fn test_garbage_key_rejected() {
        let p = RsaOaep::new("RSA-OAEP-2048", 2048);
        assert!(matches!(
            p.encrypt(b"not a key", b"x"),
            Err(CryptoError::Provider(_))
        ));
    }
}
