/// Identity provider for tests.
///
/// Implements every provider trait without any cryptography: "ciphertext" is
/// the plaintext, "signatures" are the message itself. Only reachable when a
/// caller explicitly injects it into a [`super::ProviderSet`]; nothing in the
/// built-in set refers to it.
use super::{AeadProvider, AsymmetricCipherProvider, HashProvider, SignatureProvider};
use crate::error::{CryptoError, Result};

pub struct NullProvider {
    id: String,
}

impl NullProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

impl HashProvider for NullProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn hash(&self, data: &[u8]) -> Result<String> {
        Ok(hex::encode(data))
    }
}

impl AeadProvider for NullProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn key_len(&self) -> usize {
        32
    }

    fn encrypt(&self, _key: &[u8], plaintext: &[u8], _aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        Ok((vec![0u8; 12], plaintext.to_vec()))
    }

    fn decrypt(&self, _key: &[u8], _nonce: &[u8], ciphertext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

impl AsymmetricCipherProvider for NullProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn encrypt(&self, _public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decrypt(&self, _private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
        Ok(ciphertext.to_vec())
    }
}

impl SignatureProvider for NullProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn sign(&self, _private_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn verify(&self, _public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(data == signature)
    }
}

/// Provider that always fails, for exercising error paths.
pub struct FailingProvider {
    id: String,
}

impl FailingProvider {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(CryptoError::Provider(format!("{}: unavailable", self.id)))
    }
}

impl HashProvider for FailingProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn hash(&self, _data: &[u8]) -> Result<String> {
        self.fail()
    }
}

impl AeadProvider for FailingProvider {
    fn algorithm_id(&self) -> &str {
        &self.id
    }

    fn key_len(&self) -> usize {
        32
    }

    fn encrypt(&self, _key: &[u8], _plaintext: &[u8], _aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
        self.fail()
    }

    fn decrypt(&self, _key: &[u8], _nonce: &[u8], _ciphertext: &[u8], _aad: &[u8]) -> Result<Vec<u8>> {
        self.fail()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_identity() {
        let p = NullProvider::new("TEST-NULL");
        let (nonce, ct) = AeadProvider::encrypt(&p, &[], b"abc", b"").unwrap();
        assert_eq!(ct, b"abc");
        assert_eq!(AeadProvider::decrypt(&p, &[], &nonce, &ct, b"").unwrap(), b"abc");
        assert!(SignatureProvider::verify(&p, &[], b"m", b"m").unwrap());
        assert!(!SignatureProvider::verify(&p, &[], b"m", b"n").unwrap());
        assert_eq!(HashProvider::hash(&p, b"\x01").unwrap(), "01");
    }

    #[test]
    fn test_failing_provider_errors() {
        let p = FailingProvider::new("TEST-FAIL");
        assert!(HashProvider::hash(&p, b"x").is_err());
    }
}
