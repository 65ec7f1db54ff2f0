/// Stateless algorithm providers.
///
/// One trait per operation family. Providers hold no key state: keys are
/// passed in as encoded bytes on every call, so the same provider instance is
/// shared by all domains and all key generations.
///
/// Asymmetric key encodings:
/// - RSA: PKCS#8 DER private key, SPKI DER public key
/// - NIST curves: big-endian scalar, uncompressed SEC1 point
/// - Ed25519 / Ed448 / X25519 / X448: raw native encodings
pub mod aead;
pub mod asymmetric;
pub mod hash;
pub mod keygen;
pub mod null;
pub mod sensitive;
pub mod sign;

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::error::{CryptoError, Result};
use crate::registry::AlgorithmCategory;

/// Digest algorithms.
pub trait HashProvider: Send + Sync {
    fn algorithm_id(&self) -> &str;

    /// Hex-encoded digest of `data`.
    fn hash(&self, data: &[u8]) -> Result<String>;

    /// Recompute and compare against `expected_hex` in constant time.
    fn verify(&self, data: &[u8], expected_hex: &str) -> Result<bool> {
        use subtle::ConstantTimeEq;

        let actual = self.hash(data)?;
        let expected = expected_hex.to_ascii_lowercase();
        Ok(actual.len() == expected.len() && bool::from(actual.as_bytes().ct_eq(expected.as_bytes())))
    }
}

/// Authenticated encryption with associated data.
pub trait AeadProvider: Send + Sync {
    fn algorithm_id(&self) -> &str;

    fn key_len(&self) -> usize;

    /// Encrypt under a fresh random nonce. Returns (nonce, ciphertext_with_tag).
    fn encrypt(&self, key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;

    /// Fails with `AuthenticationFailure` on tag mismatch.
    fn decrypt(&self, key: &[u8], nonce: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>>;
}

/// Public-key encryption for confidentiality.
pub trait AsymmetricCipherProvider: Send + Sync {
    fn algorithm_id(&self) -> &str;

    fn encrypt(&self, public_key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>>;

    fn decrypt(&self, private_key: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>;
}

/// Digital signatures.
pub trait SignatureProvider: Send + Sync {
    fn algorithm_id(&self) -> &str;

    fn sign(&self, private_key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// `Ok(false)` for any mismatch or malformed signature. Errors are reserved
    /// for unusable key material.
    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Provider lookup by algorithm id, one table per category.
///
/// Built once at construction and injected into the service; tests swap in
/// [`null::NullProvider`] here instead of special-casing ids in production code.
#[derive(Clone, Default)]
pub struct ProviderSet {
    hash: HashMap<String, Arc<dyn HashProvider>>,
    aead: HashMap<String, Arc<dyn AeadProvider>>,
    asymmetric: HashMap<String, Arc<dyn AsymmetricCipherProvider>>,
    signature: HashMap<String, Arc<dyn SignatureProvider>>,
}

impl ProviderSet {
    /// Empty set; no algorithm is usable until a provider is added.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Providers for every built-in catalog algorithm that supports operations.
    pub fn builtin() -> Self {
        let mut set = Self::empty();
        for p in hash::builtin_providers() {
            set = set.with_hash(p);
        }
        for p in aead::builtin_providers() {
            set = set.with_aead(p);
        }
        for p in asymmetric::builtin_providers() {
            set = set.with_asymmetric(p);
        }
        for p in sign::builtin_providers() {
            set = set.with_signature(p);
        }
        set
    }

    pub fn with_hash(mut self, provider: Arc<dyn HashProvider>) -> Self {
        self.hash.insert(provider.algorithm_id().to_string(), provider);
        self
    }

    pub fn with_aead(mut self, provider: Arc<dyn AeadProvider>) -> Self {
        self.aead.insert(provider.algorithm_id().to_string(), provider);
        self
    }

    pub fn with_asymmetric(mut self, provider: Arc<dyn AsymmetricCipherProvider>) -> Self {
        self.asymmetric
            .insert(provider.algorithm_id().to_string(), provider);
        self
    }

    pub fn with_signature(mut self, provider: Arc<dyn SignatureProvider>) -> Self {
        self.signature
            .insert(provider.algorithm_id().to_string(), provider);
        self
    }

    pub fn hash(&self, id: &str) -> Result<Arc<dyn HashProvider>> {
        self.hash
            .get(id)
            .cloned()
            .ok_or_else(|| unsupported(AlgorithmCategory::Hash, id))
    }

    pub fn aead(&self, id: &str) -> Result<Arc<dyn AeadProvider>> {
        self.aead
            .get(id)
            .cloned()
            .ok_or_else(|| unsupported(AlgorithmCategory::Symmetric, id))
    }

    pub fn asymmetric(&self, id: &str) -> Result<Arc<dyn AsymmetricCipherProvider>> {
        self.asymmetric
            .get(id)
            .cloned()
            .ok_or_else(|| unsupported(AlgorithmCategory::Asymmetric, id))
    }

    pub fn signature(&self, id: &str) -> Result<Arc<dyn SignatureProvider>> {
        self.signature
            .get(id)
            .cloned()
            .ok_or_else(|| unsupported(AlgorithmCategory::Signature, id))
    }

    /// Whether some provider can run `id` in `category`.
    pub fn supports(&self, category: AlgorithmCategory, id: &str) -> bool {
        match category {
            AlgorithmCategory::Hash => self.hash.contains_key(id),
            AlgorithmCategory::Symmetric => self.aead.contains_key(id),
            AlgorithmCategory::Asymmetric => self.asymmetric.contains_key(id),
            AlgorithmCategory::Signature => self.signature.contains_key(id),
        }
    }
}

fn unsupported(category: AlgorithmCategory, id: &str) -> CryptoError {
    CryptoError::UnsupportedAlgorithm(format!("no {category} provider for '{id}'"))
}

/// Run a provider call, converting a panic inside the primitive library into a
/// typed error. The panic payload is discarded since it may quote inputs.
pub fn guarded<T>(algorithm_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(_) => {
            error!(algorithm = %algorithm_id, "Provider panicked");
            Err(CryptoError::Provider(format!(
                "{algorithm_id}: provider aborted unexpectedly"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_covers_operational_catalog() {
        let set = ProviderSet::builtin();
        for id in ["SHA-256", "SHA3-512", "BLAKE3"] {
            assert!(set.supports(AlgorithmCategory::Hash, id));
        }
        for id in ["AES-128-GCM", "AES-192-GCM", "AES-256-GCM", "ChaCha20-Poly1305"] {
            assert!(set.supports(AlgorithmCategory::Symmetric, id));
        }
        assert!(set.supports(AlgorithmCategory::Asymmetric, "RSA-OAEP-2048"));
        assert!(!set.supports(AlgorithmCategory::Asymmetric, "X25519"));
        for id in ["RSA-PSS-4096", "RSA-2048", "ECDSA-P521", "Ed25519", "Ed448"] {
            assert!(set.supports(AlgorithmCategory::Signature, id));
        }
    }

    #[test]
    fn test_missing_provider_is_unsupported() {
        let set = ProviderSet::empty();
        let err = set.aead("AES-256-GCM").err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::UnsupportedAlgorithm);
    }

    #[test]
    fn test_guarded_converts_panic() {
        let result: Result<()> = guarded("TEST", || panic!("boom"));
        assert!(matches!(result, Err(CryptoError::Provider(_))));
    }
}
