/// Digest providers: SHA-2, SHA-3 and BLAKE3.
///
/// All digests are returned hex-encoded.
use std::marker::PhantomData;
use std::sync::Arc;

use sha2::{Digest, Sha256, Sha384, Sha512};
use sha3::{Sha3_256, Sha3_384, Sha3_512};

use super::HashProvider;
use crate::error::Result;

/// Any RustCrypto `Digest` under a fixed algorithm id.
pub struct DigestHash<D> {
    id: &'static str,
    _digest: PhantomData<fn() -> D>,
}

impl<D> DigestHash<D> {
    pub fn new(id: &'static str) -> Self {
        Self {
            id,
            _digest: PhantomData,
        }
    }
}

impl<D: Digest> HashProvider for DigestHash<D> {
    fn algorithm_id(&self) -> &str {
        self.id
    }

    fn hash(&self, data: &[u8]) -> Result<String> {
        Ok(hex::encode(D::digest(data)))
    }
}

pub struct Blake3Hash;

impl HashProvider for Blake3Hash {
    fn algorithm_id(&self) -> &str {
        "BLAKE3"
    }

    fn hash(&self, data: &[u8]) -> Result<String> {
        Ok(blake3::hash(data).to_hex().to_string())
    }
}

pub fn builtin_providers() -> Vec<Arc<dyn HashProvider>> {
    vec![
        Arc::new(DigestHash::<Sha256>::new("SHA-256")),
        Arc::new(DigestHash::<Sha384>::new("SHA-384")),
        Arc::new(DigestHash::<Sha512>::new("SHA-512")),
        Arc::new(DigestHash::<Sha3_256>::new("SHA3-256")),
        Arc::new(DigestHash::<Sha3_384>::new("SHA3-384")),
        Arc::new(DigestHash::<Sha3_512>::new("SHA3-512")),
        Arc::new(Blake3Hash),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        let h = DigestHash::<Sha256>::new("SHA-256");
        assert_eq!(
            h.hash(b"abc").unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha3_256_empty_vector() {
        let h = DigestHash::<Sha3_256>::new("SHA3-256");
        assert_eq!(
            h.hash(b"").unwrap(),
            "a7ffc6f8bf1ed76651c14756a061d662f580ff4de43b49fa82d80a4b80f8434a"
        );
    }

    #[test]
    fn test_digest_lengths() {
        for p in builtin_providers() {
            let digest = p.hash(b"zk").unwrap();
            let expected = match p.algorithm_id() {
                "SHA-384" | "SHA3-384" => 96,
                "SHA-512" | "SHA3-512" => 128,
                _ => 64,
            };
            assert_eq!(digest.len(), expected, "{}", p.algorithm_id());
        }
    }

    #[test]
    fn test_verify_recomputes() {
        let h = Blake3Hash;
        let digest = h.hash(b"hello").unwrap();
        assert!(h.verify(b"hello", &digest).unwrap());
        assert!(h.verify(b"hello", &digest.to_uppercase()).unwrap());
        assert!(!h.verify(b"hellO", &digest).unwrap());
        assert!(!h.verify(b"hello", "abcd").unwrap());
    }
}
