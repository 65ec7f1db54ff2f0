/// Key generation dispatched by algorithm id.
///
/// The algorithm id alone decides key size and curve; the same RSA or curve
/// key family may back several ids (e.g. `RSA-PSS-2048` and `RSA-2048`).
use std::time::Instant;

use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::{RsaPrivateKey, RsaPublicKey};
use tracing::debug;

use super::sensitive::SensitiveVec;
use crate::error::{CryptoError, Result};
use crate::keys::models::{KeyPair, KeyPayload, KeyType};
use crate::registry::AlgorithmCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySpec {
    Aes { key_len: usize },
    ChaCha20Poly1305,
    Rsa { bits: usize },
    P256,
    P384,
    P521,
    Ed25519,
    Ed448,
    X25519,
    X448,
}

impl KeySpec {
    pub fn parse(algorithm_id: &str) -> Result<Self> {
        let spec = match algorithm_id {
            "AES-128-GCM" => KeySpec::Aes { key_len: 16 },
            "AES-192-GCM" => KeySpec::Aes { key_len: 24 },
            "AES-256-GCM" => KeySpec::Aes { key_len: 32 },
            "ChaCha20-Poly1305" => KeySpec::ChaCha20Poly1305,
            "RSA-OAEP-2048" | "RSA-PSS-2048" | "RSA-2048" => KeySpec::Rsa { bits: 2048 },
            "RSA-OAEP-3072" | "RSA-PSS-3072" | "RSA-3072" => KeySpec::Rsa { bits: 3072 },
            "RSA-OAEP-4096" | "RSA-PSS-4096" | "RSA-4096" => KeySpec::Rsa { bits: 4096 },
            "EC-P256" | "ECDSA-P256" => KeySpec::P256,
            "EC-P384" | "ECDSA-P384" => KeySpec::P384,
            "EC-P521" | "ECDSA-P521" => KeySpec::P521,
            "Ed25519" => KeySpec::Ed25519,
            "Ed448" => KeySpec::Ed448,
            "X25519" => KeySpec::X25519,
            "X448" => KeySpec::X448,
            other => {
                return Err(CryptoError::UnsupportedAlgorithm(format!(
                    "no key generator for '{other}'"
                )))
            }
        };
        Ok(spec)
    }

    pub fn key_type(&self) -> KeyType {
        match self {
            KeySpec::Aes { .. } | KeySpec::ChaCha20Poly1305 => KeyType::Symmetric,
            _ => KeyType::Asymmetric,
        }
    }

    /// Family name used in PEM labels for raw (non-PKCS#8) encodings.
    /// `None` means the key is stored as standard PKCS#8 / SPKI.
    pub fn pem_family(&self) -> Option<&'static str> {
        match self {
            KeySpec::Rsa { .. } => None,
            KeySpec::P256 => Some("EC P256"),
            KeySpec::P384 => Some("EC P384"),
            KeySpec::P521 => Some("EC P521"),
            KeySpec::Ed25519 => Some("ED25519"),
            KeySpec::Ed448 => Some("ED448"),
            KeySpec::X25519 => Some("X25519"),
            KeySpec::X448 => Some("X448"),
            KeySpec::Aes { .. } | KeySpec::ChaCha20Poly1305 => None,
        }
    }
}

/// Category an algorithm id generates keys for, inferred from its naming.
pub fn category_of(algorithm_id: &str) -> Result<AlgorithmCategory> {
    let spec = KeySpec::parse(algorithm_id)?;
    let category = match spec {
        KeySpec::Aes { .. } | KeySpec::ChaCha20Poly1305 => AlgorithmCategory::Symmetric,
        KeySpec::Ed25519 | KeySpec::Ed448 => AlgorithmCategory::Signature,
        KeySpec::X25519 | KeySpec::X448 => AlgorithmCategory::Asymmetric,
        KeySpec::Rsa { .. } if algorithm_id.starts_with("RSA-OAEP-") => AlgorithmCategory::Asymmetric,
        KeySpec::Rsa { .. } => AlgorithmCategory::Signature,
        KeySpec::P256 | KeySpec::P384 | KeySpec::P521 if algorithm_id.starts_with("ECDSA-") => {
            AlgorithmCategory::Signature
        }
        KeySpec::P256 | KeySpec::P384 | KeySpec::P521 => AlgorithmCategory::Asymmetric,
    };
    Ok(category)
}

/// Generate fresh key material for `spec`.
pub fn generate(spec: KeySpec) -> Result<KeyPayload> {
    let started = Instant::now();
    let payload = match spec {
        KeySpec::Aes { key_len } => KeyPayload::Symmetric(SensitiveVec::random(key_len)),
        KeySpec::ChaCha20Poly1305 => KeyPayload::Symmetric(SensitiveVec::random(32)),
        KeySpec::Rsa { bits } => KeyPayload::Asymmetric(generate_rsa(bits)?),
        KeySpec::P256 => {
            use p256::elliptic_curve::sec1::ToEncodedPoint;
            let secret = p256::SecretKey::random(&mut OsRng);
            pair(
                secret.to_bytes().to_vec(),
                secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
            )
        }
        KeySpec::P384 => {
            use p384::elliptic_curve::sec1::ToEncodedPoint;
            let secret = p384::SecretKey::random(&mut OsRng);
            pair(
                secret.to_bytes().to_vec(),
                secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
            )
        }
        KeySpec::P521 => {
            use p521::elliptic_curve::sec1::ToEncodedPoint;
            let secret = p521::SecretKey::random(&mut OsRng);
            pair(
                secret.to_bytes().to_vec(),
                secret.public_key().to_encoded_point(false).as_bytes().to_vec(),
            )
        }
        KeySpec::Ed25519 => {
            let signing_key = ed25519_dalek::SigningKey::generate(&mut OsRng);
            pair(
                signing_key.to_bytes().to_vec(),
                signing_key.verifying_key().to_bytes().to_vec(),
            )
        }
        KeySpec::Ed448 => {
            let mut seed = [0u8; 57];
            OsRng.fill_bytes(&mut seed);
            let signing_key = ed448_goldilocks::SigningKey::try_from(&seed[..])
                .map_err(|_| CryptoError::Provider("Ed448: key generation failed".into()))?;
            let public_key = signing_key.verifying_key().to_bytes().to_vec();
            let private = seed.to_vec();
            zeroize::Zeroize::zeroize(&mut seed);
            pair(private, public_key)
        }
        KeySpec::X25519 => {
            let secret = x25519_dalek::StaticSecret::random_from_rng(OsRng);
            let public_key = x25519_dalek::PublicKey::from(&secret);
            pair(secret.to_bytes().to_vec(), public_key.as_bytes().to_vec())
        }
        KeySpec::X448 => {
            let mut seed = [0u8; 56];
            OsRng.fill_bytes(&mut seed);
            let secret = x448::Secret::from_bytes(&seed)
                .ok_or_else(|| CryptoError::Provider("X448: key generation failed".into()))?;
            zeroize::Zeroize::zeroize(&mut seed);
            let public_key = x448::PublicKey::from(&secret);
            pair(secret.as_bytes().to_vec(), public_key.as_bytes().to_vec())
        }
    };

    debug!(
        spec = ?spec,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Key material generated"
    );
    Ok(payload)
}

fn pair(private_key: Vec<u8>, public_key: Vec<u8>) -> KeyPayload {
    KeyPayload::Asymmetric(KeyPair {
        private_key: SensitiveVec::new(private_key),
        public_key,
    })
}

fn generate_rsa(bits: usize) -> Result<KeyPair> {
    let private_key = RsaPrivateKey::new(&mut OsRng, bits)
        .map_err(|_| CryptoError::Provider(format!("RSA-{bits}: key generation failed")))?;
    let public_key = RsaPublicKey::from(&private_key);

    let private_der = private_key
        .to_pkcs8_der()
        .map_err(|_| CryptoError::Provider(format!("RSA-{bits}: private key encoding failed")))?;
    let public_der = public_key
        .to_public_key_der()
        .map_err(|_| CryptoError::Provider(format!("RSA-{bits}: public key encoding failed")))?;

    Ok(KeyPair {
        private_key: SensitiveVec::from_slice(private_der.as_bytes()),
        public_key: public_der.as_bytes().to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symmetric_len(id: &str) -> usize {
        match generate(KeySpec::parse(id).unwrap()).unwrap() {
            KeyPayload::Symmetric(key) => key.len(),
            KeyPayload::Asymmetric(_) => panic!("expected symmetric key"),
        }
    }

    #[test]
    fn test_symmetric_key_sizes() {
        assert_eq!(symmetric_len("AES-128-GCM"), 16);
        assert_eq!(symmetric_len("AES-192-GCM"), 24);
        assert_eq!(symmetric_len("AES-256-GCM"), 32);
        assert_eq!(symmetric_len("ChaCha20-Poly1305"), 32);
    }

    #[test]
    fn test_curve_key_sizes() {
        let cases = [
            ("EC-P256", 32, 65),
            ("ECDSA-P384", 48, 97),
            ("EC-P521", 66, 133),
            ("Ed25519", 32, 32),
            ("Ed448", 57, 57),
            ("X25519", 32, 32),
            ("X448", 56, 56),
        ];
        for (id, private_len, public_len) in cases {
            let pair = generate(KeySpec::parse(id).unwrap())
                .unwrap()
                .into_pair()
                .unwrap();
            assert_eq!(pair.private_key.len(), private_len, "{id}");
            assert_eq!(pair.public_key.len(), public_len, "{id}");
        }
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        assert!(matches!(
            KeySpec::parse("DES-CBC"),
            Err(CryptoError::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_category_inference() {
        assert_eq!(category_of("RSA-OAEP-2048").unwrap(), AlgorithmCategory::Asymmetric);
        assert_eq!(category_of("RSA-2048").unwrap(), AlgorithmCategory::Signature);
        assert_eq!(category_of("RSA-PSS-3072").unwrap(), AlgorithmCategory::Signature);
        assert_eq!(category_of("ECDSA-P256").unwrap(), AlgorithmCategory::Signature);
        assert_eq!(category_of("EC-P256").unwrap(), AlgorithmCategory::Asymmetric);
        assert_eq!(category_of("X448").unwrap(), AlgorithmCategory::Asymmetric);
        assert_eq!(category_of("ChaCha20-Poly1305").unwrap(), AlgorithmCategory::Symmetric);
    }
}
