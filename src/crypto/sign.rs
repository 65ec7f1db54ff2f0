/// Signature providers: RSA-PSS, RSA PKCS#1 v1.5, ECDSA on NIST curves,
/// Ed25519 and Ed448.
///
/// ECDSA digests match the curve: SHA-256 for P-256, SHA-384 for P-384 and
/// SHA-512 for P-521. Verification never errors on a bad signature; it
/// returns `false`.
use std::sync::Arc;

use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::signature::{RandomizedSigner, SignatureEncoding, Signer, Verifier};
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;

use super::SignatureProvider;
use crate::error::{CryptoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RsaPadding {
    Pss,
    Pkcs1v15,
}

pub struct RsaSignature {
    id: &'static str,
    padding: RsaPadding,
}

impl RsaSignature {
    pub fn new(id: &'static str, padding: RsaPadding) -> Self {
        Self { id, padding }
    }

    fn private_key(&self, der: &[u8]) -> Result<RsaPrivateKey> {
        RsaPrivateKey::from_pkcs8_der(der)
            .map_err(|_| CryptoError::Provider(format!("{}: invalid private key", self.id)))
    }

    fn public_key(&self, der: &[u8]) -> Result<RsaPublicKey> {
        RsaPublicKey::from_public_key_der(der)
            .map_err(|_| CryptoError::Provider(format!("{}: invalid public key", self.id)))
    }
}

impl SignatureProvider for RsaSignature {
    fn algorithm_id(&self) -> &str {
        self.id
    }

    fn sign(&self, private_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let key = self.private_key(private_key)?;
        let signature = match self.padding {
            RsaPadding::Pss => rsa::pss::BlindedSigningKey::<Sha256>::new(key)
                .try_sign_with_rng(&mut OsRng, data)
                .map(|s| s.to_vec()),
            RsaPadding::Pkcs1v15 => rsa::pkcs1v15::SigningKey::<Sha256>::new(key)
                .try_sign(data)
                .map(|s| s.to_vec()),
        };
        signature.map_err(|_| CryptoError::Provider(format!("{}: signing failed", self.id)))
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
        let key = self.public_key(public_key)?;
        let valid = match self.padding {
            RsaPadding::Pss => match rsa::pss::Signature::try_from(signature) {
                Ok(sig) => rsa::pss::VerifyingKey::<Sha256>::new(key)
                    .verify(data, &sig)
                    .is_ok(),
                Err(_) => false,
            },
            RsaPadding::Pkcs1v15 => match rsa::pkcs1v15::Signature::try_from(signature) {
                Ok(sig) => rsa::pkcs1v15::VerifyingKey::<Sha256>::new(key)
                    .verify(data, &sig)
                    .is_ok(),
                Err(_) => false,
            },
        };
        Ok(valid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Curve {
    P256,
    P384,
    P521,
}

pub struct Ecdsa {
    id: &'static str,
    curve: Curve,
}

impl Ecdsa {
    pub fn new(id: &'static str, curve: Curve) -> Self {
        Self { id, curve }
    }

    fn bad_private(&self) -> CryptoError {
        CryptoError::Provider(format!("{}: invalid private key", self.id))
    }

    fn bad_public(&self) -> CryptoError {
        CryptoError::Provider(format!("{}: invalid public key", self.id))
    }
}

impl SignatureProvider for Ecdsa {
    fn algorithm_id(&self) -> &str {
        self.id
    }

    fn sign(&self, private_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let signature = match self.curve {
            Curve::P256 => {
                let key = p256::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|_| self.bad_private())?;
                let sig: p256::ecdsa::Signature = key.sign(data);
                sig.to_bytes().to_vec()
            }
            Curve::P384 => {
                let key = p384::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|_| self.bad_private())?;
                let sig: p384::ecdsa::Signature = key.sign(data);
                sig.to_bytes().to_vec()
            }
            Curve::P521 => {
                let key = p521::ecdsa::SigningKey::from_slice(private_key)
                    .map_err(|_| self.bad_private())?;
                let sig: p521::ecdsa::Signature = key.sign(data);
                sig.to_bytes().to_vec()
            }
        };
        Ok(signature)
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
        let valid = match self.curve {
            Curve::P256 => {
                let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| self.bad_public())?;
                p256::ecdsa::Signature::from_slice(signature)
                    .map(|sig| key.verify(data, &sig).is_ok())
                    .unwrap_or(false)
            }
            Curve::P384 => {
                let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| self.bad_public())?;
                p384::ecdsa::Signature::from_slice(signature)
                    .map(|sig| key.verify(data, &sig).is_ok())
                    .unwrap_or(false)
            }
            Curve::P521 => {
                let key = p521::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                    .map_err(|_| self.bad_public())?;
                p521::ecdsa::Signature::from_slice(signature)
                    .map(|sig| key.verify(data, &sig).is_ok())
                    .unwrap_or(false)
            }
        };
        Ok(valid)
    }
}

pub struct Ed25519;

impl SignatureProvider for Ed25519 {
    fn algorithm_id(&self) -> &str {
        "Ed25519"
    }

    fn sign(&self, private_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        let bytes: [u8; 32] = private_key
            .try_into()
            .map_err(|_| CryptoError::Provider("Ed25519: invalid private key".into()))?;
        let key = ed25519_dalek::SigningKey::from_bytes(&bytes);
        Ok(key.sign(data).to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
        let bytes: [u8; 32] = public_key
            .try_into()
            .map_err(|_| CryptoError::Provider("Ed25519: invalid public key".into()))?;
        let key = ed25519_dalek::VerifyingKey::from_bytes(&bytes)
            .map_err(|_| CryptoError::Provider("Ed25519: invalid public key".into()))?;
        Ok(ed25519_dalek::Signature::from_slice(signature)
            .map(|sig| key.verify(data, &sig).is_ok())
            .unwrap_or(false))
    }
}

/// RFC 8032 Ed448 with an empty context. Keys are the 57-byte seed and the
/// 57-byte compressed point.
pub struct Ed448;

impl SignatureProvider for Ed448 {
    fn algorithm_id(&self) -> &str {
        "Ed448"
    }

    fn sign(&self, private_key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        use ::signature::Signer as _;

        let key = ed448_goldilocks::SigningKey::try_from(private_key)
            .map_err(|_| CryptoError::Provider("Ed448: invalid private key".into()))?;
        let sig: ed448_goldilocks::Signature = key.sign(data);
        Ok(sig.to_bytes().to_vec())
    }

    fn verify(&self, public_key: &[u8], data: &[u8], signature: &[u8]) -> Result<bool> {
        use ::signature::Verifier as _;

        let key = <&[u8; 57]>::try_from(public_key)
            .ok()
            .and_then(|bytes| ed448_goldilocks::VerifyingKey::from_bytes(bytes).ok())
            .ok_or(()).map_err(|_| CryptoError::Provider("Ed448: invalid public key".into()))?;
        Ok(ed448_goldilocks::Signature::try_from(signature)
            .map(|sig| key.verify(data, &sig).is_ok())
            .unwrap_or(false))
    }
}

pub fn builtin_providers() -> Vec<Arc<dyn SignatureProvider>> {
    vec![
        Arc::new(RsaSignature::new("RSA-PSS-2048", RsaPadding::Pss)),
        Arc::new(RsaSignature::new("RSA-PSS-3072", RsaPadding::Pss)),
        Arc::new(RsaSignature::new("RSA-PSS-4096", RsaPadding::Pss)),
        Arc::new(RsaSignature::new("RSA-2048", RsaPadding::Pkcs1v15)),
        Arc::new(RsaSignature::new("RSA-3072", RsaPadding::Pkcs1v15)),
        Arc::new(RsaSignature::new("RSA-4096", RsaPadding::Pkcs1v15)),
        Arc::new(Ecdsa::new("ECDSA-P256", Curve::P256)),
        Arc::new(Ecdsa::new("ECDSA-P384", Curve::P384)),
        Arc::new(Ecdsa::new("ECDSA-P521", Curve::P521)),
        Arc::new(Ed25519),
        Arc::new(Ed448),
    ]
}
