/// Static algorithm catalog seeded into every registry at startup.
///
/// Ids are unique per use: `RSA-OAEP-*` is confidentiality only, `RSA-*` is
/// the legacy PKCS#1 v1.5 signature, `RSA-PSS-*` the probabilistic one.
use super::models::{AlgorithmCategory, AlgorithmDescriptor};

use AlgorithmCategory::{Asymmetric, Hash, Signature, Symmetric};

const CATALOG: &[(&str, AlgorithmCategory, &str, u32)] = &[
    // Hash
    ("SHA-256", Hash, "SHA-2 256-bit", 128),
    ("SHA-384", Hash, "SHA-2 384-bit", 192),
    ("SHA-512", Hash, "SHA-2 512-bit", 256),
    ("SHA3-256", Hash, "SHA-3 256-bit", 128),
    ("SHA3-384", Hash, "SHA-3 384-bit", 192),
    ("SHA3-512", Hash, "SHA-3 512-bit", 256),
    ("BLAKE3", Hash, "BLAKE3 256-bit", 128),
    // Symmetric AEAD
    ("AES-128-GCM", Symmetric, "AES-GCM with 128-bit key", 128),
    ("AES-192-GCM", Symmetric, "AES-GCM with 192-bit key", 192),
    ("AES-256-GCM", Symmetric, "AES-GCM with 256-bit key", 256),
    ("ChaCha20-Poly1305", Symmetric, "ChaCha20-Poly1305", 256),
    // Asymmetric (confidentiality and key agreement)
    ("RSA-OAEP-2048", Asymmetric, "RSA-OAEP (SHA-256) 2048-bit", 112),
    ("RSA-OAEP-3072", Asymmetric, "RSA-OAEP (SHA-256) 3072-bit", 128),
    ("RSA-OAEP-4096", Asymmetric, "RSA-OAEP (SHA-256) 4096-bit", 152),
    ("EC-P256", Asymmetric, "NIST P-256 key pair", 128),
    ("EC-P384", Asymmetric, "NIST P-384 key pair", 192),
    ("EC-P521", Asymmetric, "NIST P-521 key pair", 256),
    ("X25519", Asymmetric, "Curve25519 Diffie-Hellman", 128),
    ("X448", Asymmetric, "Curve448 Diffie-Hellman", 224),
    // Signature
    ("RSA-PSS-2048", Signature, "RSASSA-PSS (SHA-256) 2048-bit", 112),
    ("RSA-PSS-3072", Signature, "RSASSA-PSS (SHA-256) 3072-bit", 128),
    ("RSA-PSS-4096", Signature, "RSASSA-PSS (SHA-256) 4096-bit", 152),
    ("RSA-2048", Signature, "RSASSA-PKCS1-v1_5 (SHA-256) 2048-bit", 112),
    ("RSA-3072", Signature, "RSASSA-PKCS1-v1_5 (SHA-256) 3072-bit", 128),
    ("RSA-4096", Signature, "RSASSA-PKCS1-v1_5 (SHA-256) 4096-bit", 152),
    ("ECDSA-P256", Signature, "ECDSA P-256 with SHA-256", 128),
    ("ECDSA-P384", Signature, "ECDSA P-384 with SHA-384", 192),
    ("ECDSA-P521", Signature, "ECDSA P-521 with SHA-512", 256),
    ("Ed25519", Signature, "Ed25519", 128),
    ("Ed448", Signature, "Ed448", 224),
];

/// Descriptors for every built-in algorithm, all `Active`.
pub fn builtin_algorithms() -> Vec<AlgorithmDescriptor> {
    CATALOG
        .iter()
        .map(|(id, category, name, bits)| AlgorithmDescriptor::new(*id, *category, *name, *bits))
        .collect()
}

/// Built-in default algorithm for a category.
pub fn builtin_default(category: AlgorithmCategory) -> &'static str {
    match category {
        Hash => "SHA-256",
        Symmetric => "AES-256-GCM",
        Asymmetric => "RSA-OAEP-3072",
        Signature => "Ed25519",
    }
}

/// Whether `id` is a built-in algorithm of `category`.
pub fn is_builtin(category: AlgorithmCategory, id: &str) -> bool {
    CATALOG.iter().any(|(i, c, _, _)| *c == category && *i == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_ids_unique() {
        let ids: HashSet<_> = CATALOG.iter().map(|(id, _, _, _)| *id).collect();
        assert_eq!(ids.len(), CATALOG.len());
    }

    #[test]
    fn test_defaults_are_builtin() {
        for category in AlgorithmCategory::ALL {
            assert!(is_builtin(category, builtin_default(category)));
        }
    }

    #[test]
    fn test_builtins_start_active() {
        assert!(builtin_algorithms().iter().all(|a| a.is_active()));
    }
}
