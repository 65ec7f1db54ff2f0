/// Key material types.
///
/// Keys are never deleted: deprecated keys stay available to decrypt and
/// verify historical data.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::sensitive::SensitiveVec;
use crate::error::{CryptoError, Result};
use crate::registry::{AlgorithmCategory, Status};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyType {
    Symmetric,
    Asymmetric,
}

impl KeyType {
    pub const ALL: [KeyType; 2] = [KeyType::Symmetric, KeyType::Asymmetric];

    pub fn as_str(&self) -> &'static str {
        match self {
            KeyType::Symmetric => "symmetric",
            KeyType::Asymmetric => "asymmetric",
        }
    }

    /// Prefix of the key store record name: `"<prefix>_<id>"`.
    pub fn store_prefix(&self) -> &'static str {
        match self {
            KeyType::Symmetric => "sym",
            KeyType::Asymmetric => "asym",
        }
    }

    /// Algorithm categories whose keys are of this type.
    pub fn categories(&self) -> &'static [AlgorithmCategory] {
        match self {
            KeyType::Symmetric => &[AlgorithmCategory::Symmetric],
            KeyType::Asymmetric => &[AlgorithmCategory::Asymmetric, AlgorithmCategory::Signature],
        }
    }

    /// Category rotated when a domain has no active key of this type yet.
    pub fn primary_category(&self) -> AlgorithmCategory {
        match self {
            KeyType::Symmetric => AlgorithmCategory::Symmetric,
            KeyType::Asymmetric => AlgorithmCategory::Signature,
        }
    }

    pub fn for_category(category: AlgorithmCategory) -> Result<KeyType> {
        match category {
            AlgorithmCategory::Symmetric => Ok(KeyType::Symmetric),
            AlgorithmCategory::Asymmetric | AlgorithmCategory::Signature => Ok(KeyType::Asymmetric),
            AlgorithmCategory::Hash => Err(CryptoError::UnsupportedAlgorithm(
                "hash algorithms take no keys".into(),
            )),
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyType {
    type Err = CryptoError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "symmetric" | "sym" => Ok(KeyType::Symmetric),
            "asymmetric" | "asym" => Ok(KeyType::Asymmetric),
            other => Err(CryptoError::UnsupportedAlgorithm(format!(
                "unknown key type '{other}'"
            ))),
        }
    }
}

/// Private/public key pair in the encodings described in [`crate::crypto`].
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub private_key: SensitiveVec,
    pub public_key: Vec<u8>,
}

#[derive(Debug, Clone)]
pub enum KeyPayload {
    Symmetric(SensitiveVec),
    Asymmetric(KeyPair),
}

impl KeyPayload {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyPayload::Symmetric(_) => KeyType::Symmetric,
            KeyPayload::Asymmetric(_) => KeyType::Asymmetric,
        }
    }

    pub fn symmetric_key(&self) -> Option<&SensitiveVec> {
        match self {
            KeyPayload::Symmetric(key) => Some(key),
            KeyPayload::Asymmetric(_) => None,
        }
    }

    pub fn key_pair(&self) -> Option<&KeyPair> {
        match self {
            KeyPayload::Asymmetric(pair) => Some(pair),
            KeyPayload::Symmetric(_) => None,
        }
    }

    pub fn into_pair(self) -> Option<KeyPair> {
        match self {
            KeyPayload::Asymmetric(pair) => Some(pair),
            KeyPayload::Symmetric(_) => None,
        }
    }
}

/// A managed key scoped to one domain.
#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub id: Uuid,
    pub key_type: KeyType,
    pub algorithm_id: String,
    /// Category the key serves; at most one active key per (domain, category).
    pub category: AlgorithmCategory,
    pub domain: String,
    pub payload: KeyPayload,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl KeyMaterial {
    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }

    /// Name under which the key store persists this key.
    pub fn store_name(&self) -> String {
        store_name(self.key_type, self.id)
    }

    /// Metadata-only view, safe to log or return from listings.
    pub fn summary(&self) -> KeySummary {
        KeySummary {
            id: self.id,
            key_type: self.key_type,
            algorithm_id: self.algorithm_id.clone(),
            category: self.category,
            domain: self.domain.clone(),
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

pub fn store_name(key_type: KeyType, id: Uuid) -> String {
    format!("{}_{}", key_type.store_prefix(), id)
}

/// Key metadata without any key bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySummary {
    pub id: Uuid,
    pub key_type: KeyType,
    pub algorithm_id: String,
    pub category: AlgorithmCategory,
    pub domain: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_name_prefix() {
        let id = Uuid::nil();
        assert_eq!(
            store_name(KeyType::Symmetric, id),
            "sym_00000000-0000-0000-0000-000000000000"
        );
        assert!(store_name(KeyType::Asymmetric, id).starts_with("asym_"));
    }

    #[test]
    fn test_key_type_for_category() {
        assert_eq!(
            KeyType::for_category(AlgorithmCategory::Signature).unwrap(),
            KeyType::Asymmetric
        );
        assert!(KeyType::for_category(AlgorithmCategory::Hash).is_err());
    }

    #[test]
    fn test_payload_debug_hides_secret() {
        let payload = KeyPayload::Symmetric(SensitiveVec::new(vec![0x41; 16]));
        assert!(!format!("{payload:?}").contains("65"));
    }
}
