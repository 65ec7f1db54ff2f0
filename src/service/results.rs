use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::keys::KeySummary;
use crate::registry::{AlgorithmCategory, AlgorithmDescriptor};

/// Facade operations, each bound to the category that selects its algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Hash,
    Encrypt,
    Decrypt,
    EncryptAsymmetric,
    DecryptAsymmetric,
    Sign,
    Verify,
}

impl Operation {
    pub fn category(&self) -> AlgorithmCategory {
        match self {
            Operation::Hash => AlgorithmCategory::Hash,
            Operation::Encrypt | Operation::Decrypt => AlgorithmCategory::Symmetric,
            Operation::EncryptAsymmetric | Operation::DecryptAsymmetric => {
                AlgorithmCategory::Asymmetric
            }
            Operation::Sign | Operation::Verify => AlgorithmCategory::Signature,
        }
    }
}

/// Algorithm the facade would use for an operation in a domain.
#[derive(Debug, Clone)]
pub struct Resolved {
    pub domain: String,
    pub operation: Operation,
    pub descriptor: AlgorithmDescriptor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashResult {
    pub algorithm_id: String,
    /// Lowercase hex digest.
    pub hash: String,
    pub timestamp: DateTime<Utc>,
}

/// Ciphertext plus everything needed to decrypt it later. `nonce` is empty
/// for asymmetric encryption.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherResult {
    pub algorithm_id: String,
    pub key_id: Uuid,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub nonce: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureResult {
    pub algorithm_id: String,
    pub key_id: Uuid,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransitionOutcome {
    pub category: AlgorithmCategory,
    pub from: String,
    pub to: String,
    /// Domains whose mapping moved from `from` to `to`.
    pub repointed_domains: Vec<String>,
    /// Domains that received a replacement key.
    pub rotated_domains: Vec<String>,
    pub new_keys: Vec<KeySummary>,
    pub deprecated_keys: Vec<Uuid>,
    /// End of the grace period for data still bound to `from`.
    pub retire_after: DateTime<Utc>,
}
