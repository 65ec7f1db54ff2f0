/// Algorithm descriptor types.
///
/// Descriptors are keyed by (category, id) and are never deleted, only
/// deprecated. Status is monotone: `Active -> Deprecated`.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// Operation family an algorithm belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlgorithmCategory {
    Hash,
    Symmetric,
    Asymmetric,
    Signature,
}

impl AlgorithmCategory {
    pub const ALL: [AlgorithmCategory; 4] = [
        AlgorithmCategory::Hash,
        AlgorithmCategory::Symmetric,
        AlgorithmCategory::Asymmetric,
        AlgorithmCategory::Signature,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AlgorithmCategory::Hash => "hash",
            AlgorithmCategory::Symmetric => "symmetric",
            AlgorithmCategory::Asymmetric => "asymmetric",
            AlgorithmCategory::Signature => "signature",
        }
    }
}

impl fmt::Display for AlgorithmCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmCategory {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hash" => Ok(AlgorithmCategory::Hash),
            "symmetric" => Ok(AlgorithmCategory::Symmetric),
            "asymmetric" => Ok(AlgorithmCategory::Asymmetric),
            "signature" => Ok(AlgorithmCategory::Signature),
            other => Err(CryptoError::UnsupportedAlgorithm(format!(
                "unknown algorithm category '{other}'"
            ))),
        }
    }
}

/// Lifecycle status shared by algorithms and keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Active,
    Deprecated,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Active => "active",
            Status::Deprecated => "deprecated",
        }
    }

    /// Whether moving from `self` to `next` is allowed. Deprecation is terminal.
    pub fn can_transition_to(&self, next: Status) -> bool {
        !matches!((self, next), (Status::Deprecated, Status::Active))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmDescriptor {
    pub id: String,
    pub category: AlgorithmCategory,
    pub name: String,
    /// Approximate classical security level in bits.
    pub strength_bits: u32,
    pub status: Status,
    pub registered_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlgorithmDescriptor {
    pub fn new(
        id: impl Into<String>,
        category: AlgorithmCategory,
        name: impl Into<String>,
        strength_bits: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            category,
            name: name.into(),
            strength_bits,
            status: Status::Active,
            registered_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == Status::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_parse() {
        assert_eq!(
            "Symmetric".parse::<AlgorithmCategory>().unwrap(),
            AlgorithmCategory::Symmetric
        );
        assert!("stream".parse::<AlgorithmCategory>().is_err());
    }

    #[test]
    fn test_status_is_monotone() {
        assert!(Status::Active.can_transition_to(Status::Deprecated));
        assert!(Status::Active.can_transition_to(Status::Active));
        assert!(Status::Deprecated.can_transition_to(Status::Deprecated));
        assert!(!Status::Deprecated.can_transition_to(Status::Active));
    }
}
