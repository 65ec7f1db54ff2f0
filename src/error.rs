use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed failure taxonomy exposed to the governance layer.
///
/// Every `CryptoError` maps to exactly one kind so callers can decide to
/// retry, escalate or reject without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    NotFound,
    DuplicateAlgorithm,
    DuplicateKey,
    UnsupportedAlgorithm,
    InactiveAlgorithm,
    InactiveKey,
    InvalidTransition,
    AuthenticationFailure,
    NoAlgorithmAvailable,
    Io,
    Serialization,
    Provider,
}

#[derive(Error, Debug)]
pub enum CryptoError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Algorithm already registered: {category}/{id}")]
    DuplicateAlgorithm { category: String, id: String },

    #[error("Key already exists: {0}")]
    DuplicateKey(String),

    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Algorithm is not active: {0}")]
    InactiveAlgorithm(String),

    #[error("Key is not active: {0}")]
    InactiveKey(String),

    #[error("Invalid status transition: {0}")]
    InvalidTransition(String),

    #[error("Authentication failed")]
    AuthenticationFailure,

    #[error("No algorithm available for domain '{domain}' and category '{category}'")]
    NoAlgorithmAvailable { domain: String, category: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Provider failure: {0}")]
    Provider(String),
}

impl CryptoError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::Config(_) => ErrorKind::Config,
            CryptoError::NotFound(_) => ErrorKind::NotFound,
            CryptoError::DuplicateAlgorithm { .. } => ErrorKind::DuplicateAlgorithm,
            CryptoError::DuplicateKey(_) => ErrorKind::DuplicateKey,
            CryptoError::UnsupportedAlgorithm(_) => ErrorKind::UnsupportedAlgorithm,
            CryptoError::InactiveAlgorithm(_) => ErrorKind::InactiveAlgorithm,
            CryptoError::InactiveKey(_) => ErrorKind::InactiveKey,
            CryptoError::InvalidTransition(_) => ErrorKind::InvalidTransition,
            CryptoError::AuthenticationFailure => ErrorKind::AuthenticationFailure,
            CryptoError::NoAlgorithmAvailable { .. } => ErrorKind::NoAlgorithmAvailable,
            CryptoError::Io(_) => ErrorKind::Io,
            CryptoError::Serialization(_) => ErrorKind::Serialization,
            CryptoError::Provider(_) => ErrorKind::Provider,
        }
    }
}

impl From<serde_json::Error> for CryptoError {
    fn from(err: serde_json::Error) -> Self {
        CryptoError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            CryptoError::NotFound("x".into()).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            CryptoError::AuthenticationFailure.kind(),
            ErrorKind::AuthenticationFailure
        );
        let io = CryptoError::from(std::io::Error::other("disk"));
        assert_eq!(io.kind(), ErrorKind::Io);
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::NoAlgorithmAvailable).unwrap();
        assert_eq!(json, "\"no_algorithm_available\"");
    }
}
