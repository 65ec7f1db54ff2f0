/// Buffer for secret key bytes that is zeroized when dropped.
use std::fmt;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// Variable-length secret buffer. `Debug` never prints the contents.
#[derive(Clone, Zeroize, ZeroizeOnDrop, PartialEq, Eq)]
pub struct SensitiveVec(Vec<u8>);

impl SensitiveVec {
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self(data.to_vec())
    }

    /// Fill a new buffer of `len` bytes from the OS RNG.
    pub fn random(len: usize) -> Self {
        use rand::RngCore;

        let mut data = vec![0u8; len];
        rand::rngs::OsRng.fill_bytes(&mut data);
        Self(data)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for SensitiveVec {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SensitiveVec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveVec(<{} bytes redacted>)", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensitive_vec() {
        let v = SensitiveVec::new(vec![1, 2, 3]);
        assert_eq!(v.len(), 3);
        assert!(!v.is_empty());
        assert_eq!(v.as_bytes(), &[1, 2, 3]);
    }

    #[test]
    fn test_random_lengths_and_uniqueness() {
        let a = SensitiveVec::random(32);
        let b = SensitiveVec::random(32);
        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
    }

    #[test]
    fn test_debug_redacts() {
        let v = SensitiveVec::new(vec![0xAA; 4]);
        let shown = format!("{v:?}");
        assert!(!shown.contains("170"));
        assert!(shown.contains("redacted"));
    }
}
