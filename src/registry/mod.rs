/// Algorithm registry: catalog of descriptors plus the per-domain active map.
///
/// The active map (`domain -> category -> algorithm id`) is the only place a
/// "current" choice is recorded. Lookups take a read lock; mutations take the
/// write lock only for the metadata change itself.
pub mod catalog;
pub mod models;

use std::collections::BTreeMap;

use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, info};

use crate::error::{CryptoError, Result};
pub use models::{AlgorithmCategory, AlgorithmDescriptor, Status};

#[derive(Default)]
struct RegistryState {
    algorithms: BTreeMap<(AlgorithmCategory, String), AlgorithmDescriptor>,
    active: BTreeMap<String, BTreeMap<AlgorithmCategory, String>>,
    defaults: BTreeMap<AlgorithmCategory, String>,
}

impl RegistryState {
    fn lookup(&self, category: AlgorithmCategory, id: &str) -> Result<&AlgorithmDescriptor> {
        self.algorithms
            .get(&(category, id.to_string()))
            .ok_or_else(|| CryptoError::NotFound(format!("algorithm {category}/{id}")))
    }

    fn is_active(&self, category: AlgorithmCategory, id: &str) -> bool {
        self.lookup(category, id).map(|a| a.is_active()).unwrap_or(false)
    }

    fn domains_mapped_to(&self, category: AlgorithmCategory, id: &str) -> Vec<String> {
        self.active
            .iter()
            .filter(|(_, map)| map.get(&category).map(String::as_str) == Some(id))
            .map(|(domain, _)| domain.clone())
            .collect()
    }

    fn validate_transition(
        &self,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<()> {
        if old_id == new_id {
            return Err(CryptoError::InvalidTransition(format!(
                "cannot transition {category}/{old_id} to itself"
            )));
        }
        self.lookup(category, old_id)?;
        let target = self.lookup(category, new_id)?;
        if !target.is_active() {
            return Err(CryptoError::InactiveAlgorithm(format!("{category}/{new_id}")));
        }
        Ok(())
    }
}

/// Thread-safe algorithm catalog and active-algorithm map.
pub struct AlgorithmRegistry {
    state: RwLock<RegistryState>,
}

impl AlgorithmRegistry {
    /// Create a registry seeded with the built-in catalog.
    ///
    /// `defaults` are the fallback ids used when a domain has no mapping.
    pub fn new(defaults: BTreeMap<AlgorithmCategory, String>) -> Self {
        let mut state = RegistryState {
            defaults,
            ..Default::default()
        };
        for descriptor in catalog::builtin_algorithms() {
            state
                .algorithms
                .insert((descriptor.category, descriptor.id.clone()), descriptor);
        }
        Self {
            state: RwLock::new(state),
        }
    }

    /// Register a new algorithm under `category`.
    pub fn register(
        &self,
        category: AlgorithmCategory,
        mut descriptor: AlgorithmDescriptor,
    ) -> Result<AlgorithmDescriptor> {
        let mut state = self.state.write();
        let key = (category, descriptor.id.clone());
        if state.algorithms.contains_key(&key) {
            return Err(CryptoError::DuplicateAlgorithm {
                category: category.to_string(),
                id: descriptor.id,
            });
        }

        let now = Utc::now();
        descriptor.category = category;
        descriptor.registered_at = now;
        descriptor.updated_at = now;
        state.algorithms.insert(key, descriptor.clone());

        info!(category = %category, algorithm = %descriptor.id, "Algorithm registered");
        Ok(descriptor)
    }

    pub fn get(&self, category: AlgorithmCategory, id: &str) -> Result<AlgorithmDescriptor> {
        self.state.read().lookup(category, id).cloned()
    }

    /// List descriptors, optionally filtered by category and status.
    pub fn list(
        &self,
        category: Option<AlgorithmCategory>,
        status: Option<Status>,
    ) -> Vec<AlgorithmDescriptor> {
        self.state
            .read()
            .algorithms
            .values()
            .filter(|a| category.map_or(true, |c| a.category == c))
            .filter(|a| status.map_or(true, |s| a.status == s))
            .cloned()
            .collect()
    }

    /// Change an algorithm's status. Reactivating a deprecated algorithm fails.
    pub fn update_status(
        &self,
        category: AlgorithmCategory,
        id: &str,
        status: Status,
    ) -> Result<AlgorithmDescriptor> {
        let mut state = self.state.write();
        let descriptor = state
            .algorithms
            .get_mut(&(category, id.to_string()))
            .ok_or_else(|| CryptoError::NotFound(format!("algorithm {category}/{id}")))?;

        if !descriptor.status.can_transition_to(status) {
            return Err(CryptoError::InvalidTransition(format!(
                "algorithm {category}/{id}: {} -> {status}",
                descriptor.status
            )));
        }
        if descriptor.status != status {
            descriptor.status = status;
            descriptor.updated_at = Utc::now();
            info!(category = %category, algorithm = %id, status = %status, "Algorithm status updated");
        }
        Ok(descriptor.clone())
    }

    /// Point `domain` at algorithm `id` for `category`.
    ///
    /// Returns the previously mapped id, if any.
    pub fn set_active(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        id: &str,
    ) -> Result<Option<String>> {
        let mut state = self.state.write();
        if !state.lookup(category, id)?.is_active() {
            return Err(CryptoError::InactiveAlgorithm(format!("{category}/{id}")));
        }
        let previous = state
            .active
            .entry(domain.to_string())
            .or_default()
            .insert(category, id.to_string());

        info!(domain = %domain, category = %category, algorithm = %id, "Active algorithm set");
        Ok(previous)
    }

    /// Effective active algorithm id for `domain`/`category`.
    ///
    /// Uses the domain mapping when it points at an active algorithm, otherwise
    /// the configured default when that is registered and active.
    pub fn get_active(&self, domain: &str, category: AlgorithmCategory) -> Result<String> {
        let state = self.state.read();
        if let Some(id) = state.active.get(domain).and_then(|m| m.get(&category)) {
            if state.is_active(category, id) {
                return Ok(id.clone());
            }
            debug!(domain = %domain, algorithm = %id, "Mapped algorithm inactive, using default");
        }
        match state.defaults.get(&category) {
            Some(id) if state.is_active(category, id) => Ok(id.clone()),
            _ => Err(CryptoError::NoAlgorithmAvailable {
                domain: domain.to_string(),
                category: category.to_string(),
            }),
        }
    }

    /// Raw domain mapping without default fallback.
    pub fn mapped_active(&self, domain: &str, category: AlgorithmCategory) -> Option<String> {
        self.state
            .read()
            .active
            .get(domain)
            .and_then(|m| m.get(&category))
            .cloned()
    }

    pub fn default_for(&self, category: AlgorithmCategory) -> Option<String> {
        self.state.read().defaults.get(&category).cloned()
    }

    /// Domains explicitly mapped to `id` for `category`.
    pub fn domains_using(&self, category: AlgorithmCategory, id: &str) -> Vec<String> {
        self.state.read().domains_mapped_to(category, id)
    }

    /// Validate a transition without applying it. Returns the domains that
    /// would be repointed.
    pub fn check_transition(
        &self,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<Vec<String>> {
        let state = self.state.read();
        state.validate_transition(category, old_id, new_id)?;
        Ok(state.domains_mapped_to(category, old_id))
    }

    /// Deprecate `old_id` and repoint every domain (and the category default)
    /// that used it to `new_id`, all under one write lock.
    pub fn transition(
        &self,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<Vec<String>> {
        let mut state = self.state.write();
        state.validate_transition(category, old_id, new_id)?;

        let now = Utc::now();
        if let Some(old) = state.algorithms.get_mut(&(category, old_id.to_string())) {
            old.status = Status::Deprecated;
            old.updated_at = now;
        }

        let domains = state.domains_mapped_to(category, old_id);
        for domain in &domains {
            if let Some(map) = state.active.get_mut(domain) {
                map.insert(category, new_id.to_string());
            }
        }
        if state.defaults.get(&category).map(String::as_str) == Some(old_id) {
            state.defaults.insert(category, new_id.to_string());
        }

        info!(
            category = %category,
            from = %old_id,
            to = %new_id,
            domains = domains.len(),
            "Algorithm transitioned"
        );
        Ok(domains)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AlgorithmRegistry {
        let defaults = AlgorithmCategory::ALL
            .into_iter()
            .map(|c| (c, catalog::builtin_default(c).to_string()))
            .collect();
        AlgorithmRegistry::new(defaults)
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let reg = registry();
        let before = reg.list(None, None).len();
        let err = reg
            .register(
                AlgorithmCategory::Hash,
                AlgorithmDescriptor::new("SHA-256", AlgorithmCategory::Hash, "dup", 128),
            )
            .unwrap_err();
        assert!(matches!(err, CryptoError::DuplicateAlgorithm { .. }));
        assert_eq!(reg.list(None, None).len(), before);
    }

    #[test]
    fn test_same_id_different_category_allowed() {
        let reg = registry();
        reg.register(
            AlgorithmCategory::Symmetric,
            AlgorithmDescriptor::new("SHA-256", AlgorithmCategory::Symmetric, "odd", 128),
        )
        .unwrap();
        assert!(reg.get(AlgorithmCategory::Symmetric, "SHA-256").is_ok());
    }

    #[test]
    fn test_set_then_get_active() {
        let reg = registry();
        reg.set_active("billing", AlgorithmCategory::Hash, "SHA3-512")
            .unwrap();
        assert_eq!(
            reg.get_active("billing", AlgorithmCategory::Hash).unwrap(),
            "SHA3-512"
        );
        assert_eq!(
            reg.get_active("other", AlgorithmCategory::Hash).unwrap(),
            "SHA-256"
        );
    }

    #[test]
    fn test_set_active_requires_active_algorithm() {
        let reg = registry();
        reg.update_status(AlgorithmCategory::Hash, "SHA-384", Status::Deprecated)
            .unwrap();
        let err = reg
            .set_active("billing", AlgorithmCategory::Hash, "SHA-384")
            .unwrap_err();
        assert!(matches!(err, CryptoError::InactiveAlgorithm(_)));

        let err = reg
            .set_active("billing", AlgorithmCategory::Hash, "MD5")
            .unwrap_err();
        assert!(matches!(err, CryptoError::NotFound(_)));
    }

    #[test]
    fn test_no_reactivation() {
        let reg = registry();
        reg.update_status(AlgorithmCategory::Hash, "SHA-384", Status::Deprecated)
            .unwrap();
        let err = reg
            .update_status(AlgorithmCategory::Hash, "SHA-384", Status::Active)
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidTransition(_)));
    }

    #[test]
    fn test_no_algorithm_available() {
        let reg = AlgorithmRegistry::new(BTreeMap::new());
        let err = reg
            .get_active("billing", AlgorithmCategory::Symmetric)
            .unwrap_err();
        assert!(matches!(err, CryptoError::NoAlgorithmAvailable { .. }));
    }

    #[test]
    fn test_deprecated_mapping_falls_back_to_default() {
        let reg = registry();
        reg.set_active("billing", AlgorithmCategory::Hash, "SHA-512")
            .unwrap();
        reg.update_status(AlgorithmCategory::Hash, "SHA-512", Status::Deprecated)
            .unwrap();
        assert_eq!(
            reg.get_active("billing", AlgorithmCategory::Hash).unwrap(),
            "SHA-256"
        );
    }

    #[test]
    fn test_transition_repoints_all_domains() {
        let reg = registry();
        for domain in ["legacy", "billing"] {
            reg.set_active(domain, AlgorithmCategory::Symmetric, "AES-128-GCM")
                .unwrap();
        }
        reg.set_active("consensus", AlgorithmCategory::Symmetric, "ChaCha20-Poly1305")
            .unwrap();

        let moved = reg
            .transition(AlgorithmCategory::Symmetric, "AES-128-GCM", "AES-256-GCM")
            .unwrap();
        assert_eq!(moved, vec!["billing".to_string(), "legacy".to_string()]);

        for domain in ["legacy", "billing"] {
            assert_eq!(
                reg.get_active(domain, AlgorithmCategory::Symmetric).unwrap(),
                "AES-256-GCM"
            );
        }
        assert_eq!(
            reg.get_active("consensus", AlgorithmCategory::Symmetric)
                .unwrap(),
            "ChaCha20-Poly1305"
        );
        assert_eq!(
            reg.get(AlgorithmCategory::Symmetric, "AES-128-GCM")
                .unwrap()
                .status,
            Status::Deprecated
        );
    }

    #[test]
    fn test_transition_updates_default() {
        let reg = registry();
        reg.transition(AlgorithmCategory::Hash, "SHA-256", "SHA3-256")
            .unwrap();
        assert_eq!(
            reg.get_active("anything", AlgorithmCategory::Hash).unwrap(),
            "SHA3-256"
        );
    }

    #[test]
    fn test_transition_requires_active_target() {
        let reg = registry();
        reg.set_active("legacy", AlgorithmCategory::Symmetric, "AES-128-GCM")
            .unwrap();
        reg.update_status(AlgorithmCategory::Symmetric, "AES-192-GCM", Status::Deprecated)
            .unwrap();
        let err = reg
            .transition(AlgorithmCategory::Symmetric, "AES-128-GCM", "AES-192-GCM")
            .unwrap_err();
        assert!(matches!(err, CryptoError::InactiveAlgorithm(_)));
        // Unchanged on failure
        assert_eq!(
            reg.mapped_active("legacy", AlgorithmCategory::Symmetric)
                .as_deref(),
            Some("AES-128-GCM")
        );
        assert!(reg
            .get(AlgorithmCategory::Symmetric, "AES-128-GCM")
            .unwrap()
            .is_active());
    }
}
