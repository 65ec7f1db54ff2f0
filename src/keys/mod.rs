/// Key lifecycle management.
///
/// Keys are created, looked up, rotated and deprecated per domain. The
/// in-memory catalog mirrors the key store and is loaded from it at startup.
///
/// Rotation is two-phase so callers can make it atomic with other state:
/// 1. `stage` generates the replacement key and records which active keys it
///    retires (no state touched)
/// 2. `persist` writes every staged record, undoing earlier writes on failure
/// 3. `commit` applies the plans to the in-memory catalog (infallible)
///
/// Invariant: at most one active key per (domain, category).
pub mod models;
pub mod store;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::crypto::keygen::{self, KeySpec};
use crate::error::{CryptoError, Result};
use crate::registry::{AlgorithmCategory, Status};
pub use models::{KeyMaterial, KeyPair, KeyPayload, KeySummary, KeyType};
pub use store::{FileKeyStore, KeyRecord, KeyStore, MemoryKeyStore};

/// Criteria for [`KeyLifecycleManager::list`]. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    pub key_type: Option<KeyType>,
    pub category: Option<AlgorithmCategory>,
    pub status: Option<Status>,
    pub domain: Option<String>,
    pub algorithm_id: Option<String>,
}

impl KeyFilter {
    pub fn domain(domain: impl Into<String>) -> Self {
        Self {
            domain: Some(domain.into()),
            ..Default::default()
        }
    }

    fn matches(&self, key: &KeyMaterial) -> bool {
        self.key_type.map_or(true, |t| key.key_type == t)
            && self.category.map_or(true, |c| key.category == c)
            && self.status.map_or(true, |s| key.status == s)
            && self.domain.as_deref().map_or(true, |d| key.domain == d)
            && self
                .algorithm_id
                .as_deref()
                .map_or(true, |a| key.algorithm_id == a)
    }
}

/// A replacement key plus the active keys it retires.
#[derive(Debug, Clone)]
pub struct RotationPlan {
    pub new_key: KeyMaterial,
    pub retired: Vec<Uuid>,
    pub retired_at: DateTime<Utc>,
}

/// Outcome of rotating one (domain, key_type) pair.
#[derive(Debug, Clone)]
pub struct PairRotation {
    pub domain: String,
    pub key_type: KeyType,
    pub new_keys: Vec<KeySummary>,
    pub deprecated: Vec<Uuid>,
}

/// Aggregated result of rotating one domain.
#[derive(Debug)]
pub struct RotationSummary {
    pub domain: String,
    pub rotated: Vec<PairRotation>,
    pub failures: Vec<(KeyType, CryptoError)>,
}

impl RotationSummary {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }
}

enum Undo {
    Remove(String),
    Restore(String, KeyRecord),
}

pub struct KeyLifecycleManager {
    store: Arc<dyn KeyStore>,
    keys: RwLock<BTreeMap<Uuid, KeyMaterial>>,
}

impl KeyLifecycleManager {
    /// Load every readable record from `store`. Unreadable records are logged
    /// and skipped so one corrupt file cannot block startup.
    pub fn load(store: Arc<dyn KeyStore>) -> Result<Self> {
        let mut keys = BTreeMap::new();
        for name in store.list()? {
            let loaded = store
                .get(&name)
                .and_then(|r| r.ok_or_else(|| CryptoError::NotFound(name.clone())))
                .and_then(KeyRecord::into_material);
            match loaded {
                Ok(key) => {
                    keys.insert(key.id, key);
                }
                Err(e) => warn!(record = %name, error = %e, "Skipping unreadable key record"),
            }
        }
        info!(backend = store.name(), keys = keys.len(), "Key catalog loaded");
        Ok(Self {
            store,
            keys: RwLock::new(keys),
        })
    }

    pub fn backend_name(&self) -> &str {
        self.store.name()
    }

    /// Generate and activate a key for `algorithm_id` in `domain`, retiring the
    /// domain's previous active key of the same category.
    pub fn generate(&self, key_type: KeyType, algorithm_id: &str, domain: &str) -> Result<KeyMaterial> {
        let spec = KeySpec::parse(algorithm_id)?;
        if spec.key_type() != key_type {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "{algorithm_id} does not produce {key_type} keys"
            )));
        }
        let category = keygen::category_of(algorithm_id)?;
        let payload = keygen::generate(spec)?;
        self.install(domain, category, algorithm_id, payload)
    }

    /// Activate already generated key material.
    pub fn install(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        algorithm_id: &str,
        payload: KeyPayload,
    ) -> Result<KeyMaterial> {
        let plan = self.stage(domain, category, algorithm_id, payload)?;
        self.persist(std::slice::from_ref(&plan))?;
        self.commit(std::slice::from_ref(&plan));
        Ok(plan.new_key)
    }

    pub fn get(&self, id: Uuid) -> Result<KeyMaterial> {
        self.keys
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| CryptoError::NotFound(format!("key {id}")))
    }

    /// Matching keys, oldest first.
    pub fn list(&self, filter: &KeyFilter) -> Vec<KeyMaterial> {
        let mut keys: Vec<_> = self
            .keys
            .read()
            .values()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect();
        keys.sort_by_key(|k| (k.created_at, k.id));
        keys
    }

    /// The active key for (domain, category), newest if several exist.
    pub fn active_key(&self, domain: &str, category: AlgorithmCategory) -> Option<KeyMaterial> {
        self.keys
            .read()
            .values()
            .filter(|k| k.is_active() && k.domain == domain && k.category == category)
            .max_by_key(|k| (k.created_at, k.id))
            .cloned()
    }

    /// Domains holding an active key of `algorithm_id` in `category`.
    pub fn domains_with_active(&self, category: AlgorithmCategory, algorithm_id: &str) -> Vec<String> {
        let mut domains: Vec<String> = self
            .keys
            .read()
            .values()
            .filter(|k| k.is_active() && k.category == category && k.algorithm_id == algorithm_id)
            .map(|k| k.domain.clone())
            .collect();
        domains.sort();
        domains.dedup();
        domains
    }

    /// Change a key's status. Deprecation is terminal.
    pub fn update_status(&self, id: Uuid, status: Status) -> Result<KeyMaterial> {
        let mut keys = self.keys.write();
        let key = keys
            .get(&id)
            .ok_or_else(|| CryptoError::NotFound(format!("key {id}")))?;

        if !key.status.can_transition_to(status) {
            return Err(CryptoError::InvalidTransition(format!(
                "key {id}: {} -> {status}",
                key.status
            )));
        }
        if key.status == status {
            return Ok(key.clone());
        }

        let mut updated = key.clone();
        updated.status = status;
        updated.updated_at = Utc::now();
        self.store
            .put(&updated.store_name(), &KeyRecord::from_material(&updated)?)?;
        keys.insert(id, updated.clone());

        info!(key_id = %id, domain = %updated.domain, status = %status, "Key status updated");
        Ok(updated)
    }

    /// Prepare a replacement key for (domain, category) without touching state.
    pub fn stage(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        algorithm_id: &str,
        payload: KeyPayload,
    ) -> Result<RotationPlan> {
        let key_type = KeyType::for_category(category)?;
        if payload.key_type() != key_type {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "{algorithm_id}: {} key material for {category} category",
                payload.key_type()
            )));
        }

        let now = Utc::now();
        let new_key = KeyMaterial {
            id: Uuid::now_v7(),
            key_type,
            algorithm_id: algorithm_id.to_string(),
            category,
            domain: domain.to_string(),
            payload,
            status: Status::Active,
            created_at: now,
            updated_at: now,
        };
        let retired = self
            .keys
            .read()
            .values()
            .filter(|k| k.is_active() && k.domain == domain && k.category == category)
            .map(|k| k.id)
            .collect();

        Ok(RotationPlan {
            new_key,
            retired,
            retired_at: now,
        })
    }

    /// Write every staged record. On any failure, previously written records
    /// are undone and the error is returned.
    pub fn persist(&self, plans: &[RotationPlan]) -> Result<()> {
        let mut undo = Vec::new();
        for plan in plans {
            if let Err(e) = self.persist_plan(plan, &mut undo) {
                error!(domain = %plan.new_key.domain, error = %e, "Persisting rotation failed, rolling back");
                self.undo(undo);
                return Err(e);
            }
        }
        Ok(())
    }

    fn persist_plan(&self, plan: &RotationPlan, undo: &mut Vec<Undo>) -> Result<()> {
        let name = plan.new_key.store_name();
        if self.keys.read().contains_key(&plan.new_key.id) || self.store.get(&name)?.is_some() {
            return Err(CryptoError::DuplicateKey(name));
        }
        self.store
            .put(&name, &KeyRecord::from_material(&plan.new_key)?)?;
        undo.push(Undo::Remove(name));

        for id in &plan.retired {
            let current = self.get(*id)?;
            let previous = KeyRecord::from_material(&current)?;
            let mut deprecated = current;
            deprecated.status = Status::Deprecated;
            deprecated.updated_at = plan.retired_at;

            let name = deprecated.store_name();
            self.store
                .put(&name, &KeyRecord::from_material(&deprecated)?)?;
            undo.push(Undo::Restore(name, previous));
        }
        Ok(())
    }

    fn undo(&self, undo: Vec<Undo>) {
        for step in undo.into_iter().rev() {
            let result = match &step {
                Undo::Remove(name) => self.store.remove(name),
                Undo::Restore(name, record) => self.store.put(name, record),
            };
            if let Err(e) = result {
                error!(error = %e, "Key store rollback step failed");
            }
        }
    }

    /// Undo persisted plans that will not be committed.
    pub fn rollback(&self, plans: &[RotationPlan]) {
        let mut undo = Vec::new();
        for plan in plans {
            undo.push(Undo::Remove(plan.new_key.store_name()));
            for id in &plan.retired {
                if let Ok(current) = self.get(*id) {
                    match KeyRecord::from_material(&current) {
                        Ok(record) => undo.push(Undo::Restore(current.store_name(), record)),
                        Err(e) => error!(key_id = %id, error = %e, "Cannot rebuild key record"),
                    }
                }
            }
        }
        self.undo(undo);
    }

    /// Apply persisted plans to the in-memory catalog.
    pub fn commit(&self, plans: &[RotationPlan]) {
        let mut keys = self.keys.write();
        for plan in plans {
            for id in &plan.retired {
                if let Some(key) = keys.get_mut(id) {
                    key.status = Status::Deprecated;
                    key.updated_at = plan.retired_at;
                }
            }
            keys.insert(plan.new_key.id, plan.new_key.clone());
            info!(
                domain = %plan.new_key.domain,
                category = %plan.new_key.category,
                algorithm = %plan.new_key.algorithm_id,
                key_id = %plan.new_key.id,
                retired = plan.retired.len(),
                "Key activated"
            );
        }
    }

    /// Categories a rotation of `key_type` in `domain` replaces: those holding
    /// an active key, or the type's primary category when none do.
    pub fn rotation_categories(&self, domain: &str, key_type: KeyType) -> Vec<AlgorithmCategory> {
        let keys = self.keys.read();
        let categories: Vec<_> = key_type
            .categories()
            .iter()
            .copied()
            .filter(|c| {
                keys.values()
                    .any(|k| k.is_active() && k.domain == domain && k.category == *c)
            })
            .collect();
        if categories.is_empty() {
            vec![key_type.primary_category()]
        } else {
            categories
        }
    }

    /// Active keys older than `max_age` at `now`.
    pub fn due_for_rotation(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<KeySummary> {
        self.keys
            .read()
            .values()
            .filter(|k| k.is_active() && k.created_at + max_age <= now)
            .map(KeyMaterial::summary)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> KeyLifecycleManager {
        KeyLifecycleManager::load(Arc::new(MemoryKeyStore::new())).unwrap()
    }

    #[test]
    fn test_generate_symmetric() {
        let m = manager();
        let key = m
            .generate(KeyType::Symmetric, "AES-256-GCM", "billing")
            .unwrap();
        assert_eq!(key.status, Status::Active);
        assert_eq!(key.category, AlgorithmCategory::Symmetric);
        assert_eq!(key.payload.symmetric_key().unwrap().len(), 32);
        assert_eq!(m.get(key.id).unwrap().algorithm_id, "AES-256-GCM");
    }

    #[test]
    fn test_generate_rejects_wrong_key_type() {
        let m = manager();
        let err = m
            .generate(KeyType::Asymmetric, "AES-256-GCM", "billing")
            .unwrap_err();
        assert!(matches!(err, CryptoError::UnsupportedAlgorithm(_)));
        assert!(m.list(&KeyFilter::default()).is_empty());
    }

    #[test]
    fn test_generate_retires_previous_active_in_category() {
        let m = manager();
        let first = m
            .generate(KeyType::Symmetric, "AES-128-GCM", "billing")
            .unwrap();
        let sign = m.generate(KeyType::Asymmetric, "Ed25519", "billing").unwrap();
        let second = m
            .generate(KeyType::Symmetric, "ChaCha20-Poly1305", "billing")
            .unwrap();

        assert_eq!(m.get(first.id).unwrap().status, Status::Deprecated);
        assert_eq!(m.get(sign.id).unwrap().status, Status::Active);
        assert_eq!(
            m.active_key("billing", AlgorithmCategory::Symmetric)
                .unwrap()
                .id,
            second.id
        );
    }

    #[test]
    fn test_domains_are_independent() {
        let m = manager();
        let a = m.generate(KeyType::Symmetric, "AES-256-GCM", "a").unwrap();
        m.generate(KeyType::Symmetric, "AES-256-GCM", "b").unwrap();
        assert!(m.get(a.id).unwrap().is_active());
    }

    #[test]
    fn test_update_status_is_monotone() {
        let m = manager();
        let key = m
            .generate(KeyType::Symmetric, "AES-256-GCM", "billing")
            .unwrap();
        m.update_status(key.id, Status::Deprecated).unwrap();
        let err = m.update_status(key.id, Status::Active).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidTransition(_)));
        assert!(matches!(
            m.update_status(Uuid::now_v7(), Status::Deprecated),
            Err(CryptoError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_filters() {
        let m = manager();
        m.generate(KeyType::Symmetric, "AES-256-GCM", "billing").unwrap();
        m.generate(KeyType::Asymmetric, "Ed25519", "billing").unwrap();
        m.generate(KeyType::Symmetric, "AES-256-GCM", "consensus").unwrap();

        assert_eq!(m.list(&KeyFilter::domain("billing")).len(), 2);
        let filter = KeyFilter {
            key_type: Some(KeyType::Symmetric),
            ..Default::default()
        };
        assert_eq!(m.list(&filter).len(), 2);
        let filter = KeyFilter {
            category: Some(AlgorithmCategory::Signature),
            status: Some(Status::Active),
            ..Default::default()
        };
        assert_eq!(m.list(&filter).len(), 1);
    }

    #[test]
    fn test_catalog_reloads_from_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let store = Arc::new(FileKeyStore::open(dir.path()).unwrap());
            let m = KeyLifecycleManager::load(store).unwrap();
            let old = m.generate(KeyType::Symmetric, "AES-128-GCM", "legacy").unwrap();
            m.generate(KeyType::Symmetric, "AES-256-GCM", "legacy").unwrap();
            old.id
        };

        let store = Arc::new(FileKeyStore::open(dir.path()).unwrap());
        let m = KeyLifecycleManager::load(store).unwrap();
        assert_eq!(m.list(&KeyFilter::default()).len(), 2);
        assert_eq!(m.get(id).unwrap().status, Status::Deprecated);
        assert_eq!(
            m.active_key("legacy", AlgorithmCategory::Symmetric)
                .unwrap()
                .algorithm_id,
            "AES-256-GCM"
        );
    }

    #[test]
    fn test_corrupt_record_skipped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sym_broken.json"), b"{not json").unwrap();
        let store = Arc::new(FileKeyStore::open(dir.path()).unwrap());
        let m = KeyLifecycleManager::load(store).unwrap();
        assert!(m.list(&KeyFilter::default()).is_empty());
    }

    #[test]
    fn test_rollback_restores_store() {
        let store = Arc::new(MemoryKeyStore::new());
        let m = KeyLifecycleManager::load(store.clone()).unwrap();
        let old = m.generate(KeyType::Symmetric, "AES-128-GCM", "legacy").unwrap();

        let payload = keygen::generate(KeySpec::parse("AES-256-GCM").unwrap()).unwrap();
        let plan = m
            .stage("legacy", AlgorithmCategory::Symmetric, "AES-256-GCM", payload)
            .unwrap();
        m.persist(std::slice::from_ref(&plan)).unwrap();
        assert_eq!(store.list().unwrap().len(), 2);

        m.rollback(std::slice::from_ref(&plan));
        assert_eq!(store.list().unwrap(), vec![old.store_name()]);
        let record = store.get(&old.store_name()).unwrap().unwrap();
        assert_eq!(record.status, Status::Active);
        assert!(m.get(old.id).unwrap().is_active());
    }

    #[test]
    fn test_rotation_categories() {
        let m = manager();
        assert_eq!(
            m.rotation_categories("billing", KeyType::Asymmetric),
            vec![AlgorithmCategory::Signature]
        );
        m.generate(KeyType::Asymmetric, "X25519", "billing").unwrap();
        assert_eq!(
            m.rotation_categories("billing", KeyType::Asymmetric),
            vec![AlgorithmCategory::Asymmetric]
        );
    }

    #[test]
    fn test_due_for_rotation() {
        let m = manager();
        let key = m.generate(KeyType::Symmetric, "AES-256-GCM", "billing").unwrap();
        let now = Utc::now();
        assert!(m.due_for_rotation(now, Duration::days(90)).is_empty());
        let due = m.due_for_rotation(now + Duration::days(91), Duration::days(90));
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, key.id);
    }
}
