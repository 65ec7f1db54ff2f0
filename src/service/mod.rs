/// Crypto operation facade.
///
/// Owns the algorithm registry, the key lifecycle manager, the provider set
/// and the audit logger. Call sites name a domain and an operation, never an
/// algorithm:
/// 1. Resolve the domain's active algorithm (or the configured default)
/// 2. Select the domain's active key, generating one if none exists
/// 3. Run the provider primitive outside every lock
/// 4. Emit exactly one audit event describing the outcome
///
/// Decryption and verification resolve the algorithm from the key record,
/// so data produced before a rotation or transition stays readable.
pub mod results;


use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{info, warn};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditEventType, AuditLogger, AuditReport};
use crate::config::CryptoConfig;
use crate::crypto::keygen::{self, KeySpec};
use crate::crypto::sensitive::SensitiveVec;
use crate::crypto::{self, ProviderSet};
use crate::error::{CryptoError, Result};
use crate::keys::{
    FileKeyStore, KeyFilter, KeyLifecycleManager, KeyMaterial, KeyPayload, KeyStore, KeySummary,
    KeyType, PairRotation, RotationSummary,
};
use crate::registry::{AlgorithmCategory, AlgorithmDescriptor, AlgorithmRegistry, Status};
pub use results::{CipherResult, HashResult, Operation, Resolved, SignatureResult, TransitionOutcome};

pub struct CryptoService {
    config: CryptoConfig,
    registry: AlgorithmRegistry,
    keys: KeyLifecycleManager,
    providers: ProviderSet,
    audit: AuditLogger,
    /// Read: key selection for encrypt/sign. Write: registry and key mutations.
    gate: RwLock<()>,
}

impl CryptoService {
    /// Service backed by a [`FileKeyStore`] at `config.key_store_path` and
    /// the built-in providers.
    pub fn new(config: CryptoConfig) -> Result<Self> {
        let store = FileKeyStore::open(&config.key_store_path)?;
        Self::with_parts(config, Arc::new(store), ProviderSet::builtin())
    }

    pub fn with_parts(
        config: CryptoConfig,
        store: Arc<dyn KeyStore>,
        providers: ProviderSet,
    ) -> Result<Self> {
        for problem in config.validate() {
            warn!(problem = %problem, "Configuration problem");
        }
        let registry = AlgorithmRegistry::new(config.effective_defaults());
        let keys = KeyLifecycleManager::load(store)?;
        let audit = AuditLogger::new(&config.audit);

        info!(
            domains = config.domains.len(),
            key_store = keys.backend_name(),
            audit_dir = %audit.dir().display(),
            "Crypto service ready"
        );
        Ok(Self {
            config,
            registry,
            keys,
            providers,
            audit,
            gate: RwLock::new(()),
        })
    }

    pub fn config(&self) -> &CryptoConfig {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    /// Configured domains plus every domain that holds a key.
    pub fn domains(&self) -> Vec<String> {
        let mut domains: BTreeSet<String> = self.config.domains.iter().cloned().collect();
        domains.extend(
            self.keys
                .list(&KeyFilter::default())
                .into_iter()
                .map(|k| k.domain),
        );
        domains.into_iter().collect()
    }

    pub fn register_algorithm(
        &self,
        category: AlgorithmCategory,
        descriptor: AlgorithmDescriptor,
    ) -> Result<AlgorithmDescriptor> {
        let request = json!({
            "category": category,
            "algorithm_id": descriptor.id,
            "name": descriptor.name,
            "strength_bits": descriptor.strength_bits,
        });
        let result = {
            let _gate = self.gate.write();
            self.registry.register(category, descriptor)
        };
        self.audited(AuditEventType::AlgorithmRegistered, None, request, result, |_| json!({}))
    }

    pub fn get_algorithm(&self, category: AlgorithmCategory, id: &str) -> Result<AlgorithmDescriptor> {
        self.registry.get(category, id)
    }

    pub fn list_algorithms(
        &self,
        category: Option<AlgorithmCategory>,
        status: Option<Status>,
    ) -> Vec<AlgorithmDescriptor> {
        self.registry.list(category, status)
    }

    pub fn update_algorithm_status(
        &self,
        category: AlgorithmCategory,
        id: &str,
        status: Status,
    ) -> Result<AlgorithmDescriptor> {
        let result = {
            let _gate = self.gate.write();
            self.registry.update_status(category, id, status)
        };
        self.audited(
            AuditEventType::AlgorithmStatusUpdated,
            None,
            json!({"category": category, "algorithm_id": id, "status": status}),
            result,
            |_| json!({}),
        )
    }

    /// Point `domain` at `id` for `category`. Returns the previous mapping.
    pub fn set_active_algorithm(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        id: &str,
    ) -> Result<Option<String>> {
        let result = {
            let _gate = self.gate.write();
            self.registry.set_active(domain, category, id)
        };
        self.audited(
            AuditEventType::ActiveAlgorithmSet,
            Some(domain),
            json!({"category": category, "algorithm_id": id}),
            result,
            |previous| json!({"previous": previous}),
        )
    }

    pub fn get_active_algorithm(&self, domain: &str, category: AlgorithmCategory) -> Result<String> {
        self.registry.get_active(domain, category)
    }

    /// Algorithm `operation` would use in `domain`, checked against the
    /// provider set.
    pub fn resolve(&self, domain: &str, operation: Operation) -> Result<Resolved> {
        let category = operation.category();
        let id = self.registry.get_active(domain, category)?;
        if !self.providers.supports(category, &id) {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "no {category} provider for '{id}'"
            )));
        }
        Ok(Resolved {
            domain: domain.to_string(),
            operation,
            descriptor: self.registry.get(category, &id)?,
        })
    }

    /// Atomically replace `old_id` with `new_id` in `category`.
    ///
    /// Every domain mapped to `old_id`, or holding an active key of it, gets a
    /// replacement key for the algorithm it resolves to afterwards. Keys are generated and persisted first; the registry
    /// is only mutated once all of them are stored, and persisted keys are
    /// rolled back if the registry refuses the change.
    pub fn transition_algorithm(
        &self,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<TransitionOutcome> {
        let result = self.transition(category, old_id, new_id);
        self.audited(
            AuditEventType::AlgorithmTransitioned,
            None,
            json!({"category": category, "from": old_id, "to": new_id}),
            result,
            |outcome| {
                json!({
                    "domains": outcome.repointed_domains,
                    "rotated_domains": outcome.rotated_domains,
                    "new_key_ids": outcome.new_keys.iter().map(|k| k.id).collect::<Vec<_>>(),
                    "deprecated_key_ids": outcome.deprecated_keys,
                    "retire_after": outcome.retire_after,
                })
            },
        )
    }

    fn transition(
        &self,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<TransitionOutcome> {
        let _gate = self.gate.write();
        self.registry.check_transition(category, old_id, new_id)?;

        let mut rotated_domains = Vec::new();
        if category != AlgorithmCategory::Hash {
            rotated_domains = self.registry.domains_using(category, old_id);
            rotated_domains.extend(self.keys.domains_with_active(category, old_id));
            rotated_domains.sort();
            rotated_domains.dedup();
        }

        let mut plans = Vec::with_capacity(rotated_domains.len());
        for domain in &rotated_domains {
            let target = self.active_after_transition(domain, category, old_id, new_id)?;
            let payload = self.new_payload(category, &target)?;
            plans.push(self.keys.stage(domain, category, &target, payload)?);
        }

        self.keys.persist(&plans)?;
        let repointed_domains = match self.registry.transition(category, old_id, new_id) {
            Ok(domains) => domains,
            Err(e) => {
                self.keys.rollback(&plans);
                return Err(e);
            }
        };
        self.keys.commit(&plans);

        let period = Duration::days(i64::from(self.config.algorithm_transition_period_days));
        Ok(TransitionOutcome {
            category,
            from: old_id.to_string(),
            to: new_id.to_string(),
            repointed_domains,
            rotated_domains,
            new_keys: plans.iter().map(|p| p.new_key.summary()).collect(),
            deprecated_keys: plans.iter().flat_map(|p| p.retired.iter().copied()).collect(),
            retire_after: Utc::now() + period,
        })
    }

    /// Algorithm `domain` resolves to once `old_id` is replaced by `new_id`.
    /// Mappings and the default that name `old_id` move; any other mapping
    /// stays.
    fn active_after_transition(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        old_id: &str,
        new_id: &str,
    ) -> Result<String> {
        let current = self.registry.get_active(domain, category)?;
        Ok(if current == old_id {
            new_id.to_string()
        } else {
            current
        })
    }

    /// Generate and activate a key, retiring the domain's previous active key
    /// of the same category.
    pub fn generate_key(&self, key_type: KeyType, algorithm_id: &str, domain: &str) -> Result<KeySummary> {
        let result = self.create_key(key_type, algorithm_id, domain);
        self.audited(
            AuditEventType::KeyGenerated,
            Some(domain),
            json!({"key_type": key_type, "algorithm_id": algorithm_id}),
            result,
            |key| json!({"key_id": key.id, "category": key.category}),
        )
    }

    fn create_key(&self, key_type: KeyType, algorithm_id: &str, domain: &str) -> Result<KeySummary> {
        let category = key_type
            .categories()
            .iter()
            .copied()
            .find(|c| self.registry.get(*c, algorithm_id).is_ok())
            .ok_or_else(|| {
                CryptoError::UnsupportedAlgorithm(format!(
                    "'{algorithm_id}' is not a registered {key_type} algorithm"
                ))
            })?;
        self.ensure_algorithm_active(category, algorithm_id)?;
        let payload = self.new_payload(category, algorithm_id)?;

        let _gate = self.gate.write();
        self.ensure_algorithm_active(category, algorithm_id)?;
        Ok(self.keys.install(domain, category, algorithm_id, payload)?.summary())
    }

    pub fn get_key(&self, id: Uuid) -> Result<KeySummary> {
        self.keys.get(id).map(|k| k.summary())
    }

    /// Public half of an asymmetric key.
    pub fn public_key(&self, id: Uuid) -> Result<Vec<u8>> {
        let key = self.keys.get(id)?;
        key.payload
            .key_pair()
            .map(|pair| pair.public_key.clone())
            .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("key {id} is symmetric")))
    }

    pub fn list_keys(&self, filter: &KeyFilter) -> Vec<KeySummary> {
        self.keys.list(filter).iter().map(KeyMaterial::summary).collect()
    }

    pub fn update_key_status(&self, id: Uuid, status: Status) -> Result<KeySummary> {
        let domain = self.keys.get(id).ok().map(|k| k.domain);
        let result = {
            let _gate = self.gate.write();
            self.keys.update_status(id, status).map(|k| k.summary())
        };
        self.audited(
            AuditEventType::KeyStatusUpdated,
            domain.as_deref(),
            json!({"key_id": id, "status": status}),
            result,
            |key| json!({"algorithm_id": key.algorithm_id}),
        )
    }

    /// Rotate `domain`'s keys of `key_type`, or of every type when `None`.
    /// One audit event per (domain, key type).
    pub fn rotate_keys(&self, domain: &str, key_type: Option<KeyType>) -> RotationSummary {
        let types = match key_type {
            Some(t) => vec![t],
            None => KeyType::ALL.to_vec(),
        };
        self.rotate_types(domain, &types)
    }

    /// Active keys older than the configured rotation interval at `now`.
    pub fn keys_due_for_rotation(&self, now: DateTime<Utc>) -> Vec<KeySummary> {
        let max_age = Duration::days(i64::from(self.config.key_rotation_interval_days));
        self.keys.due_for_rotation(now, max_age)
    }

    /// Rotate every (domain, key type) holding a key past its interval.
    pub fn rotate_due_keys(&self) -> Vec<RotationSummary> {
        let mut due: BTreeMap<String, BTreeSet<KeyType>> = BTreeMap::new();
        for key in self.keys_due_for_rotation(Utc::now()) {
            due.entry(key.domain).or_default().insert(key.key_type);
        }
        due.into_iter()
            .map(|(domain, types)| self.rotate_types(&domain, &types.into_iter().collect::<Vec<_>>()))
            .collect()
    }

    fn rotate_types(&self, domain: &str, types: &[KeyType]) -> RotationSummary {
        let mut summary = RotationSummary {
            domain: domain.to_string(),
            rotated: Vec::new(),
            failures: Vec::new(),
        };

        for &key_type in types {
            let result = self.rotate_pair(domain, key_type);
            let result = self.audited(
                AuditEventType::KeyRotated,
                Some(domain),
                json!({"key_type": key_type}),
                result,
                |rotation| {
                    json!({
                        "new_key_ids": rotation.new_keys.iter().map(|k| k.id).collect::<Vec<_>>(),
                        "algorithm_ids": rotation.new_keys.iter().map(|k| k.algorithm_id.as_str()).collect::<Vec<_>>(),
                        "deprecated_key_ids": rotation.deprecated,
                    })
                },
            );
            match result {
                Ok(rotation) => summary.rotated.push(rotation),
                Err(e) => {
                    warn!(domain = %domain, key_type = %key_type, error = %e, "Key rotation failed");
                    summary.failures.push((key_type, e));
                }
            }
        }

        info!(
            domain = %domain,
            rotated = summary.rotated.len(),
            failed = summary.failures.len(),
            "Key rotation finished"
        );
        summary
    }

    fn rotate_pair(&self, domain: &str, key_type: KeyType) -> Result<PairRotation> {
        let mut staged = Vec::new();
        for category in self.keys.rotation_categories(domain, key_type) {
            let algorithm = self.registry.get_active(domain, category)?;
            let payload = self.new_payload(category, &algorithm)?;
            staged.push((category, algorithm, payload));
        }

        let _gate = self.gate.write();
        let plans = staged
            .into_iter()
            .map(|(category, algorithm, payload)| {
                self.ensure_algorithm_active(category, &algorithm)?;
                self.keys.stage(domain, category, &algorithm, payload)
            })
            .collect::<Result<Vec<_>>>()?;
        self.keys.persist(&plans)?;
        self.keys.commit(&plans);

        Ok(PairRotation {
            domain: domain.to_string(),
            key_type,
            new_keys: plans.iter().map(|p| p.new_key.summary()).collect(),
            deprecated: plans.iter().flat_map(|p| p.retired.iter().copied()).collect(),
        })
    }

    pub fn hash_data(&self, data: &[u8], domain: &str) -> Result<HashResult> {
        let result = self.hash(data, domain);
        self.audited(
            AuditEventType::DataHashed,
            Some(domain),
            json!({"data_len": data.len()}),
            result,
            |r| json!({"algorithm_id": r.algorithm_id}),
        )
    }

    fn hash(&self, data: &[u8], domain: &str) -> Result<HashResult> {
        let algorithm_id = self.registry.get_active(domain, AlgorithmCategory::Hash)?;
        let provider = self.providers.hash(&algorithm_id)?;
        let hash = crypto::guarded(&algorithm_id, || provider.hash(data))?;
        Ok(HashResult {
            algorithm_id,
            hash,
            timestamp: Utc::now(),
        })
    }

    /// Recompute with the result's own algorithm, deprecated or not.
    pub fn verify_hash(&self, data: &[u8], expected: &HashResult, domain: &str) -> Result<bool> {
        let result = self
            .registry
            .get(AlgorithmCategory::Hash, &expected.algorithm_id)
            .and_then(|_| self.providers.hash(&expected.algorithm_id))
            .and_then(|provider| {
                crypto::guarded(&expected.algorithm_id, || provider.verify(data, &expected.hash))
            });
        self.audited(
            AuditEventType::HashVerified,
            Some(domain),
            json!({"algorithm_id": expected.algorithm_id, "data_len": data.len()}),
            result,
            |valid| json!({"valid": valid}),
        )
    }

    /// Encrypt under `key_id`, or the domain's active symmetric key.
    pub fn encrypt_data(&self, data: &[u8], domain: &str, key_id: Option<Uuid>) -> Result<CipherResult> {
        let result = self.encrypt_symmetric(data, domain, key_id);
        self.audited(
            AuditEventType::DataEncrypted,
            Some(domain),
            json!({"mode": "symmetric", "data_len": data.len(), "requested_key_id": key_id}),
            result,
            |(r, generated)| {
                json!({"algorithm_id": r.algorithm_id, "key_id": r.key_id, "key_generated": generated})
            },
        )
        .map(|(r, _)| r)
    }

    fn encrypt_symmetric(
        &self,
        data: &[u8],
        domain: &str,
        key_id: Option<Uuid>,
    ) -> Result<(CipherResult, bool)> {
        let (key, generated) = self.select_key(domain, AlgorithmCategory::Symmetric, key_id)?;
        let provider = self.providers.aead(&key.algorithm_id)?;
        let secret = symmetric_secret(&key)?;
        let aad = associated_data(&key.algorithm_id, key.id);
        let (nonce, ciphertext) = crypto::guarded(&key.algorithm_id, || {
            provider.encrypt(secret.as_bytes(), data, aad.as_bytes())
        })?;

        Ok((
            CipherResult {
                algorithm_id: key.algorithm_id,
                key_id: key.id,
                ciphertext,
                nonce,
                timestamp: Utc::now(),
            },
            generated,
        ))
    }

    /// Decrypt with the key recorded in `result`, whatever its status.
    pub fn decrypt_data(&self, result: &CipherResult, domain: &str) -> Result<Vec<u8>> {
        let outcome = self.decrypt_symmetric(result, domain);
        self.audited(
            AuditEventType::DataDecrypted,
            Some(domain),
            json!({
                "mode": "symmetric",
                "key_id": result.key_id,
                "ciphertext_len": result.ciphertext.len(),
            }),
            outcome,
            |(algorithm_id, _)| json!({"algorithm_id": algorithm_id}),
        )
        .map(|(_, plaintext)| plaintext)
    }

    fn decrypt_symmetric(&self, result: &CipherResult, domain: &str) -> Result<(String, Vec<u8>)> {
        let key = self.key_in_domain(result.key_id, domain, AlgorithmCategory::Symmetric)?;
        let provider = self.providers.aead(&key.algorithm_id)?;
        let secret = symmetric_secret(&key)?;
        let aad = associated_data(&key.algorithm_id, key.id);
        let plaintext = crypto::guarded(&key.algorithm_id, || {
            provider.decrypt(secret.as_bytes(), &result.nonce, &result.ciphertext, aad.as_bytes())
        })?;
        Ok((key.algorithm_id, plaintext))
    }

    /// Encrypt to the public half of `key_id`, or of the domain's active
    /// asymmetric key. The result carries no nonce.
    pub fn encrypt_asymmetric(
        &self,
        data: &[u8],
        domain: &str,
        key_id: Option<Uuid>,
    ) -> Result<CipherResult> {
        let result = self.encrypt_public(data, domain, key_id);
        self.audited(
            AuditEventType::DataEncrypted,
            Some(domain),
            json!({"mode": "asymmetric", "data_len": data.len(), "requested_key_id": key_id}),
            result,
            |(r, generated)| {
                json!({"algorithm_id": r.algorithm_id, "key_id": r.key_id, "key_generated": generated})
            },
        )
        .map(|(r, _)| r)
    }

    fn encrypt_public(
        &self,
        data: &[u8],
        domain: &str,
        key_id: Option<Uuid>,
    ) -> Result<(CipherResult, bool)> {
        let (key, generated) = self.select_key(domain, AlgorithmCategory::Asymmetric, key_id)?;
        let provider = self.providers.asymmetric(&key.algorithm_id)?;
        let pair = key_pair(&key)?;
        let ciphertext = crypto::guarded(&key.algorithm_id, || provider.encrypt(&pair.public_key, data))?;

        Ok((
            CipherResult {
                algorithm_id: key.algorithm_id,
                key_id: key.id,
                ciphertext,
                nonce: Vec::new(),
                timestamp: Utc::now(),
            },
            generated,
        ))
    }

    pub fn decrypt_asymmetric(&self, result: &CipherResult, domain: &str) -> Result<Vec<u8>> {
        let outcome = self.decrypt_private(result, domain);
        self.audited(
            AuditEventType::DataDecrypted,
            Some(domain),
            json!({
                "mode": "asymmetric",
                "key_id": result.key_id,
                "ciphertext_len": result.ciphertext.len(),
            }),
            outcome,
            |(algorithm_id, _)| json!({"algorithm_id": algorithm_id}),
        )
        .map(|(_, plaintext)| plaintext)
    }

    fn decrypt_private(&self, result: &CipherResult, domain: &str) -> Result<(String, Vec<u8>)> {
        let key = self.key_in_domain(result.key_id, domain, AlgorithmCategory::Asymmetric)?;
        let provider = self.providers.asymmetric(&key.algorithm_id)?;
        let pair = key_pair(&key)?;
        let plaintext = crypto::guarded(&key.algorithm_id, || {
            provider.decrypt(pair.private_key.as_bytes(), &result.ciphertext)
        })?;
        Ok((key.algorithm_id, plaintext))
    }

    pub fn sign_data(&self, data: &[u8], domain: &str, key_id: Option<Uuid>) -> Result<SignatureResult> {
        let result = self.sign(data, domain, key_id);
        self.audited(
            AuditEventType::DataSigned,
            Some(domain),
            json!({"data_len": data.len(), "requested_key_id": key_id}),
            result,
            |(r, generated)| {
                json!({"algorithm_id": r.algorithm_id, "key_id": r.key_id, "key_generated": generated})
            },
        )
        .map(|(r, _)| r)
    }

    fn sign(&self, data: &[u8], domain: &str, key_id: Option<Uuid>) -> Result<(SignatureResult, bool)> {
        let (key, generated) = self.select_key(domain, AlgorithmCategory::Signature, key_id)?;
        let provider = self.providers.signature(&key.algorithm_id)?;
        let pair = key_pair(&key)?;
        let signature = crypto::guarded(&key.algorithm_id, || {
            provider.sign(pair.private_key.as_bytes(), data)
        })?;

        Ok((
            SignatureResult {
                algorithm_id: key.algorithm_id,
                key_id: key.id,
                signature,
                timestamp: Utc::now(),
            },
            generated,
        ))
    }

    /// `Ok(false)` for a signature that does not match; errors only when the
    /// key cannot be used at all.
    pub fn verify_signature(&self, data: &[u8], signature: &SignatureResult, domain: &str) -> Result<bool> {
        let result = self.verify(data, signature, domain);
        self.audited(
            AuditEventType::SignatureVerified,
            Some(domain),
            json!({"key_id": signature.key_id, "data_len": data.len()}),
            result,
            |(algorithm_id, valid)| json!({"algorithm_id": algorithm_id, "valid": valid}),
        )
        .map(|(_, valid)| valid)
    }

    fn verify(&self, data: &[u8], signature: &SignatureResult, domain: &str) -> Result<(String, bool)> {
        let key = self.key_in_domain(signature.key_id, domain, AlgorithmCategory::Signature)?;
        let provider = self.providers.signature(&key.algorithm_id)?;
        let pair = key_pair(&key)?;
        let valid = crypto::guarded(&key.algorithm_id, || {
            provider.verify(&pair.public_key, data, &signature.signature)
        })?;
        Ok((key.algorithm_id, valid))
    }

    pub fn audit_query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: Option<&[AuditEventType]>,
        domain: Option<&str>,
    ) -> Result<Vec<AuditEvent>> {
        self.audit.query(start, end, event_types, domain)
    }

    pub fn audit_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<AuditReport> {
        self.audit.report(start, end, domain)
    }

    /// Delete expired audit files. The deletion itself is recorded in the
    /// current day's file.
    pub fn audit_cleanup(&self) -> Result<usize> {
        let result = self.audit.cleanup();
        self.audited(
            AuditEventType::AuditCleanup,
            None,
            json!({"retention_days": self.config.audit.retention_days}),
            result,
            |removed| json!({"removed_files": removed}),
        )
    }

    /// Key for a new encrypt/sign: `key_id` if given and usable, else the
    /// domain's active key when it matches the active algorithm, else a
    /// freshly generated one (second tuple field) that retires the old key.
    fn select_key(
        &self,
        domain: &str,
        category: AlgorithmCategory,
        key_id: Option<Uuid>,
    ) -> Result<(KeyMaterial, bool)> {
        if let Some(id) = key_id {
            let _gate = self.gate.read();
            let key = self.key_in_domain(id, domain, category)?;
            if !key.is_active() {
                return Err(CryptoError::InactiveKey(format!("key {id}")));
            }
            self.ensure_algorithm_active(category, &key.algorithm_id)?;
            return Ok((key, false));
        }

        {
            let _gate = self.gate.read();
            if let Some(key) = self.current_key(domain, category)? {
                return Ok((key, false));
            }
        }

        let algorithm = self.registry.get_active(domain, category)?;
        let payload = self.new_payload(category, &algorithm)?;

        let _gate = self.gate.write();
        if let Some(key) = self.current_key(domain, category)? {
            return Ok((key, false));
        }
        // The mapping may have moved while the gate was released.
        let current = self.registry.get_active(domain, category)?;
        let payload = if current == algorithm {
            payload
        } else {
            self.new_payload(category, &current)?
        };
        let replaced = self.keys.active_key(domain, category).map(|k| k.id);
        let key = self.keys.install(domain, category, &current, payload)?;
        info!(
            domain = %domain,
            category = %category,
            algorithm = %current,
            key_id = %key.id,
            replaced = ?replaced,
            "Generated domain key for active algorithm"
        );
        Ok((key, true))
    }

    /// Active key bound to the domain's active algorithm. A key of any other
    /// algorithm is left for decrypt/verify and replaced on next use.
    fn current_key(&self, domain: &str, category: AlgorithmCategory) -> Result<Option<KeyMaterial>> {
        let algorithm = self.registry.get_active(domain, category)?;
        Ok(self
            .keys
            .active_key(domain, category)
            .filter(|key| key.algorithm_id == algorithm))
    }

    fn key_in_domain(&self, id: Uuid, domain: &str, category: AlgorithmCategory) -> Result<KeyMaterial> {
        let key = self.keys.get(id)?;
        if key.domain != domain {
            return Err(CryptoError::NotFound(format!("key {id} in domain '{domain}'")));
        }
        if key.category != category {
            return Err(CryptoError::UnsupportedAlgorithm(format!(
                "key {id} is a {} key, not {category}",
                key.category
            )));
        }
        Ok(key)
    }

    fn ensure_algorithm_active(&self, category: AlgorithmCategory, id: &str) -> Result<()> {
        if self.registry.get(category, id)?.is_active() {
            Ok(())
        } else {
            Err(CryptoError::InactiveAlgorithm(format!("{category}/{id}")))
        }
    }

    /// Fresh key material for `algorithm_id`. Algorithms without a built-in
    /// generator get random bytes sized by their AEAD provider.
    fn new_payload(&self, category: AlgorithmCategory, algorithm_id: &str) -> Result<KeyPayload> {
        match KeySpec::parse(algorithm_id) {
            Ok(spec) => crypto::guarded(algorithm_id, || keygen::generate(spec)),
            Err(_) if category == AlgorithmCategory::Symmetric => {
                let provider = self.providers.aead(algorithm_id)?;
                Ok(KeyPayload::Symmetric(SensitiveVec::random(provider.key_len())))
            }
            Err(e) => Err(e),
        }
    }

    /// Emit the single audit event for a public call and hand `result` back.
    fn audited<T>(
        &self,
        event_type: AuditEventType,
        domain: Option<&str>,
        request: Value,
        result: Result<T>,
        details: impl FnOnce(&T) -> Value,
    ) -> Result<T> {
        let mut data = request;
        match &result {
            Ok(value) => {
                if let (Value::Object(fields), Value::Object(extra)) = (&mut data, details(value)) {
                    fields.extend(extra);
                }
                data["success"] = Value::Bool(true);
            }
            Err(e) => {
                data["success"] = Value::Bool(false);
                data["error_kind"] = json!(e.kind());
                data["error"] = Value::String(e.to_string());
            }
        }
        self.audit.log(event_type, domain, data);
        result
    }
}

/// AEAD associated data binding ciphertext to its key record.
fn associated_data(algorithm_id: &str, key_id: Uuid) -> String {
    format!("{algorithm_id}|{key_id}")
}

fn symmetric_secret(key: &KeyMaterial) -> Result<&SensitiveVec> {
    key.payload
        .symmetric_key()
        .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("key {} is not symmetric", key.id)))
}

fn key_pair(key: &KeyMaterial) -> Result<&crate::keys::KeyPair> {
    key.payload
        .key_pair()
        .ok_or_else(|| CryptoError::UnsupportedAlgorithm(format!("key {} has no key pair", key.id)))
}
