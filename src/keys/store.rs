/// Pluggable key persistence.
///
/// The key store only sees the logical record format; choosing a backend
/// (file, database, HSM-fronted service) is the host's decision. Records are
/// keyed `"<sym|asym>_<id>"`.
///
/// Key bytes are stored in plaintext (hex for symmetric keys, PEM for key
/// pairs). Encrypting the store at rest is left to the backend.
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pkcs8::der::pem::{self, LineEnding};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{KeyMaterial, KeyPair, KeyPayload, KeyType};
use crate::crypto::keygen::KeySpec;
use crate::crypto::sensitive::SensitiveVec;
use crate::error::{CryptoError, Result};
use crate::registry::{AlgorithmCategory, Status};

/// Persisted form of a key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyRecord {
    pub id: Uuid,
    pub key_type: KeyType,
    pub algorithm_id: String,
    pub category: AlgorithmCategory,
    pub domain: String,
    pub status: Status,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub material: RecordMaterial,
}

#[derive(Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordMaterial {
    Symmetric {
        raw_key_hex: String,
    },
    Asymmetric {
        private_key_pem: String,
        public_key_pem: String,
    },
}

impl std::fmt::Debug for RecordMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordMaterial::Symmetric { .. } => f.write_str("Symmetric(<redacted>)"),
            RecordMaterial::Asymmetric { .. } => f.write_str("Asymmetric(<redacted>)"),
        }
    }
}

fn pem_labels(algorithm_id: &str) -> (String, String) {
    match KeySpec::parse(algorithm_id).ok().and_then(|s| s.pem_family()) {
        Some(family) => (format!("{family} PRIVATE KEY"), format!("{family} PUBLIC KEY")),
        None => ("PRIVATE KEY".to_string(), "PUBLIC KEY".to_string()),
    }
}

fn pem_encode(label: &str, bytes: &[u8]) -> Result<String> {
    pem::encode_string(label, LineEnding::LF, bytes)
        .map_err(|e| CryptoError::Serialization(format!("PEM encoding failed: {e}")))
}

fn pem_decode(text: &str) -> Result<Vec<u8>> {
    pem::decode_vec(text.as_bytes())
        .map(|(_, bytes)| bytes)
        .map_err(|e| CryptoError::Serialization(format!("PEM decoding failed: {e}")))
}

impl KeyRecord {
    pub fn from_material(key: &KeyMaterial) -> Result<Self> {
        let material = match &key.payload {
            KeyPayload::Symmetric(bytes) => RecordMaterial::Symmetric {
                raw_key_hex: hex::encode(bytes.as_bytes()),
            },
            KeyPayload::Asymmetric(pair) => {
                let (private_label, public_label) = pem_labels(&key.algorithm_id);
                RecordMaterial::Asymmetric {
                    private_key_pem: pem_encode(&private_label, pair.private_key.as_bytes())?,
                    public_key_pem: pem_encode(&public_label, &pair.public_key)?,
                }
            }
        };
        Ok(Self {
            id: key.id,
            key_type: key.key_type,
            algorithm_id: key.algorithm_id.clone(),
            category: key.category,
            domain: key.domain.clone(),
            status: key.status,
            created_at: key.created_at,
            updated_at: key.updated_at,
            material,
        })
    }

    pub fn into_material(self) -> Result<KeyMaterial> {
        let payload = match &self.material {
            RecordMaterial::Symmetric { raw_key_hex } => {
                let bytes = hex::decode(raw_key_hex)
                    .map_err(|e| CryptoError::Serialization(format!("bad key hex: {e}")))?;
                KeyPayload::Symmetric(SensitiveVec::new(bytes))
            }
            RecordMaterial::Asymmetric {
                private_key_pem,
                public_key_pem,
            } => KeyPayload::Asymmetric(KeyPair {
                private_key: SensitiveVec::new(pem_decode(private_key_pem)?),
                public_key: pem_decode(public_key_pem)?,
            }),
        };
        if payload.key_type() != self.key_type {
            return Err(CryptoError::Serialization(format!(
                "key {} material does not match key type {}",
                self.id, self.key_type
            )));
        }
        Ok(KeyMaterial {
            id: self.id,
            key_type: self.key_type,
            algorithm_id: self.algorithm_id,
            category: self.category,
            domain: self.domain,
            payload,
            status: self.status,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Trait for pluggable key store backends.
pub trait KeyStore: Send + Sync {
    /// Human-readable backend name.
    fn name(&self) -> &str;

    /// Insert or overwrite the record stored under `name`.
    fn put(&self, name: &str, record: &KeyRecord) -> Result<()>;

    fn get(&self, name: &str) -> Result<Option<KeyRecord>>;

    /// Remove a record. Only used to roll back keys that were never
    /// committed; committed keys are deprecated, not removed.
    fn remove(&self, name: &str) -> Result<()>;

    /// All record names.
    fn list(&self) -> Result<Vec<String>>;
}

/// In-process key store.
#[derive(Default)]
pub struct MemoryKeyStore {
    records: RwLock<BTreeMap<String, KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyStore for MemoryKeyStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn put(&self, name: &str, record: &KeyRecord) -> Result<()> {
        self.records.write().insert(name.to_string(), record.clone());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<KeyRecord>> {
        Ok(self.records.read().get(name).cloned())
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.records.write().remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.records.read().keys().cloned().collect())
    }
}

/// Directory-backed key store: one `<name>.json` file per key.
///
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a truncated record behind.
pub struct FileKeyStore {
    dir: PathBuf,
}

impl FileKeyStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(CryptoError::NotFound(format!("invalid key record name '{name}'")));
        }
        Ok(self.dir.join(format!("{name}.json")))
    }
}

impl KeyStore for FileKeyStore {
    fn name(&self) -> &str {
        "file"
    }

    fn put(&self, name: &str, record: &KeyRecord) -> Result<()> {
        let path = self.path_for(name)?;
        let tmp = self.dir.join(format!(".{name}.json.tmp"));
        let json = serde_json::to_vec_pretty(record)?;

        let mut file = fs::File::create(&tmp)?;
        file.write_all(&json)?;
        file.sync_all()?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<KeyRecord>> {
        let path = self.path_for(name)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove(&self, name: &str) -> Result<()> {
        let path = self.path_for(name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with('.') {
                continue;
            }
            if let Some(name) = file_name.strip_suffix(".json") {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keygen::generate;

    fn key(algorithm_id: &str) -> KeyMaterial {
        let spec = KeySpec::parse(algorithm_id).unwrap();
        let now = Utc::now();
        KeyMaterial {
            id: Uuid::now_v7(),
            key_type: spec.key_type(),
            algorithm_id: algorithm_id.to_string(),
            category: crate::crypto::keygen::category_of(algorithm_id).unwrap(),
            domain: "billing".into(),
            payload: generate(spec).unwrap(),
            status: Status::Active,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_symmetric_record_format() {
        let k = key("AES-256-GCM");
        let record = KeyRecord::from_material(&k).unwrap();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["raw_key_hex"].as_str().unwrap().len(), 64);
        assert_eq!(json["status"], "active");
        assert!(json.get("private_key_pem").is_none());

        let back: KeyRecord = serde_json::from_value(json).unwrap();
        let restored = back.into_material().unwrap();
        assert_eq!(
            restored.payload.symmetric_key().unwrap(),
            k.payload.symmetric_key().unwrap()
        );
    }

    #[test]
    fn test_asymmetric_record_uses_pem() {
        let k = key("Ed25519");
        let record = KeyRecord::from_material(&k).unwrap();
        match &record.material {
            RecordMaterial::Asymmetric {
                private_key_pem,
                public_key_pem,
            } => {
                assert!(private_key_pem.starts_with("-----BEGIN ED25519 PRIVATE KEY-----"));
                assert!(public_key_pem.starts_with("-----BEGIN ED25519 PUBLIC KEY-----"));
            }
            RecordMaterial::Symmetric { .. } => panic!("expected key pair"),
        }
        let restored = record.into_material().unwrap();
        assert_eq!(
            restored.payload.key_pair().unwrap().public_key,
            k.payload.key_pair().unwrap().public_key
        );
    }

    #[test]
    fn test_record_debug_redacts() {
        let record = KeyRecord::from_material(&key("AES-128-GCM")).unwrap();
        let RecordMaterial::Symmetric { raw_key_hex } = &record.material else {
            panic!("expected symmetric record");
        };
        assert!(!format!("{record:?}").contains(raw_key_hex.as_str()));
    }

    #[test]
    fn test_file_store_put_get_list_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        let k = key("ChaCha20-Poly1305");
        let name = k.store_name();

        store.put(&name, &KeyRecord::from_material(&k).unwrap()).unwrap();
        assert_eq!(store.list().unwrap(), vec![name.clone()]);
        let loaded = store.get(&name).unwrap().unwrap();
        assert_eq!(loaded.id, k.id);

        store.remove(&name).unwrap();
        assert!(store.get(&name).unwrap().is_none());
        store.remove(&name).unwrap();
    }

    #[test]
    fn test_file_store_rejects_path_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKeyStore::open(dir.path()).unwrap();
        assert!(store.get("../etc/passwd").is_err());
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryKeyStore::new();
        let k = key("AES-128-GCM");
        store
            .put(&k.store_name(), &KeyRecord::from_material(&k).unwrap())
            .unwrap();
        assert!(store.get(&k.store_name()).unwrap().is_some());
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
