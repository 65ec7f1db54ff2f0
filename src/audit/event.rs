use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fields removed from event data at any depth before it is written.
pub const REDACTED_FIELDS: &[&str] = &[
    "payload",
    "plaintext",
    "private_key",
    "private_key_pem",
    "raw_key_hex",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AlgorithmRegistered,
    AlgorithmStatusUpdated,
    ActiveAlgorithmSet,
    AlgorithmTransitioned,
    KeyGenerated,
    KeyStatusUpdated,
    KeyRotated,
    DataHashed,
    HashVerified,
    DataEncrypted,
    DataDecrypted,
    DataSigned,
    SignatureVerified,
    AuditCleanup,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AlgorithmRegistered => "algorithm_registered",
            AuditEventType::AlgorithmStatusUpdated => "algorithm_status_updated",
            AuditEventType::ActiveAlgorithmSet => "active_algorithm_set",
            AuditEventType::AlgorithmTransitioned => "algorithm_transitioned",
            AuditEventType::KeyGenerated => "key_generated",
            AuditEventType::KeyStatusUpdated => "key_status_updated",
            AuditEventType::KeyRotated => "key_rotated",
            AuditEventType::DataHashed => "data_hashed",
            AuditEventType::HashVerified => "hash_verified",
            AuditEventType::DataEncrypted => "data_encrypted",
            AuditEventType::DataDecrypted => "data_decrypted",
            AuditEventType::DataSigned => "data_signed",
            AuditEventType::SignatureVerified => "signature_verified",
            AuditEventType::AuditCleanup => "audit_cleanup",
        }
    }

    /// Events that change which algorithms or keys may be used.
    pub fn is_policy_change(&self) -> bool {
        matches!(
            self,
            AuditEventType::AlgorithmRegistered
                | AuditEventType::AlgorithmStatusUpdated
                | AuditEventType::ActiveAlgorithmSet
                | AuditEventType::AlgorithmTransitioned
                | AuditEventType::KeyStatusUpdated
        )
    }
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process context attached at the `detailed` audit level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditMetadata {
    pub hostname: String,
    pub pid: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

impl AuditMetadata {
    pub fn current() -> Self {
        let hostname = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .ok();
        Self {
            hostname,
            pid: std::process::id(),
            user,
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<AuditMetadata>,
}

impl AuditEvent {
    /// Build an event; `data` is sanitized here so no caller can skip it.
    pub fn new(event_type: AuditEventType, domain: Option<&str>, data: Value) -> Self {
        Self {
            timestamp: Utc::now(),
            event_type,
            domain: domain.map(str::to_string),
            data: sanitize(data),
            metadata: None,
        }
    }

    /// `data.success`, treating events without the field as successful.
    pub fn succeeded(&self) -> bool {
        self.data
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.data.get(field).and_then(Value::as_str)
    }
}

/// Strip [`REDACTED_FIELDS`] from every object in `value`.
pub fn sanitize(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(k, _)| !REDACTED_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k, sanitize(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize).collect()),
        other => other,
    }
}
