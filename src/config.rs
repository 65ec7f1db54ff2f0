/// Service configuration.
///
/// Loaded from JSON. Every field has a default, so a partial (or empty)
/// document is valid.
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{CryptoError, Result};
use crate::registry::catalog;
use crate::registry::AlgorithmCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLevel {
    /// Event data only.
    #[default]
    Basic,
    /// Event data plus host/process metadata.
    Detailed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_dir")]
    pub log_dir: PathBuf,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    #[serde(default)]
    pub level: AuditLevel,
}

fn default_audit_dir() -> PathBuf {
    PathBuf::from("audit_logs")
}

fn default_retention_days() -> u32 {
    365
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_dir: default_audit_dir(),
            retention_days: default_retention_days(),
            level: AuditLevel::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CryptoConfig {
    /// Domains known up front; others are created on first use.
    #[serde(default)]
    pub domains: Vec<String>,
    #[serde(default = "default_rotation_days")]
    pub key_rotation_interval_days: u32,
    #[serde(default = "default_transition_days")]
    pub algorithm_transition_period_days: u32,
    #[serde(default = "default_algorithms")]
    pub default_algorithms: BTreeMap<AlgorithmCategory, String>,
    #[serde(default = "default_key_store_path")]
    pub key_store_path: PathBuf,
    #[serde(default)]
    pub audit: AuditConfig,
}

fn default_rotation_days() -> u32 {
    90
}

fn default_transition_days() -> u32 {
    30
}

fn default_key_store_path() -> PathBuf {
    PathBuf::from("keys")
}

/// Built-in default algorithm per category.
pub fn default_algorithms() -> BTreeMap<AlgorithmCategory, String> {
    AlgorithmCategory::ALL
        .into_iter()
        .map(|c| (c, catalog::builtin_default(c).to_string()))
        .collect()
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            domains: Vec::new(),
            key_rotation_interval_days: default_rotation_days(),
            algorithm_transition_period_days: default_transition_days(),
            default_algorithms: default_algorithms(),
            key_store_path: default_key_store_path(),
            audit: AuditConfig::default(),
        }
    }
}

impl CryptoConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|e| CryptoError::Config(format!("{}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| CryptoError::Config(format!("{}: {e}", path.display())))
    }

    /// Load `path`, falling back to built-in defaults on any error.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::from_json_file(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(error = %e, "Falling back to default configuration");
                Self::default()
            }
        }
    }

    /// Problems that construction will correct by substituting defaults.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        for category in AlgorithmCategory::ALL {
            match self.default_algorithms.get(&category) {
                None => warnings.push(format!("no default algorithm for {category}")),
                Some(id) if !catalog::is_builtin(category, id) => warnings.push(format!(
                    "default {category} algorithm '{id}' is not a built-in {category} algorithm"
                )),
                Some(_) => {}
            }
        }
        if self.key_rotation_interval_days == 0 {
            warnings.push("key_rotation_interval_days must be positive".into());
        }
        if self.audit.retention_days == 0 {
            warnings.push("audit.retention_days must be positive".into());
        }
        warnings
    }

    /// Configured defaults with invalid or missing entries replaced by the
    /// built-in ones.
    pub fn effective_defaults(&self) -> BTreeMap<AlgorithmCategory, String> {
        AlgorithmCategory::ALL
            .into_iter()
            .map(|category| {
                let id = match self.default_algorithms.get(&category) {
                    Some(id) if catalog::is_builtin(category, id) => id.clone(),
                    configured => {
                        let fallback = catalog::builtin_default(category);
                        warn!(
                            category = %category,
                            configured = ?configured,
                            fallback = %fallback,
                            "Invalid default algorithm, using built-in"
                        );
                        fallback.to_string()
                    }
                };
                (category, id)
            })
            .collect()
    }
}
