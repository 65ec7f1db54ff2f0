use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::event::AuditEvent;

/// Aggregate view over a window of audit events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    pub generated_at: DateTime<Utc>,
    pub total_events: usize,
    pub failed_events: usize,
    pub event_counts: BTreeMap<String, usize>,
    /// Events per `algorithm_id`.
    pub algorithm_usage: BTreeMap<String, usize>,
    /// Events per `key_id`.
    pub key_usage: BTreeMap<String, usize>,
    pub policy_changes: Vec<AuditEvent>,
}

impl AuditReport {
    pub fn from_events(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        domain: Option<&str>,
        events: Vec<AuditEvent>,
    ) -> Self {
        let mut report = Self {
            start,
            end,
            domain: domain.map(str::to_string),
            generated_at: Utc::now(),
            total_events: events.len(),
            failed_events: 0,
            event_counts: BTreeMap::new(),
            algorithm_usage: BTreeMap::new(),
            key_usage: BTreeMap::new(),
            policy_changes: Vec::new(),
        };

        for event in events {
            *report
                .event_counts
                .entry(event.event_type.to_string())
                .or_default() += 1;
            if !event.succeeded() {
                report.failed_events += 1;
            }
            if let Some(algorithm) = event.str_field("algorithm_id") {
                *report.algorithm_usage.entry(algorithm.to_string()).or_default() += 1;
            }
            if let Some(key) = event.str_field("key_id") {
                *report.key_usage.entry(key.to_string()).or_default() += 1;
            }
            if event.event_type.is_policy_change() {
                report.policy_changes.push(event);
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::event::AuditEventType;
    use serde_json::json;

    #[test]
    fn test_aggregation() {
        let events = vec![
            AuditEvent::new(
                AuditEventType::DataEncrypted,
                Some("billing"),
                json!({"algorithm_id": "AES-256-GCM", "key_id": "k1", "success": true}),
            ),
            AuditEvent::new(
                AuditEventType::DataDecrypted,
                Some("billing"),
                json!({"algorithm_id": "AES-256-GCM", "key_id": "k1", "success": false}),
            ),
            AuditEvent::new(
                AuditEventType::ActiveAlgorithmSet,
                Some("billing"),
                json!({"algorithm_id": "Ed25519", "success": true}),
            ),
        ];
        let now = Utc::now();
        let report = AuditReport::from_events(now, now, Some("billing"), events);

        assert_eq!(report.total_events, 3);
        assert_eq!(report.failed_events, 1);
        assert_eq!(report.event_counts["data_encrypted"], 1);
        assert_eq!(report.algorithm_usage["AES-256-GCM"], 2);
        assert_eq!(report.key_usage["k1"], 2);
        assert_eq!(report.policy_changes.len(), 1);
    }
}
