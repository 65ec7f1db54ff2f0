/// Append-only audit trail.
///
/// One newline-delimited JSON file per UTC day (`audit_YYYY-MM-DD.jsonl`).
/// Writing never fails the caller: errors are counted and logged instead.
pub mod event;
pub mod report;

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{AuditConfig, AuditLevel};
use crate::error::Result;
pub use event::{sanitize, AuditEvent, AuditEventType, AuditMetadata, REDACTED_FIELDS};
pub use report::AuditReport;

const FILE_PREFIX: &str = "audit_";
const FILE_SUFFIX: &str = ".jsonl";

pub struct AuditLogger {
    dir: PathBuf,
    retention_days: u32,
    metadata: Option<AuditMetadata>,
    write_lock: Mutex<()>,
    failures: AtomicU64,
}

impl AuditLogger {
    pub fn new(config: &AuditConfig) -> Self {
        let metadata = match config.level {
            AuditLevel::Basic => None,
            AuditLevel::Detailed => Some(AuditMetadata::current()),
        };
        Self {
            dir: config.log_dir.clone(),
            retention_days: config.retention_days,
            metadata,
            write_lock: Mutex::new(()),
            failures: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Record one event and return it as written.
    pub fn log(&self, event_type: AuditEventType, domain: Option<&str>, data: Value) -> AuditEvent {
        let mut event = AuditEvent::new(event_type, domain, data);
        event.metadata = self.metadata.clone();

        if let Err(e) = self.append(&event) {
            let failures = self.failures.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                event_type = %event_type,
                error = %e,
                failures,
                "Audit write failed"
            );
        }
        event
    }

    /// Number of events that could not be written.
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn append(&self, event: &AuditEvent) -> Result<()> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');

        let _guard = self.write_lock.lock();
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.day_file(event.timestamp.date_naive()))?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn day_file(&self, date: NaiveDate) -> PathBuf {
        self.dir
            .join(format!("{FILE_PREFIX}{}{FILE_SUFFIX}", date.format("%Y-%m-%d")))
    }

    /// Events in `[start, end]`, optionally restricted to `event_types` and
    /// `domain`, in file order.
    pub fn query(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        event_types: Option<&[AuditEventType]>,
        domain: Option<&str>,
    ) -> Result<Vec<AuditEvent>> {
        let mut events = Vec::new();
        let mut date = start.date_naive();
        let last = end.date_naive();

        while date <= last {
            let path = self.day_file(date);
            if path.exists() {
                self.read_day(&path, &mut events)?;
            }
            date = match date.succ_opt() {
                Some(next) => next,
                None => break,
            };
        }

        events.retain(|e| {
            e.timestamp >= start
                && e.timestamp <= end
                && event_types.map_or(true, |types| types.contains(&e.event_type))
                && domain.map_or(true, |d| e.domain.as_deref() == Some(d))
        });
        Ok(events)
    }

    fn read_day(&self, path: &Path, events: &mut Vec<AuditEvent>) -> Result<()> {
        let _guard = self.write_lock.lock();
        let reader = BufReader::new(fs::File::open(path)?);
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEvent>(&line) {
                Ok(event) => events.push(event),
                Err(e) => warn!(
                    file = %path.display(),
                    line = index + 1,
                    error = %e,
                    "Skipping malformed audit line"
                ),
            }
        }
        Ok(())
    }

    /// Delete day files older than the retention window.
    pub fn cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now().date_naive() - Duration::days(i64::from(self.retention_days));
        self.cleanup_before(cutoff)
    }

    /// Delete day files dated strictly before `cutoff`.
    pub fn cleanup_before(&self, cutoff: NaiveDate) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock();
        let mut removed = 0;
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            let Some(date) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_day_file)
            else {
                continue;
            };
            if date < cutoff {
                fs::remove_file(&path)?;
                debug!(file = %path.display(), "Removed expired audit file");
                removed += 1;
            }
        }

        info!(removed, cutoff = %cutoff, "Audit cleanup complete");
        Ok(removed)
    }

    pub fn report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        domain: Option<&str>,
    ) -> Result<AuditReport> {
        let events = self.query(start, end, None, domain)?;
        Ok(AuditReport::from_events(start, end, domain, events))
    }
}

fn parse_day_file(name: &str) -> Option<NaiveDate> {
    let date = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn logger(dir: &Path, level: AuditLevel) -> AuditLogger {
        AuditLogger::new(&AuditConfig {
            log_dir: dir.to_path_buf(),
            retention_days: 30,
            level,
        })
    }

    fn window() -> (DateTime<Utc>, DateTime<Utc>) {
        let now = Utc::now();
        (now - Duration::hours(1), now + Duration::hours(1))
    }

    #[test]
    fn test_log_and_query() {
        let dir = tempfile::tempdir().unwrap();
        let audit = logger(dir.path(), AuditLevel::Basic);
        audit.log(
            AuditEventType::DataEncrypted,
            Some("billing"),
            json!({"plaintext": "hello", "success": true}),
        );
        audit.log(AuditEventType::DataHashed, Some("consensus"), json!({}));

        let (start, end) = window();
        let all = audit.query(start, end, None, None).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].metadata.is_none());

        let billing = audit.query(start, end, None, Some("billing")).unwrap();
        assert_eq!(billing.len(), 1);
        assert_eq!(billing[0].data, json!({"success": true}));

        let hashed = audit
            .query(start, end, Some(&[AuditEventType::DataHashed]), None)
            .unwrap();
        assert_eq!(hashed.len(), 1);

        let raw = fs::read_to_string(audit.day_file(Utc::now().date_naive())).unwrap();
        assert!(!raw.contains("hello"));
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn test_detailed_level_adds_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let audit = logger(dir.path(), AuditLevel::Detailed);
        let event = audit.log(AuditEventType::KeyGenerated, None, json!({}));
        let metadata = event.metadata.unwrap();
        assert_eq!(metadata.pid, std::process::id());
        assert!(!metadata.hostname.is_empty());
    }

    #[test]
    fn test_write_failure_is_counted_not_raised() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not_a_dir");
        fs::write(&blocker, b"x").unwrap();
        let audit = logger(&blocker, AuditLevel::Basic);

        let event = audit.log(AuditEventType::DataHashed, None, json!({"success": true}));
        assert_eq!(event.event_type, AuditEventType::DataHashed);
        assert_eq!(audit.failure_count(), 1);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let audit = logger(dir.path(), AuditLevel::Basic);
        audit.log(AuditEventType::DataHashed, None, json!({}));
        let path = audit.day_file(Utc::now().date_naive());
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        writeln!(file, "{{broken").unwrap();

        let (start, end) = window();
        assert_eq!(audit.query(start, end, None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_cleanup_removes_expired_files() {
        let dir = tempfile::tempdir().unwrap();
        let audit = logger(dir.path(), AuditLevel::Basic);
        let old = Utc::now().date_naive() - Duration::days(31);
        fs::write(audit.day_file(old), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        audit.log(AuditEventType::DataHashed, None, json!({}));

        assert_eq!(audit.cleanup().unwrap(), 1);
        assert!(!audit.day_file(old).exists());
        assert!(audit.day_file(Utc::now().date_naive()).exists());
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_parse_day_file() {
        assert_eq!(
            parse_day_file("audit_2024-02-29.jsonl"),
            NaiveDate::from_ymd_opt(2024, 2, 29)
        );
        assert_eq!(parse_day_file("audit_2024-02-30.jsonl"), None);
        assert_eq!(parse_day_file("other.jsonl"), None);
    }
}
