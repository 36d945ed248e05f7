//! Hash-chained, append-only audit log (C2).
//!
//! One JSON object per line. Every security-relevant action writes an
//! `AuditEntry` whose `hash` commits to every other field via
//! `neuron_crypto::canonical_hash`, and whose `prev_hash` links it to the
//! entry before it — genesis uses 64 ASCII zeros. `open` forward-scans the
//! file to recover `(last_hash, last_sequence)`, tolerating one corrupt
//! trailing line (crash recovery); `append` flushes before returning so a
//! committed entry is durable by the time the caller observes success;
//! `verify` re-derives every hash and never mutates state.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use neuron_core::types::{genesis_hash, AuditCategory, AuditEntry};
use neuron_core::NeuronError;
use tracing::{info, warn};

/// One problem found while verifying an on-disk audit log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyError {
    /// 1-indexed line number the problem was found on.
    pub line: u64,
    pub message: String,
}

/// Result of scanning an audit log end to end without mutating it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerifyReport {
    pub valid: bool,
    pub entries: u64,
    pub errors: Vec<VerifyError>,
}

struct WriterState {
    file: File,
    last_hash: String,
    last_sequence: u64,
}

/// A single-writer, append-only audit log. Construct once via `open` and
/// share behind an `Arc`/`tokio::sync::Mutex` in the caller — `append`'s
/// critical section *is* the fsync'd write, the one exception to "never
/// hold a lock across an await" (spec §5).
pub struct AuditLog {
    path: PathBuf,
    state: Mutex<WriterState>,
}

impl AuditLog {
    /// Open (or create) the audit log at `path`. Recovers `(last_hash,
    /// last_sequence)` by forward-scanning existing content; an unreadable
    /// or malformed trailing line is tolerated (truncated write from a
    /// prior crash) but anything earlier in the file must be well-formed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, NeuronError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;
            }
        }

        let (last_hash, last_sequence) = if path.exists() {
            recover(&path)?
        } else {
            (genesis_hash(), 0)
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;

        info!(path = %path.display(), last_sequence, "audit log opened");

        Ok(Self {
            path,
            state: Mutex::new(WriterState {
                file,
                last_hash,
                last_sequence,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a new entry. `sequence` and `prev_hash` are assigned by the
    /// log itself; `hash` is computed over the canonical form of every
    /// other field. Returns the committed entry, already flushed to disk.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        category: AuditCategory,
        action: impl Into<String>,
        actor: Option<String>,
        details: Option<serde_json::Value>,
        now: i64,
    ) -> Result<AuditEntry, NeuronError> {
        let mut guard = self
            .state
            .lock()
            .map_err(|_| NeuronError::Internal("audit log mutex poisoned".into()))?;

        let sequence = guard.last_sequence + 1;
        let mut entry = AuditEntry {
            sequence,
            timestamp: now,
            category,
            action: action.into(),
            actor,
            details,
            prev_hash: guard.last_hash.clone(),
            hash: String::new(),
        };
        entry.hash = neuron_crypto::canonical_hash(&entry);

        let mut line = serde_json::to_string(&entry)
            .map_err(|e| NeuronError::Serialization(e.to_string()))?;
        line.push('\n');

        guard
            .file
            .write_all(line.as_bytes())
            .map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;
        guard
            .file
            .flush()
            .map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;
        guard
            .file
            .sync_data()
            .map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;

        guard.last_hash = entry.hash.clone();
        guard.last_sequence = sequence;

        tracing::debug!(sequence, category = ?entry.category, action = %entry.action, "audit entry appended");

        Ok(entry)
    }

    /// Scan `path` line by line, re-deriving every hash and checking the
    /// chain linkage and sequence monotonicity. Never mutates the file. A
    /// missing or empty file is trivially valid.
    pub fn verify<P: AsRef<Path>>(path: P) -> Result<VerifyReport, NeuronError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(VerifyReport {
                valid: true,
                entries: 0,
                errors: Vec::new(),
            });
        }

        let file = File::open(path).map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;
        let reader = BufReader::new(file);

        let mut errors = Vec::new();
        let mut entries = 0u64;
        let mut prev_hash = genesis_hash();
        let mut prev_sequence = 0u64;

        for (idx, line) in reader.lines().enumerate() {
            let line_no = idx as u64 + 1;
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    errors.push(VerifyError {
                        line: line_no,
                        message: format!("unreadable line: {e}"),
                    });
                    continue;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            let entry: AuditEntry = match serde_json::from_str(&line) {
                Ok(e) => e,
                Err(e) => {
                    errors.push(VerifyError {
                        line: line_no,
                        message: format!("malformed JSON: {e}"),
                    });
                    continue;
                }
            };

            let recomputed = neuron_crypto::canonical_hash(&entry);
            if recomputed != entry.hash {
                errors.push(VerifyError {
                    line: line_no,
                    message: format!(
                        "hash mismatch: stored {} recomputed {recomputed}",
                        entry.hash
                    ),
                });
            }

            if entry.prev_hash != prev_hash {
                errors.push(VerifyError {
                    line: line_no,
                    message: format!(
                        "prev_hash mismatch: expected {prev_hash}, got {}",
                        entry.prev_hash
                    ),
                });
            }

            if entries > 0 && entry.sequence <= prev_sequence {
                errors.push(VerifyError {
                    line: line_no,
                    message: format!(
                        "sequence did not strictly increase: previous {prev_sequence}, got {}",
                        entry.sequence
                    ),
                });
            }

            prev_hash = entry.hash.clone();
            prev_sequence = entry.sequence;
            entries += 1;
        }

        let valid = errors.is_empty();
        if !valid {
            warn!(path = %path.display(), error_count = errors.len(), "audit log verification found errors");
        }

        Ok(VerifyReport {
            valid,
            entries,
            errors,
        })
    }
}

/// Forward-scan to the last *valid* line, tolerating a corrupt trailing
/// line (crash during a partial write). Returns `(last_hash, last_sequence)`
/// to resume from.
fn recover(path: &Path) -> Result<(String, u64), NeuronError> {
    let file = File::open(path).map_err(|e| NeuronError::AuditWriteFailure(e.to_string()))?;
    let reader = BufReader::new(file);

    let mut last_hash = genesis_hash();
    let mut last_sequence = 0u64;

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break, // trailing corrupt line — stop here, don't repair in place.
        };
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<AuditEntry>(&line) {
            Ok(entry) => {
                last_hash = entry.hash;
                last_sequence = entry.sequence;
            }
            Err(_) => break, // tolerate exactly one corrupt trailing line.
        }
    }

    Ok((last_hash, last_sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuron_core::types::AuditCategory;
    use std::io::Write as _;

    #[test]
    fn fresh_log_starts_at_genesis() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        let entry = log
            .append(AuditCategory::Connection, "connection.handshake_started", None, None, 1000)
            .unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(entry.prev_hash, genesis_hash());
    }

    #[test]
    fn chain_links_and_verifies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        let log = AuditLog::open(&path).unwrap();
        for i in 0..5 {
            log.append(
                AuditCategory::Connection,
                format!("action-{i}"),
                Some("patient-001".into()),
                None,
                1000 + i,
            )
            .unwrap();
        }
        let report = AuditLog::verify(&path).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries, 5);
        assert!(report.errors.is_empty());
    }

    #[test]
    fn reopen_resumes_sequence_and_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(AuditCategory::Registration, "registration.enrolled", None, None, 1000)
                .unwrap();
        }
        let log2 = AuditLog::open(&path).unwrap();
        let entry = log2
            .append(AuditCategory::Registration, "registration.heartbeat", None, None, 1001)
            .unwrap();
        assert_eq!(entry.sequence, 2);
    }

    #[test]
    fn corrupt_trailing_line_is_tolerated_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(AuditCategory::Connection, "one", None, None, 1000).unwrap();
        }
        // Simulate a crash mid-write: append a truncated, non-JSON line.
        {
            let mut f = OpenOptions::new().append(true).open(&path).unwrap();
            f.write_all(b"{\"sequence\":2,\"timestamp\":").unwrap();
        }
        let log = AuditLog::open(&path).unwrap();
        let entry = log.append(AuditCategory::Connection, "two", None, None, 1002).unwrap();
        assert_eq!(entry.sequence, 2);
    }

    #[test]
    fn tampered_entry_breaks_verification_and_all_following_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.log");
        {
            let log = AuditLog::open(&path).unwrap();
            for i in 0..4 {
                log.append(
                    AuditCategory::Connection,
                    format!("action-{i}"),
                    None,
                    Some(serde_json::json!({"n": i})),
                    1000 + i,
                )
                .unwrap();
            }
        }

        // Flip a byte inside entry 2's `details` field on disk.
        let content = std::fs::read_to_string(&path).unwrap();
        let mut lines: Vec<String> = content.lines().map(|l| l.to_string()).collect();
        lines[1] = lines[1].replace("\"n\":1", "\"n\":9");
        std::fs::write(&path, lines.join("\n") + "\n").unwrap();

        let report = AuditLog::verify(&path).unwrap();
        assert!(!report.valid);
        // Line 2 fails on its own hash; line 3 and 4 fail on broken prev_hash linkage.
        assert!(report.errors.iter().any(|e| e.line == 2));
        assert!(report.errors.iter().any(|e| e.line == 3));
        assert!(report.errors.iter().any(|e| e.line == 4));
    }

    #[test]
    fn missing_file_verifies_trivially_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.log");
        let report = AuditLog::verify(&path).unwrap();
        assert!(report.valid);
        assert_eq!(report.entries, 0);
    }
}
