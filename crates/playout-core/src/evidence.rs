//! Evidence spool: an append-only, crash-tolerant NDJSON event log for one
//! session, with monotonic sequence numbers and a separately persisted ack
//! cursor.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PlayoutError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub schema_version: u32,
    pub session_id: Uuid,
    pub channel_id: String,
    pub sequence: u64,
    pub event_uuid: Uuid,
    pub emitted_utc_us: i64,
    pub payload_type: String,
    pub payload_json: serde_json::Value,
}

const SCHEMA_VERSION: u32 = 1;

struct SpoolInner {
    file: File,
    bytes_written: u64,
    next_sequence: u64,
}

/// Append-only spool for one session/channel. `byte_cap` bounds the file on
/// disk; once reached, `append` returns [`PlayoutError::SpoolFull`] rather
/// than silently dropping the record.
pub struct EvidenceSpool {
    session_id: Uuid,
    channel_id: String,
    byte_cap: u64,
    ack_path: PathBuf,
    inner: Mutex<SpoolInner>,
}

impl EvidenceSpool {
    /// Open (or create) the spool file at `path`, with its ack cursor
    /// tracked in a sibling `.ack` file so ack survives a reopen
    /// independently of the spool's own append position.
    pub fn open<P: AsRef<Path>>(
        path: P,
        session_id: Uuid,
        channel_id: String,
        byte_cap: u64,
    ) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(path)?;

        let (bytes_written, next_sequence) = scan_existing(path)?;

        let ack_path = ack_path_for(path);

        Ok(Self {
            session_id,
            channel_id,
            byte_cap,
            ack_path,
            inner: Mutex::new(SpoolInner {
                file,
                bytes_written,
                next_sequence,
            }),
        })
    }

    /// Append one event. Returns the record actually written, including its
    /// assigned sequence number.
    pub fn append(&self, payload_type: &str, payload_json: serde_json::Value, emitted_utc_us: i64) -> Result<EvidenceRecord> {
        let mut inner = self.inner.lock().unwrap();

        let record = EvidenceRecord {
            schema_version: SCHEMA_VERSION,
            session_id: self.session_id,
            channel_id: self.channel_id.clone(),
            sequence: inner.next_sequence,
            event_uuid: Uuid::new_v4(),
            emitted_utc_us,
            payload_type: payload_type.to_string(),
            payload_json,
        };

        let mut line = serde_json::to_vec(&record).map_err(|e| {
            PlayoutError::Validation(format!("evidence record not serializable: {}", e))
        })?;
        line.push(b'\n');

        if inner.bytes_written + line.len() as u64 > self.byte_cap {
            return Err(PlayoutError::SpoolFull);
        }

        inner.file.write_all(&line)?;
        inner.file.flush()?;
        inner.bytes_written += line.len() as u64;
        inner.next_sequence += 1;

        Ok(record)
    }

    /// Records strictly after `seq`, in order. A corrupt or truncated final
    /// line is silently ignored; every earlier record is returned intact.
    pub fn replay_from<P: AsRef<Path>>(path: P, seq: u64) -> Result<Vec<EvidenceRecord>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<EvidenceRecord>(&line) {
                Ok(record) if record.sequence > seq => out.push(record),
                Ok(_) => {}
                Err(_) => break,
            }
        }

        Ok(out)
    }

    /// Persist a monotonic ack cursor. Lower-or-equal values than what is
    /// already on disk are silently discarded, never rejected.
    pub fn ack(&self, seq: u64) -> Result<()> {
        let current = self.read_ack()?;
        if seq <= current {
            return Ok(());
        }
        std::fs::write(&self.ack_path, seq.to_string())?;
        Ok(())
    }

    pub fn read_ack(&self) -> Result<u64> {
        match std::fs::read_to_string(&self.ack_path) {
            Ok(s) => Ok(s.trim().parse().unwrap_or(0)),
            Err(_) => Ok(0),
        }
    }
}

fn ack_path_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push(".ack");
    PathBuf::from(s)
}

fn scan_existing(path: &Path) -> Result<(u64, u64)> {
    if !path.exists() {
        return Ok((0, 0));
    }
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut next_sequence = 0u64;
    let mut line = String::new();
    loop {
        line.clear();
        let bytes = reader.read_line(&mut line)?;
        if bytes == 0 {
            break;
        }
        if !line.ends_with('\n') {
            // Truncated trailing line from a crash mid-append; ignore it.
            break;
        }
        match serde_json::from_str::<EvidenceRecord>(line.trim_end()) {
            Ok(record) => next_sequence = record.sequence + 1,
            Err(_) => break,
        }
    }
    reader.seek(SeekFrom::End(0))?;
    Ok((len, next_sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_append_assigns_consecutive_sequence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spool.ndjson");
        let spool = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 1_000_000).unwrap();
        let r0 = spool.append("tick", serde_json::json!({"n": 0}), 0).unwrap();
        let r1 = spool.append("tick", serde_json::json!({"n": 1}), 1).unwrap();
        assert_eq!(r0.sequence, 0);
        assert_eq!(r1.sequence, 1);
    }

    #[test]
    fn test_spool_full_returns_error_without_writing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spool.ndjson");
        let spool = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 10).unwrap();
        let result = spool.append("tick", serde_json::json!({"n": 0}), 0);
        assert!(matches!(result, Err(PlayoutError::SpoolFull)));
    }

    #[test]
    fn test_replay_from_returns_only_records_strictly_after_seq() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spool.ndjson");
        let spool = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 1_000_000).unwrap();
        for i in 0..5 {
            spool.append("tick", serde_json::json!({"n": i}), i as i64).unwrap();
        }
        let replayed = EvidenceSpool::replay_from(&path, 2).unwrap();
        assert_eq!(replayed.len(), 2);
        assert_eq!(replayed[0].sequence, 3);
        assert_eq!(replayed[1].sequence, 4);
    }

    #[test]
    fn test_corrupt_trailing_line_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spool.ndjson");
        {
            let spool = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 1_000_000).unwrap();
            spool.append("tick", serde_json::json!({"n": 0}), 0).unwrap();
        }
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{not valid json").unwrap();

        let replayed = EvidenceSpool::replay_from(&path, 0).unwrap();
        assert!(replayed.is_empty());
        let replayed_all = EvidenceSpool::replay_from(&path, u64::MAX.saturating_sub(1_000_000)).unwrap();
        assert!(replayed_all.is_empty());
    }

    #[test]
    fn test_ack_is_monotonic_and_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("spool.ndjson");
        let spool = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 1_000_000).unwrap();
        spool.ack(5).unwrap();
        spool.ack(3).unwrap();
        assert_eq!(spool.read_ack().unwrap(), 5);

        let reopened = EvidenceSpool::open(&path, Uuid::new_v4(), "ch1".into(), 1_000_000).unwrap();
        assert_eq!(reopened.read_ack().unwrap(), 5);
    }
}
