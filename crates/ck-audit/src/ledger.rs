// ledger.rs — File-backed, hash-chained JSONL audit ledger.
//
// One JSON object per line. Each record's `previous_hash` is the SHA-256 of
// the preceding line as written, so the chain can be re-verified with nothing
// but the file. Appends are flushed and fsynced before returning: the kernel
// treats a failed append as a reason not to execute.

use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::AuditError;
use crate::hasher;
use crate::record::AuditRecord;
use crate::sink::{verify_lines, AuditSink};

pub struct AuditLedger {
    writer: BufWriter<File>,
    path: PathBuf,
    last_hash: Option<String>,
}

impl std::fmt::Debug for AuditLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger")
            .field("path", &self.path)
            .field("last_hash", &self.last_hash)
            .finish()
    }
}

fn open_err(path: &Path) -> impl FnOnce(std::io::Error) -> AuditError + '_ {
    move |source| AuditError::OpenFailed {
        path: path.to_path_buf(),
        source,
    }
}

impl AuditLedger {
    /// Open (or create) the ledger, recovering the chain head from the last
    /// line already on disk.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(open_err(parent))?;
        }

        let last_hash = if path.exists() {
            Self::read_last_hash(&path)?
        } else {
            None
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(open_err(&path))?;

        debug!(path = %path.display(), "opened audit ledger");
        Ok(Self {
            writer: BufWriter::new(file),
            path,
            last_hash,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every record in the file, oldest first.
    pub fn read_all(path: impl AsRef<Path>) -> Result<Vec<AuditRecord>, AuditError> {
        let mut records = Vec::new();
        for line in Self::lines(path.as_ref())? {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            records.push(serde_json::from_str(&line)?);
        }
        Ok(records)
    }

    /// Verify the hash chain of the file at `path`. Returns the number of
    /// records checked.
    pub fn verify_chain(path: impl AsRef<Path>) -> Result<usize, AuditError> {
        let lines = Self::lines(path.as_ref())?.collect::<Result<Vec<_>, _>>()?;
        verify_lines(
            lines
                .iter()
                .enumerate()
                .map(|(i, l)| (i + 1, l.as_str())),
        )
    }

    /// The last `n` records in the file at `path`, oldest first.
    pub fn read_tail(path: impl AsRef<Path>, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let mut window: VecDeque<String> = VecDeque::with_capacity(n);
        for line in Self::lines(path.as_ref())? {
            let line = line?;
            if line.trim().is_empty() || n == 0 {
                continue;
            }
            if window.len() == n {
                window.pop_front();
            }
            window.push_back(line);
        }
        window
            .iter()
            .map(|l| serde_json::from_str(l).map_err(AuditError::from))
            .collect()
    }

    fn lines(path: &Path) -> Result<std::io::Lines<BufReader<File>>, AuditError> {
        let file = File::open(path).map_err(open_err(path))?;
        Ok(BufReader::new(file).lines())
    }

    fn read_last_hash(path: &Path) -> Result<Option<String>, AuditError> {
        let mut last_line: Option<String> = None;
        for line in Self::lines(path)? {
            let line = line?;
            if !line.trim().is_empty() {
                last_line = Some(line);
            }
        }
        Ok(last_line.map(|line| hasher::link_hash(&line)))
    }
}

impl AuditSink for AuditLedger {
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        record.previous_hash = self.last_hash.clone();
        let line = serde_json::to_string(record)?;
        writeln!(self.writer, "{}", line)?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.last_hash = Some(hasher::link_hash(&line));
        debug!(action = %record.action, subject = %record.subject, "audit record appended");
        Ok(())
    }

    fn verify(&self) -> Result<usize, AuditError> {
        Self::verify_chain(&self.path)
    }

    fn tail(&self, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        Self::read_tail(&self.path, n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditAction;
    use tempfile::tempdir;
    use uuid::Uuid;

    fn append(ledger: &mut AuditLedger, action: AuditAction, subject: &str) {
        ledger
            .append(&mut AuditRecord::new(action, subject))
            .unwrap();
    }

    #[test]
    fn append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("audit").join("ledger.jsonl");
        {
            let mut ledger = AuditLedger::open(&path).unwrap();
            let mut record = AuditRecord::new(AuditAction::Decision, "send_email")
                .with_plan(Uuid::new_v4(), "digest")
                .with_risk(40, "medium");
            ledger.append(&mut record).unwrap();
            append(&mut ledger, AuditAction::Pending, "send_email");
        }
        let records = AuditLedger::read_all(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, AuditAction::Decision);
        assert_eq!(records[0].risk_score, Some(40));
        assert!(records[0].previous_hash.is_none());
        assert_eq!(records[1].action, AuditAction::Pending);
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn reopen_continues_chain() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let mut ledger = AuditLedger::open(&path).unwrap();
            append(&mut ledger, AuditAction::Decision, "create_draft");
        }
        {
            let mut ledger = AuditLedger::open(&path).unwrap();
            append(&mut ledger, AuditAction::Completed, "create_draft");
            assert_eq!(ledger.verify().unwrap(), 2);
        }
        assert_eq!(AuditLedger::verify_chain(&path).unwrap(), 2);
    }

    #[test]
    fn deleted_line_is_detected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        {
            let mut ledger = AuditLedger::open(&path).unwrap();
            for subject in ["a", "b", "c"] {
                append(&mut ledger, AuditAction::Decision, subject);
            }
        }
        let content = std::fs::read_to_string(&path).unwrap();
        let kept: Vec<&str> = content.lines().enumerate().filter(|(i, _)| *i != 1).map(|(_, l)| l).collect();
        std::fs::write(&path, kept.join("\n") + "\n").unwrap();

        assert!(matches!(
            AuditLedger::verify_chain(&path),
            Err(AuditError::IntegrityViolation { line: 2, .. })
        ));
    }

    #[test]
    fn tail_reads_last_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.jsonl");
        let mut ledger = AuditLedger::open(&path).unwrap();
        for subject in ["a", "b", "c", "d"] {
            append(&mut ledger, AuditAction::Decision, subject);
        }
        let tail = ledger.tail(2).unwrap();
        let subjects: Vec<_> = tail.iter().map(|r| r.subject.as_str()).collect();
        assert_eq!(subjects, vec!["c", "d"]);
        assert!(ledger.tail(0).unwrap().is_empty());
    }
}
