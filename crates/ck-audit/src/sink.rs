// sink.rs — Destination for audit records.
//
// The kernel writes through `AuditSink` so tests and dry runs can keep the
// ledger in memory. Both implementations chain records the same way.

use crate::error::AuditError;
use crate::hasher;
use crate::record::AuditRecord;

/// Append-only, hash-chained record destination.
pub trait AuditSink: Send {
    /// Chain `record` to the previous one and persist it. The record's
    /// `previous_hash` is overwritten.
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError>;

    /// Re-verify the whole chain. Returns the number of records checked.
    fn verify(&self) -> Result<usize, AuditError>;

    /// The most recent `n` records, oldest first.
    fn tail(&self, n: usize) -> Result<Vec<AuditRecord>, AuditError>;
}

/// Check a sequence of serialized lines for chain continuity.
pub(crate) fn verify_lines<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
) -> Result<usize, AuditError> {
    let mut previous_hash: Option<String> = None;
    let mut count = 0;
    for (line_num, line) in lines {
        if line.trim().is_empty() {
            continue;
        }
        let record: AuditRecord = serde_json::from_str(line)?;
        if record.previous_hash != previous_hash {
            return Err(AuditError::IntegrityViolation {
                line: line_num,
                expected: previous_hash.unwrap_or_else(|| "none".to_string()),
                actual: record.previous_hash.unwrap_or_else(|| "none".to_string()),
            });
        }
        previous_hash = Some(hasher::link_hash(line));
        count += 1;
    }
    Ok(count)
}

/// In-memory ledger. Keeps the serialized lines so verification checks the
/// exact bytes that were chained.
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    lines: Vec<String>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn records(&self) -> Result<Vec<AuditRecord>, AuditError> {
        self.lines
            .iter()
            .map(|l| serde_json::from_str(l).map_err(AuditError::from))
            .collect()
    }

    /// Replace a stored line verbatim. Only for tamper tests.
    #[doc(hidden)]
    pub fn overwrite_line(&mut self, index: usize, line: String) {
        if let Some(slot) = self.lines.get_mut(index) {
            *slot = line;
        }
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&mut self, record: &mut AuditRecord) -> Result<(), AuditError> {
        record.previous_hash = self.lines.last().map(|l| hasher::link_hash(l));
        let line = serde_json::to_string(record)?;
        self.lines.push(line);
        Ok(())
    }

    fn verify(&self) -> Result<usize, AuditError> {
        verify_lines(
            self.lines
                .iter()
                .enumerate()
                .map(|(i, l)| (i + 1, l.as_str())),
        )
    }

    fn tail(&self, n: usize) -> Result<Vec<AuditRecord>, AuditError> {
        let start = self.lines.len().saturating_sub(n);
        self.lines[start..]
            .iter()
            .map(|l| serde_json::from_str(l).map_err(AuditError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditAction;

    #[test]
    fn memory_log_chains_records() {
        let mut log = MemoryAuditLog::new();
        for subject in ["create_draft", "send_email", "make_payment"] {
            log.append(&mut AuditRecord::new(AuditAction::Decision, subject))
                .unwrap();
        }
        assert_eq!(log.verify().unwrap(), 3);
        let records = log.records().unwrap();
        assert!(records[0].previous_hash.is_none());
        assert!(records[1].previous_hash.is_some());
    }

    #[test]
    fn edited_line_breaks_chain() {
        let mut log = MemoryAuditLog::new();
        for _ in 0..3 {
            log.append(&mut AuditRecord::new(AuditAction::Completed, "create_draft"))
                .unwrap();
        }
        let mut first = log.records().unwrap().remove(0);
        first.subject = "make_payment".into();
        log.overwrite_line(0, serde_json::to_string(&first).unwrap());

        match log.verify() {
            Err(AuditError::IntegrityViolation { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected integrity violation, got {:?}", other),
        }
    }

    #[test]
    fn tail_returns_latest_records() {
        let mut log = MemoryAuditLog::new();
        for subject in ["a", "b", "c"] {
            log.append(&mut AuditRecord::new(AuditAction::Decision, subject))
                .unwrap();
        }
        let tail = log.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].subject, "b");
        assert_eq!(tail[1].subject, "c");
        assert_eq!(log.tail(10).unwrap().len(), 3);
    }
}
