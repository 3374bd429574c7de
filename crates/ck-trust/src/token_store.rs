// token_store.rs — Durable single-use token ledger.
//
// `consume` returns true at most once per token id for the lifetime of the
// ledger file. The record is durable before `consume` returns, so a crash
// right after a successful consume cannot be used to replay the token.
//
// Expired records may be pruned. A pruned id is kept as a SHA-256 tombstone
// so it still refuses re-consumption, while the ledger no longer carries the
// raw token value.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::error::TokenStoreError;
use crate::persist;

const LEDGER_VERSION: u32 = 1;

/// A consumed token and the moment it stops being valid anyway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedToken {
    pub token_id: String,
    pub expires_at: DateTime<Utc>,
}

/// On-disk shape of the ledger.
#[derive(Debug, Default, Serialize, Deserialize)]
struct LedgerDocument {
    version: u32,
    #[serde(default)]
    tokens: Vec<ConsumedToken>,
    #[serde(default)]
    tombstones: BTreeSet<String>,
}

fn tombstone(token_id: &str) -> String {
    format!("{:x}", Sha256::digest(token_id.as_bytes()))
}

#[derive(Debug)]
pub struct ConsumedTokenStore {
    tokens: BTreeMap<String, DateTime<Utc>>,
    tombstones: BTreeSet<String>,
    path: Option<PathBuf>,
}

impl ConsumedTokenStore {
    /// Open (or create on first write) the ledger at `path`.
    ///
    /// Fails if a ledger exists but neither it nor its backup is readable;
    /// starting from an empty ledger in that case would re-enable replays.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TokenStoreError> {
        let path = path.into();
        let doc = persist::read_with_fallback::<LedgerDocument>(&path)?.unwrap_or_default();
        if doc.version > LEDGER_VERSION {
            warn!(
                path = %path.display(),
                version = doc.version,
                "token ledger written by a newer version"
            );
        }
        let tokens = doc
            .tokens
            .into_iter()
            .map(|t| (t.token_id, t.expires_at))
            .collect::<BTreeMap<_, _>>();
        debug!(
            path = %path.display(),
            tokens = tokens.len(),
            tombstones = doc.tombstones.len(),
            "opened token ledger"
        );
        Ok(Self {
            tokens,
            tombstones: doc.tombstones,
            path: Some(path),
        })
    }

    /// A ledger that lives only as long as the process. For tests and
    /// dry runs.
    pub fn in_memory() -> Self {
        Self {
            tokens: BTreeMap::new(),
            tombstones: BTreeSet::new(),
            path: None,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record `token_id` as consumed.
    ///
    /// `Ok(true)` the first time an id is seen; `Ok(false)` on every later
    /// call regardless of `expires_at`. On a persistence failure the id is
    /// not recorded and an error is returned; callers must treat that as a
    /// rejection.
    pub fn consume(
        &mut self,
        token_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<bool, TokenStoreError> {
        if token_id.is_empty() {
            return Err(TokenStoreError::EmptyTokenId);
        }
        if self.is_consumed(token_id) {
            warn!(token_id, "token replay rejected");
            return Ok(false);
        }

        self.tokens.insert(token_id.to_string(), expires_at);
        if let Err(e) = self.flush() {
            self.tokens.remove(token_id);
            return Err(e);
        }
        debug!(token_id, %expires_at, "token consumed");
        Ok(true)
    }

    pub fn is_consumed(&self, token_id: &str) -> bool {
        self.tokens.contains_key(token_id) || self.tombstones.contains(&tombstone(token_id))
    }

    /// Compact records that expired before `now` into tombstones.
    /// Returns how many records were compacted.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> Result<usize, TokenStoreError> {
        let expired: Vec<String> = self
            .tokens
            .iter()
            .filter(|(_, expires_at)| **expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        if expired.is_empty() {
            return Ok(0);
        }

        let previous_tokens = self.tokens.clone();
        let previous_tombstones = self.tombstones.clone();
        for id in &expired {
            self.tokens.remove(id);
            self.tombstones.insert(tombstone(id));
        }
        if let Err(e) = self.flush() {
            self.tokens = previous_tokens;
            self.tombstones = previous_tombstones;
            return Err(e);
        }
        info!(pruned = expired.len(), "compacted expired tokens");
        Ok(expired.len())
    }

    /// Live (non-tombstoned) records.
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn tombstone_count(&self) -> usize {
        self.tombstones.len()
    }

    /// Live records in token-id order.
    pub fn records(&self) -> Vec<ConsumedToken> {
        self.tokens
            .iter()
            .map(|(token_id, expires_at)| ConsumedToken {
                token_id: token_id.clone(),
                expires_at: *expires_at,
            })
            .collect()
    }

    fn flush(&self) -> Result<(), TokenStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let doc = LedgerDocument {
            version: LEDGER_VERSION,
            tokens: self.records(),
            tombstones: self.tombstones.clone(),
        };
        persist::write_atomic(path, &doc)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PersistError;
    use chrono::Duration;
    use std::fs;
    use tempfile::tempdir;

    fn later(minutes: i64) -> DateTime<Utc> {
        Utc::now() + Duration::minutes(minutes)
    }

    #[test]
    fn consume_succeeds_exactly_once() {
        let mut store = ConsumedTokenStore::in_memory();
        assert!(store.consume("tok-1", later(5)).unwrap());
        assert!(!store.consume("tok-1", later(5)).unwrap());
        assert!(!store.consume("tok-1", later(60)).unwrap());
        assert!(store.consume("tok-2", later(5)).unwrap());
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn empty_token_id_is_an_error() {
        let mut store = ConsumedTokenStore::in_memory();
        assert!(matches!(
            store.consume("", later(5)),
            Err(TokenStoreError::EmptyTokenId)
        ));
    }

    #[test]
    fn replay_rejected_after_restart() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        {
            let mut store = ConsumedTokenStore::open(&path).unwrap();
            assert!(store.consume("approval-abc", later(5)).unwrap());
        }
        let mut reopened = ConsumedTokenStore::open(&path).unwrap();
        assert!(reopened.is_consumed("approval-abc"));
        assert!(!reopened.consume("approval-abc", later(120)).unwrap());
    }

    #[test]
    fn torn_primary_recovers_previous_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        {
            let mut store = ConsumedTokenStore::open(&path).unwrap();
            store.consume("first", later(5)).unwrap();
            store.consume("second", later(5)).unwrap();
        }
        fs::write(&path, b"{\"version\":1,\"tok").unwrap();

        let mut store = ConsumedTokenStore::open(&path).unwrap();
        // Backup holds the state before "second" was written.
        assert!(store.is_consumed("first"));
        assert!(!store.consume("first", later(5)).unwrap());
    }

    #[test]
    fn unreadable_ledger_refuses_to_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        fs::write(&path, b"not json").unwrap();
        let err = ConsumedTokenStore::open(&path).unwrap_err();
        assert!(matches!(
            err,
            TokenStoreError::Persist(PersistError::Unrecoverable { .. })
        ));
    }

    #[test]
    fn pruning_never_reenables_consumption() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tokens.json");
        let mut store = ConsumedTokenStore::open(&path).unwrap();
        let past = Utc::now() - Duration::minutes(10);
        store.consume("old", past).unwrap();
        store.consume("fresh", later(10)).unwrap();

        assert_eq!(store.prune_expired(Utc::now()).unwrap(), 1);
        assert_eq!(store.len(), 1);
        assert_eq!(store.tombstone_count(), 1);
        assert!(!store.consume("old", later(10)).unwrap());

        drop(store);
        let mut reopened = ConsumedTokenStore::open(&path).unwrap();
        assert!(!reopened.consume("old", later(10)).unwrap());
        assert!(!reopened.consume("fresh", later(10)).unwrap());

        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("\"old\""), "pruned ids are stored hashed");
    }

    #[test]
    fn tombstones_are_sha256_hex() {
        assert_eq!(
            tombstone("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn prune_with_nothing_expired_is_a_noop() {
        let mut store = ConsumedTokenStore::in_memory();
        store.consume("t", later(10)).unwrap();
        assert_eq!(store.prune_expired(Utc::now()).unwrap(), 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn failed_write_does_not_record_token() {
        let dir = tempdir().unwrap();
        // A directory where the ledger file should be makes the rename fail.
        let path = dir.path().join("tokens.json");
        fs::create_dir(&path).unwrap();
        let mut store = ConsumedTokenStore {
            tokens: BTreeMap::new(),
            tombstones: BTreeSet::new(),
            path: Some(path),
        };
        assert!(store.consume("t", later(5)).is_err());
        assert!(!store.is_consumed("t"));
    }
}
