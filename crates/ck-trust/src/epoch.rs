// epoch.rs — Trust epoch and signing-key generation authority.
//
// The kernel never mints key material. It is told which key version is
// active, which trust epoch is current, and which versions are revoked, and
// it rejects any credential whose binding does not match exactly. State only
// moves forward: key versions and epochs never decrease and a revocation is
// permanent.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PersistError, TrustError};
use crate::persist;

/// Snapshot of the trust authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustState {
    pub active_key_version: u64,
    pub trust_epoch: u64,
    #[serde(default)]
    pub revoked_key_versions: BTreeSet<u64>,
}

impl Default for TrustState {
    fn default() -> Self {
        Self {
            active_key_version: 1,
            trust_epoch: 1,
            revoked_key_versions: BTreeSet::new(),
        }
    }
}

impl TrustState {
    /// Check the invariants every persisted or in-memory state must satisfy.
    pub fn check(&self) -> Result<(), TrustError> {
        if self.trust_epoch < 1 {
            return Err(TrustError::Inconsistent(format!(
                "trust epoch {} is below 1",
                self.trust_epoch
            )));
        }
        if self.active_key_version < 1 {
            return Err(TrustError::Inconsistent(format!(
                "active key version {} is below 1",
                self.active_key_version
            )));
        }
        if self.revoked_key_versions.contains(&self.active_key_version) {
            return Err(TrustError::Inconsistent(format!(
                "active key version {} is revoked",
                self.active_key_version
            )));
        }
        Ok(())
    }

    /// Whether `next` is reachable from `self` without moving backwards.
    fn advances_to(&self, next: &TrustState) -> Result<(), TrustError> {
        if next.active_key_version < self.active_key_version {
            return Err(TrustError::NonMonotonic(format!(
                "key version {} -> {}",
                self.active_key_version, next.active_key_version
            )));
        }
        if next.trust_epoch < self.trust_epoch {
            return Err(TrustError::NonMonotonic(format!(
                "trust epoch {} -> {}",
                self.trust_epoch, next.trust_epoch
            )));
        }
        if let Some(lost) = self
            .revoked_key_versions
            .difference(&next.revoked_key_versions)
            .next()
        {
            return Err(TrustError::NonMonotonic(format!(
                "revocation of key version {} cannot be withdrawn",
                lost
            )));
        }
        Ok(())
    }
}

/// A change supplied by the external key-management authority.
///
/// Fields left as `None`/empty are unchanged. Applying an update whose
/// values move backwards fails without touching state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustUpdate {
    #[serde(default)]
    pub rotate_key_to: Option<u64>,
    #[serde(default)]
    pub advance_epoch_to: Option<u64>,
    #[serde(default)]
    pub revoke: Vec<u64>,
}

impl TrustUpdate {
    pub fn rotate_key(version: u64) -> Self {
        Self {
            rotate_key_to: Some(version),
            ..Self::default()
        }
    }

    pub fn advance_epoch(epoch: u64) -> Self {
        Self {
            advance_epoch_to: Some(epoch),
            ..Self::default()
        }
    }

    pub fn revoke(versions: impl IntoIterator<Item = u64>) -> Self {
        Self {
            revoke: versions.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rotate_key_to.is_none() && self.advance_epoch_to.is_none() && self.revoke.is_empty()
    }

    /// The state that results from applying this update to `current`.
    pub fn apply_to(&self, current: &TrustState) -> TrustState {
        let mut next = current.clone();
        if let Some(version) = self.rotate_key_to {
            next.active_key_version = version;
        }
        if let Some(epoch) = self.advance_epoch_to {
            next.trust_epoch = epoch;
        }
        next.revoked_key_versions.extend(self.revoke.iter().copied());
        next
    }
}

/// Validates credential bindings against the current trust state.
///
/// When opened on a file the state is persisted on every update, before the
/// update becomes visible in memory.
#[derive(Debug)]
pub struct TrustEpochManager {
    state: TrustState,
    path: Option<PathBuf>,
}

impl TrustEpochManager {
    /// An in-memory authority starting from `state`.
    pub fn new(state: TrustState) -> Result<Self, TrustError> {
        state.check()?;
        Ok(Self { state, path: None })
    }

    /// Open durable trust state at `path`, seeding it with `initial` on
    /// first use.
    pub fn open(path: impl Into<PathBuf>, initial: TrustState) -> Result<Self, TrustError> {
        let path = path.into();
        let state = match persist::read_with_fallback::<TrustState>(&path)? {
            Some(state) => {
                debug!(path = %path.display(), epoch = state.trust_epoch, "loaded trust state");
                state
            }
            None => {
                initial.check()?;
                persist::write_atomic(&path, &initial)?;
                info!(path = %path.display(), epoch = initial.trust_epoch, "initialized trust state");
                initial
            }
        };
        state.check()?;
        Ok(Self {
            state,
            path: Some(path),
        })
    }

    pub fn active_key_version(&self) -> u64 {
        self.state.active_key_version
    }

    pub fn trust_epoch(&self) -> u64 {
        self.state.trust_epoch
    }

    pub fn is_key_revoked(&self, version: u64) -> bool {
        self.state.revoked_key_versions.contains(&version)
    }

    pub fn state(&self) -> &TrustState {
        &self.state
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// True only for the exact active key version and current epoch, and
    /// only while that version is not revoked.
    pub fn validate_token_binding(&self, key_version: u64, epoch: u64) -> bool {
        let valid = key_version == self.state.active_key_version
            && epoch == self.state.trust_epoch
            && !self.is_key_revoked(key_version);
        if !valid {
            warn!(
                key_version,
                epoch,
                active_key_version = self.state.active_key_version,
                trust_epoch = self.state.trust_epoch,
                "credential binding rejected"
            );
        }
        valid
    }

    /// Assert internal consistency.
    pub fn verify_integrity(&self) -> Result<(), TrustError> {
        self.state.check()
    }

    /// The state `update` would produce, without applying it. Fails if the
    /// update would move any counter backwards or leave the active key
    /// revoked.
    pub fn preview_update(&self, update: &TrustUpdate) -> Result<TrustState, TrustError> {
        let next = update.apply_to(&self.state);
        self.state.advances_to(&next)?;
        next.check()?;
        Ok(next)
    }

    /// Apply a monotonic update. Persists first; memory changes only after
    /// the new state is durable.
    pub fn apply_update(&mut self, update: &TrustUpdate) -> Result<&TrustState, TrustError> {
        let next = self.preview_update(update)?;
        if let Some(path) = &self.path {
            persist::write_atomic(path, &next)?;
        }
        info!(
            key_version = next.active_key_version,
            epoch = next.trust_epoch,
            revoked = next.revoked_key_versions.len(),
            "trust state updated"
        );
        self.state = next;
        Ok(&self.state)
    }

    /// Re-read the backing file, accepting it only if it advances state.
    ///
    /// Picks up rotations written by the external authority. An in-memory
    /// manager is left unchanged.
    pub fn reload(&mut self) -> Result<(), TrustError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let loaded = persist::read_with_fallback::<TrustState>(path)?.ok_or_else(|| {
            TrustError::Persist(PersistError::Unrecoverable { path: path.clone() })
        })?;
        loaded.check()?;
        self.state.advances_to(&loaded)?;
        self.state = loaded;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn state(key: u64, epoch: u64) -> TrustState {
        TrustState {
            active_key_version: key,
            trust_epoch: epoch,
            revoked_key_versions: BTreeSet::new(),
        }
    }

    #[test]
    fn binding_requires_exact_key_and_epoch() {
        let mgr = TrustEpochManager::new(state(3, 5)).unwrap();
        assert!(mgr.validate_token_binding(3, 5));
        assert!(!mgr.validate_token_binding(2, 5));
        assert!(!mgr.validate_token_binding(3, 4));
        assert!(!mgr.validate_token_binding(4, 5));
        assert!(!mgr.validate_token_binding(3, 6));
    }

    #[test]
    fn previous_generation_always_rejected() {
        for key in 2..6 {
            for epoch in 2..6 {
                let mgr = TrustEpochManager::new(state(key, epoch)).unwrap();
                assert!(mgr.validate_token_binding(key, epoch));
                assert!(!mgr.validate_token_binding(key - 1, epoch));
                assert!(!mgr.validate_token_binding(key, epoch - 1));
            }
        }
    }

    #[test]
    fn revoked_version_is_rejected() {
        let mut s = state(2, 1);
        s.revoked_key_versions.insert(1);
        let mgr = TrustEpochManager::new(s).unwrap();
        assert!(mgr.is_key_revoked(1));
        assert!(!mgr.is_key_revoked(2));
        assert!(!mgr.validate_token_binding(1, 1));
    }

    #[test]
    fn zero_epoch_or_key_is_inconsistent() {
        assert!(matches!(
            TrustEpochManager::new(state(1, 0)),
            Err(TrustError::Inconsistent(_))
        ));
        assert!(matches!(
            TrustEpochManager::new(state(0, 1)),
            Err(TrustError::Inconsistent(_))
        ));
    }

    #[test]
    fn revoking_the_active_key_is_refused() {
        let mut mgr = TrustEpochManager::new(state(2, 1)).unwrap();
        let err = mgr.apply_update(&TrustUpdate::revoke([2])).unwrap_err();
        assert!(matches!(err, TrustError::Inconsistent(_)));
        assert!(!mgr.is_key_revoked(2));
    }

    #[test]
    fn rotation_invalidates_old_binding() {
        let mut mgr = TrustEpochManager::new(TrustState::default()).unwrap();
        assert!(mgr.validate_token_binding(1, 1));
        mgr.apply_update(&TrustUpdate {
            rotate_key_to: Some(2),
            advance_epoch_to: Some(2),
            revoke: vec![1],
        })
        .unwrap();
        assert!(!mgr.validate_token_binding(1, 1));
        assert!(!mgr.validate_token_binding(2, 1));
        assert!(mgr.validate_token_binding(2, 2));
    }

    #[test]
    fn backwards_update_rejected_without_change() {
        let mut mgr = TrustEpochManager::new(state(4, 4)).unwrap();
        assert!(matches!(
            mgr.apply_update(&TrustUpdate::rotate_key(3)),
            Err(TrustError::NonMonotonic(_))
        ));
        assert!(matches!(
            mgr.apply_update(&TrustUpdate::advance_epoch(1)),
            Err(TrustError::NonMonotonic(_))
        ));
        assert_eq!(mgr.state(), &state(4, 4));
    }

    #[test]
    fn state_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");
        {
            let mut mgr = TrustEpochManager::open(&path, TrustState::default()).unwrap();
            mgr.apply_update(&TrustUpdate::advance_epoch(7)).unwrap();
        }
        let mgr = TrustEpochManager::open(&path, TrustState::default()).unwrap();
        assert_eq!(mgr.trust_epoch(), 7);
        assert!(!mgr.validate_token_binding(1, 1));
        assert!(mgr.validate_token_binding(1, 7));
    }

    #[test]
    fn reload_accepts_only_forward_changes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("trust.json");
        let mut mgr = TrustEpochManager::open(&path, state(2, 2)).unwrap();

        persist::write_atomic(&path, &state(3, 2)).unwrap();
        mgr.reload().unwrap();
        assert_eq!(mgr.active_key_version(), 3);

        persist::write_atomic(&path, &state(1, 2)).unwrap();
        assert!(matches!(mgr.reload(), Err(TrustError::NonMonotonic(_))));
        assert_eq!(mgr.active_key_version(), 3);
    }

    #[test]
    fn update_round_trips_through_json() {
        let update: TrustUpdate = serde_json::from_str(r#"{"revoke":[1,2]}"#).unwrap();
        assert_eq!(update, TrustUpdate::revoke([1, 2]));
        assert!(!update.is_empty());
        assert!(TrustUpdate::default().is_empty());
    }

    #[test]
    fn preview_leaves_state_untouched() {
        let mgr = TrustEpochManager::new(state(1, 1)).unwrap();
        let next = mgr.preview_update(&TrustUpdate::advance_epoch(2)).unwrap();
        assert_eq!(next.trust_epoch, 2);
        assert_eq!(mgr.trust_epoch(), 1);
        assert!(mgr.preview_update(&TrustUpdate::revoke([1])).is_err());
    }
}
