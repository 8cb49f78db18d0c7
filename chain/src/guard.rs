// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! IntegrityGuard: the black stone.
//!
//! A two-state machine wrapped around the chain: `Active` until any
//! integrity violation is detected, then `Frozen` forever. Frozen means no
//! further history can be appended; every mutating call fails the same
//! way, deterministically, with nothing applied. Reads stay open: freezing
//! blocks forward progress, not forensic access.
//!
//! The only way out is `rebirth`, which does not revive anything: it
//! provisions a brand-new identity (new anchor, new empty chain, new data
//! directory) and leaves the frozen history permanently readable where it
//! died.

use crate::chain::ChainProof;
use crate::config::ChainConfig;
use crate::errors::{ChainError, Result};
use crate::{replay, wal};
use scar_kernel::anchor::{GroupParams, RootAnchor};
use scar_kernel::record::{MembershipProof, ScarRecord};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::SystemTime;

/// Externally visible integrity state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum IntegrityState {
    Active,
    Frozen,
}

/// Context captured at the moment of freezing.
#[derive(Clone, Debug, Serialize)]
pub struct FreezeInfo {
    pub reason: String,
    /// Last known good sequence when the freeze fired.
    pub sequence: u64,
    /// Value of the freeze-epoch counter after this transition.
    pub epoch: u64,
    pub at: SystemTime,
}

#[derive(Debug)]
enum GuardState {
    Active,
    Frozen(FreezeInfo),
}

/// Safety wrapper that every externally visible effect must pass through.
#[derive(Debug)]
pub struct IntegrityGuard {
    /// `None` when the durable history was corrupt at startup: the guard is
    /// born frozen and only the audit surface works.
    chain: Option<ChainProof>,
    state: RwLock<GuardState>,
    /// Monotonic across the deployment: rebirth carries the old value
    /// forward, so pollers never see it reset.
    epoch: AtomicU64,
    config: ChainConfig,
    value_len: usize,
}

impl IntegrityGuard {
    /// Open the chain behind a guard.
    ///
    /// A structurally corrupt log does not error: it produces a guard that
    /// is already `Frozen` (epoch incremented) with the readable prefix of
    /// the history still available for audit. Environmental failures
    /// (I/O, bad parameters) are real errors and propagate.
    pub fn open(config: ChainConfig, anchor: RootAnchor, params: GroupParams) -> Result<Self> {
        Self::open_at_epoch(config, anchor, params, 0)
    }

    fn open_at_epoch(
        config: ChainConfig,
        anchor: RootAnchor,
        params: GroupParams,
        base_epoch: u64,
    ) -> Result<Self> {
        let value_len = params.value_len();

        match ChainProof::initialize(&config, anchor, params) {
            Ok(chain) => {
                metrics::gauge!("scar_freeze_epoch", base_epoch as f64);
                Ok(Self {
                    chain: Some(chain),
                    state: RwLock::new(GuardState::Active),
                    epoch: AtomicU64::new(base_epoch),
                    config,
                    value_len,
                })
            }
            Err(ChainError::CorruptLog(detail)) => {
                tracing::error!("corrupt history at startup, freezing: {detail}");
                let epoch = base_epoch + 1;
                metrics::counter!("scar_freezes_total", 1);
                metrics::gauge!("scar_freeze_epoch", epoch as f64);
                Ok(Self {
                    chain: None,
                    state: RwLock::new(GuardState::Frozen(FreezeInfo {
                        reason: format!("corrupt log: {detail}"),
                        sequence: 0,
                        epoch,
                        at: SystemTime::now(),
                    })),
                    epoch: AtomicU64::new(epoch),
                    config,
                    value_len,
                })
            }
            Err(other) => Err(other),
        }
    }

    pub fn state(&self) -> IntegrityState {
        match *self.read_state() {
            GuardState::Active => IntegrityState::Active,
            GuardState::Frozen(_) => IntegrityState::Frozen,
        }
    }

    /// Monotonic freeze counter; +1 for every actual `Active -> Frozen`
    /// transition over the deployment's lifetime.
    pub fn freeze_epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn freeze_info(&self) -> Option<FreezeInfo> {
        match *self.read_state() {
            GuardState::Active => None,
            GuardState::Frozen(ref info) => Some(info.clone()),
        }
    }

    /// Explicitly signal an unrecoverable integrity violation.
    /// Idempotent: freezing a frozen guard changes nothing.
    pub fn freeze(&self, reason: &str) {
        let sequence = self
            .chain
            .as_ref()
            .and_then(|chain| chain.sequence_count().ok())
            .unwrap_or(0);
        self.freeze_with(reason.to_string(), sequence);
    }

    fn freeze_with(&self, reason: String, sequence: u64) {
        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let GuardState::Frozen(ref info) = *state {
            tracing::warn!(
                "already frozen (epoch {}); ignoring new reason: {reason}",
                info.epoch
            );
            return;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::error!("BLACK STONE: chain frozen at sequence {sequence} (epoch {epoch}): {reason}");
        metrics::counter!("scar_freezes_total", 1);
        metrics::gauge!("scar_freeze_epoch", epoch as f64);

        *state = GuardState::Frozen(FreezeInfo {
            reason,
            sequence,
            epoch,
            at: SystemTime::now(),
        });
    }

    /// Append one incident digest, if and only if the guard is `Active`.
    ///
    /// The state check and the mutation happen under one read guard, so a
    /// concurrent freeze cannot slip between them.
    pub fn add_scar(&self, element: &[u8]) -> Result<MembershipProof> {
        let state = self.read_state();
        if let GuardState::Frozen(ref info) = *state {
            return Err(ChainError::Frozen(info.reason.clone()));
        }
        let chain = self
            .chain
            .as_ref()
            .ok_or(ChainError::InvalidOperation("no live chain"))?;
        chain.add_scar(element)
    }

    /// Whole-chain verification. A `false` result is a trust-root
    /// violation and freezes the guard before returning.
    ///
    /// Available while frozen (it cannot freeze twice).
    pub fn verify_chain(&self) -> bool {
        let Some(chain) = self.chain.as_ref() else {
            return false;
        };
        let ok = chain.verify_chain();
        if !ok {
            self.freeze_with(
                "chain verification failed".to_string(),
                chain.sequence_count().unwrap_or(0),
            );
        }
        ok
    }

    pub fn current_value(&self) -> Option<Vec<u8>> {
        self.chain.as_ref().and_then(|c| c.current_value().ok())
    }

    pub fn sequence_count(&self) -> u64 {
        self.chain
            .as_ref()
            .and_then(|c| c.sequence_count().ok())
            .unwrap_or(0)
    }

    /// Read-only proof surface; works while frozen.
    pub fn current_witness(&self, sequence: u64) -> Result<MembershipProof> {
        let chain = self
            .chain
            .as_ref()
            .ok_or(ChainError::InvalidOperation("no live chain"))?;
        chain.current_witness(sequence)
    }

    pub fn state_proof(&self) -> Option<MembershipProof> {
        self.chain.as_ref().and_then(|c| c.state_proof().ok().flatten())
    }

    /// The durable history, best-effort. For a healthy chain this is the
    /// strict record set; for a corrupt one it is the readable prefix;
    /// frozen history stays auditable forever.
    pub fn audit_records(&self) -> Vec<ScarRecord> {
        if let Some(chain) = self.chain.as_ref() {
            if let Ok(records) = chain.records() {
                return records;
            }
        }
        let entries = wal::read_entries_lossy(self.config.wal_path(), self.value_len);
        replay::assemble_lossy(entries)
    }

    /// Provision a new identity after a freeze.
    ///
    /// Pure construction: the frozen guard is not mutated, its history is
    /// not touched, and the new guard starts `Active` over an empty chain
    /// bound to the new anchor. The freeze-epoch counter carries over.
    pub fn rebirth(
        &self,
        config: ChainConfig,
        anchor: RootAnchor,
        params: GroupParams,
    ) -> Result<IntegrityGuard> {
        if self.state() != IntegrityState::Frozen {
            return Err(ChainError::InvalidOperation(
                "rebirth requires a frozen chain",
            ));
        }
        if config.wal_path() == self.config.wal_path() {
            return Err(ChainError::InvalidOperation(
                "rebirth requires a fresh data directory",
            ));
        }
        if config.wal_path().exists() {
            return Err(ChainError::InvalidOperation(
                "rebirth target already contains a chain log",
            ));
        }

        tracing::info!(
            "rebirth: new identity in {:?} (carrying freeze epoch {})",
            config.data_dir,
            self.freeze_epoch()
        );
        Self::open_at_epoch(config, anchor, params, self.freeze_epoch())
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, GuardState> {
        match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scar_kernel::fixtures;
    use tempfile::tempdir;

    fn open_guard(dir: &std::path::Path) -> IntegrityGuard {
        IntegrityGuard::open(
            ChainConfig::new(dir),
            fixtures::test_anchor(),
            fixtures::test_params(),
        )
        .unwrap()
    }

    #[test]
    fn test_active_guard_appends() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());

        assert_eq!(guard.state(), IntegrityState::Active);
        assert_eq!(guard.freeze_epoch(), 0);

        let element = fixtures::test_elements(1)[0];
        let proof = guard.add_scar(element.as_bytes()).unwrap();
        assert_eq!(proof.sequence, 1);
        assert!(guard.verify_chain());
    }

    #[test]
    fn test_frozen_guard_rejects_mutation() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        let element = fixtures::test_elements(1)[0];
        guard.add_scar(element.as_bytes()).unwrap();

        guard.freeze("operator signalled violation");
        assert_eq!(guard.state(), IntegrityState::Frozen);

        let err = guard.add_scar(element.as_bytes()).unwrap_err();
        assert!(matches!(err, ChainError::Frozen(_)));
        assert_eq!(guard.sequence_count(), 1, "no side effects while frozen");
    }

    #[test]
    fn test_freeze_is_idempotent() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());

        guard.freeze("first");
        guard.freeze("second");

        assert_eq!(guard.freeze_epoch(), 1, "exactly one epoch increment");
        let info = guard.freeze_info().unwrap();
        assert_eq!(info.reason, "first");
        assert_eq!(info.epoch, 1);
    }

    #[test]
    fn test_reads_survive_freeze() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        let elements = fixtures::test_elements(2);
        for element in &elements {
            guard.add_scar(element.as_bytes()).unwrap();
        }

        guard.freeze("test");

        assert!(guard.current_value().is_some());
        assert_eq!(guard.sequence_count(), 2);
        assert_eq!(guard.audit_records().len(), 2);
        assert!(guard.current_witness(1).is_ok());
        assert!(guard.verify_chain(), "verification stays available frozen");
        assert_eq!(guard.freeze_epoch(), 1, "a passing check never re-freezes");
    }

    #[test]
    fn test_failed_verification_freezes() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        let element = fixtures::test_elements(1)[0];
        guard.add_scar(element.as_bytes()).unwrap();

        // Damage the log behind the live chain's back.
        let wal_path = ChainConfig::new(dir.path()).wal_path();
        let mut data = std::fs::read(&wal_path).unwrap();
        let offset = data.len() - 40;
        data[offset] ^= 0xFF;
        std::fs::write(&wal_path, &data).unwrap();

        assert!(!guard.verify_chain());
        assert_eq!(guard.state(), IntegrityState::Frozen);
        assert_eq!(guard.freeze_epoch(), 1);

        // Deterministic rejection from here on.
        for _ in 0..3 {
            let err = guard.add_scar(element.as_bytes()).unwrap_err();
            assert!(matches!(err, ChainError::Frozen(_)));
        }
    }

    #[test]
    fn test_rebirth_from_frozen() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        let element = fixtures::test_elements(1)[0];
        guard.add_scar(element.as_bytes()).unwrap();
        guard.freeze("dead");

        let new_dir = tempdir().unwrap();
        let new_anchor = RootAnchor::from_bytes(&[0x5A; 32]).unwrap();
        let reborn = guard
            .rebirth(
                ChainConfig::new(new_dir.path()),
                new_anchor,
                fixtures::test_params(),
            )
            .unwrap();

        assert_eq!(reborn.state(), IntegrityState::Active);
        assert_eq!(reborn.sequence_count(), 0, "new identity starts empty");
        assert_eq!(reborn.freeze_epoch(), 1, "epoch carried over");

        // The dead chain is untouched and still auditable.
        assert_eq!(guard.state(), IntegrityState::Frozen);
        assert_eq!(guard.audit_records().len(), 1);
    }

    #[test]
    fn test_rebirth_requires_frozen() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());

        let new_dir = tempdir().unwrap();
        let err = guard
            .rebirth(
                ChainConfig::new(new_dir.path()),
                fixtures::test_anchor(),
                fixtures::test_params(),
            )
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidOperation(_)));
    }

    #[test]
    fn test_freeze_info_serializes_for_pollers() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        guard.freeze("polled freeze");

        let info = guard.freeze_info().unwrap();
        let json = serde_json::to_string(&info).unwrap();
        assert!(json.contains("\"epoch\":1"));
        assert!(json.contains("polled freeze"));
    }

    #[test]
    fn test_rebirth_rejects_reusing_data_dir() {
        let dir = tempdir().unwrap();
        let guard = open_guard(dir.path());
        guard.freeze("dead");

        let err = guard
            .rebirth(
                ChainConfig::new(dir.path()),
                fixtures::test_anchor(),
                fixtures::test_params(),
            )
            .unwrap_err();
        assert!(matches!(err, ChainError::InvalidOperation(_)));
    }
}
