// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! ChainProof: the single-writer engine over accumulator + log.
//!
//! The commit barrier, in order, under one lock:
//! ```text
//! Element Input
//! ↓
//! 1. Append Begin record to the log (fsync)
//! ↓
//! 2. Apply the transition to the live accumulator
//! ↓
//! 3. Append the completion marker (fsync)
//! ↓
//! 4. Return the membership receipt
//! ```
//!
//! An I/O failure at step 1 leaves state untouched and the whole call
//! retryable. Once step 1 returns, the transition WILL exist: either this
//! process finishes it, or startup replay does. The lock is held across all
//! of 1–3; sequence numbers and the accumulator value have no valid
//! interleaving.

use crate::config::ChainConfig;
use crate::errors::{ChainError, Result};
use crate::replay;
use crate::wal::{self, Wal};
use scar_kernel::accumulator::{self, AccumulatorState, ElementDigest};
use scar_kernel::anchor::{GroupParams, RootAnchor};
use scar_kernel::record::{MembershipProof, ScarRecord};
use scar_kernel::verify;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Instant;

#[derive(Debug)]
struct ChainInner {
    wal: Wal,
    state: AccumulatorState,
    /// Ordered element history, rebuilt from the log at startup. Backs
    /// witness recomputation and point-in-time verification snapshots.
    elements: Vec<ElementDigest>,
}

/// A verifiable, durable, append-only incident chain bound to one anchor.
#[derive(Debug)]
pub struct ChainProof {
    anchor: RootAnchor,
    params: GroupParams,
    wal_path: PathBuf,
    verify_sample: usize,
    inner: Mutex<ChainInner>,
}

impl ChainProof {
    /// Load or create the chain, replaying the log to converge state.
    ///
    /// Blocking startup barrier: no mutation or verification is possible
    /// until this returns. `CorruptLog` here means the durable history is
    /// structurally invalid; the caller (normally `IntegrityGuard`) must
    /// treat that as a trust-root violation.
    pub fn initialize(
        config: &ChainConfig,
        anchor: RootAnchor,
        params: GroupParams,
    ) -> Result<Self> {
        fs::create_dir_all(&config.data_dir)?;
        let wal_path = config.wal_path();

        let (mut wal, entries) = Wal::open(&wal_path, params.value_len())?;
        let records = replay::assemble(entries)?;
        let state = replay::converge(&params, &anchor, &records, &mut wal)?;
        let elements = records.iter().map(|r| r.element).collect::<Vec<_>>();

        tracing::info!(
            "chain initialized at sequence {} from {:?}",
            state.sequence(),
            wal_path
        );

        Ok(Self {
            anchor,
            params,
            wal_path,
            verify_sample: config.verify_sample,
            inner: Mutex::new(ChainInner {
                wal,
                state,
                elements,
            }),
        })
    }

    /// Append one incident digest. The only mutation this type exposes.
    ///
    /// `element` must be exactly 32 bytes (`InvalidElement` otherwise, with
    /// no state change). Returns the membership receipt for the new entry,
    /// valid against the accumulator value it carries.
    pub fn add_scar(&self, element: &[u8]) -> Result<MembershipProof> {
        let element = ElementDigest::from_bytes(element)?;
        let started = Instant::now();

        let mut inner = self.lock_writer()?;

        let (next, witness) = accumulator::add(&self.params, &inner.state, &element)?;
        let record = ScarRecord {
            sequence: next.sequence(),
            element,
            pre_value: inner.state.value_bytes(&self.params),
            post_value: next.value_bytes(&self.params),
            completed: false,
        };

        // 1. Durable intent. Failure here aborts cleanly: nothing applied,
        //    nothing promised, retry the whole call.
        let handle = inner.wal.append(&record)?;

        // 2. Apply. From here the operation runs to completion.
        inner.state = next;
        inner.elements.push(element);

        // 3. Completion marker. If the marker write fails the applied state
        //    stands: the Begin record is durable and replay reconverges to
        //    this exact value. Retrying the call would double-append.
        if let Err(err) = inner.wal.mark_complete(&handle) {
            tracing::error!(
                "completion marker write failed at sequence {}: {err}; replay will reconverge",
                record.sequence
            );
        }

        let proof = MembershipProof {
            sequence: record.sequence,
            element,
            witness: witness.to_bytes(&self.params),
            accumulator: inner.state.value_bytes(&self.params),
        };
        drop(inner);

        metrics::counter!("scar_appends_total", 1);
        metrics::histogram!(
            "scar_append_duration_seconds",
            started.elapsed().as_secs_f64()
        );
        tracing::debug!("appended scar at sequence {}", proof.sequence);

        Ok(proof)
    }

    /// Whole-chain self-consistency check.
    ///
    /// Takes a point-in-time snapshot of the live state, then (without
    /// holding the writer lock) re-derives the accumulator from the anchor
    /// over the durable records and re-proves a sample of historical
    /// elements against the current value. Any mismatch, read failure, or
    /// structural violation is `false`; the caller decides what a failed
    /// verification means (the guard freezes on it).
    pub fn verify_chain(&self) -> bool {
        let snapshot = match self.lock_writer() {
            Ok(inner) => (inner.state.clone(), inner.elements.clone()),
            Err(_) => return false,
        };
        let (state, elements) = snapshot;

        metrics::counter!("scar_chain_verifications_total", 1);
        let ok = self.verify_snapshot(&state, &elements);
        if !ok {
            tracing::warn!(
                "chain verification failed at sequence {}",
                state.sequence()
            );
        }
        ok
    }

    fn verify_snapshot(&self, state: &AccumulatorState, elements: &[ElementDigest]) -> bool {
        if state.sequence() as usize != elements.len() {
            return false;
        }
        let n = elements.len();

        // The durable prefix must cover the snapshot: every one of the first
        // n records present, completed, and recording the same elements.
        // (The log may legitimately be ahead if a writer is mid-flight.)
        let records = match wal::read_entries(&self.wal_path, self.params.value_len())
            .and_then(replay::assemble)
        {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!("verification could not read the log: {err}");
                return false;
            }
        };
        if records.len() < n {
            tracing::warn!("log holds {} records, live state expects {}", records.len(), n);
            return false;
        }
        let highest_completed = records[..n]
            .iter()
            .filter(|r| r.completed)
            .map(|r| r.sequence)
            .max()
            .unwrap_or(0);
        if highest_completed != state.sequence() {
            return false;
        }
        for (record, element) in records[..n].iter().zip(elements) {
            if record.element != *element {
                return false;
            }
        }

        // Full re-derivation from the anchor.
        let recomputed = match verify::recompute_chain(&self.params, &self.anchor, elements) {
            Ok(recomputed) => recomputed,
            Err(_) => return false,
        };
        if recomputed.value() != state.value() || recomputed.sequence() != state.sequence() {
            return false;
        }

        // Re-prove a sample of historical elements against the live value.
        for index in sample_indices(n, self.verify_sample) {
            let witness =
                match accumulator::current_witness(&self.params, &self.anchor, elements, index) {
                    Ok(witness) => witness,
                    Err(_) => return false,
                };
            if !accumulator::verify(&self.params, &elements[index], &witness, state.value()) {
                return false;
            }
        }

        true
    }

    /// Current accumulator value, fixed-width encoded.
    pub fn current_value(&self) -> Result<Vec<u8>> {
        let inner = self.lock_writer()?;
        Ok(inner.state.value_bytes(&self.params))
    }

    /// Number of elements added since genesis.
    pub fn sequence_count(&self) -> Result<u64> {
        let inner = self.lock_writer()?;
        Ok(inner.state.sequence())
    }

    /// Recompute the receipt for the element at `sequence` (1-based) so it
    /// verifies against the *current* accumulator value. O(n): witnesses
    /// are not maintained eagerly on writes.
    pub fn current_witness(&self, sequence: u64) -> Result<MembershipProof> {
        let (state, elements) = {
            let inner = self.lock_writer()?;
            (inner.state.clone(), inner.elements.clone())
        };

        if sequence == 0 || sequence > elements.len() as u64 {
            return Err(ChainError::Kernel(
                scar_kernel::error::KernelError::UnknownSequence(sequence),
            ));
        }
        let index = (sequence - 1) as usize;
        let witness =
            accumulator::current_witness(&self.params, &self.anchor, &elements, index)?;

        Ok(MembershipProof {
            sequence,
            element: elements[index],
            witness: witness.to_bytes(&self.params),
            accumulator: state.value_bytes(&self.params),
        })
    }

    /// Receipt for the most recent element, or `None` on an empty chain.
    pub fn state_proof(&self) -> Result<Option<MembershipProof>> {
        let last = self.sequence_count()?;
        if last == 0 {
            return Ok(None);
        }
        self.current_witness(last).map(Some)
    }

    /// The full durable history, re-read from disk. Audit surface: works
    /// for any reader of the log file, with or without this process alive.
    pub fn records(&self) -> Result<Vec<ScarRecord>> {
        let entries = wal::read_entries(&self.wal_path, self.params.value_len())?;
        replay::assemble(entries)
    }

    pub fn anchor(&self) -> &RootAnchor {
        &self.anchor
    }

    pub fn params(&self) -> &GroupParams {
        &self.params
    }

    fn lock_writer(&self) -> Result<std::sync::MutexGuard<'_, ChainInner>> {
        self.inner
            .lock()
            .map_err(|_| ChainError::InvalidOperation("writer lock poisoned"))
    }
}

/// Deterministic evenly spread sample of `[0, n)`. `k` of 0 (or >= n)
/// selects everything.
fn sample_indices(n: usize, k: usize) -> Vec<usize> {
    if n == 0 {
        return Vec::new();
    }
    if k == 0 || k >= n {
        return (0..n).collect();
    }
    (0..k).map(|j| j * n / k).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use scar_kernel::fixtures;
    use tempfile::tempdir;

    fn open_chain(dir: &std::path::Path) -> ChainProof {
        let config = ChainConfig::new(dir);
        ChainProof::initialize(&config, fixtures::test_anchor(), fixtures::test_params()).unwrap()
    }

    #[test]
    fn test_initialize_empty_chain() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        assert_eq!(chain.sequence_count().unwrap(), 0);
        assert!(chain.verify_chain());
        assert!(chain.state_proof().unwrap().is_none());
    }

    #[test]
    fn test_add_scar_returns_verifying_proof() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        let element = fixtures::test_elements(1)[0];

        let proof = chain.add_scar(element.as_bytes()).unwrap();
        assert_eq!(proof.sequence, 1);
        assert_eq!(chain.sequence_count().unwrap(), 1);
        assert_eq!(proof.accumulator, chain.current_value().unwrap());

        let params = fixtures::test_params();
        let witness = scar_kernel::Witness::from_bytes(&params, &proof.witness).unwrap();
        let value = params.decode_value(&proof.accumulator).unwrap();
        assert!(accumulator::verify(&params, &proof.element, &witness, &value));
    }

    #[test]
    fn test_add_scar_rejects_bad_element() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        let err = chain.add_scar(b"short").unwrap_err();
        assert!(matches!(err, ChainError::InvalidElement { found: 5, .. }));
        assert_eq!(chain.sequence_count().unwrap(), 0, "no state change");
    }

    #[test]
    fn test_sequences_are_gapless() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        for (i, element) in fixtures::test_elements(5).iter().enumerate() {
            let proof = chain.add_scar(element.as_bytes()).unwrap();
            assert_eq!(proof.sequence, i as u64 + 1);
        }
        assert!(chain.verify_chain());
    }

    #[test]
    fn test_reopen_preserves_state() {
        let dir = tempdir().unwrap();
        let elements = fixtures::test_elements(3);

        let value_before = {
            let chain = open_chain(dir.path());
            for element in &elements {
                chain.add_scar(element.as_bytes()).unwrap();
            }
            chain.current_value().unwrap()
        };

        let chain = open_chain(dir.path());
        assert_eq!(chain.sequence_count().unwrap(), 3);
        assert_eq!(chain.current_value().unwrap(), value_before);
        assert!(chain.verify_chain());
    }

    #[test]
    fn test_current_witness_tracks_growth() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        let elements = fixtures::test_elements(4);
        let params = fixtures::test_params();

        for element in &elements {
            chain.add_scar(element.as_bytes()).unwrap();
        }

        for sequence in 1..=4u64 {
            let proof = chain.current_witness(sequence).unwrap();
            let witness = scar_kernel::Witness::from_bytes(&params, &proof.witness).unwrap();
            let value = params.decode_value(&proof.accumulator).unwrap();
            assert!(accumulator::verify(&params, &proof.element, &witness, &value));
            assert_eq!(proof.accumulator, chain.current_value().unwrap());
        }

        assert!(chain.current_witness(5).is_err());
        assert!(chain.current_witness(0).is_err());
    }

    #[test]
    fn test_state_proof_is_latest() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());

        for element in fixtures::test_elements(2) {
            chain.add_scar(element.as_bytes()).unwrap();
        }

        let proof = chain.state_proof().unwrap().unwrap();
        assert_eq!(proof.sequence, 2);
    }

    #[test]
    fn test_records_expose_audit_trail() {
        let dir = tempdir().unwrap();
        let chain = open_chain(dir.path());
        let elements = fixtures::test_elements(2);

        for element in &elements {
            chain.add_scar(element.as_bytes()).unwrap();
        }

        let records = chain.records().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.completed));
        assert_eq!(records[0].element, elements[0]);
        assert_eq!(records[0].post_value, records[1].pre_value);
    }

    #[test]
    fn test_sample_indices_spread() {
        assert_eq!(sample_indices(0, 4), Vec::<usize>::new());
        assert_eq!(sample_indices(3, 0), vec![0, 1, 2]);
        assert_eq!(sample_indices(3, 8), vec![0, 1, 2]);
        assert_eq!(sample_indices(8, 4), vec![0, 2, 4, 6]);
    }
}
