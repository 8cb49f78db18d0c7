// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Startup replay: the log is the truth, memory converges to it.
//!
//! # Recovery Protocol
//! 1. Scan every entry from the write-ahead log.
//! 2. Assemble Begin/Commit pairs into ordered records (fail closed on any
//!    structural violation).
//! 3. Re-derive the accumulator from genesis, checking each record's
//!    pre/post values along the way.
//! 4. Re-issue the completion marker for any transition whose Commit never
//!    made it to disk; the math is deterministic, so re-application always
//!    lands on the same value the crashed process was about to reach.
//!
//! # Invariants
//! - Sequence numbers run 1..n with no gaps
//! - A Commit without its Begin is corruption
//! - replay(replay(log)) = replay(log)

use crate::errors::{ChainError, Result};
use crate::wal::{LogHandle, Wal, WalEntry};
use scar_kernel::accumulator::{self, AccumulatorState};
use scar_kernel::anchor::{GroupParams, RootAnchor};
use scar_kernel::record::ScarRecord;
use std::time::Instant;

/// Pair Begin and Commit entries into sequence-ordered records.
///
/// Structural violations are `CorruptLog`: this history was durably written
/// by us, so anything malformed means the medium (or an editor) changed it.
pub fn assemble(entries: Vec<WalEntry>) -> Result<Vec<ScarRecord>> {
    let mut records: Vec<ScarRecord> = Vec::new();

    for entry in entries {
        match entry {
            WalEntry::Begin {
                sequence,
                element,
                pre_value,
                post_value,
            } => {
                let expected = records.len() as u64 + 1;
                if sequence != expected {
                    return Err(ChainError::CorruptLog(format!(
                        "expected sequence {expected}, found {sequence}"
                    )));
                }
                records.push(ScarRecord {
                    sequence,
                    element,
                    pre_value,
                    post_value,
                    completed: false,
                });
            }
            WalEntry::Commit { sequence } => {
                if sequence == 0 || sequence as usize > records.len() {
                    return Err(ChainError::CorruptLog(format!(
                        "commit marker for sequence {sequence} has no matching record"
                    )));
                }
                // Duplicate markers are possible after an interrupted
                // recovery and are harmless.
                records[sequence as usize - 1].completed = true;
            }
        }
    }

    Ok(records)
}

/// Best-effort assembly for audit reads: keeps whatever pairs up, skips
/// what does not. Never fails.
pub fn assemble_lossy(entries: Vec<WalEntry>) -> Vec<ScarRecord> {
    let mut records: Vec<ScarRecord> = Vec::new();

    for entry in entries {
        match entry {
            WalEntry::Begin {
                sequence,
                element,
                pre_value,
                post_value,
            } => records.push(ScarRecord {
                sequence,
                element,
                pre_value,
                post_value,
                completed: false,
            }),
            WalEntry::Commit { sequence } => {
                if let Some(record) = records.iter_mut().find(|r| r.sequence == sequence) {
                    record.completed = true;
                }
            }
        }
    }

    records
}

/// Re-derive the live accumulator from genesis over `records`, finishing any
/// transition that lost its completion marker to a crash.
///
/// Deterministic: same anchor + same records = same state, every time.
pub fn converge(
    params: &GroupParams,
    anchor: &RootAnchor,
    records: &[ScarRecord],
    wal: &mut Wal,
) -> Result<AccumulatorState> {
    let started = Instant::now();
    let mut state = AccumulatorState::genesis(params, anchor);
    let mut reapplied = 0usize;

    for record in records {
        if record.pre_value != state.value_bytes(params) {
            return Err(ChainError::CorruptLog(format!(
                "pre-state mismatch at sequence {}",
                record.sequence
            )));
        }

        let (next, _witness) = accumulator::add(params, &state, &record.element)?;

        if record.post_value != next.value_bytes(params) {
            return Err(ChainError::CorruptLog(format!(
                "post-state mismatch at sequence {}",
                record.sequence
            )));
        }
        state = next;

        if !record.completed {
            wal.mark_complete(&LogHandle::for_sequence(record.sequence))?;
            reapplied += 1;
        }
    }

    metrics::histogram!(
        "scar_replay_duration_seconds",
        started.elapsed().as_secs_f64()
    );
    if reapplied > 0 {
        tracing::info!(
            "re-applied {} incomplete transition(s) during replay",
            reapplied
        );
    }
    tracing::debug!("replay converged at sequence {}", state.sequence());

    Ok(state)
}
