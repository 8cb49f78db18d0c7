// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! scar-chain: durable, tamper-evident incident chain runtime.
//!
//! Wraps the deterministic accumulator core with a write-ahead log,
//! crash recovery, a single-writer chain engine, and the integrity
//! guard that freezes the chain irreversibly on any detected
//! inconsistency.

pub mod chain;
pub mod config;
pub mod errors;
pub mod guard;
pub mod replay;
pub mod telemetry;
pub mod wal;

pub use chain::ChainProof;
pub use config::ChainConfig;
pub use errors::{ChainError, Result};
pub use guard::{FreezeInfo, IntegrityGuard, IntegrityState};
