// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! scar-kernel: the deterministic accumulator core of the scar chain.
//!
//! Everything in this crate is a pure function of its inputs: no I/O,
//! no clocks, no randomness. Same anchor + same ordered elements =>
//! same accumulator value, on any architecture.

pub mod accumulator;
pub mod anchor;
pub mod error;
pub mod fixtures;
pub mod primes;
pub mod record;
pub mod verify;

pub use accumulator::{AccumulatorState, ElementDigest, Witness};
pub use anchor::{GroupParams, RootAnchor};
pub use error::{KernelError, Result};
pub use record::{MembershipProof, ScarRecord};
