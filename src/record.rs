// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! Stable chain record and membership receipt types.
//!
//! `ScarRecord` is the audit-facing shape of one durable log entry; any
//! later process can read the log and reconstruct these without the live
//! accumulator. `MembershipProof` is the receipt handed back to callers
//! and exchanged with downstream verifiers.

use crate::accumulator::ElementDigest;
use crate::error::{KernelError, Result};
use serde::{Deserialize, Serialize};

/// One logged accumulator transition.
///
/// `pre_value`/`post_value` are fixed-width big-endian encodings
/// (`GroupParams::value_len()` bytes each). `completed` is true once the
/// transition's commit marker is durable.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScarRecord {
    pub sequence: u64,
    pub element: ElementDigest,
    pub pre_value: Vec<u8>,
    pub post_value: Vec<u8>,
    pub completed: bool,
}

/// A constant-size membership receipt for one element.
///
/// Valid against the accumulator value captured in `accumulator`; once the
/// chain grows past it the witness must be recomputed before the receipt is
/// considered current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipProof {
    pub sequence: u64,
    pub element: ElementDigest,
    pub witness: Vec<u8>,
    pub accumulator: Vec<u8>,
}

impl MembershipProof {
    /// Structural equality for cross-process comparison.
    pub fn matches(&self, other: &MembershipProof) -> bool {
        self.sequence == other.sequence
            && self.element == other.element
            && self.witness == other.witness
            && self.accumulator == other.accumulator
    }

    /// Canonical wire encoding for handing a receipt to an external
    /// verifier.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
            .map_err(|e| KernelError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (proof, _read) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())
                .map_err(|e| KernelError::Serialization(e.to_string()))?;
        Ok(proof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_proof() -> MembershipProof {
        MembershipProof {
            sequence: 7,
            element: ElementDigest::from_bytes(&[9u8; 32]).unwrap(),
            witness: vec![1, 2, 3, 4],
            accumulator: vec![5, 6, 7, 8],
        }
    }

    #[test]
    fn test_proof_matches() {
        let a = sample_proof();
        let b = sample_proof();
        assert!(a.matches(&b));

        let mut c = sample_proof();
        c.sequence = 8;
        assert!(!a.matches(&c));
    }

    #[test]
    fn test_proof_serialization_deterministic() {
        let proof = sample_proof();
        let bytes1 = proof.to_bytes().unwrap();
        let bytes2 = proof.to_bytes().unwrap();
        assert_eq!(bytes1, bytes2, "receipt encoding must be deterministic");

        let decoded = MembershipProof::from_bytes(&bytes1).unwrap();
        assert!(proof.matches(&decoded));
    }

    #[test]
    fn test_proof_json_roundtrip() {
        let proof = sample_proof();
        let json = serde_json::to_string(&proof).unwrap();
        let decoded: MembershipProof = serde_json::from_str(&json).unwrap();
        assert_eq!(proof, decoded);
    }

    #[test]
    fn test_record_roundtrip() {
        let record = ScarRecord {
            sequence: 1,
            element: ElementDigest::from_bytes(&[3u8; 32]).unwrap(),
            pre_value: vec![0u8; 32],
            post_value: vec![1u8; 32],
            completed: true,
        };

        let bytes = bincode::serde::encode_to_vec(&record, bincode::config::standard()).unwrap();
        let (decoded, _): (ScarRecord, _) =
            bincode::serde::decode_from_slice(&bytes, bincode::config::standard()).unwrap();
        assert_eq!(record, decoded);
    }
}
