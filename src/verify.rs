// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! Pure whole-chain recomputation.
//!
//! The accumulator value is a pure function of the ordered element history;
//! these helpers recompute it from genesis so a live state can be checked
//! against the record of how it was built. No side effects.

use crate::accumulator::{self, AccumulatorState, ElementDigest};
use crate::anchor::{GroupParams, RootAnchor};
use crate::error::Result;

/// Fold the full element history over the genesis value.
///
/// The result must equal the live `AccumulatorState` for a healthy chain;
/// this is the chain's self-consistency invariant.
pub fn recompute_chain(
    params: &GroupParams,
    anchor: &RootAnchor,
    elements: &[ElementDigest],
) -> Result<AccumulatorState> {
    let mut state = AccumulatorState::genesis(params, anchor);
    for element in elements {
        let (next, _witness) = accumulator::add(params, &state, element)?;
        state = next;
    }
    Ok(state)
}

/// Convenience digest for callers hashing an opaque incident record.
pub fn element_digest(bytes: &[u8]) -> ElementDigest {
    ElementDigest::from_bytes(blake3::hash(bytes).as_bytes())
        .expect("BLAKE3 output is exactly DIGEST_LEN bytes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    #[test]
    fn test_recompute_matches_incremental() {
        let params = fixtures::test_params();
        let anchor = fixtures::test_anchor();
        let elements = fixtures::test_elements(5);

        let mut state = AccumulatorState::genesis(&params, &anchor);
        for element in &elements {
            let (next, _witness) = accumulator::add(&params, &state, element).unwrap();
            state = next;
        }

        let recomputed = recompute_chain(&params, &anchor, &elements).unwrap();
        assert_eq!(recomputed, state);
        assert_eq!(recomputed.sequence(), 5);
    }

    #[test]
    fn test_recompute_empty_is_genesis() {
        let params = fixtures::test_params();
        let anchor = fixtures::test_anchor();

        let recomputed = recompute_chain(&params, &anchor, &[]).unwrap();
        assert_eq!(recomputed, AccumulatorState::genesis(&params, &anchor));
        assert_eq!(recomputed.sequence(), 0);
    }

    #[test]
    fn test_element_digest_width() {
        let digest = element_digest(b"an incident record");
        assert_eq!(digest.as_bytes().len(), 32);
        assert_eq!(digest, element_digest(b"an incident record"));
    }
}
