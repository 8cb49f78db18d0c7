// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! RSA accumulator: constant-size membership proofs over an append-only
//! element sequence.
//!
//! Adding an element raises the current value to a prime derived from the
//! element (`A' = A ^ p mod N`); the pre-add value is the element's witness.
//! Verification is a single modular exponentiation regardless of history
//! length. Witnesses go stale as the accumulator grows and are recomputed
//! lazily on demand (`current_witness`): O(n) reads, O(1) writes.

use crate::anchor::{GroupParams, RootAnchor};
use crate::error::{KernelError, Result};
use crate::primes::hash_to_prime;
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};

/// Element digests are fixed at 32 bytes (BLAKE3 output width).
pub const DIGEST_LEN: usize = 32;

/// A caller-supplied incident digest. The richer incident record is hashed
/// outside the kernel; in here it is opaque fixed-width bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementDigest([u8; DIGEST_LEN]);

impl ElementDigest {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; DIGEST_LEN] =
            bytes
                .try_into()
                .map_err(|_| KernelError::InvalidElement {
                    expected: DIGEST_LEN,
                    found: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// The accumulator exponent for this element.
    pub fn to_prime(&self) -> BigUint {
        hash_to_prime(&self.0)
    }
}

/// Live accumulator state: the group value plus the sequence counter.
///
/// The value is a pure function of (params, anchor, ordered elements);
/// the counter equals the number of elements added since genesis.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccumulatorState {
    value: BigUint,
    sequence: u64,
}

impl AccumulatorState {
    /// The empty-chain state for an anchor.
    pub fn genesis(params: &GroupParams, anchor: &RootAnchor) -> Self {
        Self {
            value: params.genesis_value(anchor),
            sequence: 0,
        }
    }

    pub fn value(&self) -> &BigUint {
        &self.value
    }

    pub fn value_bytes(&self, params: &GroupParams) -> Vec<u8> {
        params.encode_value(&self.value)
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

/// Membership witness: the accumulator value with the element factored out.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Witness {
    value: BigUint,
}

impl Witness {
    pub fn to_bytes(&self, params: &GroupParams) -> Vec<u8> {
        params.encode_value(&self.value)
    }

    pub fn from_bytes(params: &GroupParams, bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            value: params.decode_value(bytes)?,
        })
    }
}

/// Fold one element into the accumulator. O(1).
///
/// Deterministic: the same (state, element) always produces the same
/// successor state, which is what makes crash-replay convergent.
pub fn add(
    params: &GroupParams,
    state: &AccumulatorState,
    element: &ElementDigest,
) -> Result<(AccumulatorState, Witness)> {
    let prime = element.to_prime();
    let next_value = state.value.modpow(&prime, params.modulus());
    let sequence = state
        .sequence
        .checked_add(1)
        .ok_or(KernelError::SequenceOverflow)?;

    let witness = Witness {
        value: state.value.clone(),
    };
    let next = AccumulatorState {
        value: next_value,
        sequence,
    };
    Ok((next, witness))
}

/// Verify membership: `witness ^ H2P(element) mod N == value`. O(1).
///
/// Pure and total: forged, stale, or otherwise wrong witnesses return
/// `false`, never an error.
pub fn verify(
    params: &GroupParams,
    element: &ElementDigest,
    witness: &Witness,
    value: &BigUint,
) -> bool {
    witness.value.modpow(&element.to_prime(), params.modulus()) == *value
}

/// Verify a batch against one accumulator value.
///
/// Every pair must hold. Exits on the first failure; a failed pair can
/// never be masked by later successes.
pub fn batch_verify(
    params: &GroupParams,
    pairs: &[(ElementDigest, Witness)],
    value: &BigUint,
) -> bool {
    pairs
        .iter()
        .all(|(element, witness)| verify(params, element, witness, value))
}

/// Recompute the witness for `elements[index]` against the accumulator value
/// that contains all of `elements`.
///
/// Folds every other element over the genesis value, so the cost is O(n)
/// modular exponentiations. This is the lazy half of the witness lifecycle:
/// writes never touch old witnesses.
pub fn current_witness(
    params: &GroupParams,
    anchor: &RootAnchor,
    elements: &[ElementDigest],
    index: usize,
) -> Result<Witness> {
    if index >= elements.len() {
        return Err(KernelError::UnknownSequence(index as u64 + 1));
    }

    let mut value = params.genesis_value(anchor);
    for (i, element) in elements.iter().enumerate() {
        if i == index {
            continue;
        }
        value = value.modpow(&element.to_prime(), params.modulus());
    }
    Ok(Witness { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures;

    fn setup() -> (GroupParams, RootAnchor, AccumulatorState) {
        let params = fixtures::test_params();
        let anchor = fixtures::test_anchor();
        let state = AccumulatorState::genesis(&params, &anchor);
        (params, anchor, state)
    }

    #[test]
    fn test_element_digest_size_checked() {
        assert!(ElementDigest::from_bytes(&[1u8; 32]).is_ok());

        let err = ElementDigest::from_bytes(&[]).unwrap_err();
        assert_eq!(
            err,
            KernelError::InvalidElement {
                expected: 32,
                found: 0
            }
        );
        assert!(ElementDigest::from_bytes(&[1u8; 31]).is_err());
        assert!(ElementDigest::from_bytes(&[1u8; 33]).is_err());
    }

    #[test]
    fn test_add_then_verify() {
        let (params, _anchor, state) = setup();
        let element = fixtures::test_elements(1)[0];

        let (next, witness) = add(&params, &state, &element).unwrap();
        assert_eq!(next.sequence(), 1);
        assert!(verify(&params, &element, &witness, next.value()));
    }

    #[test]
    fn test_forged_witness_rejected() {
        let (params, _anchor, state) = setup();
        let elements = fixtures::test_elements(2);

        let (next, _witness) = add(&params, &state, &elements[0]).unwrap();
        let forged = Witness {
            value: BigUint::from(12345u32),
        };
        assert!(!verify(&params, &elements[0], &forged, next.value()));
        // Right witness, wrong element.
        let (_next2, w0) = add(&params, &state, &elements[0]).unwrap();
        assert!(!verify(&params, &elements[1], &w0, next.value()));
    }

    #[test]
    fn test_stale_witness_rejected_after_growth() {
        let (params, _anchor, state) = setup();
        let elements = fixtures::test_elements(2);

        let (s1, w1) = add(&params, &state, &elements[0]).unwrap();
        assert!(verify(&params, &elements[0], &w1, s1.value()));

        let (s2, _w2) = add(&params, &s1, &elements[1]).unwrap();
        // w1 proves membership in s1, not in the grown accumulator.
        assert!(!verify(&params, &elements[0], &w1, s2.value()));
    }

    #[test]
    fn test_witness_update_law() {
        let (params, anchor, mut state) = setup();
        let elements = fixtures::test_elements(6);

        for element in &elements {
            let (next, _witness) = add(&params, &state, element).unwrap();
            state = next;
        }

        for (i, element) in elements.iter().enumerate() {
            let updated = current_witness(&params, &anchor, &elements, i).unwrap();
            assert!(
                verify(&params, element, &updated, state.value()),
                "updated witness {} must verify against the final value",
                i
            );
        }
    }

    #[test]
    fn test_batch_verify() {
        let (params, anchor, mut state) = setup();
        let elements = fixtures::test_elements(4);

        for element in &elements {
            let (next, _witness) = add(&params, &state, element).unwrap();
            state = next;
        }

        let pairs: Vec<(ElementDigest, Witness)> = elements
            .iter()
            .enumerate()
            .map(|(i, element)| {
                let witness = current_witness(&params, &anchor, &elements, i).unwrap();
                (*element, witness)
            })
            .collect();
        assert!(batch_verify(&params, &pairs, state.value()));

        let mut broken = pairs;
        broken[2].1 = Witness {
            value: BigUint::from(2u32),
        };
        assert!(!batch_verify(&params, &broken, state.value()));
    }

    #[test]
    fn test_add_is_deterministic() {
        let (params, _anchor, state) = setup();
        let element = fixtures::test_elements(1)[0];

        let (a, wa) = add(&params, &state, &element).unwrap();
        let (b, wb) = add(&params, &state, &element).unwrap();
        assert_eq!(a, b);
        assert_eq!(wa, wb);
    }

    #[test]
    fn test_order_matters() {
        let (params, _anchor, genesis) = setup();
        let elements = fixtures::test_elements(2);

        let (s1, _) = add(&params, &genesis, &elements[0]).unwrap();
        let (fwd, _) = add(&params, &s1, &elements[1]).unwrap();

        let (s2, _) = add(&params, &genesis, &elements[1]).unwrap();
        let (rev, _) = add(&params, &s2, &elements[0]).unwrap();

        // Exponentiation chains commute mathematically, but the intermediate
        // states (and therefore the durable pre/post records) do not.
        assert_eq!(fwd.value(), rev.value());
        assert_ne!(s1, s2);
    }

    #[test]
    fn test_unknown_sequence_witness() {
        let (params, anchor, _state) = setup();
        let elements = fixtures::test_elements(2);
        let err = current_witness(&params, &anchor, &elements, 2).unwrap_err();
        assert_eq!(err, KernelError::UnknownSequence(3));
    }
}
