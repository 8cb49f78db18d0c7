// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! Root anchor and accumulator group parameters.
//!
//! Both values are produced once by the provisioning ceremony and are
//! read-only constants for the lifetime of a chain identity. The kernel
//! consumes them; it never generates or rotates them.

use crate::error::{KernelError, Result};
use crate::primes::hash_to_prime;
use num_bigint::BigUint;
use num_traits::One;
use serde::{Deserialize, Serialize};

/// Anchor digests are fixed at 32 bytes.
pub const ANCHOR_LEN: usize = 32;

/// The immutable cryptographic origin of a chain.
///
/// Sealed exactly once at provisioning time. A chain identity is bound to
/// exactly one anchor; a different anchor means a different identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RootAnchor([u8; ANCHOR_LEN]);

impl RootAnchor {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let raw: [u8; ANCHOR_LEN] =
            bytes
                .try_into()
                .map_err(|_| KernelError::InvalidAnchor {
                    expected: ANCHOR_LEN,
                    found: bytes.len(),
                })?;
        Ok(Self(raw))
    }

    pub fn as_bytes(&self) -> &[u8; ANCHOR_LEN] {
        &self.0
    }
}

/// The RSA group the accumulator lives in: modulus `N` and generator `g`.
///
/// Fixed at provisioning; the factorization of `N` is destroyed after setup,
/// so nothing in this codebase can compute inverses in the group.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupParams {
    modulus: BigUint,
    generator: BigUint,
}

impl GroupParams {
    pub fn new(modulus: BigUint, generator: BigUint) -> Result<Self> {
        if !modulus.bit(0) {
            return Err(KernelError::InvalidParams("modulus must be odd"));
        }
        if generator <= BigUint::one() {
            return Err(KernelError::InvalidParams("generator must exceed 1"));
        }
        if generator >= modulus {
            return Err(KernelError::InvalidParams(
                "generator must be a group element below the modulus",
            ));
        }
        Ok(Self { modulus, generator })
    }

    /// Construct from big-endian byte encodings (the provisioning wire form).
    pub fn from_be_bytes(modulus: &[u8], generator: &[u8]) -> Result<Self> {
        Self::new(
            BigUint::from_bytes_be(modulus),
            BigUint::from_bytes_be(generator),
        )
    }

    pub fn modulus(&self) -> &BigUint {
        &self.modulus
    }

    pub fn generator(&self) -> &BigUint {
        &self.generator
    }

    /// Byte width of every encoded accumulator value for this group.
    pub fn value_len(&self) -> usize {
        ((self.modulus.bits() + 7) / 8) as usize
    }

    /// Big-endian, left-padded to `value_len()`. Fixed-width so durable
    /// records have one stable layout per identity.
    pub fn encode_value(&self, value: &BigUint) -> Vec<u8> {
        let raw = value.to_bytes_be();
        let mut out = vec![0u8; self.value_len()];
        let offset = out.len() - raw.len();
        out[offset..].copy_from_slice(&raw);
        out
    }

    pub fn decode_value(&self, bytes: &[u8]) -> Result<BigUint> {
        if bytes.len() != self.value_len() {
            return Err(KernelError::InvalidValueLength {
                expected: self.value_len(),
                found: bytes.len(),
            });
        }
        Ok(BigUint::from_bytes_be(bytes))
    }

    /// The genesis accumulator value for an anchor: `g ^ H2P(anchor) mod N`.
    ///
    /// Every later value chains off this one, which is what permanently binds
    /// a chain to its anchor: replaying the same records under a different
    /// anchor cannot reproduce the stored pre/post values.
    pub fn genesis_value(&self, anchor: &RootAnchor) -> BigUint {
        self.generator
            .modpow(&hash_to_prime(anchor.as_bytes()), &self.modulus)
    }
}
