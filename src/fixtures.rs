//! Deterministic fixtures shared by tests across the workspace.
//!
//! The fixture modulus is a fixed odd 256-bit constant, NOT a secure RSA
//! semiprime: the algebra only needs a stable odd modulus to be exercised
//! deterministically. Production parameters come from the provisioning
//! ceremony and never pass through this module.

use crate::accumulator::ElementDigest;
use crate::anchor::{GroupParams, RootAnchor};
use num_bigint::BigUint;

const TEST_MODULUS_HEX: &str =
    "c7d2a8f3b15e9d014a6f8c2e7b3d5a9118f4c6e2d7a3b5f1908e6c4a2d7f3b61";

/// Small fixed group for fast tests. Generator matches the production
/// default (65537).
pub fn test_params() -> GroupParams {
    let modulus = BigUint::parse_bytes(TEST_MODULUS_HEX.as_bytes(), 16)
        .expect("fixture modulus is valid hex");
    GroupParams::new(modulus, BigUint::from(65537u32)).expect("fixture parameters are valid")
}

/// A deterministic anchor, as if sealed by a provisioning run.
pub fn test_anchor() -> RootAnchor {
    RootAnchor::from_bytes(blake3::hash(b"scar-fixture-anchor").as_bytes())
        .expect("BLAKE3 output is anchor-sized")
}

/// `n` distinct deterministic element digests.
pub fn test_elements(n: usize) -> Vec<ElementDigest> {
    (0..n)
        .map(|i| {
            let digest = blake3::hash(format!("scar-fixture-element-{i}").as_bytes());
            ElementDigest::from_bytes(digest.as_bytes()).expect("BLAKE3 output is digest-sized")
        })
        .collect()
}
