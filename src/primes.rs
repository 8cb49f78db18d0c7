// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.

//! Deterministic hash-to-prime mapping.
//!
//! Every accumulator exponent is derived here: BLAKE3 the input, treat the
//! digest as a 256-bit integer, force it odd, then step upward to the first
//! probable prime. Primality uses Miller-Rabin over a fixed base set, so the
//! mapping is fully deterministic: two processes always agree on the prime
//! for a given element.

use num_bigint::BigUint;
use num_traits::{One, Zero};

/// Fixed Miller-Rabin bases. Deterministic by construction; for 256-bit
/// candidates the residual error probability is far below any hardware
/// fault rate.
const MR_BASES: [u32; 12] = [2, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37];

/// Map arbitrary bytes to an odd 256-bit probable prime.
pub fn hash_to_prime(data: &[u8]) -> BigUint {
    let digest = blake3::hash(data);
    let mut candidate = BigUint::from_bytes_be(digest.as_bytes());
    candidate |= BigUint::one();

    // Digests below the smallest odd prime cannot occur in practice, but the
    // floor keeps the stepping loop total.
    let floor = BigUint::from(3u32);
    if candidate < floor {
        candidate = floor;
    }

    let two = BigUint::from(2u32);
    while !is_prime(&candidate) {
        candidate += &two;
    }

    candidate
}

/// Miller-Rabin primality test over the fixed base set.
pub fn is_prime(n: &BigUint) -> bool {
    let two = BigUint::from(2u32);
    if *n < two {
        return false;
    }

    for &base in MR_BASES.iter() {
        let base = BigUint::from(base);
        if *n == base {
            return true;
        }
        if (n % &base).is_zero() {
            return false;
        }
    }

    // Write n - 1 = d * 2^r with d odd.
    let n_minus_one = n - 1u32;
    let r = n_minus_one
        .trailing_zeros()
        .expect("n > 2 implies n - 1 > 0");
    let d = &n_minus_one >> r;

    'witness: for &base in MR_BASES.iter() {
        let mut x = BigUint::from(base).modpow(&d, n);
        if x.is_one() || x == n_minus_one {
            continue;
        }
        for _ in 1..r {
            x = (&x * &x) % n;
            if x == n_minus_one {
                continue 'witness;
            }
        }
        return false;
    }

    true
}
