//! Asset keys
//!
//! An asset is keyed by the 64-bit hash of its ordered initializer strings.
//! Collisions between different initializer tuples are not detected.

use ahash::RandomState;
use std::hash::{BuildHasher, Hash, Hasher};

// Fixed seeds so the same initializers hash identically for the life of the process.
const SEEDS: [u64; 4] = [
    0x243f_6a88_85a3_08d3,
    0x1319_8a2e_0370_7344,
    0xa409_3822_299f_31d0,
    0x082e_fa98_ec4e_6c89,
];

fn hasher() -> impl Hasher {
    RandomState::with_seeds(SEEDS[0], SEEDS[1], SEEDS[2], SEEDS[3]).build_hasher()
}

/// Hash an ordered tuple of initializer strings.
///
/// Each string is length-delimited, so `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn hash_initializers<S: AsRef<str>>(initializers: &[S]) -> u64 {
    let mut state = hasher();
    initializers.len().hash(&mut state);
    for init in initializers {
        init.as_ref().hash(&mut state);
    }
    state.finish()
}

/// Stable code identifying a cached type inside one build
pub fn type_code<T: ?Sized + 'static>() -> u64 {
    let mut state = hasher();
    std::any::type_name::<T>().hash(&mut state);
    state.finish()
}

/// Human readable form of an initializer tuple, used for diagnostics
pub fn describe_initializers<S: AsRef<str>>(initializers: &[S]) -> String {
    let mut name = String::new();
    for (i, init) in initializers.iter().enumerate() {
        if i > 0 {
            name.push(':');
        }
        name.push_str(init.as_ref());
    }
    name
}
