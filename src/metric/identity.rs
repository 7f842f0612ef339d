//! Series identity hashing
//!
//! A record's identity is a 64-bit FNV-1a hash over its name and its tag set,
//! so every point of the same series shares one `hash_id`:
//!
//! ```text
//! name \n (key \n value \n)*    // tags in ascending key order
//! ```

use std::collections::HashMap;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Incremental 64-bit FNV-1a hasher
#[derive(Debug, Clone, Copy)]
struct Fnv64a(u64);

impl Fnv64a {
    fn new() -> Self {
        Self(FNV_OFFSET_BASIS)
    }

    fn write(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.0 ^= u64::from(*b);
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(self) -> u64 {
        self.0
    }
}

/// Compute the series identity for a name and tag set
pub fn series_identity(name: &str, tags: &HashMap<String, String>) -> u64 {
    let mut keys: Vec<&String> = tags.keys().collect();
    keys.sort();

    let mut hasher = Fnv64a::new();
    hasher.write(name.as_bytes());
    hasher.write(b"\n");
    for key in keys {
        hasher.write(key.as_bytes());
        hasher.write(b"\n");
        hasher.write(tags[key].as_bytes());
        hasher.write(b"\n");
    }
    hasher.finish()
}
