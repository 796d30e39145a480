//! Cache-key derivation for memoized function results.
//!
//! Keys are 64-bit MurmurHash3 digests over the raw input payload followed
//! by the function name and version, so identical inputs to the same
//! function version hash to the same key on every worker in the fleet.

use std::io::Cursor;

/// Derives the cache key for a function invocation.
pub fn cache_key(inputs: &[u8], name: &str, version: &str) -> u64 {
    let mut buf = Vec::with_capacity(inputs.len() + name.len() + version.len());
    buf.extend_from_slice(inputs);
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(version.as_bytes());

    // Reading from an in-memory cursor cannot fail.
    let digest = murmur3::murmur3_x64_128(&mut Cursor::new(&buf), 0).unwrap_or(0);
    digest as u64
}
