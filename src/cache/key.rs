//! Cache key generation using SHA-256 hashes

use sha2::{Digest, Sha256};

/// Generate a deterministic cache key from a namespace and parameters.
///
/// The key is `"{namespace}:{hash}"` where the hash covers the sorted
/// parameters, so parameter order never changes the key. Keeping the namespace
/// readable lets callers drop a whole family of keys by prefix.
pub fn cache_key(namespace: &str, params: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();

    let mut sorted_params: Vec<_> = params.iter().collect();
    sorted_params.sort();

    for (k, v) in sorted_params {
        hasher.update(k.as_bytes());
        hasher.update(b"=");
        hasher.update(v.as_bytes());
        hasher.update(b"&");
    }

    format!("{}:{:x}", namespace, hasher.finalize())
}

/// Prefix shared by every key generated for `namespace`.
pub fn namespace_prefix(namespace: &str) -> String {
    format!("{}:", namespace)
}
