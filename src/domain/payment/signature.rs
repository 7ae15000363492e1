//! Signature computation and verification for provider signals.
//!
//! Pure functions: identical bytes and key always produce the same result.
//! Hex digests are lower case and compared exactly, in constant time.

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Form-URL-encodes a value the way `application/x-www-form-urlencoded` does
/// (space becomes `+`).
pub fn form_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

/// Builds the canonical signing string for a redirect/IPN query.
///
/// Only keys starting with `prefix` are signed, minus those in `exclude`.
/// Empty values stay in. Keys are taken in lexicographic order and joined as
/// `key=encoded(value)` with `&`.
pub fn canonical_query(params: &BTreeMap<String, String>, prefix: &str, exclude: &[&str]) -> String {
    params
        .iter()
        .filter(|(key, _)| key.starts_with(prefix) && !exclude.contains(&key.as_str()))
        .map(|(key, value)| format!("{}={}", key, form_encode(value)))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA512 of `data` keyed by `key`, lower-case hex.
pub fn hmac_sha512_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// HMAC-SHA256 of `data` keyed by `key`, lower-case hex.
pub fn hmac_sha256_hex(key: &[u8], data: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    hex::encode(mac.finalize().into_bytes())
}

/// Exact, case-sensitive comparison of two signature strings in constant time.
pub fn signatures_equal(expected: &str, provided: &str) -> bool {
    if expected.len() != provided.len() {
        return false;
    }
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
