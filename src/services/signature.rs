//! HMAC-SHA256 webhook signatures.
//!
//! The signature is the lowercase hex digest of HMAC-SHA256 keyed with the
//! merchant's webhook secret over the exact request body bytes. Receivers
//! recompute it over the raw body they received.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign `body` with `secret`.
///
/// # Format
///
/// 64 lowercase hex characters, no scheme prefix.
pub fn sign(secret: &str, body: &[u8]) -> String {
    hex::encode(mac(secret, body).finalize().into_bytes())
}

/// Check `signature` against `body` in constant time.
///
/// Malformed hex never verifies.
pub fn verify(body: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    mac(secret, body).verify_slice(&expected).is_ok()
}

fn mac(secret: &str, body: &[u8]) -> HmacSha256 {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    mac
}
