//! Data models representing database entities.
//!
//! This module contains all data structures that map to database tables,
//! plus the request/response bodies and job payloads built from them.

use rand::{Rng, distr::Alphanumeric};

/// Idempotency key records
pub mod idempotency;
/// Queue job payloads
pub mod job;
/// Merchant configuration model
pub mod merchant;
/// Payment model
pub mod payment;
/// Refund model
pub mod refund;
/// Webhook log and event models
pub mod webhook;

/// Length of the random part of payment and refund identifiers.
const ID_SUFFIX_LEN: usize = 16;

/// Generate a prefixed public identifier such as `pay_a1B2c3D4e5F6g7H8`.
pub(crate) fn generate_id(prefix: &str) -> String {
    let suffix: String = rand::rng()
        .sample_iter(Alphanumeric)
        .take(ID_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{prefix}{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_carry_prefix_and_fixed_length() {
        let id = generate_id("pay_");
        assert!(id.starts_with("pay_"));
        assert_eq!(id.len(), 4 + ID_SUFFIX_LEN);
        assert!(id[4..].chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn generated_ids_differ() {
        assert_ne!(generate_id("rfnd_"), generate_id("rfnd_"));
    }
}
