//! # gb-auth-simple
//!
//! Hash-based implementation of `IdentityProvider`.
//! Produces the daily ` ID:` token shown beside every post.

use base64::Engine;
use chrono::{DateTime, Utc};
use gb_core::datetime::jst_day_stamp;
use gb_core::traits::IdentityProvider;
use secrecy::{ExposeSecret, SecretString};
use sha1::Sha1;
use sha2::{Digest, Sha256};

/// Length of the visible token.
pub const IDENTITY_LEN: usize = 8;

/// Hex characters kept from the address digest.
const ADDRESS_TAIL_LEN: usize = 4;

pub struct DailyIdentityProvider {
    /// Server secret mixed into every token (from configuration, never logged)
    secret: SecretString,
}

impl DailyIdentityProvider {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }
}

impl IdentityProvider for DailyIdentityProvider {
    /// Generates an "ID" (e.g., oX3a9Z1p).
    /// Same poster, same board, same JST day: same token. The address itself
    /// only contributes a short digest tail, so the token cannot be reversed.
    ///
    /// Two hashes, two algorithms: SHA-1 over the address, then SHA-256 over
    /// `address tail + board + YYYYMMDD + secret`.
    fn derive_identity(&self, network_address: &str, board: &str, at: DateTime<Utc>) -> String {
        let address_digest = hex::encode(Sha1::digest(network_address.as_bytes()));
        let address_tail = &address_digest[address_digest.len() - ADDRESS_TAIL_LEN..];

        let mut hasher = Sha256::new();
        hasher.update(address_tail.as_bytes());
        hasher.update(board.as_bytes());
        hasher.update(jst_day_stamp(&at).as_bytes());
        hasher.update(self.secret.expose_secret().as_bytes());

        base64::engine::general_purpose::STANDARD
            .encode(hasher.finalize())
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .take(IDENTITY_LEN)
            .collect()
    }
}
