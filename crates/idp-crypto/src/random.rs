//! Unguessable values: message IDs, session indexes, correlation tokens,
//! transient NameIDs and content keys.
//!
//! Everything draws from `rand`'s thread-local generator, a CSPRNG reseeded
//! from the operating system.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::distr::{Alphanumeric, SampleString};
use rand::RngCore;

/// `len` fresh random bytes.
#[must_use]
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0; len];
    rand::rng().fill_bytes(&mut out);
    out
}

/// `byte_len` random bytes, unpadded base64url encoded.
#[must_use]
pub fn random_base64url(byte_len: usize) -> String {
    URL_SAFE_NO_PAD.encode(random_bytes(byte_len))
}

/// An XML `ID` for a response or assertion: `_` and 32 hex digits.
///
/// The leading underscore keeps the value a valid `NCName`.
#[must_use]
pub fn generate_message_id() -> String {
    random_bytes(16)
        .iter()
        .fold(String::from("_"), |mut id, b| {
            use std::fmt::Write as _;
            let _ = write!(id, "{b:02x}");
            id
        })
}

/// Handle under which a suspended request waits for the external
/// authenticator; 256 bits, URL safe.
#[must_use]
pub fn generate_correlation_token() -> String {
    random_base64url(32)
}

/// `SessionIndex` of an authentication statement.
#[must_use]
pub fn generate_session_index() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn bytes_are_fresh_each_call() {
        assert_eq!(random_bytes(24).len(), 24);
        assert_ne!(random_bytes(32), random_bytes(32));
    }

    #[test]
    fn message_id_is_an_ncname() {
        let id = generate_message_id();
        assert_eq!(id.len(), 33);
        assert!(id.starts_with('_'));
        assert!(id[1..].bytes().all(|b| b.is_ascii_hexdigit()));
    }

    #[test]
    fn correlation_tokens_do_not_collide() {
        let tokens: HashSet<String> = (0..1000).map(|_| generate_correlation_token()).collect();
        assert_eq!(tokens.len(), 1000);
        assert!(tokens
            .iter()
            .flat_map(|t| t.chars())
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn session_index_is_alphanumeric() {
        let index = generate_session_index();
        assert_eq!(index.len(), 32);
        assert!(index.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
