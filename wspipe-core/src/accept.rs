//! Accept token computation
//!
//! The server proves it understood the upgrade by hashing the client key with
//! a fixed GUID. Legacy version-00 peers use an MD5 challenge instead.

use crate::error::HandshakeError;
use crate::protocol::constants::{LEGACY_CHALLENGE_LEN, WEBSOCKET_KEY_LEN, WEBSOCKET_MAGIC};
use base64::{engine::general_purpose, Engine as _};
use md5::Md5;
use sha1::{Digest, Sha1};

/// Generate a random WebSocket key
pub fn generate_key() -> String {
    use rand::RngCore;
    let mut key_bytes = [0u8; WEBSOCKET_KEY_LEN];
    rand::thread_rng().fill_bytes(&mut key_bytes);
    general_purpose::STANDARD.encode(key_bytes)
}

/// Compute the `Sec-WebSocket-Accept` value for a client key
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Compute the 16-byte legacy challenge response.
///
/// Each key contributes the number formed by its digits divided by its count
/// of spaces; both numbers are hashed big-endian together with the 8-byte
/// request body.
pub fn legacy_challenge_response(
    key1: &str,
    key2: &str,
    challenge: &[u8],
) -> Result<[u8; 16], HandshakeError> {
    if challenge.len() != LEGACY_CHALLENGE_LEN {
        return Err(HandshakeError::InvalidKey(format!(
            "challenge of {} bytes",
            challenge.len()
        )));
    }
    let mut hasher = Md5::new();
    hasher.update(legacy_key_number(key1)?.to_be_bytes());
    hasher.update(legacy_key_number(key2)?.to_be_bytes());
    hasher.update(challenge);

    let mut response = [0u8; 16];
    response.copy_from_slice(&hasher.finalize());
    Ok(response)
}

fn legacy_key_number(key: &str) -> Result<u32, HandshakeError> {
    let spaces = key.chars().filter(|c| *c == ' ').count() as u64;
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let number = digits
        .parse::<u64>()
        .map_err(|_| HandshakeError::InvalidKey(key.to_string()))?;
    if spaces == 0 {
        return Err(HandshakeError::InvalidKey(key.to_string()));
    }
    u32::try_from(number / spaces).map_err(|_| HandshakeError::InvalidKey(key.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_key_generation() {
        let key = generate_key();
        assert_eq!(key.len(), 24);
        assert_eq!(general_purpose::STANDARD.decode(&key).unwrap().len(), 16);
        assert_ne!(key, generate_key());
    }

    #[test]
    fn test_accept_key_calculation() {
        let key = "dGhlIHNhbXBsZSBub25jZQ=="; // "the sample nonce"
        assert_eq!(compute_accept_key(key), "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_legacy_challenge() {
        let response = legacy_challenge_response(
            "18x 6]8vM;54 *(5:  {   U1]8  z [  8",
            "1_ tx7X d  <  nw  334J702) 7]o}` 0",
            b"Tm[K T2u",
        )
        .unwrap();
        assert_eq!(&response, b"fQJ,fN/4F4!~K~MH");
    }

    #[test]
    fn test_legacy_key_without_spaces() {
        assert!(matches!(
            legacy_challenge_response("12345", "1 2", b"12345678"),
            Err(HandshakeError::InvalidKey(_))
        ));
        assert!(matches!(
            legacy_challenge_response("1 2", "3 4", b"short"),
            Err(HandshakeError::InvalidKey(_))
        ));
    }

    proptest! {
        #[test]
        fn accept_key_is_deterministic_base64_of_20_bytes(key in "[A-Za-z0-9+/]{22}==") {
            let first = compute_accept_key(&key);
            prop_assert_eq!(&first, &compute_accept_key(&key));
            prop_assert_eq!(first.len(), 28);
            prop_assert_eq!(general_purpose::STANDARD.decode(&first).unwrap().len(), 20);
        }
    }
}
