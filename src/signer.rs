//! Keyed integrity tags: HMAC-SHA256 over the signed portion of a frame.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of the hex-encoded signature.
pub const SIGNATURE_LEN: usize = 64;

/// Computes the lowercase-hex HMAC-SHA256 of `message` keyed by `secret`.
pub fn sign(secret: &[u8], message: &str) -> String {
    let mut mac =
        <HmacSha256 as Mac>::new_from_slice(secret).expect("HMAC accepts keys of any size");
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();
    digest.iter().map(|byte| format!("{:02x}", byte)).collect()
}

/// Verifies `signature_hex` against the recomputed tag.
///
/// The comparison is constant time in the signature bytes.
pub fn verify(secret: &[u8], message: &str, signature_hex: &str) -> bool {
    let expected = sign(secret, message);
    if expected.len() != signature_hex.len() {
        return false;
    }
    let mut mismatched: u8 = 0;
    for (a, b) in expected.bytes().zip(signature_hex.bytes()) {
        mismatched |= a ^ b;
    }
    mismatched == 0
}
