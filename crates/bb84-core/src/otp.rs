//! One-time-pad cipher over the shared BB84 key.
//!
//! Repeating-key XOR: byte `i` of the UTF-8 message is combined with
//! `key[i % key.len()]`. Key elements are bits, so each step flips at most
//! the low bit of a byte. Ciphertext is rendered as standard base64.
//!
//! Both operations are total. Misuse and corrupt input produce sentinel
//! strings rather than errors so a presentation layer can show them inline.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use bb84_proto::Bit;

/// Returned by [`decrypt`] when the ciphertext is not valid base64.
pub const DECRYPTION_FAILED: &str = "Decryption failed";

fn xor_with_key(bytes: &mut [u8], key: &[Bit]) {
    for (byte, bit) in bytes.iter_mut().zip(key.iter().cycle()) {
        *byte ^= bit.as_u8();
    }
}

/// Encrypt `message` under `key`. Empty key yields an empty string.
pub fn encrypt(message: &str, key: &[Bit]) -> String {
    if key.is_empty() {
        return String::new();
    }

    let mut bytes = message.as_bytes().to_vec();
    xor_with_key(&mut bytes, key);
    STANDARD.encode(bytes)
}

/// Decrypt base64 `ciphertext` under `key`.
///
/// Empty key or ciphertext yields an empty string; undecodable base64 yields
/// [`DECRYPTION_FAILED`]. Bytes that do not form valid UTF-8 after XOR are
/// replaced with U+FFFD.
pub fn decrypt(ciphertext: &str, key: &[Bit]) -> String {
    if key.is_empty() || ciphertext.is_empty() {
        return String::new();
    }

    let Ok(mut bytes) = STANDARD.decode(ciphertext) else {
        tracing::debug!("ciphertext is not valid base64");
        return DECRYPTION_FAILED.to_string();
    };

    xor_with_key(&mut bytes, key);
    String::from_utf8_lossy(&bytes).into_owned()
}
