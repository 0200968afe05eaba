/// Random secret generation
///
/// Opaque refresh token values and numeric challenge codes both come from the
/// operating system CSPRNG.
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::{rngs::OsRng, Rng, RngCore};
use sha2::{Digest, Sha256};

/// Bytes of entropy in an opaque token (256 bits)
pub const TOKEN_BYTES: usize = 32;

/// Number of digits in a challenge code
pub const CODE_DIGITS: usize = 6;

/// Generate an opaque URL-safe token carrying 256 bits of entropy
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generate a uniformly random six-digit code
pub fn generate_code() -> String {
    OsRng.gen_range(100_000..=999_999u32).to_string()
}

/// Digest stored in place of an opaque token
pub fn token_digest(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Compare two secrets without short-circuiting on the first mismatch
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
