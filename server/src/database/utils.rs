use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Bytes of entropy in every token nonce.
pub const NONCE_BYTES: usize = 16;

/// Current Unix time in milliseconds, the only time unit used for QR
/// tokens and replay records.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Convert a TTL to whole milliseconds.  `None` if it does not fit an `i64`.
pub fn duration_millis(ttl: Duration) -> Option<i64> {
    i64::try_from(ttl.as_millis()).ok()
}

/// Replay-store key for a signed token: lowercase hex SHA-256 of the exact
/// token string.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Fresh 128-bit nonce from the OS RNG, base64url without padding.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Short, log-safe prefix of a token hash.
pub fn hash_prefix(token_hash: &str) -> &str {
    token_hash.get(..12).unwrap_or(token_hash)
}
