use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::AppError;

const TOKEN_BYTES: usize = 32;
/// Unpadded base64 length of `TOKEN_BYTES`.
const TOKEN_LEN: usize = 43;

/// New session identifier: 256 bits from the OS RNG, URL-safe base64.
///
/// Carries no user id or timestamp, so it cannot be narrowed down by
/// guessing either.
pub fn generate_session_id() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Accepts a client-supplied session id only if it has the shape
/// `generate_session_id` produces.
pub fn parse_session_id(raw: String) -> Result<String, AppError> {
    let well_formed = raw.len() == TOKEN_LEN
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
    if well_formed {
        Ok(raw)
    } else {
        Err(AppError::ValidationError("malformed session id".into()))
    }
}
