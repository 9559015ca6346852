//! Hex/base64 wire encoding shared by every crate that touches the wire
//! formats of §6: lower-case, unprefixed hex for field elements and points;
//! standard padded base64 for opaque blobs (signatures, proofs).

use crate::Error;

/// Fixed-length lower-case hex, no `0x` prefix. Used for `Fr` values (64
/// chars) and compressed G1 points (96 chars).
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decodes lower-case hex into exactly `expected_len` bytes.
pub fn decode_hex_fixed(s: &str, expected_len: usize) -> Result<Vec<u8>, Error> {
    let bytes = hex::decode(s).map_err(|_| Error::InvalidInput("malformed hex".into()))?;
    if bytes.len() != expected_len {
        return Err(Error::InvalidInput(format!(
            "expected {expected_len} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

/// Decodes lower-case hex of any length.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, Error> {
    hex::decode(s).map_err(|_| Error::InvalidInput("malformed hex".into()))
}

/// Standard padded base64, for opaque blobs (signatures, proofs).
pub fn encode_b64(bytes: &[u8]) -> String {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Decodes standard padded base64.
pub fn decode_b64(s: &str) -> Result<Vec<u8>, Error> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(s)
        .map_err(|_| Error::InvalidInput("malformed base64".into()))
}
