//! Binary codec for stored payloads.
//!
//! Records are wrapped in a small envelope so the store can evolve without
//! orphaning old captures:
//!
//! ```text
//! [version: u8][length: u32 BE][payload: bincode]
//! ```
//!
//! New optional fields ride on a version bump; the decoder keeps accepting
//! every version it has ever written. A record with an unknown version, a
//! short body, or trailing garbage is rejected rather than misread.

use crate::error::CodecError;
use crate::model::Payload;

/// Current envelope version.
const FORMAT_VERSION: u8 = 1;

/// Envelope header size: version byte plus big-endian length.
const HEADER_LEN: usize = 5;

/// Encodes a payload into its stored representation.
pub fn encode(payload: &Payload) -> Result<Vec<u8>, CodecError> {
    let body = bincode::serialize(payload)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.push(FORMAT_VERSION);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decodes a stored record back into a payload.
pub fn decode(bytes: &[u8]) -> Result<Payload, CodecError> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN,
            actual: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let mut length = [0u8; 4];
    length.copy_from_slice(&bytes[1..HEADER_LEN]);
    let length = u32::from_be_bytes(length) as usize;

    let body = &bytes[HEADER_LEN..];
    if body.len() < length {
        return Err(CodecError::Truncated {
            expected: HEADER_LEN + length,
            actual: bytes.len(),
        });
    }
    if body.len() > length {
        return Err(CodecError::TrailingBytes(body.len() - length));
    }

    Ok(bincode::deserialize(body)?)
}
