//! Base64 codec for the on-disk string fields.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::Error;

/// Encode bytes with the standard base64 alphabet, no line wrapping.
pub fn encode(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// Decode a string produced by [`encode`]. Anything that is not valid
/// base64 is rejected as [`Error::BadSchema`].
pub fn decode(text: &str) -> Result<Vec<u8>, Error> {
    STANDARD.decode(text).map_err(|_| Error::BadSchema)
}
