//! Base64 payload codec for `<binary>` node text.
//!
//! FB2 writers wrap base64 at arbitrary widths (76 columns is common, some
//! indent every line), so ASCII whitespace is dropped before decoding. Any
//! other character outside the standard alphabet is an error. Output is a
//! single unwrapped line.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::debug;

/// Decode the text content of a `<binary>` node.
pub fn decode_payload(text: &str) -> Result<Vec<u8>, base64::DecodeError> {
    let compact: String = text
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    let bytes = STANDARD.decode(compact.as_bytes())?;
    debug!("Decoded base64 payload → {} bytes", bytes.len());
    Ok(bytes)
}

/// Encode image bytes as the new text content of a `<binary>` node.
pub fn encode_payload(bytes: &[u8]) -> String {
    let b64 = STANDARD.encode(bytes);
    debug!("Encoded image → {} bytes base64", b64.len());
    b64
}
