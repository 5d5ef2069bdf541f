//! Error types for the fb2-compress library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`Fb2CompressError`] — **Fatal**: the document cannot be processed at
//!   all (missing file, malformed XML, unwritable output). Returned as
//!   `Err(Fb2CompressError)` from the top-level `compress*` functions and no
//!   output file is left behind.
//!
//! * [`BinaryError`] — **Non-fatal**: a single `<binary>` node failed (bad
//!   base64, undecodable image, encoder failure). Stored inside
//!   [`crate::output::BinaryResult`]; the node is left exactly as it was and
//!   every other node is still processed.
//!
//! [`TranscodeError`] is what the image transcoder itself returns; it carries
//! no node identity and is lifted into a [`BinaryError`] by the caller.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the fb2-compress library.
///
/// Node-level failures use [`BinaryError`] and are stored in
/// [`crate::output::BinaryResult`] rather than propagated here.
#[derive(Debug, Error)]
pub enum Fb2CompressError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("File '{path}' not found\nCheck the path exists and is a regular file.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but reading it failed midway.
    #[error("Failed to read '{path}': {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The XML declaration names an encoding we do not know.
    #[error("Unsupported document encoding '{label}'")]
    UnsupportedEncoding { label: String },

    // ── Document errors ───────────────────────────────────────────────────
    /// The document is not well-formed XML.
    #[error("Failed to parse FB2 document: {detail}")]
    Parse { detail: String },

    /// The output name cannot be derived from the input path.
    #[error("Cannot derive an output file name from '{path}'")]
    InvalidOutputPath { path: PathBuf },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single `<binary>` node.
///
/// The node keeps its original payload and `content-type`; the run goes on
/// with the next node.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize, serde::Deserialize)]
pub enum BinaryError {
    /// The payload is not valid base64 (or its text could not be unescaped).
    #[error("Binary '{id}': base64 decoding failed: {detail}")]
    Base64 { id: String, detail: String },

    /// The decoded bytes are not an image the codec can read.
    #[error("Binary '{id}': image decoding failed: {detail}")]
    Image { id: String, detail: String },

    /// Re-encoding the image, or writing it back into the node, failed.
    #[error("Binary '{id}': encoding failed: {detail}")]
    Encode { id: String, detail: String },
}

impl BinaryError {
    /// Identifier of the node the error belongs to.
    pub fn id(&self) -> &str {
        match self {
            BinaryError::Base64 { id, .. }
            | BinaryError::Image { id, .. }
            | BinaryError::Encode { id, .. } => id,
        }
    }
}

/// Failure inside [`crate::pipeline::transcode::transcode`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscodeError {
    /// The input bytes could not be decoded as an image.
    #[error("decode: {0}")]
    Decode(String),

    /// The processed image could not be encoded.
    #[error("encode: {0}")]
    Encode(String),
}

impl TranscodeError {
    /// Attach the node identity, turning this into a [`BinaryError`].
    pub fn for_binary(self, id: &str) -> BinaryError {
        match self {
            TranscodeError::Decode(detail) => BinaryError::Image {
                id: id.to_string(),
                detail,
            },
            TranscodeError::Encode(detail) => BinaryError::Encode {
                id: id.to_string(),
                detail,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_display() {
        let e = Fb2CompressError::Parse {
            detail: "unexpected end of document at byte 42".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("byte 42"), "got: {msg}");
    }

    #[test]
    fn write_error_keeps_source() {
        use std::error::Error as _;
        let e = Fb2CompressError::OutputWriteFailed {
            path: PathBuf::from("/ro/compress_book.fb2"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
        };
        assert!(e.to_string().contains("compress_book.fb2"));
        assert!(e.source().is_some());
    }

    #[test]
    fn binary_error_id() {
        let e = BinaryError::Base64 {
            id: "cover.jpg".into(),
            detail: "Invalid byte 33, offset 0.".into(),
        };
        assert_eq!(e.id(), "cover.jpg");
        assert!(e.to_string().contains("cover.jpg"));
    }

    #[test]
    fn transcode_error_maps_to_binary_error() {
        let decode = TranscodeError::Decode("unknown format".into()).for_binary("img1");
        assert!(matches!(decode, BinaryError::Image { ref id, .. } if id == "img1"));

        let encode = TranscodeError::Encode("png: zero width".into()).for_binary("img2");
        assert!(matches!(encode, BinaryError::Encode { ref id, .. } if id == "img2"));
    }
}
