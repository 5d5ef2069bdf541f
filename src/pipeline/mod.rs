//! Pipeline stages for FB2 image compression.
//!
//! Each submodule implements exactly one transformation step and is tested
//! on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ document ──▶ encode ──▶ transcode ──▶ encode ──▶ document
//! (bytes)   (parse)      (base64)   (image)       (base64)   (serialise)
//! ```
//!
//! 1. [`input`]     — validate the path, decode the byte stream to UTF-8,
//!    derive the `compress_` output path
//! 2. [`document`]  — parse the XML, expose the FB2 `<binary>` nodes, write
//!    the document back
//! 3. [`encode`]    — base64 payload codec
//! 4. [`transcode`] — decode, resize and re-encode one image; CPU-bound
//! 5. [`quantize`]  — palette reduction used by the PNG branch of `transcode`

pub mod document;
pub mod encode;
pub mod input;
pub mod quantize;
pub mod transcode;
