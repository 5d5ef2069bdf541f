//! # fb2-compress
//!
//! Shrink FictionBook 2 (FB2) e-books by re-encoding their embedded images.
//!
//! ## Why this crate?
//!
//! FB2 stores every illustration inline as a base64 `<binary>` element.
//! Books converted from scans or publisher sources often carry print-size
//! cover art and photos that an e-reader screen never shows at full
//! resolution. Scaling those down and re-encoding them typically removes most
//! of the file size while the text and markup stay byte-for-byte the same.
//!
//! ## Pipeline Overview
//!
//! ```text
//! FB2
//!  │
//!  ├─ 1. Input      read file, decode BOM / declared encoding to UTF-8
//!  ├─ 2. Parse      quick-xml events, lift out FB2-namespace <binary> nodes
//!  ├─ 3. Decode     base64 → image bytes (per node; failures skip the node)
//!  ├─ 4. Transcode  resize to 800px, PNG-256 if transparent else JPEG q85
//!  ├─ 5. Rewrite    base64 back into the node, update content-type
//!  └─ 6. Output     UTF-8 document saved as compress_<name>
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fb2_compress::{compress, CompressionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = CompressionConfig::default();
//!     let output = compress("book.fb2", &config).await?;
//!     println!("wrote {}", output.output_path.display());
//!     println!("{}/{} images re-encoded, {:.1}% smaller",
//!         output.stats.transcoded,
//!         output.stats.total_binaries,
//!         output.stats.document_reduction_percent());
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fb2-compress` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! fb2-compress = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod compress;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use compress::{compress, compress_document, compress_sync};
pub use config::{CompressionConfig, CompressionConfigBuilder, DEFAULT_MAX_SIZE, DEFAULT_QUALITY};
pub use error::{BinaryError, Fb2CompressError, TranscodeError};
pub use output::{
    BinaryOutcome, BinaryResult, CompressedDocument, CompressionOutput, CompressionStats,
    SkipReason, TranscodeSummary,
};
pub use pipeline::document::FB2_NAMESPACE;
pub use progress::{CompressionProgressCallback, NoopProgressCallback, ProgressCallback};
