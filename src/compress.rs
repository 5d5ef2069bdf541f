//! Compression entry points.
//!
//! [`compress_document`] is the synchronous core: bytes in, rewritten bytes
//! out, every `<binary>` node attempted one after the other in document
//! order. [`compress`] wraps it with file handling: resolve the input, run the
//! core on a blocking worker, and write `compress_<name>` next to the input.

use crate::config::CompressionConfig;
use crate::error::{BinaryError, Fb2CompressError};
use crate::output::{
    BinaryOutcome, BinaryResult, CompressedDocument, CompressionOutput, CompressionStats,
    TranscodeSummary,
};
use crate::pipeline::document::{BinaryNode, Fb2Document, Payload};
use crate::pipeline::{input, transcode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Compress the images of an FB2 file and save the result beside it.
///
/// This is the primary entry point for the library.
///
/// # Arguments
/// * `path`   — the FB2 file to read
/// * `config` — compression configuration
///
/// # Returns
/// `Ok(CompressionOutput)` once `compress_<name>` has been written, even if
/// some nodes failed (check `output.stats.failed`).
///
/// # Errors
/// Returns `Err(Fb2CompressError)` only for fatal errors:
/// - File not found / permission denied / read failure
/// - Unknown encoding or malformed XML
/// - The output file could not be written (no partial file is left behind)
pub async fn compress(
    path: impl AsRef<Path>,
    config: &CompressionConfig,
) -> Result<CompressionOutput, Fb2CompressError> {
    let path = path.as_ref();
    info!("Starting compression: {}", path.display());

    // ── Step 1: Resolve input and output paths ───────────────────────────
    let input_path = input::resolve_input(path)?;
    let output_path = input::output_path_for(&input_path)?;

    // ── Step 2: Read ─────────────────────────────────────────────────────
    let bytes = tokio::fs::read(&input_path)
        .await
        .map_err(|e| Fb2CompressError::ReadFailed {
            path: input_path.clone(),
            source: e,
        })?;
    debug!("Read {} bytes from {}", bytes.len(), input_path.display());

    // ── Step 3: Process on a blocking worker (image codecs are CPU-bound) ─
    let config_clone = config.clone();
    let document = tokio::task::spawn_blocking(move || compress_document(&bytes, &config_clone))
        .await
        .map_err(|e| Fb2CompressError::Internal(format!("compression task failed: {e}")))??;

    // ── Step 4: Write atomically ─────────────────────────────────────────
    let xml = document.xml;
    let target = output_path.clone();
    tokio::task::spawn_blocking(move || write_atomic(&target, &xml))
        .await
        .map_err(|e| Fb2CompressError::Internal(format!("write task failed: {e}")))??;
    info!("Saved {}", output_path.display());

    Ok(CompressionOutput {
        output_path,
        binaries: document.binaries,
        stats: document.stats,
    })
}

/// Synchronous wrapper around [`compress`].
///
/// Creates a temporary tokio runtime internally.
pub fn compress_sync(
    path: impl AsRef<Path>,
    config: &CompressionConfig,
) -> Result<CompressionOutput, Fb2CompressError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| Fb2CompressError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(compress(path, config))
}

/// Compress the images of an in-memory FB2 document.
///
/// `bytes` may be in any encoding the XML declaration (or a BOM) announces;
/// the result is always UTF-8.
///
/// # Example
/// ```rust,no_run
/// use fb2_compress::{compress_document, CompressionConfig};
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let bytes = std::fs::read("book.fb2")?;
/// let out = compress_document(&bytes, &CompressionConfig::default())?;
/// std::fs::write("small.fb2", &out.xml)?;
/// println!("{} of {} images re-encoded", out.stats.transcoded, out.stats.total_binaries);
/// # Ok(())
/// # }
/// ```
pub fn compress_document(
    bytes: &[u8],
    config: &CompressionConfig,
) -> Result<CompressedDocument, Fb2CompressError> {
    let start = Instant::now();

    let (text, encoding) = input::decode_document(bytes)?;
    let mut document = Fb2Document::parse(&text)?;
    drop(text);

    let total = document.binaries().len();
    info!("Document ({}) has {} binary node(s)", encoding.name(), total);
    if let Some(ref cb) = config.progress_callback {
        cb.on_document_loaded(total);
    }

    let mut results = Vec::with_capacity(total);
    for (index, node) in document.binaries_mut().iter_mut().enumerate() {
        let id = node.id();
        let content_type = node.content_type();
        if let Some(ref cb) = config.progress_callback {
            cb.on_binary_start(index, total, id.as_deref(), content_type.as_deref());
        }

        let outcome = process_binary(node, config);
        match &outcome {
            BinaryOutcome::Transcoded(summary) => {
                debug!(
                    "Binary {}/{} ({:?}): {} → {} bytes as {}",
                    index + 1,
                    total,
                    id,
                    summary.original_bytes,
                    summary.new_bytes,
                    summary.content_type
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_binary_complete(index, total, summary);
                }
            }
            BinaryOutcome::Skipped { reason } => {
                debug!("Binary {}/{} ({:?}) skipped: {}", index + 1, total, id, reason);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_binary_skipped(index, total, reason);
                }
            }
            BinaryOutcome::Failed { error } => {
                warn!("Binary {}/{} left unchanged: {}", index + 1, total, error);
                if let Some(ref cb) = config.progress_callback {
                    cb.on_binary_error(index, total, error);
                }
            }
        }

        results.push(BinaryResult {
            index,
            id,
            content_type,
            outcome,
        });
    }

    let xml = document.to_xml()?;

    let mut stats = CompressionStats::from_results(&results);
    stats.document_bytes_before = bytes.len() as u64;
    stats.document_bytes_after = xml.len() as u64;
    stats.total_duration_ms = start.elapsed().as_millis() as u64;

    info!(
        "Compression complete: {}/{} transcoded, {} skipped, {} failed, {} → {} bytes in {}ms",
        stats.transcoded,
        stats.total_binaries,
        stats.skipped,
        stats.failed,
        stats.document_bytes_before,
        stats.document_bytes_after,
        stats.total_duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_compression_complete(&stats);
    }

    Ok(CompressedDocument {
        xml,
        binaries: results,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Run one node through extract → transcode → apply.
///
/// Never fails: every error becomes [`BinaryOutcome::Failed`] and the node is
/// left exactly as it was.
fn process_binary(node: &mut BinaryNode, config: &CompressionConfig) -> BinaryOutcome {
    let (id, bytes) = match node.extract_payload() {
        Ok(Payload::Image { id, bytes, .. }) => (id, bytes),
        Ok(Payload::Skipped(reason)) => return BinaryOutcome::Skipped { reason },
        Err(error) => return BinaryOutcome::Failed { error },
    };

    let result = match transcode::transcode(&bytes, config.max_size, config.quality) {
        Ok(result) => result,
        Err(e) => {
            return BinaryOutcome::Failed {
                error: e.for_binary(&id),
            }
        }
    };

    if let Err(e) = node.apply(&result) {
        return BinaryOutcome::Failed {
            error: BinaryError::Encode {
                id,
                detail: e.to_string(),
            },
        };
    }

    BinaryOutcome::Transcoded(TranscodeSummary {
        original_bytes: bytes.len(),
        new_bytes: result.bytes.len(),
        original_dimensions: result.original_dimensions,
        new_dimensions: result.dimensions,
        transparent: result.transparent,
        content_type: result.content_type.to_string(),
    })
}

/// Write `data` to `path` via a temp file in the same directory, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<(), Fb2CompressError> {
    let write_err = |source: std::io::Error| Fb2CompressError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).map_err(write_err)?;
    tmp.write_all(data).map_err(write_err)?;
    tmp.flush().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}
