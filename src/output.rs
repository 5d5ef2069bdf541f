//! Result types produced by a compression run.
//!
//! Every `<binary>` node gets exactly one [`BinaryResult`], whatever happened
//! to it, so a caller can reconstruct the full per-node story without
//! scraping log lines.

use crate::error::BinaryError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of a run that wrote its result to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionOutput {
    /// Where the rewritten document was saved (`compress_<name>`).
    pub output_path: PathBuf,
    /// One entry per `<binary>` node, in document order.
    pub binaries: Vec<BinaryResult>,
    pub stats: CompressionStats,
}

/// Outcome of an in-memory run.
#[derive(Debug, Clone)]
pub struct CompressedDocument {
    /// Serialised UTF-8 document, XML declaration included.
    pub xml: Vec<u8>,
    pub binaries: Vec<BinaryResult>,
    pub stats: CompressionStats,
}

/// What happened to a single `<binary>` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BinaryResult {
    /// 0-based position among the document's `<binary>` nodes.
    pub index: usize,
    pub id: Option<String>,
    /// `content-type` as found in the input document.
    pub content_type: Option<String>,
    pub outcome: BinaryOutcome,
}

impl BinaryResult {
    pub fn is_transcoded(&self) -> bool {
        matches!(self.outcome, BinaryOutcome::Transcoded(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BinaryOutcome {
    /// The node now holds the re-encoded image.
    Transcoded(TranscodeSummary),
    /// The node was not a processable image and was left untouched.
    Skipped { reason: SkipReason },
    /// Processing failed; the node was left untouched.
    Failed { error: BinaryError },
}

/// Why a node was left alone without being attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    MissingId,
    MissingContentType,
    EmptyPayload,
    NotAnImage { content_type: String },
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::MissingId => write!(f, "no id attribute"),
            SkipReason::MissingContentType => write!(f, "no content-type attribute"),
            SkipReason::EmptyPayload => write!(f, "empty payload"),
            SkipReason::NotAnImage { content_type } => {
                write!(f, "unsupported type {content_type}")
            }
        }
    }
}

/// Per-node figures for a successful transcode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscodeSummary {
    /// Decoded payload size before processing.
    pub original_bytes: usize,
    /// Encoded image size after processing (before base64).
    pub new_bytes: usize,
    pub original_dimensions: (u32, u32),
    pub new_dimensions: (u32, u32),
    /// Whether an alpha channel or palette transparency was detected.
    pub transparent: bool,
    /// `content-type` written back to the node.
    pub content_type: String,
}

impl TranscodeSummary {
    pub fn was_resized(&self) -> bool {
        self.original_dimensions != self.new_dimensions
    }
}

/// Aggregate statistics for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressionStats {
    /// Number of `<binary>` nodes found in the FB2 namespace.
    pub total_binaries: usize,
    pub transcoded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Sum of decoded payload sizes of transcoded nodes, before.
    pub image_bytes_before: u64,
    /// Sum of encoded payload sizes of transcoded nodes, after.
    pub image_bytes_after: u64,
    /// Size of the input document in bytes.
    pub document_bytes_before: u64,
    /// Size of the serialised output document in bytes.
    pub document_bytes_after: u64,
    pub total_duration_ms: u64,
}

impl CompressionStats {
    /// Tally outcomes of `results` into a fresh set of statistics.
    pub fn from_results(results: &[BinaryResult]) -> Self {
        let mut stats = CompressionStats {
            total_binaries: results.len(),
            ..Default::default()
        };
        for r in results {
            match &r.outcome {
                BinaryOutcome::Transcoded(s) => {
                    stats.transcoded += 1;
                    stats.image_bytes_before += s.original_bytes as u64;
                    stats.image_bytes_after += s.new_bytes as u64;
                }
                BinaryOutcome::Skipped { .. } => stats.skipped += 1,
                BinaryOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        stats
    }

    /// Relative document size reduction in percent (negative if it grew).
    pub fn document_reduction_percent(&self) -> f64 {
        if self.document_bytes_before == 0 {
            return 0.0;
        }
        (1.0 - self.document_bytes_after as f64 / self.document_bytes_before as f64) * 100.0
    }
}
