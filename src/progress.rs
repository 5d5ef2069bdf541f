//! Progress-callback trait for per-binary compression events.
//!
//! Inject an [`Arc<dyn CompressionProgressCallback>`] via
//! [`crate::config::CompressionConfigBuilder::progress_callback`] to receive
//! an event for every decision the pipeline makes. This is the only channel
//! through which the library reports progress: nothing is printed directly,
//! so the CLI, a GUI, or a test can each choose its own sink.
//!
//! # Example
//!
//! ```rust
//! use fb2_compress::{CompressionConfig, CompressionProgressCallback, TranscodeSummary};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: Arc<AtomicUsize>,
//! }
//!
//! impl CompressionProgressCallback for CountingCallback {
//!     fn on_binary_complete(&self, index: usize, total: usize, summary: &TranscodeSummary) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         println!("{}/{} → {}", index + 1, total, summary.content_type);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback {
//!     completed: Arc::new(AtomicUsize::new(0)),
//! });
//!
//! let config = CompressionConfig::builder()
//!     .progress_callback(counter as Arc<dyn CompressionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::BinaryError;
use crate::output::{CompressionStats, SkipReason, TranscodeSummary};
use std::sync::Arc;

/// Called by the compression pipeline as it walks the `<binary>` nodes.
///
/// Nodes are processed one at a time in document order, so events never
/// interleave. The trait is still `Send + Sync` because the pipeline runs on
/// a blocking worker thread. All methods default to no-ops.
pub trait CompressionProgressCallback: Send + Sync {
    /// Called once after the document parsed successfully.
    ///
    /// `binary_count` is zero when the document embeds no images.
    fn on_document_loaded(&self, binary_count: usize) {
        let _ = binary_count;
    }

    /// Called before a node is inspected.
    ///
    /// # Arguments
    /// * `index`        — 0-based node position
    /// * `total`        — number of `<binary>` nodes
    /// * `id`           — the node's `id` attribute, if any
    /// * `content_type` — the node's `content-type` attribute, if any
    fn on_binary_start(
        &self,
        index: usize,
        total: usize,
        id: Option<&str>,
        content_type: Option<&str>,
    ) {
        let _ = (index, total, id, content_type);
    }

    /// Called when a node is left untouched without being attempted.
    fn on_binary_skipped(&self, index: usize, total: usize, reason: &SkipReason) {
        let _ = (index, total, reason);
    }

    /// Called when a node has been rewritten with the re-encoded image.
    fn on_binary_complete(&self, index: usize, total: usize, summary: &TranscodeSummary) {
        let _ = (index, total, summary);
    }

    /// Called when processing a node failed; the node is left untouched.
    fn on_binary_error(&self, index: usize, total: usize, error: &BinaryError) {
        let _ = (index, total, error);
    }

    /// Called once after every node has been attempted and the document
    /// serialised.
    fn on_compression_complete(&self, stats: &CompressionStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl CompressionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::CompressionConfig`].
pub type ProgressCallback = Arc<dyn CompressionProgressCallback>;
